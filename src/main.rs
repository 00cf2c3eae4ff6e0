use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use webcall::{
    app,
    cli::{
        handle_agents_command, handle_health_command, handle_provision_command, Cli, CliCommand,
    },
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let CliCommand::Version = cli.command {
        println!("webcall {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load()?;

    let log_level = if cli.verbose || config.server.debug {
        "debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Serve(args) => {
            if let Some(port) = args.port {
                config.server.port = port;
            }
            app::run_server(&config).await
        }
        CliCommand::Health => handle_health_command(&config).await,
        CliCommand::Agents => handle_agents_command(&config).await,
        CliCommand::Provision(args) => handle_provision_command(&config, args).await,
        CliCommand::Version => Ok(()),
    }
}
