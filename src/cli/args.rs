use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "webcall")]
#[command(about = "Voice agent web calls", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the provisioning proxy server
    Serve(ServeCliArgs),
    /// Check that the provisioning backend is reachable
    Health,
    /// List the agents available on the backend
    Agents,
    /// Provision a web call and print its credentials
    Provision(ProvisionCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct ServeCliArgs {
    /// Override the configured listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug)]
pub struct ProvisionCliArgs {
    /// Agent to call
    #[arg(short, long)]
    pub agent: String,
    /// Call metadata as key=value, repeatable
    #[arg(short, long = "meta", value_parser = parse_key_value)]
    pub metadata: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provision_metadata() {
        let cli = Cli::try_parse_from([
            "webcall",
            "provision",
            "--agent",
            "agent_1",
            "--meta",
            "source=cli",
            "--meta",
            "note=a=b",
        ])
        .unwrap();

        match cli.command {
            CliCommand::Provision(args) => {
                assert_eq!(args.agent, "agent_1");
                assert_eq!(
                    args.metadata,
                    vec![
                        ("source".to_string(), "cli".to_string()),
                        ("note".to_string(), "a=b".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_metadata_without_separator() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["webcall", "health", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, CliCommand::Health));
    }
}
