mod args;
pub mod backend;

pub use args::{Cli, CliCommand, ProvisionCliArgs, ServeCliArgs};
pub use backend::{handle_agents_command, handle_health_command, handle_provision_command};
