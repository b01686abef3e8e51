use crate::analyze::handle_analyze_command;
use crate::cli::{Cli, Commands};
use crate::config_commands::handle_config_command;
use crate::error::CommandResult;

pub async fn route_command(cli: Cli) -> CommandResult {
    match cli.command {
        Commands::Config(config_args) => handle_config_command(config_args).await,
        Commands::Analyze(analyze_args) => handle_analyze_command(analyze_args).await,
    }
}
