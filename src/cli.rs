use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Jira assistant for issue and sprint analysis", long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage configuration blocks
    Config(ConfigArgs),
    /// Analyze issues and sprints
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Create the default configuration or add a new block
    Init,
    /// Set the active configuration for future commands
    Use { name: String },
    /// Set a configuration key-value pair
    Set {
        key: String,
        value: String,
        /// Target config block (defaults to the active one)
        #[clap(short, long)]
        name: Option<String>,
    },
    /// Get a configuration value
    Get {
        key: String,
        /// Target config block (defaults to the active one)
        #[clap(short, long)]
        name: Option<String>,
    },
    /// List configurations, or the key-value pairs of one
    List {
        #[clap(short, long)]
        name: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[clap(subcommand)]
    pub action: AnalyzeAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AnalyzeAction {
    /// Analyze and display data for one issue
    Issue(IssueArgs),
    /// Analyze and display the current active sprint
    Sprint(SprintArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Id of the issue to analyze
    pub id: String,
    /// Comma separated field names to show
    #[clap(short, long)]
    pub show: Option<String>,
    /// Output format: json, table
    #[clap(short, long, default_value = "json")]
    pub output: String,
    /// Configuration name to use (defaults to the active one)
    #[clap(short = 'c', long = "config-name")]
    pub config_name: Option<String>,
    /// Generate an AI-powered progress summary
    #[clap(short, long)]
    pub rundown: bool,
    /// Standardize the issue description using AI
    #[clap(short = 'm', long)]
    pub marshal_description: bool,
    /// Template file replacing the standardization prompt
    #[clap(long, value_name = "TEMPLATE_FILE")]
    pub format: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SprintArgs {
    /// Perspective: issue, owner, status, epic
    #[clap(short, long, default_value = "status")]
    pub wrt: String,
    /// Comma separated columns to show
    #[clap(short, long)]
    pub show: Option<String>,
    /// Output format: json, table, csv
    #[clap(short, long, default_value = "json")]
    pub output: String,
    /// Configuration name to use (defaults to the active one)
    #[clap(short = 'c', long = "config-name")]
    pub config_name: Option<String>,
    /// Only issues assigned to the current user
    #[clap(short, long)]
    pub mine: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issue_flags() {
        let cli = Cli::parse_from([
            "jiaz", "-vv", "analyze", "issue", " PROJ-1 ", "-o", "table", "-c", "work", "-r",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Analyze(AnalyzeArgs {
            action: AnalyzeAction::Issue(args),
        }) = cli.command
        else {
            panic!("expected analyze issue");
        };
        assert_eq!(args.id, " PROJ-1 ");
        assert_eq!(args.output, "table");
        assert_eq!(args.config_name.as_deref(), Some("work"));
        assert!(args.rundown);
        assert!(!args.marshal_description);
    }

    #[test]
    fn test_sprint_defaults() {
        let cli = Cli::parse_from(["jiaz", "analyze", "sprint"]);
        let Commands::Analyze(AnalyzeArgs {
            action: AnalyzeAction::Sprint(args),
        }) = cli.command
        else {
            panic!("expected analyze sprint");
        };
        assert_eq!(args.wrt, "status");
        assert_eq!(args.output, "json");
        assert!(!args.mine);
    }

    #[test]
    fn test_config_set_with_name() {
        let cli = Cli::parse_from(["jiaz", "config", "set", "server_url", "http://x.com", "-n", "work"]);
        let Commands::Config(ConfigArgs {
            action: ConfigAction::Set { key, value, name },
        }) = cli.command
        else {
            panic!("expected config set");
        };
        assert_eq!((key.as_str(), value.as_str()), ("server_url", "http://x.com"));
        assert_eq!(name.as_deref(), Some("work"));
    }
}
