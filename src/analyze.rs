use crate::cli::{AnalyzeAction, AnalyzeArgs};
use crate::error::CommandResult;
use crate::issue_analysis::handle_issue_command;
use crate::sprint_analysis::handle_sprint_command;

pub async fn handle_analyze_command(args: AnalyzeArgs) -> CommandResult {
    match args.action {
        AnalyzeAction::Issue(issue_args) => handle_issue_command(issue_args).await,
        AnalyzeAction::Sprint(sprint_args) => handle_sprint_command(sprint_args).await,
    }
}
