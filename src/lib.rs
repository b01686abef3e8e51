pub mod analyze;
pub mod cli;
pub mod config;
pub mod config_commands;
pub mod display;
pub mod error;
pub mod fields;
pub mod formatter;
pub mod issue_ai;
pub mod issue_analysis;
pub mod jira_client;
pub mod llm;
pub mod marshal;
pub mod prompt;
pub mod prompts;
pub mod rate_limiter;
pub mod router;
pub mod sprint;
pub mod sprint_analysis;

#[cfg(test)]
pub mod testing;
