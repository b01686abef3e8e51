use anyhow::Result;
use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};

use crate::config::{
    encode_secure_value, ConfigStore, Section, DEFAULT_SECTION, GEMINI_API_KEY, META_SECTION,
    OPTIONAL_KEYS, SERVER_URL_KEY, USER_TOKEN_KEY,
};
use crate::error::JiazError;

pub const MAX_PROMPT_ATTEMPTS: usize = 3;

pub const REQUIRED_FIELD_EXHAUSTED: &str =
    "Required field not provided after 3 attempts. Exiting.";

const SERVER_URL_PROMPTS: [&str; 3] = [
    "Enter server URL (required)",
    "Server URL is required. Please enter it.",
    "Cannot proceed without Server URL. Please enter a valid URL.",
];

const USER_TOKEN_PROMPTS: [&str; 3] = [
    "Enter user token (required)",
    "User token is required. Please enter it.",
    "Cannot proceed without user token. Please enter a valid token.",
];

const FALLBACK_USER_TOKEN_PROMPTS: [&str; 3] = [
    "User token is required. Please enter it.",
    "Please enter a valid user token.",
    "Cannot proceed without a user token.",
];

const API_KEY_PROMPTS: [&str; 3] = [
    "Enter Gemini API key (optional, leave empty to use Ollama only)",
    "Invalid API key. Please enter a valid Gemini API key (or leave empty to skip)",
    "API key validation failed again. Please enter a valid Gemini API key (or leave empty to skip)",
];

/// Interactive terminal input.
pub trait Prompter {
    /// Free text; an empty answer is allowed.
    fn input(&self, prompt: &str) -> Result<String>;
    /// Hidden input for tokens and keys.
    fn secret(&self, prompt: &str) -> Result<String>;
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    /// Index of the chosen item.
    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize>;
}

/// Checks an LLM API key against the remote service.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate(&self, api_key: &str) -> bool;
}

pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for DialoguerPrompter {
    fn input(&self, prompt: &str) -> Result<String> {
        let value: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(value)
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        let value = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(value)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(answer)
    }

    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize> {
        let index = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()?;
        Ok(index)
    }
}

fn ask(prompter: &dyn Prompter, prompt: &str, secret: bool) -> Result<String> {
    if secret {
        prompter.secret(prompt)
    } else {
        prompter.input(prompt)
    }
}

/// Ask until a non-blank answer is given, at most [`MAX_PROMPT_ATTEMPTS`] times.
///
/// The n-th attempt uses the n-th prompt, repeating the last one when the
/// list is shorter than the budget.
pub fn prompt_required_with_retries(
    prompter: &dyn Prompter,
    prompts: &[&str],
    secret: bool,
) -> Result<String, JiazError> {
    if prompts.is_empty() {
        return Err(JiazError::validation(REQUIRED_FIELD_EXHAUSTED));
    }

    for attempt in 0..MAX_PROMPT_ATTEMPTS {
        let prompt = prompts[attempt.min(prompts.len() - 1)];
        let value = ask(prompter, prompt, secret)?;
        if !value.trim().is_empty() {
            return Ok(value.trim().to_string());
        }
    }

    Err(JiazError::validation(REQUIRED_FIELD_EXHAUSTED))
}

/// Ask once; a blank answer reuses `fallback_section.key`, or turns the
/// field required when the fallback has no value.
pub fn prompt_with_fallback(
    prompter: &dyn Prompter,
    prompt: &str,
    required_prompt: &str,
    store: &ConfigStore,
    key: &str,
    fallback_section: &str,
) -> Result<String, JiazError> {
    let value = prompter.input(prompt)?;
    if !value.trim().is_empty() {
        return Ok(value.trim().to_string());
    }

    match store.get_value(fallback_section, key) {
        Some(fallback) => Ok(fallback.to_string()),
        None => prompt_required_with_retries(prompter, &[required_prompt], false),
    }
}

/// Server URL and encoded user token. With a fallback store, blank answers
/// reuse the `default` block.
pub fn collect_required_fields(
    prompter: &dyn Prompter,
    fallback: Option<&ConfigStore>,
) -> Result<Section, JiazError> {
    let mut section = Section::new();

    match fallback {
        Some(store) => {
            let server_url = prompt_with_fallback(
                prompter,
                "Enter server URL (leave empty to use value from default)",
                "Server URL is required. Please enter it.",
                store,
                SERVER_URL_KEY,
                DEFAULT_SECTION,
            )?;
            section.insert(SERVER_URL_KEY.to_string(), server_url);

            let token = prompter.secret("Enter user token (leave empty to use value from default)")?;
            let encoded = if !token.trim().is_empty() {
                encode_secure_value(token.trim())
            } else if let Some(existing) = store.get_value(DEFAULT_SECTION, USER_TOKEN_KEY) {
                existing.to_string()
            } else {
                let token =
                    prompt_required_with_retries(prompter, &FALLBACK_USER_TOKEN_PROMPTS, true)?;
                encode_secure_value(&token)
            };
            section.insert(USER_TOKEN_KEY.to_string(), encoded);
        }
        None => {
            let server_url = prompt_required_with_retries(prompter, &SERVER_URL_PROMPTS, false)?;
            let token = prompt_required_with_retries(prompter, &USER_TOKEN_PROMPTS, true)?;
            section.insert(SERVER_URL_KEY.to_string(), server_url);
            section.insert(USER_TOKEN_KEY.to_string(), encode_secure_value(&token));
        }
    }

    Ok(section)
}

/// Optional project/board settings. Blank answers are left out.
pub fn collect_optional_fields(prompter: &dyn Prompter) -> Result<Section, JiazError> {
    let mut section = Section::new();
    for key in OPTIONAL_KEYS {
        let value = prompter.input(&format!("Enter {} (optional)", key.replace('_', " ")))?;
        if !value.trim().is_empty() {
            section.insert(key.to_string(), value.trim().to_string());
        }
    }
    Ok(section)
}

/// A validated Gemini key, or `None` when the user skips or runs out of attempts.
pub async fn prompt_api_key_with_retries(
    prompter: &dyn Prompter,
    validator: &dyn KeyValidator,
) -> Result<Option<String>, JiazError> {
    for attempt in 0..MAX_PROMPT_ATTEMPTS {
        let prompt = API_KEY_PROMPTS[attempt.min(API_KEY_PROMPTS.len() - 1)];
        let api_key = prompter.secret(prompt)?;
        let api_key = api_key.trim();

        if api_key.is_empty() {
            return Ok(None);
        }
        if validator.validate(api_key).await {
            return Ok(Some(api_key.to_string()));
        }
    }

    println!("⚠️  Maximum attempts reached. Proceeding without Gemini API key.");
    Ok(None)
}

/// Prompt for the Gemini key and store it, encoded, in `section_name` and `meta`.
pub async fn handle_gemini_api_key_input(
    prompter: &dyn Prompter,
    validator: &dyn KeyValidator,
    store: &mut ConfigStore,
    section_name: &str,
) -> Result<(), JiazError> {
    match prompt_api_key_with_retries(prompter, validator).await? {
        Some(api_key) => {
            let encoded = encode_secure_value(&api_key);
            store.set_value(section_name, GEMINI_API_KEY, &encoded);
            store.set_value(META_SECTION, GEMINI_API_KEY, &encoded);
            println!("✅ Gemini API key validated and saved.");
        }
        None => println!("No Gemini API key provided. Will use Ollama for LLM queries."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::decode_secure_value;
    use crate::testing::{AcceptKeys, ScriptedPrompter};
    use tempfile::TempDir;

    #[test]
    fn test_required_prompt_accepts_third_attempt() {
        let prompter = ScriptedPrompter::new(["", "  ", "https://jira.example.com"]);
        let value = prompt_required_with_retries(&prompter, &SERVER_URL_PROMPTS, false).unwrap();
        assert_eq!(value, "https://jira.example.com");
        assert_eq!(prompter.asked(), SERVER_URL_PROMPTS.to_vec());
    }

    #[test]
    fn test_required_prompt_fails_after_three_blanks() {
        let prompter = ScriptedPrompter::new(["", "", "", "never asked"]);
        let err = prompt_required_with_retries(&prompter, &["Only prompt"], false).unwrap_err();
        assert_eq!(err.to_string(), REQUIRED_FIELD_EXHAUSTED);
        assert_eq!(prompter.asked(), vec!["Only prompt"; 3]);
    }

    #[test]
    fn test_collect_required_fields_encodes_token() {
        let prompter = ScriptedPrompter::new(["https://jira.example.com", "secret-token"]);
        let section = collect_required_fields(&prompter, None).unwrap();
        assert_eq!(section[SERVER_URL_KEY], "https://jira.example.com");
        assert_eq!(
            decode_secure_value(&section[USER_TOKEN_KEY]).unwrap(),
            "secret-token"
        );
    }

    #[test]
    fn test_collect_required_fields_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load_from(dir.path().join("config.toml")).unwrap();
        store.set_value(DEFAULT_SECTION, SERVER_URL_KEY, "https://default.example.com");
        store.set_value(DEFAULT_SECTION, USER_TOKEN_KEY, &encode_secure_value("dflt"));

        let prompter = ScriptedPrompter::new(["", ""]);
        let section = collect_required_fields(&prompter, Some(&store)).unwrap();
        assert_eq!(section[SERVER_URL_KEY], "https://default.example.com");
        assert_eq!(decode_secure_value(&section[USER_TOKEN_KEY]).unwrap(), "dflt");
    }

    #[test]
    fn test_fallback_without_default_value_becomes_required() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load_from(dir.path().join("config.toml")).unwrap();
        let prompter = ScriptedPrompter::new(["", "https://typed.example.com", "", "tok"]);
        let section = collect_required_fields(&prompter, Some(&store)).unwrap();
        assert_eq!(section[SERVER_URL_KEY], "https://typed.example.com");
        assert_eq!(decode_secure_value(&section[USER_TOKEN_KEY]).unwrap(), "tok");
    }

    #[test]
    fn test_optional_fields_omit_blanks() {
        let prompter = ScriptedPrompter::new(["PROJ", "", "Sprint", "42", " "]);
        let section = collect_optional_fields(&prompter).unwrap();
        assert_eq!(section.len(), 3);
        assert_eq!(section["jira_project"], "PROJ");
        assert_eq!(section["jira_sprintboard_id"], "42");
        assert!(!section.contains_key("jira_backlog_name"));
        assert_eq!(prompter.asked()[0], "Enter jira project (optional)");
    }

    #[tokio::test]
    async fn test_api_key_skip_on_blank() {
        let prompter = ScriptedPrompter::new([""]);
        let key = prompt_api_key_with_retries(&prompter, &AcceptKeys(vec![]))
            .await
            .unwrap();
        assert_eq!(key, None);
    }

    #[tokio::test]
    async fn test_api_key_retries_until_valid() {
        let prompter = ScriptedPrompter::new(["bad", "good"]);
        let key = prompt_api_key_with_retries(&prompter, &AcceptKeys(vec!["good".into()]))
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("good"));
        assert_eq!(prompter.asked()[1], API_KEY_PROMPTS[1]);
    }

    #[tokio::test]
    async fn test_api_key_gives_up_after_three_invalid() {
        let prompter = ScriptedPrompter::new(["a", "b", "c"]);
        let key = prompt_api_key_with_retries(&prompter, &AcceptKeys(vec![]))
            .await
            .unwrap();
        assert_eq!(key, None);
    }

    #[tokio::test]
    async fn test_api_key_is_mirrored_into_meta() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::load_from(dir.path().join("config.toml")).unwrap();
        let prompter = ScriptedPrompter::new(["key-123"]);
        handle_gemini_api_key_input(
            &prompter,
            &AcceptKeys(vec!["key-123".into()]),
            &mut store,
            "default",
        )
        .await
        .unwrap();

        assert_eq!(
            store.get_value("default", GEMINI_API_KEY),
            store.get_value(META_SECTION, GEMINI_API_KEY)
        );
        assert_eq!(store.gemini_api_key().as_deref(), Some("key-123"));
    }
}
