use log::info;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::{
    display_value, encode_secure_value, ConfigStore, Section, DEFAULT_SECTION,
    GEMINI_API_KEY, META_SECTION, USER_TOKEN_KEY,
};
use crate::error::{CommandResult, JiazError, Outcome};
use crate::llm::GeminiKeyValidator;
use crate::prompt::{
    collect_optional_fields, collect_required_fields, handle_gemini_api_key_input,
    DialoguerPrompter, KeyValidator, Prompter,
};

pub async fn handle_config_command(args: ConfigArgs) -> CommandResult {
    let mut store = ConfigStore::load()?;
    let prompter = DialoguerPrompter::new();
    let validator = GeminiKeyValidator;

    match args.action {
        ConfigAction::Init => init_config(&mut store, &prompter, &validator).await,
        ConfigAction::Use { name } => use_config(&mut store, &name),
        ConfigAction::Set { key, value, name } => {
            set_config(&mut store, &prompter, &validator, &key, &value, name.as_deref()).await
        }
        ConfigAction::Get { key, name } => get_config(&store, &key, name.as_deref()),
        ConfigAction::List { name } => list_config(&store, name.as_deref()),
    }
}

pub async fn init_config(
    store: &mut ConfigStore,
    prompter: &dyn Prompter,
    validator: &dyn KeyValidator,
) -> CommandResult {
    if store.config_names().is_empty() {
        println!("Config file does not exist or contains no blocks. Creating default configuration.");

        let mut section = collect_required_fields(prompter, None)?;
        section.extend(collect_optional_fields(prompter)?);
        store.insert_section(DEFAULT_SECTION, section);
        handle_gemini_api_key_input(prompter, validator, store, DEFAULT_SECTION).await?;

        store.set_active_config_name(DEFAULT_SECTION);
        store.save()?;
        println!("Default configuration set and active.");
        return Ok(Outcome::Completed);
    }

    println!("Config file already exists. Adding a new configuration block.");
    let name = prompter.input("Enter a new config name")?.trim().to_string();
    if name.is_empty() || name == META_SECTION || store.has_section(&name) {
        return Err(JiazError::validation(format!(
            "Config name '{}' already exists. Please choose a different name.",
            name
        )));
    }

    let mut section: Section = collect_required_fields(prompter, Some(&*store))?;
    section.extend(collect_optional_fields(prompter)?);
    store.insert_section(&name, section);
    handle_gemini_api_key_input(prompter, validator, store, &name).await?;

    store.save()?;
    println!("New configuration block '{}' added.", name);
    store.prepend_warning()?;
    info!("Config written to {}", store.path().display());
    Ok(Outcome::Completed)
}

pub fn use_config(store: &mut ConfigStore, name: &str) -> CommandResult {
    if name == META_SECTION || !store.has_section(name) {
        return Ok(Outcome::Aborted(format!("Config '{}' not found.", name)));
    }

    store.set_active_config_name(name);
    store.save()?;
    println!("Active configuration set to '{}'.", name);
    Ok(Outcome::Completed)
}

pub async fn set_config(
    store: &mut ConfigStore,
    prompter: &dyn Prompter,
    validator: &dyn KeyValidator,
    key: &str,
    value: &str,
    name: Option<&str>,
) -> CommandResult {
    let active = store.active_config_name();
    let name = store.resolve_config_name(name);

    if name == META_SECTION {
        return Err(JiazError::validation(
            "Cannot modify 'meta' block. It is reserved for internal use.",
        ));
    }
    if !store.has_section(&name) {
        return Ok(Outcome::Aborted(format!(
            "Config '{}' not found. Use 'list' to view available configs.",
            name
        )));
    }
    // Blank values never reach the file.
    if value.trim().is_empty() {
        return Err(JiazError::validation(format!(
            "Value for '{}' cannot be empty.",
            key
        )));
    }

    let existing = store.get_value(&name, key).map(|old| display_value(key, old));
    let is_update = existing.is_some();

    if let (Some(old), true) = (&existing, name == active) {
        let prompt = format!(
            "You are updating key '{}' in active config block '{}' from '{}' to '{}'. Continue?",
            key, name, old, value
        );
        if !prompter.confirm(&prompt, false)? {
            return Err(JiazError::validation("Update aborted by user."));
        }
    }

    match key {
        USER_TOKEN_KEY => store.set_value(&name, key, &encode_secure_value(value)),
        GEMINI_API_KEY => {
            if !validator.validate(value).await {
                return Err(JiazError::validation("❌ Invalid Gemini API key. Not saving."));
            }
            let encoded = encode_secure_value(value);
            store.set_value(&name, key, &encoded);
            store.set_value(META_SECTION, key, &encoded);
            println!("✅ Gemini API key validated and saved.");
        }
        _ => store.set_value(&name, key, value),
    }

    store.save()?;
    println!(
        "{} in '{}': {}={}",
        if is_update { "Config updated" } else { "Config added" },
        name,
        key,
        value
    );
    Ok(Outcome::Completed)
}

pub fn get_config(store: &ConfigStore, key: &str, name: Option<&str>) -> CommandResult {
    let name = store.resolve_config_name(name);
    match store.get_value(&name, key) {
        Some(value) => println!("{}", display_value(key, value)),
        None => println!("Key '{}' not found in config '{}'.", key, name),
    }
    Ok(Outcome::Completed)
}

pub fn list_config(store: &ConfigStore, name: Option<&str>) -> CommandResult {
    if let Some(name) = name {
        let section = match store.section(name) {
            Ok(section) if name != META_SECTION => section,
            _ => return Ok(Outcome::Aborted(format!("Config '{}' not found.", name))),
        };
        println!("Configuration for '{}':", name);
        for (key, value) in section {
            println!("{} = {}", key, display_value(key, value));
        }
        return Ok(Outcome::Completed);
    }

    let names = store.config_names();
    if names.is_empty() {
        return Ok(Outcome::Aborted("No configuration found.".to_string()));
    }

    println!("Available configurations:");
    for name in names {
        println!("{}", name);
    }
    println!("\nActive configuration: {}", store.active_config_name());
    Ok(Outcome::Completed)
}
