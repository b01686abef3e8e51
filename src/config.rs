use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::JiazError;

/// Key/value pairs of a single configuration block.
pub type Section = BTreeMap<String, String>;

pub const META_SECTION: &str = "meta";
pub const DEFAULT_SECTION: &str = "default";
pub const ACTIVE_CONFIG_KEY: &str = "active_config";

pub const SERVER_URL_KEY: &str = "server_url";
pub const USER_TOKEN_KEY: &str = "user_token";
pub const GEMINI_API_KEY: &str = "gemini_api_key";

/// Keys stored base64-encoded on disk.
pub const SECURE_KEYS: [&str; 2] = [USER_TOKEN_KEY, GEMINI_API_KEY];

pub const OPTIONAL_KEYS: [&str; 5] = [
    "jira_project",
    "jira_backlog_name",
    "jira_sprintboard_name",
    "jira_sprintboard_id",
    "jira_board_name",
];

const CONFIG_WARNING: &str = "# WARNING: Do not edit this config file manually. \n\
# Any manual changes may cause commands to behave improperly. \n\
# If manually edited & code malfunctions, \n\
# you will need to run 'jiaz config init' again after deleting this file.\n";

/// The sectioned configuration file.
///
/// Every block except [`META_SECTION`] is a named tracker configuration.
/// `meta` holds the active block name and the shared LLM key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    path: PathBuf,
    sections: BTreeMap<String, Section>,
    has_warning: bool,
}

impl ConfigStore {
    /// Load the store from `~/.jiaz/config.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::get_config_path())
    }

    /// Load the store from an arbitrary path. A missing file yields an empty store.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = ConfigStore {
            path,
            sections: BTreeMap::new(),
            has_warning: false,
        };

        if !store.path.exists() {
            debug!("No config file at {}", store.path.display());
            return Ok(store);
        }

        let contents = fs::read_to_string(&store.path)
            .with_context(|| format!("Failed to read config file {}", store.path.display()))?;
        store.has_warning = contents.starts_with("# WARNING");
        store.sections = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", store.path.display()))?;

        if store.remove_blank_values() {
            debug!("Removed blank values from {}", store.path.display());
            store.save()?;
        }

        Ok(store)
    }

    /// Write every section back to disk, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let body = toml::to_string_pretty(&self.sections).context("Failed to serialize config")?;
        let contents = if self.has_warning {
            format!("{}\n{}", CONFIG_WARNING, body)
        } else {
            body
        };

        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write config file {}", self.path.display()))?;
        Ok(())
    }

    /// Put the do-not-edit banner on top of the file and persist it.
    pub fn prepend_warning(&mut self) -> Result<()> {
        self.has_warning = true;
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_config_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".jiaz");
        path.push("config.toml");
        path
    }

    fn remove_blank_values(&mut self) -> bool {
        let mut removed = false;
        for section in self.sections.values_mut() {
            let before = section.len();
            section.retain(|_, value| !value.trim().is_empty());
            removed |= section.len() != before;
        }
        removed
    }

    /// Names of all configuration blocks, `meta` excluded.
    pub fn config_names(&self) -> Vec<&str> {
        self.sections
            .keys()
            .map(String::as_str)
            .filter(|name| *name != META_SECTION)
            .collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section(&self, name: &str) -> Result<&Section, JiazError> {
        self.sections
            .get(name)
            .ok_or_else(|| JiazError::ConfigNotFound(name.to_string()))
    }

    pub fn insert_section(&mut self, name: &str, section: Section) {
        self.sections.insert(name.to_string(), section);
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }

    pub fn set_value(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// `meta.active_config`, falling back to `"default"`.
    pub fn active_config_name(&self) -> String {
        self.get_value(META_SECTION, ACTIVE_CONFIG_KEY)
            .unwrap_or(DEFAULT_SECTION)
            .to_string()
    }

    pub fn set_active_config_name(&mut self, name: &str) {
        self.set_value(META_SECTION, ACTIVE_CONFIG_KEY, name);
    }

    /// The explicitly requested block, or the active one.
    pub fn resolve_config_name(&self, explicit: Option<&str>) -> String {
        match explicit.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => self.active_config_name(),
        }
    }

    /// Decoded Gemini key from `meta`, then from the active block.
    pub fn gemini_api_key(&self) -> Option<String> {
        let active = self.active_config_name();
        let key = [META_SECTION, active.as_str()]
            .into_iter()
            .filter_map(|section| self.get_value(section, GEMINI_API_KEY))
            .find_map(|encoded| match decode_secure_value(encoded) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                Ok(_) => None,
                Err(e) => {
                    warn!("Ignoring undecodable Gemini API key: {}", e);
                    None
                }
            });
        key
    }
}

pub fn is_secure_key(key: &str) -> bool {
    SECURE_KEYS.contains(&key)
}

/// Reversible base64 obfuscation. This is not encryption.
pub fn encode_secure_value(value: &str) -> String {
    general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn decode_secure_value(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .context("Stored value is not valid base64")?;
    String::from_utf8(bytes).context("Stored value is not valid UTF-8")
}

/// Value as shown to the user: secure keys are decoded.
pub fn display_value(key: &str, value: &str) -> String {
    if is_secure_key(key) {
        decode_secure_value(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::load_from(dir.path().join(".jiaz").join("config.toml")).unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.config_names().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_value("default", SERVER_URL_KEY, "https://jira.example.com");
        store.set_value("default", USER_TOKEN_KEY, &encode_secure_value("tok"));
        store.set_active_config_name("default");
        store.save().unwrap();

        let reloaded = store_in(&dir);
        assert_eq!(reloaded, store);
        assert_eq!(reloaded.config_names(), vec!["default"]);
    }

    #[test]
    fn test_blank_values_are_removed_and_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[default]\nserver_url = \"https://x\"\njira_project = \"   \"\n",
        )
        .unwrap();

        let store = ConfigStore::load_from(&path).unwrap();
        assert_eq!(store.get_value("default", "jira_project"), None);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("jira_project"));
    }

    #[test]
    fn test_active_config_defaults_to_default() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert_eq!(store.active_config_name(), "default");

        store.set_active_config_name("work");
        assert_eq!(store.active_config_name(), "work");
        assert!(store.has_section(META_SECTION));
    }

    #[test]
    fn test_meta_is_not_a_config_name() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_active_config_name("default");
        store.set_value("default", SERVER_URL_KEY, "https://x");
        assert_eq!(store.config_names(), vec!["default"]);
    }

    #[test]
    fn test_missing_section_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        match store.section("nope") {
            Err(JiazError::ConfigNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_secure_value_round_trip() {
        for value in ["", "token", "p@ss:w0rd/+=", "ünïcødé ✓", "line\nbreak"] {
            let encoded = encode_secure_value(value);
            assert_eq!(decode_secure_value(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_secure_value("not base64 !!").is_err());
    }

    #[test]
    fn test_gemini_key_prefers_meta() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_value("default", GEMINI_API_KEY, &encode_secure_value("section-key"));
        assert_eq!(store.gemini_api_key().as_deref(), Some("section-key"));

        store.set_value(META_SECTION, GEMINI_API_KEY, &encode_secure_value("meta-key"));
        assert_eq!(store.gemini_api_key().as_deref(), Some("meta-key"));
    }

    #[test]
    fn test_warning_banner_survives_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_value("default", SERVER_URL_KEY, "https://x");
        store.prepend_warning().unwrap();

        let on_disk = fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.starts_with("# WARNING: Do not edit this config file manually."));

        let mut reloaded = store_in(&dir);
        reloaded.set_value("default", "jira_project", "PROJ");
        reloaded.save().unwrap();
        let on_disk = fs::read_to_string(reloaded.path()).unwrap();
        assert_eq!(on_disk.matches("# WARNING").count(), 1);
    }

    #[test]
    fn test_resolve_config_name() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.set_active_config_name("work");
        assert_eq!(store.resolve_config_name(None), "work");
        assert_eq!(store.resolve_config_name(Some("  ")), "work");
        assert_eq!(store.resolve_config_name(Some(" home ")), "home");
    }

    #[test]
    fn test_display_value_decodes_secure_keys() {
        let encoded = encode_secure_value("secret");
        assert_eq!(display_value(USER_TOKEN_KEY, &encoded), "secret");
        assert_eq!(display_value("jira_project", "PROJ"), "PROJ");
    }
}
