//! Settings: backend choice, model, credential and corpus locations.
//!
//! Loading flow:
//! 1. Start with [`Settings::default()`]
//! 2. If `~/.dishrag/settings.json` exists, its fields override the defaults
//! 3. `DISHRAG_*` environment variables override both
//!
//! The record is flat, so fields missing from the file keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{CoreError, Result};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "deepseek-r1:7b";

/// Hosted provider used when nothing else is configured.
pub const DEFAULT_HOSTED_PROVIDER: &str = "openai";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Talk to the local model server instead of the hosted API.
    pub use_local_backend: bool,
    pub model_id: String,
    /// Credential for the hosted API. Unused by the local backend.
    pub api_key: Option<String>,
    /// Only corpus paths starting with this prefix are used as context.
    pub corpus_root_filter: String,
    /// Prefix of the rules document path; `rules.md` is appended verbatim.
    pub rules_directory: String,
    /// Which OpenAI-shaped hosted API to call ("openai", "deepseek", "groq", "mistral").
    pub hosted_provider: String,
    pub local_base_url: Option<String>,
    pub hosted_base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_local_backend: true,
            model_id: DEFAULT_MODEL.to_string(),
            api_key: None,
            corpus_root_filter: String::new(),
            rules_directory: String::new(),
            hosted_provider: DEFAULT_HOSTED_PROVIDER.to_string(),
            local_base_url: None,
            hosted_base_url: None,
        }
    }
}

impl Settings {
    /// Whether a non-empty API key is set.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// A model is chosen, and the hosted backend has a key.
    pub fn is_configured(&self) -> bool {
        !self.model_id.is_empty() && (self.use_local_backend || self.has_api_key())
    }

    /// View that is safe to hand to a host: the key is reported only as present or not.
    pub fn masked(&self) -> MaskedSettings {
        MaskedSettings {
            use_local_backend: self.use_local_backend,
            model_id: self.model_id.clone(),
            has_key: self.has_api_key(),
            corpus_root_filter: self.corpus_root_filter.clone(),
            rules_directory: self.rules_directory.clone(),
            hosted_provider: self.hosted_provider.clone(),
            local_base_url: self.local_base_url.clone(),
            hosted_base_url: self.hosted_base_url.clone(),
            configured: self.is_configured(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaskedSettings {
    pub use_local_backend: bool,
    pub model_id: String,
    pub has_key: bool,
    pub corpus_root_filter: String,
    pub rules_directory: String,
    pub hosted_provider: String,
    pub local_base_url: Option<String>,
    pub hosted_base_url: Option<String>,
    pub configured: bool,
}

/// Explicit settings update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    /// Use the local model server (true) or the hosted API (false)
    pub use_local_backend: Option<bool>,
    /// Model identifier, e.g. "deepseek-r1:7b" or "gpt-4o-mini"
    pub model_id: Option<String>,
    /// API key for the hosted backend. An empty string clears the stored key.
    pub api_key: Option<String>,
    /// Corpus path prefix to draw context from. Empty means the whole corpus.
    pub corpus_root_filter: Option<String>,
    /// Prefix of the rules document path; "rules.md" is appended verbatim
    pub rules_directory: Option<String>,
    /// Hosted provider: "openai", "deepseek", "groq" or "mistral"
    pub hosted_provider: Option<String>,
    /// Local model server URL. An empty string restores the default.
    pub local_base_url: Option<String>,
    /// Hosted chat-completions root for any provider, e.g. "http://localhost:8080/v1".
    /// An empty string restores the provider default.
    pub hosted_base_url: Option<String>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.use_local_backend {
            settings.use_local_backend = v;
        }
        if let Some(v) = self.model_id {
            settings.model_id = v;
        }
        if let Some(v) = self.api_key {
            settings.api_key = non_empty(v);
        }
        if let Some(v) = self.corpus_root_filter {
            settings.corpus_root_filter = v;
        }
        if let Some(v) = self.rules_directory {
            settings.rules_directory = v;
        }
        if let Some(v) = self.hosted_provider {
            settings.hosted_provider = v;
        }
        if let Some(v) = self.local_base_url {
            settings.local_base_url = non_empty(v);
        }
        if let Some(v) = self.hosted_base_url {
            settings.hosted_base_url = non_empty(v);
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    (!v.is_empty()).then_some(v)
}

// --- Storage ---

/// Resolve the dishrag data directory (~/.dishrag/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dishrag")
}

pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, taking overrides from `lookup` instead of the process environment.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = read_settings_file(path)?;
    apply_overrides_from(&mut settings, lookup);
    Ok(settings)
}

/// The file layer alone: defaults plus whatever `path` holds, without env overrides.
///
/// This is what an update should patch and persist, so overrides never leak into the file.
pub fn read_settings_file(path: &Path) -> Result<Settings> {
    if path.exists() {
        debug!(?path, "loading settings from file");
        let raw = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    } else {
        debug!(?path, "settings file not found, using defaults");
        Ok(Settings::default())
    }
}

pub fn write_settings(settings: &Settings) -> Result<()> {
    write_settings_to_path(&settings_path(), settings)
}

/// Write settings through a temp file and rename, so readers never see a half-written file.
pub fn write_settings_to_path(path: &Path, settings: &Settings) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
    let json = serde_json::to_string_pretty(settings)?;
    let tmp = dir.join(".settings.json.tmp");
    fs::write(&tmp, json).map_err(|e| CoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
}

// --- Environment overrides ---

/// Apply overrides from an arbitrary variable source. Empty values are ignored.
pub fn apply_overrides_from(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("DISHRAG_USE_LOCAL") {
        match parse_bool(&v) {
            Some(b) => settings.use_local_backend = b,
            None => warn!(key = "DISHRAG_USE_LOCAL", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("DISHRAG_MODEL") {
        settings.model_id = v;
    }
    if let Some(v) = read("DISHRAG_API_KEY") {
        settings.api_key = Some(v);
    }
    if let Some(v) = read("DISHRAG_PROVIDER") {
        settings.hosted_provider = v;
    }
    if let Some(v) = read("DISHRAG_CORPUS_FILTER") {
        settings.corpus_root_filter = v;
    }
    if let Some(v) = read("DISHRAG_RULES_DIR") {
        settings.rules_directory = v;
    }
    if let Some(v) = read("DISHRAG_LOCAL_URL") {
        settings.local_base_url = Some(v);
    }
    if let Some(v) = read("DISHRAG_HOSTED_URL") {
        settings.hosted_base_url = Some(v);
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert!(s.use_local_backend);
        assert_eq!(s.model_id, "deepseek-r1:7b");
        assert_eq!(s.api_key, None);
        assert_eq!(s.corpus_root_filter, "");
        assert_eq!(s.rules_directory, "");
        assert_eq!(s.hosted_provider, "openai");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"modelId":"llama3.2","rulesDirectory":"Projects/"}"#).unwrap();

        let s = load_settings_with(&path, |_| None).unwrap();
        assert_eq!(s.model_id, "llama3.2");
        assert_eq!(s.rules_directory, "Projects/");
        assert!(s.use_local_backend);
        assert_eq!(s.hosted_provider, "openai");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let s = load_settings_with(&tmp.path().join("absent.json"), |_| None).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_with(&path, |_| None),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn write_then_load_preserves_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let settings = Settings {
            use_local_backend: false,
            model_id: "gpt-4o-mini".into(),
            api_key: Some("sk-test".into()),
            corpus_root_filter: "Projects/".into(),
            ..Settings::default()
        };
        write_settings_to_path(&path, &settings).unwrap();
        assert!(!path.parent().unwrap().join(".settings.json.tmp").exists());

        let back = load_settings_with(&path, |_| None).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env = vars(&[
            ("DISHRAG_USE_LOCAL", "off"),
            ("DISHRAG_MODEL", "m2"),
            ("DISHRAG_API_KEY", "sk-env"),
            ("DISHRAG_RULES_DIR", "Projects/dishrag/"),
            ("DISHRAG_CORPUS_FILTER", ""),
        ]);
        let mut s = Settings {
            corpus_root_filter: "Notes/".into(),
            ..Settings::default()
        };
        apply_overrides_from(&mut s, |k| env.get(k).cloned());
        assert!(!s.use_local_backend);
        assert_eq!(s.model_id, "m2");
        assert_eq!(s.api_key.as_deref(), Some("sk-env"));
        assert_eq!(s.rules_directory, "Projects/dishrag/");
        // empty values are ignored
        assert_eq!(s.corpus_root_filter, "Notes/");
    }

    #[test]
    fn invalid_bool_override_is_ignored() {
        let env = vars(&[("DISHRAG_USE_LOCAL", "maybe")]);
        let mut s = Settings::default();
        apply_overrides_from(&mut s, |k| env.get(k).cloned());
        assert!(s.use_local_backend);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let mut s = Settings::default();
        SettingsPatch {
            model_id: Some("m1".into()),
            api_key: Some("sk-1".into()),
            ..Default::default()
        }
        .apply(&mut s);
        assert_eq!(s.model_id, "m1");
        assert_eq!(s.api_key.as_deref(), Some("sk-1"));
        assert!(s.use_local_backend);

        SettingsPatch {
            api_key: Some(String::new()),
            ..Default::default()
        }
        .apply(&mut s);
        assert_eq!(s.api_key, None);
        assert_eq!(s.model_id, "m1");
    }

    #[test]
    fn hosted_backend_needs_a_key_to_be_configured() {
        let mut s = Settings {
            use_local_backend: false,
            ..Settings::default()
        };
        assert!(!s.is_configured());
        s.api_key = Some("   ".into());
        assert!(!s.is_configured());
        s.api_key = Some("sk".into());
        assert!(s.is_configured());
        assert!(Settings::default().is_configured());
    }

    #[test]
    fn masked_view_never_contains_the_key() {
        let s = Settings {
            api_key: Some("sk-secret".into()),
            ..Settings::default()
        };
        let json = serde_json::to_string(&s.masked()).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"hasKey\":true"));
    }
}
