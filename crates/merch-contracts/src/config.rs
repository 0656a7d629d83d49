use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{StudioError, StudioResult};
use crate::storage::{read_json_or_default, with_file_lock, write_json_atomic};

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

const SECRET_KEYS: [&str; 3] = ["openai_api_key", "gemini_api_key", "vector_api_key"];
const MASK: &str = "••••";

/// Contents of `config.json`. Keys the studio does not know are carried in `extra`
/// so an admin save never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_chat_model: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub vector_api_key: String,
    pub openai_api_base: String,
    pub gemini_api_base: String,
    pub request_timeout_secs: u64,
    pub default_provider: String,
    pub image_quality: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: "gpt-image-1".to_string(),
            openai_chat_model: "gpt-4o-mini".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash-image-preview".to_string(),
            vector_api_key: String::new(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_provider: "openai".to_string(),
            image_quality: "high".to_string(),
            extra: Map::new(),
        }
    }
}

impl StudioConfig {
    /// OpenAI key from the config file, then `OPENAI_API_KEY`.
    pub fn openai_key(&self) -> Option<String> {
        non_empty(&self.openai_api_key).or_else(|| non_empty_env("OPENAI_API_KEY"))
    }

    /// Gemini key from the config file, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn gemini_key(&self) -> Option<String> {
        non_empty(&self.gemini_api_key)
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            return Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        }
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Copy safe to show on the admin settings page.
    pub fn masked(&self) -> Self {
        let mut out = self.clone();
        out.openai_api_key = mask_secret(&self.openai_api_key);
        out.gemini_api_key = mask_secret(&self.gemini_api_key);
        out.vector_api_key = mask_secret(&self.vector_api_key);
        out
    }

    /// Applies a submitted settings form. Blank fields are treated as absent and left
    /// untouched, as are secrets sent back in their masked form. Returns the keys
    /// that changed.
    pub fn apply_form(&mut self, form: &HashMap<String, String>) -> StudioResult<Vec<String>> {
        let mut changed = Vec::new();
        for (key, raw) in form {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            if SECRET_KEYS.contains(&key.as_str()) && self.is_masked_secret(key, value) {
                continue;
            }
            let slot = match key.as_str() {
                "openai_api_key" => &mut self.openai_api_key,
                "openai_model" => &mut self.openai_model,
                "openai_chat_model" => &mut self.openai_chat_model,
                "gemini_api_key" => &mut self.gemini_api_key,
                "gemini_model" => &mut self.gemini_model,
                "vector_api_key" => &mut self.vector_api_key,
                "openai_api_base" => &mut self.openai_api_base,
                "gemini_api_base" => &mut self.gemini_api_base,
                "image_quality" => &mut self.image_quality,
                "default_provider" => {
                    if !matches!(value, "openai" | "gemini" | "dryrun") {
                        return Err(StudioError::validation(format!(
                            "Unknown provider '{value}'."
                        )));
                    }
                    &mut self.default_provider
                }
                "request_timeout_secs" => {
                    let secs = value
                        .parse::<u64>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| {
                            StudioError::validation(
                                "Request timeout must be a positive number of seconds.",
                            )
                        })?;
                    if secs != self.request_timeout_secs {
                        self.request_timeout_secs = secs;
                        changed.push(key.clone());
                    }
                    continue;
                }
                _ => continue,
            };
            if slot.as_str() != value {
                *slot = value.to_string();
                changed.push(key.clone());
            }
        }
        changed.sort();
        Ok(changed)
    }

    fn is_masked_secret(&self, key: &str, value: &str) -> bool {
        let current = match key {
            "openai_api_key" => &self.openai_api_key,
            "gemini_api_key" => &self.gemini_api_key,
            "vector_api_key" => &self.vector_api_key,
            _ => return false,
        };
        value.starts_with(MASK) || value == mask_secret(current)
    }
}

/// `config.json` on disk; read once per request so admin edits apply immediately.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StudioResult<StudioConfig> {
        read_json_or_default(&self.path)
            .map_err(|err| StudioError::storage("Failed to read settings", &err))
    }

    pub fn update(&self, form: &HashMap<String, String>) -> StudioResult<Vec<String>> {
        let mut outcome = Ok(Vec::new());
        with_file_lock(&self.path, || {
            let mut config: StudioConfig = read_json_or_default(&self.path)?;
            outcome = config.apply_form(form);
            if matches!(&outcome, Ok(changed) if !changed.is_empty()) {
                write_json_atomic(&self.path, &config)?;
            }
            Ok(())
        })
        .map_err(|err| StudioError::storage("Failed to save settings", &err))?;
        outcome
    }
}

pub fn mask_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let tail: String = trimmed
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    format!("{MASK}{tail}")
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim().to_string()).filter(|value| !value.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
