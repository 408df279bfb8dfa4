use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    /// Used instead of `model` for requests that carry images. Unset means one model throughout.
    pub vision_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub enrichment_url: Option<String>,
    pub enrichment_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: None,
            max_tokens: 1000,
            temperature: 0.7,
            request_timeout_secs: 60,
            enrichment_url: None,
            enrichment_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Directory holding `config.json`, e.g. `~/.config/aegis-doctor`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("aegis-doctor"))
    }

    pub fn load(app_data: &Path) -> Self {
        let config_path = app_data.join("config.json");
        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    log::warn!("Ignoring malformed {}: {}", config_path.display(), e);
                    Self::default()
                }),
                Err(_) => Self::default(),
            }
        } else {
            let c = Self::default();
            c.save(app_data);
            c
        };

        config.apply_env_overrides();
        log::info!(
            "Loaded config (model: {}, API key: {})",
            config.model,
            if config.has_api_key() { "present" } else { "not found" }
        );
        config
    }

    pub fn save(&self, app_data: &Path) {
        if let Err(e) = std::fs::create_dir_all(app_data) {
            log::warn!("Could not create {}: {}", app_data.display(), e);
            return;
        }
        let config_path = app_data.join("config.json");
        if let Ok(content) = serde_json::to_string_pretty(self) {
            std::fs::write(config_path, content).ok();
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("AEGIS_API_URL") {
            if !url.trim().is_empty() {
                self.api_url = url.trim().to_string();
            }
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs.max(1))
    }
}
