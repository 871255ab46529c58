use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "llama3.2:latest";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:3000";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxy server settings
    pub server: ServerConfig,

    /// Upstream inference service
    pub ollama: OllamaConfig,

    /// Chat client settings
    pub client: ClientConfig,

    /// UI preferences
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where `POST /api/ollama` is served
    pub proxy_url: String,
    /// Model given to the first conversation
    pub default_model: String,
    /// Suggested models offered by the model picker
    pub models: Vec<ModelChoice>,
}

/// A suggested model: display label plus the identifier sent upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    pub label: String,
    pub id: String,
}

impl ModelChoice {
    fn new(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            id: id.to_string(),
        }
    }
}

/// UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Syntax highlighting theme for code blocks
    pub theme: String,
    /// Tallest the composer may grow, borders included
    pub composer_max_height: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            models: vec![
                ModelChoice::new("Llama 3", DEFAULT_MODEL),
                ModelChoice::new("Gemma", "gemma"),
                ModelChoice::new("Mistral", "mistral"),
                ModelChoice::new("Code Llama", "codellama"),
                ModelChoice::new("Phi 3", "phi3"),
            ],
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_string(),
            composer_max_height: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            ollama: OllamaConfig::default(),
            client: ClientConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.ullama/config.toml`, then apply environment overrides
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Apply `OLLAMA_HOST`, `ULLAMA_BIND`, `ULLAMA_PROXY_URL` and `ULLAMA_DEFAULT_MODEL`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama.base_url = normalize_ollama_host(&host);
        }
        if let Some(bind) = lookup("ULLAMA_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = lookup("ULLAMA_PROXY_URL") {
            self.client.proxy_url = url;
        }
        if let Some(model) = lookup("ULLAMA_DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                self.client.default_model = model;
            }
        }
    }

    /// Ullama home directory
    pub fn home_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ullama"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::home_dir().map(|dir| dir.join("config.toml"))
    }

    /// Label for a model id, falling back to the id itself
    pub fn model_label<'a>(&'a self, id: &'a str) -> &'a str {
        self.client
            .models
            .iter()
            .find(|choice| choice.id == id)
            .map(|choice| choice.label.as_str())
            .unwrap_or(id)
    }

    /// The suggestion after `current`, wrapping; the first one if `current` is not listed
    pub fn next_model(&self, current: &str) -> Option<&str> {
        let models = &self.client.models;
        if models.is_empty() {
            return None;
        }
        let next = match models.iter().position(|choice| choice.id == current) {
            Some(index) => (index + 1) % models.len(),
            None => 0,
        };
        Some(models[next].id.as_str())
    }
}

/// `OLLAMA_HOST` is often given without a scheme (`localhost:11434`)
pub fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
