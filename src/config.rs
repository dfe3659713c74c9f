//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rollcall.toml` files.

use crate::analysis::MAX_WINDOW_DAYS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".rollcall.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Record store API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Narrative report settings.
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Statistics settings.
    #[serde(default)]
    pub stats: StatsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default export file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of attendance writes in flight during class marking.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "attendance_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Record store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the record store API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_api_timeout(),
            token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

/// LLM settings for narrative reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_narrative_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_narrative_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_narrative_timeout() -> u64 {
    300
}

/// Statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Length of the trailing daily series.
    #[serde(default = "default_window_days")]
    pub window_days: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

fn default_window_days() -> usize {
    7
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.rollcall.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment variables) take precedence, but
    /// only when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(ref token) = args.token {
            self.api.token = Some(token.clone());
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(ref url) = args.ollama_url {
            self.narrative.ollama_url = url.clone();
        }
        if let Some(ref model) = args.model {
            self.narrative.model = model.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check the merged settings. File values get the same checks as flags.
    pub fn validate(&self) -> Result<(), String> {
        check_url("API URL", &self.api.base_url)?;
        check_url("Ollama URL", &self.narrative.ollama_url)?;
        check_timeout(self.api.timeout_seconds)?;
        check_timeout(self.narrative.timeout_seconds)?;
        check_concurrency(self.general.concurrency)?;
        check_window_days(self.stats.window_days)?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

pub fn check_url(label: &str, url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("{} must start with 'http://' or 'https://'", label))
    }
}

pub fn check_timeout(seconds: u64) -> Result<(), String> {
    if seconds == 0 {
        return Err("Timeout must be at least 1 second".to_string());
    }
    Ok(())
}

pub fn check_concurrency(concurrency: usize) -> Result<(), String> {
    if concurrency == 0 {
        return Err("Concurrency must be at least 1".to_string());
    }
    Ok(())
}

pub fn check_window_days(days: usize) -> Result<(), String> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(format!("Days must be between 1 and {}", MAX_WINDOW_DAYS));
    }
    Ok(())
}
