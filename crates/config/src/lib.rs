//! Configuration loading, validation, and management for Yips.
//!
//! Loads configuration from `~/.yips/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use yips_core::TurnConfig;

/// The root configuration structure.
///
/// Maps directly to `~/.yips/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Assistant backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Turn limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Workspace boundary and file-mutation settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// How confirm-level actions are resolved
    #[serde(default)]
    pub approval: ApprovalConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// OpenAI-compatible base URL (llama.cpp server, Ollama, ...)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Stream replies to the terminal in interactive mode
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/v1".into()
}
fn default_model() -> String {
    "local".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_request_timeout(),
            stream: true,
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default = "default_subagent_max_rounds")]
    pub subagent_max_rounds: u32,

    #[serde(default = "default_max_subagent_depth")]
    pub max_subagent_depth: u32,

    #[serde(default = "default_true")]
    pub enable_subagents: bool,
}

fn default_max_rounds() -> u32 {
    TurnConfig::default().max_rounds
}
fn default_subagent_max_rounds() -> u32 {
    TurnConfig::default().subagent_max_rounds
}
fn default_max_subagent_depth() -> u32 {
    TurnConfig::default().max_subagent_depth
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            subagent_max_rounds: default_subagent_max_rounds(),
            max_subagent_depth: default_max_subagent_depth(),
            enable_subagents: true,
        }
    }
}

impl AgentConfig {
    /// Turn limits for the agent loop.
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            max_rounds: self.max_rounds,
            subagent_max_rounds: self.subagent_max_rounds,
            max_subagent_depth: self.max_subagent_depth,
            ..TurnConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root; defaults to the current directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Path prefixes no tool may write to
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// Lifetime of a previewed change before it can no longer be applied
    #[serde(default = "default_staged_change_ttl")]
    pub staged_change_ttl_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Project context file (relative to the root) injected into top-level requests
    #[serde(default = "default_project_context_file")]
    pub project_context_file: String,
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "/dev".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}
fn default_staged_change_ttl() -> u64 {
    600
}
fn default_command_timeout() -> u64 {
    30
}
fn default_project_context_file() -> String {
    "YIPS.md".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            forbidden_paths: default_forbidden_paths(),
            staged_change_ttl_secs: default_staged_change_ttl(),
            command_timeout_secs: default_command_timeout(),
            project_context_file: default_project_context_file(),
        }
    }
}

impl WorkspaceConfig {
    /// The configured root, or the current directory.
    pub fn resolve_root(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// How confirm-level actions are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask on the terminal (interactive sessions only)
    #[default]
    Prompt,
    /// Refuse everything that needs confirmation
    Deny,
    /// Approve everything that needs confirmation
    Allow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub mode: ApprovalMode,
}

impl AppConfig {
    /// Load configuration from the default path (~/.yips/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `YIPS_BASE_URL`
    /// - `YIPS_MODEL`
    /// - `YIPS_API_KEY`
    /// - `YIPS_WORKSPACE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("YIPS_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = var("YIPS_MODEL") {
            self.backend.model = model;
        }
        if let Some(key) = var("YIPS_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(root) = var("YIPS_WORKSPACE") {
            self.workspace.root = Some(PathBuf::from(root));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".yips")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.temperature < 0.0 || self.backend.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "backend.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_rounds == 0 || self.agent.subagent_max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent round limits must be at least 1".into(),
            ));
        }
        if self.workspace.staged_change_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "workspace.staged_change_ttl_secs must be > 0".into(),
            ));
        }
        if self.workspace.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "workspace.command_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML (for `yips config`).
    /// The API key is redacted.
    pub fn to_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.backend.api_key.is_some() {
            shown.backend.api_key = Some(redact(&self.backend.api_key).into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
