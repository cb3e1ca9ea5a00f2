//! Loop configuration (layered: code > env > config file > defaults).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_loop::ToolExecutionMode;
use crate::conversation::ConversationManagerConfig;
use crate::error::OrbitError;

pub use crate::conversation::ConversationStrategy;

pub const DEFAULT_MAX_CYCLES: usize = 50;

const MAX_CYCLES_ENV: &str = "ORBIT_MAX_CYCLES";
const TOOL_EXECUTION_ENV: &str = "ORBIT_TOOL_EXECUTION";
const WINDOW_SIZE_ENV: &str = "ORBIT_WINDOW_SIZE";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings for the agent execution loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct LoopConfig {
    /// Model calls allowed per invocation before failing with
    /// [`OrbitError::MaxCyclesExceeded`].
    #[builder(default = DEFAULT_MAX_CYCLES)]
    pub max_cycles: usize,
    #[builder(default)]
    pub tool_execution: ToolExecutionMode,
    #[builder(default)]
    pub conversation: ConversationManagerConfig,
    #[builder(into)]
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            tool_execution: ToolExecutionMode::default(),
            conversation: ConversationManagerConfig::default(),
            system_prompt: None,
        }
    }
}

impl LoopConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, OrbitError> {
        toml::from_str(raw).map_err(|err| OrbitError::Configuration(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, OrbitError> {
        toml::to_string(self).map_err(|err| OrbitError::Configuration(err.to_string()))
    }

    /// Load a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, OrbitError> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        Self::from_toml_str(&raw)
    }

    /// Defaults, then `~/.orbit/config.toml`, then environment overrides
    /// (a `.env` file is honored).
    pub fn from_env() -> Result<Self, OrbitError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::load(&default_config_path())?.with_env_overrides()
    }

    /// Apply `ORBIT_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Result<Self, OrbitError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OrbitError> {
        if let Some(raw) = lookup(MAX_CYCLES_ENV) {
            self.max_cycles = parse_positive(MAX_CYCLES_ENV, &raw)?;
        }
        if let Some(raw) = lookup(TOOL_EXECUTION_ENV) {
            self.tool_execution = raw.trim().parse().map_err(|_| {
                OrbitError::Configuration(format!(
                    "{TOOL_EXECUTION_ENV} must be 'concurrent' or 'sequential', got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = lookup(WINDOW_SIZE_ENV) {
            self.conversation.window_size = parse_positive(WINDOW_SIZE_ENV, &raw)?;
        }
        Ok(self)
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, OrbitError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(OrbitError::Configuration(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}

/// `~/.orbit/config.toml`, or `.orbit/config.toml` when no home directory
/// can be determined.
pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".orbit"))
        .unwrap_or_else(|| PathBuf::from(".orbit"))
        .join(CONFIG_FILE_NAME)
}
