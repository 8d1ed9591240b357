//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `ATTEND_CONFIG` environment variable
//! 3. User config directory (`~/.config/attend/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! A missing file is not an error: a warning is logged and compiled defaults
//! are used. A file that exists but cannot be parsed is an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::time::millis_to_duration;
use crate::types::SubjectType;
use crate::{Error, Result};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ATTEND_CONFIG";

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_DEBOUNCE_MS: u64 = 350;
pub const DEFAULT_EXPIRY_MINUTES: u32 = 10;

/// Complete bootstrap configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub backend: BackendConfig,
    pub scan: ScanConfig,
    pub lookup: LookupConfig,
    pub session: SessionConfig,
    pub vocabulary: VocabularyConfig,
    pub logging: LoggingConfig,
}

/// Attendance and directory backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Bearer token sent with every request (optional)
    pub api_token: Option<String>,
    /// Active campus; submissions are blocked while unset
    pub campus_id: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_token: None,
            campus_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Native detector poll interval
    pub poll_interval_ms: u64,
    /// Subject type assumed when a scanned code does not name one
    pub default_subject: SubjectType,
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        millis_to_duration(self.poll_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_subject: SubjectType::Student,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub debounce_ms: u64,
}

impl LookupConfig {
    /// Quiet period after the last keystroke before a directory search
    pub fn debounce(&self) -> Duration {
        millis_to_duration(self.debounce_ms)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime used when a request gives none, or a non-positive one
    pub default_expiry_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_expiry_minutes: DEFAULT_EXPIRY_MINUTES,
        }
    }
}

/// Role tokens accepted by the labeled and short payload grammars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub student: Vec<String>,
    pub staff: Vec<String>,
    pub short_student: Vec<String>,
    pub short_staff: Vec<String>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            student: vec!["student".to_string()],
            staff: vec![
                "teacher".to_string(),
                "staff".to_string(),
                "employee".to_string(),
            ],
            short_student: vec!["S".to_string()],
            short_staff: vec!["T".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Config file path resolution
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve which config file to read, if any
    ///
    /// Returns the path together with whether it was named explicitly
    /// (CLI or environment). Explicitly named files must exist.
    pub fn resolve(&self) -> Option<(PathBuf, bool)> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some((path.clone(), true));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), true));
            }
        }

        // Priority 3: User config directory
        let user_config = default_config_path()?;
        if user_config.exists() {
            Some((user_config, false))
        } else {
            None
        }
    }

    /// Load the resolved config, falling back to compiled defaults
    pub fn load(&self) -> Result<TomlConfig> {
        let config = match self.resolve() {
            Some((path, explicit)) => {
                if path.exists() {
                    info!("Loading config from {}", path.display());
                    TomlConfig::from_file(&path)?
                } else if explicit {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                } else {
                    warn!("Config file {} vanished, using defaults", path.display());
                    TomlConfig::default()
                }
            }
            None => {
                warn!("No config file found, using compiled defaults");
                TomlConfig::default()
            }
        };

        config.validated()
    }
}

/// Platform config file location (`<config dir>/attend/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("attend").join("config.toml"))
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Replace unusable values with defaults and reject empty vocabularies
    pub fn validated(mut self) -> Result<Self> {
        if self.scan.poll_interval_ms == 0 {
            warn!(
                "scan.poll_interval_ms = 0 is not usable, using {}",
                DEFAULT_POLL_INTERVAL_MS
            );
            self.scan.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.lookup.debounce_ms == 0 {
            warn!(
                "lookup.debounce_ms = 0 is not usable, using {}",
                DEFAULT_DEBOUNCE_MS
            );
            self.lookup.debounce_ms = DEFAULT_DEBOUNCE_MS;
        }
        if self.session.default_expiry_minutes == 0 {
            warn!(
                "session.default_expiry_minutes = 0 is not usable, using {}",
                DEFAULT_EXPIRY_MINUTES
            );
            self.session.default_expiry_minutes = DEFAULT_EXPIRY_MINUTES;
        }
        if self.backend.timeout_secs == 0 {
            self.backend.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }

        let vocab = &self.vocabulary;
        for (name, tokens) in [
            ("student", &vocab.student),
            ("staff", &vocab.staff),
            ("short_student", &vocab.short_student),
            ("short_staff", &vocab.short_staff),
        ] {
            if tokens.iter().all(|t| t.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "vocabulary.{} must name at least one token",
                    name
                )));
            }
        }

        Ok(self)
    }
}
