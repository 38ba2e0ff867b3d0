//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the data root folder
pub const ROOT_ENV_VAR: &str = "ECHOVERSE_ROOT";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ECHOVERSE_CONFIG";

/// Upper bound accepted for `max_recording_secs`
pub const MAX_RECORDING_CEILING_SECS: u32 = 600;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "echoverse.db";

/// Blob directory name inside the root folder
pub const BLOBS_DIR: &str = "blobs";

/// Service configuration read from `config.toml`.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Data root holding the database and blobs; resolved separately when unset
    pub root_folder: Option<PathBuf>,
    pub bind_addr: String,
    /// Base used to build public blob URLs; derived from `bind_addr` when unset
    pub public_base_url: Option<String>,
    /// Recording ceiling in seconds
    pub max_recording_secs: u32,
    pub reconcile_interval_secs: u64,
    /// Deadline applied to every Auth/Record/Blob store call
    pub request_timeout_ms: u64,
    pub session_ttl_hours: i64,
    pub event_bus_capacity: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_addr: "127.0.0.1:5740".to_string(),
            public_base_url: None,
            max_recording_secs: 60,
            reconcile_interval_secs: 60,
            request_timeout_ms: 10_000,
            session_ttl_hours: 24 * 30,
            event_bus_capacity: 256,
        }
    }
}

impl EchoConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EchoConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration by priority:
    /// 1. Explicit path (CLI argument); must exist
    /// 2. `ECHOVERSE_CONFIG` environment variable; must exist
    /// 3. Platform config file, if present
    /// 4. Compiled defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_file(Path::new(&path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                return Self::load_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_recording_secs == 0 {
            return Err(Error::Config(
                "max_recording_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_recording_secs > MAX_RECORDING_CEILING_SECS {
            return Err(Error::Config(format!(
                "max_recording_secs must not exceed {}",
                MAX_RECORDING_CEILING_SECS
            )));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(Error::Config(
                "reconcile_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(Error::Config(
                "session_ttl_hours must be greater than zero".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL for public blob links, without trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind_addr),
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` from the loaded config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config: Option<&EchoConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    if let Some(root) = config.and_then(|c| c.root_folder.clone()) {
        return root;
    }

    default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Blob directory inside a root folder
pub fn blobs_path(root: &Path) -> PathBuf {
    root.join(BLOBS_DIR)
}

/// Platform config file location (`~/.config/echoverse/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("echoverse").join("config.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/echoverse
        dirs::data_local_dir()
            .map(|d| d.join("echoverse"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/echoverse"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("echoverse"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/echoverse"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("echoverse"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\echoverse"))
    } else {
        PathBuf::from("./echoverse_data")
    }
}
