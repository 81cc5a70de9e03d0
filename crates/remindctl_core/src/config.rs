//! Runtime configuration.
//!
//! # Responsibility
//! - Locate the bridge libraries, the mirror directory and the log directory.
//! - Layer defaults, an optional JSON file and environment overrides.
//!
//! # Invariants
//! - Later layers replace earlier ones field by field.
//! - Library candidate lists keep their order; the first loadable path wins.

use crate::error::ErrorKind;
use crate::logging::{default_log_level, normalize_level};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "REMINDCTL_CONFIG";
pub const ENV_PRIVATE_LIBRARY: &str = "REMINDCTL_PRIVATE_LIBRARY";
pub const ENV_PUBLIC_LIBRARY: &str = "REMINDCTL_PUBLIC_LIBRARY";
pub const ENV_MIRROR_DIR: &str = "REMINDCTL_MIRROR_DIR";
pub const ENV_LOG_LEVEL: &str = "REMINDCTL_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "REMINDCTL_LOG_DIR";

const PRIVATE_LIBRARY_FILE: &str = "libremindctl_private_bridge.dylib";
const PUBLIC_LIBRARY_FILE: &str = "libremindctl_public_bridge.dylib";
const SYSTEM_LIBRARY_DIR: &str = "/usr/local/lib/remindctl";
const MIRROR_SUBDIR: &str = "Library/Group Containers/group.com.apple.reminders/Container_v1/Stores";
const LOG_SUBDIR: &str = "Library/Logs/remindctl";
const DEFAULT_MIRROR_EXTENSION: &str = "sqlite";

/// Configuration failures.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Read { path: PathBuf, source: std::io::Error },
    /// Config file is not valid JSON for this schema.
    Parse { path: PathBuf, source: serde_json::Error },
    /// A field holds an unusable value.
    Invalid { field: &'static str, detail: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigError
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
            Self::Invalid { field, detail } => write!(f, "invalid config field `{field}`: {detail}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid { .. } => None,
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindctlConfig {
    /// Candidate paths of the undocumented-surface bridge, tried in order.
    pub private_library_paths: Vec<PathBuf>,
    /// Candidate paths of the stable-surface bridge, tried in order.
    pub public_library_paths: Vec<PathBuf>,
    pub mirror_dir: PathBuf,
    /// Extension of mirror files inside `mirror_dir`, without the dot.
    pub mirror_extension: String,
    pub log_level: String,
    /// Absolute log directory.
    pub log_dir: PathBuf,
}

impl Default for RemindctlConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::defaults_for(home.as_deref())
    }
}

impl RemindctlConfig {
    /// Built-in defaults relative to `home`.
    pub fn defaults_for(home: Option<&Path>) -> Self {
        let home = home
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let user_lib = home.join(".remindctl").join("lib");
        let system_lib = PathBuf::from(SYSTEM_LIBRARY_DIR);
        Self {
            private_library_paths: vec![
                user_lib.join(PRIVATE_LIBRARY_FILE),
                system_lib.join(PRIVATE_LIBRARY_FILE),
            ],
            public_library_paths: vec![
                user_lib.join(PUBLIC_LIBRARY_FILE),
                system_lib.join(PUBLIC_LIBRARY_FILE),
            ],
            mirror_dir: home.join(MIRROR_SUBDIR),
            mirror_extension: DEFAULT_MIRROR_EXTENSION.to_string(),
            log_level: default_log_level().to_string(),
            log_dir: home.join(LOG_SUBDIR),
        }
    }

    /// Defaults, then `file` (or `REMINDCTL_CONFIG`), then the environment.
    ///
    /// # Errors
    /// - The config file cannot be read or parsed.
    /// - A resulting field is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let env_file = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let file = file.map(Path::to_path_buf).or(env_file);
        let mut config = match &file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var_os(key));
        config.validate()?;
        info!(
            "event=config_load module=config status=ok file={} private_candidates={} public_candidates={}",
            file.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".to_string()),
            config.private_library_paths.len(),
            config.public_library_paths.len()
        );
        Ok(config)
    }

    /// Reads a JSON file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, keyed by the `REMINDCTL_*` names.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<OsString>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        if let Some(value) = non_empty(ENV_PRIVATE_LIBRARY) {
            self.private_library_paths = std::env::split_paths(&value).collect();
        }
        if let Some(value) = non_empty(ENV_PUBLIC_LIBRARY) {
            self.public_library_paths = std::env::split_paths(&value).collect();
        }
        if let Some(value) = non_empty(ENV_MIRROR_DIR) {
            self.mirror_dir = PathBuf::from(value);
        }
        if let Some(value) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = value.to_string_lossy().into_owned();
        }
        if let Some(value) = non_empty(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(value);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level).map_err(|detail| ConfigError::Invalid {
            field: "log_level",
            detail,
        })?;
        if !self.log_dir.is_absolute() {
            return Err(ConfigError::Invalid {
                field: "log_dir",
                detail: format!("must be absolute, got `{}`", self.log_dir.display()),
            });
        }
        let extension = self.mirror_extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "mirror_extension",
                detail: format!("unusable extension `{}`", self.mirror_extension),
            });
        }
        Ok(())
    }

    /// Mirror extension without a leading dot.
    pub fn mirror_extension(&self) -> &str {
        self.mirror_extension.trim_start_matches('.')
    }
}
