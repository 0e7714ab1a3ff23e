//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. `MCQR_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not fatal: a warning is logged and compiled
//! defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MCQR_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "MCQR_CONFIG";

/// Default HTTP port of the review service
pub const DEFAULT_PORT: u16 = 5790;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Root folder holding datasets, images and progress database
    pub root_folder: Option<PathBuf>,

    /// Fixed, enumerable set of annotator identities
    pub annotators: Vec<String>,

    pub dataset: DatasetConfig,
    pub images: ImageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root_folder: None,
            annotators: ["Yash", "Gagan", "Amit", "Junda", "Xin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dataset: DatasetConfig::default(),
            images: ImageConfig::default(),
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which backing medium holds the records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// One shared CSV file filtered by `assigned_to`
    Csv,
    /// One SQLite database per annotator
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub kind: DatasetKind,
    /// Shared CSV file (relative to the root folder unless absolute)
    pub csv_file: PathBuf,
    /// Folder of `{annotator}.db` files for the SQLite variant
    pub member_folder: PathBuf,
    /// Progress tracking database
    pub progress_database: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            kind: DatasetKind::Csv,
            csv_file: PathBuf::from("temp.csv"),
            member_folder: PathBuf::from("members"),
            progress_database: PathBuf::from("progress.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub folder: PathBuf,
    pub extension: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("images"),
            extension: "jpg".to_string(),
        }
    }
}

/// Remote copy addressed by {repository, branch, resource path}
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Resource path; `{annotator}` is substituted per annotator
    pub path: String,
    /// Name of the environment variable holding the bearer token
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            path: "temp.csv".to_string(),
            token_env: "MCQR_REMOTE_TOKEN".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Resource path for one annotator
    pub fn resource_path(&self, annotator: &str) -> String {
        self.path.replace("{annotator}", annotator)
    }

    /// Check the addressing fields before any client is built
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api_base", &self.api_base),
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("path", &self.path),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("remote.{} is not set", name)));
            }
        }
        Ok(())
    }

    /// Read the bearer token from the configured environment variable
    pub fn load_credential(&self) -> Result<Credential> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(Credential(token.trim().to_string())),
            _ => Err(Error::Configuration(format!(
                "remote credential missing: set {}",
                self.token_env
            ))),
        }
    }
}

/// Bearer token for the remote; never printed
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
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

impl TomlConfig {
    /// Parse a config file, failing on unreadable or malformed content
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Load the config file if one exists, otherwise fall back to defaults
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        match candidate {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file location available, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Platform config file: `{config_dir}/mcqr/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mcqr").join("config.toml"))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mcqr"))
        .unwrap_or_else(|| PathBuf::from("./mcqr_data"))
}

/// Resolve `path` against `root` unless it is already absolute
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
