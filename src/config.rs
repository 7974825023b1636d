use crate::core::{DatabaseError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DriverOptions,
    pub export: Option<ExportConfig>,
}

/// Connection parameters handed to the factory when building a driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Adapter name resolved by the factory (`mysqli`, `mysql`, `sqlite`)
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database (schema) name; written into the dump's `<database name>`
    pub database: Option<String>,
    /// Table prefix substituted for `#__`
    pub prefix: String,
    /// Database file for file-backed adapters; `:memory:` when absent
    pub path: Option<PathBuf>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            driver: "mysqli".to_string(),
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            prefix: String::new(),
            path: None,
        }
    }
}

/// Defaults applied to export runs.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub with_structure: Option<bool>,
    pub with_data: Option<bool>,
}

/// Resolves `<config_dir>/sqlport/config.toml` for the current user.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlport").join("config.toml"))
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// use sqlport::config::load_config;
///
/// let config = load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config.database.driver);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| DatabaseError::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| DatabaseError::Config(e.to_string()))
}

/// Loads the configuration at `path`, or the default location when it exists.
///
/// A missing default file yields the built-in defaults; an explicit path
/// that cannot be read is an error.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => load_config(path),
            None => Ok(Config::default()),
        },
    }
}
