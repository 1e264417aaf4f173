//! Server configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then environment variables with the `VELLUM_` prefix. Command line
//! flags override individual fields on top.

use std::net::SocketAddr;
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use vellum_core::kernel::constants::{DEFAULT_PLUGINS_DIR, DEFAULT_THEMES_DIR};

use crate::error::ServerError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Root directory for server-managed data (extension roots, uploads).
    pub data_dir: PathBuf,
    /// SQLite database path; resolved under `data_dir` when relative.
    pub database: PathBuf,
    /// Bearer token required on admin endpoints. Unset means the admin
    /// API is open (local development).
    pub api_token: Option<String>,
    /// Origins allowed by CORS; empty list allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("vellum.db"),
            api_token: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration, optionally from an explicit file path.
    pub fn load(config_file: Option<&PathBuf>) -> Result<Self, ServerError> {
        let mut builder = Config::builder();
        builder = match config_file {
            Some(path) => builder.add_source(File::from(path.clone())),
            None => builder.add_source(File::with_name("vellum").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("VELLUM").separator("__"))
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))
    }

    pub fn plugins_root(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_PLUGINS_DIR)
    }

    pub fn themes_root(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_THEMES_DIR)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn database_path(&self) -> PathBuf {
        if self.database.is_absolute() {
            self.database.clone()
        } else {
            self.data_dir.join(&self.database)
        }
    }
}
