//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DOCDROP_CONFIG`
//! environment variable. A missing file is not an error; defaults apply.
//!
//! ## Loading Priority
//!
//! 1. **Defaults** - see [`Config::default`]
//! 2. **YAML config file** - (default: `config.yaml`)
//! 3. **Environment variables** - Variables prefixed with `DOCDROP_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCDROP_UPLOAD__ON_CONFLICT=reject` sets the `upload.on_conflict` field.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 5000
//! target_dir: /mnt/paperless_storage_ssd/consume
//! upload:
//!   on_conflict: overwrite
//!   max_body_size: 104857600
//! enable_otel_export: false
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCDROP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Directory uploaded files are written into. Must already exist.
    pub target_dir: PathBuf,
    /// Upload handling
    pub upload: UploadConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// What to do when the destination file already exists
    pub on_conflict: ConflictPolicy,
    /// Maximum request body size in bytes. Unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<usize>,
}

/// Policy applied when an upload's destination name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Refuse the upload with 409 Conflict
    Reject,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            target_dir: PathBuf::from("/mnt/paperless_storage_ssd/consume"),
            upload: UploadConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: target_dir cannot be empty".to_string(),
            });
        }

        if self.upload.max_body_size == Some(0) {
            return Err(Error::Internal {
                operation: "Config validation: upload.max_body_size must be greater than zero (leave it unset for no limit)"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&args.config))
            // DOCDROP_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("DOCDROP_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
