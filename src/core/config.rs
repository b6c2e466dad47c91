//! Configuration management

use clap::Parser;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid security configuration: {0}")]
    InvalidSecurity(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_with_args(cli_args)
    }

    fn load_with_args(cli_args: CliArgs) -> Result<Self, ConfigError> {
        // 1. Start with defaults (lowest priority)
        let mut builder = Self::builder_with_defaults()?;

        // 2. Load from config file if specified (medium priority)
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // 3. Override with environment variables (higher priority)
        // Environment variables are prefixed with EXPORT_ and use __ for nesting
        // Example: EXPORT_SERVER__PORT=8080
        builder = builder.add_source(
            Environment::with_prefix("EXPORT")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Override with CLI arguments (highest priority)
        if let Some(host) = &cli_args.host {
            builder = builder.set_override("server.host", host.clone())?;
        }
        if let Some(port) = cli_args.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = Self::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn builder_with_defaults(
    ) -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let builder = ConfigBuilder::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("database.path", "./data/attendance.db")?
            .set_default("database.connection_pool_size", 10)?
            .set_default("database.busy_timeout", 5000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.output", "stdout")?
            .set_default("security.api_key_required", false)?
            .set_default("security.api_key", "")?
            .set_default("security.api_key_header", "x-api-key")?
            .set_default("security.allowed_origins", vec!["*"])?;
        Ok(builder)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.security.validate()?;
        Ok(())
    }
}

/// Command-line arguments for configuration override
#[derive(Debug, Parser)]
#[command(name = "attendance-export")]
#[command(about = "Attendance Export Backend Server", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server host address
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database file path
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidServer("host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidServer("port must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    pub busy_timeout: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabase("path cannot be empty".to_string()));
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase(
                "connection_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout == 0 {
            return Err(ConfigError::InvalidDatabase(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub api_key_required: bool,
    pub api_key: String,
    pub api_key_header: String,
    pub allowed_origins: Vec<String>,
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key_required && self.api_key.is_empty() {
            return Err(ConfigError::InvalidSecurity(
                "api_key must be provided when api_key_required is true".to_string(),
            ));
        }

        if self.api_key_header.is_empty() {
            return Err(ConfigError::InvalidSecurity(
                "api_key_header cannot be empty".to_string(),
            ));
        }

        if self.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidSecurity(
                "allowed_origins cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                path: PathBuf::from("./data/attendance.db"),
                connection_pool_size: 10,
                busy_timeout: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
                output: "stdout".to_string(),
                log_file: None,
            },
            security: SecurityConfig {
                api_key_required: false,
                api_key: String::new(),
                api_key_header: "x-api-key".to_string(),
                allowed_origins: vec!["*".to_string()],
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_server_port() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidServer(_))));
    }

    #[test]
    fn test_empty_pool_size() {
        let mut config = base_config();
        config.database.connection_pool_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDatabase(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = base_config();
        config.logging.level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogging(_))));
    }

    #[test]
    fn test_file_output_requires_log_file() {
        let mut config = base_config();
        config.logging.output = "file".to_string();
        config.logging.log_file = None;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogging(_))));
    }

    #[test]
    fn test_auth_requires_api_key() {
        let mut config = base_config();
        config.security.api_key_required = true;
        config.security.api_key = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSecurity(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[security]
api_key_required = true
api_key = "secret"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert!(config.security.api_key_required);
        assert_eq!(config.security.api_key, "secret");
        // Defaults fill the sections the file omits
        assert_eq!(config.database.connection_pool_size, 10);
        assert_eq!(config.security.api_key_header, "x-api-key");
    }
}
