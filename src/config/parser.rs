//! Configuration parser for loading deployment unit definitions.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StratusError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable carrying the provider API token.
pub const PROVIDER_TOKEN_VAR: &str = "STRATUS_PROVIDER_TOKEN";

/// Prefix for parameter overrides (`STRATUS_PARAM_<NAME>`).
const PARAM_ENV_PREFIX: &str = "STRATUS_PARAM_";

/// Configuration parser for loading deployment unit configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StratusError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StratusError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StratusError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed configuration for project: {}",
            config.project.name
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Parameters can be overridden with `STRATUS_PARAM_<NAME>`; project
    /// fields with `STRATUS_PROJECT_NAME` / `STRATUS_PROJECT_ENVIRONMENT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut DeployConfig) {
        if let Ok(name) = std::env::var("STRATUS_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(env) = std::env::var("STRATUS_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Ok(endpoint) = std::env::var("STRATUS_PROVIDER_ENDPOINT") {
            debug!("Overriding provider.endpoint from environment");
            config.provider.endpoint = endpoint;
        }

        for (key, value) in std::env::vars() {
            if let Some(param) = key.strip_prefix(PARAM_ENV_PREFIX) {
                let param = param.to_lowercase();
                debug!("Overriding parameter '{param}' from environment");
                config
                    .parameters
                    .insert(param, serde_json::Value::String(value));
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StratusError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the provider API token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn get_provider_token() -> Result<String> {
        std::env::var(PROVIDER_TOKEN_VAR).map_err(|_| {
            StratusError::Config(ConfigError::MissingEnvVar {
                name: String::from(PROVIDER_TOKEN_VAR),
            })
        })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "stratus.deploy.yaml",
    "stratus.deploy.yml",
    "deploy.yaml",
    "deploy.yml",
];

/// Finds the configuration file in the given directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StratusError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: test-project
provider:
  endpoint: https://provider.example.com/v1
resources: []
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("should parse");

        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "dev");
        assert!(config.resources.is_empty());
        assert_eq!(config.provider.timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  name: n8n-stack
  environment: prod

state:
  path: .stratus

provider:
  endpoint: https://provider.example.com/v1
  stabilize_timeout_secs: 900

parameters:
  certificate_arn: "arn:example:cert/abc"

resources:
  - name: vpc
    kind: network
    properties:
      cidr: 10.0.0.0/16
      max_azs: 2

  - name: db
    kind: managed-database
    properties:
      engine: postgres-17
      network: ${vpc.id}
      allocated_storage_gb: 20
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("should parse");

        assert_eq!(config.project.name, "n8n-stack");
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources[1].kind, "managed-database");
        assert_eq!(config.provider.stabilize_timeout_secs, 900);
        assert!(config.parameters.contains_key("certificate_arn"));

        let deps = config.resources[1]
            .dependency_names()
            .expect("should parse references");
        assert_eq!(deps, vec!["vpc"]);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let parser = ConfigParser::new();
        assert!(parser.parse_yaml("not: [valid", None).is_err());
    }
}
