//! Configuration validation for deployment units.
//!
//! This module provides validation of deployment configurations, ensuring
//! all values are consistent before any graph construction or provider call.

use crate::error::{ConfigError, Result, StratusError};
use crate::provider::schema;
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DeployConfig, ResourceDecl, PARAMETER_TARGET};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The typed configuration error.
    pub error: ConfigError,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, field: impl Into<String>, error: ConfigError) {
        self.errors.push(ValidationError {
            field: field.into(),
            error,
        });
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found, as its typed
    /// [`ConfigError`] variant.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(config, &mut result);
        Self::validate_provider(config, &mut result);
        Self::validate_resources(config, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first = result.errors.remove(0);
            Err(StratusError::Config(first.error))
        }
    }

    /// Validates project configuration.
    fn validate_project(config: &DeployConfig, result: &mut ValidationResult) {
        let project = &config.project;

        if project.name.is_empty() {
            result.push(
                "project.name",
                ConfigError::validation("Project name cannot be empty", "project.name"),
            );
        } else if !is_valid_name(&project.name) {
            result.push(
                "project.name",
                ConfigError::validation(
                    format!(
                        "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        project.name
                    ),
                    "project.name",
                ),
            );
        }

        if !is_valid_name(&project.environment) {
            result.push(
                "project.environment",
                ConfigError::validation(
                    format!(
                        "Environment '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        project.environment
                    ),
                    "project.environment",
                ),
            );
        }
    }

    /// Validates provider configuration.
    fn validate_provider(config: &DeployConfig, result: &mut ValidationResult) {
        let endpoint = &config.provider.endpoint;
        if endpoint.is_empty() {
            result.push(
                "provider.endpoint",
                ConfigError::validation("Provider endpoint cannot be empty", "provider.endpoint"),
            );
        } else if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            result.push(
                "provider.endpoint",
                ConfigError::validation(
                    format!("Provider endpoint '{endpoint}' must be an http(s) URL"),
                    "provider.endpoint",
                ),
            );
        }

        if config.provider.poll_interval_secs == 0 {
            result.warnings.push(String::from(
                "provider.poll_interval_secs is 0; stabilization will busy-poll",
            ));
        }
    }

    /// Validates resource declarations.
    fn validate_resources(config: &DeployConfig, result: &mut ValidationResult) {
        let mut seen: HashSet<&str> = HashSet::new();

        for decl in &config.resources {
            let field = format!("resources.{}", decl.name);

            if decl.name.is_empty() {
                result.push(
                    "resources",
                    ConfigError::validation("Resource name cannot be empty", "resources"),
                );
                continue;
            }

            if !is_valid_name(&decl.name) {
                result.push(
                    field.clone(),
                    ConfigError::validation(
                        format!(
                            "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                            decl.name
                        ),
                        field.clone(),
                    ),
                );
            }

            if decl.name == PARAMETER_TARGET {
                result.push(
                    field.clone(),
                    ConfigError::validation(
                        format!("Resource name '{PARAMETER_TARGET}' is reserved"),
                        field.clone(),
                    ),
                );
            }

            if !seen.insert(decl.name.as_str()) {
                result.push(
                    field.clone(),
                    ConfigError::DuplicateName {
                        name: decl.name.clone(),
                    },
                );
            }

            if schema::lookup(&decl.kind).is_none() {
                result.push(
                    format!("{field}.kind"),
                    ConfigError::UnknownKind {
                        name: decl.name.clone(),
                        kind: decl.kind.clone(),
                    },
                );
            }

            Self::validate_references(config, decl, &field, result);

            if decl.properties.is_empty() {
                result
                    .warnings
                    .push(format!("Resource '{}' declares no properties", decl.name));
            }
        }
    }

    /// Validates reference tokens and parameter references for one
    /// declaration.
    fn validate_references(
        config: &DeployConfig,
        decl: &ResourceDecl,
        field: &str,
        result: &mut ValidationResult,
    ) {
        let refs = match decl.references() {
            Ok(refs) => refs,
            Err(message) => {
                result.push(
                    format!("{field}.properties"),
                    ConfigError::InvalidReference {
                        name: decl.name.clone(),
                        message,
                    },
                );
                return;
            }
        };

        for reference in refs {
            if reference.is_parameter() {
                if !config.parameters.contains_key(&reference.attribute) {
                    result.push(
                        format!("{field}.properties"),
                        ConfigError::UndefinedParameter {
                            name: decl.name.clone(),
                            parameter: reference.attribute.clone(),
                        },
                    );
                }
            } else if reference.target == decl.name {
                result.push(
                    format!("{field}.properties"),
                    ConfigError::InvalidReference {
                        name: decl.name.clone(),
                        message: String::from("resource references itself"),
                    },
                );
            }
        }

        for dep in &decl.depends_on {
            if dep == &decl.name {
                result.push(
                    format!("{field}.depends_on"),
                    ConfigError::InvalidReference {
                        name: decl.name.clone(),
                        message: String::from("resource depends on itself"),
                    },
                );
            }
        }
    }
}

/// Checks whether a name is lowercase alphanumeric with hyphens, starting
/// and ending with an alphanumeric character.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> DeployConfig {
        ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("should parse")
    }

    const BASE: &str = r"
project:
  name: test
provider:
  endpoint: https://provider.example.com/v1
";

    #[test]
    fn test_valid_config() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: vpc
    kind: network
    properties:
      cidr: 10.0.0.0/16
"
        ));
        let validator = ConfigValidator::new();
        let result = validator.validate(&config).expect("should be valid");
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: vpc
    kind: network
    properties: {{ cidr: 10.0.0.0/16 }}
  - name: vpc
    kind: network
    properties: {{ cidr: 10.1.0.0/16 }}
"
        ));
        let error = ConfigValidator::new()
            .validate(&config)
            .expect_err("should fail");
        assert!(matches!(
            error,
            StratusError::Config(ConfigError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: thing
    kind: quantum-teleporter
    properties: {{ qubits: 4 }}
"
        ));
        let error = ConfigValidator::new()
            .validate(&config)
            .expect_err("should fail");
        assert!(matches!(
            error,
            StratusError::Config(ConfigError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_undefined_parameter_rejected() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: listener
    kind: load-balancer-listener
    properties:
      certificate: ${{param.certificate_arn}}
"
        ));
        let error = ConfigValidator::new()
            .validate(&config)
            .expect_err("should fail");
        assert!(matches!(
            error,
            StratusError::Config(ConfigError::UndefinedParameter { .. })
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: vpc
    kind: network
    properties:
      cidr: ${{vpc.cidr}}
"
        ));
        let error = ConfigValidator::new()
            .validate(&config)
            .expect_err("should fail");
        assert!(matches!(
            error,
            StratusError::Config(ConfigError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let config = parse(&format!(
            "{BASE}
resources:
  - name: MyVpc
    kind: network
    properties: {{ cidr: 10.0.0.0/16 }}
"
        ));
        assert!(ConfigValidator::new().validate(&config).is_err());
    }
}
