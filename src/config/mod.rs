//! Configuration parsing, validation, and hashing.
//!
//! This module handles everything related to the `stratus.deploy.yaml`
//! configuration file: declaration types, parsing, validation, and
//! deterministic snapshot hashing.

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::DeclHasher;
pub use parser::{find_config_file, ConfigParser, DEFAULT_CONFIG_FILES, PROVIDER_TOKEN_VAR};
pub use spec::{
    collect_references, extract_references, DeployConfig, ProjectConfig, ProviderConfig,
    Reference, ResourceDecl, StateConfig, ID_ATTRIBUTE, PARAMETER_TARGET,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
