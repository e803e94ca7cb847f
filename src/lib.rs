// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stratus
//!
//! A declarative, idempotent, dependency-ordered infrastructure provisioning
//! engine.
//!
//! ## Overview
//!
//! Stratus turns a set of inert resource declarations into provisioned
//! infrastructure:
//!
//! - Declare resources and their relationships in a YAML configuration file
//! - References between resources (`${name.attribute}`) define both the data
//!   flow and the provisioning order
//! - Re-running an unchanged configuration does nothing; changed declarations
//!   produce the minimal ordered set of create/update/delete actions
//! - Every applied action is committed to a state store before the next one
//!   starts, so interrupted runs resume where they left off
//!
//! ## Architecture
//!
//! A run moves through four stages:
//!
//! 1. **Declarations**: parsed and validated from `stratus.deploy.yaml`
//! 2. **Graph**: references resolved into a cycle-free dependency graph with
//!    a deterministic topological order
//! 3. **Plan**: declarations diffed against recorded state into an ordered
//!    action sequence, with immutable-property changes expanded into
//!    delete-then-create replacements
//! 4. **Execution**: actions applied one at a time through provider handlers,
//!    with stabilization waits and per-action state commits
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation, and snapshot hashing
//! - [`graph`]: Dependency graph construction and ordering
//! - [`planner`]: Plan generation and execution
//! - [`provider`]: Provider handlers, registry, and kind schemas
//! - [`state`]: State records, locking, and storage backends
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: n8n
//!   environment: prod
//!
//! provider:
//!   endpoint: https://provider.internal/api/v1
//!
//! resources:
//!   - name: vpc
//!     kind: network
//!     properties:
//!       cidr: 10.0.0.0/16
//!
//!   - name: db
//!     kind: managed-database
//!     properties:
//!       engine: postgres-17
//!       network: ${vpc.id}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeclHasher, DeployConfig};
pub use error::{Result, StratusError};
pub use graph::DependencyGraph;
pub use planner::{ApplyReport, DiffEngine, Executor, Plan};
pub use provider::{ProviderRegistry, ResourceHandler};
pub use state::{DeploymentUnitState, LocalStateStore, StateStore};
