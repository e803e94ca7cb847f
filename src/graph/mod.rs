//! Dependency graph construction from resource declarations.

mod builder;

pub use builder::DependencyGraph;
