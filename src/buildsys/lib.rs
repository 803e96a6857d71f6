//! buildsys: a meta build orchestrator.
//!
//! Packages are declared in data-only TOML manifests. Discovery evaluates
//! manifests in parallel, growing a dependency graph across namespaces;
//! after cycle checking, the world builds the graph bottom-up with bounded
//! parallelism, replaying each package's extraction queue and shell
//! commands in its own working directory.
//!
//! The interesting entry points:
//!
//! - [`core::World::base_package`] runs a whole invocation from a base
//!   manifest.
//! - [`ops`] is the typed binding surface the manifest layer (or a test)
//!   drives to populate packages.

pub use crate::core::{BuildDir, NameSpace, Package, World};
pub use crate::util::errors::BuildsysResult;

pub mod core;
pub mod ops;
pub mod util;
