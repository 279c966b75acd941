//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-restore`, `core-runtime`, `provider-n8n`). Host
//! tooling can depend on `restore-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_runtime;

#[cfg(any(feature = "desktop-shims", feature = "n8n"))]
pub use core_restore;

#[cfg(feature = "n8n")]
pub use provider_n8n;
