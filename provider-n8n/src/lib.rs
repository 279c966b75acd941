//! # n8n Provider
//!
//! Implements the `AutomationApi` trait against an n8n instance.
//!
//! ## Overview
//!
//! This module provides:
//! - Cursor-paginated listing of projects and workflows (public API v1)
//! - Per-project folder listing and folder creation
//! - Workflow moves guarded by `versionId`, and project transfers
//! - Classification of plan/licence refusals and version conflicts
//!
//! Authentication is supplied up front as an API key or a session cookie.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{N8nAuth, N8nConnector};
pub use error::{N8nError, Result};
