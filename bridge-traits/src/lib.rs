//! # Host Bridge Traits
//!
//! Platform abstraction traits that the restore engine depends on.
//!
//! ## Overview
//!
//! This crate defines the contract between the core engine and the pieces a
//! host must supply: a transport to the remote automation instance, a file
//! system, a clock and an optional log sink.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry, TLS
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for staging, manifests and audit logs
//!
//! ### Remote platform
//! - [`AutomationApi`](automation::AutomationApi) - Projects, folders, workflows and assignment
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! | Trait | Desktop implementation |
//! |-------|------------------------|
//! | `HttpClient` | `bridge_desktop::ReqwestHttpClient` |
//! | `FileSystemAccess` | `bridge_desktop::TokioFileSystem` |
//! | `AutomationApi` | `provider_n8n::N8nConnector` |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Keep the HTTP status on remote failures (`BridgeError::Remote`)
//! - Include error context (e.g., file paths, request URLs)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so implementations can be
//! shared behind `Arc` across async tasks.

pub mod automation;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use automation::{
    AssignmentOutcome, AutomationApi, FolderCreation, RemoteFolder, RemoteProject,
    RemoteSnapshot, RemoteWorkflow,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
