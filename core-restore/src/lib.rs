//! # Core Restore
//!
//! Restores a directory of exported workflow definitions onto a remote
//! automation instance while keeping ids stable and folders in place.
//!
//! ## Overview
//!
//! A restore runs in phases around the platform's own import command:
//!
//! 1. **Index**: [`RemoteEntityIndex`] captures projects, folders and workflows
//! 2. **Scan**: [`TreeScanner`] finds workflow files and derives their target folder
//! 3. **Stage**: [`StagingResolver`] decides each file's identity, writes sanitized
//!    copies and a manifest
//! 4. *(external import of the staged copies)*
//! 5. **Reconcile**: [`reconcile`] ties manifest entries to the ids the import produced
//! 6. **Sync**: [`FolderSynchronizer`] creates folders and moves workflows into them
//! 7. **Report**: [`AuditLog`] and [`RunSummary`]
//!
//! [`RestoreEngine`] wires the phases to a configuration, an event bus and the
//! manifest on disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_restore::RestoreEngine;
//!
//! let engine = RestoreEngine::new(api, config)?;
//! let before = engine.capture().await?;
//! let index = engine.load_index(&before)?;
//! engine.stage(backup_root, &index).await?;
//!
//! // run the platform import against config.staging_dir
//!
//! let after = engine.capture().await?;
//! engine.reconcile(&before, &after).await?;
//! let mut index = engine.load_index(&after)?;
//! let report = engine.sync(&mut index).await?;
//! println!("{}", engine.summarize(&report).await?);
//! ```

pub mod engine;
pub mod error;
pub mod folder_sync;
pub mod index;
pub mod manifest;
pub mod model;
pub mod reconciler;
pub mod report;
pub mod scanner;
pub mod staging;

pub use engine::{RestoreEngine, StageReport};
pub use error::{RestoreError, Result};
pub use folder_sync::{EntryProgress, FolderSynchronizer, SyncOptions, SyncReport, SyncState};
pub use index::{DuplicateFolder, FolderRecord, IndexOptions, RemoteEntityIndex};
pub use manifest::{
    IntendedAction, ManifestEntry, ManifestStore, MatchStrategy, PriorManifest,
    ResolutionStrategy, SanitizationNote,
};
pub use model::{FolderPath, FolderSegment, RestoreRunId, WorkflowFile};
pub use reconciler::{reconcile, MatchOutcome, ReconcileStats};
pub use report::{AuditLog, AuditRecord, AuditStatus, RunSummary, SummaryOutcome};
pub use scanner::{ScanOptions, TreeScanner};
pub use staging::{sanitize, write_staged, StageOutput, StagedCopy, StagingResolver};
