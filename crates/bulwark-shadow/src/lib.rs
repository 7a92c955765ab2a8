//! Bulwark Shadow - Staging and atomic apply for proposed file changes.
//!
//! Agents never write files directly. A change arrives as a [`FilePatch`],
//! is materialized into a private shadow copy by [`ShadowStore::propose`],
//! reviewed, and only then written to the live file by
//! [`ApplyEngine::apply`].
//!
//! # Components
//!
//! - **Patch Model**: [`FilePatch`]/[`DiffHunk`] with validation, recount,
//!   hunk application and unified-diff rendering
//! - **Merge**: structural [`three_way_merge`] for live files that changed
//!   after proposal
//! - **Filesystem**: the [`FileSystem`] trait and [`HostFs`]
//! - **Shadow Staging**: [`ShadowStore`] with a persisted index
//! - **Atomic Apply**: [`ApplyEngine`] with hash checks, backups and
//!   conflict strategies
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bulwark_shadow::{ApplyEngine, PatchApplyRequest, ShadowStore};
//!
//! # async fn run() -> bulwark_shadow::ShadowResult<()> {
//! let store = Arc::new(ShadowStore::open("/ws/.bulwark/shadow").await?);
//! let shadow = store.stage_content("/ws/new.txt", "hello").await?;
//! store.approve(&shadow.id).await?;
//!
//! let engine = ApplyEngine::new(Arc::clone(&store));
//! let result = engine
//!     .apply(&PatchApplyRequest::new(&shadow.id).with_backup(true))
//!     .await;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod apply;
pub mod error;
pub mod fs;
pub mod merge;
pub mod patch;
pub mod store;

pub use apply::{
    ApplyEngine, ConflictDetails, ConflictStrategy, DEFAULT_APPLY_TIMEOUT, DEFAULT_BACKUP_SUFFIX,
    PatchApplyRequest, PatchApplyResult,
};
pub use error::{ShadowError, ShadowResult};
pub use fs::{FileStat, FileSystem, HostFs};
pub use merge::{MergeOutcome, conflicting_hunks, three_way_merge};
pub use patch::{
    DEFAULT_CONTEXT_LINES, DiffHunk, FilePatch, HunkCounts, PatchOperation, apply_hunks,
    compute_hunks, compute_patch,
};
pub use store::{ShadowFile, ShadowStatus, ShadowStore};
