//! Prelude module - commonly used types for convenient import.
//!
//! Use `use bulwark_shadow::prelude::*;` to import all essential types.

pub use crate::{
    ApplyEngine, ConflictStrategy, DiffHunk, FilePatch, FileSystem, PatchApplyRequest,
    PatchApplyResult, PatchOperation, ShadowError, ShadowFile, ShadowResult, ShadowStatus,
    ShadowStore,
};
