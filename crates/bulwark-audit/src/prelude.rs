//! Prelude module - commonly used types for convenient import.
//!
//! Use `use bulwark_audit::prelude::*;` to import all essential types.

pub use crate::{
    AuditAction, AuditEntry, AuditEntryId, AuditError, AuditLog, AuditResult, AuditSink,
    ChainVerification, Decision, JsonlAuditSink, MemoryAuditSink,
};
