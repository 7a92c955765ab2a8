//! Bulwark Audit - Chain-linked, append-only audit logging.
//!
//! This crate provides:
//! - Audit entries for every effect decision and every shadow transition
//! - Chain-linked entries (each contains the hash of the previous)
//! - An [`AuditSink`] trait with in-memory and JSON-lines file backends
//! - Chain integrity verification
//!
//! The chain linking provides tamper evidence: any modification to a
//! historical entry breaks the link of the entry after it.
//!
//! # Example
//!
//! ```
//! use bulwark_audit::{AuditAction, AuditLog, Decision};
//! use bulwark_core::{EffectSource, EffectType, RiskScore};
//!
//! let log = AuditLog::in_memory();
//! log.record(
//!     "agent",
//!     AuditAction::EffectDecision {
//!         request_id: "req-1".to_string(),
//!         effect_type: EffectType::FilesystemRead,
//!         source: EffectSource::Agent,
//!         decision: Decision::Approved,
//!         reason: None,
//!         denial_code: None,
//!         approval_type: None,
//!         risk_score: RiskScore::MIN,
//!     },
//! )
//! .unwrap();
//!
//! assert!(log.verify_chain().unwrap().valid);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod entry;
pub mod error;
pub mod log;
pub mod sink;

pub use entry::{AuditAction, AuditEntry, AuditEntryId, Decision};
pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, ChainVerification};
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
