//! Prelude module - commonly used types for convenient import.
//!
//! Use `use bulwark_core::prelude::*;` to import all essential types.

// Taxonomy
pub use crate::{ConfirmationPolicy, EffectSource, EffectType};

// Error codes
pub use crate::{DenialCode, PatchErrorCode};

// Common types
pub use crate::{ContentDigest, ContentHash, RiskScore, Timestamp};
