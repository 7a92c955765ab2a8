//! Bulwark Core - Foundation types shared by the effect gate and the shadow
//! patch pipeline.
//!
//! This crate provides:
//! - The closed effect taxonomy ([`EffectType`], [`EffectSource`],
//!   [`ConfirmationPolicy`])
//! - Caller-facing error codes ([`DenialCode`], [`PatchErrorCode`])
//! - [`Timestamp`] and [`RiskScore`]
//! - Content hashing ([`ContentHash`], [`ContentDigest`])

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod codes;
pub mod effect;
pub mod hash;
pub mod types;

pub use codes::{DenialCode, PatchErrorCode};
pub use effect::{ConfirmationPolicy, EffectSource, EffectType, UnknownVariant};
pub use hash::{Blake3Digest, ContentDigest, ContentHash, Sha256Digest};
pub use types::{RiskScore, Timestamp};
