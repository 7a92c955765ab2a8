//! Bulwark integration tests.
//!
//! This crate exists solely for integration testing across the policy gate,
//! the shadow pipeline and the audit chain. All tests live in `tests/`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
