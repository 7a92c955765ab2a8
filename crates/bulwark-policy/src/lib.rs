//! Bulwark Policy - The authorization decision point for declared effects.
//!
//! Every state-changing action an agent wants to take arrives here as an
//! [`EffectRequest`] and leaves as exactly one [`EffectResponse`].
//!
//! # Components
//!
//! - **Taxonomy**: default [`ConfirmationPolicy`](bulwark_core::ConfirmationPolicy)
//!   and risk score for every effect type ([`policy_table`])
//! - **Scope Evaluator**: [`EffectScope`] containment checks and intersection
//! - **Grants**: remembered `session`/`permanent` approvals behind the
//!   [`GrantStore`] trait
//! - **Policy Gate**: [`PolicyGate`], which combines the above with standing
//!   [`PolicyConfig`], deduplicates confirmations and records audit entries
//! - **Channel**: [`GateService`]/[`GateClient`] and the JSON [`ChannelMessage`]
//!
//! # Example
//!
//! ```
//! use bulwark_core::{ConfirmationPolicy, EffectSource, EffectType};
//! use bulwark_policy::{EffectPayload, EffectRequest, PolicyConfig, PolicyGate};
//!
//! let gate = PolicyGate::new(PolicyConfig::default()).unwrap();
//! let request = EffectRequest::new(
//!     EffectType::FilesystemRead,
//!     EffectSource::Agent,
//!     EffectPayload {
//!         path: Some("/ws/readme.md".to_string()),
//!         ..Default::default()
//!     },
//! );
//!
//! let response = gate.submit(request).decided().cloned().unwrap();
//! assert!(response.approved);
//! assert_eq!(response.approval_type, Some(ConfirmationPolicy::Never));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod channel;
pub mod config;
pub mod error;
pub mod gate;
pub mod grants;
pub mod ledger;
pub mod presenter;
pub mod rate;
pub mod request;
pub mod scope;
pub mod taxonomy;

pub use channel::{ChannelMessage, GateClient, GateService, decode_request};
pub use config::{PolicyConfig, PolicyLists};
pub use error::{PolicyError, PolicyResult};
pub use gate::{PendingHandle, PolicyGate, PolicyGateBuilder, Submission};
pub use grants::{Grant, GrantKey, GrantStore, JsonFileGrantStore, MemoryGrantStore};
pub use presenter::{ChannelPresenter, ConfirmationPresenter};
pub use rate::RateLimitConfig;
pub use request::{
    CommandLine, ConfirmationPrompt, EffectContext, EffectPayload, EffectRequest, EffectResponse,
    EffectTarget, Verdict,
};
pub use scope::EffectScope;
pub use taxonomy::{PolicyRow, policy_table};
