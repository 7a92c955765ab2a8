//! Prelude module - commonly used types for convenient import.
//!
//! Use `use bulwark_policy::prelude::*;` to import all essential types.

pub use crate::{
    ConfirmationPresenter, ConfirmationPrompt, EffectPayload, EffectRequest, EffectResponse,
    EffectScope, GrantKey, GrantStore, PolicyConfig, PolicyError, PolicyGate, PolicyResult,
    Submission, Verdict,
};
