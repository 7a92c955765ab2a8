//! Policy gate error types.

/// Errors raised by the policy gate itself.
///
/// Denials are not errors: they are returned as
/// [`EffectResponse`](crate::EffectResponse) values with a denial code.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A configured override is not permitted for the effect type.
    #[error("policy '{policy}' is not permitted for {effect_type}")]
    InvalidOverride {
        /// The effect type being overridden.
        effect_type: String,
        /// The rejected policy.
        policy: String,
    },

    /// A glob pattern in a list could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// No pending or decided request has this id.
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Grant store backend error (lock poisoned, persistence failed, etc.).
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The gate service is no longer running.
    #[error("gate channel closed")]
    ChannelClosed,
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
