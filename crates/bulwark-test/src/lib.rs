//! Bulwark Test - Shared test utilities.
//!
//! Request fixtures, a recording confirmation presenter and a workspace
//! directory helper for use as a dev-dependency.
//!
//! ```rust,ignore
//! use bulwark_test::{RecordingPresenter, shell_request};
//!
//! let presenter = RecordingPresenter::new();
//! let gate = PolicyGate::builder(PolicyConfig::default())
//!     .presenter(presenter.shared())
//!     .build()?;
//! let pending = gate.submit(shell_request("rm", &["-rf", "/"]));
//! let prompt = presenter.wait_for_prompt().await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
