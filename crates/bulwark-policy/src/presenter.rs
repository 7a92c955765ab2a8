//! Decision providers: how pending confirmations reach a human.
//!
//! The gate never waits on a presenter. It hands each prompt over and the
//! verdict comes back separately through
//! [`PolicyGate::resolve_confirmation`](crate::PolicyGate::resolve_confirmation).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::request::ConfirmationPrompt;

/// A UI that shows confirmation prompts to a human.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark_policy::{ConfirmationPresenter, ConfirmationPrompt};
///
/// struct TerminalPresenter;
///
/// #[async_trait::async_trait]
/// impl ConfirmationPresenter for TerminalPresenter {
///     async fn present(&self, prompt: ConfirmationPrompt) {
///         eprintln!("[{}] {}", prompt.risk_score, prompt.description);
///     }
/// }
/// ```
#[async_trait]
pub trait ConfirmationPresenter: Send + Sync {
    /// Show a prompt. Prompts with `requires_confirmation == false` are
    /// informational and must not be answered.
    async fn present(&self, prompt: ConfirmationPrompt);

    /// Whether the presenter can currently reach a human.
    fn is_available(&self) -> bool {
        true
    }
}

/// Presenter that forwards prompts over an unbounded channel to a UI loop.
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<ConfirmationPrompt>,
}

impl ChannelPresenter {
    /// Create a presenter and the receiving end for the UI loop.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConfirmationPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationPresenter for ChannelPresenter {
    async fn present(&self, prompt: ConfirmationPrompt) {
        if self.tx.send(prompt).is_err() {
            tracing::warn!("confirmation UI receiver dropped; prompt not delivered");
        }
    }

    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{EffectPayload, EffectRequest};
    use crate::taxonomy;
    use bulwark_core::{EffectSource, EffectType};

    #[tokio::test]
    async fn test_channel_presenter_forwards() {
        let (presenter, mut rx) = ChannelPresenter::new();
        let request = EffectRequest::new(
            EffectType::ShellWrite,
            EffectSource::Agent,
            EffectPayload {
                command: Some("make install".to_string()),
                ..Default::default()
            },
        );
        let target = request.target().unwrap();
        let prompt = ConfirmationPrompt::new(
            &request,
            &target,
            taxonomy::risk_score(EffectType::ShellWrite),
            taxonomy::default_policy(EffectType::ShellWrite),
            true,
        );

        assert!(presenter.is_available());
        presenter.present(prompt.clone()).await;
        assert_eq!(rx.recv().await.unwrap(), prompt);

        drop(rx);
        assert!(!presenter.is_available());
    }
}
