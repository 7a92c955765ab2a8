//! Mock decision providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bulwark_policy::{ConfirmationPresenter, ConfirmationPrompt};
use tokio::sync::Notify;

/// How long [`RecordingPresenter::wait_for_prompts`] waits before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Presenter that records every prompt it is shown.
///
/// Clones share the same record, so a test can keep one clone and hand
/// another to the gate.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    prompts: Arc<Mutex<Vec<ConfirmationPrompt>>>,
    notify: Arc<Notify>,
    unavailable: Arc<AtomicBool>,
}

impl RecordingPresenter {
    /// Create an available presenter with no prompts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for [`PolicyGateBuilder::presenter`](bulwark_policy::PolicyGateBuilder::presenter).
    #[must_use]
    pub fn shared(&self) -> Arc<dyn ConfirmationPresenter> {
        Arc::new(self.clone())
    }

    /// Report the presenter as unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Every prompt shown so far, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<ConfirmationPrompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Prompts that require a verdict.
    #[must_use]
    pub fn confirmations(&self) -> Vec<ConfirmationPrompt> {
        self.prompts()
            .into_iter()
            .filter(|p| p.requires_confirmation)
            .collect()
    }

    /// Informational notices (auto-approvals).
    #[must_use]
    pub fn notices(&self) -> Vec<ConfirmationPrompt> {
        self.prompts()
            .into_iter()
            .filter(|p| !p.requires_confirmation)
            .collect()
    }

    /// Wait until at least `count` prompts have been shown and return them.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within five seconds.
    pub async fn wait_for_prompts(&self, count: usize) -> Vec<ConfirmationPrompt> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                let prompts = self.prompts();
                if prompts.len() >= count {
                    return prompts;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(WAIT_LIMIT, wait).await {
            Ok(prompts) => prompts,
            Err(_) => panic!(
                "expected {count} prompts, saw {}",
                self.prompts().len()
            ),
        }
    }

    /// Wait for the first prompt.
    ///
    /// # Panics
    ///
    /// Panics if none arrives within five seconds.
    pub async fn wait_for_prompt(&self) -> ConfirmationPrompt {
        let mut prompts = self.wait_for_prompts(1).await;
        prompts.swap_remove(0)
    }
}

#[async_trait]
impl ConfirmationPresenter for RecordingPresenter {
    async fn present(&self, prompt: ConfirmationPrompt) {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prompt);
        self.notify.notify_waiters();
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}
