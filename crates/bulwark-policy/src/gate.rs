//! Policy gate: maps every effect request to exactly one response.
//!
//! # Decision flow
//!
//! 1. Redelivered request ids get the response (or pending handle) already on record
//! 2. Malformed requests are denied with `policy_blocked`
//! 3. Producers over their rate limit are denied with `rate_limited`
//! 4. Denied effect types and blocklist matches are denied with `policy_blocked`
//! 5. The request scope is intersected with the standing scope; a target outside
//!    it is denied with `scope_violation`
//! 6. Allowlisted targets and `never` effects are approved immediately
//! 7. A live grant for (effect type, target) approves with the grant's policy
//! 8. Everything else becomes a pending confirmation, shared by every request
//!    for the same (effect type, target) slot
//!
//! Pending confirmations are completed by [`PolicyGate::resolve_confirmation`],
//! a deadline, or [`PolicyGate::cancel_task`]. Callers await the outcome through
//! the [`PendingHandle`] returned by [`PolicyGate::submit`].

use bulwark_audit::{AuditAction, AuditLog, Decision};
use bulwark_core::{ConfirmationPolicy, DenialCode, EffectType, RiskScore, Timestamp};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::PolicyConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::grants::{Grant, GrantKey, GrantStore, MemoryGrantStore};
use crate::ledger::ResponseLedger;
use crate::presenter::ConfirmationPresenter;
use crate::rate::RateLimiter;
use crate::request::{ConfirmationPrompt, EffectRequest, EffectResponse, EffectTarget, Verdict};
use crate::scope::EffectScope;
use crate::taxonomy;

/// Audit actor for human verdicts.
const REVIEWER_ACTOR: &str = "reviewer";
/// Audit actor for deadline and cancellation outcomes.
const SYSTEM_ACTOR: &str = "system";

/// Outcome of [`PolicyGate::submit`].
#[derive(Debug)]
pub enum Submission {
    /// The request was decided without a human.
    Decided(EffectResponse),
    /// The request awaits a verdict.
    Pending(PendingHandle),
}

impl Submission {
    /// Whether the request awaits a verdict.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The immediate response, if the request was decided synchronously.
    #[must_use]
    pub fn decided(&self) -> Option<&EffectResponse> {
        match self {
            Self::Decided(response) => Some(response),
            Self::Pending(_) => None,
        }
    }

    /// Await the final response.
    pub async fn response(self) -> EffectResponse {
        match self {
            Self::Decided(response) => response,
            Self::Pending(handle) => handle.wait().await,
        }
    }
}

/// Caller-side view of a pending confirmation.
///
/// Dropping the handle does not cancel the confirmation; the gate keeps it
/// until a verdict, deadline or cancellation resolves it.
#[derive(Debug, Clone)]
pub struct PendingHandle {
    request_id: String,
    rx: watch::Receiver<Option<EffectResponse>>,
}

impl PendingHandle {
    /// The request this handle waits on.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The response, if already resolved.
    #[must_use]
    pub fn try_response(&self) -> Option<EffectResponse> {
        self.rx.borrow().clone()
    }

    /// Wait for the response.
    ///
    /// If the gate is dropped before resolving, the request is denied with
    /// `timeout`.
    pub async fn wait(mut self) -> EffectResponse {
        let response = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        response.unwrap_or_else(|| {
            EffectResponse::deny(
                self.request_id.clone(),
                DenialCode::Timeout,
                "policy gate shut down before a verdict",
            )
        })
    }
}

/// Builder for [`PolicyGate`].
pub struct PolicyGateBuilder {
    config: PolicyConfig,
    grants: Option<Arc<dyn GrantStore>>,
    audit: Option<Arc<AuditLog>>,
    presenter: Option<Arc<dyn ConfirmationPresenter>>,
}

impl PolicyGateBuilder {
    /// Use a specific grant store (defaults to [`MemoryGrantStore`]).
    #[must_use]
    pub fn grant_store(mut self, grants: Arc<dyn GrantStore>) -> Self {
        self.grants = Some(grants);
        self
    }

    /// Record every decision to an audit log.
    #[must_use]
    pub fn audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Register the decision provider.
    #[must_use]
    pub fn presenter(mut self, presenter: Arc<dyn ConfirmationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Build the gate.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidOverride`] if the configuration overrides
    /// an effect with a policy the taxonomy does not permit.
    pub fn build(self) -> PolicyResult<PolicyGate> {
        self.config.validate()?;
        let ledger = ResponseLedger::new(self.config.response_cache_capacity);
        let limiter = RateLimiter::new(self.config.rate_limit);
        Ok(PolicyGate {
            inner: Arc::new(GateInner {
                grants: self
                    .grants
                    .unwrap_or_else(|| Arc::new(MemoryGrantStore::new())),
                audit: self.audit,
                presenter: RwLock::new(self.presenter),
                limiter,
                state: Mutex::new(GateState {
                    pending: HashMap::new(),
                    slots: HashMap::new(),
                    ledger,
                }),
                config: self.config,
            }),
        })
    }
}

/// The policy gate. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PolicyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    config: PolicyConfig,
    grants: Arc<dyn GrantStore>,
    audit: Option<Arc<AuditLog>>,
    presenter: RwLock<Option<Arc<dyn ConfirmationPresenter>>>,
    limiter: RateLimiter,
    state: Mutex<GateState>,
}

struct GateState {
    pending: HashMap<String, PendingEntry>,
    /// Request ids per confirmation slot, leader first.
    slots: HashMap<GrantKey, Vec<String>>,
    ledger: ResponseLedger,
}

struct PendingEntry {
    request: EffectRequest,
    slot: GrantKey,
    policy: ConfirmationPolicy,
    risk: RiskScore,
    modified_scope: Option<EffectScope>,
    prompt: ConfirmationPrompt,
    tx: watch::Sender<Option<EffectResponse>>,
}

/// Result of evaluating a request against policy.
enum Evaluation {
    Decided {
        response: EffectResponse,
        reason: Option<String>,
        notice: Option<ConfirmationPrompt>,
    },
    Confirm {
        target: EffectTarget,
        policy: ConfirmationPolicy,
        modified_scope: Option<EffectScope>,
    },
}

impl PolicyGate {
    /// Create a gate with in-memory grants, no audit log and no presenter.
    ///
    /// # Errors
    ///
    /// See [`PolicyGateBuilder::build`].
    pub fn new(config: PolicyConfig) -> PolicyResult<Self> {
        Self::builder(config).build()
    }

    /// Start building a gate.
    #[must_use]
    pub fn builder(config: PolicyConfig) -> PolicyGateBuilder {
        PolicyGateBuilder {
            config,
            grants: None,
            audit: None,
            presenter: None,
        }
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.inner.config
    }

    /// The grant store.
    #[must_use]
    pub fn grants(&self) -> &Arc<dyn GrantStore> {
        &self.inner.grants
    }

    /// Replace the decision provider.
    pub fn register_presenter(&self, presenter: Arc<dyn ConfirmationPresenter>) {
        *self.inner.presenter.write().unwrap_or_else(|e| {
            tracing::warn!("PolicyGate presenter lock poisoned, recovering");
            e.into_inner()
        }) = Some(presenter);
    }

    /// Submit a request using the configured confirmation deadline.
    pub fn submit(&self, request: EffectRequest) -> Submission {
        self.submit_with_deadline(request, self.inner.config.confirmation_timeout)
    }

    /// Submit a request with an explicit confirmation deadline.
    ///
    /// `None` keeps a pending confirmation until a verdict or cancellation.
    /// Timers and presentation run on the current Tokio runtime; without one
    /// the confirmation stays pending until resolved explicitly.
    pub fn submit_with_deadline(
        &self,
        request: EffectRequest,
        deadline: Option<Duration>,
    ) -> Submission {
        if let Some(existing) = self.inner.existing(&request.id) {
            tracing::debug!(request_id = %request.id, "redelivered request");
            return existing;
        }

        match self.inner.evaluate(&request) {
            Evaluation::Decided {
                response,
                reason,
                notice,
            } => self.inner.settle(&request, response, reason, notice),
            Evaluation::Confirm {
                target,
                policy,
                modified_scope,
            } => self.enqueue(request, &target, policy, modified_scope, deadline),
        }
    }

    /// Resolve a pending confirmation with a human verdict.
    ///
    /// The verdict applies to every request sharing the confirmation slot.
    /// Resolving an already-decided request returns its recorded response.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownRequest`] if no pending or decided
    /// request has this id.
    pub fn resolve_confirmation(
        &self,
        request_id: &str,
        verdict: Verdict,
    ) -> PolicyResult<EffectResponse> {
        let mut state = self.inner.lock_state();
        if let Some(response) = state.ledger.get(request_id) {
            return Ok(response.clone());
        }
        let slot = state
            .pending
            .get(request_id)
            .map(|entry| entry.slot.clone())
            .ok_or_else(|| PolicyError::UnknownRequest(request_id.to_string()))?;

        let ids = state.slots.remove(&slot).unwrap_or_default();
        let entries: Vec<PendingEntry> =
            ids.iter().filter_map(|id| state.pending.remove(id)).collect();

        let mut grant = None;
        let mut settled = Vec::with_capacity(entries.len());
        for entry in entries {
            let response = if verdict.approved {
                let approval = approval_type(entry.request.effect_type, entry.policy, &verdict);
                let expires_at = self.inner.grant_expiry(approval);
                if approval.caches_grant() && grant.is_none() {
                    grant = Some(Grant::new(
                        entry.slot.clone(),
                        approval,
                        expires_at,
                        entry.request.id.clone(),
                    ));
                }
                EffectResponse::approve(entry.request.id.clone(), approval).with_expiry(expires_at)
            } else {
                let reason = verdict
                    .reason
                    .clone()
                    .unwrap_or_else(|| "denied by user".to_string());
                EffectResponse::deny(entry.request.id.clone(), DenialCode::UserDenied, reason)
            }
            .with_scope(entry.modified_scope.clone());

            let stored = state.ledger.record(response);
            entry.tx.send_replace(Some(stored.clone()));
            settled.push((entry, stored));
        }

        // Recorded while the state lock is held so an identical request
        // submitted right after the verdict observes the grant.
        let recorded_grant = grant.and_then(|grant| match self.inner.grants.insert(grant.clone()) {
            Ok(()) => Some(grant),
            Err(e) => {
                tracing::warn!(error = %e, "failed to record grant; approval is one-time");
                None
            },
        });
        drop(state);

        if let Some(grant) = recorded_grant {
            tracing::debug!(grant = %grant.key, policy = %grant.policy, "grant recorded");
            self.inner.audit(
                REVIEWER_ACTOR,
                AuditAction::GrantRecorded {
                    effect_type: grant.key.effect_type,
                    target: grant.key.target.clone(),
                    policy: grant.policy,
                },
            );
        }

        let mut result = None;
        for (entry, response) in settled {
            self.inner.log_outcome(
                REVIEWER_ACTOR,
                &entry.request,
                &response,
                entry.risk,
                verdict.reason.clone(),
            );
            if entry.request.id == request_id {
                result = Some(response);
            }
        }
        result.ok_or_else(|| PolicyError::UnknownRequest(request_id.to_string()))
    }

    /// Deny every pending confirmation raised by `task_id` with `timeout`.
    ///
    /// Returns how many requests were resolved.
    pub fn cancel_task(&self, task_id: &str) -> usize {
        let ids: Vec<String> = {
            let state = self.inner.lock_state();
            state
                .pending
                .values()
                .filter(|e| e.request.context.task_id.as_deref() == Some(task_id))
                .map(|e| e.request.id.clone())
                .collect()
        };
        ids.iter()
            .filter(|id| {
                self.inner
                    .expire(id, "task cancelled", self.presenter().as_ref())
                    .is_some()
            })
            .count()
    }

    /// Drop every session grant. Returns how many were removed.
    pub fn end_session(&self) -> usize {
        let removed = self.inner.grants.clear_session();
        tracing::info!(removed, "session ended; session grants cleared");
        removed
    }

    /// Revoke the grant for an effect type and normalized target.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] if the grant store cannot persist the
    /// change.
    pub fn revoke_grant(&self, key: &GrantKey) -> PolicyResult<bool> {
        let removed = self.inner.grants.revoke(key)?;
        if removed {
            tracing::info!(grant = %key, "grant revoked");
            self.inner.audit(
                SYSTEM_ACTOR,
                AuditAction::GrantRevoked {
                    effect_type: key.effect_type,
                    target: key.target.clone(),
                },
            );
        }
        Ok(removed)
    }

    /// Prompts awaiting a verdict, one per confirmation slot.
    #[must_use]
    pub fn pending_confirmations(&self) -> Vec<ConfirmationPrompt> {
        let state = self.inner.lock_state();
        let mut prompts: Vec<ConfirmationPrompt> = state
            .slots
            .values()
            .filter_map(|ids| ids.first())
            .filter_map(|id| state.pending.get(id))
            .map(|entry| entry.prompt.clone())
            .collect();
        prompts.sort_by(|a, b| a.request.timestamp.cmp(&b.request.timestamp));
        prompts
    }

    /// Number of requests awaiting a verdict.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// The recorded response for a request id, if decided.
    #[must_use]
    pub fn response_for(&self, request_id: &str) -> Option<EffectResponse> {
        self.inner.lock_state().ledger.get(request_id).cloned()
    }

    fn presenter(&self) -> Option<Arc<dyn ConfirmationPresenter>> {
        self.inner.presenter()
    }

    fn enqueue(
        &self,
        request: EffectRequest,
        target: &EffectTarget,
        policy: ConfirmationPolicy,
        modified_scope: Option<EffectScope>,
        deadline: Option<Duration>,
    ) -> Submission {
        let risk = taxonomy::risk_score(request.effect_type);
        let slot = GrantKey::new(request.effect_type, target.normalized());
        let prompt = ConfirmationPrompt::new(&request, target, risk, policy, true);
        let (tx, rx) = watch::channel(None);
        let request_id = request.id.clone();

        let leader = {
            let mut state = self.inner.lock_state();
            if let Some(response) = state.ledger.get(&request_id) {
                return Submission::Decided(response.clone());
            }
            if let Some(entry) = state.pending.get(&request_id) {
                return Submission::Pending(PendingHandle {
                    request_id,
                    rx: entry.tx.subscribe(),
                });
            }
            let ids = state.slots.entry(slot.clone()).or_default();
            let leader = ids.first().cloned();
            ids.push(request_id.clone());
            state.pending.insert(
                request_id.clone(),
                PendingEntry {
                    request: request.clone(),
                    slot,
                    policy,
                    risk,
                    modified_scope,
                    prompt: prompt.clone(),
                    tx,
                },
            );
            leader
        };

        let reason = match &leader {
            Some(leader) => format!("joined pending confirmation {leader}"),
            None => "awaiting confirmation".to_string(),
        };
        tracing::info!(
            request_id = %request.id,
            effect_type = %request.effect_type,
            policy = %policy,
            risk = %risk,
            "{reason}"
        );
        self.inner.audit(
            &request.actor(),
            AuditAction::EffectDecision {
                request_id: request.id.clone(),
                effect_type: request.effect_type,
                source: request.source,
                decision: Decision::Pending,
                reason: Some(reason),
                denial_code: None,
                approval_type: None,
                risk_score: risk,
            },
        );

        if leader.is_none() {
            self.inner.present(prompt);
        }
        if let Some(deadline) = deadline {
            self.spawn_deadline(request_id.clone(), deadline);
        }

        Submission::Pending(PendingHandle { request_id, rx })
    }

    fn spawn_deadline(&self, request_id: String, deadline: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(request_id = %request_id, "no runtime; confirmation deadline not armed");
            return;
        };
        let weak: Weak<GateInner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Some(inner) = weak.upgrade() {
                let presenter = inner.presenter();
                inner.expire(&request_id, "no verdict before deadline", presenter.as_ref());
            }
        });
    }
}

impl fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyGate")
            .field("pending", &self.pending_count())
            .field("audit", &self.inner.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl GateInner {
    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| {
            tracing::warn!("PolicyGate state lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn presenter(&self) -> Option<Arc<dyn ConfirmationPresenter>> {
        self.presenter
            .read()
            .unwrap_or_else(|e| {
                tracing::warn!("PolicyGate presenter lock poisoned, recovering");
                e.into_inner()
            })
            .clone()
    }

    fn existing(&self, request_id: &str) -> Option<Submission> {
        let state = self.lock_state();
        if let Some(response) = state.ledger.get(request_id) {
            return Some(Submission::Decided(response.clone()));
        }
        state.pending.get(request_id).map(|entry| {
            Submission::Pending(PendingHandle {
                request_id: request_id.to_string(),
                rx: entry.tx.subscribe(),
            })
        })
    }

    fn evaluate(&self, request: &EffectRequest) -> Evaluation {
        let effect_type = request.effect_type;
        let deny = |code: DenialCode, reason: String, scope: Option<EffectScope>| {
            Evaluation::Decided {
                response: EffectResponse::deny(request.id.clone(), code, reason.clone())
                    .with_scope(scope),
                reason: Some(reason),
                notice: None,
            }
        };

        let target = match request.target() {
            Ok(target) => target,
            Err(reason) => {
                return deny(
                    DenialCode::PolicyBlocked,
                    format!("malformed request: {reason}"),
                    None,
                );
            },
        };

        let actor = request.actor();
        if !self.limiter.check(&actor) {
            return deny(
                DenialCode::RateLimited,
                format!("rate limit exceeded for {actor}"),
                None,
            );
        }

        if let Some(reason) = self.config.blocked_reason(effect_type, &target) {
            return deny(DenialCode::PolicyBlocked, reason, None);
        }

        let requested = request.scope.clone().unwrap_or_default();
        let effective = requested.intersect(&self.config.scope);
        let modified_scope = (effective != requested).then(|| effective.clone());
        if let Err(reason) = effective.check(request, &target) {
            return deny(DenialCode::ScopeViolation, reason, modified_scope);
        }

        let policy = self.config.effective_policy(effect_type);
        let approve = |approval: ConfirmationPolicy,
                       expires_at: Option<Timestamp>,
                       reason: String| {
            let notice = self.config.notify_auto_approvals.then(|| {
                ConfirmationPrompt::new(
                    request,
                    &target,
                    taxonomy::risk_score(effect_type),
                    policy,
                    false,
                )
            });
            Evaluation::Decided {
                response: EffectResponse::approve(request.id.clone(), approval)
                    .with_expiry(expires_at)
                    .with_scope(modified_scope.clone()),
                reason: Some(reason),
                notice,
            }
        };

        if policy != ConfirmationPolicy::Never
            && taxonomy::is_permitted(effect_type, ConfirmationPolicy::Never)
            && self.config.allowlists.covers(&target)
        {
            return approve(ConfirmationPolicy::Never, None, "allowlisted".to_string());
        }
        if policy == ConfirmationPolicy::Never {
            return approve(ConfirmationPolicy::Never, None, "policy never".to_string());
        }
        if policy != ConfirmationPolicy::Always {
            let key = GrantKey::new(effect_type, target.normalized());
            if let Some(grant) = self.grants.lookup(&key, &Timestamp::now())
                && taxonomy::is_permitted(effect_type, grant.policy)
            {
                tracing::debug!(request_id = %request.id, grant = %key, "grant hit");
                return approve(
                    grant.policy,
                    grant.expires_at,
                    format!("{} grant from {}", grant.policy, grant.request_id),
                );
            }
        }

        Evaluation::Confirm {
            target,
            policy,
            modified_scope,
        }
    }

    /// Record a synchronous decision, unless a concurrent delivery of the
    /// same id got there first.
    fn settle(
        &self,
        request: &EffectRequest,
        response: EffectResponse,
        reason: Option<String>,
        notice: Option<ConfirmationPrompt>,
    ) -> Submission {
        let (stored, first) = {
            let mut state = self.lock_state();
            if let Some(entry) = state.pending.get(&request.id) {
                return Submission::Pending(PendingHandle {
                    request_id: request.id.clone(),
                    rx: entry.tx.subscribe(),
                });
            }
            let first = state.ledger.get(&request.id).is_none();
            (state.ledger.record(response), first)
        };

        if first {
            self.log_outcome(
                &request.actor(),
                request,
                &stored,
                taxonomy::risk_score(request.effect_type),
                reason,
            );
            if let Some(notice) = notice.filter(|_| stored.approved) {
                self.present(notice);
            }
        }
        Submission::Decided(stored)
    }

    /// Deny one pending request with `timeout`. Returns the response if the
    /// request was still pending.
    fn expire(
        &self,
        request_id: &str,
        reason: &str,
        presenter: Option<&Arc<dyn ConfirmationPresenter>>,
    ) -> Option<EffectResponse> {
        let (entry, stored, promoted) = {
            let mut state = self.lock_state();
            let entry = state.pending.remove(request_id)?;
            let mut promoted = None;
            if let Some(ids) = state.slots.get_mut(&entry.slot) {
                let was_leader = ids.first().is_some_and(|id| id == request_id);
                ids.retain(|id| id != request_id);
                if ids.is_empty() {
                    state.slots.remove(&entry.slot);
                } else if was_leader {
                    promoted = ids.first().cloned();
                }
            }
            let promoted = promoted
                .and_then(|id| state.pending.get(&id))
                .map(|next| next.prompt.clone());

            let response = EffectResponse::deny(request_id, DenialCode::Timeout, reason)
                .with_scope(entry.modified_scope.clone());
            let stored = state.ledger.record(response);
            entry.tx.send_replace(Some(stored.clone()));
            (entry, stored, promoted)
        };

        self.log_outcome(
            SYSTEM_ACTOR,
            &entry.request,
            &stored,
            entry.risk,
            Some(reason.to_string()),
        );
        // The slot still has waiters: the next one takes over the prompt.
        if let (Some(prompt), Some(presenter)) = (promoted, presenter) {
            spawn_present(Arc::clone(presenter), prompt);
        }
        Some(stored)
    }

    fn grant_expiry(&self, approval: ConfirmationPolicy) -> Option<Timestamp> {
        match approval {
            ConfirmationPolicy::Session => self
                .config
                .session_grant_ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .map(|ttl| Timestamp::now().plus(ttl)),
            _ => None,
        }
    }

    fn present(&self, prompt: ConfirmationPrompt) {
        match self.presenter() {
            Some(presenter) if presenter.is_available() => spawn_present(presenter, prompt),
            Some(_) => tracing::warn!(
                request_id = %prompt.request_id,
                "presenter unavailable; confirmation stays pending"
            ),
            None => tracing::debug!(
                request_id = %prompt.request_id,
                "no presenter registered; confirmation stays pending"
            ),
        }
    }

    fn log_outcome(
        &self,
        actor: &str,
        request: &EffectRequest,
        response: &EffectResponse,
        risk: RiskScore,
        reason: Option<String>,
    ) {
        let reason = response.denial_reason.clone().or(reason);
        if response.approved {
            tracing::info!(
                request_id = %request.id,
                effect_type = %request.effect_type,
                source = %request.source,
                approval_type = ?response.approval_type,
                reason = reason.as_deref().unwrap_or_default(),
                "effect approved"
            );
        } else {
            tracing::info!(
                request_id = %request.id,
                effect_type = %request.effect_type,
                source = %request.source,
                denial_code = ?response.denial_code,
                reason = reason.as_deref().unwrap_or_default(),
                "effect denied"
            );
        }
        self.audit(
            actor,
            AuditAction::EffectDecision {
                request_id: request.id.clone(),
                effect_type: request.effect_type,
                source: request.source,
                decision: if response.approved {
                    Decision::Approved
                } else {
                    Decision::Denied
                },
                reason,
                denial_code: response.denial_code,
                approval_type: response.approval_type,
                risk_score: risk,
            },
        );
    }

    /// Appends on the calling thread. `submit` and `resolve_confirmation`
    /// are synchronous, so a file-backed log's lock and sync happen inline.
    fn audit(&self, actor: &str, action: AuditAction) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.record(actor, action)
        {
            tracing::warn!(error = %e, "failed to record audit entry");
        }
    }
}

fn spawn_present(presenter: Arc<dyn ConfirmationPresenter>, prompt: ConfirmationPrompt) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move { presenter.present(prompt).await });
        },
        Err(_) => tracing::warn!(
            request_id = %prompt.request_id,
            "no runtime; prompt not presented"
        ),
    }
}

/// Approval type granted by a verdict.
///
/// A verdict may pick how long the approval is remembered, within what the
/// effect permits. `always` effects are never remembered.
fn approval_type(
    effect_type: EffectType,
    policy: ConfirmationPolicy,
    verdict: &Verdict,
) -> ConfirmationPolicy {
    match verdict.approval_type {
        Some(requested)
            if policy != ConfirmationPolicy::Always
                && requested != ConfirmationPolicy::Never
                && taxonomy::is_permitted(effect_type, requested) =>
        {
            requested
        },
        _ => policy,
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
