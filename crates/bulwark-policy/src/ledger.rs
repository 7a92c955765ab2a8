//! Bounded record of decided responses, keyed by request id.

use std::collections::{HashMap, VecDeque};

use crate::request::EffectResponse;

/// Keeps the one response produced for each request id so redelivered
/// requests get the same answer. Oldest entries are evicted past capacity.
#[derive(Debug)]
pub struct ResponseLedger {
    capacity: usize,
    responses: HashMap<String, EffectResponse>,
    order: VecDeque<String>,
}

impl ResponseLedger {
    /// Create a ledger holding at most `capacity` responses (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            responses: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// The response recorded for `request_id`.
    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<&EffectResponse> {
        self.responses.get(request_id)
    }

    /// Record `response` unless one already exists for its request id.
    ///
    /// Returns the response that is now on record.
    pub fn record(&mut self, response: EffectResponse) -> EffectResponse {
        if let Some(existing) = self.responses.get(&response.request_id) {
            return existing.clone();
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.responses.remove(&oldest);
            }
        }
        self.order.push_back(response.request_id.clone());
        self.responses
            .insert(response.request_id.clone(), response.clone());
        response
    }

    /// Number of responses held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::{ConfirmationPolicy, DenialCode};

    #[test]
    fn test_first_response_wins() {
        let mut ledger = ResponseLedger::new(10);
        let first = ledger.record(EffectResponse::approve("r1", ConfirmationPolicy::Never));
        let second = ledger.record(EffectResponse::deny("r1", DenialCode::Timeout, "late"));
        assert!(first.approved);
        assert_eq!(second, first);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut ledger = ResponseLedger::new(2);
        ledger.record(EffectResponse::approve("a", ConfirmationPolicy::Never));
        ledger.record(EffectResponse::approve("b", ConfirmationPolicy::Never));
        ledger.record(EffectResponse::approve("c", ConfirmationPolicy::Never));
        assert!(ledger.get("a").is_none());
        assert!(ledger.get("b").is_some());
        assert!(ledger.get("c").is_some());
    }
}
