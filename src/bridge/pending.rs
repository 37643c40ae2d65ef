//! Correlation table of in-flight calls.
//!
//! Each entry is removed exactly once, by whichever of response arrival,
//! timeout or context failure happens first. The remover is the only party
//! that may complete the caller's wait.

use crate::core::{CallOutput, ComputationResponse};
use crate::error::{Result, TransportError};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Receiving end of one pending call.
pub type PendingReceiver = oneshot::Receiver<Result<CallOutput>>;

/// Pending calls keyed by correlation id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<u64, oneshot::Sender<Result<CallOutput>>>>,
}

impl PendingCalls {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<CallOutput>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id` and returns the receiver its outcome will arrive on.
    ///
    /// Re-registering a live id replaces the previous entry, whose receiver
    /// then observes a closed channel.
    pub fn register(&self, id: u64) -> PendingReceiver {
        let (tx, rx) = oneshot::channel();
        if self.lock().insert(id, tx).is_some() {
            tracing::warn!(id, "correlation id registered twice");
        }
        rx
    }

    /// Completes the call matching the response's id.
    ///
    /// Returns `false` and drops the response when no call is waiting, e.g.
    /// because it already timed out.
    pub fn resolve(&self, response: ComputationResponse) -> bool {
        let ComputationResponse { id, outcome } = response;
        let Some(tx) = self.claim(id) else {
            tracing::warn!(id, "dropping response for unknown or expired call");
            return false;
        };
        // the caller may have stopped listening; the entry is gone either way
        let _ = tx.send(outcome.map_err(Into::into));
        true
    }

    /// Removes `id` and hands its sender to the caller, who becomes
    /// responsible for completing the wait.
    pub fn claim(&self, id: u64) -> Option<oneshot::Sender<Result<CallOutput>>> {
        self.lock().remove(&id)
    }

    /// Removes `id` without completing it. Returns `true` if it was pending.
    pub fn expire(&self, id: u64) -> bool {
        self.claim(id).is_some()
    }

    /// Rejects every pending call with `error`. Returns how many there were.
    pub fn fail_all(&self, error: &TransportError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone().into()));
        }
        count
    }

    /// Number of calls still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no call is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CallOutput;
    use crate::error::{EngineError, Error};

    fn fragment(start: i64) -> CallOutput {
        CallOutput::Fragment {
            bytes: vec![1],
            start,
            end: start,
        }
    }

    #[test]
    fn test_out_of_order_resolution() {
        let pending = PendingCalls::new();
        let mut a = pending.register(1);
        let mut b = pending.register(2);

        assert!(pending.resolve(ComputationResponse {
            id: 2,
            outcome: Ok(fragment(20)),
        }));
        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap().unwrap(), fragment(20));

        assert!(pending.resolve(ComputationResponse {
            id: 1,
            outcome: Ok(fragment(10)),
        }));
        assert_eq!(a.try_recv().unwrap().unwrap(), fragment(10));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_failure_outcome_is_typed() {
        let pending = PendingCalls::new();
        let mut rx = pending.register(5);
        pending.resolve(ComputationResponse {
            id: 5,
            outcome: Err(EngineError::NotAComplex.into()),
        });
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::NotAComplex)));
    }

    #[test]
    fn test_late_response_is_dropped() {
        let pending = PendingCalls::new();
        let _rx = pending.register(3);
        assert!(pending.expire(3));
        assert!(!pending.expire(3));
        assert!(!pending.resolve(ComputationResponse {
            id: 3,
            outcome: Ok(fragment(1)),
        }));
    }

    #[test]
    fn test_fail_all() {
        let pending = PendingCalls::new();
        let mut a = pending.register(1);
        let mut b = pending.register(2);
        let failed = pending.fail_all(&TransportError::ContextTerminated {
            reason: "worker exited".to_string(),
        });
        assert_eq!(failed, 2);
        assert!(pending.is_empty());
        assert!(a.try_recv().unwrap().unwrap_err().is_transport());
        assert!(b.try_recv().unwrap().unwrap_err().is_transport());
    }
}
