//! Caller-side request broker.
//!
//! The broker owns one [`ExecutionContext`], started on the first call. It
//! assigns correlation ids, tracks pending calls with timeouts and routes
//! responses back to their callers regardless of arrival order.

use super::context::{ContextEvent, ExecutionContext};
use super::pending::{PendingCalls, PendingReceiver};
use crate::config::BridgeConfig;
use crate::core::{Call, CallOutput, ComputationRequest, RawCall, RequestBody};
use crate::engine::{EngineLoader, builtin_loader};
use crate::error::{Error, Result, TransportError};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Produces a fresh engine loader each time a context starts.
pub type LoaderFactory = Box<dyn Fn() -> EngineLoader + Send + Sync>;

enum State {
    Idle,
    Running {
        context: ExecutionContext,
        router: JoinHandle<()>,
    },
    Closed,
}

#[derive(Debug, Default)]
struct Shared {
    pending: PendingCalls,
    failure: Mutex<Option<TransportError>>,
}

impl Shared {
    fn failure(&self) -> Option<TransportError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fail(&self, error: TransportError) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if failure.is_none() {
                *failure = Some(error.clone());
            }
        }
        let rejected = self.pending.fail_all(&error);
        if rejected > 0 {
            tracing::error!(rejected, error = %error, "rejected pending calls");
        }
    }
}

/// Async front end to the execution context.
///
/// Calls are issued from async code; each suspends only its own task while
/// waiting. A timeout abandons the caller's wait but does not interrupt the
/// computation, which keeps the context busy until it finishes.
///
/// After the context terminates or faults, every pending and future call
/// fails with [`Error::Transport`]; create a new broker to recover.
///
/// # Examples
///
/// ```no_run
/// use pskit_bridge::bridge::RequestBroker;
/// use pskit_bridge::config::BridgeConfig;
/// use pskit_bridge::core::{Call, StructureFormat};
///
/// # async fn run() -> pskit_bridge::Result<()> {
/// let broker = RequestBroker::new(BridgeConfig::default());
/// let bytes = std::fs::read("1abc.pdb")?;
/// let output = broker
///     .call(Call::SplitByChain { bytes, format: StructureFormat::Pdb }, None)
///     .await?;
/// println!("{:?}", output.kind());
/// broker.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct RequestBroker {
    config: BridgeConfig,
    factory: LoaderFactory,
    state: Mutex<State>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RequestBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBroker")
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl RequestBroker {
    /// Creates a broker backed by the built-in engine.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_loader(config, builtin_loader)
    }

    /// Creates a broker whose context loads its engine from `factory`.
    #[must_use]
    pub fn with_loader<F>(config: BridgeConfig, factory: F) -> Self
    where
        F: Fn() -> EngineLoader + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(factory),
            state: Mutex::new(State::Idle),
            shared: Arc::new(Shared::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once the execution context has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(*self.lock_state(), State::Running { .. })
    }

    /// Returns the transport error that ended the context, if any.
    #[must_use]
    pub fn failure(&self) -> Option<TransportError> {
        self.shared.failure()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Invokes a typed call.
    ///
    /// `timeout` overrides [`BridgeConfig::call_timeout`]. The call's input
    /// buffer moves to the context.
    ///
    /// # Errors
    ///
    /// Returns the call's validation or engine error, [`Error::Timeout`] if
    /// no response arrived in time, or [`Error::Transport`] if the context
    /// is unusable.
    pub async fn call(&self, call: Call, timeout: Option<Duration>) -> Result<CallOutput> {
        self.submit(RequestBody::Typed(call), timeout).await
    }

    /// Invokes a call given in wire shape; the context decodes it.
    ///
    /// # Errors
    ///
    /// Same as [`RequestBroker::call`], plus parameter decoding errors.
    pub async fn call_raw(
        &self,
        function: &str,
        params: Map<String, Value>,
        bytes: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<CallOutput> {
        let raw = RawCall::new(function, params, bytes);
        self.submit(RequestBody::Raw(raw), timeout).await
    }

    async fn submit(&self, body: RequestBody, timeout: Option<Duration>) -> Result<CallOutput> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let function = body.label().to_string();

        let mut receiver = {
            let mut state = self.lock_state();
            let context = self.ensure_started(&mut state)?;
            let receiver = self.shared.pending.register(id);
            if let Err(e) = context.send(ComputationRequest { id, body }) {
                self.shared.pending.expire(id);
                return Err(e.into());
            }
            receiver
        };
        tracing::debug!(id, function = %function, "call dispatched");

        let timeout = timeout.unwrap_or(self.config.call_timeout);
        let waited = tokio::time::timeout(timeout, &mut receiver).await;
        match waited {
            Ok(received) => settle(received, id),
            Err(_) => {
                after_deadline(&self.shared.pending, id, &function, receiver, timeout).await
            }
        }
    }

    fn ensure_started<'a>(&self, state: &'a mut State) -> Result<&'a ExecutionContext> {
        if matches!(state, State::Closed) {
            return Err(TransportError::Closed.into());
        }
        if let Some(failure) = self.shared.failure() {
            return Err(failure.into());
        }
        if matches!(state, State::Idle) {
            let (context, events) =
                ExecutionContext::spawn((self.factory)(), &self.config.worker_name)?;
            let router = tokio::spawn(route(Arc::clone(&self.shared), events));
            *state = State::Running { context, router };
        }
        match state {
            State::Running { context, .. } => Ok(context),
            State::Idle | State::Closed => Err(Error::InvalidState {
                message: "execution context not running".to_string(),
            }),
        }
    }

    /// Shuts the context down and rejects anything still pending.
    ///
    /// Waits for the computation in progress, if any, to finish. Later
    /// calls fail with [`TransportError::Closed`].
    pub async fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), State::Closed);
        self.shared.pending.fail_all(&TransportError::Closed);
        if let State::Running { context, router } = previous {
            if let Some(worker) = context.shutdown() {
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
            }
            let _ = router.await;
            tracing::info!("execution context disposed");
        }
    }
}

fn settle(
    received: std::result::Result<Result<CallOutput>, oneshot::error::RecvError>,
    id: u64,
) -> Result<CallOutput> {
    received.unwrap_or_else(|_| {
        Err(TransportError::ContextTerminated {
            reason: format!("call {id} was abandoned by the context"),
        }
        .into())
    })
}

// Whoever removes the entry completes the wait. If the router or a failure
// removed it as the deadline fired, its send is imminent.
async fn after_deadline(
    pending: &PendingCalls,
    id: u64,
    function: &str,
    receiver: PendingReceiver,
    timeout: Duration,
) -> Result<CallOutput> {
    if pending.expire(id) {
        let timeout_ms = timeout.as_millis();
        tracing::warn!(id, function, timeout_ms, "call timed out");
        return Err(Error::Timeout { id, timeout_ms });
    }
    settle(receiver.await, id)
}

// Runs until the worker drops its event sender, which happens only after it
// has stopped accepting requests.
async fn route(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<ContextEvent>) {
    let mut fault = None;
    while let Some(event) = events.recv().await {
        match event {
            ContextEvent::Response(response) => {
                shared.pending.resolve(response);
            }
            ContextEvent::Fault(reason) => {
                tracing::error!(reason = %reason, "execution context fault");
                let error = TransportError::Fault { reason };
                shared.fail(error.clone());
                fault = Some(error);
            }
        }
    }
    shared.fail(fault.unwrap_or_else(|| TransportError::ContextTerminated {
        reason: "worker exited".to_string(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StructureFormat;
    use crate::engine::testdata::{COMPLEX_PDB, TWO_CHAINS_PDB};
    use crate::error::ValidationError;
    use serde_json::json;

    fn split(bytes: &[u8]) -> Call {
        Call::SplitByChain {
            bytes: bytes.to_vec(),
            format: StructureFormat::Pdb,
        }
    }

    #[tokio::test]
    async fn test_lazy_start_and_call() {
        let broker = RequestBroker::new(BridgeConfig::default());
        assert!(!broker.is_started());

        let output = broker.call(split(TWO_CHAINS_PDB), None).await.unwrap();
        assert!(broker.is_started());
        assert_eq!(output.kind(), crate::core::HandleKind::Chunks);
        assert_eq!(broker.pending_count(), 0);
        broker.dispose().await;
    }

    #[tokio::test]
    async fn test_call_raw_fragment_with_nulls() {
        let broker = RequestBroker::new(BridgeConfig::default());
        let params = json!({"chain_id": "A", "start": null, "end": null, "format": "pdb"});
        let output = broker
            .call_raw(
                "extract_fragment",
                params.as_object().cloned().unwrap_or_default(),
                COMPLEX_PDB.to_vec(),
                None,
            )
            .await
            .unwrap();
        match output {
            CallOutput::Fragment { start, end, .. } => assert_eq!((start, end), (1, 10)),
            other => unreachable!("unexpected output {other:?}"),
        }
        broker.dispose().await;
    }

    #[tokio::test]
    async fn test_validation_error_keeps_broker_usable() {
        let broker = RequestBroker::new(BridgeConfig::default());
        let err = broker
            .call_raw("fold", Map::new(), vec![1], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnsupportedFunction { .. })
        ));
        assert!(broker.call(split(TWO_CHAINS_PDB), None).await.is_ok());
        broker.dispose().await;
    }

    #[tokio::test]
    async fn test_deadline_without_claim_times_out() {
        let pending = PendingCalls::new();
        let receiver = pending.register(9);
        let timeout = Duration::from_millis(5);
        let err = after_deadline(&pending, 9, "split_by_chain", receiver, timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { id: 9, timeout_ms: 5 }));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_waits_for_claimed_response() {
        let pending = PendingCalls::new();
        let receiver = pending.register(4);
        let sender = pending.claim(4).unwrap();
        let expected = CallOutput::Fragment {
            bytes: vec![1],
            start: 1,
            end: 3,
        };
        let sent = expected.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = sender.send(Ok(sent));
        });

        let output = after_deadline(&pending, 4, "extract_fragment", receiver, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_calls_after_dispose_fail() {
        let broker = RequestBroker::new(BridgeConfig::default());
        broker.call(split(TWO_CHAINS_PDB), None).await.unwrap();
        broker.dispose().await;
        let err = broker.call(split(TWO_CHAINS_PDB), None).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }
}
