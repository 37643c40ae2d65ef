//! The isolated execution context.
//!
//! A dedicated OS thread owns the engine. It receives requests in issuance
//! order, runs them one at a time, releases every handle it creates and
//! emits exactly one response per request. Engine errors become typed
//! failure responses; only a crash of the worker itself is reported as a
//! fault.

use crate::core::{
    CallFailure, CallOutput, ChunkItem, ComputationRequest, ComputationResponse, HandleGuard,
    RequestBody, ResourceHandle,
};
use crate::engine::{EngineLoader, LazyEngine, dispatch};
use crate::error::TransportError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Message emitted by the worker.
#[derive(Debug)]
pub enum ContextEvent {
    /// Outcome of one request.
    Response(ComputationResponse),
    /// The worker crashed; no further events follow.
    Fault(String),
}

/// Handle to a running worker thread.
///
/// Dropping it closes the request channel; the worker finishes its current
/// request and exits. After [`ExecutionContext::shutdown`], requests still
/// queued are dropped unanswered.
#[derive(Debug)]
pub struct ExecutionContext {
    requests: mpsc::UnboundedSender<ComputationRequest>,
    worker: Option<JoinHandle<()>>,
    closing: Arc<AtomicBool>,
    name: String,
}

impl ExecutionContext {
    /// Starts the worker thread.
    ///
    /// The engine loader runs lazily on the worker, on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SpawnFailed`] if the thread cannot start.
    pub fn spawn(
        loader: EngineLoader,
        name: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ContextEvent>), TransportError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closing = Arc::new(AtomicBool::new(false));
        let worker_closing = Arc::clone(&closing);

        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(loader, request_rx, &event_tx, &worker_closing))
            .map_err(|e| TransportError::SpawnFailed {
                reason: e.to_string(),
            })?;
        tracing::info!(context = name, "execution context started");

        Ok((
            Self {
                requests: request_tx,
                worker: Some(worker),
                closing,
                name: name.to_string(),
            },
            event_rx,
        ))
    }

    /// Queues a request. Ownership of its buffers moves to the worker.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ContextTerminated`] if the worker is gone.
    pub fn send(&self, request: ComputationRequest) -> Result<(), TransportError> {
        self.requests
            .send(request)
            .map_err(|_| TransportError::ContextTerminated {
                reason: format!("{} is no longer accepting requests", self.name),
            })
    }

    /// Returns `true` while the worker accepts requests.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.requests.is_closed()
    }

    /// Thread name of the worker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Closes the request channel and hands back the thread for joining.
    ///
    /// The request in progress, if any, runs to completion; queued ones are
    /// dropped.
    #[must_use]
    pub fn shutdown(mut self) -> Option<JoinHandle<()>> {
        tracing::info!(context = %self.name, "execution context shutting down");
        self.closing.store(true, Ordering::Release);
        self.worker.take()
    }
}

fn run_worker(
    loader: EngineLoader,
    mut requests: mpsc::UnboundedReceiver<ComputationRequest>,
    events: &mpsc::UnboundedSender<ContextEvent>,
    closing: &AtomicBool,
) {
    let mut engine = LazyEngine::new(loader);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        while let Some(request) = requests.blocking_recv() {
            if closing.load(Ordering::Acquire) {
                tracing::debug!(id = request.id, "dropping request queued before shutdown");
                continue;
            }
            let response = handle_request(&mut engine, request);
            if events.send(ContextEvent::Response(response)).is_err() {
                break;
            }
        }
    }));
    if let Err(payload) = result {
        let reason = panic_message(payload.as_ref());
        tracing::error!(reason = %reason, "execution context crashed");
        let _ = events.send(ContextEvent::Fault(reason));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

/// Runs one request against the engine.
pub(crate) fn handle_request(
    engine: &mut LazyEngine,
    request: ComputationRequest,
) -> ComputationResponse {
    let ComputationRequest { id, body } = request;
    tracing::debug!(id, function = body.label(), "executing call");
    let outcome = execute(engine, body);
    if let Err(failure) = &outcome {
        tracing::debug!(id, error = %failure, "call failed");
    }
    ComputationResponse { id, outcome }
}

fn execute(engine: &mut LazyEngine, body: RequestBody) -> Result<CallOutput, CallFailure> {
    let call = match body {
        RequestBody::Typed(call) => call,
        RequestBody::Raw(raw) => raw.decode()?,
    };
    call.validate()?;
    let handle = dispatch(engine.get()?, call)?;
    Ok(extract(handle))
}

/// Takes every field of `handle`, then releases it.
pub(crate) fn extract(handle: ResourceHandle) -> CallOutput {
    match handle {
        ResourceHandle::Chunks(chunks) => {
            let mut chunks = HandleGuard::new(chunks);
            let items = chunks
                .keys()
                .into_iter()
                .filter_map(|key| {
                    let bytes = chunks.take(&key)?;
                    Some(ChunkItem { key, bytes })
                })
                .collect();
            CallOutput::Chunks { items }
        }
        ResourceHandle::Fragment(fragment) => {
            let mut fragment = HandleGuard::new(fragment);
            CallOutput::Fragment {
                bytes: fragment.take_bytes().unwrap_or_default(),
                start: fragment.start(),
                end: fragment.end(),
            }
        }
        ResourceHandle::BindingPairs(pairs) => {
            let mut pairs = HandleGuard::new(pairs);
            CallOutput::BindingPairs {
                pairs: pairs.take_pairs().unwrap_or_default(),
                distances: pairs.take_distances().unwrap_or_default(),
            }
        }
        ResourceHandle::ContactMap(map) => {
            let mut map = HandleGuard::new(map);
            CallOutput::ContactMap {
                axis: map.take_axis().unwrap_or_default(),
                values: map.take_values().unwrap_or_default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Call, Chunks, RawCall, StructureFormat};
    use crate::engine::{ComputationEngine, builtin_loader};
    use crate::engine::testdata::{COMPLEX_PDB, TWO_CHAINS_PDB};
    use crate::error::{EngineError, ValidationError};
    use std::collections::BTreeMap;

    fn request(id: u64, call: Call) -> ComputationRequest {
        ComputationRequest {
            id,
            body: RequestBody::Typed(call),
        }
    }

    #[test]
    fn test_extract_takes_all_chunks() {
        let mut parts = BTreeMap::new();
        parts.insert("B".to_string(), vec![2]);
        parts.insert("A".to_string(), vec![1]);
        let output = extract(ResourceHandle::Chunks(Chunks::new(parts)));
        assert_eq!(
            output,
            CallOutput::Chunks {
                items: vec![
                    ChunkItem {
                        key: "A".to_string(),
                        bytes: vec![1]
                    },
                    ChunkItem {
                        key: "B".to_string(),
                        bytes: vec![2]
                    },
                ]
            }
        );
    }

    #[test]
    fn test_handle_request_success() {
        let mut engine = LazyEngine::new(builtin_loader());
        let response = handle_request(
            &mut engine,
            request(
                1,
                Call::SplitByChain {
                    bytes: TWO_CHAINS_PDB.to_vec(),
                    format: StructureFormat::Pdb,
                },
            ),
        );
        assert_eq!(response.id, 1);
        match response.outcome {
            Ok(CallOutput::Chunks { items }) => {
                let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
                assert_eq!(keys, vec!["A", "B"]);
                assert!(items.iter().all(|i| !i.bytes.is_empty()));
            }
            other => unreachable!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_validation_runs_before_engine_load() {
        let mut engine = LazyEngine::new(Box::new(
            || -> Result<Box<dyn ComputationEngine>, EngineError> {
                Err(EngineError::Load {
                    reason: "should not load".to_string(),
                })
            },
        ));
        let response = handle_request(
            &mut engine,
            request(
                2,
                Call::SplitComplex {
                    bytes: Vec::new(),
                    format: StructureFormat::Pdb,
                },
            ),
        );
        assert!(matches!(
            response.outcome,
            Err(CallFailure::Validation(ValidationError::InvalidParameter { .. }))
        ));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_raw_request_unknown_function() {
        let mut engine = LazyEngine::new(builtin_loader());
        let response = handle_request(
            &mut engine,
            ComputationRequest {
                id: 3,
                body: RequestBody::Raw(RawCall::new("fold", serde_json::Map::new(), vec![1])),
            },
        );
        assert_eq!(
            response.outcome,
            Err(CallFailure::Validation(ValidationError::UnsupportedFunction {
                name: "fold".to_string()
            }))
        );
    }

    #[test]
    fn test_engine_error_becomes_failure_response() {
        let mut engine = LazyEngine::new(builtin_loader());
        let response = handle_request(
            &mut engine,
            request(
                4,
                Call::AnnotateBindingPairs {
                    bytes: TWO_CHAINS_PDB.to_vec(),
                    cutoff: 5.0,
                    format: StructureFormat::Pdb,
                },
            ),
        );
        assert_eq!(response.outcome, Err(EngineError::NotAComplex.into()));
    }

    #[tokio::test]
    async fn test_context_processes_in_order() {
        let (context, mut events) = ExecutionContext::spawn(builtin_loader(), "ctx-order").unwrap();
        assert!(context.is_alive());
        for id in 1..=3 {
            context
                .send(request(
                    id,
                    Call::ExtractFragment {
                        bytes: COMPLEX_PDB.to_vec(),
                        chain_id: "A".to_string(),
                        start: None,
                        end: None,
                        format: StructureFormat::Pdb,
                    },
                ))
                .unwrap();
        }
        for expected in 1..=3 {
            match events.recv().await {
                Some(ContextEvent::Response(response)) => assert_eq!(response.id, expected),
                other => unreachable!("unexpected event {other:?}"),
            }
        }

        let worker = context.shutdown().unwrap();
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .unwrap()
            .unwrap();
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_drops_queued_requests() {
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let loader: EngineLoader = Box::new(
            move || -> Result<Box<dyn ComputationEngine>, EngineError> {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                Ok(Box::new(crate::engine::StructureEngine::new()))
            },
        );
        let (context, mut events) = ExecutionContext::spawn(loader, "ctx-drain").unwrap();
        for id in 1..=3 {
            context
                .send(request(
                    id,
                    Call::SplitByChain {
                        bytes: TWO_CHAINS_PDB.to_vec(),
                        format: StructureFormat::Pdb,
                    },
                ))
                .unwrap();
        }
        started_rx.recv().unwrap();

        let worker = context.shutdown().unwrap();
        release_tx.send(()).unwrap();
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .unwrap()
            .unwrap();

        match events.recv().await {
            Some(ContextEvent::Response(response)) => assert_eq!(response.id, 1),
            other => unreachable!("unexpected event {other:?}"),
        }
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported_as_fault() {
        let loader: EngineLoader = Box::new(|| -> Result<Box<dyn ComputationEngine>, EngineError> {
            panic!("engine exploded")
        });
        let (context, mut events) = ExecutionContext::spawn(loader, "ctx-fault").unwrap();
        context
            .send(request(
                1,
                Call::SplitByChain {
                    bytes: TWO_CHAINS_PDB.to_vec(),
                    format: StructureFormat::Pdb,
                },
            ))
            .unwrap();
        match events.recv().await {
            Some(ContextEvent::Fault(reason)) => assert!(reason.contains("engine exploded")),
            other => unreachable!("unexpected event {other:?}"),
        }
        assert!(events.recv().await.is_none());
    }
}
