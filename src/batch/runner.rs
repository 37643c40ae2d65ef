//! Sequential batch runner.
//!
//! Inputs are processed strictly one after another. A failing input is
//! recorded and the batch moves on; only a transport failure, which makes
//! the bridge unusable for every later input, stops the batch. The outcome
//! then still holds everything produced before the stop.

use crate::core::{BatchArtifact, BatchInput, InputDescriptor};
use crate::error::{Error, Result, TransportError};
use serde::Serialize;
use std::future::Future;

/// Releases whatever a processed result still holds.
///
/// The runner calls this exactly once per successful `process_one`, after
/// artifact conversion, whether or not conversion succeeded.
pub trait Dispose {
    /// Drops remaining payloads. Must tolerate being called on an already
    /// emptied value.
    fn dispose(&mut self);
}

impl Dispose for () {
    fn dispose(&mut self) {}
}

impl<T: Dispose> Dispose for Option<T> {
    fn dispose(&mut self) {
        if let Some(inner) = self.as_mut() {
            inner.dispose();
        }
        *self = None;
    }
}

impl<T: Dispose> Dispose for Vec<T> {
    fn dispose(&mut self) {
        for item in self.iter_mut() {
            item.dispose();
        }
        self.clear();
    }
}

/// Progress report, emitted before each input is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress<'a> {
    /// 1-based position of the current input.
    pub current: usize,
    /// Number of inputs in the batch.
    pub total: usize,
    /// Source name of the current input.
    pub current_file: &'a str,
}

/// One input that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Source name of the input.
    pub source_name: String,
    /// Error text.
    pub message: String,
}

/// Everything a batch produced.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    /// Artifacts in input order.
    pub artifacts: Vec<BatchArtifact>,
    /// Failures in input order.
    pub failures: Vec<BatchFailure>,
    /// Inputs attempted.
    pub processed: usize,
    /// Transport error that stopped the batch before its last input.
    #[serde(skip)]
    pub aborted: Option<TransportError>,
}

impl BatchOutcome {
    /// Returns `true` if every input succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&Progress<'_>) + Send + 'a>;
type ErrorFn<'a> = Box<dyn FnMut(&BatchFailure) + Send + 'a>;

/// Drives a list of inputs through a processing function.
///
/// # Examples
///
/// ```
/// use pskit_bridge::batch::BatchRunner;
/// use pskit_bridge::core::{BatchArtifact, BatchInput};
///
/// async fn accept(_input: BatchInput) -> pskit_bridge::Result<()> {
///     Ok(())
/// }
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let inputs = vec![BatchInput::from_file_name("a.pdb", b"ATOM".to_vec())];
/// let outcome = runtime.block_on(BatchRunner::new().run(inputs, accept, |_, input| {
///     Ok(vec![BatchArtifact::new(input, "A", Vec::new())])
/// }));
/// assert!(outcome.aborted.is_none());
/// assert_eq!(outcome.artifacts.len(), 1);
/// ```
#[derive(Default)]
pub struct BatchRunner<'a> {
    on_progress: Option<ProgressFn<'a>>,
    on_error: Option<ErrorFn<'a>>,
}

impl std::fmt::Debug for BatchRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<'a> BatchRunner<'a> {
    /// Creates a runner without callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Progress<'_>) + Send + 'a,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Sets the per-input failure callback.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&BatchFailure) + Send + 'a,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Processes every input in order.
    ///
    /// `process_one` receives ownership of each input. On success its result
    /// is turned into artifacts by `to_artifacts` and then disposed.
    ///
    /// Errors are collected in [`BatchOutcome::failures`]. The first
    /// [`Error::Transport`] raised by `process_one` stops the batch and is
    /// kept in [`BatchOutcome::aborted`]; the inputs after it are not
    /// attempted.
    pub async fn run<R, P, Fut, C>(
        &mut self,
        inputs: Vec<BatchInput>,
        mut process_one: P,
        mut to_artifacts: C,
    ) -> BatchOutcome
    where
        R: Dispose,
        P: FnMut(BatchInput) -> Fut,
        Fut: Future<Output = Result<R>>,
        C: FnMut(&mut R, &InputDescriptor) -> Result<Vec<BatchArtifact>>,
    {
        let total = inputs.len();
        let mut outcome = BatchOutcome::default();
        tracing::info!(total, "batch started");

        for (index, input) in inputs.into_iter().enumerate() {
            let descriptor = input.descriptor().clone();
            if let Some(callback) = self.on_progress.as_mut() {
                callback(&Progress {
                    current: index + 1,
                    total,
                    current_file: &descriptor.source_name,
                });
            }

            let produced = match process_one(input).await {
                Ok(mut result) => {
                    let converted = to_artifacts(&mut result, &descriptor);
                    result.dispose();
                    converted
                }
                Err(Error::Transport(e)) => {
                    tracing::error!(
                        source = %descriptor.source_name,
                        error = %e,
                        remaining = total - index,
                        "batch aborted"
                    );
                    outcome.aborted = Some(e);
                    break;
                }
                Err(e) => Err(e),
            };
            outcome.processed += 1;

            match produced {
                Ok(artifacts) => {
                    tracing::info!(
                        current = index + 1,
                        total,
                        source = %descriptor.source_name,
                        artifacts = artifacts.len(),
                        "input processed"
                    );
                    outcome.artifacts.extend(artifacts);
                }
                Err(e) => self.record_failure(&mut outcome, &descriptor, &e),
            }
        }

        tracing::info!(
            processed = outcome.processed,
            artifacts = outcome.artifacts.len(),
            failures = outcome.failures.len(),
            "batch finished"
        );
        outcome
    }

    fn record_failure(
        &mut self,
        outcome: &mut BatchOutcome,
        descriptor: &InputDescriptor,
        error: &Error,
    ) {
        let failure = BatchFailure {
            source_name: descriptor.source_name.clone(),
            message: error.to_string(),
        };
        tracing::warn!(source = %failure.source_name, error = %failure.message, "input failed");
        if let Some(callback) = self.on_error.as_mut() {
            callback(&failure);
        }
        outcome.failures.push(failure);
    }
}
