//! Batch orchestration.
//!
//! [`BatchRunner`] drives inputs through the bridge one at a time; the
//! helpers here turn call outputs into named [`BatchArtifact`]s.

pub mod runner;

pub use crate::core::{ArtifactGroup, group_by_source};
pub use runner::{BatchFailure, BatchOutcome, BatchRunner, Dispose, Progress};

use crate::core::{
    BatchArtifact, BindingPairs, CallOutput, Chunks, ContactMap, Fragment, InputDescriptor,
    Release, ResourceHandle,
};
use crate::error::{Error, Result};

impl Dispose for CallOutput {
    fn dispose(&mut self) {
        match self {
            Self::Chunks { items } => items.clear(),
            Self::Fragment { bytes, .. } => bytes.clear(),
            Self::BindingPairs { pairs, distances } => {
                pairs.clear();
                distances.clear();
            }
            Self::ContactMap { axis, values } => {
                axis.clear();
                values.clear();
            }
        }
    }
}

impl Dispose for Chunks {
    fn dispose(&mut self) {
        self.free();
    }
}

impl Dispose for Fragment {
    fn dispose(&mut self) {
        self.free();
    }
}

impl Dispose for BindingPairs {
    fn dispose(&mut self) {
        self.free();
    }
}

impl Dispose for ContactMap {
    fn dispose(&mut self) {
        self.free();
    }
}

impl Dispose for ResourceHandle {
    fn dispose(&mut self) {
        self.free();
    }
}

fn unexpected(expected: &str, output: &CallOutput) -> Error {
    Error::InvalidState {
        message: format!(
            "expected {expected} result, got {}",
            output.kind().as_str()
        ),
    }
}

/// Moves every chunk of a splitting result into an artifact.
///
/// Artifacts are named `<base>.<key>.<format>` and follow key order.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] if `output` is not a chunks result.
pub fn chunks_to_artifacts(
    output: &mut CallOutput,
    input: &InputDescriptor,
) -> Result<Vec<BatchArtifact>> {
    match output {
        CallOutput::Chunks { items } => Ok(std::mem::take(items)
            .into_iter()
            .map(|item| BatchArtifact::new(input, item.key, item.bytes))
            .collect()),
        other => Err(unexpected("chunks", other)),
    }
}

/// Moves a fragment into a single artifact keyed `<chain>_<start>-<end>`.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] if `output` is not a fragment result.
pub fn fragment_to_artifact(
    output: &mut CallOutput,
    input: &InputDescriptor,
    chain_id: &str,
) -> Result<Vec<BatchArtifact>> {
    match output {
        CallOutput::Fragment { bytes, start, end } => Ok(vec![BatchArtifact::new(
            input,
            format!("{chain_id}_{start}-{end}"),
            std::mem::take(bytes),
        )]),
        other => Err(unexpected("fragment", other)),
    }
}
