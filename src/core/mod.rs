//! Core domain models for pskit-bridge.
//!
//! Result handles with take-once extraction, the request/response messages
//! exchanged with the execution context, and the batch input/artifact
//! records. These are pure domain models with no I/O dependencies.

pub mod artifact;
pub mod handle;
pub mod input;
pub mod protocol;

pub use artifact::{ArtifactGroup, BatchArtifact, artifact_filename, group_by_source};
pub use handle::{
    BindingPairs, Chunks, ContactMap, Fragment, HandleGuard, HandleKind, Release, ResourceHandle,
    TakeOnce,
};
pub use input::{BatchInput, InputDescriptor, StructureFormat, sanitize_key, strip_extension};
pub use protocol::{
    Call, CallFailure, CallOutput, ChunkItem, ComputationRequest, ComputationResponse,
    FunctionName, RawCall, RequestBody,
};
