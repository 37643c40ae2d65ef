//! # pskit-bridge
//!
//! Execution bridge and batch runner for protein-structure computations.
//!
//! Structure computations (complex splitting, chain splitting, fragment
//! extraction, binding-pair annotation, contact maps) run on an isolated
//! worker thread. Async callers talk to it through a [`RequestBroker`],
//! which correlates responses by id, enforces per-call timeouts, and turns
//! a crashed worker into errors on every pending and later call.
//!
//! ## Features
//!
//! - **Take-once handles**: every result field can be moved out exactly
//!   once, and every handle is released on all paths
//! - **Typed calls**: a closed set of functions with validated parameters,
//!   plus a wire-shaped form decoded on the worker
//! - **Batch runs**: sequential processing with per-file failure isolation
//! - **PDB and mmCIF**: a built-in line-oriented engine for both formats

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod batch;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    BatchArtifact, BatchInput, Call, CallOutput, HandleKind, ResourceHandle, StructureFormat,
};

// Re-export bridge types
pub use bridge::{ExecutionContext, RequestBroker};
pub use config::BridgeConfig;

// Re-export engine types
pub use engine::{ComputationEngine, EngineLoader, StructureEngine};

// Re-export batch types
pub use batch::{BatchOutcome, BatchRunner, Dispose, group_by_source};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
