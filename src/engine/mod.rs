//! Computation engines.
//!
//! This module defines the [`ComputationEngine`] trait, the five entry points
//! the execution context dispatches to, and a lazy loading slot so an engine
//! is only initialized on the first call that needs it.
//!
//! - **Built-in**: [`StructureEngine`], a line-oriented PDB/mmCIF engine
//! - **Custom**: any `ComputationEngine` supplied through an [`EngineLoader`]

pub mod builtin;
pub mod structure;

#[cfg(test)]
pub(crate) mod testdata;

pub use builtin::StructureEngine;

use crate::core::{
    BindingPairs, Call, Chunks, ContactMap, Fragment, ResourceHandle, StructureFormat,
};
use crate::error::EngineError;

/// Default distance cutoff for binding-pair annotation, in Ångström.
pub const DEFAULT_BINDING_CUTOFF: f64 = 5.0;

/// The five engine entry points.
///
/// Implementations run on the execution context's thread only, so they must
/// be `Send` but need not be `Sync`. Every method receives the input file by
/// reference; the caller drops it once the call returns.
///
/// # Examples
///
/// ```
/// use pskit_bridge::core::{Release, StructureFormat};
/// use pskit_bridge::engine::{ComputationEngine, StructureEngine};
///
/// let pdb = b"ATOM      1  CA  ALA A   1       1.000   2.000   3.000  1.00  0.00           C\n";
/// let mut engine = StructureEngine::new();
/// let mut chunks = engine.split_by_chain(pdb, StructureFormat::Pdb).unwrap();
/// assert_eq!(chunks.keys(), vec!["A"]);
/// chunks.free();
/// ```
pub trait ComputationEngine: Send {
    /// Splits a protein-nucleic acid complex into its protein and nucleic
    /// parts, keyed `Prot` and `NA`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotAComplex`] if either part is absent.
    fn split_complex(
        &mut self,
        bytes: &[u8],
        format: StructureFormat,
    ) -> Result<Chunks, EngineError>;

    /// Splits a structure into one file per chain, keyed by chain id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] for unreadable input.
    fn split_by_chain(
        &mut self,
        bytes: &[u8],
        format: StructureFormat,
    ) -> Result<Chunks, EngineError>;

    /// Extracts an inclusive residue range of one chain.
    ///
    /// Absent bounds default to the chain's first and last residue.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownChain`] or [`EngineError::InvalidRange`].
    fn extract_fragment(
        &mut self,
        bytes: &[u8],
        chain_id: &str,
        start: Option<i64>,
        end: Option<i64>,
        format: StructureFormat,
    ) -> Result<Fragment, EngineError>;

    /// Lists protein/nucleic residue pairs with any atoms within `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotAComplex`] if either part is absent.
    fn annotate_binding_pairs(
        &mut self,
        bytes: &[u8],
        cutoff: f64,
        format: StructureFormat,
    ) -> Result<BindingPairs, EngineError>;

    /// Computes the residue distance matrix of one chain or all chains.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownChain`] for a chain not in the input.
    fn contact_map(
        &mut self,
        bytes: &[u8],
        chain_id: Option<&str>,
        format: StructureFormat,
    ) -> Result<ContactMap, EngineError>;

    /// Engine name for logging.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Routes a typed call to the matching entry point.
///
/// The call's input buffer is consumed and dropped when this returns.
///
/// # Errors
///
/// Propagates the engine's error.
pub fn dispatch(
    engine: &mut dyn ComputationEngine,
    call: Call,
) -> Result<ResourceHandle, EngineError> {
    let handle = match call {
        Call::SplitComplex { bytes, format } => {
            ResourceHandle::Chunks(engine.split_complex(&bytes, format)?)
        }
        Call::SplitByChain { bytes, format } => {
            ResourceHandle::Chunks(engine.split_by_chain(&bytes, format)?)
        }
        Call::ExtractFragment {
            bytes,
            chain_id,
            start,
            end,
            format,
        } => ResourceHandle::Fragment(engine.extract_fragment(
            &bytes, &chain_id, start, end, format,
        )?),
        Call::AnnotateBindingPairs {
            bytes,
            cutoff,
            format,
        } => ResourceHandle::BindingPairs(engine.annotate_binding_pairs(&bytes, cutoff, format)?),
        Call::ContactMap {
            bytes,
            chain_id,
            format,
        } => ResourceHandle::ContactMap(engine.contact_map(&bytes, chain_id.as_deref(), format)?),
    };
    Ok(handle)
}

/// Deferred engine construction, run once on the execution context's thread.
pub type EngineLoader =
    Box<dyn FnOnce() -> Result<Box<dyn ComputationEngine>, EngineError> + Send>;

/// Loader for the built-in [`StructureEngine`].
#[must_use]
pub fn builtin_loader() -> EngineLoader {
    Box::new(|| -> Result<Box<dyn ComputationEngine>, EngineError> {
        Ok(Box::new(StructureEngine::new()))
    })
}

enum Slot {
    Pending(EngineLoader),
    Ready(Box<dyn ComputationEngine>),
    Failed(EngineError),
    Empty,
}

/// An engine that is loaded on first use.
///
/// A failed load is remembered: every later access returns the same error
/// without retrying.
pub struct LazyEngine {
    slot: Slot,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for LazyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.slot {
            Slot::Pending(_) => "pending",
            Slot::Ready(_) => "ready",
            Slot::Failed(_) => "failed",
            Slot::Empty => "empty",
        };
        f.debug_struct("LazyEngine").field("state", &state).finish()
    }
}

impl LazyEngine {
    /// Wraps a loader without running it.
    #[must_use]
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            slot: Slot::Pending(loader),
        }
    }

    /// Returns `true` once the loader has succeeded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self.slot, Slot::Ready(_))
    }

    /// Returns the engine, loading it first if needed.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, now and on every later call.
    pub fn get(&mut self) -> Result<&mut dyn ComputationEngine, EngineError> {
        if let Slot::Pending(_) = self.slot
            && let Slot::Pending(loader) = std::mem::replace(&mut self.slot, Slot::Empty)
        {
            self.slot = match loader() {
                Ok(engine) => {
                    tracing::info!(engine = engine.name(), "computation engine loaded");
                    Slot::Ready(engine)
                }
                Err(e) => {
                    tracing::error!(error = %e, "computation engine failed to load");
                    Slot::Failed(e)
                }
            };
        }
        match &mut self.slot {
            Slot::Ready(engine) => Ok(engine.as_mut()),
            Slot::Failed(e) => Err(e.clone()),
            Slot::Pending(_) | Slot::Empty => Err(EngineError::Load {
                reason: "engine loader did not complete".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Release;
    use crate::engine::testdata::COMPLEX_PDB;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lazy_engine_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let mut lazy = LazyEngine::new(Box::new(
            move || -> Result<Box<dyn ComputationEngine>, EngineError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(StructureEngine::new()))
            },
        ));
        assert!(!lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        assert!(lazy.get().is_ok());
        assert!(lazy.get().is_ok());
        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_engine_failure_is_sticky() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let mut lazy = LazyEngine::new(Box::new(
            move || -> Result<Box<dyn ComputationEngine>, EngineError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Load {
                    reason: "missing module".to_string(),
                })
            },
        ));
        let first = lazy.get().err();
        let second = lazy.get().err();
        assert_eq!(first, second);
        assert!(matches!(first, Some(EngineError::Load { .. })));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_routes_by_variant() {
        let mut engine = StructureEngine::new();
        let call = Call::SplitComplex {
            bytes: COMPLEX_PDB.to_vec(),
            format: StructureFormat::Pdb,
        };
        let mut handle = dispatch(&mut engine, call).unwrap();
        assert_eq!(handle.kind(), crate::core::HandleKind::Chunks);
        handle.free();

        let call = Call::ContactMap {
            bytes: COMPLEX_PDB.to_vec(),
            chain_id: Some("A".to_string()),
            format: StructureFormat::Pdb,
        };
        let handle = dispatch(&mut engine, call).unwrap();
        match handle {
            ResourceHandle::ContactMap(map) => assert_eq!(map.side(), 10),
            other => unreachable!("unexpected handle {other:?}"),
        }
    }
}
