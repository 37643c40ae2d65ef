//! The execution bridge.
//!
//! Offloads engine calls to an isolated worker thread and exposes them to
//! async callers:
//!
//! - [`ExecutionContext`]: the worker, one request at a time, always
//!   releasing result handles
//! - [`PendingCalls`]: correlation id → waiting caller
//! - [`RequestBroker`]: id assignment, timeouts, response routing

pub mod broker;
pub mod context;
pub mod pending;

pub use broker::{LoaderFactory, RequestBroker};
pub use context::{ContextEvent, ExecutionContext};
pub use pending::{PendingCalls, PendingReceiver};
