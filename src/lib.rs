//! # accel-rt
//!
//! Distributed command-graph scheduler and worker job engine for
//! accelerator-programming runtimes.
//!
//! This crate is a thin facade over its three workspace members:
//! - [`rt_shared`] — identifiers, error taxonomy, configuration, metrics.
//! - [`rt_graph`] — command identity & packaging, the command graph store,
//!   and the flush/serialize algorithm.
//! - [`rt_worker`] — the cooperative worker job engine that turns emitted
//!   command packets into device/transfer progress.
//!
//! Embedding applications depend on this crate re-exporting the pieces they
//! need to wire a planner and a worker engine together; `rt-sim` (dev-only)
//! supplies in-memory collaborator fakes for tests and this crate's own
//! benchmark.

pub use rt_graph as graph;
pub use rt_shared as shared;
pub use rt_worker as worker;

pub use rt_graph::{
    CommandGraphStore, CommandHandle, CommandKind, CommandPackage, CommandPayload, EmitSink, GraphError, GraphSerializer, SharedCommandGraph, Subrange,
};
pub use rt_shared::{BufferId, CommandId, CompletionStrategy, ConfigError, DeviceSelector, JobBenchmark, NodeId, RuntimeConfig, RuntimeError, TaskId};
pub use rt_worker::{
    AwaitPushPayload, BufferTransferManager, DeviceEventHandle, DeviceQueue, EngineError, JobEngine, PollCompletion, ProfilingTimestamps, PushPayload,
    TaskDefinition, TaskStore, TransferHandle,
};
