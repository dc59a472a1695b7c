//! External collaborator adapters (C6).
//!
//! The task store, device queue, and buffer-transfer manager are opaque
//! external interfaces; this module names the Rust-side contract for them
//! as traits, the same way codebases often separate core logic from
//! pluggable backends with a trait seam (`MessageRouter`-style traits
//! under `tasker-shared/src/messaging`). Production adapters and test
//! fakes (`rt-sim`) both implement these.

use std::sync::Arc;

use rt_graph::Subrange;
use rt_shared::{BufferId, CommandId, NodeId, TaskId};

/// Opaque handle to a user task definition, looked up by [`TaskStore`].
/// The engine never inspects its contents; it only checks for presence and
/// hands it to [`DeviceQueue::execute`] or invokes it directly for
/// master-access jobs.
pub trait TaskDefinition: Send + Sync + std::fmt::Debug {
    /// Runs the task's master-access functor synchronously. Only ever
    /// called for `master_access` jobs, always on the node holding the
    /// task store's authoritative copy.
    fn run_master_access(&self);
}

/// Looks up user task definitions by id. `has_task` must be a pure,
/// side-effect-free read: the engine polls it repeatedly while a compute
/// job waits for its task definition to arrive.
pub trait TaskStore: Send + Sync {
    fn has_task(&self, tid: TaskId) -> bool;
    fn get_task(&self, tid: TaskId) -> Option<Arc<dyn TaskDefinition>>;
}

/// A handle to an in-flight device operation or buffer transfer. Both
/// [`DeviceEventHandle`] and [`TransferHandle`] are this trait's only
/// consumers: the engine never distinguishes between them beyond this one
/// capability, unifying cooperative progress over otherwise heterogeneous
/// async primitives.
pub trait PollCompletion: Send + Sync {
    /// Non-blocking check: has the underlying operation finished?
    fn poll_complete(&self) -> bool;
}

/// One sampled kernel-timeline timestamp, in nanoseconds since an
/// unspecified epoch fixed for the lifetime of the device queue. Only
/// meaningful relative to the other three timestamps of the same event.
pub type ProfilingTimestampNanos = u64;

/// The four standard kernel-timeline timestamps,
/// present only when [`DeviceQueue::is_profiling_enabled`] is true and the
/// backend actually populated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilingTimestamps {
    pub queued: ProfilingTimestampNanos,
    pub submit: ProfilingTimestampNanos,
    pub start: ProfilingTimestampNanos,
    pub end: ProfilingTimestampNanos,
}

/// A submitted device operation.
pub trait DeviceEventHandle: PollCompletion {
    /// The four kernel-timeline timestamps, if profiling was enabled for
    /// this event and the backend captured them.
    fn profiling_timestamps(&self) -> Option<ProfilingTimestamps> {
        None
    }
}

/// Submits compute work to a device and reports whether that device
/// supports timeline profiling.
pub trait DeviceQueue: Send + Sync {
    fn execute(&self, tid: TaskId, subrange: Subrange) -> Arc<dyn DeviceEventHandle>;
    fn is_profiling_enabled(&self) -> bool;
}

/// An in-flight buffer transfer.
pub trait TransferHandle: PollCompletion {}

/// Data needed to submit a `push` to the buffer-transfer manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushPayload {
    pub cid: CommandId,
    pub bid: BufferId,
    pub target_nid: NodeId,
    pub subrange: Subrange,
}

/// Data needed to submit an `await_push` to the buffer-transfer manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitPushPayload {
    pub cid: CommandId,
    pub bid: BufferId,
    pub source_nid: NodeId,
    pub source_cid: CommandId,
    pub subrange: Subrange,
}

/// Moves buffer contents between nodes. `push`/`await_push` each return
/// immediately with a handle; completion is observed only by polling it.
pub trait BufferTransferManager: Send + Sync {
    fn push(&self, pkg: &PushPayload) -> Arc<dyn TransferHandle>;
    fn await_push(&self, pkg: &AwaitPushPayload) -> Arc<dyn TransferHandle>;
}
