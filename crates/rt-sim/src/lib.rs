//! In-memory fakes of the external collaborators (C6), plus a small
//! multi-node test harness.
//!
//! Grounded on the factory pattern `tasker-worker/tests/testing/factory.rs`
//! uses for test data construction, adapted from database-backed fixtures
//! to in-memory ones: everything here is deterministic, synchronous where
//! possible, and configurable with an artificial poll-count delay so tests
//! can exercise the engine's non-blocking scheduling rather than
//! completing every job on its very first poll.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use rt_graph::{SharedCommandGraph, Subrange};
use rt_shared::{CommandId, CompletionStrategy, TaskId};
use rt_worker::{
    AwaitPushPayload, BufferTransferManager, DeviceEventHandle, DeviceQueue, EngineError, JobEngine, PollCompletion, ProfilingTimestamps, PushPayload,
    TaskDefinition, TaskStore, TransferHandle,
};

/// Counts down from a fixed number of polls before reporting completion.
struct Countdown(Mutex<usize>);

impl Countdown {
    fn new(polls: usize) -> Self {
        Self(Mutex::new(polls))
    }

    /// Returns `true` once this call has brought the counter to zero.
    fn tick(&self) -> bool {
        let mut remaining = self.0.lock();
        if *remaining == 0 {
            true
        } else {
            *remaining -= 1;
            *remaining == 0
        }
    }
}

/// A user task definition that runs an arbitrary closure when a
/// `master_access` job invokes it.
pub struct SimTaskDefinition {
    on_run: Box<dyn Fn() + Send + Sync>,
}

impl std::fmt::Debug for SimTaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTaskDefinition").finish_non_exhaustive()
    }
}

impl TaskDefinition for SimTaskDefinition {
    fn run_master_access(&self) {
        (self.on_run)();
    }
}

/// In-memory task store. Tasks become visible to `has_task`/`get_task` only
/// once [`Self::register`] is called, so tests can model the "task
/// definition arrives after the compute command" race explicitly.
#[derive(Default)]
pub struct SimTaskStore {
    tasks: Mutex<HashMap<TaskId, Arc<SimTaskDefinition>>>,
}

impl SimTaskStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn register(&self, tid: TaskId) {
        self.register_with(tid, || {});
    }

    pub fn register_with(&self, tid: TaskId, on_run: impl Fn() + Send + Sync + 'static) {
        self.tasks.lock().insert(tid, Arc::new(SimTaskDefinition { on_run: Box::new(on_run) }));
    }
}

impl TaskStore for SimTaskStore {
    fn has_task(&self, tid: TaskId) -> bool {
        self.tasks.lock().contains_key(&tid)
    }

    fn get_task(&self, tid: TaskId) -> Option<Arc<dyn TaskDefinition>> {
        self.tasks.lock().get(&tid).cloned().map(|t| t as Arc<dyn TaskDefinition>)
    }
}

struct SimDeviceEventHandle {
    countdown: Countdown,
    profiling: Option<ProfilingTimestamps>,
}

impl PollCompletion for SimDeviceEventHandle {
    fn poll_complete(&self) -> bool {
        self.countdown.tick()
    }
}

impl DeviceEventHandle for SimDeviceEventHandle {
    fn profiling_timestamps(&self) -> Option<ProfilingTimestamps> {
        self.profiling
    }
}

/// In-memory device queue. Every submitted event takes `poll_delay` polls
/// to complete, modeling a device that does not finish on its first status
/// check.
pub struct SimDeviceQueue {
    poll_delay: usize,
    profiling_enabled: bool,
}

impl SimDeviceQueue {
    #[must_use]
    pub fn new(poll_delay: usize, profiling_enabled: bool) -> Arc<Self> {
        Arc::new(Self { poll_delay, profiling_enabled })
    }
}

impl DeviceQueue for SimDeviceQueue {
    fn execute(&self, _tid: TaskId, _subrange: Subrange) -> Arc<dyn DeviceEventHandle> {
        let profiling = self.profiling_enabled.then_some(ProfilingTimestamps {
            queued: 0,
            submit: 100,
            start: 250,
            end: 900,
        });
        Arc::new(SimDeviceEventHandle {
            countdown: Countdown::new(self.poll_delay),
            profiling,
        })
    }

    fn is_profiling_enabled(&self) -> bool {
        self.profiling_enabled
    }
}

/// Shared delivery ledger a [`SimBufferTransferManager`] consults so an
/// `await_push` only completes once the push command it names by
/// `source_cid` has itself completed — the cross-node ordering guarantee
/// `done(push)` happens-before `done(await_push)`.
#[derive(Default)]
pub struct SimTransferFabric {
    delivered: Mutex<HashSet<CommandId>>,
}

impl SimTransferFabric {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::default()
    }
}

struct SimPushHandle {
    countdown: Countdown,
    fabric: Arc<SimTransferFabric>,
    cid: CommandId,
}

impl PollCompletion for SimPushHandle {
    fn poll_complete(&self) -> bool {
        let done = self.countdown.tick();
        if done {
            self.fabric.delivered.lock().insert(self.cid);
        }
        done
    }
}
impl TransferHandle for SimPushHandle {}

struct SimAwaitPushHandle {
    countdown: Countdown,
    fabric: Arc<SimTransferFabric>,
    source_cid: CommandId,
}

impl PollCompletion for SimAwaitPushHandle {
    fn poll_complete(&self) -> bool {
        if !self.fabric.delivered.lock().contains(&self.source_cid) {
            return false;
        }
        self.countdown.tick()
    }
}
impl TransferHandle for SimAwaitPushHandle {}

/// In-memory buffer-transfer manager. Multiple instances sharing the same
/// [`SimTransferFabric`] model multiple nodes' BTMs observing the same
/// transfers.
pub struct SimBufferTransferManager {
    fabric: Arc<SimTransferFabric>,
    poll_delay: usize,
}

impl SimBufferTransferManager {
    #[must_use]
    pub fn new(fabric: Arc<SimTransferFabric>, poll_delay: usize) -> Arc<Self> {
        Arc::new(Self { fabric, poll_delay })
    }
}

impl BufferTransferManager for SimBufferTransferManager {
    fn push(&self, pkg: &PushPayload) -> Arc<dyn TransferHandle> {
        Arc::new(SimPushHandle {
            countdown: Countdown::new(self.poll_delay),
            fabric: Arc::clone(&self.fabric),
            cid: pkg.cid,
        })
    }

    fn await_push(&self, pkg: &AwaitPushPayload) -> Arc<dyn TransferHandle> {
        Arc::new(SimAwaitPushHandle {
            countdown: Countdown::new(self.poll_delay),
            fabric: Arc::clone(&self.fabric),
            source_cid: pkg.source_cid,
        })
    }
}

/// One simulated node: its own command graph, task store, and engine,
/// wired to collaborators sharing a cluster-wide [`SimTransferFabric`].
pub struct SimNode {
    pub graph: SharedCommandGraph,
    pub task_store: Arc<SimTaskStore>,
    pub engine: JobEngine,
}

/// Builds a small cluster of [`SimNode`]s for integration tests that need
/// more than one node to observe push/await-push ordering.
pub struct SimCluster {
    pub nodes: Vec<SimNode>,
}

impl SimCluster {
    /// Creates `node_count` nodes, each with its own command graph and task
    /// store, sharing one transfer fabric and using the given per-poll
    /// delay for both devices and transfers.
    #[must_use]
    pub fn new(node_count: usize, poll_delay: usize, device_profiling: bool) -> Self {
        let fabric = SimTransferFabric::new();
        let nodes = (0..node_count)
            .map(|_| {
                let graph = SharedCommandGraph::new();
                let task_store = SimTaskStore::new();
                let engine = JobEngine::new(
                    graph.clone(),
                    Arc::clone(&task_store) as Arc<dyn TaskStore>,
                    SimDeviceQueue::new(poll_delay, device_profiling) as Arc<dyn DeviceQueue>,
                    SimBufferTransferManager::new(Arc::clone(&fabric), poll_delay) as Arc<dyn BufferTransferManager>,
                    CompletionStrategy::DirectQuery,
                );
                SimNode { graph, task_store, engine }
            })
            .collect();
        Self { nodes }
    }

    /// Steps every node's engine in round-robin order until none of them
    /// make progress and all are drained, or `max_steps` round-robin
    /// passes elapse without convergence.
    pub async fn run_to_completion(&mut self, max_steps: usize) -> Result<(), EngineError> {
        for _ in 0..max_steps {
            let mut progressed = false;
            for node in &mut self.nodes {
                if node.engine.step().await? > 0 {
                    progressed = true;
                }
            }
            if !progressed && self.nodes.iter().all(|n| n.engine.pending_count() == 0) {
                return Ok(());
            }
        }
        Err(EngineError::Device(format!("simulated cluster did not converge within {max_steps} round-robin passes")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_graph::{CommandPackage, CommandPayload};
    use rt_shared::NodeId;

    #[tokio::test]
    async fn device_queue_completes_after_configured_poll_delay() {
        let dq = SimDeviceQueue::new(2, false);
        let event = dq.execute(TaskId::from_raw(1), Subrange::one_dim(0, 1));
        assert!(!event.poll_complete());
        assert!(!event.poll_complete());
        assert!(event.poll_complete());
    }

    #[tokio::test]
    async fn await_push_waits_for_matching_push_to_deliver() {
        let fabric = SimTransferFabric::new();
        let btm = SimBufferTransferManager::new(Arc::clone(&fabric), 1);
        let push_cid = CommandId::from_raw(0);

        let await_handle = btm.await_push(&AwaitPushPayload {
            cid: CommandId::from_raw(1),
            bid: rt_shared::BufferId::from_raw(0),
            source_nid: NodeId::from_raw(0),
            source_cid: push_cid,
            subrange: Subrange::one_dim(0, 1),
        });
        assert!(!await_handle.poll_complete(), "push has not been submitted yet");

        let push_handle = btm.push(&PushPayload {
            cid: push_cid,
            bid: rt_shared::BufferId::from_raw(0),
            target_nid: NodeId::from_raw(1),
            subrange: Subrange::one_dim(0, 1),
        });
        assert!(push_handle.poll_complete(), "push delay of 1 completes on first poll");
        assert!(await_handle.poll_complete(), "await_push can now complete too");
    }

    #[tokio::test]
    async fn two_node_cluster_drains_a_push_await_push_pair() {
        let mut cluster = SimCluster::new(2, 1, false);

        let push_cid = {
            let mut g = cluster.nodes[0].graph.lock();
            let push = g.add_command(
                NodeId::from_raw(0),
                CommandPayload::Push {
                    bid: rt_shared::BufferId::from_raw(0),
                    target_nid: NodeId::from_raw(1),
                    subrange: Subrange::one_dim(0, 1),
                },
            );
            g.cid(push).unwrap()
        };
        cluster.nodes[0].engine.submit(
            CommandPackage {
                cid: push_cid,
                nid: NodeId::from_raw(0),
                payload: CommandPayload::Push {
                    bid: rt_shared::BufferId::from_raw(0),
                    target_nid: NodeId::from_raw(1),
                    subrange: Subrange::one_dim(0, 1),
                },
            },
            vec![],
        );

        let await_cid = CommandId::from_raw(0);
        cluster.nodes[1].engine.submit(
            CommandPackage {
                cid: await_cid,
                nid: NodeId::from_raw(1),
                payload: CommandPayload::AwaitPush {
                    bid: rt_shared::BufferId::from_raw(0),
                    source_nid: NodeId::from_raw(0),
                    source_cid: push_cid,
                    subrange: Subrange::one_dim(0, 1),
                },
            },
            vec![],
        );

        cluster.run_to_completion(10).await.unwrap();
        assert_eq!(cluster.nodes[0].engine.pending_count(), 0);
        assert_eq!(cluster.nodes[1].engine.pending_count(), 0);
    }
}
