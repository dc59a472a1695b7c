//! Single-threaded cooperative job engine (C4): one loop per node polls
//! every non-done job, skipping jobs whose dependencies are not yet
//! `done`, and sleeps on a [`tokio::sync::Notify`] when nothing is
//! pollable.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace};

use rt_graph::{CommandKind, CommandPackage, SharedCommandGraph};
use rt_shared::{CommandId, CompletionStrategy};

use crate::collaborators::{BufferTransferManager, DeviceQueue, TaskStore};
use crate::error::EngineError;
use crate::job::{Job, JobContext, JobState, PollOutcome};

/// Upper bound on how long [`JobEngine::run_until_drained`] sleeps on
/// `notify` between passes. [`crate::collaborators::PollCompletion`] is a
/// synchronous query with no callback or waker the collaborator can use to
/// wake the engine directly, so a `Running` job blocked on a transfer or
/// compute event that takes two or more polls to finish would otherwise
/// never be polled again once `notify` has no further reason to fire. This
/// bounds the sleep so such a job keeps getting re-polled regardless.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs the job set for a single node.
///
/// Owns the arriving jobs and the handles to the three external
/// collaborators; shares a [`SharedCommandGraph`] with the planner so it
/// can request horizon pruning once a horizon job completes.
pub struct JobEngine {
    graph: SharedCommandGraph,
    task_store: Arc<dyn TaskStore>,
    device_queue: Arc<dyn DeviceQueue>,
    transfer_manager: Arc<dyn BufferTransferManager>,
    completion_strategy: CompletionStrategy,
    jobs: Vec<Job>,
    done: HashSet<CommandId>,
    notify: Arc<tokio::sync::Notify>,
}

impl JobEngine {
    pub fn new(
        graph: SharedCommandGraph,
        task_store: Arc<dyn TaskStore>,
        device_queue: Arc<dyn DeviceQueue>,
        transfer_manager: Arc<dyn BufferTransferManager>,
        completion_strategy: CompletionStrategy,
    ) -> Self {
        Self {
            graph,
            task_store,
            device_queue,
            transfer_manager,
            completion_strategy,
            jobs: Vec::new(),
            done: HashSet::new(),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// A handle other components (e.g. the transport receiving a new
    /// packet) can use to wake the engine from its idle sleep.
    #[must_use]
    pub fn waker(&self) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.notify)
    }

    /// Submits a newly-arrived `(packet, dependency_id_list)` pair as a job
    /// in state `created`.
    pub fn submit(&mut self, pkg: CommandPackage, dependencies: Vec<CommandId>) {
        trace!(command = %pkg.cid, node = %pkg.nid, "job queued");
        self.jobs.push(Job::new(pkg, dependencies));
        self.notify.notify_one();
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.state() != JobState::Done).count()
    }

    /// One scheduling pass: starts every startable `created` job, polls
    /// every `running` job once, and performs horizon pruning for any
    /// horizon job that just completed. Returns the number of jobs that
    /// completed during this pass.
    pub async fn step(&mut self) -> Result<usize, EngineError> {
        let ctx = JobContext {
            task_store: self.task_store.as_ref(),
            device_queue: self.device_queue.as_ref(),
            transfer_manager: self.transfer_manager.as_ref(),
            completion_strategy: self.completion_strategy,
        };

        for i in 0..self.jobs.len() {
            if self.jobs[i].state() == JobState::Created
                && self.done_superset(self.jobs[i].dependencies())
            {
                self.jobs[i].start();
            }
        }

        let mut newly_done = Vec::new();
        for job in &mut self.jobs {
            if job.state() != JobState::Running {
                continue;
            }
            match job.poll(&ctx).await {
                Ok(PollOutcome::Done) => newly_done.push((job.cid(), job.kind())),
                Ok(PollOutcome::Pending) => {}
                Err(err) => {
                    error!(command = %job.cid(), error = %err, "job failed");
                    return Err(err);
                }
            }
        }

        for (cid, kind) in &newly_done {
            self.done.insert(*cid);
            if *kind == CommandKind::Horizon {
                self.collapse_horizon(*cid)?;
            }
        }

        if !newly_done.is_empty() {
            self.notify.notify_waiters();
        }
        Ok(newly_done.len())
    }

    /// Runs [`Self::step`] in a loop, sleeping on the wake notification
    /// whenever a pass makes no progress and every job is either done or
    /// blocked, until every submitted job reaches `done`. The sleep is
    /// bounded by [`IDLE_POLL_INTERVAL`] rather than waiting on `notify`
    /// indefinitely, since `notify` only fires on `submit()` and on a job
    /// completing — never on a collaborator handle's underlying I/O
    /// progressing, which `Running` jobs still need to be re-polled for.
    pub async fn run_until_drained(&mut self) -> Result<(), EngineError> {
        loop {
            if self.pending_count() == 0 {
                return Ok(());
            }
            let progressed = self.step().await?;
            if progressed == 0 {
                let _ = tokio::time::timeout(IDLE_POLL_INTERVAL, self.notify.notified()).await;
            }
        }
    }

    fn done_superset(&self, dependencies: &[CommandId]) -> bool {
        dependencies.iter().all(|d| self.done.contains(d))
    }

    /// Requests pruning of the horizon's transitive predecessors from the
    /// shared command graph store. Safe because handles are
    /// stable and erasure never disturbs other nodes.
    fn collapse_horizon(&mut self, horizon_cid: CommandId) -> Result<(), EngineError> {
        let mut graph = self.graph.lock();
        let Some(handle) = graph.handle_for_cid(horizon_cid) else {
            // Already pruned by an earlier horizon's closure; nothing to do.
            return Ok(());
        };
        let erased = graph.collapse_horizon(handle)?;
        drop(graph);
        trace!(horizon = %horizon_cid, erased_count = erased.len(), "horizon pruning complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use rt_graph::{CommandPayload, Subrange};
    use rt_shared::{NodeId, TaskId};

    use super::*;
    use crate::collaborators::{AwaitPushPayload, PushPayload};

    struct ImmediateTransfer;
    impl crate::collaborators::PollCompletion for ImmediateTransfer {
        fn poll_complete(&self) -> bool {
            true
        }
    }
    impl crate::collaborators::TransferHandle for ImmediateTransfer {}

    struct FakeTransferManager;
    impl BufferTransferManager for FakeTransferManager {
        fn push(&self, _pkg: &PushPayload) -> Arc<dyn crate::collaborators::TransferHandle> {
            Arc::new(ImmediateTransfer)
        }
        fn await_push(&self, _pkg: &AwaitPushPayload) -> Arc<dyn crate::collaborators::TransferHandle> {
            Arc::new(ImmediateTransfer)
        }
    }

    #[derive(Debug)]
    struct FakeTaskDefinition {
        ran: Arc<AtomicBool>,
    }
    impl crate::collaborators::TaskDefinition for FakeTaskDefinition {
        fn run_master_access(&self) {
            self.ran.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeTaskStore {
        present: StdMutex<HashSet<TaskId>>,
        ran: Arc<AtomicBool>,
    }
    impl TaskStore for FakeTaskStore {
        fn has_task(&self, tid: TaskId) -> bool {
            self.present.lock().unwrap().contains(&tid)
        }
        fn get_task(&self, tid: TaskId) -> Option<Arc<dyn crate::collaborators::TaskDefinition>> {
            if self.present.lock().unwrap().contains(&tid) {
                Some(Arc::new(FakeTaskDefinition { ran: Arc::clone(&self.ran) }))
            } else {
                None
            }
        }
    }

    struct ImmediateEvent;
    impl crate::collaborators::PollCompletion for ImmediateEvent {
        fn poll_complete(&self) -> bool {
            true
        }
    }
    impl crate::collaborators::DeviceEventHandle for ImmediateEvent {}

    struct FakeDeviceQueue;
    impl DeviceQueue for FakeDeviceQueue {
        fn execute(&self, _tid: TaskId, _subrange: Subrange) -> Arc<dyn crate::collaborators::DeviceEventHandle> {
            Arc::new(ImmediateEvent)
        }
        fn is_profiling_enabled(&self) -> bool {
            false
        }
    }

    fn engine_with_fakes(task_store: Arc<FakeTaskStore>) -> JobEngine {
        JobEngine::new(
            SharedCommandGraph::new(),
            task_store,
            Arc::new(FakeDeviceQueue),
            Arc::new(FakeTransferManager),
            CompletionStrategy::DirectQuery,
        )
    }

    #[tokio::test]
    async fn nop_job_completes_on_first_step() {
        let mut engine = engine_with_fakes(Arc::new(FakeTaskStore::default()));
        engine.submit(
            CommandPackage {
                cid: CommandId::from_raw(0),
                nid: NodeId::from_raw(0),
                payload: CommandPayload::Nop,
            },
            vec![],
        );
        let progressed = engine.step().await.unwrap();
        assert_eq!(progressed, 1);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn job_waits_for_unmet_dependency() {
        let mut engine = engine_with_fakes(Arc::new(FakeTaskStore::default()));
        engine.submit(
            CommandPackage {
                cid: CommandId::from_raw(1),
                nid: NodeId::from_raw(0),
                payload: CommandPayload::Nop,
            },
            vec![CommandId::from_raw(0)],
        );
        let progressed = engine.step().await.unwrap();
        assert_eq!(progressed, 0);
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn compute_job_waits_for_task_definition_then_completes() {
        let task_store = Arc::new(FakeTaskStore::default());
        let mut engine = engine_with_fakes(Arc::clone(&task_store));
        engine.submit(
            CommandPackage {
                cid: CommandId::from_raw(0),
                nid: NodeId::from_raw(0),
                payload: CommandPayload::Compute {
                    tid: TaskId::from_raw(1),
                    subrange: Subrange::one_dim(0, 10),
                },
            },
            vec![],
        );

        assert_eq!(engine.step().await.unwrap(), 0, "task definition not yet present");
        task_store.present.lock().unwrap().insert(TaskId::from_raw(1));
        assert_eq!(engine.step().await.unwrap(), 1, "task definition now present, job completes");
    }

    #[tokio::test]
    async fn master_access_job_runs_functor_and_completes_immediately() {
        let task_store = Arc::new(FakeTaskStore::default());
        task_store.present.lock().unwrap().insert(TaskId::from_raw(1));
        let ran = Arc::clone(&task_store.ran);
        let mut engine = engine_with_fakes(task_store);
        engine.submit(
            CommandPackage {
                cid: CommandId::from_raw(0),
                nid: NodeId::from_raw(0),
                payload: CommandPayload::MasterAccess { tid: TaskId::from_raw(1) },
            },
            vec![],
        );
        assert_eq!(engine.step().await.unwrap(), 1);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn horizon_completion_triggers_pruning_of_predecessors() {
        let graph = SharedCommandGraph::new();
        let (c1, horizon) = {
            let mut g = graph.lock();
            let c1 = g.add_command(
                NodeId::from_raw(0),
                CommandPayload::Compute {
                    tid: TaskId::from_raw(1),
                    subrange: Subrange::one_dim(0, 1),
                },
            );
            let horizon = g.add_command(NodeId::from_raw(0), CommandPayload::Horizon);
            g.add_dependency(c1, horizon, false).unwrap();
            (g.cid(c1).unwrap(), g.cid(horizon).unwrap())
        };

        let mut engine = JobEngine::new(
            graph.clone(),
            Arc::new(FakeTaskStore::default()),
            Arc::new(FakeDeviceQueue),
            Arc::new(FakeTransferManager),
            CompletionStrategy::DirectQuery,
        );
        engine.submit(
            CommandPackage {
                cid: horizon,
                nid: NodeId::from_raw(0),
                payload: CommandPayload::Horizon,
            },
            vec![],
        );
        engine.step().await.unwrap();

        let g = graph.lock();
        assert!(g.handle_for_cid(c1).is_none(), "horizon completion must prune its predecessor");
        assert!(g.handle_for_cid(horizon).is_some(), "the horizon command itself survives pruning");
    }
}
