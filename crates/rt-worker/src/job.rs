//! Job state machine and per-kind execution (C4), grounded on
//! celerity's `worker_job.cc`: `worker_job::start`/`update` become
//! [`Job::start`]/[`Job::poll`], and each `*_job::execute` override becomes
//! one match arm in [`Job::poll`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use rt_graph::{CommandKind, CommandPackage, CommandPayload, Subrange};
use rt_shared::{CommandId, CompletionStrategy, JobBenchmark, TaskId};

use crate::collaborators::{AwaitPushPayload, BufferTransferManager, DeviceEventHandle, DeviceQueue, PushPayload, TaskStore, TransferHandle};
use crate::error::EngineError;

/// `created -> running -> done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Done,
}

/// Replaces `worker_job::execute`'s bare `bool` return with a named type,
/// matching the general preference for descriptive enums over booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Done,
}

/// The background-thread ComputeCpp-style workaround polls with a timeout
/// this short so it never meaningfully blocks the engine loop.
const COMPUTE_WORKAROUND_POLL_TIMEOUT: Duration = Duration::from_micros(1);

/// Collaborators and configuration a job needs while polling. Borrowed for
/// the duration of a single `start`/`poll` call; the engine owns the
/// underlying `Arc`s.
pub struct JobContext<'a> {
    pub task_store: &'a dyn TaskStore,
    pub device_queue: &'a dyn DeviceQueue,
    pub transfer_manager: &'a dyn BufferTransferManager,
    pub completion_strategy: CompletionStrategy,
}

struct AwaitPushProgress {
    handle: Option<Arc<dyn TransferHandle>>,
}

struct PushProgress {
    handle: Option<Arc<dyn TransferHandle>>,
}

struct ComputeProgress {
    submitted: bool,
    event: Option<Arc<dyn DeviceEventHandle>>,
    did_log_task_wait: bool,
    workaround: Option<tokio::task::JoinHandle<()>>,
}

enum KindState {
    Nop,
    Horizon,
    MasterAccess,
    AwaitPush(AwaitPushProgress),
    Push(PushProgress),
    Compute(ComputeProgress),
}

/// One in-flight unit of work derived from a single [`CommandPackage`].
pub struct Job {
    pkg: CommandPackage,
    dependencies: Vec<CommandId>,
    state: JobState,
    benchmark: JobBenchmark,
    start_time: Option<Instant>,
    kind_state: KindState,
}

impl Job {
    #[must_use]
    pub fn new(pkg: CommandPackage, dependencies: Vec<CommandId>) -> Self {
        let kind_state = match pkg.payload {
            CommandPayload::Nop => KindState::Nop,
            CommandPayload::Horizon => KindState::Horizon,
            CommandPayload::MasterAccess { .. } => KindState::MasterAccess,
            CommandPayload::AwaitPush { .. } => KindState::AwaitPush(AwaitPushProgress { handle: None }),
            CommandPayload::Push { .. } => KindState::Push(PushProgress { handle: None }),
            CommandPayload::Compute { .. } => KindState::Compute(ComputeProgress {
                submitted: false,
                event: None,
                did_log_task_wait: false,
                workaround: None,
            }),
        };
        Self {
            pkg,
            dependencies,
            state: JobState::Created,
            benchmark: JobBenchmark::new(),
            start_time: None,
            kind_state,
        }
    }

    #[must_use]
    pub fn cid(&self) -> CommandId {
        self.pkg.cid
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.pkg.kind()
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub fn dependencies(&self) -> &[CommandId] {
        &self.dependencies
    }

    #[must_use]
    pub fn benchmark(&self) -> &JobBenchmark {
        &self.benchmark
    }

    /// Transitions `created -> running`. Every `dependencies` entry must
    /// already be `done` locally; the engine enforces that before calling
    /// this.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, JobState::Created, "start() called on a job that is already running or done");
        self.state = JobState::Running;
        self.start_time = Some(Instant::now());
        trace!(command = %self.pkg.cid, node = %self.pkg.nid, kind = ?self.kind(), "job started");
    }

    /// Polls the job once. Never blocks beyond the fixed short timeout used
    /// by the compute-completion workaround. Records a benchmark sample
    /// regardless of outcome, matching `worker_job::update`.
    pub async fn poll(&mut self, ctx: &JobContext<'_>) -> Result<PollOutcome, EngineError> {
        debug_assert_eq!(self.state, JobState::Running, "poll() called on a job that has not started or is already done");

        let before = Instant::now();
        let outcome = self.execute(ctx).await?;
        let elapsed = before.elapsed();
        self.benchmark.record(elapsed);

        if outcome == PollOutcome::Done {
            self.state = JobState::Done;
            let execution_time = self.start_time.map(|s| s.elapsed());
            trace!(
                command = %self.pkg.cid,
                event = "stop",
                execution_time_us = execution_time.map(|d| d.as_micros()),
                poll_avg_us = self.benchmark.avg().map(|d| d.as_micros()),
                poll_min_us = self.benchmark.min().map(|d| d.as_micros()),
                poll_max_us = self.benchmark.max().map(|d| d.as_micros()),
                poll_samples = self.benchmark.sample_count(),
                "job done"
            );
        }
        Ok(outcome)
    }

    async fn execute(&mut self, ctx: &JobContext<'_>) -> Result<PollOutcome, EngineError> {
        match (&mut self.kind_state, &self.pkg.payload) {
            (KindState::Nop, CommandPayload::Nop) => Ok(PollOutcome::Done),
            (KindState::Horizon, CommandPayload::Horizon) => Ok(PollOutcome::Done),
            (KindState::MasterAccess, CommandPayload::MasterAccess { tid }) => {
                let task = ctx
                    .task_store
                    .get_task(*tid)
                    .ok_or_else(|| EngineError::Device(format!("master_access task {tid} missing from task store on master node")))?;
                task.run_master_access();
                Ok(PollOutcome::Done)
            }
            (KindState::AwaitPush(progress), CommandPayload::AwaitPush { bid, source_nid, source_cid, subrange }) => {
                if progress.handle.is_none() {
                    let payload = AwaitPushPayload {
                        cid: self.pkg.cid,
                        bid: *bid,
                        source_nid: *source_nid,
                        source_cid: *source_cid,
                        subrange: *subrange,
                    };
                    progress.handle = Some(ctx.transfer_manager.await_push(&payload));
                }
                Ok(poll_transfer(progress.handle.as_deref().expect("handle set above")))
            }
            (KindState::Push(progress), CommandPayload::Push { bid, target_nid, subrange }) => {
                if progress.handle.is_none() {
                    trace!(command = %self.pkg.cid, event = "submit buffer to transfer manager");
                    let payload = PushPayload {
                        cid: self.pkg.cid,
                        bid: *bid,
                        target_nid: *target_nid,
                        subrange: *subrange,
                    };
                    progress.handle = Some(ctx.transfer_manager.push(&payload));
                    trace!(command = %self.pkg.cid, event = "buffer submitted to transfer manager");
                }
                Ok(poll_transfer(progress.handle.as_deref().expect("handle set above")))
            }
            (KindState::Compute(progress), CommandPayload::Compute { tid, subrange }) => poll_compute(self.pkg.cid, progress, *tid, *subrange, ctx).await,
            (state, payload) => {
                // Unreachable unless a Job is constructed with mismatched kind_state/payload.
                Err(EngineError::Device(format!(
                    "job kind_state does not match command payload: {:?} vs {:?}",
                    state.debug_tag(),
                    payload
                )))
            }
        }
    }
}

impl KindState {
    fn debug_tag(&self) -> &'static str {
        match self {
            KindState::Nop => "Nop",
            KindState::Horizon => "Horizon",
            KindState::MasterAccess => "MasterAccess",
            KindState::AwaitPush(_) => "AwaitPush",
            KindState::Push(_) => "Push",
            KindState::Compute(_) => "Compute",
        }
    }
}

fn poll_transfer(handle: &dyn TransferHandle) -> PollOutcome {
    if handle.poll_complete() {
        PollOutcome::Done
    } else {
        PollOutcome::Pending
    }
}

async fn poll_compute(cid: CommandId, progress: &mut ComputeProgress, tid: TaskId, subrange: Subrange, ctx: &JobContext<'_>) -> Result<PollOutcome, EngineError> {
    if !progress.submitted {
        if !ctx.task_store.has_task(tid) {
            if !progress.did_log_task_wait {
                trace!(command = %cid, event = "waiting for task definition");
                progress.did_log_task_wait = true;
            }
            return Ok(PollOutcome::Pending);
        }

        trace!(command = %cid, event = "submit kernel to device queue");
        let event = ctx.device_queue.execute(tid, subrange);

        if ctx.completion_strategy == CompletionStrategy::Blocking {
            let event_for_thread = Arc::clone(&event);
            progress.workaround = Some(tokio::task::spawn_blocking(move || {
                while !event_for_thread.poll_complete() {
                    std::thread::yield_now();
                }
            }));
        }
        progress.event = Some(event);
        progress.submitted = true;
    }

    let event = progress.event.as_ref().expect("compute event set once submitted");

    let is_complete = match ctx.completion_strategy {
        CompletionStrategy::Blocking => {
            let handle = progress.workaround.as_mut().expect("workaround task spawned once submitted");
            matches!(tokio::time::timeout(COMPUTE_WORKAROUND_POLL_TIMEOUT, handle).await, Ok(Ok(())))
        }
        CompletionStrategy::DirectQuery => event.poll_complete(),
    };

    if !is_complete {
        return Ok(PollOutcome::Pending);
    }

    if ctx.device_queue.is_profiling_enabled() {
        if let Some(ts) = event.profiling_timestamps() {
            trace!(
                command = %cid,
                queued_to_submit_ns = ts.submit.saturating_sub(ts.queued),
                submit_to_start_ns = ts.start.saturating_sub(ts.submit),
                start_to_end_ns = ts.end.saturating_sub(ts.start),
                "device profiling deltas"
            );
        } else {
            warn!(command = %cid, "profiling enabled but backend reported no timestamps");
        }
    }

    Ok(PollOutcome::Done)
}
