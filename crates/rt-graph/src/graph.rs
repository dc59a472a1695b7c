//! Command graph store (C2).
//!
//! Backed by a `slab::Slab` so [`CommandHandle`]s are stable across
//! insertion and across erasure of *other* handles. [`SharedCommandGraph`]
//! wraps the store in a `parking_lot::Mutex` behind a single guard object
//! exposing scoped-acquisition access, matching how the planner
//! (serializer) thread and the worker engine thread share one store per
//! node process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use slab::Slab;

use rt_shared::{CommandId, IdSequence, NodeId, TaskId};

use crate::command::{CommandKind, CommandPayload};
use crate::error::GraphError;

/// Stable reference to a command graph node.
///
/// Valid until the referenced command's own `erase` call; insertions and
/// erasures of *other* commands never invalidate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(usize);

struct CommandNode {
    cid: CommandId,
    nid: NodeId,
    payload: CommandPayload,
    flushed: bool,
    /// Predecessors, in the order `add_dependency` was called.
    deps: Vec<(CommandHandle, bool)>,
    /// Successors, in the order `add_dependency` was called.
    dependents: Vec<(CommandHandle, bool)>,
}

/// Holds the per-task/per-node command DAG: arena-backed nodes plus the
/// secondary indices needed for fast lookup by id, by task, and by
/// push/await-push pairing.
pub struct CommandGraphStore {
    next_cid: IdSequence<CommandId>,
    nodes: Slab<CommandNode>,
    by_cid: HashMap<CommandId, CommandHandle>,
    by_task: HashMap<TaskId, Vec<CommandHandle>>,
    /// `await_push` handle -> its paired `push` handle. The pairing is a
    /// separate relation from graph dependency edges.
    push_pairs: HashMap<CommandHandle, CommandHandle>,
}

impl Default for CommandGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_cid: IdSequence::starting_at(CommandId::from_raw(0)),
            nodes: Slab::new(),
            by_cid: HashMap::new(),
            by_task: HashMap::new(),
            push_pairs: HashMap::new(),
        }
    }

    /// Inserts a new command, issuing it a fresh `CommandId`.
    pub fn add_command(&mut self, nid: NodeId, payload: CommandPayload) -> CommandHandle {
        let cid = self.next_cid.issue();
        let tid = payload.task_id();
        let node = CommandNode {
            cid,
            nid,
            payload,
            flushed: false,
            deps: Vec::new(),
            dependents: Vec::new(),
        };
        let key = self.nodes.insert(node);
        let handle = CommandHandle(key);
        self.by_cid.insert(cid, handle);
        if let Some(tid) = tid {
            self.by_task.entry(tid).or_default().push(handle);
        }
        handle
    }

    /// Adds a dependency edge `pred -> succ`. Every dependency edge connects
    /// commands on the same node, except the conceptual push/await-push
    /// link — which is never added through this method, only through
    /// [`Self::pair_push_await`].
    pub fn add_dependency(&mut self, pred: CommandHandle, succ: CommandHandle, anti_dependency: bool) -> Result<(), GraphError> {
        let pred_nid = self.node(pred)?.nid;
        let succ_nid = self.node(succ)?.nid;
        if pred_nid != succ_nid {
            return Err(GraphError::CrossNodeDependency {
                pred: self.node(pred)?.cid,
                pred_nid: pred_nid.to_string(),
                succ: self.node(succ)?.cid,
                succ_nid: succ_nid.to_string(),
            });
        }
        self.node_mut(succ)?.deps.push((pred, anti_dependency));
        self.node_mut(pred)?.dependents.push((succ, anti_dependency));
        Ok(())
    }

    /// Records that `await_handle` (an `await_push` command) is paired with
    /// `push_handle` (a `push` command).
    pub fn pair_push_await(&mut self, await_handle: CommandHandle, push_handle: CommandHandle) -> Result<(), GraphError> {
        if self.kind(await_handle)? != CommandKind::AwaitPush {
            return Err(GraphError::NotAPushPair("first argument is not an await_push command".into()));
        }
        if self.kind(push_handle)? != CommandKind::Push {
            return Err(GraphError::NotAPushPair("second argument is not a push command".into()));
        }
        self.push_pairs.insert(await_handle, push_handle);
        Ok(())
    }

    /// The `push` command paired with `await_handle`, if it is an
    /// `await_push` and a pairing was recorded.
    #[must_use]
    pub fn paired_push(&self, await_handle: CommandHandle) -> Option<CommandHandle> {
        self.push_pairs.get(&await_handle).copied()
    }

    /// Task commands (compute/master-access) belonging to `tid`, optionally
    /// restricted to a single kind, in insertion order.
    pub fn task_commands(&self, tid: TaskId, kind_filter: Option<CommandKind>) -> impl Iterator<Item = CommandHandle> + '_ {
        self.by_task
            .get(&tid)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |&h| match kind_filter {
                Some(k) => self.nodes[h.0].payload.kind() == k,
                None => true,
            })
    }

    /// Predecessors of `handle`, in the order they were added.
    pub fn dependencies(&self, handle: CommandHandle) -> Result<impl Iterator<Item = (CommandHandle, bool)> + '_, GraphError> {
        Ok(self.node(handle)?.deps.iter().copied())
    }

    /// Successors of `handle`, in the order they were added.
    pub fn dependents(&self, handle: CommandHandle) -> Result<impl Iterator<Item = (CommandHandle, bool)> + '_, GraphError> {
        Ok(self.node(handle)?.dependents.iter().copied())
    }

    /// Marks `handle` flushed. Returns [`GraphError::DoubleFlush`] if it
    /// was already flushed.
    pub fn mark_flushed(&mut self, handle: CommandHandle) -> Result<(), GraphError> {
        let node = self.node_mut(handle)?;
        if node.flushed {
            return Err(GraphError::DoubleFlush(node.cid));
        }
        node.flushed = true;
        Ok(())
    }

    pub fn is_flushed(&self, handle: CommandHandle) -> Result<bool, GraphError> {
        Ok(self.node(handle)?.flushed)
    }

    pub fn cid(&self, handle: CommandHandle) -> Result<CommandId, GraphError> {
        Ok(self.node(handle)?.cid)
    }

    pub fn nid(&self, handle: CommandHandle) -> Result<NodeId, GraphError> {
        Ok(self.node(handle)?.nid)
    }

    pub fn kind(&self, handle: CommandHandle) -> Result<CommandKind, GraphError> {
        Ok(self.node(handle)?.payload.kind())
    }

    pub fn payload(&self, handle: CommandHandle) -> Result<&CommandPayload, GraphError> {
        Ok(&self.node(handle)?.payload)
    }

    pub fn task_id(&self, handle: CommandHandle) -> Result<Option<TaskId>, GraphError> {
        Ok(self.node(handle)?.payload.task_id())
    }

    #[must_use]
    pub fn handle_for_cid(&self, cid: CommandId) -> Option<CommandHandle> {
        self.by_cid.get(&cid).copied()
    }

    /// Removes `handle` from the graph. Used only by horizon pruning.
    /// The freed `CommandId` is never reissued, since `next_cid` only ever
    /// advances.
    pub fn erase(&mut self, handle: CommandHandle) -> Result<(), GraphError> {
        let node = self.nodes.try_remove(handle.0).ok_or(GraphError::UnknownCommand(self.cid_best_effort(handle)))?;
        self.by_cid.remove(&node.cid);
        if let Some(tid) = node.payload.task_id() {
            if let Some(list) = self.by_task.get_mut(&tid) {
                list.retain(|&h| h != handle);
                if list.is_empty() {
                    self.by_task.remove(&tid);
                }
            }
        }
        self.push_pairs.remove(&handle);
        self.push_pairs.retain(|_, &mut push| push != handle);
        Ok(())
    }

    /// Collapses the graph's history up to and including the given done
    /// horizon: erases every transitive predecessor of
    /// `horizon`, bridging through push/await-push pairing so a paired
    /// `push` is collapsed alongside the `await_push` that reaches it.
    /// Returns the erased `CommandId`s. `horizon` itself is left in place
    /// (it becomes the new lower bound for the next horizon's pruning).
    pub fn collapse_horizon(&mut self, horizon: CommandHandle) -> Result<Vec<CommandId>, GraphError> {
        if self.kind(horizon)? != CommandKind::Horizon {
            return Err(GraphError::InvariantViolation(format!(
                "collapse_horizon called on non-horizon command {}",
                self.cid(horizon)?
            )));
        }

        let mut to_visit = vec![horizon];
        let mut predecessors = std::collections::HashSet::new();
        while let Some(h) = to_visit.pop() {
            for (dep, _anti) in self.node(h)?.deps.clone() {
                if predecessors.insert(dep) {
                    to_visit.push(dep);
                }
            }
            if self.kind(h)? == CommandKind::AwaitPush {
                if let Some(push) = self.paired_push(h) {
                    if predecessors.insert(push) {
                        to_visit.push(push);
                    }
                }
            }
        }

        let mut erased_cids = Vec::with_capacity(predecessors.len());
        for handle in predecessors {
            erased_cids.push(self.cid(handle)?);
            self.erase(handle)?;
        }
        Ok(erased_cids)
    }

    fn node(&self, handle: CommandHandle) -> Result<&CommandNode, GraphError> {
        self.nodes.get(handle.0).ok_or(GraphError::UnknownCommand(self.cid_best_effort(handle)))
    }

    fn node_mut(&mut self, handle: CommandHandle) -> Result<&mut CommandNode, GraphError> {
        self.nodes.get_mut(handle.0).ok_or_else(|| GraphError::UnknownCommand(CommandId::from_raw(handle.0 as u64)))
    }

    /// Best-effort `CommandId` for error messages about a handle that may
    /// already be gone; falls back to the raw slot index if so.
    fn cid_best_effort(&self, handle: CommandHandle) -> CommandId {
        self.nodes.get(handle.0).map_or_else(|| CommandId::from_raw(handle.0 as u64), |n| n.cid)
    }
}

/// Shared, mutex-guarded handle to a [`CommandGraphStore`].
///
/// Cloning is cheap (an `Arc` bump); every clone refers to the same store.
#[derive(Clone)]
pub struct SharedCommandGraph(Arc<Mutex<CommandGraphStore>>);

impl Default for SharedCommandGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCommandGraph {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(CommandGraphStore::new())))
    }

    /// Acquires exclusive access to the store. The returned guard releases
    /// the lock on every exit path, including early returns via `?`.
    pub fn lock(&self) -> MutexGuard<'_, CommandGraphStore> {
        self.0.lock()
    }
}

impl std::fmt::Debug for SharedCommandGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCommandGraph").finish_non_exhaustive()
    }
}
