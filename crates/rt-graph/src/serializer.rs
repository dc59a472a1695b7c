//! Graph serializer (C3): turns flushed task commands into wire packets.
//!
//! `flush` is grounded line-for-line on `graph_serializer::flush` and
//! `serialize_and_flush` in celerity's `graph_serializer.cc`:
//! recursively flush un-flushed first-level dependencies (data transfer
//! commands), special-case `await_push` by also flushing its paired
//! `push`, then flush every task command from this batch, then flush the
//! horizon commands that depend on them.

use tracing::{trace, warn};

use rt_shared::{CommandId, NodeId, TaskId};

use crate::command::{CommandKind, CommandPackage};
use crate::error::GraphError;
use crate::graph::{CommandGraphStore, CommandHandle};

/// Receives emitted command packages. Implementors hand the package off to
/// whatever transport carries it to the node named by `node`; the
/// serializer calls this synchronously and only marks the command flushed
/// once it returns `Ok`.
pub trait EmitSink {
    fn emit(&mut self, node: NodeId, pkg: CommandPackage, dependencies: Vec<CommandId>) -> Result<(), String>;
}

/// Drives `flush` over a [`CommandGraphStore`], emitting through an
/// [`EmitSink`].
pub struct GraphSerializer<'g, S> {
    graph: &'g mut CommandGraphStore,
    sink: S,
}

impl<'g, S: EmitSink> GraphSerializer<'g, S> {
    pub fn new(graph: &'g mut CommandGraphStore, sink: S) -> Self {
        Self { graph, sink }
    }

    /// Flushes every task command belonging to `tid`.
    pub fn flush(&mut self, tid: TaskId) -> Result<(), GraphError> {
        let cmds: Vec<CommandHandle> = self.graph.task_commands(tid, None).collect();
        self.flush_batch(&cmds)
    }

    /// Flushes a pre-selected batch of task commands, all belonging to the
    /// same task (an internal invariant checked via [`GraphError`] since
    /// celerity's C++ enforces it with a debug-only assert).
    ///
    /// Commands already flushed are skipped rather than re-flushed, so a
    /// repeat `flush(tid)` call over a task whose commands were all flushed
    /// by an earlier call is a no-op (Property 2, "idempotent flush").
    /// `DoubleFlush` stays reachable for the one case that genuinely is a
    /// bug: the recursive first-level/second-level dependency walk visiting
    /// the same transfer command twice within a single `flush` call.
    fn flush_batch(&mut self, cmds: &[CommandHandle]) -> Result<(), GraphError> {
        let mut check_tid: Option<TaskId> = None;
        let mut horizon_cmds: Vec<CommandHandle> = Vec::new();
        let mut cmds_and_deps: Vec<(CommandHandle, Vec<CommandId>)> = Vec::with_capacity(cmds.len());

        for &cmd in cmds {
            if self.graph.is_flushed(cmd)? {
                continue;
            }
            let cmd_tid = self.graph.task_id(cmd)?;
            match (check_tid, cmd_tid) {
                (Some(seen), Some(this)) if seen != this => {
                    return Err(GraphError::InvariantViolation(format!(
                        "flush_batch received commands from multiple tasks: {seen} and {this}"
                    )));
                }
                _ => check_tid = check_tid.or(cmd_tid),
            }

            let mut deps_for_cmd = Vec::new();
            let cmd_dependencies = self.graph.dependencies(cmd)?.collect::<Vec<_>>();
            for (dep, _anti) in cmd_dependencies {
                if self.graph.kind(dep)? == CommandKind::Nop {
                    continue;
                }
                deps_for_cmd.push(self.graph.cid(dep)?);

                if self.graph.kind(dep)?.is_task_command() {
                    // A task-command dependency must belong to a different,
                    // already-flushed task; nothing more to do for it here.
                    if self.graph.task_id(dep)? == check_tid || !self.graph.is_flushed(dep)? {
                        return Err(GraphError::InvariantViolation(format!(
                            "task-command dependency {} of {} must belong to a different task and already be flushed",
                            self.graph.cid(dep)?,
                            self.graph.cid(cmd)?
                        )));
                    }
                    continue;
                }

                // Data transfer command: flush it now if not already flushed.
                if !self.graph.is_flushed(dep)? {
                    self.flush_dependency(dep)?;
                }

                // Reach the paired push through its await_push, since no
                // direct dependency edge connects them.
                if self.graph.kind(dep)? == CommandKind::AwaitPush {
                    if let Some(push) = self.graph.paired_push(dep) {
                        if !self.graph.is_flushed(push)? {
                            self.flush_dependency(push)?;
                        }
                    }
                }
            }
            cmds_and_deps.push((cmd, deps_for_cmd));

            let cmd_dependents = self.graph.dependents(cmd)?.collect::<Vec<_>>();
            for (dependent, _anti) in cmd_dependents {
                if self.graph.kind(dependent)? != CommandKind::Horizon {
                    warn!(
                        command = %self.graph.cid(cmd)?,
                        "task command has a non-horizon dependent at flush time"
                    );
                    continue;
                }
                horizon_cmds.push(dependent);
            }
        }

        for (cmd, deps) in cmds_and_deps {
            self.serialize_and_flush(cmd, deps)?;
        }

        for horizon in horizon_cmds {
            if !self.graph.is_flushed(horizon)? {
                self.flush_dependency(horizon)?;
            }
        }

        Ok(())
    }

    /// Flushes a second-level dependency: every one of *its* dependencies
    /// must already be flushed (the recursion bottoms out at commands whose
    /// own predecessors were flushed by an earlier task's `flush` call).
    fn flush_dependency(&mut self, dep: CommandHandle) -> Result<(), GraphError> {
        let mut dep_deps = Vec::new();
        for (dd, _anti) in self.graph.dependencies(dep)?.collect::<Vec<_>>() {
            if !self.graph.is_flushed(dd)? {
                return Err(GraphError::InvariantViolation(format!(
                    "dependency {} of {} was not flushed before its dependent",
                    self.graph.cid(dd)?,
                    self.graph.cid(dep)?
                )));
            }
            dep_deps.push(self.graph.cid(dd)?);
        }
        self.serialize_and_flush(dep, dep_deps)
    }

    /// Builds the wire packet for `cmd`, emits it, and marks it flushed.
    /// `nop` commands are never emitted.
    fn serialize_and_flush(&mut self, cmd: CommandHandle, dependencies: Vec<CommandId>) -> Result<(), GraphError> {
        if self.graph.is_flushed(cmd)? {
            return Err(GraphError::DoubleFlush(self.graph.cid(cmd)?));
        }

        if self.graph.kind(cmd)? == CommandKind::Nop {
            self.graph.mark_flushed(cmd)?;
            return Ok(());
        }

        let pkg = CommandPackage {
            cid: self.graph.cid(cmd)?,
            nid: self.graph.nid(cmd)?,
            payload: self.graph.payload(cmd)?.clone(),
        };
        let nid = pkg.nid;
        let cid = pkg.cid;

        trace!(command = %cid, node = %nid, kind = ?pkg.kind(), deps = dependencies.len(), "emitting command");
        self.sink
            .emit(nid, pkg, dependencies)
            .map_err(|e| GraphError::EmitFailed(cid, e))?;
        self.graph.mark_flushed(cmd)
    }
}
