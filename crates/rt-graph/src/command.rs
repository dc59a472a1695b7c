//! Command identity & packaging (C1).
//!
//! `CommandKind`/`CommandPayload` realize the closed command-kind set as a
//! tagged variant plus a sum-typed payload, dispatched with an exhaustive
//! match rather than the runtime-type-identity (`isa<X>`) downcasts
//! celerity's C++ command graph uses. `CommandPackage` is the wire packet,
//! grounded on `serialize_and_flush`'s construction of `command_pkg` in
//! celerity's `graph_serializer.cc`.

use serde::{Deserialize, Serialize};

use rt_shared::{BufferId, CommandId, NodeId, TaskId};

/// N-dimensional offset + extent, fixed at 3 dimensions (celerity's ceiling);
/// lower-dimensional ranges use degenerate extents of 1 in unused axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subrange {
    pub offset: [usize; 3],
    pub extent: [usize; 3],
}

impl Subrange {
    /// A one-dimensional subrange `[offset, offset + extent)`.
    #[must_use]
    pub const fn one_dim(offset: usize, extent: usize) -> Self {
        Self {
            offset: [offset, 0, 0],
            extent: [extent, 1, 1],
        }
    }
}

/// The closed set of command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Nop,
    Compute,
    MasterAccess,
    Push,
    AwaitPush,
    Horizon,
}

impl CommandKind {
    /// Whether this kind is a "task command" (compute or
    /// master-access — the only kinds that carry a `tid` and can be the
    /// direct subject of a `flush`).
    #[must_use]
    pub fn is_task_command(self) -> bool {
        matches!(self, CommandKind::Compute | CommandKind::MasterAccess)
    }
}

/// Kind-specific payload, carried by both the in-graph command node and the
/// emitted wire packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    Nop,
    Compute { tid: TaskId, subrange: Subrange },
    MasterAccess { tid: TaskId },
    Push { bid: BufferId, target_nid: NodeId, subrange: Subrange },
    AwaitPush {
        bid: BufferId,
        source_nid: NodeId,
        source_cid: CommandId,
        subrange: Subrange,
    },
    Horizon,
}

impl CommandPayload {
    /// The `CommandKind` this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::Nop => CommandKind::Nop,
            CommandPayload::Compute { .. } => CommandKind::Compute,
            CommandPayload::MasterAccess { .. } => CommandKind::MasterAccess,
            CommandPayload::Push { .. } => CommandKind::Push,
            CommandPayload::AwaitPush { .. } => CommandKind::AwaitPush,
            CommandPayload::Horizon => CommandKind::Horizon,
        }
    }

    /// The owning task id, for payloads derived from a user task.
    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            CommandPayload::Compute { tid, .. } | CommandPayload::MasterAccess { tid, .. } => Some(*tid),
            _ => None,
        }
    }
}

/// The wire packet a command is serialized into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPackage {
    pub cid: CommandId,
    pub nid: NodeId,
    pub payload: CommandPayload,
}

impl CommandPackage {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_master_access_are_task_commands() {
        assert!(CommandKind::Compute.is_task_command());
        assert!(CommandKind::MasterAccess.is_task_command());
    }

    #[test]
    fn push_await_push_horizon_nop_are_not_task_commands() {
        assert!(!CommandKind::Push.is_task_command());
        assert!(!CommandKind::AwaitPush.is_task_command());
        assert!(!CommandKind::Horizon.is_task_command());
        assert!(!CommandKind::Nop.is_task_command());
    }

    #[test]
    fn payload_kind_matches_variant() {
        let payload = CommandPayload::Push {
            bid: BufferId::from_raw(1),
            target_nid: NodeId::from_raw(1),
            subrange: Subrange::one_dim(0, 10),
        };
        assert_eq!(payload.kind(), CommandKind::Push);
    }

    #[test]
    fn task_id_present_only_for_task_commands() {
        let compute = CommandPayload::Compute {
            tid: TaskId::from_raw(7),
            subrange: Subrange::one_dim(0, 1),
        };
        assert_eq!(compute.task_id(), Some(TaskId::from_raw(7)));

        let push = CommandPayload::Push {
            bid: BufferId::from_raw(0),
            target_nid: NodeId::from_raw(0),
            subrange: Subrange::one_dim(0, 1),
        };
        assert_eq!(push.task_id(), None);
    }

    #[test]
    fn one_dim_subrange_has_degenerate_higher_axes() {
        let sr = Subrange::one_dim(5, 10);
        assert_eq!(sr.offset, [5, 0, 0]);
        assert_eq!(sr.extent, [10, 1, 1]);
    }
}
