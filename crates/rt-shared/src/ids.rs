//! Opaque, monotonically issued identifiers.
//!
//! Each identifier is its own newtype rather than a shared phantom-tagged
//! integer, matching how the rest of the workspace distinguishes identifier
//! kinds by type (e.g. `task_uuid: Uuid` vs `node_id: Uuid` in the
//! orchestration layer this crate's sibling crates are modeled on). Only
//! equality, hashing, and ordering are meaningful — arithmetic on the raw
//! value is deliberately not exposed outside this module.

use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw value. Callers outside the issuing component (the
            /// planner, for identifiers it owns) should not need this other
            /// than in tests and deserialization.
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value, e.g. for logging.
            #[must_use]
            pub const fn as_raw(self) -> u64 {
                self.0
            }

            /// Returns the next identifier in issuance order.
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(0)
            }
        }
    };
}

define_id!(TaskId, "Identifies a user task in the task graph.");
define_id!(NodeId, "Identifies a cluster node the runtime executes on.");
define_id!(BufferId, "Identifies a user-visible named buffer.");
define_id!(CommandId, "Identifies a single command graph node. Never reused once erased.");

/// Monotonic issuer for a single identifier kind.
///
/// Mirrors `command_dag::next_cmd_id` in the C++ reference this was derived from: a
/// single counter owned by whoever is allowed to mint new identifiers of
/// this kind (the command graph store, for `CommandId`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdSequence<T> {
    next: T,
}

impl<T: Copy> IdSequence<T>
where
    T: IdLike,
{
    /// Creates a sequence starting at the given identifier.
    #[must_use]
    pub fn starting_at(first: T) -> Self {
        Self { next: first }
    }

    /// Issues the next identifier and advances the sequence.
    pub fn issue(&mut self) -> T {
        let id = self.next;
        self.next = id.next_id();
        id
    }
}

/// Minimal capability needed by [`IdSequence`]; implemented by every id
/// newtype defined via `define_id!`.
pub trait IdLike: Copy {
    /// Returns the successor identifier.
    fn next_id(self) -> Self;
}

macro_rules! impl_id_like {
    ($name:ident) => {
        impl IdLike for $name {
            fn next_id(self) -> Self {
                self.next()
            }
        }
    };
}

impl_id_like!(TaskId);
impl_id_like!(NodeId);
impl_id_like!(BufferId);
impl_id_like!(CommandId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_raw_value() {
        assert!(CommandId::from_raw(1) < CommandId::from_raw(2));
        assert_eq!(CommandId::from_raw(5), CommandId::from_raw(5));
    }

    #[test]
    fn distinct_id_kinds_do_not_mix() {
        // This test exists to document intent: TaskId(1) and CommandId(1) are
        // unrelated types and cannot be compared, which the type checker
        // enforces at compile time. There is nothing to assert at runtime.
        let t = TaskId::from_raw(1);
        let c = CommandId::from_raw(1);
        assert_eq!(t.as_raw(), c.as_raw());
    }

    #[test]
    fn sequence_issues_monotonically() {
        let mut seq = IdSequence::starting_at(CommandId::from_raw(0));
        let a = seq.issue();
        let b = seq.issue();
        let c = seq.issue();
        assert_eq!(a, CommandId::from_raw(0));
        assert_eq!(b, CommandId::from_raw(1));
        assert_eq!(c, CommandId::from_raw(2));
    }

    #[test]
    fn display_includes_type_name_and_value() {
        assert_eq!(format!("{}", NodeId::from_raw(3)), "NodeId(3)");
    }
}
