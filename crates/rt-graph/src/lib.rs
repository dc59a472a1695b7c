//! Command graph store and serializer.
//!
//! Expands a flushed task's commands into per-node packets (C2/C3 in the
//! distributed runtime this crate is part of): [`CommandGraphStore`] holds
//! the DAG, [`GraphSerializer`] walks it to produce wire-ready
//! [`CommandPackage`]s, and horizon accounting prunes history once a
//! horizon job completes.

pub mod command;
pub mod error;
pub mod graph;
pub mod serializer;

pub use command::{CommandKind, CommandPackage, CommandPayload, Subrange};
pub use error::GraphError;
pub use graph::{CommandGraphStore, CommandHandle, SharedCommandGraph};
pub use serializer::{EmitSink, GraphSerializer};
