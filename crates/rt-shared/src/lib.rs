//! # rt-shared
//!
//! Identifiers, error taxonomy, configuration, and resilience primitives
//! shared between the command-graph crate (`rt-graph`) and the worker job
//! engine crate (`rt-worker`).
//!
//! This crate owns nothing runnable on its own; it is the seam the other
//! two crates build on, the way `tasker-shared` underpins
//! `tasker-orchestration` and `tasker-worker`.

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::{CompletionStrategy, DeviceSelector, RuntimeConfig};
pub use error::{ConfigError, RuntimeError};
pub use ids::{BufferId, CommandId, IdSequence, NodeId, TaskId};
pub use metrics::JobBenchmark;
