//! Worker job engine.
//!
//! Consumes the packets a [`rt_graph`] serializer emits and turns them into
//! concrete progress against a device queue and a buffer-transfer manager
//! (C4), honoring the dependency ordering the serializer encoded, and
//! drives horizon-triggered pruning of the shared command graph (C5).

pub mod collaborators;
pub mod engine;
pub mod error;
pub mod job;

pub use collaborators::{
    AwaitPushPayload, BufferTransferManager, DeviceEventHandle, DeviceQueue, PollCompletion, ProfilingTimestamps, PushPayload, TaskDefinition, TaskStore,
    TransferHandle,
};
pub use engine::JobEngine;
pub use error::EngineError;
pub use job::{Job, JobContext, JobState, PollOutcome};
