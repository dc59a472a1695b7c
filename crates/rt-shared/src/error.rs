//! Shared error taxonomy.
//!
//! `rt-graph` and `rt-worker` define their own narrower error enums
//! (`GraphError`, `EngineError`) for the failures specific to each
//! component, but both convert into and wrap the cross-cutting errors
//! defined here (configuration, I/O).

use thiserror::Error;

/// Top-level runtime error, re-exported by both downstream crates.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A configuration value was invalid or a required value was missing.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O operation (e.g. reading a config overlay) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-layer errors.
///
/// A parse failure of an optional value falls back to unset rather than
/// propagating as fatal; these variants are for cases the caller does need
/// to see (e.g. an explicitly inconsistent device list).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `RT_DEVICES` (or equivalent) named a platform/device pair that could
    /// not be parsed as two non-negative integers.
    #[error("invalid device selector {raw:?}: {reason}")]
    InvalidDeviceSelector { raw: String, reason: String },

    /// The configured device list is internally inconsistent (e.g. a
    /// host-local rank with no corresponding device entry).
    #[error("inconsistent device list: {0}")]
    InconsistentDeviceList(String),

    /// An optional value could not be parsed; this is reported as a warning
    /// by the config collaborator, not treated as fatal. Carried
    /// as a value so callers that do treat it as fatal (e.g. strict CLI
    /// validation layered on top of this core) still can.
    #[error("could not parse {field}: {reason} (falling back to unset)")]
    ParseFallback { field: String, reason: String },

    /// A TOML configuration overlay could not be parsed, or its shape did
    /// not match the expected fields. Fatal: unlike a missing individual
    /// value, a malformed overlay file is a configuration authoring error.
    #[error("failed to load configuration overlay: {0}")]
    LoadFailed(String),
}

impl ConfigError {
    /// Whether this error represents a hard stop rather than a value the
    /// caller is expected to fall back from.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConfigError::ParseFallback { .. })
    }
}
