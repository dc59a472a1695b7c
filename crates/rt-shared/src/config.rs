//! Per-process runtime configuration.
//!
//! Sourced from environment variables (prefix `RT_`) with an optional TOML
//! overlay, via the `config` crate — the same layering approach
//! `tasker-shared` uses for its TOML+env configuration. None of these
//! values are read by `rt-graph` or `rt-worker` core logic directly; they
//! are read by the external collaborators (device queue, buffer-transfer
//! manager), but the type lives here so collaborator
//! adapters and embedding applications share one definition.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RuntimeError};
use crate::ids::NodeId;

/// `{platform, device}` selection for a single host-local rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelector {
    pub platform_id: usize,
    pub device_id: usize,
}

impl FromStr for DeviceSelector {
    type Err = ConfigError;

    /// Parses a single `platform:device` pair, e.g. `"0:2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, device) = s.split_once(':').ok_or_else(|| ConfigError::InvalidDeviceSelector {
            raw: s.to_string(),
            reason: "expected \"platform:device\"".to_string(),
        })?;
        let platform_id = platform
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDeviceSelector {
                raw: s.to_string(),
                reason: "platform id is not a non-negative integer".to_string(),
            })?;
        let device_id = device
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDeviceSelector {
                raw: s.to_string(),
                reason: "device id is not a non-negative integer".to_string(),
            })?;
        Ok(Self { platform_id, device_id })
    }
}

/// Selects the compute-completion query strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompletionStrategy {
    /// Offload the blocking status query to a background slot and poll it
    /// with a short timeout. Needed for backends whose event-status query
    /// blocks until completion.
    #[default]
    Blocking,
    /// Query the device event's completion status directly; safe only when
    /// the backend's query is non-blocking.
    DirectQuery,
}

/// Per-process runtime configuration recognized by the core's external
/// collaborators: log level, device selection, profiling,
/// forced work-group size, plus the compute-completion strategy switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub devices: HashMap<NodeId, DeviceSelector>,
    pub device_profiling: bool,
    pub forced_work_group_size: Option<usize>,
    pub completion_strategy: CompletionStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            devices: HashMap::new(),
            device_profiling: false,
            forced_work_group_size: None,
            completion_strategy: CompletionStrategy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses the `RT_DEVICES` variable's value, of the form
    /// `"P D0 [D1 ...]"` (one platform, followed by one device id per
    /// host-local rank) — the exact format celerity's `CELERITY_DEVICES`
    /// uses. Each device id becomes this host's selector for the rank at
    /// that position.
    ///
    /// Returns `Ok(None)` (not an error) when `raw` is empty, matching the
    /// "parse failure of a required value falls back to unset" rule for
    /// optional values — an empty variable is simply "not configured".
    pub fn parse_devices_var(raw: &str) -> Result<Option<Vec<DeviceSelector>>, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let mut parts = raw.split_whitespace();
        let platform_id: usize = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidDeviceSelector {
                raw: raw.to_string(),
                reason: "missing platform id".to_string(),
            })?
            .parse()
            .map_err(|_| ConfigError::InvalidDeviceSelector {
                raw: raw.to_string(),
                reason: "platform id is not a non-negative integer".to_string(),
            })?;

        let mut selectors = Vec::new();
        for device in parts {
            let device_id: usize = device.parse().map_err(|_| ConfigError::InvalidDeviceSelector {
                raw: raw.to_string(),
                reason: format!("device id {device:?} is not a non-negative integer"),
            })?;
            selectors.push(DeviceSelector { platform_id, device_id });
        }

        if selectors.is_empty() {
            return Err(ConfigError::InconsistentDeviceList(
                "at least one device id must follow the platform id".to_string(),
            ));
        }

        Ok(Some(selectors))
    }

    /// Applies a parsed device list to host-local ranks `0..devices.len()`,
    /// replacing any existing entries for those ranks.
    pub fn apply_host_local_devices(&mut self, devices: Vec<DeviceSelector>) {
        for (rank, selector) in devices.into_iter().enumerate() {
            self.devices.insert(NodeId::from_raw(rank as u64), selector);
        }
    }

    /// Reads a TOML file at `path` and merges its present fields on top of
    /// `self`, leaving fields the overlay omits untouched. `devices` has no
    /// overlay equivalent — it is set only from `RT_DEVICES` via
    /// [`Self::parse_devices_var`], matching how celerity's
    /// `CELERITY_DEVICES` has no config-file counterpart either.
    pub fn apply_toml_overlay(&mut self, path: &std::path::Path) -> Result<(), RuntimeError> {
        let raw = std::fs::read_to_string(path)?;
        let overlay: ConfigOverlay = toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        overlay.apply_to(self);
        Ok(())
    }
}

/// A TOML configuration overlay's optional scalar fields. Present fields
/// override the corresponding field on the [`RuntimeConfig`] being loaded;
/// absent fields leave it unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverlay {
    log_level: Option<String>,
    device_profiling: Option<bool>,
    forced_work_group_size: Option<usize>,
    completion_strategy: Option<CompletionStrategy>,
}

impl ConfigOverlay {
    fn apply_to(self, cfg: &mut RuntimeConfig) {
        if let Some(log_level) = self.log_level {
            cfg.log_level = log_level;
        }
        if let Some(device_profiling) = self.device_profiling {
            cfg.device_profiling = device_profiling;
        }
        if self.forced_work_group_size.is_some() {
            cfg.forced_work_group_size = self.forced_work_group_size;
        }
        if let Some(completion_strategy) = self.completion_strategy {
            cfg.completion_strategy = completion_strategy;
        }
    }
}
