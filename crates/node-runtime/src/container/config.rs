//! # Node Configuration
//!
//! Unified configuration for the node and its subsystems.
//!
//! Every field has a default; `NodeConfig::from_env` layers `SM_*`
//! environment variables on top of them. Durations are given in
//! milliseconds, trackers as a comma-separated `id=ws_url` list.

use shared_types::{Location, TrackerRecord};
use sm_02_propagation::PropagationConfig;
use sm_03_tracker_sync::TrackerManagerConfig;
use std::time::Duration;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Per-node connect timeout while applying an instruction.
    pub node_connect_timeout: Duration,
    /// Delay before dropping a peer that no longer shares a stream part.
    pub disconnection_wait_time: Duration,
    /// Period of the sweep that drops every peer without shared stream parts.
    pub disconnection_cleanup_interval: Duration,
    /// Serve proxy clients (route key-exchange messages to them directly).
    pub accept_proxy_connections: bool,
    /// Gap limit of each duplicate detector.
    pub max_number_of_gaps: usize,
    pub location: Option<Location>,
    pub propagation: PropagationConfig,
    pub tracker: TrackerManagerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_connect_timeout: Duration::from_secs(15),
            disconnection_wait_time: Duration::from_secs(30),
            disconnection_cleanup_interval: Duration::from_secs(2 * 60),
            accept_proxy_connections: false,
            max_number_of_gaps: 10_000,
            location: None,
            propagation: PropagationConfig::default(),
            tracker: TrackerManagerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `SM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `SM_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = millis(&lookup, "SM_NODE_CONNECT_TIMEOUT_MS")? {
            config.node_connect_timeout = v;
        }
        if let Some(v) = millis(&lookup, "SM_DISCONNECTION_WAIT_TIME_MS")? {
            config.disconnection_wait_time = v;
        }
        if let Some(v) = millis(&lookup, "SM_DISCONNECTION_CLEANUP_INTERVAL_MS")? {
            config.disconnection_cleanup_interval = v;
        }
        if let Some(v) = parsed::<bool, _>(&lookup, "SM_ACCEPT_PROXY_CONNECTIONS")? {
            config.accept_proxy_connections = v;
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "SM_MAX_NUMBER_OF_GAPS")? {
            config.max_number_of_gaps = v;
        }

        if let Some(v) = parsed::<usize, _>(&lookup, "SM_MIN_PROPAGATION_TARGETS")? {
            config.propagation.min_propagation_targets = v;
        }
        if let Some(v) = millis(&lookup, "SM_PROPAGATION_TTL_MS")? {
            config.propagation.ttl = v;
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "SM_PROPAGATION_MAX_MESSAGES")? {
            config.propagation.max_messages = v;
        }

        if let Some(raw) = lookup("SM_TRACKERS") {
            config.tracker.trackers = parse_trackers(&raw)?;
        }
        if let Some(v) = millis(&lookup, "SM_RTT_UPDATE_INTERVAL_MS")? {
            config.tracker.rtt_update_interval = v;
        }
        if let Some(v) = millis(&lookup, "SM_TRACKER_MAINTENANCE_INTERVAL_MS")? {
            config.tracker.tracker_connection_maintenance_interval = v;
        }
        if let Some(v) = millis(&lookup, "SM_INSTRUCTION_RETRY_INTERVAL_MS")? {
            config.tracker.instruction_retry_interval = v;
        }

        Ok(config)
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("node_connect_timeout", self.node_connect_timeout),
            ("disconnection_wait_time", self.disconnection_wait_time),
            ("disconnection_cleanup_interval", self.disconnection_cleanup_interval),
            ("propagation.ttl", self.propagation.ttl),
            ("tracker.rtt_update_interval", self.tracker.rtt_update_interval),
            (
                "tracker.tracker_connection_maintenance_interval",
                self.tracker.tracker_connection_maintenance_interval,
            ),
            (
                "tracker.instruction_retry_interval",
                self.tracker.instruction_retry_interval,
            ),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(name));
        }
        if self.tracker.trackers.is_empty() {
            return Err(ConfigError::NoTrackers);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("At least one tracker must be configured (set SM_TRACKERS)")]
    NoTrackers,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn parsed<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parsed::<u64, _>(lookup, key)?.map(Duration::from_millis))
}

/// Parse `id=ws://host:port,...`. The HTTP address is derived from the
/// WebSocket one.
fn parse_trackers(raw: &str) -> Result<Vec<TrackerRecord>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "SM_TRACKERS",
        value: raw.to_string(),
    };
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, ws) = entry.split_once('=').ok_or_else(invalid)?;
            let (id, ws) = (id.trim(), ws.trim());
            if id.is_empty() || ws.is_empty() {
                return Err(invalid());
            }
            Ok(TrackerRecord::new(id, ws, http_address(ws)))
        })
        .collect()
}

fn http_address(ws: &str) -> String {
    if let Some(rest) = ws.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws.to_string()
    }
}
