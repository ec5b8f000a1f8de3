//! Ingestion tunables.
//!
//! Everything here has a production default; deployments override the
//! handful of knobs they care about (shorter timers in test rigs, larger
//! pending buffers on slow uplinks).

use serde::Deserialize;
use std::time::Duration;

fn default_registration_check_delay_ms() -> u64 {
    3_000
}

fn default_pending_drain_budget_ms() -> u64 {
    3_000
}

fn default_lock_poll_interval_ms() -> u64 {
    100
}

fn default_pending_queue_capacity() -> usize {
    256
}

/// How the JSON value-set path treats more entries than the registered
/// record count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcessPolicy {
    /// Reject the whole value.
    #[default]
    Error,
    /// Keep the first `length` entries and drop the rest.
    Truncate,
}

/// Top-level configuration for the ingestion core.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Delay before a source's registration-completion check fires.
    #[serde(default = "default_registration_check_delay_ms")]
    pub registration_check_delay_ms: u64,
    /// Wall-clock budget for draining a component's pending messages after
    /// its identity arrives.
    #[serde(default = "default_pending_drain_budget_ms")]
    pub pending_drain_budget_ms: u64,
    /// Polling interval while waiting on a held source lock.
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
    /// Per-component bound on messages buffered before the identity arrives.
    #[serde(default = "default_pending_queue_capacity")]
    pub pending_queue_capacity: usize,
    /// Policy for excess entries on the JSON value-set path.
    #[serde(default)]
    pub excess_values: ExcessPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            registration_check_delay_ms: default_registration_check_delay_ms(),
            pending_drain_budget_ms: default_pending_drain_budget_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            pending_queue_capacity: default_pending_queue_capacity(),
            excess_values: ExcessPolicy::default(),
        }
    }
}

impl IngestConfig {
    pub fn registration_check_delay(&self) -> Duration {
        Duration::from_millis(self.registration_check_delay_ms)
    }

    pub fn pending_drain_budget(&self) -> Duration {
        Duration::from_millis(self.pending_drain_budget_ms)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}
