use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared-session coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Name of the broadcast channel every context joins for change notifications.
    /// TOML: `session.channel_name`. Default: `patients-sync`.
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Per-receiver buffer of the broadcast channel. A receiver that falls further behind
    /// treats the gap as a single "update".
    /// TOML: `session.channel_capacity`. Default: `64`.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Total invocations allowed for an operation interrupted by a leader change.
    /// TOML: `session.retry_max_attempts`. Default: `3`.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,

    /// Delay before the first retry, in milliseconds.
    /// TOML: `session.retry_initial_delay_ms`. Default: `200`.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Multiplier applied to the delay after every retry.
    /// TOML: `session.retry_backoff_factor`. Default: `1.5`.
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f32,

    /// Whether a context's own subscribers receive the events it publishes.
    /// TOML: `session.deliver_self`. Default: `true`.
    #[serde(default = "default_deliver_self")]
    pub deliver_self: bool,
}

impl SessionConfig {
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            channel_capacity: default_channel_capacity(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_backoff_factor: default_retry_backoff_factor(),
            deliver_self: default_deliver_self(),
        }
    }
}

fn default_channel_name() -> String {
    "patients-sync".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

fn default_retry_max_attempts() -> usize {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    200
}

fn default_retry_backoff_factor() -> f32 {
    1.5
}

fn default_deliver_self() -> bool {
    true
}
