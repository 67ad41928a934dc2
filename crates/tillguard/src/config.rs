//! Service-level configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tillguard_session::SessionConfig;

/// Shortest allowed sweep interval. Anything lower is clamped.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a running session service.
///
/// Hosts usually embed this in their own settings file; every field has a
/// default, so a partial document is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capacity of the command channel. When full, callers wait.
    pub command_channel_size: usize,

    /// How often idle profiles are swept (in addition to once at startup).
    pub sweep_interval: Duration,

    /// The session engine's own settings.
    pub session: SessionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command_channel_size: 64,
            sweep_interval: Duration::from_secs(60 * 60),
            session: SessionConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Returns a copy with out-of-range values replaced by usable ones.
    pub fn validated(mut self) -> Self {
        if self.command_channel_size == 0 {
            tracing::warn!("command_channel_size of 0 is not allowed, using 1");
            self.command_channel_size = 1;
        }
        if self.sweep_interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(
                requested_secs = self.sweep_interval.as_secs(),
                "sweep_interval too short, clamping to one minute"
            );
            self.sweep_interval = MIN_SWEEP_INTERVAL;
        }
        self.session = self.session.validated();
        self
    }
}
