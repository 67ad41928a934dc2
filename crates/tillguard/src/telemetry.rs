//! Tracing subscriber setup for binaries embedding the service.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the process. Filter directives come from the
//! `TILLGUARD_LOG` environment variable:
//!
//! ```bash
//! TILLGUARD_LOG=debug shared-till
//! TILLGUARD_LOG=tillguard_session=trace,warn shared-till
//! ```

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "TILLGUARD_LOG";

/// Installs a stderr `fmt` subscriber filtered by [`LOG_ENV`].
///
/// Falls back to `info` when the variable is unset or invalid. Calling it
/// again once a global subscriber exists is harmless: the existing one is
/// kept and `false` is returned.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
