//! Subscriber bootstrap for binaries and demos.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the host application. This helper covers the common case.

use tracing_subscriber::EnvFilter;

use crate::{DispatchError, DispatchResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`)
pub fn init_tracing(format: LogFormat) -> DispatchResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| DispatchError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
