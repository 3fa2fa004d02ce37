use tracing_subscriber::{EnvFilter, fmt};

pub use tracing::{debug, error, info, warn};

const DEFAULT_FILTER: &str = "ovirt2pve=info";

/// Install the global fmt subscriber. `RUST_LOG` wins over the default filter.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::logger::info!($($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::logger::warn!($($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::logger::error!($($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::logger::debug!($($arg)*) };
}
