use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the process-wide logger. Safe to call more than once; only
/// the first call takes effect. The filter honors `AEX_LOG` and defaults
/// to `info`.
pub fn init_log() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(
            env_logger::Env::default()
                .filter_or("AEX_LOG", "info")
                .write_style("AEX_LOG_STYLE"),
        )
        .init();
    });
}

#[macro_export]
macro_rules! ae_error {
    ($($arg:tt)+) => (
        log::error!(target: "aex", $($arg)+)
    );
}

#[macro_export]
macro_rules! ae_warn {
    ($($arg:tt)+) => (
        log::warn!(target: "aex", $($arg)+)
    );
}

#[macro_export]
macro_rules! ae_info {
    ($($arg:tt)+) => (
        log::info!(target: "aex", $($arg)+)
    );
}

#[macro_export]
macro_rules! ae_debug {
    ($($arg:tt)+) => (
        log::debug!(target: "aex", $($arg)+)
    );
}

#[macro_export]
macro_rules! ae_trace {
    ($($arg:tt)+) => (
        log::trace!(target: "aex", $($arg)+)
    );
}
