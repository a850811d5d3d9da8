//! Fixtures and a reference interpreter shared by the integration tests.

pub mod fixtures;
pub mod interp;

#[cfg(test)]
mod core;

/// Installs the test log subscriber once per process.
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_test_writer()
        .try_init();
}
