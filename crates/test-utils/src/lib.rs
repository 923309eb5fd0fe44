pub mod actions;
pub mod builders;
pub mod fake_executor;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing once per test binary.
///
/// Logs go through `with_test_writer()`, so they only show up for failing
/// tests (or with `--nocapture`). `RUST_LOG=kiln=debug` raises the level.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Upper bound for a whole test build, including real child processes.
pub const BUILD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Run a future, failing the test if it takes longer than [`BUILD_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(BUILD_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("build did not finish within {BUILD_TIMEOUT:?}"),
    }
}
