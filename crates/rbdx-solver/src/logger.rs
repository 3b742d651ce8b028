//! Logging setup for rbdx binaries.
//!
//! Solvers emit `tracing` events: `debug!` for per-solve summaries, `trace!`
//! per iteration (or `info!` when the solver is verbose), `warn!` for
//! ignored configuration values.

use tracing::Level;

/// Initialize the tracing subscriber with the default INFO level.
///
/// The level can be overridden through `RUST_LOG`:
/// ```bash
/// RUST_LOG=rbdx_solver=trace rbdx-cli solve scene.json
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level.
///
/// # Arguments
/// * `default_level` - The default log level (overridable via RUST_LOG)
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}
