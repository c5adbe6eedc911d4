pub mod config;
pub mod db;
pub mod pipeline;
pub mod pipeline_config;

use tracing_subscriber::EnvFilter;

/// Initialize tracing. Logs go to stderr so command output stays clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
