use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing from configuration.
///
/// `RUST_LOG`, when set, replaces the configured filter. Output goes to
/// stderr so that stdout carries only model responses.
pub fn install_tracing_from_config(cfg: &memebot_config::LoggingConfig) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter {filter:?} ({e}), falling back to info");
        EnvFilter::new("info")
    });

    if cfg.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .init();
    }
}
