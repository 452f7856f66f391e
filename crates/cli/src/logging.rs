use parley_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

/// Installs the global subscriber on stderr so stdout carries only command
/// payloads. Configuration errors are reported by the command itself; logging
/// then falls back to defaults.
pub(crate) fn init() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging already initialised: {error}");
    }
}
