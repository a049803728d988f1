// Logging setup
//
// Human-readable tracing output on stdout. The level is INFO, or DEBUG when
// the configuration's debug flag or --verbose is set; RUST_LOG refines it.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level used when RUST_LOG does not say otherwise
pub fn default_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Build the env filter for the given debug flag
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level(debug).into())
        .from_env_lossy()
}

/// Install the global subscriber
pub fn init(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .init();
}
