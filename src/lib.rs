//! Aggregator for the labcam workspace demos.
//!
//! Re-exports the member crates so the demos under `demos/` can reach the
//! whole stack through one dependency.

pub use labcam;
pub use labcam::camparam;
pub use labcamctl;
pub use stage;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber used by the demos; `RUST_LOG` overrides
/// `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
