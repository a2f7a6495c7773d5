//! Tracing subscriber setup for hosts embedding the pipeline

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` overrides `default_level`. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(Level::WARN);
        init(Level::DEBUG);
        tracing::info!("still logging");
    }
}
