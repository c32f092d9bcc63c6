//! Diagnostic tracing for the CLI.
//!
//! Plan and apply reports go to stdout; tracing goes to stderr so it never
//! mixes with them. Library code only emits events; the binary decides
//! whether anything listens.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: `warn`, raised by `-v` flags.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "tessera=info",
        2 => "tessera=debug",
        _ => "tessera=trace",
    }
}

/// Compact stderr subscriber behind `filter`.
pub fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
}

/// Initialize the global tracing subscriber. `RUST_LOG` wins over `-v`.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // a subscriber already installed keeps its place
    let _ = subscriber(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(2), "tessera=debug");
        assert_eq!(default_directive(9), "tessera=trace");
    }

    #[test]
    fn test_subscriber_scoped() {
        for verbose in 0..4 {
            let filter = EnvFilter::new(default_directive(verbose));
            tracing::subscriber::with_default(subscriber(filter), || {
                tracing::info!(verbose, "scoped subscriber");
                assert_eq!(
                    tracing::enabled!(target: "tessera::core", tracing::Level::INFO),
                    verbose > 0
                );
            });
        }
    }
}
