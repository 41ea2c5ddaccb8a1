//! Logging - Tracing Subscriber Setup
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "tessera=debug,tessera_graph=debug,tessera_trace=debug,tessera_quant=debug,tessera_vision=debug"
    } else {
        "tessera=info,tessera_graph=info,tessera_trace=info,tessera_quant=info,tessera_vision=info"
    }
}

/// Installs the global subscriber. Logs go to stderr so `--json` output on
/// stdout stays machine-readable. `--verbose` and `--quiet` take precedence
/// over `RUST_LOG`.
pub fn init(verbose: bool, quiet: bool) {
    let filter = if verbose || quiet {
        EnvFilter::new(default_filter(verbose, quiet))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(false, false)))
    };

    // A subscriber may already be installed in tests.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(false, true), "error");
        assert!(default_filter(true, false).contains("tessera_quant=debug"));
        assert!(default_filter(false, false).starts_with("tessera=info"));
    }
}
