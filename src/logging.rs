//! Tracing subscriber setup for the `kd` binary.
//!
//! Environment:
//!   RUST_LOG    - standard env filter (default: `knowledge_digest=info,knowledge_digest_core=info`)
//!   LOG_FORMAT  - `json` for JSON lines, anything else for human-readable text
//!   LOG_ANSI    - `true`/`false` override for ANSI colors
//!
//! Logs always go to stderr so stdout stays parseable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "knowledge_digest=info,knowledge_digest_core=info";
const VERBOSE_FILTER: &str = "knowledge_digest=debug,knowledge_digest_core=debug";

/// Filter directives for the given `-v` count when `RUST_LOG` is unset.
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_FILTER,
        1 => VERBOSE_FILTER,
        _ => "knowledge_digest=trace,knowledge_digest_core=trace",
    }
}

/// Install the global subscriber. Safe to call once per process; a second
/// call is ignored.
pub fn init(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        } else {
            layer = layer.with_ansi(atty::is(atty::Stream::Stderr));
        }
        registry.with(layer).try_init()
    };

    if result.is_ok() {
        tracing::debug!(log_format = %log_format, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert!(default_directives(0).contains("=info"));
        assert!(default_directives(1).contains("=debug"));
        assert!(default_directives(3).contains("=trace"));
    }

    #[test]
    fn test_directives_parse() {
        for v in 0..3 {
            assert!(EnvFilter::try_new(default_directives(v)).is_ok());
        }
    }
}
