// Logging setup.
// Installs a tracing subscriber with an env filter and plain or JSON output.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
