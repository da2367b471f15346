//! Structured logging via `tracing`.

use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Initializes the global tracing subscriber, writing to stderr.
///
/// The filter comes from `DOCTRINE_LOG`, then `RUST_LOG`, then the
/// verbosity level (`0` = info, `1` = debug, `2+` = trace). Calling this
/// twice is harmless; the second call is ignored.
pub fn init_logging(verbosity: u8, format: LogFormat) {
    let default_directive = match verbosity {
        0 => "doctrine=info",
        1 => "doctrine=debug",
        _ => "doctrine=trace",
    };

    let filter = std::env::var("DOCTRINE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| EnvFilter::new(default_directive),
            EnvFilter::new,
        );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(0, LogFormat::Pretty);
        init_logging(2, LogFormat::Json);
    }
}
