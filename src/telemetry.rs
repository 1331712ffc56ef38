//! Tracing setup for the binary.
//!
//! Log lines go to stderr so stdout stays free for machine-readable output
//! such as `next-version`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Only the first call in a process
/// takes effect.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::ValueEnum;

    #[test]
    fn test_log_format_from_cli_value() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("TEXT", true).unwrap(), LogFormat::Text);
        assert!(LogFormat::from_str("yaml", true).is_err());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(LogFormat::Text, Level::WARN);
        init_tracing(LogFormat::Json, Level::DEBUG);
    }
}
