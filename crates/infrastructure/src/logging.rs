use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LogLevel};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. `LogFormat::Json` emits
/// flattened JSON lines; `LogFormat::Text` is the pretty human format.
/// Stdout stays free for command output.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_is_a_valid_filter() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(level.as_str()).is_ok(), "{level}");
        }
    }

    #[test]
    fn second_init_is_an_error() {
        // Only one subscriber can be installed per process.
        let first = init_logging(LogLevel::Warn, LogFormat::Json);
        let second = init_logging(LogLevel::Warn, LogFormat::Text);
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(ConfigError::Logging(_))));
    }
}
