//! Tracing setup: a rolling log file plus a console layer.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

impl LogConfig {
    fn rotation(&self) -> Rotation {
        match self.rotation.as_str() {
            "hourly" => Rotation::HOURLY,
            "daily" => Rotation::DAILY,
            _ => Rotation::NEVER,
        }
    }

    fn filter(&self) -> EnvFilter {
        // RUST_LOG wins over the configured level when set
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.clone()))
    }
}

/// Install the global subscriber. The returned guard flushes buffered file
/// output on drop and must live as long as the process.
pub fn init_logging(config: &LogConfig) -> WorkerGuard {
    let appender = RollingFileAppender::new(config.rotation(), &config.dir, &config.file);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false);
        let console_layer = fmt::layer().with_target(false);
        tracing_subscriber::registry()
            .with(config.filter())
            .with(file_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(file_writer)
            .with_ansi(false);
        let console_layer = fmt::layer().with_target(false);
        tracing_subscriber::registry()
            .with(config.filter())
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_rotation(rotation: &str) -> LogConfig {
        LogConfig {
            level: "info".to_string(),
            dir: "./logs".to_string(),
            file: "test.log".to_string(),
            rotation: rotation.to_string(),
            use_json: false,
        }
    }

    #[test]
    fn rotation_parsing() {
        assert_eq!(config_with_rotation("hourly").rotation(), Rotation::HOURLY);
        assert_eq!(config_with_rotation("daily").rotation(), Rotation::DAILY);
        assert_eq!(config_with_rotation("never").rotation(), Rotation::NEVER);
        assert_eq!(config_with_rotation("bogus").rotation(), Rotation::NEVER);
    }
}
