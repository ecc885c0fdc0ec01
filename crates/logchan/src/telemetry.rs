//! Subscriber setup for the library's own diagnostics

use crate::{
    config::{LogFormat, TelemetryConfig},
    error::{LogchanError, Result},
    event::LogLevel,
};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Install a global `tracing` subscriber built from `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Fails when a global
/// subscriber is already set; does nothing when telemetry is disabled.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let subscriber = Registry::default()
        .with(build_fmt_layer(config))
        .with(build_env_filter(config)?);

    subscriber.try_init().map_err(|e| LogchanError::Telemetry {
        message: format!("Failed to initialize tracing subscriber: {}", e),
    })?;

    tracing::debug!(
        logchan.event = "telemetry_initialized",
        logchan.version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        "Telemetry initialized"
    );

    Ok(())
}

/// Directive string for a configured level
pub fn level_directive(level: LogLevel) -> &'static str {
    match level.to_tracing() {
        None => "off",
        Some(tracing::Level::ERROR) => "error",
        Some(tracing::Level::WARN) => "warn",
        Some(tracing::Level::INFO) => "info",
        Some(tracing::Level::DEBUG) => "debug",
        Some(_) => "trace",
    }
}

/// Build environment filter for log level filtering
fn build_env_filter(config: &TelemetryConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(level_directive(config.level)).map_err(|e| LogchanError::Telemetry {
        message: format!("Invalid log level directive: {}", e),
    })
}

// Options every output format shares.
macro_rules! with_common_fields {
    ($layer:expr, $config:expr) => {
        $layer
            .with_file($config.include_location)
            .with_line_number($config.include_location)
            .with_thread_ids($config.include_thread_info)
            .with_thread_names($config.include_thread_info)
            .boxed()
    };
}

fn build_fmt_layer(config: &TelemetryConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_target(config.format != LogFormat::Compact);

    match config.format {
        LogFormat::Json => with_common_fields!(
            layer.json().with_current_span(true).with_span_list(false),
            config
        ),
        LogFormat::Pretty => with_common_fields!(layer.pretty(), config),
        LogFormat::Compact => with_common_fields!(layer.compact(), config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(LogLevel::Off), "off");
        assert_eq!(level_directive(LogLevel::Fatal), "error");
        assert_eq!(level_directive(LogLevel::Warn), "warn");
        assert_eq!(level_directive(LogLevel::All), "trace");
    }

    #[test]
    #[serial]
    fn test_env_filter_for_every_level() {
        std::env::remove_var("RUST_LOG");
        for level in [LogLevel::Off, LogLevel::Error, LogLevel::Info, LogLevel::All] {
            let config = TelemetryConfig {
                level,
                ..TelemetryConfig::default()
            };
            assert!(build_env_filter(&config).is_ok());
        }
    }

    #[test]
    fn test_fmt_layer_for_every_format() {
        for format in [LogFormat::Json, LogFormat::Pretty, LogFormat::Compact] {
            let config = TelemetryConfig {
                format,
                include_location: true,
                include_thread_info: true,
                ..TelemetryConfig::default()
            };
            let subscriber = Registry::default().with(build_fmt_layer(&config));
            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(logchan.event = "format_check", "formatted");
            });
        }
    }

    #[test]
    fn test_disabled_telemetry_is_noop() {
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        assert!(init(&config).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default();
        // The first call may already lose to a subscriber set by another test.
        let _ = init(&config);
        assert!(matches!(
            init(&config),
            Err(LogchanError::Telemetry { .. })
        ));
    }
}
