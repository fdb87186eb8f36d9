use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig, Rotation};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Wire up tracing from the loaded config: a stdout layer always, a
/// rolling file layer when enabled. Level precedence is the config value,
/// then `RUST_LOG`, then `info`.
pub fn init_with_config(cfg: &LoggingConfig) {
    let filter = match &cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(cfg.format)];
    if let Some(writer) = rolling_writer(cfg) {
        layers.push(file_layer(cfg.format, writer));
    }

    // try_init so a second call (tests, embedded use) is a no-op
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer().with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => base
            .json()
            .with_ansi(false)
            .with_writer(std::io::stdout)
            .boxed(),
        LogFormat::Text => base.with_ansi(true).with_writer(std::io::stdout).boxed(),
    }
}

fn file_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false);
    match format {
        LogFormat::Json => base.json().with_writer(writer).boxed(),
        LogFormat::Text => base.with_writer(writer).boxed(),
    }
}

/// Non-blocking rolling writer, or `None` when file logging is off or the
/// directory cannot be prepared (the server still logs to stdout).
fn rolling_writer(cfg: &LoggingConfig) -> Option<NonBlocking> {
    if !cfg.enable_file_logging {
        return None;
    }
    if let Err(err) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "log directory '{}' unavailable ({err}); file logging disabled",
            cfg.dir
        );
        return None;
    }

    let rotation = match cfg.rotation {
        Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, &cfg.dir, &cfg.filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // The worker guard flushes on drop; logging lives as long as the
    // process, so it must never drop
    std::mem::forget(guard);
    Some(writer)
}
