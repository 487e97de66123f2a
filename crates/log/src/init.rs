//! Global subscriber installation.

use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{Config, Format, Writer};
use crate::error::LogError;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Drops the timestamp when the display config asks for it, then boxes.
macro_rules! finish_layer {
    ($layer:expr, $display:expr) => {
        if $display.time {
            $layer.boxed()
        } else {
            $layer.without_time().boxed()
        }
    };
}

/// Install the global `tracing` subscriber described by `config`.
///
/// # Errors
///
/// [`LogError::Filter`] if `config.level` is not a valid filter and
/// [`LogError::AlreadyInitialized`] if a global subscriber already exists.
/// In both cases the current subscriber, if any, is left in place.
pub fn init(config: &Config) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LogError::Filter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })?;

    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(filter)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logger initialized");
    Ok(())
}

fn make_writer(writer: Writer) -> BoxMakeWriter {
    match writer {
        Writer::Stdout => BoxMakeWriter::new(std::io::stdout),
        Writer::Stderr => BoxMakeWriter::new(std::io::stderr),
        Writer::Test => BoxMakeWriter::new(TestWriter::new()),
    }
}

fn fmt_layer(config: &Config) -> BoxedLayer {
    let display = &config.display;
    let base = tracing_subscriber::fmt::layer()
        .with_writer(make_writer(config.writer))
        .with_ansi(display.colors)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source);

    match config.format {
        Format::Pretty => finish_layer!(base.pretty(), display),
        Format::Compact => finish_layer!(base.compact(), display),
        Format::Json => finish_layer!(base.json().flatten_event(true), display),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = Config {
            level: "quasar_engine=loud".to_owned(),
            ..Config::test()
        };
        match init(&config) {
            Err(LogError::Filter { filter, .. }) => assert_eq!(filter, "quasar_engine=loud"),
            other => panic!("expected filter error, got {other:?}"),
        }
    }

    #[test]
    fn every_format_builds_a_layer() {
        for format in [Format::Pretty, Format::Compact, Format::Json] {
            let _layer = fmt_layer(&Config {
                format,
                ..Config::test()
            });
        }
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let first = init(&Config::test());
        let second = init(&Config::test());
        assert!(first.is_ok() || matches!(first, Err(LogError::AlreadyInitialized)));
        assert!(matches!(second, Err(LogError::AlreadyInitialized)));
    }
}
