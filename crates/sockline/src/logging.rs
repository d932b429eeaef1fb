use clap::ValueEnum;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Target prefix shared by every workspace crate.
const WORKSPACE_TARGET: &str = "sockline";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Workspace crates log at `level`; dependencies never go past warn.
fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    Targets::new()
        .with_target(WORKSPACE_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Send `tracing` output to stderr so stdout stays machine readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn workspace_follows_level_and_dependencies_stay_quiet() {
        let filter = targets(LogLevel::Debug);
        assert!(filter.would_enable("sockline_client::engine", &Level::DEBUG));
        assert!(!filter.would_enable("sockline_client::engine", &Level::TRACE));
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::INFO));
    }

    #[test]
    fn off_silences_everything() {
        let filter = targets(LogLevel::Off);
        assert!(!filter.would_enable("sockline_frame::binary", &Level::ERROR));
        assert!(!filter.would_enable("url", &Level::ERROR));
    }
}
