use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// How log events are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Compact lines for a terminal.
    #[default]
    Human,
    /// One JSON object per event, with targets.
    Json,
}

/// Default directives for a `-v` count. `RUST_LOG` replaces them entirely.
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "nodestore=info,warn",
        1 => "nodestore=debug,info",
        _ => "trace",
    }
}

/// Install the process-wide subscriber. Stdout is left to command output.
///
/// Fails if a subscriber is already installed.
pub fn init(format: LogFormat, verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let layer = match format {
        LogFormat::Human => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("Failed to install log subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parses_case_insensitively() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("Human", true).unwrap(), LogFormat::Human);
        assert!(LogFormat::from_str("yaml", true).is_err());
    }

    #[test]
    fn test_verbosity_widens_filter() {
        assert_eq!(default_directives(0), "nodestore=info,warn");
        assert_eq!(default_directives(1), "nodestore=debug,info");
        assert_eq!(default_directives(2), "trace");
        assert_eq!(default_directives(7), "trace");
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init(LogFormat::Human, 0);
        assert!(init(LogFormat::Json, 0).is_err());
    }
}
