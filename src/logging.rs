use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber, fmt::writer::BoxMakeWriter};

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV: &str = "TDL_LOG";

/// Resolve the filter directive: explicit level, then `TDL_LOG`, then `info`.
pub fn resolve_filter(level: Option<&str>, env_value: Option<String>) -> EnvFilter {
    let directive = level
        .map(str::to_owned)
        .or(env_value)
        .unwrap_or_else(|| "info".to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr unless `log_file` is set.
pub fn init_logging(level: Option<&str>, log_file: Option<&Path>, json: bool) -> Result<()> {
    let filter = resolve_filter(level, std::env::var(LOG_ENV).ok());

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    info!("logging initialized");
    Ok(())
}
