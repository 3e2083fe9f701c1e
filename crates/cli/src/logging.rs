use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";
const LOG_FILE: &str = "client.log";

/// Route all tracing output to `<log_dir>/client.log` so it never mixes
/// with command output. Keep the guard alive until exit.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let filter = std::env::var("SITEAI_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("SITEAI_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    tracing::debug!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_dir.join(LOG_FILE).display(),
        format = %format,
    );

    Ok(guard)
}
