/*!
 * Diagnostic output for the satchel binary and tests
 *
 * Logs go to stderr (compact) or, when a log file is configured, to that
 * file as JSON lines with span close events. stdout is never written to:
 * `get` and `list` print file content and listings there.
 */

use std::fs::File;
use std::sync::{Arc, Once};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{FileServiceError, Result};

/// Filter directive for the configured level; verbose forces debug
fn default_directive(config: &LoggingConfig) -> String {
    let level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        config.level.to_tracing_level()
    };
    format!("satchel={}", level)
}

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(config))
            .map_err(|e| FileServiceError::Config(format!("invalid log filter: {}", e)))?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match &config.file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                FileServiceError::Config(format!("cannot open log file {}: {}", path.display(), e))
            })?;
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init()
        }
        None => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| FileServiceError::Config(format!("logging already initialized: {}", e)))
}

/// Route `satchel` events at debug level into the test harness output
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("satchel=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().compact())
            .try_init();
    });
}
