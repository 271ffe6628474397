//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "core_sync=trace"
//! ```

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug)
        .with_spans(true)
        .with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Warn,
        }));
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(e) = init_logging(config) {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    sync_file("/home/jo/vaults/work.kdbx", "hunter2").await;
}

#[instrument(skip(password), fields(file = %strip_path(path)))]
async fn sync_file(path: &str, password: &str) {
    info!(fs_type = "webdav", "Sync started");
    debug!(
        password = %redact_if_sensitive("password", password),
        "Using stored credentials"
    );
    warn!(status = "NoNetwork", "Server unreachable, serving cached copy");
}
