//! Integration tests for logging initialization.
//!
//! The global subscriber can only be installed once per process, so every
//! assertion that depends on it lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_stream_id, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_init_logging_installs_once_and_mirrors_to_sink() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).expect("first initialization succeeds");

    tracing::info!(
        target: "core_sync::engine",
        stream_id = %redact_stream_id("user/42/category/music"),
        "Engine created"
    );

    {
        let entries = sink.entries.lock().unwrap();
        let entry = entries
            .iter()
            .find(|e| e.message == "Engine created")
            .expect("sink received the event");
        assert_eq!(
            entry.fields.get("stream_id"),
            Some(&"user/[REDACTED]/category/music".to_string())
        );
    }

    // targets outside the workspace crates have no directive and are dropped
    tracing::info!(target: "hyper::client", "noise");
    assert!(!sink
        .entries
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.message == "noise"));

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_format_selection() {
    let config = LoggingConfig::default();

    #[cfg(debug_assertions)]
    assert_eq!(config.format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(config.format, LogFormat::Json);
}
