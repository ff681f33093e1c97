//! Structured logging middleware.
//!
//! Emits a record at `before` ("message received") and at `after`
//! ("completed" or "failed"). Never mutates the message or the result, never
//! returns an error — a logger must not be able to break dispatch.
//!
//! The logging capability itself is injected at construction rather than
//! reached for as a process-wide global: [`Logger`] is a small trait the
//! middleware calls through, and [`TracingLogger`] is the one concrete,
//! `tracing`-backed implementation this crate ships and uses by default.

use crate::commbus::context::DispatchContext;
use crate::commbus::message::DynMessage;
use crate::commbus::middleware::{BusValue, Middleware};
use crate::types::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Logging capability a [`LoggingMiddleware`] is built against. Kept
/// separate from the middleware itself so applications that already have
/// their own log pipeline can plug it in instead of `tracing`.
pub trait Logger: Send + Sync + 'static {
    fn debug(&self, message: &str, fields: &[(&str, &str)]);
    fn info(&self, message: &str, fields: &[(&str, &str)]);
    fn warn(&self, message: &str, fields: &[(&str, &str)]);
}

/// The default [`Logger`], backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &[(&str, &str)]) {
        let rendered = render_fields(fields);
        tracing::debug!(fields = %rendered, "{message}");
    }

    fn info(&self, message: &str, fields: &[(&str, &str)]) {
        let rendered = render_fields(fields);
        tracing::info!(fields = %rendered, "{message}");
    }

    fn warn(&self, message: &str, fields: &[(&str, &str)]) {
        let rendered = render_fields(fields);
        tracing::warn!(fields = %rendered, "{message}");
    }
}

fn render_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which [`Logger`] method the "received"/"completed" records use. Failures
/// always log through `warn`, regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailLevel {
    Debug,
    Info,
    Warn,
}

impl DetailLevel {
    fn parse(level_hint: &str) -> Self {
        match level_hint.to_ascii_lowercase().as_str() {
            "trace" | "debug" => DetailLevel::Debug,
            "warn" | "error" => DetailLevel::Warn,
            _ => DetailLevel::Info,
        }
    }
}

/// Logging middleware. `level_hint` ("trace"/"debug"/"info"/"warn"/"error")
/// controls the level used for the "received"/"completed" records; failures
/// always log at `warn`.
pub struct LoggingMiddleware<L: Logger = TracingLogger> {
    detail: DetailLevel,
    logger: L,
}

impl LoggingMiddleware<TracingLogger> {
    pub fn new(level_hint: &str) -> Self {
        Self::with_logger(level_hint, TracingLogger)
    }
}

impl<L: Logger> LoggingMiddleware<L> {
    pub fn with_logger(level_hint: &str, logger: L) -> Self {
        Self {
            detail: DetailLevel::parse(level_hint),
            logger,
        }
    }

    fn log_detail(&self, message: &str, fields: &[(&str, &str)]) {
        match self.detail {
            DetailLevel::Debug => self.logger.debug(message, fields),
            DetailLevel::Info => self.logger.info(message, fields),
            DetailLevel::Warn => self.logger.warn(message, fields),
        }
    }
}

impl Default for LoggingMiddleware<TracingLogger> {
    fn default() -> Self {
        Self::new("info")
    }
}

impl<L: Logger> std::fmt::Debug for LoggingMiddleware<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("detail", &self.detail)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<L: Logger> Middleware for LoggingMiddleware<L> {
    async fn before(
        &self,
        ctx: &DispatchContext,
        msg: Arc<dyn DynMessage>,
    ) -> Result<Option<Arc<dyn DynMessage>>> {
        let dispatch_id = ctx.dispatch_id().to_string();
        self.log_detail(
            "message received",
            &[
                ("dispatch_id", dispatch_id.as_str()),
                ("type_key", ctx.type_key()),
                ("category", ctx.category().as_str()),
            ],
        );
        Ok(Some(msg))
    }

    async fn after(
        &self,
        ctx: &DispatchContext,
        _original: &Arc<dyn DynMessage>,
        _result: Option<&BusValue>,
        error: Option<&Error>,
    ) -> (Option<BusValue>, Option<Error>) {
        let dispatch_id = ctx.dispatch_id().to_string();
        match error {
            None => self.log_detail(
                "completed",
                &[
                    ("dispatch_id", dispatch_id.as_str()),
                    ("type_key", ctx.type_key()),
                    ("category", ctx.category().as_str()),
                ],
            ),
            Some(err) => {
                let message = err.to_string();
                self.logger.warn(
                    "failed",
                    &[
                        ("dispatch_id", dispatch_id.as_str()),
                        ("type_key", ctx.type_key()),
                        ("category", ctx.category().as_str()),
                        ("error", message.as_str()),
                    ],
                );
            }
        }
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commbus::message::{Category, Message};
    use std::sync::Mutex;

    struct Probe;
    impl Message for Probe {
        type Response = ();
        fn category() -> Category {
            Category::Event
        }
        const TYPE_KEY: &'static str = "Probe";
    }

    #[derive(Default)]
    struct RecordingLogger {
        debug: Mutex<Vec<String>>,
        info: Mutex<Vec<String>>,
        warn: Mutex<Vec<String>>,
    }

    impl Logger for Arc<RecordingLogger> {
        fn debug(&self, message: &str, _fields: &[(&str, &str)]) {
            self.debug.lock().unwrap().push(message.to_string());
        }
        fn info(&self, message: &str, _fields: &[(&str, &str)]) {
            self.info.lock().unwrap().push(message.to_string());
        }
        fn warn(&self, message: &str, _fields: &[(&str, &str)]) {
            self.warn.lock().unwrap().push(message.to_string());
        }
    }

    fn ctx() -> DispatchContext {
        DispatchContext::new(
            Arc::from("Probe"),
            Category::Event,
            &tokio_util::sync::CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn logs_received_and_completed_through_the_injected_logger() {
        let recorder = Arc::new(RecordingLogger::default());
        let mw = LoggingMiddleware::with_logger("info", recorder.clone());
        let ctx = ctx();
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);

        mw.before(&ctx, msg.clone()).await.unwrap();
        mw.after(&ctx, &msg, None, None).await;

        assert_eq!(*recorder.info.lock().unwrap(), vec!["message received", "completed"]);
        assert!(recorder.warn.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn logs_failure_through_warn_regardless_of_detail_level() {
        let recorder = Arc::new(RecordingLogger::default());
        let mw = LoggingMiddleware::with_logger("debug", recorder.clone());
        let ctx = ctx();
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);
        let err = Error::internal("boom");

        mw.after(&ctx, &msg, None, Some(&err)).await;

        assert_eq!(*recorder.warn.lock().unwrap(), vec!["failed"]);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn default_tracing_logger_emits_records() {
        let mw = LoggingMiddleware::default();
        let ctx = ctx();
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);
        mw.before(&ctx, msg.clone()).await.unwrap();
        mw.after(&ctx, &msg, None, None).await;
        assert!(logs_contain("message received"));
        assert!(logs_contain("completed"));
    }
}
