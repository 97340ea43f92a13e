//! # Logging
//!
//! Installs the process-wide `tracing` subscriber for the purchase bridge.
//!
//! Three layers are stacked on the registry:
//!
//! 1. an `EnvFilter` built from [`LoggingConfig`] (workspace crates at the
//!    configured level, everything else at `warn`, unless a custom directive
//!    string is given)
//! 2. a sink layer mirroring surviving events into the host's
//!    [`LoggerSink`], with purchase secrets redacted
//! 3. a `fmt` layer writing pretty, JSON or compact lines to stdout
//!
//! Purchase tokens, receipts and signatures must never reach a log line in
//! clear text. Use [`redact_token`] when logging them directly; the sink layer
//! applies [`redact_if_sensitive`] to every structured field it forwards.
//!
//! ```ignore
//! use bridge_traits::LogLevel;
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! tracing::info!(product_id = "remove_ads", "Catalog warmed up");
//! ```

use crate::error::{Error, Result};

use bridge_traits::log::{LogEntry, LogLevel, LoggerSink};

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose level follows [`LoggingConfig::level`] in the default filter.
const WORKSPACE_TARGETS: &[&str] = &[
    "core_runtime",
    "core_purchase",
    "bridge_desktop",
    "bridge_ffi",
];

/// Field name fragments whose values are purchase secrets.
const SECRET_FIELD_MARKERS: &[&str] = &[
    "token",
    "signature",
    "receipt",
    "original_json",
    "secret",
    "api_key",
    "public_key",
];

/// Output format of the stdout layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; for local development
    Pretty,
    /// One JSON object per event
    Json,
    /// One short line per event; what mobile hosts usually want
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Subscriber settings consumed by [`init_logging`].
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates when no custom filter is set
    pub level: LogLevel,
    /// `EnvFilter` directives (e.g. `"core_purchase=trace,bridge_ffi=debug"`)
    /// replacing the level-based default
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub show_target: bool,
    pub show_threads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            show_target: true,
            show_threads: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("logger_sink", &self.logger_sink.is_some())
            .field("show_target", &self.show_target)
            .field("show_threads", &self.show_threads)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    /// Mirror events into the host's logging pipeline as well.
    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// Thread names help when following a request from the store thread to
    /// the dispatcher.
    pub fn show_threads(mut self, show: bool) -> Self {
        self.show_threads = show;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = match &self.filter {
            Some(custom) => custom.clone(),
            None => std::iter::once("warn".to_string())
                .chain(
                    WORKSPACE_TARGETS
                        .iter()
                        .map(|target| format!("{}={}", target, self.level.as_str())),
                )
                .collect::<Vec<_>>()
                .join(","),
        };

        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter {:?}: {}", directives, e)))
    }

    fn stdout_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(self.show_target)
            .with_thread_names(self.show_threads)
            .with_thread_ids(self.show_threads)
            .with_writer(io::stdout);

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }
}

/// Installs the global subscriber.
///
/// Fails with [`Error::Config`] when the filter does not parse or a global
/// subscriber is already installed; only the first call in a process wins.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(SinkLayer::new(config.logger_sink.clone()))
        .with(config.stdout_layer())
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

/// Forwards events to a host [`LoggerSink`].
struct SinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl SinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }

    fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", err);
                }
            });
            return;
        }

        // Store threads and FFI callers have no runtime of their own
        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| e.to_string())
            .and_then(|runtime| {
                runtime
                    .block_on(sink.log(entry))
                    .map_err(|e| e.to_string())
            });
        if let Err(err) = outcome {
            eprintln!("LoggerSink error: {}", err);
        }
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = sink_level(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = fields.pairs.into_iter().fold(
            LogEntry::new(level, metadata.target(), message),
            |entry, (name, value)| {
                let value = redact_if_sensitive(name, &value);
                entry.with_field(name, value)
            },
        );
        entry.span_id = ctx.lookup_current().map(|span| span.name().to_string());

        Self::deliver(Arc::clone(sink), entry);
    }
}

/// Collects an event's message and fields as strings.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    pairs: Vec<(&'static str, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => self.pairs.push((name, value)),
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_owned());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    // Integers and booleans arrive here too
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

fn sink_level(level: &Level) -> LogLevel {
    if *level == Level::ERROR {
        LogLevel::Error
    } else if *level == Level::WARN {
        LogLevel::Warn
    } else if *level == Level::INFO {
        LogLevel::Info
    } else if *level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// Redacts `value` when `field_name` names a purchase secret.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// let shown = redact_if_sensitive("purchase_token", &purchase.purchase_token);
/// tracing::debug!(purchase_token = %shown, "Acknowledging");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    if SECRET_FIELD_MARKERS.iter().any(|marker| name.contains(marker)) {
        redact_token(value)
    } else {
        value.to_owned()
    }
}

/// Keeps a four character prefix so lines about the same purchase can still
/// be correlated.
pub fn redact_token(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    if prefix.is_empty() {
        "[REDACTED]".to_string()
    } else {
        format!("{}…[REDACTED]", prefix)
    }
}
