//! Leveled logger with mirrored console/file output
//!
//! Builds a `tracing` dispatcher with a file layer writing to a [`RotatingSink`] and an
//! optional console layer on stdout. Each logger owns its dispatcher, so several can
//! live in one process; [`Logger::install`] promotes one to the global default.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::Layer;

use super::level::Level;
use super::sink::{RotatingSink, SinkMakeWriter};
use crate::config;

/// Timestamp format used on every record
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Settings for a [`Logger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerOptions {
    /// Directory for daily log files
    pub directory: PathBuf,
    /// Minimum level written to either target
    pub level: Level,
    /// JSON records in the file instead of plain text
    pub structured: bool,
    /// Mirror records to stdout
    pub console: bool,
    /// Compress log files once they are rotated out
    pub compress: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            directory: config::logs_dir(),
            level: Level::Info,
            structured: false,
            console: true,
            compress: true,
        }
    }
}

impl LoggerOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory for daily log files
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the level by name; unknown names mean `info`
    pub fn level(mut self, name: &str) -> Self {
        self.level = Level::parse_or_default(name);
        self
    }

    /// Write JSON records to the file instead of plain text
    pub fn structured(mut self, enable: bool) -> Self {
        self.structured = enable;
        self
    }

    /// Mirror records to stdout
    pub fn console(mut self, enable: bool) -> Self {
        self.console = enable;
        self
    }

    /// Compress each day's file once it is rotated out
    pub fn compress(mut self, enable: bool) -> Self {
        self.compress = enable;
        self
    }
}

/// Local wall-clock timestamps in [`TIME_FORMAT`]
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(TIME_FORMAT))
    }
}

/// Leveled logger writing to a rotating file and, optionally, the console
#[derive(Debug, Clone)]
pub struct Logger {
    options: LoggerOptions,
    sink: Arc<RotatingSink>,
    dispatch: Dispatch,
    fields: BTreeMap<String, Value>,
}

impl Logger {
    /// Build a logger and its rotating sink
    ///
    /// No file is created until the first record is written.
    pub fn init(options: LoggerOptions) -> Self {
        let sink = Arc::new(RotatingSink::new(&options.directory, options.compress));
        Self::with_sink(options, sink)
    }

    /// Build a logger over an existing sink
    ///
    /// The sink's own directory and compression policy replace those in `options`.
    pub fn with_sink(mut options: LoggerOptions, sink: Arc<RotatingSink>) -> Self {
        options.directory = sink.directory().to_path_buf();
        options.compress = sink.compress_on_rotate();
        let dispatch = build_dispatch(&options, Arc::clone(&sink));
        Self {
            options,
            sink,
            dispatch,
            fields: BTreeMap::new(),
        }
    }

    /// Options in effect for this logger
    pub fn options(&self) -> &LoggerOptions {
        &self.options
    }

    /// The shared file sink
    pub fn sink(&self) -> &Arc<RotatingSink> {
        &self.sink
    }

    /// Directory the log files are written to
    pub fn directory(&self) -> &Path {
        self.sink.directory()
    }

    /// Make this logger the process-wide default for `tracing` macros
    pub fn install(&self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .context("A global logger is already installed")
    }

    /// Run `f` with this logger as the default for `tracing` macros on this thread
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Return a logger that attaches `fields` to every record
    ///
    /// The new logger shares this one's sink and outputs; later fields override
    /// earlier ones with the same key.
    pub fn with_fields<I, K, V>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut logger = self.clone();
        logger
            .fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        logger
    }

    /// Write one record at `level`, tagged with the caller's `file:line`
    #[track_caller]
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let location = Location::caller();
        let caller = format!("{}:{}", location.file(), location.line());
        let context = self.render_fields();
        tracing::dispatcher::with_default(&self.dispatch, || {
            emit(level, &caller, context.as_deref(), &message)
        });
    }

    #[track_caller]
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::Trace, message);
    }

    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    /// Log at error level, flush the log file, then panic with `message`
    #[track_caller]
    pub fn panic(&self, message: impl fmt::Display) -> ! {
        self.log(Level::Error, &message);
        let _ = self.sink.flush();
        panic!("{}", message);
    }

    /// Log at error level, close the logger, then exit the process with status 1
    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        self.log(Level::Error, &message);
        let _ = self.close();
        std::process::exit(1);
    }

    /// Flush the console, close the log file and wait for pending compressions
    ///
    /// Safe to call more than once; logging after `close` reopens today's file.
    pub fn close(&self) -> Result<()> {
        if self.options.console {
            std::io::stdout()
                .flush()
                .context("Failed to flush console output")?;
        }

        self.sink.close().context("Failed to close log file")?;
        self.sink.drain();
        Ok(())
    }

    /// Fields as `key=value` pairs, strings unquoted
    fn render_fields(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut rendered = String::new();
        for (key, value) in &self.fields {
            if !rendered.is_empty() {
                rendered.push(' ');
            }
            let _ = match value {
                Value::String(s) => write!(rendered, "{}={}", key, s),
                other => write!(rendered, "{}={}", key, other),
            };
        }
        Some(rendered)
    }
}

/// Assemble the file layer, the optional console layer and their level filters
fn build_dispatch(options: &LoggerOptions, sink: Arc<RotatingSink>) -> Dispatch {
    let filter = LevelFilter::from(options.level);
    let writer = SinkMakeWriter::new(sink);

    let file_layer: Box<dyn Layer<Registry> + Send + Sync> = if options.structured {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_timer(LocalTimer)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_timer(LocalTimer)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    };

    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(LocalTimer)
            .with_writer(std::io::stdout)
            .with_filter(filter)
    });

    Dispatch::new(
        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer),
    )
}

/// Emit one event at a runtime-chosen level
fn emit(level: Level, caller: &str, context: Option<&str>, message: &dyn fmt::Display) {
    macro_rules! event_at {
        ($lvl:expr) => {
            match context {
                Some(context) => {
                    tracing::event!($lvl, caller = %caller, context = %context, "{}", message)
                }
                None => tracing::event!($lvl, caller = %caller, "{}", message),
            }
        };
    }

    match level {
        Level::Trace => event_at!(tracing::Level::TRACE),
        Level::Debug => event_at!(tracing::Level::DEBUG),
        Level::Info => event_at!(tracing::Level::INFO),
        Level::Warn => event_at!(tracing::Level::WARN),
        Level::Error => event_at!(tracing::Level::ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::clock::ManualClock;
    use chrono::{Days, NaiveDateTime};
    use serde_json::json;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn file_options(dir: &Path) -> LoggerOptions {
        LoggerOptions::new()
            .directory(dir)
            .console(false)
            .compress(false)
    }

    fn today_log(logger: &Logger) -> String {
        let path = logger.sink().path_for(Local::now().date_naive());
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_options_defaults() {
        let options = LoggerOptions::default();
        assert_eq!(options.level, Level::Info);
        assert!(!options.structured);
        assert!(options.console);
        assert!(options.compress);
        assert!(options.directory.ends_with("logs"));
    }

    #[test]
    fn test_options_setters() {
        let options = LoggerOptions::new()
            .directory("/tmp/logs")
            .level("debug")
            .structured(true)
            .console(false)
            .compress(false);

        assert_eq!(options.directory, PathBuf::from("/tmp/logs"));
        assert_eq!(options.level, Level::Debug);
        assert!(options.structured);
        assert!(!options.console);
        assert!(!options.compress);
    }

    #[test]
    fn test_options_invalid_level_falls_back_to_info() {
        let options = LoggerOptions::new().level("invalid_level");
        assert_eq!(options.level, Level::Info);
    }

    #[test]
    fn test_text_record_written_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));

        logger.info("Test log message");
        logger.close().unwrap();

        let content = today_log(&logger);
        assert!(content.contains("Test log message"));
        assert!(content.contains("INFO"));
        assert!(content.ends_with('\n'));

        // Leading timestamp in local time
        let stamp = &content[..19];
        assert!(NaiveDateTime::parse_from_str(stamp, TIME_FORMAT).is_ok());
    }

    #[test]
    fn test_leveled_methods() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()).level("debug"));

        logger.debug("debug message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");
        logger.close().unwrap();

        let content = today_log(&logger);
        for expected in ["debug message", "info message", "warn message", "error message"] {
            assert!(content.contains(expected), "missing {}", expected);
        }
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_level_filter_drops_lower_records() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()).level("warn"));

        logger.debug("hidden debug");
        logger.info("hidden info");
        logger.warn("visible warn");
        logger.close().unwrap();

        let content = today_log(&logger);
        assert!(!content.contains("hidden"));
        assert!(content.contains("visible warn"));
    }

    #[test]
    fn test_structured_logging() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()).structured(true));

        logger.info("Test log message");
        logger.close().unwrap();

        let content = today_log(&logger);
        let entry: Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry["message"], "Test log message");
        assert_eq!(entry["level"], "INFO");
        assert!(entry["timestamp"].is_string());
    }

    #[test]
    fn test_with_fields_text() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));
        let child = logger.with_fields([("key1", json!("value1")), ("key2", json!(42))]);

        child.info("with context");
        logger.info("without context");
        logger.close().unwrap();

        let content = today_log(&logger);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("with context"));
        assert!(lines[0].contains("key1=value1 key2=42"));
        assert!(!lines[1].contains("key1"));
    }

    #[test]
    fn test_with_fields_structured() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()).structured(true));

        logger
            .with_fields([("request", "abc")])
            .with_fields([("request", "def")])
            .error("failed");
        logger.close().unwrap();

        let entry: Value = serde_json::from_str(today_log(&logger).trim()).unwrap();
        assert_eq!(entry["context"], "request=def");
        assert_eq!(entry["level"], "ERROR");
    }

    #[test]
    fn test_scoped_routes_tracing_macros() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));

        logger.scoped(|| tracing::warn!(attempt = 3, "scoped record"));
        logger.close().unwrap();

        let content = today_log(&logger);
        assert!(content.contains("scoped record"));
        assert!(content.contains("attempt=3"));
    }

    #[test]
    fn test_record_names_caller_location() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));

        let line = line!() + 1;
        logger.info("from caller");
        logger.with_fields([("k", 1)]).warn("from child");
        logger.close().unwrap();

        let content = today_log(&logger);
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].contains(&format!("caller=src/logging/logger.rs:{}", line)));
        assert!(lines[1].contains(&format!("caller=src/logging/logger.rs:{}", line + 1)));
    }

    #[test]
    fn test_structured_record_names_caller() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()).structured(true));

        let line = line!() + 1;
        logger.error("structured caller");
        logger.close().unwrap();

        let entry: Value = serde_json::from_str(today_log(&logger).trim()).unwrap();
        assert_eq!(
            entry["caller"],
            format!("src/logging/logger.rs:{}", line).as_str()
        );
    }

    #[test]
    #[should_panic(expected = "unrecoverable state")]
    fn test_panic_panics_with_message() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));
        logger.panic("unrecoverable state");
    }

    #[test]
    fn test_panic_writes_record_first() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            logger.panic("giving up");
        }));
        assert!(result.is_err());

        let content = today_log(&logger);
        assert!(content.contains("ERROR"));
        assert!(content.contains("giving up"));
    }

    #[test]
    fn test_with_sink_reports_sink_settings() {
        let temp_dir = TempDir::new().unwrap();
        let sink_dir = temp_dir.path().join("sink");
        let sink = Arc::new(RotatingSink::new(&sink_dir, false));
        let options = LoggerOptions::new()
            .directory(temp_dir.path().join("ignored"))
            .compress(true)
            .console(false);

        let logger = Logger::with_sink(options, sink);

        assert_eq!(logger.options().directory, sink_dir);
        assert!(!logger.options().compress);
        assert_eq!(logger.directory(), sink_dir.as_path());
    }

    #[test]
    fn test_concurrent_logging() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));
        let writers = 10;

        thread::scope(|s| {
            for i in 0..writers {
                let logger = &logger;
                s.spawn(move || logger.info(format!("Log message from thread {}", i)));
            }
        });
        logger.close().unwrap();

        let content = today_log(&logger);
        assert_eq!(content.lines().count(), writers);
        for i in 0..writers {
            assert!(content.contains(&format!("Log message from thread {}", i)));
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let logger = Logger::init(file_options(temp_dir.path()));

        assert!(logger.close().is_ok());
        logger.info("after first close");
        assert!(logger.close().is_ok());
        assert!(logger.close().is_ok());

        assert!(today_log(&logger).contains("after first close"));
    }

    #[test]
    fn test_no_file_until_first_record() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");
        let logger = Logger::init(file_options(&dir));

        logger.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_rotation_through_logger_compresses() {
        let temp_dir = TempDir::new().unwrap();
        let today = Local::now().date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
        let clock = Arc::new(ManualClock::new(yesterday));
        let sink = Arc::new(RotatingSink::with_clock(temp_dir.path(), true, clock.clone()));
        let logger = Logger::with_sink(file_options(temp_dir.path()), sink);

        logger.info("yesterday's record");
        clock.set(today);
        logger.info("today's record");
        logger.close().unwrap();

        let retired = logger.sink().path_for(yesterday);
        assert!(!retired.exists());
        assert!(temp_dir
            .path()
            .join(format!("{}.log.gz", yesterday.format("%Y_%m_%d")))
            .exists());
        assert!(today_log(&logger).contains("today's record"));
    }
}
