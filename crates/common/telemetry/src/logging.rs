// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Global `tracing` setup for telespool processes.
//!
//! Console output goes to stderr by default so that commands which print
//! records on stdout keep a clean stream.

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, layer::SubscriberExt, registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// Lets a config file write `log_format = ""` to mean "whatever the default
/// is".
///
/// # Errors
/// Returns an error if the non-empty string does not name a variant of `T`.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// Prefix of the rolling log files; the error-only files add `-err`.
const LOG_FILE_PREFIX: &str = "telespool";

/// Fallback filter when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Handle for changing the level filter after initialization.
///
/// Only set once `init_global_logging` has run.
pub static RELOAD_HANDLE: OnceCell<tracing_subscriber::reload::Handle<filter::Targets, Registry>> =
    OnceCell::new();

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default, into)]
    pub dir: String,

    /// Filter string such as `"info"` or `"info,telespool_queue=debug"`.
    ///
    /// Falls back to `RUST_LOG`, then to `info`.
    #[builder(into)]
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Rotated files kept per log stream. 720 is thirty days of hourly files.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to also log to the console.
    #[default = true]
    #[builder(default = true)]
    pub append_console: bool,

    /// Console stream used when `append_console` is set.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub console: ConsoleStream,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    ///
    /// ```json
    /// {"timestamp":"2025-01-01T12:00:00Z","level":"INFO","target":"telespool_queue::queue","fields":{"message":"Staging queue opened"}}
    /// ```
    Json,

    /// Human-readable lines, coloured when the console is a terminal.
    #[default]
    Text,
}

/// Console stream for the console layer.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleStream {
    Stdout,
    #[default]
    Stderr,
}

/// Stderr text logging with default options.
///
/// Keep the returned guards alive for as long as logs should be written.
#[must_use]
pub fn init_tracing_subscriber(app_name: &str) -> Vec<WorkerGuard> {
    init_global_logging(app_name, &LoggingOptions::default())
}

/// Initialize logging for unit tests.
///
/// Writes to files under `UNITTEST_LOG_DIR` (default `/tmp/__unittest_logs`)
/// at `UNITTEST_LOG_LEVEL` (default `debug`). Safe to call from every test;
/// only the first call does anything.
///
/// # Panics
/// Panics if the guard mutex is poisoned.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD.as_ref().lock().unwrap();

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            append_console: false,
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Install the global subscriber.
///
/// Layers, each optional:
///
/// - console (`append_console`), on stdout or stderr
/// - `<dir>/telespool.<hour>` with every event that passes the filter
/// - `<dir>/telespool-err.<hour>` with errors only
///
/// All writers are non-blocking. The level filter sits behind
/// [`RELOAD_HANDLE`]. Only the first call in a process has any effect; later
/// calls return no guards.
///
/// # Panics
/// Panics if the log directory cannot be used, the level string does not
/// parse, or another global subscriber is already installed.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let console_layer = if opts.append_console {
            let (writer, guard, ansi) = match opts.console {
                ConsoleStream::Stdout => {
                    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                    (writer, guard, std::io::stdout().is_terminal())
                }
                ConsoleStream::Stderr => {
                    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
                    (writer, guard, std::io::stderr().is_terminal())
                }
            };
            guards.push(guard);
            Some(fmt_layer(writer, opts.log_format, ansi))
        } else {
            None
        };

        let file_layer = if opts.dir.is_empty() {
            None
        } else {
            let (writer, guard) = rolling_writer(opts, LOG_FILE_PREFIX);
            guards.push(guard);
            Some(fmt_layer(writer, opts.log_format, false))
        };

        let err_file_layer = if opts.dir.is_empty() {
            None
        } else {
            let (writer, guard) = rolling_writer(opts, &format!("{LOG_FILE_PREFIX}-err"));
            guards.push(guard);
            Some(
                fmt_layer(writer, opts.log_format, false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            )
        };

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let (dyn_filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);

        RELOAD_HANDLE
            .set(reload_handle)
            .expect("reload handle already set, maybe init_global_logging get called twice?");

        let subscriber = Registry::default()
            .with(dyn_filter)
            .with(console_layer)
            .with(file_layer)
            .with(err_file_layer);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");

        tracing::debug!(app = app_name, format = %opts.log_format, "Logging initialized");
    });

    guards
}

/// Replace the active level filter.
///
/// Returns `false` when logging is not initialized or the filter string does
/// not parse.
pub fn reload_level(level: &str) -> bool {
    let Some(handle) = RELOAD_HANDLE.get() else {
        return false;
    };
    let Ok(targets) = level.parse::<filter::Targets>() else {
        return false;
    };
    handle.reload(targets).is_ok()
}

fn rolling_writer(opts: &LoggingOptions, prefix: &str) -> (NonBlocking, WorkerGuard) {
    let rolling_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        });
    tracing_appender::non_blocking(rolling_appender)
}

fn fmt_layer<S>(writer: NonBlocking, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert_eq!(opts.level, None);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.max_log_files, 720);
        assert!(opts.append_console);
        assert_eq!(opts.console, ConsoleStream::Stderr);
        assert_eq!(LoggingOptions::builder().build(), opts);
    }

    #[test]
    fn test_deserialize_partial_options() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"level":"debug","log_format":"json","console":"stdout"}"#)
                .unwrap();
        assert_eq!(opts.level.as_deref(), Some("debug"));
        assert_eq!(opts.log_format, LogFormat::Json);
        assert_eq!(opts.console, ConsoleStream::Stdout);
        assert_eq!(opts.max_log_files, 720);
    }

    #[test]
    fn test_empty_format_uses_default() {
        let opts: LoggingOptions = serde_json::from_str(r#"{"log_format":""}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Text);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(serde_json::from_str::<LoggingOptions>(r#"{"log_format":"xml"}"#).is_err());
    }

    #[test]
    fn test_reload_rejects_bad_filter() {
        init_default_ut_logging();
        assert!(!reload_level("info,telespool=loud"));
        assert!(reload_level("debug"));
    }
}
