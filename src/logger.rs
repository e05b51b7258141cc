//! Debug logging to an opt-in log file.
//!
//! `log` records from this crate and `tracing` spans around a run both end up
//! in the same file. Nothing is written anywhere until `--log` enables it, so
//! stdout stays reserved for generated code.

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::LazyLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Transport crates that flood the log with connection chatter
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls", "want", "mio", "git2"];

#[derive(Default)]
struct LogSettings {
    enabled: bool,
    /// Keep transport-level records too
    verbose: bool,
    /// Mirror every line to stderr
    echo_to_stderr: bool,
    file: Option<File>,
}

impl LogSettings {
    fn accepts(&self, metadata: &Metadata) -> bool {
        if !self.enabled || metadata.level() > Level::Debug {
            return false;
        }
        let target = metadata.target();
        self.verbose
            || target.starts_with("specforge")
            || !NOISY_TARGETS.iter().any(|noisy| target.starts_with(noisy))
    }

    fn write_line(&mut self, line: &[u8]) {
        if let Some(file) = self.file.as_mut() {
            // a failing log file must never fail the run
            let _ = file.write_all(line).and_then(|()| file.flush());
        }
        if self.echo_to_stderr {
            let _ = io::stderr().write_all(line);
        }
    }
}

static SETTINGS: LazyLock<Mutex<LogSettings>> = LazyLock::new(|| Mutex::new(LogSettings::default()));

struct SpecforgeLogger;

static LOGGER: SpecforgeLogger = SpecforgeLogger;

impl log::Log for SpecforgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        SETTINGS.lock().accepts(metadata)
    }

    fn log(&self, record: &Record) {
        let mut settings = SETTINGS.lock();
        if !settings.accepts(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {:<5} [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        settings.write_line(line.as_bytes());
    }

    fn flush(&self) {}
}

/// `tracing` output goes through the same settings as `log` records
#[derive(Clone, Copy)]
struct SettingsWriter;

impl Write for SettingsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut settings = SETTINGS.lock();
        if settings.enabled {
            settings.write_line(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> fmt::MakeWriter<'a> for SettingsWriter {
    type Writer = SettingsWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Install the `log` logger and the `tracing` subscriber. Safe to call more than once.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::OnceLock;
    static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT_RESULT.get_or_init(|| {
        if verbose_requested(
            std::env::var("SPECFORGE_VERBOSE").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
        ) {
            set_verbose_logging(true);
        }

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "specforge=debug,warn".into());
        let fmt_layer = fmt::Layer::new()
            .with_target(true)
            .with_ansi(false)
            .with_timer(fmt::time::ChronoLocal::rfc_3339())
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(SettingsWriter);

        let tracing_result = Registry::default().with(env_filter).with(fmt_layer).try_init();
        let log_result =
            log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug));

        match (tracing_result, log_result) {
            (Err(tracing_err), Err(log_err)) => Err(format!(
                "Failed to initialize logging: tracing={tracing_err}, log={log_err}"
            )),
            _ => Ok(()),
        }
    });

    result.clone().map_err(Into::into)
}

/// `SPECFORGE_VERBOSE` set to anything, or a `RUST_LOG` asking for debug or trace globally
fn verbose_requested(specforge_verbose: Option<&str>, rust_log: Option<&str>) -> bool {
    specforge_verbose.is_some()
        || rust_log.is_some_and(|directives| {
            directives.split(',').map(str::trim).any(|directive| {
                directive.eq_ignore_ascii_case("debug") || directive.eq_ignore_ascii_case("trace")
            })
        })
}

pub fn enable_logging() {
    SETTINGS.lock().enabled = true;
}

pub fn disable_logging() {
    SETTINGS.lock().enabled = false;
}

pub fn set_verbose_logging(enabled: bool) {
    SETTINGS.lock().verbose = enabled;
}

pub fn set_echo_to_stderr(enabled: bool) {
    SETTINGS.lock().echo_to_stderr = enabled;
}

/// Append log lines to `file_path`, creating it if needed
pub fn set_log_file(file_path: &str) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;
    SETTINGS.lock().file = Some(file);
    Ok(())
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}
