//! Log sink selection.

use crate::config::Config;
use crate::error::{DynipError, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::EnvFilter;

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Created (or truncated) at startup.
    File(PathBuf),
    /// Local system logger, facility daemon.
    Syslog,
}

impl LogTarget {
    pub fn from_config(config: &Config) -> Self {
        if config.syslog {
            LogTarget::Syslog
        } else if let Some(path) = &config.log_file {
            LogTarget::File(path.clone())
        } else {
            LogTarget::Stdout
        }
    }
}

/// Default filter directive for the configured verbosity.
pub fn default_level(config: &Config) -> &'static str {
    if config.debug {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match LogTarget::from_config(config) {
        LogTarget::Stdout => builder.with_writer(BoxMakeWriter::new(std::io::stdout)).try_init(),
        LogTarget::File(path) => {
            let file = File::create(&path).map_err(|e| {
                DynipError::Logging(format!("cannot open log file {}: {}", path.display(), e))
            })?;
            builder
                .with_ansi(false)
                .with_writer(BoxMakeWriter::new(Mutex::new(file)))
                .try_init()
        }
        LogTarget::Syslog => builder
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_level(false)
            .with_writer(SyslogWriter::connect()?)
            .try_init(),
    };

    installed.map_err(|e| DynipError::Logging(e.to_string()))
}

/// Receives one formatted event at a time.
trait LineSink: Send {
    fn send(&mut self, level: Level, line: &str) -> io::Result<()>;
}

#[cfg(unix)]
impl LineSink for syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164> {
    fn send(&mut self, level: Level, line: &str) -> io::Result<()> {
        let sent = match level {
            Level::ERROR => self.err(line),
            Level::WARN => self.warning(line),
            Level::INFO => self.info(line),
            _ => self.debug(line),
        };
        sent.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// `MakeWriter` that hands each event to the system logger with a
/// severity taken from the event level.
#[derive(Clone)]
struct SyslogWriter {
    sink: Arc<Mutex<Box<dyn LineSink>>>,
}

impl SyslogWriter {
    fn new(sink: Box<dyn LineSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    fn line(&self, level: Level) -> SyslogLine {
        SyslogLine {
            sink: Arc::clone(&self.sink),
            level,
            buf: Vec::new(),
        }
    }

    #[cfg(unix)]
    fn connect() -> Result<Self> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process: "dynip".into(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| DynipError::Logging(format!("cannot connect to syslog: {}", e)))?;
        Ok(Self::new(Box::new(logger)))
    }

    #[cfg(not(unix))]
    fn connect() -> Result<Self> {
        Err(DynipError::Logging(
            "syslog is not supported on this platform".to_string(),
        ))
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(*meta.level())
    }
}

/// Buffers one event; the line is sent when the writer is dropped.
struct SyslogLine {
    sink: Arc<Mutex<Box<dyn LineSink>>>,
    level: Level,
    buf: Vec<u8>,
}

impl io::Write for SyslogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        if line.is_empty() {
            return;
        }
        if let Ok(mut sink) = self.sink.lock() {
            // nowhere left to report a failed send
            let _ = sink.send(self.level, line);
        }
    }
}
