//! Process logger: `env_logger` writing every line to stderr and to a log
//! file.
//!
//! The configured log file is preferred. When its directory cannot be created
//! or the file cannot be opened, logs go to `<temp dir>/helpdesk/app.log`
//! instead, and to stderr alone if that fails too.

use chrono::Utc;
use env_logger::{Builder, Env, Target};
use log::{info, warn};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Where log lines are being written.
#[derive(Debug)]
pub struct LogSink {
    /// `None` when only stderr could be used.
    pub path: Option<PathBuf>,
    pub fell_back: bool,
    file: Option<File>,
}

/// Copies each write to stderr and, when present, to the log file.
struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

pub fn fallback_log_path() -> PathBuf {
    env::temp_dir().join("helpdesk").join("app.log")
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Opens `preferred`, or the temp-dir fallback if `preferred` is not writable.
pub fn open_sink(preferred: &Path) -> LogSink {
    if let Ok(file) = open_log_file(preferred) {
        return LogSink {
            path: Some(preferred.to_path_buf()),
            fell_back: false,
            file: Some(file),
        };
    }

    let fallback = fallback_log_path();
    match open_log_file(&fallback) {
        Ok(file) => LogSink {
            path: Some(fallback),
            fell_back: true,
            file: Some(file),
        },
        Err(_) => LogSink {
            path: None,
            fell_back: true,
            file: None,
        },
    }
}

/// Installs the global logger. `RUST_LOG` controls the filter; the default is
/// `info`.
pub fn init(config: &Config) -> Option<PathBuf> {
    let sink = open_sink(&config.log_file);
    let path = sink.path.clone();

    let result = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file: sink.file })))
        .try_init();

    if result.is_err() {
        // Someone else owns the global logger already.
        return path;
    }

    match (&path, sink.fell_back) {
        (Some(path), false) => info!("Logging to {}", path.display()),
        (Some(path), true) => warn!(
            "Log file {} is not writable, logging to {} instead",
            config.log_file.display(),
            path.display()
        ),
        (None, _) => warn!(
            "Log file {} is not writable and no fallback was available, logging to stderr only",
            config.log_file.display()
        ),
    }
    path
}
