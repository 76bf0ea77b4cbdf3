//! Mode table and the monitoring choke point.
//!
//! Every failure the manager reports goes through [`Monitor::monitor`], which
//! emits a `tracing` event and then, depending on the log-monitoring mode, keeps
//! the entry in memory, drops it, or appends it to a JSON-lines file.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Where monitored messages end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogMonitoring {
    /// Keep entries in the in-memory journal
    Log,
    /// Drop entries (tracing still sees them)
    Silent,
    /// Append entries as JSON lines to the log file
    File,
}

/// What to do when binding a placeholder the statement does not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NameErrorBinding {
    /// Log and report failure
    Stop,
    /// Report failure without logging
    Continue,
    /// Return an error to the caller
    Throw,
}

/// One switch of the mode table, with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    LogMonitoring(LogMonitoring),
    NameErrorBinding(NameErrorBinding),
    LogFile(PathBuf),
    EscapeCacheDir(PathBuf),
}

impl Mode {
    pub fn key(&self) -> ModeKey {
        match self {
            Mode::LogMonitoring(_) => ModeKey::LogMonitoring,
            Mode::NameErrorBinding(_) => ModeKey::NameErrorBinding,
            Mode::LogFile(_) => ModeKey::LogFile,
            Mode::EscapeCacheDir(_) => ModeKey::EscapeCacheDir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKey {
    LogMonitoring,
    NameErrorBinding,
    LogFile,
    EscapeCacheDir,
}

#[derive(Debug, Default)]
struct ModeTable {
    log_monitoring: Option<LogMonitoring>,
    name_error_binding: Option<NameErrorBinding>,
    log_file: Option<PathBuf>,
    escape_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryLevel {
    Info,
    Warn,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub time: DateTime<Utc>,
    pub level: EntryLevel,
}

/// JSON-lines record written in file mode.
#[derive(Serialize)]
struct FileRecord<'a> {
    message: &'a str,
    time: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct Monitor {
    modes: Arc<RwLock<ModeTable>>,
    journal: Arc<Mutex<Vec<LogEntry>>>,
}

impl Monitor {
    /// A monitor with every switch unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// A monitor with the start-up defaults: in-memory logging, STOP on bad binds.
    pub fn with_defaults() -> Self {
        let monitor = Self::new();
        monitor.set_mode(Mode::LogMonitoring(LogMonitoring::Log));
        monitor.set_mode(Mode::NameErrorBinding(NameErrorBinding::Stop));
        monitor
    }

    pub fn set_mode(&self, mode: Mode) {
        debug!(mode = ?mode, "Mode set");
        let mut table = self.modes.write().unwrap_or_else(|e| e.into_inner());
        match mode {
            Mode::LogMonitoring(v) => table.log_monitoring = Some(v),
            Mode::NameErrorBinding(v) => table.name_error_binding = Some(v),
            Mode::LogFile(v) => table.log_file = Some(v),
            Mode::EscapeCacheDir(v) => table.escape_cache_dir = Some(v),
        }
    }

    pub fn clear_mode(&self, key: ModeKey) {
        let mut table = self.modes.write().unwrap_or_else(|e| e.into_inner());
        match key {
            ModeKey::LogMonitoring => table.log_monitoring = None,
            ModeKey::NameErrorBinding => table.name_error_binding = None,
            ModeKey::LogFile => table.log_file = None,
            ModeKey::EscapeCacheDir => table.escape_cache_dir = None,
        }
    }

    pub fn mode(&self, key: ModeKey) -> Option<Mode> {
        let table = self.modes.read().unwrap_or_else(|e| e.into_inner());
        match key {
            ModeKey::LogMonitoring => table.log_monitoring.map(Mode::LogMonitoring),
            ModeKey::NameErrorBinding => table.name_error_binding.map(Mode::NameErrorBinding),
            ModeKey::LogFile => table.log_file.clone().map(Mode::LogFile),
            ModeKey::EscapeCacheDir => table.escape_cache_dir.clone().map(Mode::EscapeCacheDir),
        }
    }

    pub fn log_monitoring(&self) -> Option<LogMonitoring> {
        self.modes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .log_monitoring
    }

    pub fn name_error_binding(&self) -> Option<NameErrorBinding> {
        self.modes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .name_error_binding
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.modes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .log_file
            .clone()
    }

    /// Report a failure or notable event.
    pub fn monitor(&self, message: impl Into<String>) {
        self.record(EntryLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(EntryLevel::Warn, message.into());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.record(EntryLevel::Debug, message.into());
    }

    fn record(&self, level: EntryLevel, message: String) {
        match level {
            EntryLevel::Info => info!(monitor = true, "{}", message),
            EntryLevel::Warn => warn!(monitor = true, "{}", message),
            EntryLevel::Debug => debug!(monitor = true, "{}", message),
        }

        match self.log_monitoring() {
            Some(LogMonitoring::Silent) => {}
            Some(LogMonitoring::File) => match self.log_file() {
                Some(path) => {
                    if let Err(e) = append_line(&path, &message) {
                        self.push(
                            EntryLevel::Debug,
                            format!("Failed to write log file {}: {}", path.display(), e),
                        );
                        self.push(level, message);
                    }
                }
                None => {
                    self.push(
                        EntryLevel::Debug,
                        "File monitoring selected but no log file path is set".to_string(),
                    );
                    self.push(level, message);
                }
            },
            Some(LogMonitoring::Log) | None => self.push(level, message),
        }
    }

    fn push(&self, level: EntryLevel, message: String) {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LogEntry {
                message,
                time: Utc::now(),
                level,
            });
    }

    /// Snapshot of the in-memory journal.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The journal as pretty-printed JSON.
    pub fn print_logs(&self) -> String {
        serde_json::to_string_pretty(&self.logs()).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn clear_logs(&self) {
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn append_line(path: &Path, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let record = FileRecord {
        message,
        time: Utc::now(),
    };
    let line = serde_json::to_string(&record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}
