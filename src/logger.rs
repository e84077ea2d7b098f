//! Session logger: a `log` backend writing to one file in the OS data
//! directory.
//!
//! The file is truncated at each launch, so it only holds the most recent
//! session. Panics are mirrored into it through a panic hook.
//!
//! Log location:
//!   Windows:  `%APPDATA%\CutoutFE\cutoutfe.log`
//!   Linux:    `~/.local/share/CutoutFE/cutoutfe.log`
//!   macOS:    `~/Library/Application Support/CutoutFE/cutoutfe.log`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    /// Also echo to stderr (CLI `--verbose`).
    echo: bool,
    level: LevelFilter,
}

impl SessionLogger {
    fn write_line(&self, line: &str) {
        if let Some(file) = &self.file {
            let _ = writeln!(file.lock(), "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] {}", timestamp(), record.level(), record.args());
        self.write_line(&line);
        if self.echo || record.level() == Level::Error {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Returns the path to the current session log file, if one was opened.
pub fn log_path() -> Option<&'static PathBuf> {
    LOGGER.get().and_then(|l| l.path.as_ref())
}

/// Install the session logger. Safe to call more than once; only the first
/// call takes effect. Failing to open the file is not fatal: records still
/// reach stderr when `verbose` is set.
pub fn init(verbose: bool) {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let opened = file.is_some();

    let logger = LOGGER.get_or_init(|| SessionLogger {
        file,
        path: opened.then_some(path),
        echo: verbose,
        level,
    });
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!("=== CutoutFE session started (unix {}) ===", unix_secs()));
    if let Some(p) = &logger.path {
        logger.write_line(&format!("Log file: {}", p.display()));
    }
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(l) = LOGGER.get() {
            l.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        }
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("CutoutFE").join("cutoutfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    let secs = unix_secs();
    format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
}
