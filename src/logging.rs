// src/logging.rs
//
// `tlog!`: every line goes to stderr with a wall-clock prefix, and is mirrored
// into a per-run file when `log_dir` is configured.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local};

/// Name of the link that always points at the newest run's log
const LATEST_LINK: &str = "serialsim.log";

/// Mirror target for `tlog!`; `None` until `init_file_logging` succeeds
pub(crate) static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

pub(crate) fn clock() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// `20240131-154502-CTD.log`: one file per run, sorted by start time
fn log_file_name(sensor: &str, started: DateTime<Local>) -> String {
    format!("{}-{}.log", started.format("%Y%m%d-%H%M%S"), sensor)
}

/// Write one already-formatted line. Does not lock anything but `LOG_FILE`.
pub(crate) fn emit(line: &str) {
    eprintln!("{}", line);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Open `<log_dir>/<timestamp>-<sensor>.log` and start mirroring into it.
pub(crate) fn init_file_logging(log_dir: &Path, sensor: &str) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Cannot create log dir {}: {}", log_dir.display(), e))?;

    let name = log_file_name(sensor, Local::now());
    let path = log_dir.join(&name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Cannot open log file {}: {}", path.display(), e))?;

    link_latest(log_dir, &name);

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    emit(&format!("{} [logging] Mirroring log to {}", clock(), path.display()));
    Ok(())
}

// Relative link, so the log dir can be moved as a whole
#[cfg(unix)]
fn link_latest(log_dir: &Path, name: &str) {
    let link = log_dir.join(LATEST_LINK);
    let _ = std::fs::remove_file(&link);
    if let Err(e) = std::os::unix::fs::symlink(name, &link) {
        emit(&format!("{} [logging] Cannot update {}: {}", clock(), LATEST_LINK, e));
    }
}

// Symlinks need elevated rights on Windows
#[cfg(not(unix))]
fn link_latest(_log_dir: &Path, _name: &str) {}

/// `tlog!("[tag] ...", args)`: format, prefix with `HH:MM:SS.mmm`, emit.
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(&format!(
            "{} {}",
            $crate::logging::clock(),
            format_args!($($arg)*)
        ))
    };
}
