use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use colored::*;
use glob::glob;
use log::LevelFilter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global logger is already installed: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Maps a textual level to a filter. Unknown names fall back to `Info`.
pub fn level_filter(log_level: &str) -> LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Installs the global logger.
///
/// Console lines get a colored level tag. When `log_dir` is given, a plain
/// `<app_name>_<timestamp>.log` file is written there as well and older log
/// files of the same app are removed, keeping only the newest one.
///
/// # Errors
/// Fails if the log directory or file cannot be created, or if a logger was
/// already installed for this process.
pub fn setup_logging(app_name: &str, log_dir: Option<&Path>, log_level: &str) -> Result<Option<PathBuf>, LoggerError> {
    let level = level_filter(log_level);

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            let level = match record.level() {
                log::Level::Error => "ERROR".bright_red(),
                log::Level::Warn => "WARN ".bright_yellow(),
                log::Level::Info => "INFO ".bright_green(),
                log::Level::Debug => "DEBUG".bright_white(),
                log::Level::Trace => "TRACE".bright_cyan(),
            };
            out.finish(format_args!(
                "{} {} {}",
                Local::now().format("[%Y-%m-%d %H:%M:%S]").to_string().truecolor(128, 128, 128),
                level,
                message
            ))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        // Keep dependency chatter out of the run log.
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .chain(console);

    let mut log_path = None;
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir).map_err(|source| LoggerError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = dir.join(format!("{}_{}.log", app_name, timestamp));
        let file = fern::log_file(&path).map_err(|source| LoggerError::OpenFile {
            path: path.clone(),
            source,
        })?;

        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{}[{}][{}] {}",
                        Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                        record.target(),
                        record.level(),
                        message
                    ))
                })
                .chain(file),
        );

        rotate_logs(app_name, dir, &path);
        log_path = Some(path);
    }

    dispatch.apply()?;
    Ok(log_path)
}

/// Deletes every `<app_name>_*.log` in `log_dir` except `keep`.
fn rotate_logs(app_name: &str, log_dir: &Path, keep: &Path) {
    let pattern = format!("{}/{}_*.log", log_dir.display(), app_name);
    let entries = match glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Invalid log rotation pattern {}: {}", pattern, e);
            return;
        }
    };

    for old_file in entries.flatten().filter(|p| p != keep) {
        if let Err(e) = fs::remove_file(&old_file) {
            eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::Debug);
        assert_eq!(level_filter("warn"), LevelFilter::Warn);
        assert_eq!(level_filter("whatever"), LevelFilter::Info);
    }

    #[test]
    fn rotation_keeps_only_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("linz_traffic_20240101_000000.log");
        let other_app = dir.path().join("other_20240101_000000.log");
        let current = dir.path().join("linz_traffic_20240301_120000.log");
        for p in [&old, &other_app, &current] {
            fs::write(p, "x").unwrap();
        }

        rotate_logs("linz_traffic", dir.path(), &current);

        assert!(!old.exists());
        assert!(other_app.exists());
        assert!(current.exists());
    }
}
