use crate::config::app_dir;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

type SetupError = Box<dyn std::error::Error + Send + Sync>;

/// File logging for the desktop window. Default WARN, `RUST_LOG` overrides.
/// `CODELOOM_LOG_STDERR=1` logs to stderr at INFO instead. If the log file
/// cannot be opened a warning goes to stderr and the app runs without logs.
pub fn init() {
    let rust_log = std::env::var("RUST_LOG").ok();

    if std::env::var("CODELOOM_LOG_STDERR").is_ok_and(|value| value == "1") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(rust_log.as_deref(), "info"))
            .init();
        return;
    }

    let result = app_dir()
        .ok_or_else(|| SetupError::from("could not determine config directory"))
        .and_then(|dir| init_file(&dir, env_filter(rust_log.as_deref(), "warn")));
    if let Err(err) = result {
        eprintln!("warning: failed to set up file logging: {err}");
    }
}

/// `RUST_LOG` when it is set and parses, `default` otherwise.
fn env_filter(rust_log: Option<&str>, default: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

fn init_file(log_dir: &Path, filter: EnvFilter) -> Result<PathBuf, SetupError> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join("codeloom.log");
    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(log_file))
        .with_env_filter(filter)
        .with_ansi(false)
        .try_init()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_replaces_the_default_level() {
        let filter = env_filter(Some("debug"), "warn");
        assert_eq!(filter.to_string().to_lowercase(), "debug");
    }

    #[test]
    fn missing_or_blank_rust_log_uses_the_default() {
        assert_eq!(env_filter(None, "warn").to_string().to_lowercase(), "warn");
        assert_eq!(env_filter(Some("  "), "info").to_string().to_lowercase(), "info");
    }

    #[test]
    fn file_logger_writes_into_the_log_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let log_dir = dir.path().join("logs");
        let path = init_file(&log_dir, EnvFilter::new("warn"))
            .expect("file logger should install");
        assert_eq!(path, log_dir.join("codeloom.log"));

        tracing::warn!("file logger smoke line");
        let written = fs::read_to_string(&path).expect("log file should read");
        assert!(written.contains("file logger smoke line"));
    }
}
