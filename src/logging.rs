//! Log output for the bridge binary.
//!
//! Console output is always on. When a [`LogConfig`] is given, a rolling file
//! is written next to it through `tracing-appender`, and files beyond the
//! configured limit are removed at start-up.

use std::path::Path;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_SUFFIX: &str = "log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl FromStr for RotationPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minutely" | "minute" => Ok(RotationPeriod::Minutely),
            "hourly" | "hour" => Ok(RotationPeriod::Hourly),
            "daily" | "day" => Ok(RotationPeriod::Daily),
            "never" | "none" => Ok(RotationPeriod::Never),
            other => Err(format!(
                "unknown rotation period '{other}', expected one of minutely, hourly, daily, never"
            )),
        }
    }
}

impl From<RotationPeriod> for Rotation {
    fn from(period: RotationPeriod) -> Self {
        match period {
            RotationPeriod::Minutely => Rotation::MINUTELY,
            RotationPeriod::Hourly => Rotation::HOURLY,
            RotationPeriod::Daily => Rotation::DAILY,
            RotationPeriod::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_prefix: String,
    pub rotation: RotationPeriod,
    /// Number of rotated files to keep, 0 keeps everything.
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: ".".to_string(),
            log_prefix: "ewelink-bridge".to_string(),
            rotation: RotationPeriod::Daily,
            max_log_files: 7,
        }
    }
}

impl LogConfig {
    fn appender(&self) -> std::io::Result<RollingFileAppender> {
        RollingFileAppender::builder()
            .rotation(self.rotation.into())
            .filename_prefix(&self.log_prefix)
            .filename_suffix(LOG_SUFFIX)
            .max_log_files(self.max_log_files)
            .build(&self.log_dir)
            .map_err(std::io::Error::other)
    }
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber. `RUST_LOG` controls the level, `info` by default.
pub fn init_logging(file: Option<&LogConfig>) -> std::io::Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match file {
        Some(config) => {
            if config.max_log_files > 0 {
                cleanup_old_logs(
                    Path::new(&config.log_dir),
                    &config.log_prefix,
                    config.max_log_files,
                )?;
            }
            let (writer, guard) = tracing_appender::non_blocking(config.appender()?);
            let layer = Layer::default()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = Layer::default()
        .with_writer(std::io::stdout)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LogGuard { _file: guard })
}

/// Removes all but the `keep` most recently modified log files with `prefix`.
/// Returns how many files were removed.
fn cleanup_old_logs(log_dir: &Path, prefix: &str, keep: usize) -> std::io::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut logs: Vec<_> = std::fs::read_dir(log_dir)?
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_name().to_str().is_some_and(|name| {
                name.starts_with(prefix) && name.ends_with(&format!(".{LOG_SUFFIX}"))
            })
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    logs.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in logs.into_iter().skip(keep) {
        // The subscriber is not installed yet, so report on stderr.
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("could not remove old log file {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotation_period_from_str() {
        let cases = [
            ("daily", RotationPeriod::Daily),
            ("Hour", RotationPeriod::Hourly),
            ("MINUTELY", RotationPeriod::Minutely),
            ("none", RotationPeriod::Never),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<RotationPeriod>().unwrap(), expected);
        }
        assert!("weekly".parse::<RotationPeriod>().is_err());
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path();

        for i in 0..4 {
            std::fs::write(log_dir.join(format!("bridge.{i}.log")), "line").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        std::fs::write(log_dir.join("other.log"), "line").unwrap();
        std::fs::write(log_dir.join("bridge.txt"), "line").unwrap();

        assert_eq!(cleanup_old_logs(log_dir, "bridge", 1).unwrap(), 3);
        assert!(log_dir.join("bridge.3.log").exists());
        assert!(!log_dir.join("bridge.0.log").exists());
        assert!(log_dir.join("other.log").exists());
        assert!(log_dir.join("bridge.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert_eq!(cleanup_old_logs(&missing, "bridge", 2).unwrap(), 0);
    }

    #[test]
    fn test_appender_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig {
            log_dir: temp_dir.path().join("logs").display().to_string(),
            rotation: RotationPeriod::Never,
            ..Default::default()
        };
        assert!(config.appender().is_ok());
        assert!(temp_dir.path().join("logs").exists());
    }
}
