use crate::config::Config;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Events go to stdout and, when a log
/// directory is configured, are appended to `<log_dir>/<log_file>`. Returns
/// the log file path actually in use.
pub fn init_logging(config: &Config) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config.debug)));

    let (writer, log_path) = match open_log_file(&config.log_dir, &config.log_file) {
        Ok(Some((path, file))) => (
            BoxMakeWriter::new(io::stdout.and(Arc::new(file))),
            Some(path),
        ),
        Ok(None) => (BoxMakeWriter::new(io::stdout), None),
        Err(err) => {
            eprintln!("log_file_error: {err}");
            (BoxMakeWriter::new(io::stdout), None)
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    log_path
}

fn default_level(debug: bool) -> String {
    if debug {
        return "debug".to_string();
    }
    std::env::var("RTLS_LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn open_log_file(log_dir: &str, log_file: &str) -> io::Result<Option<(PathBuf, File)>> {
    if log_dir.trim().is_empty() {
        return Ok(None);
    }
    let dir = Path::new(log_dir);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Some((path, file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_is_created_under_nested_dir_and_appended() {
        let root = tempfile::tempdir().expect("temp dir");
        let log_dir = root.path().join("logs").join("hub");
        let log_dir = log_dir.to_str().expect("utf-8 path");

        let (path, mut file) = open_log_file(log_dir, "ward5.log")
            .expect("open log file")
            .expect("log dir configured");
        assert_eq!(path.file_name().and_then(|name| name.to_str()), Some("ward5.log"));
        writeln!(file, "first").expect("write");
        drop(file);

        let (_, mut file) = open_log_file(log_dir, "ward5.log")
            .expect("reopen log file")
            .expect("log dir configured");
        writeln!(file, "second").expect("write");

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn blank_log_dir_means_stdout_only() {
        assert!(open_log_file("  ", "rtls-hub.log")
            .expect("no file needed")
            .is_none());
    }
}
