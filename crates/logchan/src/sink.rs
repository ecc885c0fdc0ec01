//! Byte sinks for rendered log lines and for the dispatcher's own failure reports

use crate::{
    config::SinkConfig,
    error::{LogchanError, Result},
};
use chrono::{Local, NaiveDate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, line-oriented writer.
///
/// Clones write to the same destination. After [`LogWriter::close`] every write is
/// silently discarded.
#[derive(Clone)]
pub struct LogWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
    target: Arc<str>,
}

impl LogWriter {
    pub fn new<W: Write + Send + 'static>(writer: W, target: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
            target: target.into(),
        }
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr(), "stderr")
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout(), "stdout")
    }

    /// Destination described by `config`: an append-mode file when a file format is
    /// set, standard error otherwise
    pub fn open(config: &SinkConfig) -> Result<Self> {
        let Some(format) = config.file_format.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(Self::stderr());
        };

        let app_name = config.app_name.as_deref().unwrap_or_default();
        let path = expand_file_format(format, app_name, Local::now().date_naive());
        let file = open_append(&path, config.dir_mode)?;

        tracing::debug!(
            logchan.event = "sink_opened",
            path = %path.display(),
            "Opened log file sink"
        );

        Ok(Self::new(file, path.display().to_string()))
    }

    /// Where this writer sends its bytes
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Write `line` followed by a newline and flush
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }

    /// Flush and detach the destination; later writes go nowhere
    pub fn close(&self) -> Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let flushed = writer.flush();
        *writer = Box::new(io::sink());
        flushed.map_err(|e| LogchanError::Sink {
            message: format!("Failed to flush {} on close: {}", self.target, e),
        })
    }
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogWriter")
            .field("target", &self.target)
            .finish()
    }
}

/// Replace `{appName}` and `{date}` (`YYYYMMDD`) placeholders in a file format
pub fn expand_file_format(format: &str, app_name: &str, date: NaiveDate) -> PathBuf {
    let path = format
        .replace("{appName}", app_name)
        .replace("{date}", &date.format("%Y%m%d").to_string());
    PathBuf::from(path)
}

fn open_append(path: &Path, dir_mode: Option<u32>) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dirs(parent, dir_mode)?;
    }

    let mut options = OpenOptions::new();
    options.read(true).append(true).create(true);

    #[cfg(unix)]
    if let Some(mode) = dir_mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    Ok(options.open(path)?)
}

#[cfg(unix)]
fn create_dirs(dir: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    if let Some(mode) = mode {
        builder.mode(mode);
    }
    builder.create(dir)
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path, _mode: Option<u32>) -> io::Result<()> {
    fs::create_dir_all(dir)
}
