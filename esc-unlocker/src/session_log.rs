//! The plain text log kept next to the tool, so a user can send it along
//! with a bug report.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

use crate::{
    runner::{Observer, Outcome, RunnerError, Stream},
    status::Status,
};

pub const DEFAULT_SESSION_LOG: &str = "esc_unlocker.log";

struct Inner {
    path: PathBuf,
    offset: UtcOffset,
    write_lock: Mutex<()>,
}

/// Appends timestamped blocks of text to a file.
///
/// Failing to write is never an error for the caller; it is only reported
/// through `tracing`.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Inner>,
}

impl SessionLog {
    /// `offset` should be determined while the program is still
    /// single-threaded, see [`UtcOffset::current_local_offset`].
    pub fn new(path: impl Into<PathBuf>, offset: UtcOffset) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                offset,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn append(&self, message: &str) {
        let now = OffsetDateTime::now_utc().to_offset(self.inner.offset);
        if let Err(error) = self.append_at(now, message) {
            tracing::warn!(
                "Failed to write to the session log {}: {error}",
                self.inner.path.display()
            );
        }
    }

    fn append_at(&self, at: OffsetDateTime, message: &str) -> io::Result<()> {
        // `Mon Oct  5 14:03:00 2026`, the C locale's `%c`.
        let stamp = at
            .format(format_description!(
                "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
            ))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = self.inner.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;

        // Single write per block.
        file.write_all(format!("{stamp}\n{message}\n").as_bytes())
    }

    /// An observer that records a run in this log.
    pub fn observer(&self) -> SessionLogObserver {
        SessionLogObserver { log: self.clone() }
    }
}

pub struct SessionLogObserver {
    log: SessionLog,
}

impl Observer for SessionLogObserver {
    fn status(&mut self, status: Status) {
        if status == Status::Succeeded {
            self.log.append("Success");
        }
    }

    fn output(&mut self, _stream: Stream, text: &str) {
        self.log.append(text);
    }

    fn launch_failed(&mut self, error: &RunnerError) {
        self.log.append(&format!("Error running OpenOCD: {error}"));
    }

    fn finished(&mut self, outcome: &Outcome) {
        if let Outcome::Stopped { .. } = outcome {
            self.log.append("stopping");
        }
    }
}
