//! Daily rotating log file sink
//!
//! Writes go to `<directory>/<YYYY_MM_DD>.log`. The file is opened lazily on the first
//! write, and every write checks whether the calendar date has moved on since the file
//! was opened. If it has, the old file is synced and closed, optionally handed to a
//! background compression thread, and a file for the new date is opened before the
//! caller's bytes are written.
//!
//! One mutex covers the rollover check, the file swap and the write itself, so records
//! from concurrent writers never interleave and a day boundary is crossed exactly once.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::NaiveDate;
use tracing_subscriber::fmt::MakeWriter;

use super::clock::{same_day, Clock, LocalClock};
use super::compress::spawn_compression;

/// File name format for a day's log (`2026_01_21.log`)
pub const FILE_DATE_FORMAT: &str = "%Y_%m_%d";

/// Extension of active log files
pub const LOG_EXTENSION: &str = "log";

/// The currently open file and the day it belongs to
#[derive(Debug)]
struct ActiveFile {
    file: File,
    date: NaiveDate,
}

/// A concurrency-safe, date-rotating log file writer
#[derive(Debug)]
pub struct RotatingSink {
    directory: PathBuf,
    compress_on_rotate: bool,
    clock: Arc<dyn Clock>,
    /// Open file, if any; held for the whole check-rotate-write sequence
    active: Mutex<Option<ActiveFile>>,
    /// Compression threads dispatched by rotations, kept only for `drain`
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl RotatingSink {
    /// Create a sink over `directory` using local wall-clock dates
    ///
    /// Nothing touches the filesystem until the first write.
    pub fn new(directory: impl Into<PathBuf>, compress_on_rotate: bool) -> Self {
        Self::with_clock(directory, compress_on_rotate, Arc::new(LocalClock))
    }

    /// Create a sink with a custom date source
    pub fn with_clock(
        directory: impl Into<PathBuf>,
        compress_on_rotate: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory: directory.into(),
            compress_on_rotate,
            clock,
            active: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Directory the sink writes into
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether retired files are compressed
    pub fn compress_on_rotate(&self) -> bool {
        self.compress_on_rotate
    }

    /// Log file path for a given day
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory.join(format!(
            "{}.{}",
            date.format(FILE_DATE_FORMAT),
            LOG_EXTENSION
        ))
    }

    /// Path of the open file, or `None` if nothing is open
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock_active()
            .as_ref()
            .map(|active| self.path_for(active.date))
    }

    /// Write one record
    ///
    /// Opens today's file if none is open, rotates first if the open file belongs to
    /// an earlier day, then writes all of `buf`. On an open failure nothing is written.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self.lock_active();
        let today = self.clock.today();

        let mut current = match active.take() {
            Some(current) if same_day(current.date, today) => current,
            Some(retired) => {
                self.retire(retired)?;
                self.open(today)?
            }
            None => self.open(today)?,
        };

        let written = current.file.write_all(buf);
        *active = Some(current);
        written.map(|()| buf.len())
    }

    /// Flush the open file, if any
    pub fn flush(&self) -> io::Result<()> {
        match self.lock_active().as_mut() {
            Some(current) => current.file.flush(),
            None => Ok(()),
        }
    }

    /// Flush, sync and release the open file
    ///
    /// A no-op when nothing is open. The handle is released even if syncing fails, and
    /// a later write reopens today's file in append mode.
    pub fn close(&self) -> io::Result<()> {
        let mut active = self.lock_active();
        let Some(mut current) = active.take() else {
            return Ok(());
        };

        current.file.flush()?;
        current.file.sync_all()
    }

    /// Block until every compression dispatched so far has finished
    ///
    /// Rotation never waits on compression; call this before process exit if retired
    /// files must be archived.
    pub fn drain(&self) {
        let handles = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for handle in handles {
            let _ = handle.join();
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveFile>> {
        // A panic while holding the lock leaves the handle usable
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self, date: NaiveDate) -> io::Result<ActiveFile> {
        fs::create_dir_all(&self.directory)?;

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }

        let file = options.open(self.path_for(date))?;
        Ok(ActiveFile { file, date })
    }

    /// Sync and close a file that belongs to a past day, then queue it for compression
    fn retire(&self, mut retired: ActiveFile) -> io::Result<()> {
        retired.file.flush()?;
        retired.file.sync_all()?;

        let path = self.path_for(retired.date);
        drop(retired);

        if self.compress_on_rotate {
            if let Some(handle) = spawn_compression(path) {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.retain(|h| !h.is_finished());
                    pending.push(handle);
                }
            }
        }

        Ok(())
    }
}

impl Write for RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingSink::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingSink::flush(self)
    }
}

impl Write for &RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingSink::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingSink::flush(*self)
    }
}

/// Writer factory handing a shared sink to `tracing-subscriber`
#[derive(Debug, Clone)]
pub struct SinkMakeWriter {
    sink: Arc<RotatingSink>,
}

impl SinkMakeWriter {
    /// Wrap a shared sink
    pub fn new(sink: Arc<RotatingSink>) -> Self {
        Self { sink }
    }
}

impl<'a> MakeWriter<'a> for SinkMakeWriter {
    type Writer = &'a RotatingSink;

    fn make_writer(&'a self) -> Self::Writer {
        &self.sink
    }
}
