//! Background compression of retired log files
//!
//! Each retired file gets its own short-lived thread that writes `<file>.gz` and then
//! removes the original. Failures are dropped: archival must never affect logging.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::UNIX_EPOCH;

use flate2::{Compression, GzBuilder};

/// Suffix appended to a retired file's name
pub const ARCHIVE_EXTENSION: &str = "gz";

const WORKER_THREAD_NAME: &str = "dailylog-compress";

/// Archive path for a log file (`2026_01_21.log` -> `2026_01_21.log.gz`)
pub fn archive_path_for(src: &Path) -> PathBuf {
    let mut name = src.as_os_str().to_owned();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

/// Compress `src` on a detached thread
///
/// Returns `None` if the thread could not be spawned; the file is then left as is.
pub fn spawn_compression(src: PathBuf) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let _ = compress_file(&src);
        })
        .ok()
}

/// Append `src` to its archive as one gzip member, then delete `src`
///
/// The member header records the original file name and modification time, the
/// trailer its size. An existing archive for the same name (a day retired twice
/// after the clock stepped back) keeps its earlier members. `src` is only removed
/// once the member has been fully written and synced; on any failure the archive is
/// cut back to its previous length and `src` is left untouched.
pub fn compress_file(src: &Path) -> io::Result<PathBuf> {
    let mut source = File::open(src)?;
    let archive_path = archive_path_for(src);
    let mut archive = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&archive_path)?;
    let previous_len = archive.metadata()?.len();

    if let Err(e) = write_member(&mut source, src, &mut archive) {
        let _ = archive.set_len(previous_len);
        drop(archive);
        if previous_len == 0 {
            let _ = fs::remove_file(&archive_path);
        }
        return Err(e);
    }

    drop(source);
    fs::remove_file(src)?;
    Ok(archive_path)
}

fn write_member(source: &mut File, src: &Path, archive: &mut File) -> io::Result<()> {
    let metadata = source.metadata()?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(0);

    let mut builder = GzBuilder::new().mtime(mtime);
    if let Some(name) = src.file_name() {
        builder = builder.filename(name.to_string_lossy().into_owned());
    }

    let mut encoder = builder.write(archive, Compression::default());
    io::copy(source, &mut encoder)?;
    let archive = encoder.finish()?;
    archive.sync_all()
}
