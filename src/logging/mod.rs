//! Logging system for dailylog
//!
//! Provides leveled logging mirrored to the console and to daily log files, with
//! rotation on date change and background compression of retired files.

mod clock;
mod compress;
mod level;
mod logger;
mod sink;

pub use clock::{same_day, Clock, LocalClock, ManualClock};
pub use compress::{archive_path_for, compress_file, spawn_compression, ARCHIVE_EXTENSION};
pub use level::{Level, ParseLevelError};
pub use logger::{Logger, LoggerOptions, TIME_FORMAT};
pub use sink::{RotatingSink, SinkMakeWriter, FILE_DATE_FORMAT, LOG_EXTENSION};
