//! dailylog - leveled logging with daily rotating, compressed log files
//!
//! The core is [`logging::RotatingSink`], a thread-safe writer that switches to a new
//! `<YYYY_MM_DD>.log` file when the date changes and compresses the file it leaves
//! behind. [`logging::Logger`] puts a `tracing` front end on top of it.

pub mod config;
pub mod logging;
