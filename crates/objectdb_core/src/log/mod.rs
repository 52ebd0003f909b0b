//! Append-only record log.
//!
//! ## Line Format
//!
//! ```text
//! $objectdb{"storageVersion":1,"clientVersion":0}   optional header, line 1 only
//! +{"_id":"...","name":"a"}                         insert
//! -{"$gt":{"n":3}}                                  remove (encoded query)
//! ~{"q":{...},"c":{...},"r":false}                  update
//! {"_id":"...","name":"a"}                          insert, older writers
//! ```
//!
//! ## Recovery Policy
//!
//! - A `<path>.bak` file left by an interrupted compaction replaces the main
//!   file before anything is read
//! - An unterminated last line is a torn write. It is dropped if it does not
//!   decode, and the log is compacted before the next append either way
//! - After a failed append the file may end mid-line, so the log refuses
//!   further appends until it is reopened or compacted
//! - Lines with an unknown tag are skipped with a warning
//! - Any other undecodable line aborts the open
//!
//! ## Compaction
//!
//! ```text
//! rename main -> main.bak
//! write header + one insert per live document to a new main
//! sync, then delete main.bak
//! ```

mod file;
mod record;

pub use file::{backup_path, LogFile, ReplaySummary, BACKUP_SUFFIX};
pub use record::{LogRecord, Meta, META_MARKER, STORAGE_VERSION};
