//! # ObjectDB Core
//!
//! An embedded document database backed by a single append-only log file.
//!
//! This crate provides:
//! - [`Database`] - the thread-safe handle every operation goes through
//! - Query evaluation ([`matches`]) and the update engine ([`apply`])
//! - The log format, replay and compaction ([`log`])
//! - Change listeners ([`ChangeEvent`])
//! - Versioned upgrades ([`UpgradeSession`])
//!
//! ## Model
//!
//! The whole collection lives in memory. Every mutation is written to the
//! log as one line before it becomes visible, so reopening the file replays
//! exactly the acknowledged operations. Compaction rewrites the log as one
//! insert per live document, through a `.bak` copy that is restored if the
//! rewrite is interrupted.
//!
//! All operations run on one worker thread, in the order they were
//! submitted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use objectdb_core::{Config, Database, Query};
//!
//! let db = Database::open("notes.db", Config::default())?;
//! let id = db.insert(doc)?;
//! let open = db.find(&Query::parse(r#"{"status": "open"}"#)?)?;
//! db.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod error;
mod id;
pub mod log;
mod matcher;
mod notifier;
mod queue;
mod stats;
mod store;
mod update;
mod upgrade;

pub use config::Config;
pub use database::{id_query, Database};
pub use error::{BoxError, CoreError, CoreResult};
pub use id::{DocumentId, ID_FIELD};
pub use matcher::{matcher, matches};
pub use notifier::{ChangeEvent, ListenerId};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use update::apply;
pub use upgrade::{UpgradeFn, UpgradeSession};

pub use objectdb_codec::{ChangeSpec, Document, Query, Value};
