//! Change listeners.
//!
//! Listeners are `(query, sink)` pairs. After every committed mutation the
//! worker hands the affected documents to the [`Notifier`], which decides per
//! listener whether and how it fires:
//!
//! | Mutation | Fires | Event |
//! |---|---|---|
//! | insert | when the new document matches | [`ChangeEvent::Added`] |
//! | remove | always, even with no ids | [`ChangeEvent::Removed`] |
//! | update | always | [`ChangeEvent::Updated`] if the document still matches, else [`ChangeEvent::Removed`] with its id |
//!
//! Listeners run on the database worker, after the log line is durable and
//! before the mutating call returns. A listener must not call back into the
//! database. A callback that panics is logged and unregistered; the
//! mutation that triggered it still succeeds.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (id, events) = db.subscribe(&Query::parse(r#"{"status":"open"}"#)?)?;
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = events.recv() {
//!         println!("change: {event:?}");
//!     }
//! });
//! ```

use crate::id::DocumentId;
use crate::matcher::matches;
use objectdb_codec::{Document, Query};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;

/// A change delivered to a listener. Documents are copies.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A matching document was inserted.
    Added(Document),
    /// Documents left the collection, or left this listener's result set.
    Removed(Vec<DocumentId>),
    /// A matching document was changed and still matches.
    Updated(Document),
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Callback invoked with each event.
pub type Callback = Box<dyn FnMut(ChangeEvent) + Send>;

/// Where a listener's events go.
pub enum Sink {
    /// Called synchronously on the worker.
    Callback(Callback),
    /// Sent over a channel. The listener is dropped once the receiver is.
    Channel(Sender<ChangeEvent>),
}

impl Sink {
    /// Delivers `event`. Returns false once the sink can never accept
    /// another one. A callback that panics is never called again.
    fn deliver(&mut self, event: ChangeEvent) -> bool {
        match self {
            Self::Callback(callback) => {
                panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_ok()
            }
            Self::Channel(tx) => tx.send(event).is_ok(),
        }
    }
}

struct Listener {
    id: ListenerId,
    query: Query,
    sink: Sink,
}

impl Listener {
    fn send(&mut self, event: ChangeEvent) -> bool {
        let delivered = self.sink.deliver(event);
        if !delivered {
            match self.sink {
                Sink::Callback(_) => {
                    tracing::error!(id = %self.id, "listener callback panicked, dropping it");
                }
                Sink::Channel(_) => {
                    tracing::debug!(id = %self.id, "receiver gone, dropping listener");
                }
            }
        }
        delivered
    }
}

/// The set of registered listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
    next_id: u64,
}

impl Notifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn register(&mut self, query: Query, sink: Sink) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener { id, query, sink });
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        before != self.listeners.len()
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Reports an inserted document.
    pub fn added(&mut self, doc: &Document) {
        self.listeners.retain_mut(|l| {
            !matches(&l.query, doc) || l.send(ChangeEvent::Added(doc.clone()))
        });
    }

    /// Reports removed documents. Every listener fires.
    pub fn removed(&mut self, ids: &[DocumentId]) {
        self.listeners
            .retain_mut(|l| l.send(ChangeEvent::Removed(ids.to_vec())));
    }

    /// Reports a document after an update.
    pub fn updated(&mut self, doc: &Document) {
        let id = DocumentId::of(doc);
        self.listeners.retain_mut(|l| {
            let event = if matches(&l.query, doc) {
                ChangeEvent::Updated(doc.clone())
            } else {
                ChangeEvent::Removed(id.iter().cloned().collect())
            };
            l.send(event)
        });
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
