//! Per-component event journals.
//!
//! Each component owns an [`EventLog`] of its own event enum. Emitting an
//! event appends it to the journal and logs it at `info`, so the same
//! record is available to tests (through [`EventLog::events`]) and to
//! operators (through the tracing subscriber).

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An ordered, append-only list of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog<E> {
    entries: Vec<E>,
}

impl<E: Debug> EventLog<E> {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records an event.
    pub fn emit(&mut self, event: E) {
        tracing::info!(event = ?event, "event emitted");
        self.entries.push(event);
    }

    /// All events in emission order.
    pub fn events(&self) -> &[E] {
        &self.entries
    }

    /// The most recent event, if any.
    pub fn last(&self) -> Option<&E> {
        self.entries.last()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every recorded event.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.entries)
    }
}

impl<E: Debug> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Ping {
        A(u8),
        B,
    }

    #[test]
    fn emit_keeps_order_and_drain_empties() {
        let mut log = EventLog::new();
        log.emit(Ping::A(1));
        log.emit(Ping::B);
        assert_eq!(log.events(), &[Ping::A(1), Ping::B]);
        assert_eq!(log.last(), Some(&Ping::B));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }
}
