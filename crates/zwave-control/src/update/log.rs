//! Circular log of topology changes kept by the authority.
//!
//! The write cursor only grows; the slot of cursor `w` is `w & (N - 1)`,
//! which is why [`UPDATE_LOG_SIZE`] must stay a power of two.

use zwave_core::constants::UPDATE_LOG_SIZE;
use zwave_core::{NodeId, NodeInfo};

const WRAP_MASK: u64 = (UPDATE_LOG_SIZE - 1) as u64;

/// Kind of committed change recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    NodeAdded,
    NodeRemoved,
    RoutingChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLogEntry {
    pub change: ChangeKind,
    pub node: NodeId,
    /// Capabilities as announced when the change was committed.
    pub info: NodeInfo,
}

/// What a requester at a given consumption index needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlog {
    CaughtUp,
    /// Replay entries `from..to`.
    Entries { from: u64, to: u64 },
    /// The requester is too far behind for an incremental replay.
    Overflow,
}

#[derive(Debug, Clone)]
pub struct UpdateLog {
    entries: Vec<Option<UpdateLogEntry>>,
    cursor: u64,
}

impl Default for UpdateLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateLog {
    pub fn new() -> Self {
        Self {
            entries: vec![None; UPDATE_LOG_SIZE],
            cursor: 0,
        }
    }

    pub const fn slot_of(cursor: u64) -> usize {
        (cursor & WRAP_MASK) as usize
    }

    /// Number of entries ever written.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Slot the next entry will occupy.
    pub fn write_slot(&self) -> usize {
        Self::slot_of(self.cursor)
    }

    /// Append and return the new write cursor.
    pub fn append(&mut self, entry: UpdateLogEntry) -> u64 {
        let slot = self.write_slot();
        self.entries[slot] = Some(entry);
        self.cursor += 1;
        self.cursor
    }

    /// Entry written at `index`, if it has not been overwritten yet.
    pub fn get(&self, index: u64) -> Option<&UpdateLogEntry> {
        if index >= self.cursor || self.cursor - index > UPDATE_LOG_SIZE as u64 {
            return None;
        }
        self.entries[Self::slot_of(index)].as_ref()
    }

    pub fn backlog(&self, consumed: u64) -> Backlog {
        if consumed == self.cursor {
            Backlog::CaughtUp
        } else if consumed > self.cursor || self.cursor - consumed > UPDATE_LOG_SIZE as u64 {
            Backlog::Overflow
        } else {
            Backlog::Entries {
                from: consumed,
                to: self.cursor,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u16) -> UpdateLogEntry {
        UpdateLogEntry {
            change: ChangeKind::NodeAdded,
            node: NodeId::new(n),
            info: NodeInfo::default(),
        }
    }

    #[test]
    fn caught_up_when_cursor_matches() {
        let mut log = UpdateLog::new();
        log.append(entry(2));
        assert_eq!(log.backlog(1), Backlog::CaughtUp);
        assert_eq!(log.backlog(0), Backlog::Entries { from: 0, to: 1 });
    }

    #[test]
    fn overflow_once_wrapped_past() {
        let mut log = UpdateLog::new();
        for i in 0..=UPDATE_LOG_SIZE as u16 {
            log.append(entry(i % 200 + 1));
        }
        assert_eq!(log.backlog(0), Backlog::Overflow);
        assert!(matches!(log.backlog(1), Backlog::Entries { from: 1, .. }));
        assert!(log.get(0).is_none());
        assert!(log.get(1).is_some());
    }

    #[test]
    fn future_index_is_overflow() {
        let log = UpdateLog::new();
        assert_eq!(log.backlog(5), Backlog::Overflow);
    }

    #[test]
    fn get_returns_written_entry() {
        let mut log = UpdateLog::new();
        log.append(entry(7));
        log.append(entry(8));
        assert_eq!(log.get(1).map(|e| e.node), Some(NodeId::new(8)));
        assert!(log.get(2).is_none());
    }
}
