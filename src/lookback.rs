//! Bounded lookback buffer for tail correction.
//!
//! The correcting engine keeps its most recent commands provisional, each
//! annotated with the version range it encodes, so a later match that
//! extends backward can reclaim them. Entries leave the buffer from the
//! front when capacity forces an eviction (the entry is committed and
//! becomes immutable) or from the back when a correction absorbs them.

use std::collections::VecDeque;

use crate::types::Command;

/// A provisional command covering `v_start..v_end` of the version.
pub struct LookbackEntry {
    pub v_start: usize,
    pub v_end: usize,
    pub cmd: Command,
    /// Dummy entries are placeholders with no encoding; they are skipped on
    /// commit and discarded wherever they surface.
    pub dummy: bool,
}

impl LookbackEntry {
    pub fn new(v_start: usize, v_end: usize, cmd: Command) -> Self {
        LookbackEntry {
            v_start,
            v_end,
            cmd,
            dummy: false,
        }
    }
}

/// FIFO of provisional commands with a fixed capacity.
pub struct LookbackBuffer {
    entries: VecDeque<LookbackEntry>,
    cap: usize,
}

impl LookbackBuffer {
    pub fn new(cap: usize) -> Self {
        LookbackBuffer {
            entries: VecDeque::with_capacity(cap.max(1)),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, evicting from the front if the buffer is at
    /// capacity. An evicted non-dummy entry is committed to `committed`;
    /// once committed it is beyond correction.
    pub fn push(&mut self, entry: LookbackEntry, committed: &mut Vec<Command>) {
        if self.entries.len() >= self.cap {
            if let Some(oldest) = self.entries.pop_front() {
                if !oldest.dummy {
                    committed.push(oldest.cmd);
                }
            }
        }
        self.entries.push_back(entry);
    }

    /// Newest entry, with any trailing dummies discarded first.
    pub fn back(&mut self) -> Option<&LookbackEntry> {
        while matches!(self.entries.back(), Some(e) if e.dummy) {
            self.entries.pop_back();
        }
        self.entries.back()
    }

    pub fn back_mut(&mut self) -> Option<&mut LookbackEntry> {
        while matches!(self.entries.back(), Some(e) if e.dummy) {
            self.entries.pop_back();
        }
        self.entries.back_mut()
    }

    pub fn pop_back(&mut self) -> Option<LookbackEntry> {
        self.entries.pop_back()
    }

    /// Commit every remaining non-dummy entry in order and empty the buffer.
    pub fn flush(&mut self, committed: &mut Vec<Command>) {
        for entry in self.entries.drain(..) {
            if !entry.dummy {
                committed.push(entry.cmd);
            }
        }
    }
}
