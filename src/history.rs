//! Bounded snapshot undo/redo over the whole song.

use chrono::{DateTime, Utc};

use crate::song::Song;

pub const DEFAULT_CAPACITY: usize = 100;

/// What kind of edit a commit records. Most edits are skipped when they
/// didn't change anything, but some are always worth a history entry so
/// that an undo lands where the user expects.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditAction {
    MoveNotes,
    ResizeNotes,
    NudgeNotes,
    TransposeNotes,
    SnapNotes,
    Record,
    Paste,
    Cut,
    Delete,
    Import,
    SetVelocity,
    SetTempo,
    SetMeter,
    ReassignInstrument,
}

impl EditAction {
    fn always_records(self) -> bool {
        matches!(self,
            EditAction::Paste
            | EditAction::Cut
            | EditAction::Delete
            | EditAction::Import
            | EditAction::SetVelocity
            | EditAction::SetTempo
            | EditAction::SetMeter
            | EditAction::ReassignInstrument)
    }
}

struct Entry {
    snapshot: Song,
    action: Option<EditAction>,
    timestamp: DateTime<Utc>,
}

impl Entry {
    fn new(snapshot: Song, action: Option<EditAction>) -> Self {
        Self { snapshot, action, timestamp: Utc::now() }
    }
}

/// Linear undo history. A cursor walks a vector of snapshots; committing
/// while undone discards the redo branch.
pub struct History {
    entries: Vec<Entry>,
    cursor: usize,
    capacity: usize,
}

impl History {
    pub fn new(initial: &Song, capacity: usize) -> Self {
        Self {
            entries: vec![Entry::new(initial.clone(), None)],
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record the current state as the outcome of `action`. Returns false
    /// if nothing was recorded because the state is unchanged.
    pub fn commit(&mut self, song: &Song, action: EditAction) -> bool {
        if !action.always_records() && self.entries[self.cursor].snapshot == *song {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(Entry::new(song.clone(), Some(action)));
        self.cursor += 1;
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
            self.cursor -= 1;
        }
        true
    }

    /// Step back one snapshot, writing it into `song`. Returns false at
    /// the floor of history.
    pub fn undo(&mut self, song: &mut Song) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        *song = self.entries[self.cursor].snapshot.clone();
        true
    }

    pub fn redo(&mut self, song: &mut Song) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        *song = self.entries[self.cursor].snapshot.clone();
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Action that produced the state under the cursor, if any.
    pub fn last_action(&self) -> Option<EditAction> {
        self.entries[self.cursor].action
    }

    /// When the state under the cursor was committed.
    pub fn last_change(&self) -> DateTime<Utc> {
        self.entries[self.cursor].timestamp
    }

    /// Drop everything and restart from the given state. Used after an
    /// import replaces the whole document.
    pub fn reset(&mut self, song: &Song) {
        self.entries.clear();
        self.entries.push(Entry::new(song.clone(), None));
        self.cursor = 0;
    }
}
