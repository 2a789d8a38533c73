//! Piano-roll editing: selection, drag gestures, clipboard, nudging, snap
//! batches and the undo history around them all.

use std::collections::HashSet;

use ordered_float::OrderedFloat;

use crate::config::Config;
use crate::coords::{Metrics, NoteZone, CLICK_SLOP};
use crate::history::{EditAction, History, DEFAULT_CAPACITY};
use crate::input::{nudge_step, Action, Modifiers, Pointer};
use crate::playback::{AudioSink, Player};
use crate::snap::SnapSettings;
use crate::song::{Note, NoteRef, Song};

/// Velocity change per wheel step.
const WHEEL_VELOCITY_STEP: i16 = 5;

/// Detached note copies, remembering which instrument each came from.
#[derive(Clone, Debug, Default)]
pub struct Clipboard {
    notes: Vec<(String, Note)>,
}

impl Clipboard {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

enum DragKind {
    Move,
    ResizeLeft,
    ResizeRight,
    RangeSelect,
}

/// An in-flight pointer gesture. Selected notes are snapshotted at press
/// time so each motion frame recomputes from the origin instead of
/// accumulating increments.
struct Drag {
    kind: DragKind,
    start_x: f64,
    start_y: f64,
    /// Selected notes pinned to concrete positions at press time, paired
    /// with their origin state. Positions, not references: the first
    /// motion frame drifts each note's identity, and a stacked duplicate
    /// still sitting at the origin would steal the re-resolution. Nothing
    /// structural can happen mid-gesture, so positions hold. Empty for
    /// range selection.
    origin: Vec<((usize, usize), Note)>,
    reference: usize,
    moved: bool,
}

pub struct Editor {
    selection: Vec<NoteRef>,
    clipboard: Clipboard,
    drag: Option<Drag>,
    history: History,
    pub snap: SnapSettings,
    visible: HashSet<String>,
    /// Every track id currently in the song. Tracks that appear without
    /// being known start out visible; hidden tracks stay hidden until
    /// they are pruned and recreated.
    known: HashSet<String>,
}

impl Editor {
    pub fn new(song: &Song, config: &Config) -> Self {
        let snap = SnapSettings {
            precision: config.snap_precision.unwrap_or(SnapSettings::default().precision),
            sensitivity: config.snap_sensitivity.unwrap_or(SnapSettings::default().sensitivity),
        };
        let visible = Self::track_set(song);
        Self {
            selection: Vec::new(),
            clipboard: Clipboard::default(),
            drag: None,
            history: History::new(song, config.history_capacity.unwrap_or(DEFAULT_CAPACITY)),
            snap,
            known: visible.clone(),
            visible,
        }
    }

    pub fn selection(&self) -> &[NoteRef] {
        &self.selection
    }

    pub fn is_selected(&self, r: &NoteRef) -> bool {
        self.selection.contains(r)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_visible(&self, instrument: &str) -> bool {
        self.visible.contains(instrument)
    }

    pub fn set_visible(&mut self, instrument: &str, on: bool) {
        if on {
            self.visible.insert(instrument.to_owned());
        } else {
            self.visible.remove(instrument);
            self.selection.retain(|r| r.instrument() != instrument);
        }
    }

    /// Newly created tracks start visible; pruned tracks leave the
    /// visibility set. Call after any operation that can change the
    /// track list.
    fn sync_visibility(&mut self, song: &Song) {
        for track in &song.tracks {
            if self.known.insert(track.instrument().to_owned()) {
                self.visible.insert(track.instrument().to_owned());
            }
        }
        self.known.retain(|i| song.track(i).is_some());
        self.visible.retain(|i| song.track(i).is_some());
    }

    fn track_set(song: &Song) -> HashSet<String> {
        song.tracks.iter().map(|t| t.instrument().to_owned()).collect()
    }

    fn commit(&mut self, song: &Song, action: EditAction) -> bool {
        self.history.commit(song, action)
    }

    /// Restoring a snapshot invalidates every reference, so the selection
    /// is dropped. View state (visibility, snap) survives, apart from
    /// tracks the restore added or removed.
    fn restore_done(&mut self, song: &Song) {
        self.selection.clear();
        self.sync_visibility(song);
    }

    pub fn undo(&mut self, song: &mut Song) -> bool {
        let ok = self.history.undo(song);
        if ok {
            self.restore_done(song);
        }
        ok
    }

    pub fn redo(&mut self, song: &mut Song) -> bool {
        let ok = self.history.redo(song);
        if ok {
            self.restore_done(song);
        }
        ok
    }

    /// Record a note added outside the editor (a recording pass) in the
    /// history.
    pub fn commit_recording(&mut self, song: &Song) -> bool {
        self.sync_visibility(song);
        self.commit(song, EditAction::Record)
    }

    /// Note under the pointer, for hover feedback in the renderer.
    pub fn note_at(&self, song: &Song, metrics: &Metrics, now_beat: f64,
        x: f64, y: f64,
    ) -> Option<NoteRef> {
        self.topmost_hit(song, metrics, now_beat, x, y).map(|(r, _)| r)
    }

    fn topmost_hit(&self, song: &Song, metrics: &Metrics, now_beat: f64,
        x: f64, y: f64,
    ) -> Option<(NoteRef, NoteZone)> {
        for track in song.tracks.iter().rev() {
            if !self.visible.contains(track.instrument()) {
                continue;
            }
            for (i, note) in track.notes().iter().enumerate().rev() {
                if let Some(zone) = metrics.hit_test(note, now_beat, x, y) {
                    let mut r = NoteRef::hint(track.instrument(), i);
                    r.refresh(song);
                    return Some((r, zone));
                }
            }
        }
        None
    }

    /// Begin a gesture. Pressing a note selects it (added to the existing
    /// selection with shift); pressing empty space starts a range select.
    pub fn pointer_down(&mut self, song: &Song, metrics: &Metrics, now_beat: f64,
        ptr: Pointer,
    ) {
        let hit = self.topmost_hit(song, metrics, now_beat, ptr.x, ptr.y);
        let Some((r, zone)) = hit else {
            if !ptr.mods.shift {
                self.selection.clear();
            }
            self.drag = Some(Drag {
                kind: DragKind::RangeSelect,
                start_x: ptr.x,
                start_y: ptr.y,
                origin: Vec::new(),
                reference: 0,
                moved: false,
            });
            return;
        };

        if ptr.mods.shift {
            if let Some(pos) = self.selection.iter().position(|s| *s == r) {
                self.selection.remove(pos);
                return;
            }
            self.selection.push(r.clone());
        } else if !self.is_selected(&r) {
            self.selection.clear();
            self.selection.push(r.clone());
        }

        let mut origin = Vec::with_capacity(self.selection.len());
        let mut reference = 0;
        for s in &self.selection {
            let Some(slot) = song.resolve(s) else { continue };
            let Some(note) = song.note(slot.0, slot.1) else { continue };
            if *s == r {
                reference = origin.len();
            }
            origin.push((slot, note.clone()));
        }
        self.drag = Some(Drag {
            kind: match zone {
                NoteZone::LeftEdge => DragKind::ResizeLeft,
                NoteZone::RightEdge => DragKind::ResizeRight,
                NoteZone::Body => DragKind::Move,
            },
            start_x: ptr.x,
            start_y: ptr.y,
            origin,
            reference,
            moved: false,
        });
    }

    pub fn pointer_move(&mut self, song: &mut Song, metrics: &Metrics, ptr: Pointer) {
        let Some(mut drag) = self.drag.take() else { return };
        let dx = ptr.x - drag.start_x;
        let dy = ptr.y - drag.start_y;
        if dx.abs().max(dy.abs()) >= CLICK_SLOP {
            drag.moved = true;
        }
        if drag.moved {
            match drag.kind {
                DragKind::Move => self.apply_move(song, metrics, &drag, ptr),
                DragKind::ResizeLeft => self.apply_resize(song, metrics, &drag, ptr, true),
                DragKind::ResizeRight => self.apply_resize(song, metrics, &drag, ptr, false),
                DragKind::RangeSelect => {}
            }
        }
        self.drag = Some(drag);
    }

    /// End the gesture. A drag that moved notes commits one history entry;
    /// a short press on empty space is a playhead click.
    pub fn pointer_up(&mut self, song: &mut Song, metrics: &Metrics, now_beat: f64,
        player: &mut Player, sink: &mut impl AudioSink, ptr: Pointer,
    ) {
        let Some(drag) = self.drag.take() else { return };
        match drag.kind {
            DragKind::RangeSelect => {
                if !drag.moved {
                    player.seek(metrics.x_to_beat(ptr.x.max(0.0)), sink);
                    return;
                }
                self.finish_range_select(song, metrics, now_beat, &drag, ptr);
            }
            DragKind::Move => {
                if drag.moved {
                    self.reselect(song, drag.origin.iter().map(|(s, _)| *s));
                    self.commit(song, EditAction::MoveNotes);
                }
            }
            DragKind::ResizeLeft | DragKind::ResizeRight => {
                if drag.moved {
                    self.reselect(song, drag.origin.iter().map(|(s, _)| *s));
                    self.commit(song, EditAction::ResizeNotes);
                }
            }
        }
    }

    /// Translate every selected note by the delta of the reference note,
    /// snapping the reference start. Clamping happens per note, so notes
    /// pushed against the left edge or pitch range compress the group.
    fn apply_move(&mut self, song: &mut Song, metrics: &Metrics, drag: &Drag, ptr: Pointer) {
        let Some((_, ref_origin)) = drag.origin.get(drag.reference) else { return };
        let dbeat = metrics.x_to_beat(ptr.x) - metrics.x_to_beat(drag.start_x);
        let new_start = self.snap.snap((ref_origin.start() + dbeat).max(0.0));
        let dbeat = new_start - ref_origin.start();
        let dpitch = metrics.y_to_pitch(ptr.y.max(0.0)) as i16
            - metrics.y_to_pitch(drag.start_y.max(0.0)) as i16;

        for &((t, n), ref origin) in &drag.origin {
            if let Some(note) = song.note_mut(t, n) {
                *note = origin.clone();
                note.shift(dbeat);
                note.transpose(dpitch);
            }
        }
    }

    /// Resize from one edge. A single note moves just that edge; a group
    /// stretches proportionally around the far extreme of the selection.
    fn apply_resize(&mut self, song: &mut Song, metrics: &Metrics, drag: &Drag,
        ptr: Pointer, left: bool,
    ) {
        let Some((_, ref_origin)) = drag.origin.get(drag.reference) else { return };
        let Some(ref_end) = ref_origin.end() else { return };
        let dbeat = metrics.x_to_beat(ptr.x) - metrics.x_to_beat(drag.start_x);

        if drag.origin.len() == 1 {
            let (t, n) = drag.origin[drag.reference].0;
            if let Some(note) = song.note_mut(t, n) {
                if left {
                    let start = self.snap.snap((ref_origin.start() + dbeat).max(0.0));
                    if start < ref_end {
                        note.set_start(start);
                    }
                } else {
                    let end = self.snap.snap(ref_end + dbeat);
                    if end > ref_origin.start() {
                        note.set_end(end);
                    }
                }
            }
            return;
        }

        let orig_duration = ref_end - ref_origin.start();
        if orig_duration <= 0.0 {
            return;
        }
        let (pivot, ratio) = if left {
            // pivot on the latest end in the selection
            let Some(pivot) = drag.origin.iter()
                .filter_map(|(_, n)| n.end())
                .map(OrderedFloat)
                .max()
            else { return };
            let start = self.snap.snap((ref_origin.start() + dbeat).max(0.0));
            (pivot.0, (ref_end - start) / orig_duration)
        } else {
            // pivot on the earliest start
            let Some(pivot) = drag.origin.iter()
                .map(|(_, n)| OrderedFloat(n.start()))
                .min()
            else { return };
            let end = self.snap.snap(ref_end + dbeat);
            (pivot.0, (end - ref_origin.start()) / orig_duration)
        };
        // a stretch through zero would fold the group over; skip the frame
        if ratio <= 0.0 {
            return;
        }

        for &((t, n), ref origin) in &drag.origin {
            let Some(end0) = origin.end() else { continue };
            if let Some(note) = song.note_mut(t, n) {
                let start = pivot - (pivot - origin.start()) * ratio;
                let end = pivot - (pivot - end0) * ratio;
                *note = Note::new(origin.pitch(), start, Some(end), origin.velocity());
            }
        }
    }

    fn finish_range_select(&mut self, song: &Song, metrics: &Metrics, now_beat: f64,
        drag: &Drag, ptr: Pointer,
    ) {
        let (x0, x1) = (drag.start_x.min(ptr.x), drag.start_x.max(ptr.x));
        let (y0, y1) = (drag.start_y.min(ptr.y), drag.start_y.max(ptr.y));
        let (t0, t1) = (metrics.x_to_beat(x0.max(0.0)), metrics.x_to_beat(x1.max(0.0)));
        let (hi, lo) = (metrics.y_to_pitch(y0.max(0.0)), metrics.y_to_pitch(y1.max(0.0)));

        for track in &song.tracks {
            if !self.visible.contains(track.instrument()) {
                continue;
            }
            for (i, note) in track.notes().iter().enumerate() {
                let end = note.end().unwrap_or(now_beat.max(note.start()));
                let overlaps = note.start() < t1 && end > t0
                    && note.pitch() <= hi && note.pitch() >= lo;
                if overlaps {
                    let mut r = NoteRef::hint(track.instrument(), i);
                    r.refresh(song);
                    if !self.selection.contains(&r) {
                        self.selection.push(r);
                    }
                }
            }
        }
    }

    /// Scroll over a note adjusts its velocity; if the note is selected
    /// the whole selection follows.
    pub fn wheel_velocity(&mut self, song: &mut Song, metrics: &Metrics, now_beat: f64,
        x: f64, y: f64, up: bool,
    ) -> bool {
        let Some((r, _)) = self.topmost_hit(song, metrics, now_beat, x, y) else {
            return false;
        };
        let delta = if up { WHEEL_VELOCITY_STEP } else { -WHEEL_VELOCITY_STEP };
        let targets: Vec<NoteRef> = if self.is_selected(&r) {
            self.selection.clone()
        } else {
            vec![r]
        };
        for t in &targets {
            if let Some(note) = t.get_mut(song) {
                note.adjust_velocity(delta);
            }
        }
        self.commit(song, EditAction::SetVelocity)
    }

    pub fn select_all(&mut self, song: &Song) {
        self.selection.clear();
        for track in &song.tracks {
            if !self.visible.contains(track.instrument()) {
                continue;
            }
            for (i, _) in track.notes().iter().enumerate() {
                let mut r = NoteRef::hint(track.instrument(), i);
                r.refresh(song);
                self.selection.push(r);
            }
        }
    }

    pub fn copy(&mut self, song: &Song) -> bool {
        let notes: Vec<(String, Note)> = self.selection.iter()
            .filter_map(|r| r.get(song).map(|n| (r.instrument().to_owned(), n.clone())))
            .collect();
        if notes.is_empty() {
            return false;
        }
        self.clipboard = Clipboard { notes };
        true
    }

    pub fn cut(&mut self, song: &mut Song) -> bool {
        if !self.copy(song) {
            return false;
        }
        song.remove_notes(&self.selection);
        self.selection.clear();
        self.sync_visibility(song);
        self.commit(song, EditAction::Cut);
        true
    }

    pub fn delete(&mut self, song: &mut Song) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        song.remove_notes(&self.selection);
        self.selection.clear();
        self.sync_visibility(song);
        self.commit(song, EditAction::Delete);
        true
    }

    /// Insert clipboard notes at the playhead, preserving their relative
    /// offsets and source instruments. The paste becomes the selection.
    pub fn paste(&mut self, song: &mut Song, at_beat: f64) -> bool {
        if self.clipboard.is_empty() {
            return false;
        }
        let Some(first) = self.clipboard.notes.iter()
            .map(|(_, n)| OrderedFloat(n.start()))
            .min()
        else {
            return false;
        };
        let dbeat = at_beat - first.0;
        self.selection.clear();
        let notes = self.clipboard.notes.clone();
        for (instrument, note) in &notes {
            let end = note.end().map(|e| e + dbeat);
            let r = song.add_note(instrument, note.pitch(),
                (note.start() + dbeat).max(0.0), end, note.velocity());
            self.selection.push(r);
        }
        self.sync_visibility(song);
        self.commit(song, EditAction::Paste);
        true
    }

    /// Shift the selection in time. Step comes from the modifier state.
    pub fn nudge_time(&mut self, song: &mut Song, mods: Modifiers, right: bool) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let step = nudge_step(mods) * if right { 1.0 } else { -1.0 };
        let slots = self.pin_selection(song);
        for &(t, n) in &slots {
            if let Some(note) = song.note_mut(t, n) {
                note.shift(step);
            }
        }
        self.reselect(song, slots.into_iter());
        self.commit(song, EditAction::NudgeNotes)
    }

    pub fn nudge_pitch(&mut self, song: &mut Song, up: bool) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let step = if up { 1 } else { -1 };
        let slots = self.pin_selection(song);
        for &(t, n) in &slots {
            if let Some(note) = song.note_mut(t, n) {
                note.transpose(step);
            }
        }
        self.reselect(song, slots.into_iter());
        self.commit(song, EditAction::TransposeNotes)
    }

    /// Snap selected note starts to the grid, keeping durations.
    pub fn snap_positions(&mut self, song: &mut Song) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let slots = self.pin_selection(song);
        for &(t, n) in &slots {
            if let Some(note) = song.note_mut(t, n) {
                let start = self.snap.snap(note.start());
                note.shift(start - note.start());
            }
        }
        self.reselect(song, slots.into_iter());
        self.commit(song, EditAction::SnapNotes)
    }

    /// Quantize selected note durations to the grid, each independently.
    /// Durations never shrink below one grid unit.
    pub fn snap_durations(&mut self, song: &mut Song) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let floor = self.snap.grid_unit();
        for r in &self.selection {
            if let Some(note) = r.get_mut(song) {
                if let Some(duration) = note.duration() {
                    let snapped = self.snap.quantize(duration).max(floor);
                    note.set_end(note.start() + snapped);
                }
            }
        }
        self.commit(song, EditAction::SnapNotes)
    }

    /// Move every selected note to another instrument's track.
    pub fn reassign_instrument(&mut self, song: &mut Song, instrument: &str) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let mut moved = Vec::with_capacity(self.selection.len());
        for r in &self.selection {
            if let Some(r) = song.move_note_to_track(r, instrument) {
                moved.push(r);
            }
        }
        self.selection = moved;
        self.sync_visibility(song);
        self.commit(song, EditAction::ReassignInstrument)
    }

    pub fn set_velocity(&mut self, song: &mut Song, velocity: u8) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        for r in &self.selection {
            if let Some(note) = r.get_mut(song) {
                note.set_velocity(velocity);
            }
        }
        self.commit(song, EditAction::SetVelocity)
    }

    pub fn set_tempo(&mut self, song: &mut Song, bpm: f64) -> bool {
        song.bpm = bpm.clamp(1.0, 999.0);
        self.commit(song, EditAction::SetTempo)
    }

    pub fn set_meter(&mut self, song: &mut Song, beats_per_measure: u8) -> bool {
        song.beats_per_measure = beats_per_measure.max(1);
        self.commit(song, EditAction::SetMeter)
    }

    /// Replace the whole document from a loaded save. History restarts at
    /// the imported state.
    pub fn import(&mut self, song: &mut Song, loaded: Song) {
        *song = loaded;
        self.selection.clear();
        self.visible = Self::track_set(song);
        self.known = self.visible.clone();
        self.history.reset(song);
    }

    /// Pin the selection to concrete positions before a batch edit that
    /// changes pitch or start. Mutating through the references instead
    /// would drift their identity mid-batch and duplicates could hijack
    /// the re-resolution.
    fn pin_selection(&self, song: &Song) -> Vec<(usize, usize)> {
        self.selection.iter().filter_map(|r| song.resolve(r)).collect()
    }

    /// Rebuild the selection from pinned positions after the edit.
    fn reselect(&mut self, song: &Song, slots: impl Iterator<Item = (usize, usize)>) {
        self.selection = slots
            .filter_map(|(t, n)| song.reference(t, n))
            .collect();
    }

    /// Keyboard command dispatch.
    pub fn action(&mut self, action: Action, song: &mut Song, mods: Modifiers,
        player: &mut Player, sink: &mut impl AudioSink,
    ) {
        match action {
            Action::Undo => { self.undo(song); }
            Action::Redo => { self.redo(song); }
            Action::Copy => { self.copy(song); }
            Action::Cut => { self.cut(song); }
            Action::Paste => { self.paste(song, player.beat()); }
            Action::Delete => { self.delete(song); }
            Action::SelectAll => self.select_all(song),
            Action::NudgeLeft => { self.nudge_time(song, mods, false); }
            Action::NudgeRight => { self.nudge_time(song, mods, true); }
            Action::NudgeUp => { self.nudge_pitch(song, true); }
            Action::NudgeDown => { self.nudge_pitch(song, false); }
            Action::SnapPositions => { self.snap_positions(song); }
            Action::SnapDurations => { self.snap_durations(song); }
            Action::TogglePlayback => {
                if player.is_playing() {
                    player.pause(sink);
                } else {
                    player.play(song);
                }
            }
            Action::Stop => player.stop(sink),
        }
    }
}
