//! Authoritative note/track model. Tracks exist only while they hold notes;
//! exactly one track per instrument id.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub const MAX_PITCH: u8 = 127;
pub const MAX_VELOCITY: u8 = 100;
pub const DEFAULT_VELOCITY: u8 = 100;
pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_BEATS_PER_MEASURE: u8 = 4;

/// Tolerance for matching a note by its recorded start beat.
const IDENTITY_EPSILON: f64 = 1e-6;

/// A recorded note. `end` is `None` while the key is still held during
/// recording. Pitch and velocity are clamped on every mutation path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pitch: u8,
    start: f64,
    end: Option<f64>,
    velocity: u8,
}

impl Note {
    pub fn new(pitch: u8, start: f64, end: Option<f64>, velocity: u8) -> Self {
        let start = start.max(0.0);
        Self {
            pitch: pitch.min(MAX_PITCH),
            start,
            end: end.map(|e| e.max(start)),
            velocity: velocity.min(MAX_VELOCITY),
        }
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn duration(&self) -> Option<f64> {
        self.end.map(|e| e - self.start)
    }

    pub fn set_pitch(&mut self, pitch: u8) {
        self.pitch = pitch.min(MAX_PITCH);
    }

    /// Shift pitch by a signed amount, clamping at the ends of the range.
    pub fn transpose(&mut self, semitones: i16) {
        let p = self.pitch as i16 + semitones;
        self.pitch = p.clamp(0, MAX_PITCH as i16) as u8;
    }

    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity = velocity.min(MAX_VELOCITY);
    }

    pub fn adjust_velocity(&mut self, delta: i16) {
        let v = self.velocity as i16 + delta;
        self.velocity = v.clamp(0, MAX_VELOCITY as i16) as u8;
    }

    /// Move the start without moving the end. Clamps at zero and at the
    /// end beat, preserving `end >= start`.
    pub fn set_start(&mut self, start: f64) {
        let max = self.end.unwrap_or(f64::INFINITY);
        self.start = start.clamp(0.0, max);
    }

    /// Move the end without moving the start.
    pub fn set_end(&mut self, end: f64) {
        self.end = Some(end.max(self.start));
    }

    pub fn close(&mut self, end: f64) {
        if self.end.is_none() {
            self.end = Some(end.max(self.start));
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Translate in time. The start clamps at zero independently of the
    /// requested delta; the end keeps its distance where possible.
    pub fn shift(&mut self, dbeats: f64) {
        self.start = (self.start + dbeats).max(0.0);
        self.end = self.end.map(|e| (e + dbeats).max(self.start));
    }
}

/// One instrument's notes, in recording order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    instrument: String,
    notes: Vec<Note>,
}

impl Track {
    fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_owned(),
            notes: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut [Note] {
        &mut self.notes
    }

    pub fn push(&mut self, note: Note) {
        self.notes.push(note);
    }
}

/// Stable handle to a note. The index is a hint; the recorded pitch and
/// start beat are the note's identity, used to re-resolve after structural
/// edits shift indices.
#[derive(Clone, Debug)]
pub struct NoteRef {
    instrument: String,
    index: usize,
    pitch: u8,
    start: f64,
}

impl PartialEq for NoteRef {
    fn eq(&self, other: &Self) -> bool {
        self.instrument == other.instrument && self.index == other.index
    }
}

impl NoteRef {
    /// Reference by position only. The identity fields are unset until
    /// `refresh` captures them from the resolved note.
    pub(crate) fn hint(instrument: &str, index: usize) -> Self {
        Self {
            instrument: instrument.to_owned(),
            index,
            pitch: 0,
            start: f64::NAN,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    fn matches(&self, note: &Note) -> bool {
        note.pitch() == self.pitch && (note.start() - self.start).abs() < IDENTITY_EPSILON
    }

    /// Read-through accessor.
    pub fn get<'a>(&self, song: &'a Song) -> Option<&'a Note> {
        let (t, n) = song.resolve(self)?;
        Some(&song.tracks[t].notes[n])
    }

    /// Write-through accessor for edits that keep pitch and start. An
    /// edit that changes either should pin the position first (`resolve`
    /// then `note_mut`): once the identity drifts, re-resolving can land
    /// on a duplicate note that shares the recorded pitch and start.
    pub fn get_mut<'a>(&self, song: &'a mut Song) -> Option<&'a mut Note> {
        let (t, n) = song.resolve(self)?;
        Some(&mut song.tracks[t].notes[n])
    }

    /// Re-capture identity from the currently resolved note.
    pub fn refresh(&mut self, song: &Song) {
        if let Some((t, n)) = song.resolve(self) {
            let note = &song.tracks[t].notes[n];
            self.index = n;
            self.pitch = note.pitch();
            self.start = note.start();
        }
    }
}

/// The full editable document: all tracks plus tempo and meter. This is
/// also the unit the history manager snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub tracks: Vec<Track>,
    pub bpm: f64,
    pub beats_per_measure: u8,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            bpm: DEFAULT_BPM,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
        }
    }
}

impl Song {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, instrument: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.instrument == instrument)
    }

    fn track_index(&self, instrument: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.instrument == instrument)
    }

    /// Tracks are created implicitly on first use and pruned when emptied.
    pub fn get_or_create_track(&mut self, instrument: &str) -> &mut Track {
        match self.track_index(instrument) {
            Some(i) => &mut self.tracks[i],
            None => {
                self.tracks.push(Track::new(instrument));
                let i = self.tracks.len() - 1;
                &mut self.tracks[i]
            }
        }
    }

    pub fn add_note(&mut self, instrument: &str, pitch: u8, start: f64,
        end: Option<f64>, velocity: u8,
    ) -> NoteRef {
        let note = Note::new(pitch, start, end, velocity);
        let identity = (note.pitch(), note.start());
        let track = self.get_or_create_track(instrument);
        track.notes.push(note);
        NoteRef {
            instrument: instrument.to_owned(),
            index: track.notes.len() - 1,
            pitch: identity.0,
            start: identity.1,
        }
    }

    /// Resolve a reference to concrete indices. The stored index is trusted
    /// only if the note there still matches the recorded identity;
    /// otherwise the track is searched, then the whole store (the note may
    /// have moved tracks since the reference was taken).
    pub fn resolve(&self, r: &NoteRef) -> Option<(usize, usize)> {
        if let Some(t) = self.track_index(&r.instrument) {
            let notes = &self.tracks[t].notes;
            if notes.get(r.index).is_some_and(|n| r.matches(n)) {
                return Some((t, r.index));
            }
            if let Some(n) = notes.iter().position(|n| r.matches(n)) {
                return Some((t, n));
            }
        }
        for (t, track) in self.tracks.iter().enumerate() {
            if let Some(n) = track.notes.iter().position(|n| r.matches(n)) {
                return Some((t, n));
            }
        }
        // no identity match anywhere. the reference is a bare position
        // hint, so the stored index is taken as is.
        let t = self.track_index(&r.instrument)?;
        if r.index < self.tracks[t].notes.len() {
            Some((t, r.index))
        } else {
            None
        }
    }

    /// Direct access by resolved position. For edits that pin notes down
    /// once and then mutate them across several frames; positions stay
    /// valid only while nothing structural happens.
    pub fn note(&self, track: usize, note: usize) -> Option<&Note> {
        self.tracks.get(track)?.notes.get(note)
    }

    pub fn note_mut(&mut self, track: usize, note: usize) -> Option<&mut Note> {
        self.tracks.get_mut(track)?.notes.get_mut(note)
    }

    /// A fresh reference to the note at a position, carrying its current
    /// identity.
    pub fn reference(&self, track: usize, note: usize) -> Option<NoteRef> {
        let t = self.tracks.get(track)?;
        let n = t.notes.get(note)?;
        Some(NoteRef {
            instrument: t.instrument.clone(),
            index: note,
            pitch: n.pitch(),
            start: n.start(),
        })
    }

    /// Remove all referenced notes, then prune any tracks left empty.
    /// Removal is per-track in descending index order so earlier removals
    /// can't shift later ones.
    pub fn remove_notes(&mut self, refs: &[NoteRef]) {
        let mut indices: Vec<(usize, usize)> =
            refs.iter().filter_map(|r| self.resolve(r)).collect();
        indices.sort();
        indices.dedup();
        for (t, n) in indices.into_iter().rev() {
            self.tracks[t].notes.remove(n);
        }
        self.prune_empty_tracks();
    }

    /// Reassign a note to another instrument, preserving pitch, time and
    /// velocity. Prunes the source track if this emptied it.
    pub fn move_note_to_track(&mut self, r: &NoteRef, instrument: &str) -> Option<NoteRef> {
        let (t, n) = self.resolve(r)?;
        if self.tracks[t].instrument == instrument {
            return Some(r.clone());
        }
        let note = self.tracks[t].notes.remove(n);
        let identity = (note.pitch(), note.start());
        let track = self.get_or_create_track(instrument);
        track.notes.push(note);
        let index = track.notes.len() - 1;
        self.prune_empty_tracks();
        Some(NoteRef {
            instrument: instrument.to_owned(),
            index,
            pitch: identity.0,
            start: identity.1,
        })
    }

    pub fn total_note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// End beat of the last note, or zero for an empty song.
    pub fn length_beats(&self) -> f64 {
        self.tracks.iter()
            .flat_map(|t| t.notes.iter())
            .filter_map(|n| n.end())
            .map(OrderedFloat)
            .max()
            .map_or(0.0, |m| m.0)
    }

    pub fn prune_empty_tracks(&mut self) {
        self.tracks.retain(|t| !t.notes.is_empty());
    }
}
