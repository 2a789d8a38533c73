//! Mapping between beats/pitches and piano-roll pixels. All hit testing
//! goes through here so the edit code never touches raw pixels.

use crate::song::{Note, MAX_PITCH};

/// Distance from a note edge, in pixels, inside which a press grabs the
/// edge for resizing rather than the body for moving.
pub const EDGE_MARGIN: f64 = 5.0;

/// Pointer travel, in pixels, below which a press-release counts as a
/// click rather than a drag.
pub const CLICK_SLOP: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

/// Where on a note a press landed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoteZone {
    LeftEdge,
    Body,
    RightEdge,
}

/// View scale. Horizontal position is proportional to wall-clock time at
/// the current tempo, so changing the bpm rescales the roll.
#[derive(Clone, Copy, Debug)]
pub struct Metrics {
    pub pixels_per_second: f64,
    pub row_height: f64,
    pub bpm: f64,
}

impl Metrics {
    pub fn new(pixels_per_second: f64, row_height: f64, bpm: f64) -> Self {
        Self { pixels_per_second, row_height, bpm }
    }

    pub fn beat_to_x(&self, beat: f64) -> f64 {
        beat * 60.0 / self.bpm * self.pixels_per_second
    }

    pub fn x_to_beat(&self, x: f64) -> f64 {
        x / self.pixels_per_second * self.bpm / 60.0
    }

    /// Highest pitch is the top row.
    pub fn pitch_to_y(&self, pitch: u8) -> f64 {
        (MAX_PITCH - pitch.min(MAX_PITCH)) as f64 * self.row_height
    }

    pub fn y_to_pitch(&self, y: f64) -> u8 {
        let row = (y / self.row_height).floor();
        let row = row.clamp(0.0, MAX_PITCH as f64) as u8;
        MAX_PITCH - row
    }

    /// Bounding rect of a note. Open notes extend to `now_beat`.
    pub fn note_rect(&self, note: &Note, now_beat: f64) -> Rect {
        let x = self.beat_to_x(note.start());
        let end = note.end().unwrap_or(now_beat.max(note.start()));
        Rect {
            x,
            y: self.pitch_to_y(note.pitch()),
            w: self.beat_to_x(end) - x,
            h: self.row_height,
        }
    }

    /// Which part of the note a point hits, if any. Edge zones only exist
    /// when the note is wide enough to leave a body between them.
    pub fn hit_test(&self, note: &Note, now_beat: f64, x: f64, y: f64) -> Option<NoteZone> {
        let rect = self.note_rect(note, now_beat);
        if !rect.contains(x, y) {
            return None;
        }
        if rect.w > EDGE_MARGIN * 2.0 {
            if x < rect.x + EDGE_MARGIN {
                return Some(NoteZone::LeftEdge);
            }
            if x > rect.x + rect.w - EDGE_MARGIN {
                return Some(NoteZone::RightEdge);
            }
        }
        Some(NoteZone::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Metrics {
        // 100 px/s at 120 bpm puts one beat at 50 px
        Metrics::new(100.0, 10.0, 120.0)
    }

    #[test]
    fn test_beat_x_round_trip() {
        let m = metrics();
        assert_eq!(m.beat_to_x(1.0), 50.0);
        assert_eq!(m.x_to_beat(50.0), 1.0);
        assert!((m.x_to_beat(m.beat_to_x(3.7)) - 3.7).abs() < 1e-12);
    }

    #[test]
    fn test_pitch_rows() {
        let m = metrics();
        assert_eq!(m.pitch_to_y(127), 0.0);
        assert_eq!(m.pitch_to_y(0), 1270.0);
        assert_eq!(m.y_to_pitch(5.0), 127);
        assert_eq!(m.y_to_pitch(1275.0), 0);
    }

    #[test]
    fn test_hit_zones() {
        let m = metrics();
        let note = Note::new(60, 1.0, Some(2.0), 100);
        let y = m.pitch_to_y(60) + 5.0;
        // note spans x 50..100
        assert_eq!(m.hit_test(&note, 0.0, 52.0, y), Some(NoteZone::LeftEdge));
        assert_eq!(m.hit_test(&note, 0.0, 75.0, y), Some(NoteZone::Body));
        assert_eq!(m.hit_test(&note, 0.0, 97.0, y), Some(NoteZone::RightEdge));
        assert_eq!(m.hit_test(&note, 0.0, 120.0, y), None);
        assert_eq!(m.hit_test(&note, 0.0, 75.0, y + 100.0), None);
    }

    #[test]
    fn test_narrow_note_is_all_body() {
        let m = metrics();
        let note = Note::new(60, 1.0, Some(1.1), 100);
        let y = m.pitch_to_y(60) + 5.0;
        assert_eq!(m.hit_test(&note, 0.0, 51.0, y), Some(NoteZone::Body));
    }
}
