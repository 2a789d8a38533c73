//! Native JSON save format. Serde mirror types keep the wire field names
//! independent of the in-memory model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::song::{Note, Song, DEFAULT_BEATS_PER_MEASURE, DEFAULT_BPM};

#[derive(Serialize, Deserialize)]
struct SaveData {
    tracks: Vec<SaveTrack>,
    #[serde(default = "default_bpm")]
    bpm: f64,
    #[serde(rename = "beatsPerMeasure", default = "default_meter")]
    beats_per_measure: u8,
    timestamp: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SaveTrack {
    instrument: String,
    notes: Vec<SaveNote>,
}

#[derive(Serialize, Deserialize)]
struct SaveNote {
    #[serde(rename = "midiNote")]
    midi_note: u8,
    #[serde(rename = "startTime")]
    start_time: f64,
    #[serde(rename = "endTime")]
    end_time: Option<f64>,
    velocity: u8,
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

fn default_meter() -> u8 {
    DEFAULT_BEATS_PER_MEASURE
}

pub fn to_json(song: &Song, now: DateTime<Utc>) -> Result<String, Error> {
    let data = SaveData {
        tracks: song.tracks.iter().map(|t| SaveTrack {
            instrument: t.instrument().to_owned(),
            notes: t.notes().iter().map(|n| SaveNote {
                midi_note: n.pitch(),
                start_time: n.start(),
                end_time: n.end(),
                velocity: n.velocity(),
            }).collect(),
        }).collect(),
        bpm: song.bpm,
        beats_per_measure: song.beats_per_measure,
        timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

/// Parse a save document into a fresh song. Any shape problem is reported
/// as an invalid-format error without touching existing state; the caller
/// only swaps the song in on success.
pub fn from_json(text: &str) -> Result<Song, Error> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::InvalidFormat(e.to_string()))?;
    if !value.get("tracks").is_some_and(|t| t.is_array()) {
        return Err(Error::InvalidFormat("missing tracks list".to_owned()));
    }
    let data: SaveData = serde_json::from_value(value)
        .map_err(|e| Error::InvalidFormat(e.to_string()))?;

    let mut song = Song::new();
    song.bpm = data.bpm;
    song.beats_per_measure = data.beats_per_measure;
    for track in &data.tracks {
        for n in &track.notes {
            // Note::new clamps out-of-range values from hand-edited files
            song.get_or_create_track(&track.instrument)
                .push(Note::new(n.midi_note, n.start_time, n.end_time, n.velocity));
        }
    }
    song.prune_empty_tracks();
    Ok(song)
}

/// Timestamped filename, colons replaced so it is valid on any filesystem.
fn stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true).replace(':', "-")
}

pub fn save_filename(now: DateTime<Utc>) -> String {
    format!("midi-recording-{}.json", stamp(now))
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("keys-midi-export-{}.mid", stamp(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn song() -> Song {
        let mut song = Song::new();
        song.bpm = 90.0;
        song.beats_per_measure = 3;
        song.add_note("piano", 60, 0.0, Some(1.0), 100);
        song.add_note("bass", 40, 0.5, Some(2.5), 80);
        song
    }

    #[test]
    fn test_round_trip() {
        let original = song();
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let text = to_json(&original, now).unwrap();
        let loaded = from_json(&text).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_wire_field_names() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let text = to_json(&song(), now).unwrap();
        for field in ["midiNote", "startTime", "endTime", "beatsPerMeasure", "timestamp"] {
            assert!(text.contains(field), "missing field {field}");
        }
    }

    #[test]
    fn test_invalid_documents_rejected() {
        for doc in ["not json", "{}", r#"{"tracks": 5}"#, r#"{"bpm": 120}"#] {
            assert!(matches!(from_json(doc), Err(Error::InvalidFormat(_))));
        }
    }

    #[test]
    fn test_defaults_and_open_notes() {
        let doc = r#"{"tracks": [{"instrument": "piano",
            "notes": [{"midiNote": 60, "startTime": 0, "endTime": null, "velocity": 100}]}]}"#;
        let song = from_json(doc).unwrap();
        assert_eq!(song.bpm, DEFAULT_BPM);
        assert_eq!(song.beats_per_measure, DEFAULT_BEATS_PER_MEASURE);
        assert!(song.track("piano").unwrap().notes()[0].is_open());
    }

    #[test]
    fn test_filenames() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 30, 0).unwrap();
        let name = save_filename(now);
        assert!(name.starts_with("midi-recording-2026-08-28T12-30-00"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains(':'));
        assert!(export_filename(now).ends_with(".mid"));
    }
}
