//! Standard MIDI File export. Writes format 1: a tempo map track followed
//! by one track per melodic instrument, with all percussion instruments
//! merged onto the drum channel in a single track.

use crate::error::Error;
use crate::instrument::{InstrumentMap, DRUM_CHANNEL};
use crate::song::{Song, Track};

pub const PPQN: u32 = 480;

const META: u8 = 0xFF;
const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;
const META_TIME_SIG: u8 = 0x58;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const PROGRAM_CHANGE: u8 = 0xC0;

/// Melodic channels in assignment order. The drum channel is reserved,
/// so sixteen channels leave fifteen for melodic tracks before reuse.
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

fn ticks(beat: f64) -> u32 {
    (beat * PPQN as f64).round() as u32
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Variable-length quantity: seven bits per byte, high bit set on all but
/// the last byte.
fn push_vlq(out: &mut Vec<u8>, value: u32) {
    let mut shifted = [value & 0x7F, 0, 0, 0, 0];
    let mut n = 1;
    let mut rest = value >> 7;
    while rest > 0 {
        shifted[n] = (rest & 0x7F) | 0x80;
        rest >>= 7;
        n += 1;
    }
    for i in (0..n).rev() {
        out.push(shifted[i] as u8);
    }
}

/// Accumulates one MTrk chunk. Event times are absolute ticks; deltas are
/// computed as events are appended, so append in time order.
struct TrackChunk {
    data: Vec<u8>,
    last_tick: u32,
}

impl TrackChunk {
    fn new() -> Self {
        Self { data: Vec::new(), last_tick: 0 }
    }

    fn event(&mut self, tick: u32, bytes: &[u8]) {
        push_vlq(&mut self.data, tick.saturating_sub(self.last_tick));
        self.data.extend_from_slice(bytes);
        self.last_tick = tick;
    }

    fn meta(&mut self, tick: u32, kind: u8, payload: &[u8]) {
        push_vlq(&mut self.data, tick.saturating_sub(self.last_tick));
        self.data.push(META);
        self.data.push(kind);
        push_vlq(&mut self.data, payload.len() as u32);
        self.data.extend_from_slice(payload);
        self.last_tick = tick;
    }

    fn finish(mut self, out: &mut Vec<u8>) {
        self.meta(self.last_tick, META_END_OF_TRACK, &[]);
        out.extend_from_slice(b"MTrk");
        push_u32(out, self.data.len() as u32);
        out.extend_from_slice(&self.data);
    }
}

/// A channel event at an absolute tick, before delta encoding.
type Event = (u32, [u8; 3]);

/// Note on/off pairs for one track. Open notes are still being recorded;
/// they export as zero-length.
fn collect_events(track: &Track, channel: u8, events: &mut Vec<Event>) {
    for note in track.notes() {
        let on = ticks(note.start());
        let off = note.end().map_or(on, ticks).max(on);
        events.push((on, [NOTE_ON | channel, note.pitch(), note.velocity()]));
        events.push((off, [NOTE_OFF | channel, note.pitch(), 0]));
    }
}

fn tempo_track(song: &Song, out: &mut Vec<u8>) {
    let mut chunk = TrackChunk::new();
    let usec_per_beat = (60_000_000.0 / song.bpm).round() as u32;
    chunk.meta(0, META_TEMPO, &usec_per_beat.to_be_bytes()[1..]);
    // denominator is fixed at quarter notes: 2^2
    chunk.meta(0, META_TIME_SIG, &[song.beats_per_measure, 2, 24, 8]);
    chunk.finish(out);
}

fn note_track(name: &str, program: Option<u8>, channel: u8,
    mut events: Vec<Event>, out: &mut Vec<u8>,
) {
    events.sort_by_key(|(tick, _)| *tick);
    let mut chunk = TrackChunk::new();
    if let Some(program) = program {
        chunk.event(0, &[PROGRAM_CHANGE | channel, program]);
    }
    chunk.meta(0, META_TRACK_NAME, name.as_bytes());
    for (tick, bytes) in events {
        chunk.event(tick, &bytes);
    }
    chunk.finish(out);
}

/// Encode the song as a format 1 SMF. Fails if there is nothing to
/// export; no bytes are produced in that case.
pub fn export(song: &Song, instruments: &InstrumentMap) -> Result<Vec<u8>, Error> {
    if song.tracks.is_empty() {
        return Err(Error::NothingToExport);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    push_u32(&mut out, 6);
    push_u16(&mut out, 1);
    push_u16(&mut out, 0); // track count, patched below
    push_u16(&mut out, PPQN as u16);

    let mut track_count: u16 = 1;
    tempo_track(song, &mut out);

    let mut melodic = 0;
    let mut drum_events: Vec<Event> = Vec::new();
    for track in &song.tracks {
        if instruments.is_percussion(track.instrument()) {
            collect_events(track, DRUM_CHANNEL, &mut drum_events);
        } else {
            let channel = MELODIC_CHANNELS[melodic % MELODIC_CHANNELS.len()];
            melodic += 1;
            let mut events = Vec::with_capacity(track.notes().len() * 2);
            collect_events(track, channel, &mut events);
            let program = instruments.program(track.instrument());
            note_track(&instruments.display_name(track.instrument()),
                Some(program), channel, events, &mut out);
            track_count += 1;
        }
    }
    if !drum_events.is_empty() {
        note_track("Drums", None, DRUM_CHANNEL, drum_events, &mut out);
        track_count += 1;
    }

    out[10..12].copy_from_slice(&track_count.to_be_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        push_vlq(&mut out, value);
        out
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_vlq_encoding() {
        assert_eq!(vlq(0), vec![0x00]);
        assert_eq!(vlq(0x7F), vec![0x7F]);
        assert_eq!(vlq(0x80), vec![0x81, 0x00]);
        assert_eq!(vlq(480), vec![0x83, 0x60]);
        assert_eq!(vlq(0x3FFF), vec![0xFF, 0x7F]);
        assert_eq!(vlq(0x4000), vec![0x81, 0x80, 0x00]);
        assert_eq!(vlq(0x0FFF_FFFF), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_empty_song_rejected() {
        let song = Song::new();
        assert!(matches!(export(&song, &InstrumentMap::new()),
            Err(Error::NothingToExport)));
    }

    #[test]
    fn test_single_piano_note() {
        let mut song = Song::new();
        song.bpm = 120.0;
        song.add_note("piano", 60, 0.0, Some(1.0), 100);
        let bytes = export(&song, &InstrumentMap::new()).unwrap();

        // header: format 1, two tracks, 480 ppqn
        assert_eq!(&bytes[..14], &[
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06,
            0x00, 0x01, 0x00, 0x02, 0x01, 0xE0,
        ]);
        // 120 bpm is 500000 us per beat
        assert!(contains(&bytes, &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]));
        assert!(contains(&bytes, &[0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08]));
        // program change, note on at delta 0, note off one beat later
        assert!(contains(&bytes, &[0x00, 0xC0, 0x00]));
        assert!(contains(&bytes, &[0x00, 0x90, 60, 100, 0x83, 0x60, 0x80, 60, 0]));
    }

    #[test]
    fn test_percussion_merged_on_drum_channel() {
        let mut song = Song::new();
        song.add_note("percussionKick", 36, 0.0, Some(0.5), 100);
        song.add_note("percussionSnare", 38, 1.0, Some(1.5), 90);
        let bytes = export(&song, &InstrumentMap::new()).unwrap();

        // tempo track plus a single merged drum track
        assert_eq!(&bytes[10..12], &[0x00, 0x02]);
        assert!(contains(&bytes, &[0x99, 36, 100]));
        assert!(contains(&bytes, &[0x99, 38, 90]));
        assert!(contains(&bytes, &[0x89, 36, 0]));
        assert!(contains(&bytes, b"Drums"));
    }

    #[test]
    fn test_melodic_channels_skip_drums() {
        let mut song = Song::new();
        for i in 0..11 {
            song.add_note(&format!("inst{i}"), 60, 0.0, Some(1.0), 100);
        }
        let bytes = export(&song, &InstrumentMap::new()).unwrap();
        // the tenth melodic track lands on channel 10, not 9
        assert!(contains(&bytes, &[0x90 | 10, 60, 100]));
        assert!(!contains(&bytes, &[0x90 | 9, 60, 100]));
    }

    #[test]
    fn test_reparses_with_midly() {
        use midly::{Format, Smf, Timing, TrackEventKind, MidiMessage};

        let mut song = Song::new();
        song.bpm = 90.0;
        song.add_note("piano", 60, 0.0, Some(1.0), 100);
        song.add_note("piano", 64, 1.0, Some(2.0), 80);
        song.add_note("percussionKit", 36, 0.0, Some(0.5), 100);
        let bytes = export(&song, &InstrumentMap::new()).unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(midly::num::u15::new(480)));
        assert_eq!(smf.tracks.len(), 3);

        let mut tick = 0u32;
        let mut ons = Vec::new();
        for event in &smf.tracks[1] {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { message: MidiMessage::NoteOn { key, vel }, .. }
                = event.kind
            {
                ons.push((tick, key.as_int(), vel.as_int()));
            }
        }
        assert_eq!(ons, vec![(0, 60, 100), (480, 64, 80)]);
    }

    #[test]
    fn test_open_note_exports_zero_length() {
        let mut song = Song::new();
        song.add_note("piano", 60, 1.0, None, 100);
        let bytes = export(&song, &InstrumentMap::new()).unwrap();
        assert!(contains(&bytes, &[0x90, 60, 100, 0x00, 0x80, 60, 0]));
    }
}
