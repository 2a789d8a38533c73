//! Frame-driven playback and live recording. The host calls `frame` once
//! per animation tick; everything here is single-threaded.

use std::collections::HashMap;
use std::error::Error;

use crate::config::Config;
use crate::song::{NoteRef, Song};

/// Output device boundary. Implementations talk to whatever synth or MIDI
/// backend the host provides; failures are logged and playback carries on.
pub trait AudioSink {
    /// `retrigger` allows restarting a pitch that is already sounding on
    /// the same instrument, as happens when playback sweeps repeated notes.
    fn play_note(&mut self, instrument: &str, pitch: u8, velocity: u8,
        retrigger: bool) -> Result<(), Box<dyn Error>>;
    fn stop_note(&mut self, instrument: &str, pitch: u8) -> Result<(), Box<dyn Error>>;
    /// Metronome click. `downbeat` marks the first beat of a measure.
    fn click(&mut self, downbeat: bool) -> Result<(), Box<dyn Error>>;
}

fn send(result: Result<(), Box<dyn Error>>, what: &str) {
    if let Err(e) = result {
        log::warn!("audio sink failed to {}: {}", what, e);
    }
}

/// Playback engine and recording state. Owns the playhead; the song stays
/// outside and is passed into each call.
pub struct Player {
    playing: bool,
    recording: bool,
    beat: f64,
    metronome: bool,
    sounding: Vec<(String, u8)>,
    /// Notes currently held down while recording.
    open_notes: HashMap<u8, NoteRef>,
    /// Released while the sustain pedal was down; closed on pedal release.
    pending_releases: Vec<u8>,
    sustain: bool,
}

impl Player {
    pub fn new() -> Self {
        Self {
            playing: false,
            recording: false,
            beat: 0.0,
            metronome: false,
            sounding: Vec::new(),
            open_notes: HashMap::new(),
            pending_releases: Vec::new(),
            sustain: false,
        }
    }

    /// Like `new`, with the metronome starting in its configured state.
    pub fn from_config(config: &Config) -> Self {
        let mut player = Self::new();
        player.metronome = config.metronome.unwrap_or(false);
        player
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn beat(&self) -> f64 {
        self.beat
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.metronome = on;
    }

    /// Advance the playhead by a wall-clock interval, firing every note
    /// boundary it crosses. Does nothing while paused.
    pub fn frame(&mut self, song: &Song, dt: f64, sink: &mut impl AudioSink) {
        if !self.playing && !self.recording {
            return;
        }
        let old = self.beat;
        let new = old + dt * song.bpm / 60.0;
        self.beat = new;

        if self.playing {
            for track in &song.tracks {
                for note in track.notes() {
                    if note.start() >= old && note.start() < new {
                        send(sink.play_note(track.instrument(), note.pitch(),
                            note.velocity(), true), "start note");
                        self.sounding.push((track.instrument().to_owned(), note.pitch()));
                    }
                    if let Some(end) = note.end() {
                        if end >= old && end < new {
                            send(sink.stop_note(track.instrument(), note.pitch()), "stop note");
                            self.sounding.retain(|(i, p)|
                                !(i == track.instrument() && *p == note.pitch()));
                        }
                    }
                }
            }
        }

        if self.metronome {
            let beat = old.ceil();
            if beat >= old && beat < new {
                let downbeat = song.beats_per_measure > 0
                    && (beat as u64) % song.beats_per_measure as u64 == 0;
                send(sink.click(downbeat), "click");
            }
        }

        // past the last note with nothing sounding, playback stops itself
        if self.playing && !self.recording
            && new > song.length_beats() && self.sounding.is_empty()
        {
            self.playing = false;
        }
    }

    /// Start playback from the current playhead. A no-op when no note
    /// starts or ends at or after the playhead.
    pub fn play(&mut self, song: &Song) -> bool {
        let anything_ahead = song.tracks.iter()
            .flat_map(|t| t.notes().iter())
            .any(|n| n.start() >= self.beat || n.end().is_some_and(|e| e >= self.beat));
        if !anything_ahead {
            return false;
        }
        self.playing = true;
        true
    }

    pub fn pause(&mut self, sink: &mut impl AudioSink) {
        self.playing = false;
        self.release_sounding(sink);
    }

    /// Stop and rewind to the beginning.
    pub fn stop(&mut self, sink: &mut impl AudioSink) {
        self.playing = false;
        self.beat = 0.0;
        self.release_sounding(sink);
    }

    pub fn seek(&mut self, beat: f64, sink: &mut impl AudioSink) {
        self.release_sounding(sink);
        self.beat = beat.max(0.0);
    }

    fn release_sounding(&mut self, sink: &mut impl AudioSink) {
        for (instrument, pitch) in self.sounding.drain(..) {
            send(sink.stop_note(&instrument, pitch), "stop note");
        }
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    /// End recording, closing anything still held or sustained. Returns
    /// true if any notes are left open no longer (i.e. the song changed).
    pub fn stop_recording(&mut self, song: &mut Song) -> bool {
        let had_open = !self.open_notes.is_empty() || !self.pending_releases.is_empty();
        self.pending_releases.clear();
        for (_, r) in self.open_notes.drain() {
            if let Some(note) = r.get_mut(song) {
                note.close(self.beat);
            }
        }
        self.recording = false;
        self.sustain = false;
        had_open
    }

    /// A key went down while recording. Re-striking a pitch that is only
    /// held by the sustain pedal closes the old note first.
    pub fn record_note_on(&mut self, song: &mut Song, instrument: &str,
        pitch: u8, velocity: u8, sink: &mut impl AudioSink,
    ) {
        send(sink.play_note(instrument, pitch, velocity, false), "start note");
        if !self.recording {
            return;
        }
        if let Some(pos) = self.pending_releases.iter().position(|p| *p == pitch) {
            self.pending_releases.remove(pos);
            self.close_open(song, pitch);
        }
        let r = song.add_note(instrument, pitch, self.beat, None, velocity);
        self.open_notes.insert(pitch, r);
    }

    /// A key came up. With the sustain pedal down the note keeps ringing
    /// until the pedal is released.
    pub fn record_note_off(&mut self, song: &mut Song, pitch: u8,
        sink: &mut impl AudioSink,
    ) {
        if !self.recording {
            return;
        }
        if let Some(r) = self.open_notes.get(&pitch) {
            if self.sustain {
                if !self.pending_releases.contains(&pitch) {
                    self.pending_releases.push(pitch);
                }
                return;
            }
            send(sink.stop_note(r.instrument(), pitch), "stop note");
            self.close_open(song, pitch);
        }
    }

    pub fn set_sustain(&mut self, song: &mut Song, down: bool, sink: &mut impl AudioSink) {
        self.sustain = down;
        if !down {
            for pitch in std::mem::take(&mut self.pending_releases) {
                if let Some(r) = self.open_notes.get(&pitch) {
                    send(sink.stop_note(r.instrument(), pitch), "stop note");
                }
                self.close_open(song, pitch);
            }
        }
    }

    fn close_open(&mut self, song: &mut Song, pitch: u8) {
        if let Some(r) = self.open_notes.remove(&pitch) {
            if let Some(note) = r.get_mut(song) {
                note.close(self.beat);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestSink {
        events: Vec<String>,
    }

    impl AudioSink for TestSink {
        fn play_note(&mut self, instrument: &str, pitch: u8, velocity: u8,
            _retrigger: bool) -> Result<(), Box<dyn Error>>
        {
            self.events.push(format!("on {instrument} {pitch} {velocity}"));
            Ok(())
        }

        fn stop_note(&mut self, instrument: &str, pitch: u8) -> Result<(), Box<dyn Error>> {
            self.events.push(format!("off {instrument} {pitch}"));
            Ok(())
        }

        fn click(&mut self, downbeat: bool) -> Result<(), Box<dyn Error>> {
            self.events.push(format!("click {downbeat}"));
            Ok(())
        }
    }

    fn song() -> Song {
        let mut song = Song::new();
        song.bpm = 120.0;
        song.add_note("piano", 60, 0.0, Some(1.0), 100);
        song.add_note("piano", 64, 1.0, Some(2.0), 90);
        song
    }

    #[test]
    fn test_frame_fires_crossed_notes() {
        let song = song();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        assert!(player.play(&song));

        // 0.25 s at 120 bpm is half a beat
        player.frame(&song, 0.25, &mut sink);
        assert_eq!(sink.events, vec!["on piano 60 100"]);

        player.frame(&song, 0.25, &mut sink);
        player.frame(&song, 0.25, &mut sink);
        assert!(sink.events.contains(&"off piano 60".to_owned()));
        assert!(sink.events.contains(&"on piano 64 90".to_owned()));
    }

    #[test]
    fn test_auto_pause_past_end() {
        let song = song();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.play(&song);
        for _ in 0..10 {
            player.frame(&song, 0.25, &mut sink);
        }
        assert!(!player.is_playing());
    }

    #[test]
    fn test_play_with_nothing_ahead_is_noop() {
        let song = song();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.seek(10.0, &mut sink);
        assert!(!player.play(&song));
        assert!(!player.is_playing());

        let empty = Song::new();
        assert!(!player.play(&empty));
    }

    #[test]
    fn test_stop_releases_sounding_notes() {
        let song = song();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.play(&song);
        player.frame(&song, 0.25, &mut sink);
        player.stop(&mut sink);
        assert_eq!(player.beat(), 0.0);
        assert_eq!(sink.events.last().unwrap(), "off piano 60");
    }

    #[test]
    fn test_metronome_clicks() {
        let mut song = Song::new();
        song.bpm = 120.0;
        song.add_note("piano", 60, 0.0, Some(8.0), 100);
        let mut player = Player::new();
        player.set_metronome(true);
        let mut sink = TestSink::default();
        player.play(&song);
        for _ in 0..9 {
            player.frame(&song, 0.25, &mut sink);
        }
        let clicks: Vec<&String> = sink.events.iter()
            .filter(|e| e.starts_with("click")).collect();
        // beats 0..4, with downbeats at 0 and 4
        assert_eq!(clicks.len(), 5);
        assert_eq!(*clicks[0], "click true");
        assert_eq!(*clicks[1], "click false");
        assert_eq!(*clicks[4], "click true");
    }

    #[test]
    fn test_metronome_default_comes_from_config() {
        let mut config = Config::default();
        config.metronome = Some(true);
        assert!(Player::from_config(&config).metronome_enabled());
        assert!(!Player::from_config(&Config::default()).metronome_enabled());
        assert!(!Player::from_config(&Config {
            snap_precision: None,
            snap_sensitivity: None,
            history_capacity: None,
            metronome: None,
        }).metronome_enabled());
    }

    #[test]
    fn test_recording_open_and_close() {
        let mut song = Song::new();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.start_recording();
        player.record_note_on(&mut song, "piano", 60, 100, &mut sink);
        assert!(song.track("piano").unwrap().notes()[0].is_open());

        player.frame(&song.clone(), 0.5, &mut sink);
        player.record_note_off(&mut song, 60, &mut sink);
        let note = &song.track("piano").unwrap().notes()[0];
        assert_eq!(note.end(), Some(1.0));
    }

    #[test]
    fn test_sustain_defers_note_off() {
        let mut song = Song::new();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.start_recording();
        player.set_sustain(&mut song, true, &mut sink);
        player.record_note_on(&mut song, "piano", 60, 100, &mut sink);
        player.frame(&song.clone(), 0.5, &mut sink);
        player.record_note_off(&mut song, 60, &mut sink);
        // still ringing under the pedal
        assert!(song.track("piano").unwrap().notes()[0].is_open());

        player.frame(&song.clone(), 0.5, &mut sink);
        player.set_sustain(&mut song, false, &mut sink);
        assert_eq!(song.track("piano").unwrap().notes()[0].end(), Some(2.0));
    }

    #[test]
    fn test_restrike_closes_pending_note() {
        let mut song = Song::new();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.start_recording();
        player.set_sustain(&mut song, true, &mut sink);
        player.record_note_on(&mut song, "piano", 60, 100, &mut sink);
        player.frame(&song.clone(), 0.5, &mut sink);
        player.record_note_off(&mut song, 60, &mut sink);
        player.frame(&song.clone(), 0.5, &mut sink);
        player.record_note_on(&mut song, "piano", 60, 90, &mut sink);

        let notes = song.track("piano").unwrap().notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].end(), Some(2.0));
        assert!(notes[1].is_open());
    }

    #[test]
    fn test_stop_recording_closes_everything() {
        let mut song = Song::new();
        let mut player = Player::new();
        let mut sink = TestSink::default();
        player.start_recording();
        player.record_note_on(&mut song, "piano", 60, 100, &mut sink);
        player.frame(&song.clone(), 1.0, &mut sink);
        assert!(player.stop_recording(&mut song));
        assert_eq!(song.track("piano").unwrap().notes()[0].end(), Some(2.0));
        assert!(!player.is_recording());
    }
}
