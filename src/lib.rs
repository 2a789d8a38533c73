//! Editing and persistence core for a piano-roll MIDI sequencer.
//!
//! The [`Song`] holds the notes; an [`Editor`] runs selection, drag
//! gestures, clipboard and undo over it; a [`Player`] drives playback and
//! live recording one frame at a time. Documents save to JSON and export
//! as format 1 Standard MIDI Files.

pub mod config;
pub mod coords;
pub mod edit;
pub mod error;
pub mod history;
pub mod input;
pub mod instrument;
pub mod midi;
pub mod playback;
pub mod save;
pub mod snap;
pub mod song;

pub use config::Config;
pub use edit::Editor;
pub use error::Error;
pub use playback::{AudioSink, Player};
pub use song::{Note, NoteRef, Song, Track};

/// Application name, for window title, etc.
pub const APP_NAME: &str = "Keyroll";
