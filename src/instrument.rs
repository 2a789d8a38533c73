//! Instrument catalog: General MIDI program numbers and percussion
//! detection, with an optional JSON catalog overriding the built-ins.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Channel reserved for percussion in General MIDI.
pub const DRUM_CHANNEL: u8 = 9;

pub const DEFAULT_PROGRAM: u8 = 0;

/// Built-in instrument id to GM program mapping, used when no catalog
/// entry overrides it.
const BUILTIN_PROGRAMS: &[(&str, u8)] = &[
    ("piano", 0),
    ("guitar", 24),
    ("sampledMutedGuitar", 25),
    ("electricGuitar", 27),
    ("bass", 32),
    ("strings", 48),
    ("synth", 80),
    ("lead", 80),
    ("pad", 89),
    ("fx", 103),
];

/// One catalog entry as loaded from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub program: Option<u8>,
    #[serde(default)]
    pub percussion: bool,
    /// Display color for the roll, as a CSS-style hex string.
    #[serde(default)]
    pub color: Option<String>,
}

/// Lookup table for everything the exporter and player need to know about
/// an instrument id. Unknown ids get sensible defaults, so a catalog is
/// optional.
#[derive(Clone, Debug, Default)]
pub struct InstrumentMap {
    entries: HashMap<String, InstrumentInfo>,
}

impl InstrumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let entries: Vec<InstrumentInfo> = serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut map = Self::new();
        for entry in entries {
            map.entries.insert(entry.id.clone(), entry);
        }
        Ok(map)
    }

    pub fn get(&self, id: &str) -> Option<&InstrumentInfo> {
        self.entries.get(id)
    }

    /// GM program for an instrument id. Catalog entries win, then the
    /// built-in table, then the default program.
    pub fn program(&self, id: &str) -> u8 {
        if let Some(p) = self.entries.get(id).and_then(|e| e.program) {
            return p.min(127);
        }
        BUILTIN_PROGRAMS.iter()
            .find(|(name, _)| *name == id)
            .map(|(_, p)| *p)
            .unwrap_or(DEFAULT_PROGRAM)
    }

    /// Percussion instruments export on the drum channel. Without a
    /// catalog entry, any id mentioning "percussion" counts.
    pub fn is_percussion(&self, id: &str) -> bool {
        if let Some(entry) = self.entries.get(id) {
            return entry.percussion;
        }
        id.to_lowercase().contains("percussion")
    }

    /// Display name for track name metas.
    pub fn display_name(&self, id: &str) -> String {
        self.entries.get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_owned())
    }
}
