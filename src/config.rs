use std::error::Error;

use serde::{Serialize, Deserialize};

use crate::history::DEFAULT_CAPACITY;
use crate::snap::{DEFAULT_PRECISION, DEFAULT_SENSITIVITY};

const CONFIG_PATH: &str = "config.toml";

#[derive(Serialize, Deserialize)]
pub struct Config {
    pub snap_precision: Option<f64>,
    pub snap_sensitivity: Option<f64>,
    pub history_capacity: Option<usize>,
    pub metronome: Option<bool>,
}

impl Config {
    pub fn default() -> Self {
        Self {
            snap_precision: Some(DEFAULT_PRECISION),
            snap_sensitivity: Some(DEFAULT_SENSITIVITY),
            history_capacity: Some(DEFAULT_CAPACITY),
            metronome: Some(false),
        }
    }

    pub fn load() -> Result<Self, Box<dyn Error>> {
        let s = std::fs::read_to_string(CONFIG_PATH)?;
        let c = toml::from_str(&s)?;
        Ok(c)
    }

    pub fn save(&self) -> Result<(), Box<dyn Error>> {
        let s = toml::to_string(self)?;
        std::fs::write(CONFIG_PATH, s)?;
        Ok(())
    }
}
