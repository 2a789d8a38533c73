//! Soft grid snapping. Values move to the grid only when already close;
//! far values pass through untouched.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PRECISION: f64 = 4.0;
pub const DEFAULT_SENSITIVITY: f64 = 0.35;

/// Snap parameters. `precision` is grid lines per beat, `sensitivity` is
/// the capture window as a fraction of one grid unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapSettings {
    pub precision: f64,
    pub sensitivity: f64,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

impl SnapSettings {
    /// One grid unit in beats.
    pub fn grid_unit(&self) -> f64 {
        1.0 / self.precision
    }

    /// Snap a beat value to the nearest grid line if it falls within the
    /// capture window, otherwise return it unchanged.
    pub fn snap(&self, beat: f64) -> f64 {
        let snapped = (beat * self.precision).round() / self.precision;
        if (snapped - beat).abs() < self.sensitivity / self.precision {
            snapped
        } else {
            beat
        }
    }

    /// Hard quantize to the nearest grid line regardless of distance.
    pub fn quantize(&self, beat: f64) -> f64 {
        (beat * self.precision).round() / self.precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_within_window() {
        let s = SnapSettings { precision: 4.0, sensitivity: 0.35 };
        // window is 0.35/4 = 0.0875 beats around each quarter-beat line
        assert_eq!(s.snap(0.26), 0.25);
        assert_eq!(s.snap(0.24), 0.25);
        assert_eq!(s.snap(1.02), 1.0);
    }

    #[test]
    fn test_far_values_pass_through() {
        let s = SnapSettings { precision: 4.0, sensitivity: 0.35 };
        assert_eq!(s.snap(0.37), 0.37);
        assert_eq!(s.snap(0.13), 0.13);
    }

    #[test]
    fn test_snap_idempotent() {
        let s = SnapSettings::default();
        for &t in &[0.26, 0.37, 1.02, 3.999, 0.0] {
            let once = s.snap(t);
            assert_eq!(s.snap(once), once);
        }
    }

    #[test]
    fn test_quantize() {
        let s = SnapSettings { precision: 4.0, sensitivity: 0.35 };
        assert_eq!(s.quantize(0.37), 0.25);
        assert_eq!(s.quantize(0.13), 0.25);
        assert_eq!(s.grid_unit(), 0.25);
    }
}
