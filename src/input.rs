//! Host-agnostic input events and the keyboard command map.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
}

/// A pointer event in roll-local pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
    pub mods: Modifiers,
}

/// Editing commands, decoupled from the keys that trigger them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    Undo,
    Redo,
    Copy,
    Cut,
    Paste,
    Delete,
    SelectAll,
    NudgeLeft,
    NudgeRight,
    NudgeUp,
    NudgeDown,
    SnapPositions,
    SnapDurations,
    TogglePlayback,
    Stop,
}

/// Nudge step in beats, doubled while shift is held.
pub fn nudge_step(mods: Modifiers) -> f64 {
    if mods.shift { 0.5 } else { 0.25 }
}

/// Map a key name (lowercase, browser-style for named keys) plus modifiers
/// to a command.
pub fn action_for_key(key: &str, mods: Modifiers) -> Option<Action> {
    if mods.ctrl {
        return match key {
            "z" if mods.shift => Some(Action::Redo),
            "z" => Some(Action::Undo),
            "y" => Some(Action::Redo),
            "c" => Some(Action::Copy),
            "x" => Some(Action::Cut),
            "v" => Some(Action::Paste),
            "a" => Some(Action::SelectAll),
            _ => None,
        };
    }
    match key {
        "delete" | "backspace" => Some(Action::Delete),
        "arrowleft" => Some(Action::NudgeLeft),
        "arrowright" => Some(Action::NudgeRight),
        "arrowup" => Some(Action::NudgeUp),
        "arrowdown" => Some(Action::NudgeDown),
        "q" => Some(Action::SnapPositions),
        "w" => Some(Action::SnapDurations),
        " " => Some(Action::TogglePlayback),
        "escape" => Some(Action::Stop),
        _ => None,
    }
}
