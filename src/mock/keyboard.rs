//! Keyboard state tracking for the mock gamepads
//!
//! Keys are tracked by literal identity (no case or locale folding). Digit
//! keys never reach the tracker: they are mock commands that select the
//! active gamepad or the input speed.

use std::collections::HashMap;

/// Number of mock gamepads that can be selected with the keys `1`-`4`
pub const MOCK_SLOTS: usize = 4;

/// A key transition as delivered by the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Down(String),
    Up(String),
}

/// Mock command bound to a digit key
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyCommand {
    /// `1`-`4`: make the (0-indexed) slot the active mock gamepad
    SelectSlot(usize),
    /// `5`-`9` set `(digit - 4) / 5`, `0` sets an unbounded multiplier
    SetSpeed(f32),
}

/// Interprets a key as a mock command, `None` for ordinary keys
pub fn parse_command(key: &str) -> Option<KeyCommand> {
    let mut chars = key.chars();
    let digit = chars.next()?.to_digit(10)?;
    if chars.next().is_some() {
        return None;
    }

    Some(match digit {
        0 => KeyCommand::SetSpeed(f32::INFINITY),
        1..=4 => KeyCommand::SelectSlot(digit as usize - 1),
        _ => KeyCommand::SetSpeed((digit as f32 - 4.0) / 5.0),
    })
}

/// Live pressed/released state per key
#[derive(Debug, Default, Clone)]
pub struct KeyboardTracker {
    key_state: HashMap<String, bool>,
}

impl KeyboardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_down(&mut self, key: &str) {
        self.key_state.insert(key.to_string(), true);
    }

    pub fn on_key_up(&mut self, key: &str) {
        self.key_state.insert(key.to_string(), false);
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.key_state.get(key).copied().unwrap_or(false)
    }

    /// True if any of `keys` is held
    pub fn any_held(&self, keys: &[String]) -> bool {
        keys.iter().any(|k| self.is_held(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_map_to_commands() {
        assert_eq!(parse_command("1"), Some(KeyCommand::SelectSlot(0)));
        assert_eq!(parse_command("4"), Some(KeyCommand::SelectSlot(3)));
        assert_eq!(parse_command("5"), Some(KeyCommand::SetSpeed(0.2)));
        assert_eq!(parse_command("9"), Some(KeyCommand::SetSpeed(1.0)));
        assert_eq!(parse_command("0"), Some(KeyCommand::SetSpeed(f32::INFINITY)));
    }

    #[test]
    fn other_keys_are_not_commands() {
        for key in ["", " ", "w", "12", "F1", "Enter", "ArrowUp", "-1"] {
            assert_eq!(parse_command(key), None, "{key:?}");
        }
    }

    #[test]
    fn tracks_keys_by_literal_identity() {
        let mut tracker = KeyboardTracker::new();
        assert!(!tracker.is_held("w"));

        tracker.on_key_down("w");
        assert!(tracker.is_held("w"));
        assert!(!tracker.is_held("W"));

        tracker.on_key_up("w");
        assert!(!tracker.is_held("w"));
    }

    #[test]
    fn any_held_checks_alternatives() {
        let mut tracker = KeyboardTracker::new();
        let keys = vec!["y".to_string(), "f".to_string()];
        assert!(!tracker.any_held(&keys));
        tracker.on_key_down("f");
        assert!(tracker.any_held(&keys));
    }
}
