//! Keyboard bindings of the mock gamepad
//!
//! The binding table is plain data: each record names the kind of control,
//! the axis or button index it drives and the keys that push it. One generic
//! routine per kind interprets the table (see [`crate::mock::registry`]).

use serde::{Deserialize, Serialize};

/// Upper bound for binding targets, keeps a bad config from allocating huge devices
pub const MAX_CONTROLS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Axis in `[-1, 1]`, ramped by `positive`/`negative` keys
    Axis,
    /// Button that is either fully pressed or released
    DigitalButton,
    /// Button with a smoothed value in `[0, 1]`, e.g. a trigger
    AnalogButton,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub kind: BindingKind,
    pub target: usize,
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
}

impl Binding {
    pub fn axis(target: usize, positive: &str, negative: &str) -> Self {
        Self {
            kind: BindingKind::Axis,
            target,
            positive: vec![positive.to_string()],
            negative: vec![negative.to_string()],
        }
    }

    pub fn digital(target: usize, keys: &[&str]) -> Self {
        Self::button(BindingKind::DigitalButton, target, keys)
    }

    pub fn analog(target: usize, keys: &[&str]) -> Self {
        Self::button(BindingKind::AnalogButton, target, keys)
    }

    fn button(kind: BindingKind, target: usize, keys: &[&str]) -> Self {
        Self {
            kind,
            target,
            positive: keys.iter().map(|k| k.to_string()).collect(),
            negative: Vec::new(),
        }
    }

    pub fn is_axis(&self) -> bool {
        self.kind == BindingKind::Axis
    }
}

/// The built-in table
pub fn default_bindings() -> Vec<Binding> {
    vec![
        // left stick
        Binding::axis(0, "d", "a"),
        Binding::axis(1, "w", "s"),
        // right stick
        Binding::axis(2, "ArrowRight", "ArrowLeft"),
        Binding::axis(3, "ArrowUp", "ArrowDown"),
        // face buttons
        Binding::digital(0, &["x"]),
        Binding::digital(1, &["y", "f"]),
        Binding::digital(2, &[" "]),
        Binding::digital(3, &["b", "e"]),
        // bumpers
        Binding::digital(4, &["Home"]),
        Binding::digital(5, &["Enter"]),
        // triggers
        Binding::analog(6, &["Control"]),
        Binding::analog(7, &["Alt"]),
    ]
}

/// Number of axes a device needs to cover every axis binding
pub fn axis_count(bindings: &[Binding]) -> usize {
    bindings
        .iter()
        .filter(|b| b.is_axis())
        .map(|b| b.target + 1)
        .max()
        .unwrap_or(0)
}

/// Number of buttons a device needs to cover every button binding
pub fn button_count(bindings: &[Binding]) -> usize {
    bindings
        .iter()
        .filter(|b| !b.is_axis())
        .map(|b| b.target + 1)
        .max()
        .unwrap_or(0)
}
