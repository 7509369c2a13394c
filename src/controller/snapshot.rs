//! Device snapshots and the normalizer that produces them
//!
//! Converts raw device-registry entries into canonical, immutable
//! [`DeviceSnapshot`] records. The normalizer is stateless and has no error
//! path: a bad entry degrades to `None` or to empty sequences so that a single
//! misbehaving device can never abort a frame.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One button as reported by the host registry
///
/// `touched` is host-specific metadata and is dropped during normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawButton {
    pub pressed: bool,
    pub touched: bool,
    pub value: f32,
}

impl RawButton {
    pub fn digital(pressed: bool) -> Self {
        Self {
            pressed,
            touched: pressed,
            value: if pressed { 1.0 } else { 0.0 },
        }
    }
}

/// One entry of the host device registry, before normalization
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDeviceEntry {
    pub index: usize,
    pub connected: bool,
    pub timestamp: f64,
    pub id: String,
    pub mapping: String,
    pub axes: Vec<f32>,
    pub buttons: Vec<RawButton>,
}

/// Normalized state of a single button
///
/// Serialized as a `[pressed, value]` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonSnapshot(pub bool, pub f32);

impl ButtonSnapshot {
    pub const RELEASED: ButtonSnapshot = ButtonSnapshot(false, 0.0);

    pub fn pressed(&self) -> bool {
        self.0
    }

    pub fn value(&self) -> f32 {
        self.1
    }
}

/// One input device at one instant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub slot: usize,
    pub connected: bool,
    pub id: String,
    pub mapping: String,
    pub timestamp: f64,
    pub axes: Vec<f32>,
    pub buttons: Vec<ButtonSnapshot>,
}

/// All device slots of one frame; `None` marks an empty slot
pub type Frame = Vec<Option<DeviceSnapshot>>;

/// The `(current, previous)` pair delivered once per sampling tick
///
/// Created by the frame sampler and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub current: Frame,
    pub previous: Frame,
    pub captured_at: DateTime<Local>,
    /// Time between the capture of `previous` and `current`
    pub since_previous: Duration,
}

/// Returns true for the spurious registry entry some hosts report: connected,
/// but with an update timestamp that is zero and never moves.
pub fn is_zombie(entry: &RawDeviceEntry) -> bool {
    entry.connected && entry.timestamp == 0.0
}

/// Normalizes one registry slot into a snapshot
///
/// Absent entries and zombie entries both map to `None`.
pub fn normalize(entry: Option<&RawDeviceEntry>) -> Option<DeviceSnapshot> {
    let entry = entry?;

    if is_zombie(entry) {
        debug!("Discarding zombie device in slot {}: {:?}", entry.index, entry.id);
        return None;
    }

    Some(DeviceSnapshot {
        slot: entry.index,
        connected: entry.connected,
        id: entry.id.clone(),
        mapping: entry.mapping.clone(),
        timestamp: entry.timestamp,
        axes: entry.axes.iter().map(|&a| sanitize(a, -1.0)).collect(),
        buttons: entry
            .buttons
            .iter()
            .map(|b| ButtonSnapshot(b.pressed, sanitize(b.value, 0.0)))
            .collect(),
    })
}

/// Normalizes a whole registry read, keeping slot positions
pub fn normalize_all(entries: &[Option<RawDeviceEntry>]) -> Frame {
    entries.iter().map(|e| normalize(e.as_ref())).collect()
}

// Hosts occasionally report NaN for an unplugged axis
fn sanitize(value: f32, min: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, timestamp: f64) -> RawDeviceEntry {
        RawDeviceEntry {
            index,
            connected: true,
            timestamp,
            id: "Test Pad".to_string(),
            mapping: "standard".to_string(),
            axes: vec![0.25, -0.5],
            buttons: vec![
                RawButton {
                    pressed: true,
                    touched: true,
                    value: 1.0,
                },
                RawButton {
                    pressed: false,
                    touched: true,
                    value: 0.3,
                },
            ],
        }
    }

    #[test]
    fn absent_entry_is_none() {
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn zombie_entry_is_filtered() {
        assert_eq!(normalize(Some(&entry(0, 0.0))), None);
    }

    #[test]
    fn disconnected_entry_with_zero_timestamp_is_kept() {
        let mut raw = entry(1, 0.0);
        raw.connected = false;
        let snapshot = normalize(Some(&raw)).expect("disconnected entry kept");
        assert!(!snapshot.connected);
        assert_eq!(snapshot.slot, 1);
    }

    #[test]
    fn fields_are_projected() {
        let snapshot = normalize(Some(&entry(3, 42.0))).unwrap();
        assert_eq!(snapshot.slot, 3);
        assert_eq!(snapshot.id, "Test Pad");
        assert_eq!(snapshot.mapping, "standard");
        assert_eq!(snapshot.timestamp, 42.0);
        assert_eq!(snapshot.axes, vec![0.25, -0.5]);
        assert_eq!(
            snapshot.buttons,
            vec![ButtonSnapshot(true, 1.0), ButtonSnapshot(false, 0.3)]
        );
    }

    #[test]
    fn missing_sequences_stay_empty() {
        let raw = RawDeviceEntry {
            index: 0,
            connected: true,
            timestamp: 5.0,
            ..Default::default()
        };
        let snapshot = normalize(Some(&raw)).unwrap();
        assert!(snapshot.axes.is_empty());
        assert!(snapshot.buttons.is_empty());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut raw = entry(0, 1.0);
        raw.axes = vec![1.5, -3.0, f32::NAN];
        raw.buttons = vec![RawButton {
            pressed: true,
            touched: false,
            value: 2.0,
        }];
        let snapshot = normalize(Some(&raw)).unwrap();
        assert_eq!(snapshot.axes, vec![1.0, -1.0, 0.0]);
        assert_eq!(snapshot.buttons, vec![ButtonSnapshot(true, 1.0)]);
    }

    #[test]
    fn zombie_beside_valid_device_keeps_positions() {
        let registry = vec![Some(entry(0, 10.0)), None, Some(entry(2, 0.0))];
        let frame = normalize_all(&registry);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame[0].as_ref().map(|s| s.slot), Some(0));
        assert!(frame[1].is_none());
        assert!(frame[2].is_none());
    }

    #[test]
    fn button_serializes_as_pair() {
        let json = serde_json::to_string(&ButtonSnapshot(true, 0.5)).unwrap();
        assert_eq!(json, "[true,0.5]");
    }
}
