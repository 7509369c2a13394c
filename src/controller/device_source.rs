//! Device sources
//!
//! A [`DeviceSource`] is the capability the frame sampler reads the device
//! registry through. The concrete source is chosen once at construction time:
//! the host registry ([`GilrsSource`]), the keyboard simulator
//! ([`crate::mock::MockDeviceSource`]), or [`EmptySource`] on hosts without
//! any registry.

use crate::controller::snapshot::{RawButton, RawDeviceEntry};
use gilrs::{Axis, Button, GamepadId, Gilrs, MappingSource};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Capability to read the current device registry
///
/// Position `i` of the returned list is slot `i`; `None` marks an empty slot.
pub trait DeviceSource: Send + 'static {
    fn query(&mut self) -> Vec<Option<RawDeviceEntry>>;

    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to initialize device backend: {0}")]
    InitializationError(String),
}

/// Source for hosts that expose no device registry; always reports no devices
#[derive(Debug, Default)]
pub struct EmptySource;

impl DeviceSource for EmptySource {
    fn query(&mut self) -> Vec<Option<RawDeviceEntry>> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "empty"
    }
}

const STANDARD_AXES: [Axis; 4] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

// Button order of the "standard" gamepad layout
const STANDARD_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

/// Host device registry backed by gilrs
pub struct GilrsSource {
    gilrs: Gilrs,
    // First time each gamepad was seen, used as its timestamp until it sends input
    first_seen: HashMap<GamepadId, f64>,
}

impl GilrsSource {
    pub fn create() -> Result<Self, SourceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(SourceError::InitializationError(e.to_string()));
            }
        };

        for (id, gamepad) in gilrs.gamepads() {
            info!(
                "  [{}] Name: {}, UUID: {:?}",
                id,
                gamepad.name(),
                gamepad.uuid()
            );
        }

        Ok(Self {
            gilrs,
            first_seen: HashMap::new(),
        })
    }

    fn read_entry(&mut self, id: GamepadId, now_ms: f64) -> Option<RawDeviceEntry> {
        let first_seen = *self.first_seen.entry(id).or_insert(now_ms);
        let gamepad = self.gilrs.connected_gamepad(id)?;

        let last_input = gamepad
            .state()
            .buttons()
            .map(|(_, data)| data.timestamp())
            .chain(gamepad.state().axes().map(|(_, data)| data.timestamp()))
            .filter_map(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64() * 1000.0)
            .fold(0.0_f64, f64::max);

        let axes = STANDARD_AXES.iter().map(|&a| gamepad.value(a)).collect();
        let buttons = STANDARD_BUTTONS
            .iter()
            .map(|&b| {
                let pressed = gamepad.is_pressed(b);
                let value = gamepad
                    .button_data(b)
                    .map(|d| d.value())
                    .unwrap_or(if pressed { 1.0 } else { 0.0 });
                RawButton {
                    pressed,
                    touched: pressed,
                    value,
                }
            })
            .collect();

        let mapping = match gamepad.mapping_source() {
            MappingSource::None => String::new(),
            _ => "standard".to_string(),
        };

        Some(RawDeviceEntry {
            index: usize::from(id),
            connected: gamepad.is_connected(),
            timestamp: last_input.max(first_seen),
            id: gamepad.name().to_string(),
            mapping,
            axes,
            buttons,
        })
    }
}

impl DeviceSource for GilrsSource {
    fn query(&mut self) -> Vec<Option<RawDeviceEntry>> {
        // Pumping events is what keeps gilrs' cached gamepad state current
        while let Some(event) = self.gilrs.next_event() {
            debug!("Processing gilrs event: {:?}", event.event);
            if let gilrs::EventType::Disconnected = event.event {
                warn!("Gamepad {} disconnected", event.id);
                self.first_seen.remove(&event.id);
            }
        }

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(1.0);

        let ids: Vec<GamepadId> = self.gilrs.gamepads().map(|(id, _)| id).collect();
        let mut entries: Vec<Option<RawDeviceEntry>> = Vec::new();
        for id in ids {
            let slot = usize::from(id);
            if entries.len() <= slot {
                entries.resize(slot + 1, None);
            }
            entries[slot] = self.read_entry(id, now_ms);
        }
        entries
    }

    fn name(&self) -> &str {
        "gilrs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_reports_nothing() {
        let mut source = EmptySource;
        assert!(source.query().is_empty());
        assert!(source.query().is_empty());
    }

    #[test]
    fn standard_layout_sizes() {
        assert_eq!(STANDARD_AXES.len(), 4);
        assert_eq!(STANDARD_BUTTONS.len(), 17);
        assert_eq!(STANDARD_BUTTONS[6], Button::LeftTrigger2);
    }
}
