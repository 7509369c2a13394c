//! Mock device registry
//!
//! Stands in for the host device registry with up to [`MOCK_SLOTS`] virtual
//! gamepads driven from the keyboard. Every query first integrates the active
//! gamepad over the time elapsed since the previous query, then reports all
//! gamepads in the same raw shape the host registry uses.
//!
//! ```text
//! host key events ──► KeyboardHandle ──► [queue] ──► MockDeviceSource::query()
//!                                                      ├─ apply queued keys
//!                                                      ├─ integrate active slot
//!                                                      └─ report raw entries
//! ```
//!
//! Key events are queued and applied at the start of the next query, so key
//! handling and integration never run concurrently.

use crate::controller::device_source::DeviceSource;
use crate::controller::snapshot::{ButtonSnapshot, RawButton, RawDeviceEntry};
use crate::mock::bindings::{self, Binding, BindingKind};
use crate::mock::integrator;
use crate::mock::keyboard::{parse_command, KeyCommand, KeyEvent, KeyboardTracker, MOCK_SLOTS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const MOCK_DEVICE_ID: &str = "padbridge mock gamepad";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Full-scale travel per second at speed multiplier 1
    pub base_speed: f32,
    pub bindings: Vec<Binding>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            base_speed: 10.0,
            bindings: bindings::default_bindings(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct MockDevice {
    slot: usize,
    timestamp: f64,
    axes: Vec<f32>,
    buttons: Vec<ButtonSnapshot>,
}

impl MockDevice {
    fn at_rest(slot: usize, axis_count: usize, button_count: usize) -> Self {
        Self {
            slot,
            timestamp: 1.0,
            axes: vec![0.0; axis_count],
            buttons: vec![ButtonSnapshot::RELEASED; button_count],
        }
    }

    fn to_raw(&self) -> RawDeviceEntry {
        RawDeviceEntry {
            index: self.slot,
            connected: true,
            timestamp: self.timestamp,
            id: MOCK_DEVICE_ID.to_string(),
            mapping: String::new(),
            axes: self.axes.clone(),
            buttons: self
                .buttons
                .iter()
                .map(|b| RawButton {
                    pressed: b.pressed(),
                    touched: b.pressed(),
                    value: b.value(),
                })
                .collect(),
        }
    }
}

/// Keyboard-driven simulator state
#[derive(Debug)]
pub struct MockRegistry {
    settings: MockSettings,
    tracker: KeyboardTracker,
    devices: [Option<MockDevice>; MOCK_SLOTS],
    active: Option<usize>,
    speed_multiplier: f32,
    last_query: Instant,
}

impl MockRegistry {
    pub fn new(settings: MockSettings) -> Self {
        Self::starting_at(settings, Instant::now())
    }

    pub fn starting_at(settings: MockSettings, now: Instant) -> Self {
        debug!(
            "Creating mock registry with {} bindings, base speed {}",
            settings.bindings.len(),
            settings.base_speed
        );
        Self {
            settings,
            tracker: KeyboardTracker::new(),
            devices: Default::default(),
            active: None,
            speed_multiplier: 1.0,
            last_query: now,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) {
        match event {
            KeyEvent::Down(key) => self.key_down(key),
            KeyEvent::Up(key) => self.key_up(key),
        }
    }

    pub fn key_down(&mut self, key: &str) {
        match parse_command(key) {
            Some(KeyCommand::SelectSlot(slot)) => self.select_slot(slot),
            Some(KeyCommand::SetSpeed(multiplier)) => self.set_speed_multiplier(multiplier),
            None => self.tracker.on_key_down(key),
        }
    }

    pub fn key_up(&mut self, key: &str) {
        if parse_command(key).is_none() {
            self.tracker.on_key_up(key);
        }
    }

    /// Makes `slot` the active gamepad, creating it at rest on first selection
    pub fn select_slot(&mut self, slot: usize) {
        if slot >= MOCK_SLOTS {
            warn!("Ignoring selection of mock gamepad {}", slot + 1);
            return;
        }

        let axis_count = bindings::axis_count(&self.settings.bindings);
        let button_count = bindings::button_count(&self.settings.bindings);
        self.devices[slot].get_or_insert_with(|| MockDevice::at_rest(slot, axis_count, button_count));
        self.active = Some(slot);
        info!("Selected gamepad: {}", slot + 1);
    }

    pub fn set_speed_multiplier(&mut self, multiplier: f32) {
        self.speed_multiplier = multiplier;
        info!("Input speed multiplier: {}", multiplier);
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.active
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.tracker.is_held(key)
    }

    /// Integrates the active gamepad over `now - last query` and reports all slots
    pub fn query_at(&mut self, now: Instant) -> Vec<Option<RawDeviceEntry>> {
        let dt = now.saturating_duration_since(self.last_query);
        self.last_query = self.last_query.max(now);
        self.advance(dt);
        self.entries()
    }

    /// Integrates the active gamepad over `dt`
    pub fn advance(&mut self, dt: Duration) {
        if dt.is_zero() {
            return;
        }
        let Some(slot) = self.active else {
            return;
        };

        let dt_secs = dt.as_secs_f32();
        let speed = self.settings.base_speed * self.speed_multiplier;
        let tracker = &self.tracker;
        let Some(device) = self.devices[slot].as_mut() else {
            return;
        };

        for binding in &self.settings.bindings {
            apply_binding(device, binding, tracker, dt_secs, speed);
        }
        device.timestamp += dt.as_secs_f64() * 1000.0;
    }

    /// Raw entries up to the highest populated slot
    pub fn entries(&self) -> Vec<Option<RawDeviceEntry>> {
        let len = self
            .devices
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);

        self.devices[..len]
            .iter()
            .map(|d| d.as_ref().map(MockDevice::to_raw))
            .collect()
    }
}

fn apply_binding(
    device: &mut MockDevice,
    binding: &Binding,
    tracker: &KeyboardTracker,
    dt: f32,
    speed: f32,
) {
    let held = tracker.any_held(&binding.positive);

    match binding.kind {
        BindingKind::Axis => {
            let Some(axis) = device.axes.get_mut(binding.target) else {
                return;
            };
            let held_negative = tracker.any_held(&binding.negative);
            *axis = integrator::advance(*axis, held, held_negative, dt, speed);
        }
        BindingKind::DigitalButton => {
            if let Some(button) = device.buttons.get_mut(binding.target) {
                *button = ButtonSnapshot(held, if held { 1.0 } else { 0.0 });
            }
        }
        BindingKind::AnalogButton => {
            if let Some(button) = device.buttons.get_mut(binding.target) {
                let value = integrator::advance_button(button.value(), held, dt, speed);
                *button = ButtonSnapshot(held, value);
            }
        }
    }
}

/// Sends host key events to a [`MockDeviceSource`]
#[derive(Clone, Debug)]
pub struct KeyboardHandle {
    sender: mpsc::UnboundedSender<KeyEvent>,
}

impl KeyboardHandle {
    pub fn key_down(&self, key: &str) {
        self.send(KeyEvent::Down(key.to_string()));
    }

    pub fn key_up(&self, key: &str) {
        self.send(KeyEvent::Up(key.to_string()));
    }

    pub fn send(&self, event: KeyEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("Mock source is gone, dropping key event: {:?}", e.0);
        }
    }
}

/// [`DeviceSource`] backed by a [`MockRegistry`]
#[derive(Debug)]
pub struct MockDeviceSource {
    registry: MockRegistry,
    key_events: mpsc::UnboundedReceiver<KeyEvent>,
}

impl MockDeviceSource {
    pub fn create(settings: MockSettings) -> (Self, KeyboardHandle) {
        let (sender, key_events) = mpsc::unbounded_channel();
        info!("Mock mode: keys 1-4 select a gamepad, 5-9 and 0 set the input speed");
        let source = Self {
            registry: MockRegistry::new(settings),
            key_events,
        };
        (source, KeyboardHandle { sender })
    }

    pub fn registry(&self) -> &MockRegistry {
        &self.registry
    }

    fn drain_key_events(&mut self) {
        while let Ok(event) = self.key_events.try_recv() {
            debug!("Applying key event: {:?}", event);
            self.registry.handle_key(&event);
        }
    }
}

impl DeviceSource for MockDeviceSource {
    fn query(&mut self) -> Vec<Option<RawDeviceEntry>> {
        self.drain_key_events();
        self.registry.query_at(Instant::now())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
