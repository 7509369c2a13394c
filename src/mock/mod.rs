//! Keyboard-driven mock gamepads
//!
//! Synthesizes plausible gamepad state from key presses so the bridge can be
//! exercised without physical devices. Selected with `source = "mock"`.
//!
//! - [`keyboard`] - Key state tracking and the digit-key command surface
//! - [`integrator`] - Ramp and recoil physics for analog values
//! - [`bindings`] - Declarative key-to-control table
//! - [`registry`] - Lazily populated mock gamepads exposed as a device source

pub mod bindings;
pub mod integrator;
pub mod keyboard;
pub mod registry;

pub use bindings::{Binding, BindingKind};
pub use keyboard::{KeyEvent, KeyboardTracker, MOCK_SLOTS};
pub use registry::{KeyboardHandle, MockDeviceSource, MockRegistry, MockSettings};
