//! Consumer-facing side of the bridge
//!
//! - [`environment`] - Host facts sent alongside every frame
//! - [`wire`] - JSON-lines frame port on stdout
//! - [`terminal`] - Raw-mode key feed that drives the mock gamepads

pub mod environment;
pub mod terminal;
pub mod wire;

pub use environment::Environment;
pub use terminal::{CrlfWriter, TerminalKeyFeed};
pub use wire::{FramePort, PortError, WireMessage};
