//! Controller subsystem for per-frame gamepad sampling
//!
//! Implements a three-stage pipeline:
//!
//! 1. [`device_source`] - Registry access (host gilrs registry, mock, or empty)
//! 2. [`snapshot`] - Normalization of raw entries into immutable snapshots
//! 3. [`frame_sampler`] - Per-frame sampling and `(current, previous)` pairing
//!
//! # Architecture
//!
//! ```text
//! DeviceSource ──► Normalizer ──► FrameSampler ──► FramePair ──► Consumer
//!  (raw entries)    (snapshots)    (pairs with previous frame)
//! ```
//!
//! The sampler ticks once per display frame (60 Hz by default).

pub mod device_source;
pub mod frame_sampler;
pub mod snapshot;

pub use device_source::{DeviceSource, EmptySource, GilrsSource, SourceError};
pub use frame_sampler::{FrameSampler, SamplerError, SamplerHandle, SamplerSettings};
pub use snapshot::{
    normalize, normalize_all, ButtonSnapshot, DeviceSnapshot, Frame, FramePair, RawButton,
    RawDeviceEntry,
};
