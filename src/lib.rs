//! Device monitor and board lifecycle core for the Teensy family of USB
//! microcontroller boards.
//!
//! This crate reconciles USB hotplug events into logical boards, classifies
//! interfaces by model and role, and drives the HalfKay bootloader protocol
//! for firmware upload, reset, and reboot. It has no knowledge of any
//! particular USB/HID/CDC stack: callers provide a [`platform::Platform`]
//! implementation, and the crate never touches the filesystem or prints
//! anything itself.

pub mod board;
pub mod classify;
pub mod error;
pub mod family;
pub mod firmware;
pub mod halfkay;
pub mod monitor;
pub mod platform;
pub mod serial;

#[cfg(test)]
pub mod test_support;

pub use board::{Board, BoardState, Capability, Interface, Role};
pub use error::{CoreError, CoreResult};
pub use family::{FamilyDescriptor, HalfkayVersion, ModelDescriptor};
pub use monitor::{BoardEvent, BoardEventKind, Monitor, MonitorConfig, MonitorFlags};
pub use platform::Platform;
