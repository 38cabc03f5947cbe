//! Test-only fixtures and builders, in the style of the teacher project's
//! `test_helpers` module. Only compiled under `cfg(test)`.

use std::sync::Arc;

use crate::board::{Board, Capability, Interface, Role};
use crate::family::teensy;
use crate::platform::{DeviceHandle, DeviceInfo, DeviceKind};

/// Builds a [`DeviceInfo`] for tests, with sensible Teensy-shaped defaults
/// that individual tests override piece by piece.
pub struct DeviceInfoBuilder {
    device: DeviceInfo,
}

impl DeviceInfoBuilder {
    pub fn halfkay(handle: u64, usage: u16) -> Self {
        DeviceInfoBuilder {
            device: DeviceInfo {
                handle: DeviceHandle(handle),
                kind: DeviceKind::Hid,
                vid: 0x16C0,
                pid: 0x483,
                location: "usb-1-2".into(),
                serial_number_string: None,
                product_string: None,
                hid_usage_page: 0xFF9C,
                hid_usage: usage,
            },
        }
    }

    pub fn serial(handle: u64) -> Self {
        DeviceInfoBuilder {
            device: DeviceInfo {
                handle: DeviceHandle(handle),
                kind: DeviceKind::CdcSerial,
                vid: 0x16C0,
                pid: 0x483,
                location: "usb-1-2".into(),
                serial_number_string: None,
                product_string: None,
                hid_usage_page: 0,
                hid_usage: 0,
            },
        }
    }

    pub fn location(mut self, location: &str) -> Self {
        self.device.location = location.to_string();
        self
    }

    pub fn serial_number(mut self, serial: &str) -> Self {
        self.device.serial_number_string = Some(serial.to_string());
        self
    }

    pub fn build(self) -> DeviceInfo {
        self.device
    }
}

/// Builds an [`Interface`] fixture directly, bypassing classification, for
/// tests that only need a pre-classified interface to attach to a board.
pub struct InterfaceBuilder {
    device: DeviceHandle,
    vid: u16,
    pid: u16,
    role: Role,
    capabilities: Capability,
}

impl InterfaceBuilder {
    pub fn new(device: u64, role: Role) -> Self {
        InterfaceBuilder { device: DeviceHandle(device), vid: 0x16C0, pid: 0x483, role, capabilities: Capability::empty() }
    }

    pub fn capabilities(mut self, capabilities: Capability) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn build(self) -> Arc<Interface> {
        Arc::new(Interface::new(self.device, self.vid, self.pid, self.role, None, self.capabilities))
    }
}

/// Builds a bare [`Board`] fixture in the Teensy family, for tests that
/// exercise board-level invariants without going through the monitor.
pub fn board_fixture(location: &str) -> Arc<Board> {
    Board::new(location.to_string(), teensy::family(), 0x16C0, 0x483)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_builder_applies_overrides() {
        let device = DeviceInfoBuilder::halfkay(1, 0x1D).location("usb-3-1").serial_number("00000C81").build();
        assert_eq!(device.location, "usb-3-1");
        assert_eq!(device.serial_number_string.as_deref(), Some("00000C81"));
        assert_eq!(device.hid_usage, 0x1D);
    }

    #[test]
    fn interface_builder_produces_requested_capabilities() {
        let iface = InterfaceBuilder::new(7, Role::RawHid).capabilities(Capability::RUN).build();
        assert_eq!(iface.capabilities, Capability::RUN);
        assert_eq!(iface.role, Role::RawHid);
    }

    #[test]
    fn board_fixture_starts_with_zero_serial() {
        let board = board_fixture("usb-9-9");
        assert_eq!(*board.serial.lock().unwrap(), 0);
    }
}
