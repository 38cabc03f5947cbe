//! The platform adapter contract.
//!
//! Everything in this module is a *consumed* contract, not an implementation:
//! USB/HID/CDC enumeration, device descriptor access, and blocking reads and
//! writes with timeout are the platform layer's job. This crate only ever
//! talks to the platform through the [`Platform`] trait so that the monitor,
//! classifier, and HalfKay engine can be exercised against a test double
//! without real hardware.

use crate::error::CoreResult;

/// Opaque handle to a USB device as seen by the platform layer.
///
/// The core never dereferences this; it is a stable key used to look a
/// device back up through the platform, and to correlate device-status
/// events with [`Interface`](crate::board::Interface) records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u64);

/// Opaque handle to an *open* device (post [`Platform::open`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenHandle(pub u64);

/// The kind of USB function a device/interface exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// CDC-ACM virtual serial port.
    CdcSerial,
    /// HID function, distinguished further by usage page/usage.
    Hid,
}

/// Pure accessor data for one USB device, as reported by the platform.
///
/// Mirrors the `device_get_*` accessor family from the platform contract:
/// VID/PID/type/location/serial-number-string/product-string/HID usage page
/// and usage are all read-only facts the platform already knows by the time
/// it reports a device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub handle: DeviceHandle,
    pub kind: DeviceKind,
    pub vid: u16,
    pub pid: u16,
    /// Stable USB path, used as the board identity key.
    pub location: String,
    /// Raw serial number string exactly as exposed by the OS/descriptor,
    /// before any of the bootloader/runtime parsing in `serial.rs`.
    pub serial_number_string: Option<String>,
    pub product_string: Option<String>,
    /// Only meaningful when `kind == DeviceKind::Hid`.
    pub hid_usage_page: u16,
    pub hid_usage: u16,
}

/// Online/offline transition reported for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Disconnected,
}

/// One status-change notification delivered by `list`/`refresh`.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub status: DeviceStatus,
    pub device: DeviceInfo,
}

/// Device I/O mode requested at `open` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Hid,
    Serial,
}

/// Serial line configuration, passed to `serial_set_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
}

/// Short-circuit control for `list`/`refresh` callback iteration, matching
/// the platform contract's "returning a short-circuit nonzero to stop
/// iteration".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterControl {
    Continue,
    Stop,
}

/// The platform adapter contract consumed by the monitor driver, the
/// classifier, and the HalfKay protocol engine.
///
/// Implementations of this trait own real USB/HID/CDC access; this crate
/// ships none (it is out of scope per the specification), only the trait
/// boundary and a mock double used in tests.
pub trait Platform: Send {
    /// Enumerate all currently connected devices, invoking `on_event` with
    /// `DeviceStatus::Online` for each. Used for the monitor's initial
    /// enumeration.
    fn list(&mut self, on_event: &mut dyn FnMut(DeviceEvent) -> IterControl) -> CoreResult<()>;

    /// Report devices that have appeared or disappeared since the last
    /// `list`/`refresh` call.
    fn refresh(&mut self, on_event: &mut dyn FnMut(DeviceEvent) -> IterControl) -> CoreResult<()>;

    /// Open a device for I/O.
    fn open(&mut self, device: DeviceHandle, mode: OpenMode) -> CoreResult<OpenHandle>;

    /// Close a previously opened device handle.
    fn close(&mut self, handle: OpenHandle) -> CoreResult<()>;

    /// Blocking HID read with a millisecond timeout. Returns the number of
    /// bytes read (0 on timeout).
    fn hid_read(&mut self, handle: OpenHandle, buf: &mut [u8], timeout_ms: u64) -> CoreResult<usize>;

    /// HID write (output report).
    fn hid_write(&mut self, handle: OpenHandle, buf: &[u8]) -> CoreResult<usize>;

    /// HID SET_REPORT for a feature report.
    fn hid_send_feature_report(&mut self, handle: OpenHandle, buf: &[u8]) -> CoreResult<()>;

    /// Blocking serial read with a millisecond timeout. Returns the number
    /// of bytes read (0 on timeout).
    fn serial_read(&mut self, handle: OpenHandle, buf: &mut [u8], timeout_ms: u64) -> CoreResult<usize>;

    /// Serial write.
    fn serial_write(&mut self, handle: OpenHandle, buf: &[u8]) -> CoreResult<usize>;

    /// Change serial line configuration (baud rate, etc).
    fn serial_set_config(&mut self, handle: OpenHandle, config: SerialConfig) -> CoreResult<()>;

    /// Milliseconds since an arbitrary but monotonic epoch.
    fn millis(&self) -> u64;

    /// Sleep the calling thread.
    fn sleep(&self, duration_ms: u64);

    /// Block until the platform's notify descriptor (or the timer, via
    /// `timeout_ms`) becomes ready, or the timeout elapses. Returns `true`
    /// if something became ready, `false` on timeout.
    ///
    /// `timeout_ms < 0` blocks indefinitely per the `ty_adjust_timeout`
    /// convention described in the specification ("-1 for infinite").
    fn poll(&mut self, timeout_ms: i64) -> CoreResult<bool>;
}

/// Clamp a remaining-time computation the way `ty_adjust_timeout(base,
/// start)` does: non-negative remaining time, `0` once elapsed, and `-1`
/// ("infinite") passed through unchanged.
pub fn adjust_timeout(base_ms: i64, elapsed_ms: u64) -> i64 {
    if base_ms < 0 {
        return -1;
    }
    let remaining = base_ms - elapsed_ms as i64;
    remaining.max(0)
}
