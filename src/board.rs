//! Board and interface records: the aggregated view of a logical device
//! built up from one or more classified USB interfaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use bitflags::bitflags;

use crate::family::FamilyDescriptor;
use crate::platform::DeviceHandle;

bitflags! {
    /// Abilities exposed by at least one interface of a board.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capability: u8 {
        /// The board is running application firmware and can be talked to
        /// at runtime (as opposed to sitting in the bootloader).
        const RUN    = 0b0000_0001;
        /// The board exposes a HalfKay bootloader interface that accepts
        /// firmware block writes.
        const UPLOAD = 0b0000_0010;
        /// The board can be told to jump from the bootloader to the
        /// application.
        const RESET  = 0b0000_0100;
        /// The board can be told to reboot from the application into the
        /// bootloader.
        const REBOOT = 0b0000_1000;
        /// The board exposes a CDC/Seremu serial transport.
        const SERIAL = 0b0001_0000;
        /// The board reports a real, non-placeholder serial number.
        const UNIQUE = 0b0010_0000;
    }
}

/// The role an interface plays within its family, as decided by the
/// classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    HalfKay,
    RawHid,
    Seremu,
    Serial,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::HalfKay => "HalfKay",
            Role::RawHid => "RawHID",
            Role::Seremu => "Seremu",
            Role::Serial => "Serial",
        }
    }
}

/// One classified USB interface, owned by exactly one [`Board`].
///
/// The back-edge to the owning board is a stable `location` string plus a
/// [`Weak`] reference, never a strong reference — strong ownership flows
/// monitor → board → interface only, matching the non-owning-back-edge
/// design note.
#[derive(Debug)]
pub struct Interface {
    pub device: DeviceHandle,
    pub vid: u16,
    pub pid: u16,
    pub role: Role,
    /// `None` when the classifier could not identify a specific model.
    pub model: Option<&'static crate::family::ModelDescriptor>,
    pub capabilities: Capability,
    /// The board this interface is currently attached to, if any.
    pub board: Mutex<Weak<Board>>,
}

impl Interface {
    pub fn new(
        device: DeviceHandle,
        vid: u16,
        pid: u16,
        role: Role,
        model: Option<&'static crate::family::ModelDescriptor>,
        capabilities: Capability,
    ) -> Self {
        Interface {
            device,
            vid,
            pid,
            role,
            model,
            capabilities,
            board: Mutex::new(Weak::new()),
        }
    }

    /// Whether this interface carries a real (non-placeholder) serial
    /// number, per the `UNIQUE` capability rule in the specification: any
    /// serial other than `0`, the AVR absent-marker `12345`, or `u32::MAX`.
    pub fn has_unique_serial(serial: u64) -> bool {
        serial != 0 && serial != crate::serial::AVR_NO_SERIAL_MARKER && serial != u32::MAX as u64
    }
}

/// Lifecycle state of a [`Board`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Online,
    Missing,
    Dropped,
}

/// Everything about a board that is mutated under its lock: the interface
/// set, the capability → provider map, and the union capability mask.
#[derive(Debug, Default)]
pub struct BoardInterfaces {
    pub interfaces: Vec<Arc<Interface>>,
    pub cap_providers: HashMap<Capability, Arc<Interface>>,
    pub capabilities: Capability,
}

impl BoardInterfaces {
    /// Recompute `cap_providers` and `capabilities` from `interfaces` from
    /// scratch, per the aggregator's "recompute ... from the remaining
    /// interfaces, not incrementally" rule.
    pub fn recompute(&mut self) {
        self.cap_providers.clear();
        self.capabilities = Capability::empty();
        for iface in &self.interfaces {
            self.capabilities |= iface.capabilities;
            for bit in single_bits(iface.capabilities) {
                self.cap_providers.entry(bit).or_insert_with(|| iface.clone());
            }
        }
    }

    pub fn push(&mut self, iface: Arc<Interface>) {
        self.capabilities |= iface.capabilities;
        for bit in single_bits(iface.capabilities) {
            self.cap_providers.insert(bit, iface.clone());
        }
        self.interfaces.push(iface);
    }

    pub fn remove_by_device(&mut self, device: DeviceHandle) -> Option<Arc<Interface>> {
        let pos = self.interfaces.iter().position(|i| i.device == device)?;
        let removed = self.interfaces.remove(pos);
        self.recompute();
        Some(removed)
    }
}

fn single_bits(caps: Capability) -> impl Iterator<Item = Capability> {
    caps.iter()
}

/// A logical board: the aggregation of every interface observed at one
/// stable USB location.
#[derive(Debug)]
pub struct Board {
    pub location: String,
    pub family: &'static FamilyDescriptor,
    /// `0` until a real serial number has been observed from any
    /// interface; per the invariant, moves only from `0` to a real value.
    pub serial: Mutex<u64>,
    pub model: Mutex<Option<&'static crate::family::ModelDescriptor>>,
    pub vid: Mutex<u16>,
    pub pid: Mutex<u16>,
    pub state: Mutex<BoardState>,
    pub missing_since: Mutex<Option<u64>>,
    pub interfaces: Mutex<BoardInterfaces>,
}

impl Board {
    pub fn new(location: String, family: &'static FamilyDescriptor, vid: u16, pid: u16) -> Arc<Self> {
        Arc::new(Board {
            location,
            family,
            serial: Mutex::new(0),
            model: Mutex::new(None),
            vid: Mutex::new(vid),
            pid: Mutex::new(pid),
            state: Mutex::new(BoardState::Online),
            missing_since: Mutex::new(None),
            interfaces: Mutex::new(BoardInterfaces::default()),
        })
    }

    /// The stable, human-readable board id: `"<decimal-serial>-<family>"`.
    /// Does not change after creation since `serial` only moves 0 → real.
    pub fn id(&self) -> String {
        format!("{}-{}", *self.serial.lock().unwrap(), self.family.name)
    }

    /// Alias of [`Board::id`], matching the specification's `tag` field.
    pub fn tag(&self) -> String {
        self.id()
    }

    pub fn capabilities(&self) -> Capability {
        self.interfaces.lock().unwrap().capabilities
    }

    pub fn state(&self) -> BoardState {
        *self.state.lock().unwrap()
    }
}
