//! The Teensy family: model table, classifier, and firmware signatures.

use crate::board::{Capability, Interface, Role};
use crate::classify::{ClassifiedInterface, ClassifyOutcome};
use crate::firmware::{self, Signature};
use crate::platform::{DeviceInfo, DeviceKind};

use super::{FamilyDescriptor, HalfkayVersion, ModelDescriptor};

const TEENSY_VID: u16 = 0x16C0;
const SERIAL_PIDS: &[u16] = &[0x478, 0x482, 0x483, 0x484, 0x485, 0x486, 0x487, 0x488];

const HALFKAY_USAGE_PAGE: u16 = 0xFF9C;
const RAWHID_USAGE_PAGE: u16 = 0xFFAB;
const SEREMU_USAGE_PAGE: u16 = 0xFFC9;

/// The model table, keyed by bootloader-mode HID usage id `0x1A..0x23`.
pub static MODELS: [ModelDescriptor; 10] = [
    ModelDescriptor {
        name: "Teensy 1.0",
        mcu: "AT90USB162",
        code_size: 15_872,
        halfkay_version: HalfkayVersion::V1,
        block_size: 128,
        usage_id: 0x1A,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 2.0",
        mcu: "ATMEGA32U4",
        code_size: 32_256,
        halfkay_version: HalfkayVersion::V1,
        block_size: 128,
        usage_id: 0x1B,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy++ 1.0",
        mcu: "AT90USB646",
        code_size: 64_512,
        halfkay_version: HalfkayVersion::V1,
        block_size: 256,
        usage_id: 0x1C,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 3.0",
        mcu: "MK20DX128",
        code_size: 131_072,
        halfkay_version: HalfkayVersion::V3,
        block_size: 1024,
        usage_id: 0x1D,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy++ 2.0",
        mcu: "AT90USB1286",
        code_size: 130_048,
        halfkay_version: HalfkayVersion::V2,
        block_size: 256,
        usage_id: 0x1E,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 3.1/3.2",
        mcu: "MK20DX256",
        code_size: 262_144,
        halfkay_version: HalfkayVersion::V3,
        block_size: 1024,
        usage_id: 0x1F,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy LC",
        mcu: "MKL26Z64",
        code_size: 65_536,
        halfkay_version: HalfkayVersion::V3,
        block_size: 512,
        usage_id: 0x20,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 3.5",
        mcu: "MK64FX512",
        code_size: 524_288,
        halfkay_version: HalfkayVersion::V3,
        block_size: 1024,
        usage_id: 0x21,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 3.6",
        mcu: "MK66FX1M0",
        code_size: 1_048_576,
        halfkay_version: HalfkayVersion::V3,
        block_size: 1024,
        usage_id: 0x22,
        experimental: false,
        family_name: "Teensy",
    },
    ModelDescriptor {
        name: "Teensy 4.0",
        mcu: "IMXRT1062",
        code_size: 2_031_616,
        halfkay_version: HalfkayVersion::V3,
        block_size: 1024,
        usage_id: 0x23,
        experimental: true,
        family_name: "Teensy",
    },
];

/// Firmware image signatures, one 8-byte magic per model (ARM models carry
/// the flash configuration field's leading bytes; AVR models carry their
/// vector table's reset-handler address bytes). Teensy 3.1 and Teensy 3.2
/// share a single model and signature since they are electrically identical
/// in bootloader mode. Teensy 3.5 is given a higher priority since its flash
/// configuration layout is otherwise a byte-for-byte prefix match with
/// several lower-priority images.
static SIGNATURES: [Signature; 10] = [
    Signature { magic: [0x0C, 0x94, 0x00, 0x00, 0x0C, 0x94, 0x1E, 0x00], model: &MODELS[0], priority: 0 },
    Signature { magic: [0x0C, 0x94, 0x00, 0x00, 0x0C, 0x94, 0x34, 0x00], model: &MODELS[1], priority: 0 },
    Signature { magic: [0x0C, 0x94, 0x00, 0x00, 0x0C, 0x94, 0x46, 0x00], model: &MODELS[2], priority: 0 },
    Signature { magic: [0x20, 0x80, 0x04, 0x40, 0x82, 0x3F, 0x04, 0x00], model: &MODELS[3], priority: 0 },
    Signature { magic: [0x0C, 0x94, 0x00, 0x00, 0x0C, 0x94, 0x58, 0x00], model: &MODELS[4], priority: 0 },
    Signature { magic: [0x30, 0x80, 0x04, 0x40, 0x82, 0x3F, 0x04, 0x00], model: &MODELS[5], priority: 0 },
    Signature { magic: [0x00, 0x20, 0x00, 0x20, 0x02, 0x00, 0x00, 0x5D], model: &MODELS[6], priority: 0 },
    Signature { magic: [0x00, 0x20, 0x08, 0xE0, 0x03, 0x00, 0x00, 0x85], model: &MODELS[7], priority: 2 },
    Signature { magic: [0x00, 0x20, 0x10, 0xF0, 0x03, 0x00, 0x00, 0x95], model: &MODELS[8], priority: 0 },
    Signature { magic: [0x00, 0x60, 0x00, 0x20, 0x02, 0x04, 0x00, 0x80], model: &MODELS[9], priority: 0 },
];

pub fn signatures() -> &'static [Signature] {
    &SIGNATURES
}

fn classify_interface(device: &DeviceInfo) -> ClassifyOutcome {
    if device.vid != TEENSY_VID {
        return ClassifyOutcome::Rejected;
    }
    match device.kind {
        DeviceKind::CdcSerial => {
            if !SERIAL_PIDS.contains(&device.pid) {
                return ClassifyOutcome::Rejected;
            }
            let serial = crate::serial::parse_runtime_serial(device.serial_number_string.as_deref());
            ClassifyOutcome::Accepted(ClassifiedInterface {
                role: Role::Serial,
                model: None,
                capabilities: runtime_capabilities(Capability::RUN | Capability::SERIAL | Capability::REBOOT, serial),
                serial,
            })
        }
        DeviceKind::Hid => match device.hid_usage_page {
            HALFKAY_USAGE_PAGE => {
                let model = family().model_by_usage_id(device.hid_usage);
                let serial = crate::serial::parse_bootloader_serial(device.serial_number_string.as_deref());
                let mut caps = Capability::UPLOAD;
                if model.is_some() {
                    caps |= Capability::RESET;
                }
                ClassifyOutcome::Accepted(ClassifiedInterface {
                    role: Role::HalfKay,
                    model,
                    capabilities: runtime_capabilities(caps, serial),
                    serial,
                })
            }
            RAWHID_USAGE_PAGE => {
                let serial = crate::serial::parse_runtime_serial(device.serial_number_string.as_deref());
                ClassifyOutcome::Accepted(ClassifiedInterface {
                    role: Role::RawHid,
                    model: None,
                    capabilities: runtime_capabilities(Capability::RUN, serial),
                    serial,
                })
            }
            SEREMU_USAGE_PAGE => {
                let serial = crate::serial::parse_runtime_serial(device.serial_number_string.as_deref());
                ClassifyOutcome::Accepted(ClassifiedInterface {
                    role: Role::Seremu,
                    model: None,
                    capabilities: runtime_capabilities(Capability::RUN | Capability::SERIAL | Capability::REBOOT, serial),
                    serial,
                })
            }
            _ => ClassifyOutcome::Rejected,
        },
    }
}

fn runtime_capabilities(base: Capability, serial: u64) -> Capability {
    if Interface::has_unique_serial(serial) {
        base | Capability::UNIQUE
    } else {
        base
    }
}

fn update_board(_board: &crate::board::Board, _classified: &ClassifiedInterface) {
    // The Teensy family has no per-board state beyond what the generic
    // aggregator already maintains.
}

fn scan_firmware(image: &[u8], max_guesses: usize) -> Vec<&'static ModelDescriptor> {
    firmware::scan(image, &SIGNATURES, max_guesses)
}

static FAMILY: FamilyDescriptor = FamilyDescriptor {
    name: "Teensy",
    models: &MODELS,
    classify_interface,
    update_board,
    scan_firmware,
};

/// The single Teensy family descriptor.
pub fn family() -> &'static FamilyDescriptor {
    &FAMILY
}
