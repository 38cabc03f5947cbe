//! Board family registry: static model tables and the per-family function
//! pointers for classification, board update, and firmware scanning.

pub mod teensy;

use crate::board::Board;
use crate::classify::{ClassifiedInterface, ClassifyOutcome};
use crate::platform::DeviceInfo;

/// Which HalfKay wire-format variant a model's bootloader speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfkayVersion {
    /// AVR, 16-bit address.
    V1,
    /// AVR, 24-bit address (code size ≥ 64 KB).
    V2,
    /// ARM, 24-bit address, 64-byte-aligned payload.
    V3,
}

/// An immutable, statically defined board model.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub mcu: &'static str,
    /// Bytes of program flash available to application code. Absent (`0`)
    /// on the `unknown` placeholder model, which is never used for upload.
    pub code_size: usize,
    pub halfkay_version: HalfkayVersion,
    pub block_size: usize,
    /// 16-bit HID usage distinguishing this model while in bootloader mode.
    /// Unique across every real model in the owning family.
    pub usage_id: u16,
    pub experimental: bool,
    pub family_name: &'static str,
}

impl ModelDescriptor {
    /// Whether this model can ever be the target of an upload — false only
    /// for the placeholder `unknown` model.
    pub fn is_uploadable(&self) -> bool {
        self.code_size > 0
    }
}

/// Function-pointer vtable for one board family, mirroring the "vtable via
/// function-pointer struct per family" source pattern — dispatch is static
/// within a family, so these are plain `fn` pointers rather than trait
/// objects.
#[derive(Debug)]
pub struct FamilyDescriptor {
    pub name: &'static str,
    pub models: &'static [ModelDescriptor],
    pub classify_interface: fn(&DeviceInfo) -> ClassifyOutcome,
    /// Family-specific hook invoked after the generic aggregator has merged
    /// a classified interface into `board`. The Teensy family has no
    /// per-board adjustments beyond the generic merge, so its hook is a
    /// no-op; the hook exists so a future family with family-specific state
    /// does not require aggregator changes.
    pub update_board: fn(&Board, &ClassifiedInterface),
    pub scan_firmware: fn(image: &[u8], max_guesses: usize) -> Vec<&'static ModelDescriptor>,
}

impl FamilyDescriptor {
    /// Look up a model by its bootloader-mode HID usage id.
    pub fn model_by_usage_id(&self, usage_id: u16) -> Option<&'static ModelDescriptor> {
        self.models.iter().find(|m| m.usage_id == usage_id)
    }
}
