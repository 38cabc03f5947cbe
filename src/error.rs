//! Error taxonomy for the device monitor and board lifecycle core.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while monitoring boards or driving the HalfKay
/// protocol.
///
/// Each variant corresponds to one of the abstract error classes the core
/// is specified against: allocation failure, device I/O, "not present",
/// permission, unsupported operation, missing capability, firmware size,
/// firmware mismatch, and platform-primitive failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Allocation failure reported by a platform primitive. Fatal to the
    /// current operation; the crate itself never constructs this variant
    /// since Rust aborts on allocator failure, but platform adapters may
    /// need to report it when translating an underlying failure.
    #[error("allocation failure")]
    Memory,

    /// Transient or persistent device I/O failure. Transient cases inside
    /// the HalfKay engine are retried against a deadline before surfacing.
    #[error("device I/O error: {0}")]
    Io(String),

    /// The device or interface is no longer present.
    #[error("device or interface not found")]
    NotFound,

    /// Permission denied opening or accessing a device.
    #[error("access denied: {0}")]
    Access(String),

    /// The requested operation is not supported in this context, e.g. an
    /// experimental model without the enabling environment flag, or a
    /// reboot requested on a role that lacks it.
    #[error("unsupported: {reason}")]
    Unsupported { reason: String },

    /// The requested capability is not currently exposed by any of the
    /// board's interfaces.
    #[error("capability not available on this board")]
    Mode,

    /// Firmware exceeds the model's code size.
    #[error("firmware size {firmware_size} exceeds code size {code_size} for this model")]
    Range { firmware_size: usize, code_size: usize },

    /// The firmware signature scan failed, or selected a model incompatible
    /// with the target board.
    #[error("firmware signature mismatch: {reason}")]
    Firmware { reason: String },

    /// A platform primitive (timer, mutex, monitor handle) failed in a way
    /// that is generally fatal to the monitor.
    #[error("platform failure: {0}")]
    System(String),

    /// Timed out waiting for a retriable write to succeed within its
    /// deadline.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl CoreError {
    /// Whether this error represents a transient condition a retry loop
    /// should attempt again (distinct from whether the *caller* should
    /// retry the whole operation).
    pub fn is_retriable(&self) -> bool {
        matches!(self, CoreError::Io(_) | CoreError::Timeout { .. })
    }

    /// A stable, short identifier for this error class, useful for callers
    /// that want to match on error kind without matching on variant shape.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Memory => "CORE-MEMORY",
            CoreError::Io(_) => "CORE-IO",
            CoreError::NotFound => "CORE-NOT_FOUND",
            CoreError::Access(_) => "CORE-ACCESS",
            CoreError::Unsupported { .. } => "CORE-UNSUPPORTED",
            CoreError::Mode => "CORE-MODE",
            CoreError::Range { .. } => "CORE-RANGE",
            CoreError::Firmware { .. } => "CORE-FIRMWARE",
            CoreError::System(_) => "CORE-SYSTEM",
            CoreError::Timeout { .. } => "CORE-TIMEOUT",
        }
    }
}
