//! The HalfKay bootloader protocol: packet framing plus the upload, reset,
//! and reboot operations built on top of it.

pub mod packet;
pub mod protocol;

pub use protocol::{reboot, reset, send_with_retry, upload};
