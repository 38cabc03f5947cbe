//! The HalfKay protocol engine: retry-with-deadline sends, the upload
//! sequence, and reset/reboot commands.

use crate::board::Role;
use crate::error::{CoreError, CoreResult};
use crate::family::ModelDescriptor;
use crate::platform::{OpenHandle, Platform, SerialConfig};

use super::packet;

/// Deadline for a single upload block write, including retries.
pub const UPLOAD_BLOCK_DEADLINE_MS: u64 = 3_000;
/// Deadline for the reset (jump-to-application) write.
pub const RESET_DEADLINE_MS: u64 = 250;
/// Pause after the first upload block, while the bootloader performs a full
/// chip erase.
pub const ERASE_DELAY_MS: u64 = 200;
/// Pause after every subsequent upload block, to avoid a STALL.
pub const BLOCK_DELAY_MS: u64 = 20;

pub const SERIAL_REBOOT_BAUD: u32 = 134;
pub const SERIAL_NORMAL_BAUD: u32 = 115_200;
pub const SEREMU_REBOOT_REPORT: [u8; 5] = [0x00, 0xA9, 0x45, 0xC2, 0x6B];

/// Write `packet`, retrying transient I/O errors with a 10ms pause until
/// `deadline_ms` has elapsed since the first attempt. Non-transient errors
/// abort immediately.
pub fn send_with_retry(
    platform: &mut dyn Platform,
    handle: OpenHandle,
    packet: &[u8],
    deadline_ms: u64,
    log: &dyn Fn(&str),
) -> CoreResult<()> {
    let start = platform.millis();
    loop {
        match platform.hid_write(handle, packet) {
            Ok(_) => return Ok(()),
            Err(err) if err.is_retriable() => {
                let elapsed = platform.millis() - start;
                if elapsed >= deadline_ms {
                    return Err(CoreError::Timeout { elapsed_ms: elapsed });
                }
                log(&format!("retrying HalfKay write after transient error: {err}"));
                platform.sleep(10);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Upload `image` to the bootloader reachable through `handle`.
///
/// Refuses experimental models unless `experimental_enabled` is set, and
/// firmware exceeding the model's code size. `progress(offset, total)` is
/// invoked once before the first write (offset 0) and once after every
/// block write.
pub fn upload(
    platform: &mut dyn Platform,
    handle: OpenHandle,
    model: &ModelDescriptor,
    experimental_enabled: bool,
    image: &[u8],
    log: &dyn Fn(&str),
    mut progress: impl FnMut(usize, usize),
) -> CoreResult<()> {
    if model.experimental && !experimental_enabled {
        return Err(CoreError::Unsupported {
            reason: format!("model {} is experimental and TY_EXPERIMENTAL_BOARDS is not set", model.name),
        });
    }
    if image.len() > model.code_size {
        return Err(CoreError::Range { firmware_size: image.len(), code_size: model.code_size });
    }

    let total = image.len();
    progress(0, total);

    let mut pos = 0usize;
    let mut first_block = true;
    loop {
        let write_packet = packet::build_write_packet(model.halfkay_version, pos as u32, image, pos, model.block_size);
        send_with_retry(platform, handle, &write_packet, UPLOAD_BLOCK_DEADLINE_MS, log)?;
        platform.sleep(if first_block { ERASE_DELAY_MS } else { BLOCK_DELAY_MS });
        first_block = false;

        pos = (pos + model.block_size).min(total);
        progress(pos, total);
        if pos >= total {
            break;
        }
    }
    Ok(())
}

/// Send the zero-length jump-to-application packet.
pub fn reset(platform: &mut dyn Platform, handle: OpenHandle, model: &ModelDescriptor, log: &dyn Fn(&str)) -> CoreResult<()> {
    let reset_packet = packet::build_reset_packet(model.halfkay_version, model.block_size);
    send_with_retry(platform, handle, &reset_packet, RESET_DEADLINE_MS, log)
}

/// Reboot a running application back into the bootloader. Only `Serial` and
/// `Seremu` roles support this; other roles return `CoreError::Unsupported`.
pub fn reboot(platform: &mut dyn Platform, handle: OpenHandle, role: Role) -> CoreResult<()> {
    match role {
        Role::Serial => {
            platform.serial_set_config(handle, SerialConfig { baud_rate: SERIAL_REBOOT_BAUD })?;
            let _ = platform.serial_set_config(handle, SerialConfig { baud_rate: SERIAL_NORMAL_BAUD });
            Ok(())
        }
        Role::Seremu => platform.hid_send_feature_report(handle, &SEREMU_REBOOT_REPORT),
        _ => Err(CoreError::Unsupported {
            reason: format!("{} interfaces cannot reboot into the bootloader", role.name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::HalfkayVersion;
    use crate::platform::{DeviceEvent, DeviceHandle, IterControl};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct RecordingPlatform {
        clock: AtomicU64,
        writes: Mutex<Vec<Vec<u8>>>,
        sleeps: Mutex<Vec<u64>>,
        feature_reports: Mutex<Vec<Vec<u8>>>,
        baud_rates: Mutex<Vec<u32>>,
        fail_next_writes: Mutex<usize>,
    }

    impl RecordingPlatform {
        fn new() -> Self {
            RecordingPlatform {
                clock: AtomicU64::new(0),
                writes: Mutex::new(Vec::new()),
                sleeps: Mutex::new(Vec::new()),
                feature_reports: Mutex::new(Vec::new()),
                baud_rates: Mutex::new(Vec::new()),
                fail_next_writes: Mutex::new(0),
            }
        }
    }

    impl Platform for RecordingPlatform {
        fn list(&mut self, _on_event: &mut dyn FnMut(DeviceEvent) -> IterControl) -> CoreResult<()> {
            Ok(())
        }
        fn refresh(&mut self, _on_event: &mut dyn FnMut(DeviceEvent) -> IterControl) -> CoreResult<()> {
            Ok(())
        }
        fn open(&mut self, _device: DeviceHandle, _mode: crate::platform::OpenMode) -> CoreResult<OpenHandle> {
            Ok(OpenHandle(1))
        }
        fn close(&mut self, _handle: OpenHandle) -> CoreResult<()> {
            Ok(())
        }
        fn hid_read(&mut self, _handle: OpenHandle, _buf: &mut [u8], _timeout_ms: u64) -> CoreResult<usize> {
            Ok(0)
        }
        fn hid_write(&mut self, _handle: OpenHandle, buf: &[u8]) -> CoreResult<usize> {
            let mut remaining = self.fail_next_writes.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CoreError::Io("transient".into()));
            }
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }
        fn hid_send_feature_report(&mut self, _handle: OpenHandle, buf: &[u8]) -> CoreResult<()> {
            self.feature_reports.lock().unwrap().push(buf.to_vec());
            Ok(())
        }
        fn serial_read(&mut self, _handle: OpenHandle, _buf: &mut [u8], _timeout_ms: u64) -> CoreResult<usize> {
            Ok(0)
        }
        fn serial_write(&mut self, _handle: OpenHandle, _buf: &[u8]) -> CoreResult<usize> {
            Ok(0)
        }
        fn serial_set_config(&mut self, _handle: OpenHandle, config: SerialConfig) -> CoreResult<()> {
            self.baud_rates.lock().unwrap().push(config.baud_rate);
            Ok(())
        }
        fn millis(&self) -> u64 {
            self.clock.load(Ordering::SeqCst)
        }
        fn sleep(&self, duration_ms: u64) {
            self.sleeps.lock().unwrap().push(duration_ms);
        }
        fn poll(&mut self, _timeout_ms: i64) -> CoreResult<bool> {
            Ok(false)
        }
    }

    fn teensy_3_0() -> &'static ModelDescriptor {
        crate::family::teensy::MODELS.iter().find(|m| m.name == "Teensy 3.0").unwrap()
    }

    #[test]
    fn scenario_s4_upload_sends_two_blocks_with_erase_then_block_delay() {
        let mut platform = RecordingPlatform::new();
        let image = vec![0x7Eu8; 2048];
        let mut offsets = Vec::new();
        upload(&mut platform, OpenHandle(1), teensy_3_0(), false, &image, &|_| {}, |offset, _total| {
            offsets.push(offset);
        })
        .unwrap();

        let writes = platform.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), 1 + 64 + 1024);
        assert_eq!(writes[1].len(), 1 + 64 + 1024);

        let sleeps = platform.sleeps.lock().unwrap();
        assert_eq!(*sleeps, vec![200, 20]);
        assert_eq!(offsets, vec![0, 1024, 2048]);
    }

    #[test]
    fn upload_rejects_firmware_larger_than_code_size() {
        let mut platform = RecordingPlatform::new();
        let image = vec![0u8; teensy_3_0().code_size + 1];
        let result = upload(&mut platform, OpenHandle(1), teensy_3_0(), false, &image, &|_| {}, |_, _| {});
        assert!(matches!(result, Err(CoreError::Range { .. })));
    }

    #[test]
    fn upload_rejects_experimental_model_without_flag() {
        let mut platform = RecordingPlatform::new();
        let teensy_4_0 = crate::family::teensy::MODELS.iter().find(|m| m.name == "Teensy 4.0").unwrap();
        let result = upload(&mut platform, OpenHandle(1), teensy_4_0, false, &[0u8; 16], &|_| {}, |_, _| {});
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
    }

    #[test]
    fn upload_retries_transient_write_errors_within_deadline() {
        let mut platform = RecordingPlatform::new();
        *platform.fail_next_writes.lock().unwrap() = 2;
        let image = vec![0u8; 16];
        upload(&mut platform, OpenHandle(1), teensy_3_0(), false, &image, &|_| {}, |_, _| {}).unwrap();
        assert_eq!(platform.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn scenario_s6_seremu_reboot_sends_one_feature_report() {
        let mut platform = RecordingPlatform::new();
        reboot(&mut platform, OpenHandle(1), Role::Seremu).unwrap();
        let reports = platform.feature_reports.lock().unwrap();
        assert_eq!(*reports, vec![SEREMU_REBOOT_REPORT.to_vec()]);
    }

    #[test]
    fn scenario_s6_serial_reboot_sets_magic_baud_then_restores() {
        let mut platform = RecordingPlatform::new();
        reboot(&mut platform, OpenHandle(1), Role::Serial).unwrap();
        let bauds = platform.baud_rates.lock().unwrap();
        assert_eq!(*bauds, vec![134, 115_200]);
    }

    #[test]
    fn reboot_on_halfkay_role_is_unsupported() {
        let mut platform = RecordingPlatform::new();
        let result = reboot(&mut platform, OpenHandle(1), Role::HalfKay);
        assert!(matches!(result, Err(CoreError::Unsupported { .. })));
    }

    #[test]
    fn reset_packet_uses_model_protocol_version() {
        let mut platform = RecordingPlatform::new();
        reset(&mut platform, OpenHandle(1), teensy_3_0(), &|_| {}).unwrap();
        let writes = platform.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(&writes[0][1..4], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn v1_block_size_is_reflected_in_packet_length() {
        let model = ModelDescriptor {
            name: "test",
            mcu: "test",
            code_size: 256,
            halfkay_version: HalfkayVersion::V1,
            block_size: 128,
            usage_id: 0,
            experimental: false,
            family_name: "Teensy",
        };
        let mut platform = RecordingPlatform::new();
        let image = vec![0u8; 200];
        upload(&mut platform, OpenHandle(1), &model, false, &image, &|_| {}, |_, _| {}).unwrap();
        let writes = platform.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), 1 + 2 + 128);
    }
}
