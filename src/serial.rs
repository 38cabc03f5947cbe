//! Bootloader/runtime serial number parsing, and the cross-mode
//! reconciliation rule used when merging a new interface into an existing
//! board.

/// The AVR family marker returned when a bootloader-mode device reports no
/// serial number string at all.
pub const AVR_NO_SERIAL_MARKER: u64 = 12_345;

/// Observed on unprogrammed beta boards: a bootloader serial of hex `0x64`
/// (decimal 100) means "absent", not "serial number 100".
const BOOTLOADER_ABSENT_VALUE: u64 = 100;

/// Runtime serials below this threshold get a trailing zero appended to
/// compensate for a driver quirk on one host OS, mitigated by newer
/// firmware appending the zero itself.
const RUNTIME_WORKAROUND_THRESHOLD: u64 = 10_000_000;

/// Parse a bootloader-mode serial number string (hexadecimal, base 16,
/// possibly with leading zeros).
///
/// An absent string returns the AVR family marker `12345`. A parsed value of
/// exactly `100` (hex `0x64`) is treated as "absent" and normalized to `0`,
/// matching the behavior observed on unprogrammed beta boards. Every other
/// parsed value is scaled by 10, the same driver-quirk compensation the
/// runtime path applies, so a board's serial reads the same canonical value
/// regardless of which mode first reported it.
pub fn parse_bootloader_serial(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return AVR_NO_SERIAL_MARKER;
    };
    match u64::from_str_radix(raw.trim(), 16) {
        Ok(BOOTLOADER_ABSENT_VALUE) => 0,
        Ok(value) => value * 10,
        Err(_) => AVR_NO_SERIAL_MARKER,
    }
}

/// Parse a runtime-mode serial number string (decimal, base 10).
///
/// Values below 10,000,000 are multiplied by 10 to compensate for a driver
/// quirk on one host OS; newer firmware already appends the zero itself, so
/// this only affects boards running older firmware.
pub fn parse_runtime_serial(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value < RUNTIME_WORKAROUND_THRESHOLD => value * 10,
        Ok(value) => value,
        Err(_) => 0,
    }
}

/// Outcome of reconciling a newly observed interface serial against a
/// board's already-recorded serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialReconciliation {
    /// Serials match, or the board had no serial recorded yet.
    Consistent,
    /// The interface serial is 10x the board's serial — the board's
    /// firmware predates the runtime workaround. Accept the interface but
    /// the caller should warn.
    PredatesWorkaround,
    /// Serials disagree and cannot be explained by the workaround — this is
    /// a different physical board at the same location.
    Mismatch,
}

/// Reconcile an interface's parsed serial number against the board's
/// currently recorded serial (0 if none recorded yet).
pub fn reconcile(board_serial: u64, interface_serial: u64) -> SerialReconciliation {
    if board_serial == 0 || interface_serial == 0 || board_serial == interface_serial {
        return SerialReconciliation::Consistent;
    }
    if interface_serial == board_serial.saturating_mul(10) {
        return SerialReconciliation::PredatesWorkaround;
    }
    SerialReconciliation::Mismatch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootloader_absent_returns_avr_marker() {
        assert_eq!(parse_bootloader_serial(None), AVR_NO_SERIAL_MARKER);
    }

    #[test]
    fn bootloader_hex_100_means_absent() {
        assert_eq!(parse_bootloader_serial(Some("00000064")), 0);
        assert_eq!(parse_bootloader_serial(Some("64")), 0);
    }

    #[test]
    fn bootloader_parses_hex_with_leading_zeros_and_scales_by_ten() {
        assert_eq!(parse_bootloader_serial(Some("00000C81")), 32_010);
    }

    #[test]
    fn bootloader_unparseable_falls_back_to_avr_marker() {
        assert_eq!(parse_bootloader_serial(Some("not-hex")), AVR_NO_SERIAL_MARKER);
    }

    #[test]
    fn runtime_absent_is_zero() {
        assert_eq!(parse_runtime_serial(None), 0);
        assert_eq!(parse_runtime_serial(Some("")), 0);
    }

    #[test]
    fn runtime_small_value_gets_trailing_zero() {
        assert_eq!(parse_runtime_serial(Some("1234")), 12_340);
    }

    #[test]
    fn runtime_large_value_is_unchanged() {
        assert_eq!(parse_runtime_serial(Some("12345678")), 12_345_678);
    }

    #[test]
    fn runtime_boundary_value_is_unchanged() {
        assert_eq!(parse_runtime_serial(Some("10000000")), 10_000_000);
    }

    #[test]
    fn reconciliation_consistent_when_board_has_no_serial() {
        assert_eq!(reconcile(0, 32_010), SerialReconciliation::Consistent);
    }

    #[test]
    fn reconciliation_detects_predates_workaround() {
        assert_eq!(reconcile(3201, 32_010), SerialReconciliation::PredatesWorkaround);
    }

    #[test]
    fn reconciliation_detects_mismatch() {
        assert_eq!(reconcile(3201, 9_999), SerialReconciliation::Mismatch);
    }
}
