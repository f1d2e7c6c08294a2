//! Persistent configuration store codec.
//!
//! Grounded on `eeprom_store_data`/`eeprom_restore_data`'s header format in
//! the original firmware: a small fixed header (version, payload length,
//! CRC32) followed by the serialized payload. This module only does the
//! framing; [`crate::hal::PersistentStore`] is the device-facing trait that
//! reads/writes raw bytes at an address, and `version` lets a caller reject
//! a payload written by an incompatible build after a firmware update.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Bytes occupied by the header before the payload starts.
pub const HEADER_LEN: usize = 8;

/// Update cadence for the slow-tick caller, matching the original's 6-hour
/// periodic flush.
pub const UPDATE_INTERVAL_S: u64 = 6 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreError {
    /// Fewer than [`HEADER_LEN`] bytes were available, or the buffer given
    /// to `decode` was too small for the header's claimed length.
    Truncated,
    /// The header's version did not match the version this build writes.
    VersionMismatch { found: u16, expected: u16 },
    /// The CRC32 over the payload did not match the header's stored value.
    CrcMismatch,
}

/// Writes `{version, len, crc32}` followed by `payload` into `out`.
/// Returns the number of bytes written, or `None` if `out` is too small.
pub fn encode(out: &mut [u8], version: u16, payload: &[u8]) -> Option<usize> {
    let total = HEADER_LEN + payload.len();
    if out.len() < total || payload.len() > u16::MAX as usize {
        return None;
    }

    let crc = CRC32.checksum(payload);
    out[0..2].copy_from_slice(&version.to_le_bytes());
    out[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    out[4..8].copy_from_slice(&crc.to_le_bytes());
    out[HEADER_LEN..total].copy_from_slice(payload);
    Some(total)
}

/// Validates the header and CRC in `buf` and returns the payload slice.
pub fn decode<'a>(buf: &'a [u8], expected_version: u16) -> Result<&'a [u8], RestoreError> {
    if buf.len() < HEADER_LEN {
        return Err(RestoreError::Truncated);
    }

    let version = u16::from_le_bytes([buf[0], buf[1]]);
    let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

    if version != expected_version {
        return Err(RestoreError::VersionMismatch { found: version, expected: expected_version });
    }

    if buf.len() < HEADER_LEN + len {
        return Err(RestoreError::Truncated);
    }

    let payload = &buf[HEADER_LEN..HEADER_LEN + len];
    if CRC32.checksum(payload) != crc {
        return Err(RestoreError::CrcMismatch);
    }

    Ok(payload)
}

/// True on the slow tick where a periodic flush is due, mirroring
/// `eeprom_update`'s `time(NULL) % EEPROM_UPDATE_INTERVAL == 0` check.
pub fn update_due(now: u64) -> bool {
    now > 0 && now % UPDATE_INTERVAL_S == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_payload() {
        let payload = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 32];
        let len = encode(&mut buf, 3, &payload).unwrap();
        let decoded = decode(&buf[..len], 3).unwrap();
        assert_eq!(decoded, &payload);
    }

    #[test]
    fn rejects_version_mismatch() {
        let payload = [1u8, 2, 3];
        let mut buf = [0u8; 32];
        let len = encode(&mut buf, 3, &payload).unwrap();
        assert_eq!(decode(&buf[..len], 4), Err(RestoreError::VersionMismatch { found: 3, expected: 4 }));
    }

    #[test]
    fn rejects_corrupted_payload() {
        let payload = [1u8, 2, 3];
        let mut buf = [0u8; 32];
        let len = encode(&mut buf, 3, &payload).unwrap();
        buf[HEADER_LEN] ^= 0xFF;
        assert_eq!(decode(&buf[..len], 3), Err(RestoreError::CrcMismatch));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let buf = [0u8; 4];
        assert_eq!(decode(&buf, 3), Err(RestoreError::Truncated));
    }

    #[test]
    fn encode_rejects_undersized_output() {
        let payload = [0u8; 10];
        let mut buf = [0u8; 4];
        assert_eq!(encode(&mut buf, 1, &payload), None);
    }

    #[test]
    fn update_due_fires_on_interval_boundary() {
        assert!(!update_due(0));
        assert!(!update_due(UPDATE_INTERVAL_S - 1));
        assert!(update_due(UPDATE_INTERVAL_S));
        assert!(!update_due(UPDATE_INTERVAL_S + 1));
    }
}
