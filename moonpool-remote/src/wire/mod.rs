//! Frame format for the endpoint stream.
//!
//! Frame format: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload
//! - **payload**: One codec-encoded [`RemoteMessage`](crate::RemoteMessage)
//!
//! A whole message batch travels as a single frame, so a reader either sees
//! the complete batch or nothing.

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (1MB).
///
/// Frames larger than this are rejected to prevent memory exhaustion.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    PacketTooLarge {
        /// Actual payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },
}

/// Fixed-size header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame size including header.
    pub length: u32,
    /// CRC32C checksum of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Serialize header into buffer (must be at least HEADER_SIZE bytes).
    pub fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// Deserialize header from buffer.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if buffer is smaller than HEADER_SIZE, and
    /// `InvalidLength` / `PacketTooLarge` if the length field is out of range.
    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }

        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let checksum = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        if (length as usize) < HEADER_SIZE {
            return Err(WireError::InvalidLength { length });
        }
        let payload_len = length as usize - HEADER_SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::PacketTooLarge { size: payload_len });
        }

        Ok(Self { length, checksum })
    }
}

/// Serialize a payload into one frame.
///
/// # Errors
///
/// Returns `PacketTooLarge` if payload exceeds MAX_PAYLOAD_SIZE.
///
/// # Examples
///
/// ```
/// use moonpool_remote::wire::{serialize_frame, try_deserialize_frame};
///
/// let frame = serialize_frame(b"hello").expect("serialize");
/// let (payload, consumed) = try_deserialize_frame(&frame)
///     .expect("valid")
///     .expect("complete");
/// assert_eq!(payload, b"hello");
/// assert_eq!(consumed, frame.len());
/// ```
pub fn serialize_frame(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::PacketTooLarge {
            size: payload.len(),
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let mut data = vec![0u8; total_length];

    let header = FrameHeader {
        length: total_length as u32,
        checksum: crc32c::crc32c(payload),
    };

    header.serialize_into(&mut data[..HEADER_SIZE]);
    data[HEADER_SIZE..].copy_from_slice(payload);

    Ok(data)
}

/// Try to deserialize one frame from a buffer that may hold partial data.
///
/// # Returns
///
/// - `Ok(Some((payload, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed (not an error condition)
/// - `Err` if data is malformed
pub fn try_deserialize_frame(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>, WireError> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = FrameHeader::deserialize(data)?;

    let expected_len = header.length as usize;
    if data.len() < expected_len {
        return Ok(None);
    }

    let payload = &data[HEADER_SIZE..expected_len];

    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(WireError::ChecksumMismatch {
            expected: header.checksum,
            actual: computed,
        });
    }

    Ok(Some((payload.to_vec(), expected_len)))
}
