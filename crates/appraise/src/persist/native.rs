//! Native binary container: a fixed header followed by a Postcard payload.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("APRS")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Flags (bitfield, LE)
//! 8       4     Payload size in bytes (LE)
//! 12      4     CRC32 of the payload (LE)
//! 16      4     Number of features (LE)
//! 20      4     Number of learners (LE)
//! ```

use std::io::{Read, Write};

use crate::model::ModelError;

/// Magic bytes identifying a model file.
pub const MAGIC: &[u8; 4] = b"APRS";

pub const CURRENT_VERSION_MAJOR: u8 = 1;
pub const CURRENT_VERSION_MINOR: u8 = 0;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 24;

// ============================================================================
// Flags
// ============================================================================

/// Bitfield of model properties recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags(u16);

impl FormatFlags {
    /// The model was trained.
    pub const TRAINED: u16 = 1 << 0;
    /// The payload carries training metrics.
    pub const HAS_METRICS: u16 = 1 << 1;

    const KNOWN: u16 = Self::TRAINED | Self::HAS_METRICS;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    /// Bits this version does not understand.
    pub const fn unknown_bits(self) -> u16 {
        self.0 & !Self::KNOWN
    }
}

// ============================================================================
// Header
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: FormatFlags,
    pub payload_size: u32,
    pub checksum: u32,
    pub num_features: u32,
    pub num_learners: u32,
}

impl FormatHeader {
    pub fn new(flags: FormatFlags, num_features: u32, num_learners: u32) -> Self {
        Self {
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            flags,
            payload_size: 0,
            checksum: 0,
            num_features,
            num_learners,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6..8].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf[16..20].copy_from_slice(&self.num_features.to_le_bytes());
        buf[20..24].copy_from_slice(&self.num_learners.to_le_bytes());
        buf
    }

    /// Parse and check magic, version and flags.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, DeserializeError> {
        if &buf[0..4] != MAGIC {
            return Err(DeserializeError::NotAModel);
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major != CURRENT_VERSION_MAJOR {
            return Err(DeserializeError::UnsupportedVersion { major: version_major, minor: version_minor });
        }

        let flags = FormatFlags::from_bits(u16::from_le_bytes([buf[6], buf[7]]));
        if flags.unknown_bits() != 0 {
            return Err(DeserializeError::UnknownFlags(flags.unknown_bits()));
        }

        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Ok(Self {
            version_major,
            version_minor,
            flags,
            payload_size: word(8),
            checksum: word(12),
            num_features: word(16),
            num_learners: word(20),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload of {0} bytes exceeds the format limit")]
    PayloadTooLarge(usize),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("not an appraise model")]
    NotAModel,

    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("unknown format flags {0:#06x}")]
    UnknownFlags(u16),

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding error: {0}")]
    Decoding(#[from] postcard::Error),

    #[error("JSON decoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("inconsistent model: {0}")]
    Invalid(#[from] ModelError),
}

pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// ============================================================================
// NativeCodec
// ============================================================================

/// Reads and writes header-framed Postcard payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl NativeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Write header and payload. Fills in the header's size and checksum.
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
        header: &mut FormatHeader,
        payload: &[u8],
    ) -> Result<(), SerializeError> {
        header.payload_size =
            u32::try_from(payload.len()).map_err(|_| SerializeError::PayloadTooLarge(payload.len()))?;
        header.checksum = compute_checksum(payload);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(payload)?;
        Ok(())
    }

    /// Read header and payload, verifying the checksum.
    pub fn read_from<R: Read>(&self, reader: &mut R) -> Result<(FormatHeader, Vec<u8>), DeserializeError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        read_exact(reader, &mut header_buf)?;
        let header = FormatHeader::from_bytes(&header_buf)?;

        let mut payload = vec![0u8; header.payload_size as usize];
        read_exact(reader, &mut payload)?;

        let actual = compute_checksum(&payload);
        if actual != header.checksum {
            return Err(DeserializeError::ChecksumMismatch { expected: header.checksum, actual });
        }
        Ok((header, payload))
    }

    /// Encode `payload` with Postcard and frame it.
    pub fn serialize<T: serde::Serialize>(
        &self,
        mut header: FormatHeader,
        payload: &T,
    ) -> Result<Vec<u8>, SerializeError> {
        let payload_bytes = postcard::to_allocvec(payload)?;
        let mut output = Vec::with_capacity(HEADER_SIZE + payload_bytes.len());
        self.write_to(&mut output, &mut header, &payload_bytes)?;
        Ok(output)
    }

    /// Decode a framed payload. The slice must hold exactly one model.
    pub fn deserialize<T: serde::de::DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<(FormatHeader, T), DeserializeError> {
        let mut cursor = bytes;
        let (header, payload_bytes) = self.read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(DeserializeError::CorruptPayload(format!(
                "{} trailing bytes after payload",
                cursor.len()
            )));
        }
        let (payload, rest) = postcard::take_from_bytes(&payload_bytes)?;
        if !rest.is_empty() {
            return Err(DeserializeError::CorruptPayload("payload has unread bytes".into()));
        }
        Ok((header, payload))
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DeserializeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(DeserializeError::Truncated { expected: buf.len(), actual: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(DeserializeError::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = FormatHeader {
            version_major: 1,
            version_minor: 3,
            flags: FormatFlags::from_bits(FormatFlags::TRAINED | FormatFlags::HAS_METRICS),
            payload_size: 12345,
            checksum: 0xDEADBEEF,
            num_features: 21,
            num_learners: 2,
        };
        let bytes = header.to_bytes();
        assert_eq!(FormatHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_magic_version_and_flags() {
        let mut buf = FormatHeader::new(FormatFlags::empty(), 1, 1).to_bytes();
        buf[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(FormatHeader::from_bytes(&buf), Err(DeserializeError::NotAModel)));

        let mut header = FormatHeader::new(FormatFlags::empty(), 1, 1);
        header.version_major = 9;
        assert!(matches!(
            FormatHeader::from_bytes(&header.to_bytes()),
            Err(DeserializeError::UnsupportedVersion { major: 9, .. })
        ));

        let header = FormatHeader::new(FormatFlags::from_bits(1 << 7), 1, 1);
        assert!(matches!(
            FormatHeader::from_bytes(&header.to_bytes()),
            Err(DeserializeError::UnknownFlags(0x80))
        ));
    }

    #[test]
    fn codec_detects_corruption_and_truncation() {
        let codec = NativeCodec::new();
        let mut header = FormatHeader::new(FormatFlags::empty(), 3, 1);
        let mut buffer = Vec::new();
        codec.write_to(&mut buffer, &mut header, b"some model data").unwrap();

        let (read_header, payload) = codec.read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(read_header.num_features, 3);
        assert_eq!(payload, b"some model data");

        let mut corrupt = buffer.clone();
        corrupt[HEADER_SIZE + 2] ^= 0xFF;
        assert!(matches!(
            codec.read_from(&mut corrupt.as_slice()),
            Err(DeserializeError::ChecksumMismatch { .. })
        ));

        let short = &buffer[..buffer.len() - 4];
        assert!(matches!(
            codec.read_from(&mut &short[..]),
            Err(DeserializeError::Truncated { expected: 15, actual: 11 })
        ));
        assert!(matches!(
            codec.read_from(&mut &buffer[..10]),
            Err(DeserializeError::Truncated { expected: HEADER_SIZE, actual: 10 })
        ));
    }

    #[test]
    fn deserialize_rejects_trailing_bytes() {
        let codec = NativeCodec::new();
        let mut bytes = codec.serialize(FormatHeader::new(FormatFlags::empty(), 0, 0), &42u32).unwrap();
        let (_, value): (_, u32) = codec.deserialize(&bytes).unwrap();
        assert_eq!(value, 42);

        bytes.push(0);
        assert!(matches!(
            codec.deserialize::<u32>(&bytes),
            Err(DeserializeError::CorruptPayload(_))
        ));
    }
}
