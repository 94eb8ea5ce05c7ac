use crate::version::SchemaVersion;

/// Magic byte identifying a stored Noi entity.
pub const MAGIC_BYTE: u8 = 0xCE;

/// Bytes before the version token: magic byte and token length.
pub const ENVELOPE_PREFIX_SIZE: usize = 2;

/// A version envelope wrapping a serialized entity.
///
/// Binary format:
/// ```text
/// [MAGIC: 0xCE][LEN: u8][VERSION: LEN bytes of UTF-8][PAYLOAD: N bytes]
/// ```
///
/// # Example
///
/// ```
/// use noi_migrate::{SchemaVersion, VersionedEnvelope};
///
/// let version = SchemaVersion::parse("2016.12.0").unwrap();
/// let envelope = VersionedEnvelope::new(version.clone(), b"entity".to_vec());
///
/// let bytes = envelope.to_bytes().unwrap();
/// let decoded = VersionedEnvelope::from_bytes(&bytes).unwrap();
///
/// assert_eq!(decoded.version, version);
/// assert_eq!(decoded.payload, b"entity");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedEnvelope {
    /// Schema version the payload was written under.
    pub version: SchemaVersion,
    pub payload: Vec<u8>,
}

/// Error parsing a version envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("data too short for version envelope")]
    TooShort,
    #[error("invalid magic byte: 0x{0:02X}, expected 0xCE")]
    InvalidMagic(u8),
    #[error("invalid version token in envelope: {0:?}")]
    InvalidVersion(String),
    #[error("version token of {0} bytes does not fit the envelope header")]
    VersionTooLong(usize),
}

impl VersionedEnvelope {
    pub fn new(version: SchemaVersion, payload: Vec<u8>) -> Self {
        Self { version, payload }
    }

    /// Serialize the envelope to bytes.
    ///
    /// Fails when the version token is longer than 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let token = self.version.as_str().as_bytes();
        let len = u8::try_from(token.len()).map_err(|_| EnvelopeError::VersionTooLong(token.len()))?;
        let mut bytes = Vec::with_capacity(ENVELOPE_PREFIX_SIZE + token.len() + self.payload.len());
        bytes.push(MAGIC_BYTE);
        bytes.push(len);
        bytes.extend_from_slice(token);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Parse an envelope from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvelopeError> {
        let (version, header) = Self::read_header(data)?;
        Ok(Self {
            version,
            payload: data[header..].to_vec(),
        })
    }

    /// Peek at the version without copying the payload.
    pub fn peek_version(data: &[u8]) -> Result<SchemaVersion, EnvelopeError> {
        Self::read_header(data).map(|(version, _)| version)
    }

    /// Check if bytes look like a versioned envelope (starts with magic byte).
    pub fn is_versioned(data: &[u8]) -> bool {
        data.first() == Some(&MAGIC_BYTE)
    }

    fn read_header(data: &[u8]) -> Result<(SchemaVersion, usize), EnvelopeError> {
        if data.len() < ENVELOPE_PREFIX_SIZE {
            return Err(EnvelopeError::TooShort);
        }
        if data[0] != MAGIC_BYTE {
            return Err(EnvelopeError::InvalidMagic(data[0]));
        }
        let end = ENVELOPE_PREFIX_SIZE + data[1] as usize;
        let token = data
            .get(ENVELOPE_PREFIX_SIZE..end)
            .ok_or(EnvelopeError::TooShort)?;
        let token = core::str::from_utf8(token)
            .map_err(|_| EnvelopeError::InvalidVersion(String::from_utf8_lossy(token).into_owned()))?;
        let version = SchemaVersion::parse(token)
            .map_err(|_| EnvelopeError::InvalidVersion(token.to_string()))?;
        Ok((version, end))
    }
}
