//! gRPC-Web envelope framing.
//!
//! Every payload on the gRPC-Web wire is carried in an envelope:
//!
//! ```text
//! [flags:1][length:4 big-endian][payload:length]
//! ```
//!
//! Two flag bits are defined: bit 0 marks a compressed payload, bit 7 marks
//! the trailer envelope. All other bits must be zero.

/// Envelope flag bits.
pub mod envelope_flags {
    /// Payload is compressed with the negotiated encoding.
    pub const COMPRESSED: u8 = 0b0000_0001;
    /// Payload is a serialized trailer block, not a message.
    pub const TRAILER: u8 = 0b1000_0000;
    /// All bits a well-formed envelope may carry.
    pub const KNOWN_MASK: u8 = COMPRESSED | TRAILER;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Not enough bytes for the 5-byte header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Flags byte carries bits outside the defined set.
    #[error("invalid envelope flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// Payload length exceeds the configured limit.
    #[error("envelope payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),
}

/// Wrap a payload in an envelope with the given flags.
pub fn wrap_envelope(payload: &[u8], flags: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse an envelope header from the front of `data`.
///
/// Returns `(flags, payload_length)`.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Reject flags that carry bits outside the defined set.
pub fn check_envelope_flags(flags: u8) -> Result<(), EnvelopeError> {
    if flags & !envelope_flags::KNOWN_MASK != 0 {
        return Err(EnvelopeError::InvalidFlags(flags));
    }
    Ok(())
}

/// Enforce a payload size limit against a declared envelope length.
pub fn check_payload_size(size: usize, limit: usize) -> Result<(), EnvelopeError> {
    if size > limit {
        return Err(EnvelopeError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_envelope_message() {
        let frame = wrap_envelope(b"hello", 0);

        assert_eq!(frame[0], 0x00);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_wrap_envelope_compressed() {
        let frame = wrap_envelope(b"hello", envelope_flags::COMPRESSED);
        assert_eq!(frame[0], 0x01);
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_wrap_envelope_trailer() {
        let frame = wrap_envelope(b"grpc-status: 0\r\n", envelope_flags::TRAILER);
        assert_eq!(frame[0], 0x80);
        assert_eq!(&frame[5..], b"grpc-status: 0\r\n");
    }

    #[test]
    fn test_wrap_envelope_empty_payload() {
        let frame = wrap_envelope(b"", 0);
        assert_eq!(frame.len(), ENVELOPE_HEADER_SIZE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            0
        );
    }

    #[test]
    fn test_parse_envelope_header() {
        let data = [0x80, 0x00, 0x00, 0x00, 0x10];
        let (flags, length) = parse_envelope_header(&data).unwrap();

        assert_eq!(flags, envelope_flags::TRAILER);
        assert_eq!(length, 16);
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let result = parse_envelope_header(&[0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_roundtrip() {
        let frame = wrap_envelope(b"payload", envelope_flags::COMPRESSED);
        let (flags, length) = parse_envelope_header(&frame).unwrap();

        assert_eq!(flags, envelope_flags::COMPRESSED);
        assert_eq!(length as usize, frame.len() - ENVELOPE_HEADER_SIZE);
        assert_eq!(&frame[ENVELOPE_HEADER_SIZE..], b"payload");
    }

    #[test]
    fn test_check_envelope_flags() {
        assert!(check_envelope_flags(0x00).is_ok());
        assert!(check_envelope_flags(0x01).is_ok());
        assert!(check_envelope_flags(0x80).is_ok());
        assert!(check_envelope_flags(0x81).is_ok());

        assert_eq!(check_envelope_flags(0x02), Err(EnvelopeError::InvalidFlags(0x02)));
        assert_eq!(check_envelope_flags(0x40), Err(EnvelopeError::InvalidFlags(0x40)));
        assert_eq!(check_envelope_flags(0xff), Err(EnvelopeError::InvalidFlags(0xff)));
    }

    #[test]
    fn test_check_payload_size() {
        assert!(check_payload_size(1024, 1024).is_ok());
        assert_eq!(
            check_payload_size(1025, 1024),
            Err(EnvelopeError::PayloadTooLarge {
                size: 1025,
                limit: 1024
            })
        );
    }
}
