//! The in-body trailer block codec.
//!
//! gRPC-Web carries the call's trailers as the payload of the final
//! envelope, serialized as an HTTP/1-style header block:
//!
//! ```text
//! grpc-status: 0\r\n
//! grpc-message: ...\r\n
//! ```
//!
//! This codec only handles the in-body block; HTTP trailers proper never
//! pass through here.

use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use prost::Message;

use crate::status::{Code, ErrorDetail, Status, StatusDetails};

/// Trailer name carrying the decimal status code.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer name carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Trailer name carrying the base64 `google.rpc.Status` payload.
pub const GRPC_STATUS_DETAILS_BIN: &str = "grpc-status-details-bin";

/// Trailer block errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TrailerError {
    /// A line in the block is not `name: value`.
    #[error("malformed trailer line: {0:?}")]
    MalformedLine(String),

    /// The block carries no `grpc-status` field.
    #[error("trailer is missing grpc-status")]
    MissingStatus,

    /// `grpc-status` is not a non-negative decimal integer.
    #[error("invalid grpc-status value: {0:?}")]
    InvalidStatus(String),

    /// `grpc-status-details-bin` failed to decode.
    #[error("invalid grpc-status-details-bin: {0}")]
    InvalidDetails(String),
}

/// Serialize a trailer map as an HTTP/1-style header block.
///
/// Names are written lowercase in map order, one `name: value\r\n` line per
/// value.
pub fn serialize_trailer(trailer: &HeaderMap) -> Bytes {
    let mut out = Vec::new();
    for (name, value) in trailer.iter() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    Bytes::from(out)
}

/// Parse an HTTP/1-style header block into a trailer map.
///
/// Tolerates CRLF and bare LF line endings; duplicate names collect all
/// their values.
pub fn parse_trailer(data: &[u8]) -> Result<HeaderMap, TrailerError> {
    let mut trailer = HeaderMap::new();

    for line in data.split(|&b| b == b'\n') {
        let line = match line {
            [rest @ .., b'\r'] => rest,
            _ => line,
        };
        if line.is_empty() {
            continue;
        }

        let text = || String::from_utf8_lossy(line).into_owned();
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| TrailerError::MalformedLine(text()))?;

        let name = HeaderName::from_bytes(&line[..colon])
            .map_err(|_| TrailerError::MalformedLine(text()))?;
        let value = trim_ascii(&line[colon + 1..]);
        let value =
            HeaderValue::from_bytes(value).map_err(|_| TrailerError::MalformedLine(text()))?;

        trailer.append(name, value);
    }

    Ok(trailer)
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Read the call outcome from a validated trailer map.
///
/// `grpc-status` must be present and parse as a non-negative decimal
/// integer; values outside the defined code range map to
/// [`Code::Unknown`]. A zero status is success and any `grpc-message` is
/// ignored; a non-zero status yields the percent-decoded message and the
/// details decoded from `grpc-status-details-bin` when present.
pub fn trailer_status(trailer: &HeaderMap) -> Result<Status, TrailerError> {
    let raw = trailer
        .get(GRPC_STATUS)
        .ok_or(TrailerError::MissingStatus)?
        .to_str()
        .map_err(|_| TrailerError::MissingStatus)?
        .trim()
        .to_owned();

    let value: i32 = raw
        .parse()
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| TrailerError::InvalidStatus(raw.clone()))?;

    let code = match Code::from_i32(value) {
        Some(code) => code,
        None => {
            return Ok(Status::new(
                Code::Unknown,
                format!("unknown grpc-status value {value}"),
            ));
        }
    };

    if code.is_ok() {
        return Ok(Status::from_code(Code::Ok));
    }

    let mut status = match trailer.get(GRPC_MESSAGE).and_then(|v| v.to_str().ok()) {
        Some(message) => Status::new(code, percent_decode(message)),
        None => Status::from_code(code),
    };

    if let Some(bin) = trailer.get(GRPC_STATUS_DETAILS_BIN) {
        for detail in decode_details(bin.as_bytes())? {
            status = status.add_error_detail(detail);
        }
    }

    Ok(status)
}

/// Decode the base64 `google.rpc.Status` payload into detail entries.
fn decode_details(encoded: &[u8]) -> Result<Vec<ErrorDetail>, TrailerError> {
    // Servers differ on padding; accept both.
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(encoded))
        .map_err(|e| TrailerError::InvalidDetails(e.to_string()))?;

    let proto = StatusDetails::decode(bytes.as_slice())
        .map_err(|e| TrailerError::InvalidDetails(e.to_string()))?;

    Ok(proto
        .details
        .into_iter()
        .map(|any| ErrorDetail::new(any.type_url, any.value))
        .collect())
}

/// Decode a percent-encoded `grpc-message` value.
///
/// Malformed escapes fall back to the raw input, matching gRPC's leniency
/// for messages that were never encoded.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = match bytes.get(i + 1..i + 3) {
                Some(hex) => hex,
                None => return input.to_string(),
            };
            let Ok(byte) = u8::from_str_radix(&String::from_utf8_lossy(hex), 16) else {
                return input.to_string();
            };
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}
