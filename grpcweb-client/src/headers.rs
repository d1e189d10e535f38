//! Request-header construction and response validation.

use std::time::Duration;

use grpcweb_core::{accept_encoding_header, match_encoding, Code, Compression};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, TE};
use http::StatusCode;

use crate::error::ClientError;

/// Content-type prefix shared by every gRPC-Web response.
pub(crate) const CONTENT_TYPE_PREFIX: &str = "application/grpc-web";

/// Content-type for the binary (protobuf) format.
pub(crate) const CONTENT_TYPE_PROTO: &str = "application/grpc-web+proto";

/// Content-type for the textual (JSON) format.
pub(crate) const CONTENT_TYPE_JSON: &str = "application/grpc-web+json";

pub(crate) const HEADER_GRPC_WEB: &str = "x-grpc-web";
pub(crate) const HEADER_TIMEOUT: &str = "grpc-timeout";
pub(crate) const HEADER_ENCODING: &str = "grpc-encoding";
pub(crate) const HEADER_ACCEPT_ENCODING: &str = "grpc-accept-encoding";
pub(crate) const HEADER_STATUS: &str = "grpc-status";

/// The content-type for the configured message format.
pub(crate) fn content_type(use_binary: bool) -> &'static str {
    if use_binary {
        CONTENT_TYPE_PROTO
    } else {
        CONTENT_TYPE_JSON
    }
}

/// Headers the protocol owns; user-supplied values for these are ignored.
pub(crate) fn is_reserved_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("grpc-")
        || name == "content-type"
        || name == "te"
        || name == HEADER_GRPC_WEB
        || name == "content-length"
}

/// Format a deadline as a `grpc-timeout` header value.
///
/// The unit is chosen so the numeric part stays under 8 digits, starting
/// from milliseconds and climbing to hours. Durations of zero or beyond
/// the representable range produce no header.
pub(crate) fn grpc_timeout_value(timeout: Duration) -> Option<String> {
    const MAX_DIGITS: u128 = 100_000_000;

    let millis = timeout.as_millis();
    if millis == 0 {
        return None;
    }
    if millis < MAX_DIGITS {
        return Some(format!("{millis}m"));
    }
    let secs = millis / 1_000;
    if secs < MAX_DIGITS {
        return Some(format!("{secs}S"));
    }
    let minutes = secs / 60;
    if minutes < MAX_DIGITS {
        return Some(format!("{minutes}M"));
    }
    let hours = minutes / 60;
    if hours < MAX_DIGITS {
        return Some(format!("{hours}H"));
    }
    None
}

/// Build the request headers for a call.
///
/// Protocol headers come first; user headers are merged last and win on
/// conflict, except for the reserved set the protocol owns.
pub(crate) fn build_request_headers(
    use_binary: bool,
    timeout: Option<Duration>,
    send_compression: Option<&Compression>,
    accept_compression: &[Compression],
    user_headers: &HeaderMap,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(use_binary)));
    headers.insert(HEADER_GRPC_WEB, HeaderValue::from_static("1"));
    headers.insert(TE, HeaderValue::from_static("trailers"));

    if let Some(value) = timeout.and_then(grpc_timeout_value) {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HEADER_TIMEOUT, value);
        }
    }

    if let Some(codec) = send_compression {
        headers.insert(HEADER_ENCODING, HeaderValue::from_static(codec.name()));
    }

    if let Some(accept) = accept_encoding_header(accept_compression) {
        if let Ok(value) = HeaderValue::from_str(&accept) {
            headers.insert(HEADER_ACCEPT_ENCODING, value);
        }
    }

    for (name, value) in user_headers.iter() {
        if !is_reserved_header(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    headers
}

/// Outcome of validating a response head.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    /// The matched decompression codec; `None` means identity.
    pub codec: Option<Compression>,
    /// True for a trailers-only response: the headers are the trailers and
    /// the body must be empty.
    pub found_status: bool,
}

/// Map an HTTP status to the gRPC code it implies.
pub(crate) fn http_status_to_code(status: StatusCode) -> Code {
    match status.as_u16() {
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::Unimplemented,
        429 | 502 | 503 | 504 => Code::Unavailable,
        _ => Code::Unknown,
    }
}

/// Validate the HTTP status and headers of a response.
pub(crate) fn validate_response(
    status: StatusCode,
    headers: &HeaderMap,
    use_binary: bool,
    accept_compression: &[Compression],
) -> Result<ResponseHead, ClientError> {
    if status != StatusCode::OK {
        return Err(ClientError::new(
            http_status_to_code(status),
            format!(
                "HTTP {}{}{}",
                status.as_u16(),
                if status.canonical_reason().is_some() { " " } else { "" },
                status.canonical_reason().unwrap_or(""),
            ),
        ));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    validate_content_type(content_type, use_binary)?;

    let encoding = headers
        .get(HEADER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let codec = match_encoding(encoding, accept_compression)
        .map_err(|_| {
            ClientError::new(
                Code::Internal,
                format!("unsupported response encoding {encoding:?}"),
            )
        })?
        .cloned();

    let found_status = headers.contains_key(HEADER_STATUS);

    Ok(ResponseHead {
        codec,
        found_status,
    })
}

/// Check the response content-type against the configured format.
fn validate_content_type(value: &str, use_binary: bool) -> Result<(), ClientError> {
    // Parameters after ";" are irrelevant here.
    let media_type = value.split(';').next().unwrap_or("").trim();

    let Some(suffix) = media_type.strip_prefix(CONTENT_TYPE_PREFIX) else {
        return Err(ClientError::new(
            Code::Unimplemented,
            format!("unsupported content-type {value:?}"),
        ));
    };

    // Bare "application/grpc-web" means the binary format.
    let binary = match suffix {
        "" | "+proto" => true,
        "+json" => false,
        _ => {
            return Err(ClientError::new(
                Code::Unimplemented,
                format!("unsupported content-type {value:?}"),
            ));
        }
    };

    if binary != use_binary {
        return Err(ClientError::Protocol(format!(
            "unexpected response content-type {value:?}"
        )));
    }

    Ok(())
}
