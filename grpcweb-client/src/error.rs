//! Client-side error type.
//!
//! Every failure the transport can produce surfaces as a [`ClientError`];
//! [`ClientError::code`] maps each variant onto a gRPC status code.

use grpcweb_core::{Code, EnvelopeError, ErrorDetail, Status, TrailerError};

/// gRPC-Web client error.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// RPC status error, as reported by the server in trailers or a
    /// trailers-only response.
    #[error("{0}")]
    Rpc(Status),

    /// Transport-level error (connection failed, body stream broke, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message or envelope encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message or envelope decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol violation on the receive side (malformed envelope, missing
    /// trailer, unexpected data).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Create a status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Rpc(Status::new(code, message))
    }

    /// Create a status error with just a code.
    pub fn from_code(code: Code) -> Self {
        ClientError::Rpc(Status::from_code(code))
    }

    /// The gRPC status code for this error.
    ///
    /// Non-Rpc variants map as follows:
    /// - Transport: `Unavailable`
    /// - Encode/Decode: `Internal`
    /// - Protocol: `InvalidArgument`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Rpc(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Encode(_) | ClientError::Decode(_) => Code::Internal,
            ClientError::Protocol(_) => Code::InvalidArgument,
        }
    }

    /// The error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Rpc(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg) => Some(msg),
        }
    }

    /// Structured details (only for the Rpc variant).
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ClientError::Rpc(status) => status.details(),
            _ => &[],
        }
    }

    /// The inner status, if this is an Rpc error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    /// A canceled-call error.
    pub fn canceled() -> Self {
        ClientError::new(Code::Canceled, "call canceled")
    }

    /// A deadline-expired error.
    pub fn deadline_exceeded() -> Self {
        ClientError::new(Code::DeadlineExceeded, "deadline exceeded")
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Rpc(status)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::PayloadTooLarge { size, limit } => ClientError::new(
                Code::ResourceExhausted,
                format!("envelope payload of {size} bytes exceeds limit of {limit} bytes"),
            ),
            EnvelopeError::IncompleteHeader { .. } | EnvelopeError::InvalidFlags(_) => {
                ClientError::Protocol(err.to_string())
            }
            EnvelopeError::Compression(msg) => {
                ClientError::Encode(format!("compression failed: {msg}"))
            }
            EnvelopeError::Decompression(msg) => {
                ClientError::new(Code::Internal, format!("decompression failed: {msg}"))
            }
        }
    }
}

impl From<TrailerError> for ClientError {
    fn from(err: TrailerError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}
