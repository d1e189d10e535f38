//! gRPC status codes and the `Status` error payload.
//!
//! The trailer's `grpc-status` field fully determines a call's outcome:
//! code 0 is success, every other value surfaces as an error carrying the
//! code, an optional message and optional structured details.

use std::fmt;

/// gRPC status codes, values 0-16.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Parse a code from its numeric wire value.
    ///
    /// Returns `None` for values outside the defined range; callers map
    /// those to [`Code::Unknown`].
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Code::Ok),
            1 => Some(Code::Canceled),
            2 => Some(Code::Unknown),
            3 => Some(Code::InvalidArgument),
            4 => Some(Code::DeadlineExceeded),
            5 => Some(Code::NotFound),
            6 => Some(Code::AlreadyExists),
            7 => Some(Code::PermissionDenied),
            8 => Some(Code::ResourceExhausted),
            9 => Some(Code::FailedPrecondition),
            10 => Some(Code::Aborted),
            11 => Some(Code::OutOfRange),
            12 => Some(Code::Unimplemented),
            13 => Some(Code::Internal),
            14 => Some(Code::Unavailable),
            15 => Some(Code::DataLoss),
            16 => Some(Code::Unauthenticated),
            _ => None,
        }
    }

    /// The numeric wire value of this code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The canonical snake_case name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether this code is OK (success).
    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error detail attached to a [`Status`].
///
/// Details arrive in the trailer's `grpc-status-details-bin` field as a
/// `google.rpc.Status` message whose `details` are `google.protobuf.Any`
/// entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Fully-qualified type name (e.g. "google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Vec<u8>,
}

impl ErrorDetail {
    /// Create a detail from a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// The fully-qualified type name, with any "type.googleapis.com/"
    /// prefix stripped.
    pub fn type_url(&self) -> &str {
        self.type_url
            .strip_prefix("type.googleapis.com/")
            .unwrap_or(&self.type_url)
    }

    /// The protobuf-encoded value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// An RPC outcome: a status code plus optional message and details.
///
/// A `Status` with a non-OK code is an error; the transport never surfaces
/// an OK status as an error.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    code: Code,
    message: Option<String>,
    details: Vec<ErrorDetail>,
}

impl Status {
    /// Create a status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    /// Create a status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: Vec::new(),
        }
    }

    /// The status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// The human-readable message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The structured details, in wire order.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Whether this status is OK.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Attach a detail with a type URL and protobuf-encoded bytes.
    pub fn add_detail<S: Into<String>>(self, type_url: S, value: Vec<u8>) -> Self {
        self.add_error_detail(ErrorDetail::new(type_url, value))
    }

    /// Attach a pre-constructed detail.
    pub fn add_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn data_loss<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DataLoss, message)
    }

    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unauthenticated, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "[{}] {}", self.code, msg),
            None => write!(f, "[{}]", self.code),
        }
    }
}

impl std::error::Error for Status {}

/// Wire shape of `google.rpc.Status`, used to decode the
/// `grpc-status-details-bin` trailer field.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusDetails {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<AnyDetail>,
}

/// Wire shape of `google.protobuf.Any` inside [`StatusDetails`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnyDetail {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_code_roundtrip() {
        for value in 0..=16 {
            let code = Code::from_i32(value).unwrap();
            assert_eq!(code.as_i32(), value);
        }
    }

    #[test]
    fn test_code_from_i32_out_of_range() {
        assert_eq!(Code::from_i32(-1), None);
        assert_eq!(Code::from_i32(17), None);
        assert_eq!(Code::from_i32(100), None);
    }

    #[test]
    fn test_code_as_str() {
        assert_eq!(Code::Ok.as_str(), "ok");
        assert_eq!(Code::InvalidArgument.as_str(), "invalid_argument");
        assert_eq!(Code::Unauthenticated.as_str(), "unauthenticated");
    }

    #[test]
    fn test_code_is_ok() {
        assert!(Code::Ok.is_ok());
        assert!(!Code::Unknown.is_ok());
    }

    #[test]
    fn test_status_new() {
        let status = Status::new(Code::NotFound, "missing");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("missing"));
        assert!(status.details().is_empty());
        assert!(!status.is_ok());
    }

    #[test]
    fn test_status_from_code() {
        let status = Status::from_code(Code::Internal);
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().is_none());
    }

    #[test]
    fn test_status_add_detail() {
        let status = Status::internal("boom").add_detail("test.Type", vec![1, 2, 3]);
        assert_eq!(status.details().len(), 1);
        assert_eq!(status.details()[0].type_url(), "test.Type");
        assert_eq!(status.details()[0].value(), &[1, 2, 3]);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            Status::new(Code::NotFound, "missing").to_string(),
            "[not_found] missing"
        );
        assert_eq!(Status::from_code(Code::Aborted).to_string(), "[aborted]");
    }

    #[test]
    fn test_error_detail_strips_any_prefix() {
        let detail = ErrorDetail::new("type.googleapis.com/google.rpc.RetryInfo", vec![]);
        assert_eq!(detail.type_url(), "google.rpc.RetryInfo");

        let detail = ErrorDetail::new("google.rpc.RetryInfo", vec![]);
        assert_eq!(detail.type_url(), "google.rpc.RetryInfo");
    }

    #[test]
    fn test_status_details_decode() {
        let proto = StatusDetails {
            code: Code::ResourceExhausted.as_i32(),
            message: "quota exceeded".to_string(),
            details: vec![AnyDetail {
                type_url: "type.googleapis.com/google.rpc.RetryInfo".to_string(),
                value: vec![0x08, 0x01],
            }],
        };

        let bytes = proto.encode_to_vec();
        let decoded = StatusDetails::decode(bytes.as_slice()).unwrap();

        assert_eq!(decoded.code, 8);
        assert_eq!(decoded.message, "quota exceeded");
        assert_eq!(decoded.details.len(), 1);
        assert_eq!(
            decoded.details[0].type_url,
            "type.googleapis.com/google.rpc.RetryInfo"
        );
    }
}
