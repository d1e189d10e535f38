//! Response wrapper and header metadata.

use http::HeaderMap;

/// Response metadata: a thin wrapper over the HTTP header map.
///
/// Used for both response headers and the in-body trailer block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Wrap a header map.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Get the first value for a name, if it is valid UTF-8.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Iterate all values for a name.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Whether the map contains a value for the name.
    pub fn contains_key(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Number of entries, counting each value of a repeated name.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The underlying header map.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the wrapper and return the header map.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

/// A completed RPC response: the payload plus response-header metadata.
///
/// For unary calls the payload is the decoded message; for streaming calls
/// it is a [`Streaming`](crate::Streaming) of messages.
#[derive(Debug)]
pub struct RpcResponse<T> {
    inner: T,
    metadata: Metadata,
    trailers: Option<Metadata>,
}

impl<T> RpcResponse<T> {
    /// Create a response from a payload and metadata.
    pub fn new(inner: T, metadata: Metadata) -> Self {
        Self {
            inner,
            metadata,
            trailers: None,
        }
    }

    /// Attach the trailer block (unary calls, where it is already known).
    pub(crate) fn with_trailers(mut self, trailers: Metadata) -> Self {
        self.trailers = Some(trailers);
        self
    }

    /// The trailer block.
    ///
    /// Present on unary responses; streaming responses expose trailers on
    /// the stream instead, once it ends.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.trailers.as_ref()
    }

    /// The response-header metadata.
    ///
    /// Available as soon as the call future resolves, before any stream
    /// read.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// A reference to the payload.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// A mutable reference to the payload.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the response and return the payload.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Consume the response and return payload and header metadata.
    pub fn into_parts(self) -> (T, Metadata) {
        (self.inner, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};

    fn sample_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/grpc-web+proto".parse().unwrap());
        headers.append(
            HeaderName::from_static("x-multi"),
            HeaderValue::from_static("a"),
        );
        headers.append(
            HeaderName::from_static("x-multi"),
            HeaderValue::from_static("b"),
        );
        headers
    }

    #[test]
    fn test_metadata_get() {
        let metadata = Metadata::new(sample_headers());
        assert_eq!(metadata.get("content-type"), Some("application/grpc-web+proto"));
        assert_eq!(metadata.get("Content-Type"), Some("application/grpc-web+proto"));
        assert_eq!(metadata.get("missing"), None);
    }

    #[test]
    fn test_metadata_get_all() {
        let metadata = Metadata::new(sample_headers());
        let values: Vec<_> = metadata.get_all("x-multi").collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_metadata_contains_and_len() {
        let metadata = Metadata::new(sample_headers());
        assert!(metadata.contains_key("x-multi"));
        assert!(!metadata.contains_key("x-none"));
        assert_eq!(metadata.len(), 3);
        assert!(!metadata.is_empty());
    }

    #[test]
    fn test_response_accessors() {
        let response = RpcResponse::new(41, Metadata::new(sample_headers()));
        assert_eq!(*response.get_ref(), 41);
        assert!(response.metadata().contains_key("content-type"));

        let (inner, metadata) = response.into_parts();
        assert_eq!(inner, 41);
        assert!(metadata.contains_key("x-multi"));
    }
}
