//! Client builder.
//!
//! All transport options are validated once, at build time; calls then run
//! against an immutable configuration.

use std::sync::Arc;
use std::time::Duration;

use grpcweb_core::Compression;
use http::Uri;

use crate::client::GrpcWebClient;
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::transport::{HttpTransport, HyperTransport};

/// Default cap on a decoded payload: the whole u32 length range.
const DEFAULT_READ_MAX_BYTES: usize = 0xFFFF_FFFF;

/// Default cap on a serialized payload.
const DEFAULT_WRITE_MAX_BYTES: usize = 0xFFFF_FFFF;

/// Default threshold below which outbound payloads stay uncompressed.
const DEFAULT_COMPRESS_MIN_BYTES: usize = 1024;

/// Builder for [`GrpcWebClient`].
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::{Compression, GrpcWebClient};
///
/// let client = GrpcWebClient::builder("https://api.example.com")
///     .accept_compression(vec![Compression::gzip()])
///     .send_compression(Compression::gzip())
///     .build()?;
/// ```
pub struct GrpcWebClientBuilder {
    base_url: String,
    transport: Option<Arc<dyn HttpTransport>>,
    use_binary: bool,
    send_compression: Option<Compression>,
    accept_compression: Vec<Compression>,
    compress_min_bytes: usize,
    read_max_bytes: usize,
    write_max_bytes: usize,
    default_timeout: Option<Duration>,
    keep_session_alive: Option<Duration>,
    http2_prior_knowledge: bool,
    interceptors: InterceptorChain,
}

impl GrpcWebClientBuilder {
    /// Create a builder for the given base URL.
    ///
    /// The base URL must be absolute (scheme and host); a trailing slash
    /// is ignored.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            transport: None,
            use_binary: true,
            send_compression: None,
            accept_compression: Vec::new(),
            compress_min_bytes: DEFAULT_COMPRESS_MIN_BYTES,
            read_max_bytes: DEFAULT_READ_MAX_BYTES,
            write_max_bytes: DEFAULT_WRITE_MAX_BYTES,
            default_timeout: None,
            keep_session_alive: None,
            http2_prior_knowledge: false,
            interceptors: InterceptorChain::new(),
        }
    }

    /// Use the binary (protobuf) message format. This is the default.
    pub fn use_binary(mut self) -> Self {
        self.use_binary = true;
        self
    }

    /// Use the textual (JSON) message format.
    pub fn use_json(mut self) -> Self {
        self.use_binary = false;
        self
    }

    /// Compress outbound messages with this codec.
    ///
    /// The codec must also appear in
    /// [`accept_compression`](Self::accept_compression).
    pub fn send_compression(mut self, codec: Compression) -> Self {
        self.send_compression = Some(codec);
        self
    }

    /// Accept these codecs for response decompression, in preference
    /// order. Identity is always accepted implicitly.
    pub fn accept_compression(mut self, codecs: Vec<Compression>) -> Self {
        self.accept_compression = codecs;
        self
    }

    /// Send outbound payloads below this size uncompressed, even when a
    /// send codec is configured. Default 1024.
    pub fn compress_min_bytes(mut self, min_bytes: usize) -> Self {
        self.compress_min_bytes = min_bytes;
        self
    }

    /// Hard cap on a single decoded inbound payload.
    pub fn read_max_bytes(mut self, max: usize) -> Self {
        self.read_max_bytes = max;
        self
    }

    /// Hard cap on a single serialized outbound payload.
    pub fn write_max_bytes(mut self, max: usize) -> Self {
        self.write_max_bytes = max;
        self
    }

    /// Default deadline for every call; individual calls may override it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Keep idle connections alive with TCP keep-alive probes at this
    /// interval. A hint to the HTTP client; only applies when the builder
    /// creates the transport.
    pub fn keep_session_alive(mut self, interval: Duration) -> Self {
        self.keep_session_alive = Some(interval);
        self
    }

    /// Use HTTP/2 without the upgrade handshake (h2c). Required for
    /// bidirectional streaming over `http://` URLs. Only applies when the
    /// builder creates the transport.
    pub fn http2_prior_knowledge(mut self) -> Self {
        self.http2_prior_knowledge = true;
        self
    }

    /// Append an interceptor. The first interceptor added is the
    /// outermost wrapper around the call.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Use a custom transport instead of the built-in hyper one.
    pub fn transport<T: HttpTransport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Validate the options and build the client.
    pub fn build(self) -> Result<GrpcWebClient, BuildError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();

        let uri: Uri = base_url
            .parse()
            .map_err(|_| BuildError::InvalidBaseUrl(self.base_url.clone()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(BuildError::InvalidBaseUrl(self.base_url.clone()));
        }

        if let Some(codec) = &self.send_compression {
            let accepted = self
                .accept_compression
                .iter()
                .any(|c| c.name() == codec.name());
            if !accepted {
                return Err(BuildError::SendCompressionNotAccepted(
                    codec.name().to_string(),
                ));
            }
        }

        if self.read_max_bytes == 0 {
            return Err(BuildError::InvalidLimit("read_max_bytes must be positive"));
        }
        if self.write_max_bytes == 0 {
            return Err(BuildError::InvalidLimit("write_max_bytes must be positive"));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder = HyperTransport::builder()
                    .http2_prior_knowledge(self.http2_prior_knowledge);
                if let Some(interval) = self.keep_session_alive {
                    builder = builder.tcp_keepalive(interval);
                }
                Arc::new(builder.build())
            }
        };

        Ok(GrpcWebClient::new(
            transport,
            base_url,
            self.use_binary,
            self.send_compression,
            self.accept_compression,
            self.compress_min_bytes,
            self.read_max_bytes,
            self.write_max_bytes,
            self.default_timeout,
            self.interceptors,
        ))
    }
}

impl std::fmt::Debug for GrpcWebClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcWebClientBuilder")
            .field("base_url", &self.base_url)
            .field("use_binary", &self.use_binary)
            .field("send_compression", &self.send_compression)
            .field("accept_compression", &self.accept_compression)
            .field("compress_min_bytes", &self.compress_min_bytes)
            .field("read_max_bytes", &self.read_max_bytes)
            .field("write_max_bytes", &self.write_max_bytes)
            .field("default_timeout", &self.default_timeout)
            .field("keep_session_alive", &self.keep_session_alive)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Client construction failures.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The base URL is not an absolute URL.
    #[error("invalid base URL {0:?}: an absolute URL with scheme and host is required")]
    InvalidBaseUrl(String),

    /// The send codec is missing from the accepted list.
    #[error("send compression {0:?} is not in the accepted compression list")]
    SendCompressionNotAccepted(String),

    /// A size limit is out of range.
    #[error("{0}")]
    InvalidLimit(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = GrpcWebClientBuilder::new("http://localhost:3000");
        assert!(builder.use_binary);
        assert!(builder.send_compression.is_none());
        assert!(builder.accept_compression.is_empty());
        assert_eq!(builder.compress_min_bytes, 1024);
        assert_eq!(builder.read_max_bytes, 0xFFFF_FFFF);
        assert_eq!(builder.write_max_bytes, 0xFFFF_FFFF);
        assert!(builder.default_timeout.is_none());
    }

    #[test]
    fn test_builder_build() {
        let client = GrpcWebClientBuilder::new("http://localhost:3000")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert!(client.is_binary());
    }

    #[test]
    fn test_builder_use_json() {
        let client = GrpcWebClientBuilder::new("http://localhost:3000")
            .use_json()
            .build()
            .unwrap();
        assert!(!client.is_binary());
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = GrpcWebClientBuilder::new("http://localhost:3000/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_builder_rejects_relative_url() {
        let err = GrpcWebClientBuilder::new("/just/a/path").build().unwrap_err();
        assert!(matches!(err, BuildError::InvalidBaseUrl(_)));

        let err = GrpcWebClientBuilder::new("localhost:3000 not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidBaseUrl(_)));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_builder_send_compression_must_be_accepted() {
        let err = GrpcWebClientBuilder::new("http://localhost:3000")
            .send_compression(Compression::gzip())
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::SendCompressionNotAccepted(_)));

        let client = GrpcWebClientBuilder::new("http://localhost:3000")
            .send_compression(Compression::gzip())
            .accept_compression(vec![Compression::gzip()])
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        let err = GrpcWebClientBuilder::new("http://localhost:3000")
            .read_max_bytes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidLimit(_)));

        let err = GrpcWebClientBuilder::new("http://localhost:3000")
            .write_max_bytes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidLimit(_)));
    }
}
