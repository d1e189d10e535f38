//! Call interceptors.
//!
//! An interceptor wraps the call function: it receives the `next` function
//! and returns a new one that may inspect or mutate the request before
//! forwarding, inspect the response after, or short-circuit by never
//! calling `next`. Interceptors see whole requests and responses, never
//! individual envelopes.
//!
//! # Example
//!
//! ```ignore
//! use grpcweb_client::{GrpcWebClient, HeaderInterceptor};
//!
//! let client = GrpcWebClient::builder("http://localhost:3000")
//!     .interceptor(HeaderInterceptor::new("authorization", "Bearer token123"))
//!     .build()?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ClientError;

/// A boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unary request as interceptors see it: headers plus the serialized
/// message.
#[derive(Debug, Clone)]
pub struct UnaryRequest {
    /// The procedure being called (e.g. "package.Service/Method").
    pub procedure: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized request message (before compression and framing).
    pub message: Bytes,
}

impl UnaryRequest {
    /// Create a unary request.
    pub fn new(procedure: impl Into<String>, headers: HeaderMap, message: Bytes) -> Self {
        Self {
            procedure: procedure.into(),
            headers,
            message,
        }
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// A unary response as interceptors see it.
#[derive(Debug, Clone)]
pub struct UnaryResponse {
    /// Response headers.
    pub headers: HeaderMap,
    /// Serialized response message (after decompression and unframing).
    pub message: Bytes,
    /// The trailer block.
    pub trailers: HeaderMap,
}

impl UnaryResponse {
    /// Create a unary response.
    pub fn new(headers: HeaderMap, message: Bytes, trailers: HeaderMap) -> Self {
        Self {
            headers,
            message,
            trailers,
        }
    }
}

/// The signature of a unary call; interceptors wrap this.
pub type UnaryFunc = Arc<
    dyn Fn(UnaryRequest) -> BoxFuture<'static, Result<UnaryResponse, ClientError>> + Send + Sync,
>;

/// The type of a streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// One request message, streamed responses.
    ServerStream,
    /// Streamed request messages, one response.
    ClientStream,
    /// Streamed both ways.
    BidiStream,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::ServerStream => write!(f, "server_stream"),
            StreamType::ClientStream => write!(f, "client_stream"),
            StreamType::BidiStream => write!(f, "bidi_stream"),
        }
    }
}

/// Request context for streaming interceptors.
///
/// Streaming interceptors run before the stream starts and may mutate the
/// request headers; message payloads stream through untouched.
#[derive(Debug)]
pub struct StreamingRequest<'a> {
    /// The procedure being called.
    pub procedure: &'a str,
    /// The type of streaming call.
    pub stream_type: StreamType,
    /// Request headers.
    pub headers: &'a mut HeaderMap,
}

impl<'a> StreamingRequest<'a> {
    /// Create a streaming request context.
    pub fn new(procedure: &'a str, stream_type: StreamType, headers: &'a mut HeaderMap) -> Self {
        Self {
            procedure,
            stream_type,
            headers,
        }
    }
}

/// An interceptor wrapping unary and streaming calls.
pub trait Interceptor: Send + Sync {
    /// Wrap a unary call.
    ///
    /// The default implementation forwards unchanged.
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        next
    }

    /// Hook a streaming call before it starts.
    ///
    /// The default implementation does nothing.
    fn wrap_streaming(&self, request: &mut StreamingRequest<'_>) {
        let _ = request;
    }
}

/// An ordered interceptor list; the first entry is the outermost wrapper.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; later entries sit closer to the wire.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Number of interceptors in the chain.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Wrap a base call function with the whole chain.
    pub fn apply_unary(&self, base: UnaryFunc) -> UnaryFunc {
        let mut next = base;
        for interceptor in self.interceptors.iter().rev() {
            next = interceptor.wrap_unary(next);
        }
        next
    }

    /// Run the streaming hooks in chain order.
    pub fn apply_streaming(&self, request: &mut StreamingRequest<'_>) {
        for interceptor in self.interceptors.iter() {
            interceptor.wrap_streaming(request);
        }
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// An interceptor that adds a fixed header to every call.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderInterceptor {
    /// Create a header interceptor.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn new<K, V>(name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        Self {
            name: name.try_into().expect("invalid header name"),
            value: value.try_into().expect("invalid header value"),
        }
    }
}

impl Interceptor for HeaderInterceptor {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        let name = self.name.clone();
        let value = self.value.clone();
        Arc::new(move |mut request: UnaryRequest| {
            request.headers.insert(name.clone(), value.clone());
            next(request)
        })
    }

    fn wrap_streaming(&self, request: &mut StreamingRequest<'_>) {
        request.headers.insert(self.name.clone(), self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn base_func(log: Arc<Mutex<Vec<&'static str>>>) -> UnaryFunc {
        Arc::new(move |request: UnaryRequest| {
            log.lock().unwrap().push("base");
            Box::pin(async move {
                Ok(UnaryResponse::new(
                    request.headers,
                    request.message,
                    HeaderMap::new(),
                ))
            })
        })
    }

    struct Tagger {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Interceptor for Tagger {
        fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
            let tag = self.tag;
            let log = self.log.clone();
            Arc::new(move |request: UnaryRequest| {
                log.lock().unwrap().push(tag);
                next(request)
            })
        }
    }

    #[tokio::test]
    async fn test_chain_order_first_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(Tagger {
            tag: "first",
            log: log.clone(),
        }));
        chain.push(Arc::new(Tagger {
            tag: "second",
            log: log.clone(),
        }));

        let func = chain.apply_unary(base_func(log.clone()));
        let request = UnaryRequest::new("pkg.Svc/Do", HeaderMap::new(), Bytes::new());
        func(request).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "base"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new();
        assert!(chain.is_empty());

        let func = chain.apply_unary(base_func(log.clone()));
        let request = UnaryRequest::new("pkg.Svc/Do", HeaderMap::new(), Bytes::from("payload"));
        let response = func(request).await.unwrap();

        assert_eq!(response.message, Bytes::from("payload"));
        assert_eq!(*log.lock().unwrap(), vec!["base"]);
    }

    #[tokio::test]
    async fn test_interceptor_short_circuit() {
        struct ShortCircuit;

        impl Interceptor for ShortCircuit {
            fn wrap_unary(&self, _next: UnaryFunc) -> UnaryFunc {
                Arc::new(|_request: UnaryRequest| {
                    Box::pin(async {
                        Err(ClientError::new(
                            grpcweb_core::Code::PermissionDenied,
                            "blocked locally",
                        ))
                    })
                })
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(ShortCircuit));

        let func = chain.apply_unary(base_func(log.clone()));
        let request = UnaryRequest::new("pkg.Svc/Do", HeaderMap::new(), Bytes::new());
        let err = func(request).await.unwrap_err();

        assert_eq!(err.code(), grpcweb_core::Code::PermissionDenied);
        // The base function never ran.
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_interceptor_unary() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(HeaderInterceptor::new("x-auth", "secret")));

        let func = chain.apply_unary(base_func(log));
        let request = UnaryRequest::new("pkg.Svc/Do", HeaderMap::new(), Bytes::new());
        let response = func(request).await.unwrap();

        // The base echoes request headers back.
        assert_eq!(response.headers.get("x-auth").unwrap(), "secret");
    }

    #[test]
    fn test_header_interceptor_streaming() {
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(HeaderInterceptor::new("x-auth", "secret")));

        let mut headers = HeaderMap::new();
        let mut request =
            StreamingRequest::new("pkg.Svc/Do", StreamType::ServerStream, &mut headers);
        chain.apply_streaming(&mut request);

        assert_eq!(headers.get("x-auth").unwrap(), "secret");
    }

    #[test]
    fn test_stream_type_display() {
        assert_eq!(StreamType::ServerStream.to_string(), "server_stream");
        assert_eq!(StreamType::ClientStream.to_string(), "client_stream");
        assert_eq!(StreamType::BidiStream.to_string(), "bidi_stream");
    }
}
