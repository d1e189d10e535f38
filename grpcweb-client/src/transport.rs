//! HTTP transport seam.
//!
//! The call runner talks to HTTP through [`HttpTransport`]: send a request
//! whose body is an async byte stream, get back a status, headers and a
//! response-body byte stream. [`HyperTransport`] is the production
//! implementation; tests drive the runner with an in-memory one.

mod body;
mod hyper;

pub use self::hyper::{HyperTransport, HyperTransportBuilder};
pub use body::RequestBody;

use std::pin::Pin;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::Stream;

use crate::error::ClientError;

/// A type-erased response body byte stream.
pub type ResponseBody = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// The HTTP client contract the transport is built against.
///
/// Implementations must forward cancellation when the request future is
/// dropped and surface I/O failures as [`ClientError::Transport`].
pub trait HttpTransport: Send + Sync + 'static {
    /// Send a request and resolve with the response head plus body stream.
    fn call(
        &self,
        request: http::Request<RequestBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, ClientError>>;
}
