//! gRPC-Web client transport.
//!
//! This crate turns typed unary and streaming remote-procedure calls into
//! gRPC-Web HTTP exchanges: length-prefixed envelope framing, optional
//! per-envelope compression, the trailer block carried in the response
//! body, and strict `grpc-status` error semantics on every failure edge.
//!
//! ## Features
//!
//! - Unary, server-streaming, client-streaming and bidirectional calls
//! - Binary (protobuf) and textual (JSON) message formats
//! - Per-envelope compression (gzip by default; brotli and zstd opt-in)
//! - Interceptors around the call
//! - Deadlines (`grpc-timeout`) and explicit cancellation
//!
//! ## Example
//!
//! ```ignore
//! use grpcweb_client::GrpcWebClient;
//!
//! let client = GrpcWebClient::builder("https://api.example.com").build()?;
//!
//! // Unary call.
//! let response = client
//!     .unary::<GetUserRequest, GetUserResponse>(
//!         "users.v1.UserService/GetUser",
//!         &GetUserRequest { id: "123".into() },
//!     )
//!     .await?;
//! println!("user: {:?}", response.into_inner());
//! ```
//!
//! ## Streaming
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let response = client
//!     .server_stream::<ListRequest, ListItem>("items.v1.ItemService/List", &request)
//!     .await?;
//!
//! let mut stream = response.into_inner();
//! while let Some(item) = stream.next().await {
//!     println!("item: {:?}", item?);
//! }
//!
//! // Trailers are available once the stream has ended.
//! if let Some(trailers) = stream.trailers() {
//!     println!("trailers: {:?}", trailers);
//! }
//! ```
//!
//! ## Cancellation
//!
//! Dropping a response stream cancels the RPC at the HTTP layer. For
//! explicit cancellation, attach a signal:
//!
//! ```ignore
//! use grpcweb_client::{CallOptions, CancelHandle};
//!
//! let (handle, signal) = CancelHandle::new();
//! let options = CallOptions::new().cancel(signal);
//!
//! let call = client.unary_with_options::<Req, Res>("svc/Method", &req, options);
//! // From another task:
//! handle.cancel(); // the call fails with Code::Canceled
//! ```

mod builder;
mod client;
mod error;
mod frame;
mod headers;
mod interceptor;
mod options;
mod response;
mod streaming;
pub mod transport;

pub use builder::{BuildError, GrpcWebClientBuilder};
pub use client::GrpcWebClient;
pub use error::ClientError;
pub use frame::{FrameDecoder, FrameEncoder};
pub use interceptor::{
    BoxFuture, HeaderInterceptor, Interceptor, InterceptorChain, StreamType, StreamingRequest,
    UnaryFunc, UnaryRequest, UnaryResponse,
};
pub use options::{CallOptions, CancelHandle, CancelSignal};
pub use response::{Metadata, RpcResponse};
pub use streaming::Streaming;
pub use transport::{HttpTransport, HyperTransport, HyperTransportBuilder, RequestBody, ResponseBody};

// Re-export the core protocol types users need.
pub use grpcweb_core::{Code, Compression, ErrorDetail, Status};
