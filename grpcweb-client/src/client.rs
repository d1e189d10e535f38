//! The gRPC-Web client: unary and streaming call runners.
//!
//! A call assembles a request pipeline (message → serialize → compress →
//! envelope → body) and a response pipeline (body → split → decompress →
//! message or trailer), drives the HTTP exchange between them, and
//! enforces the protocol invariants on every edge: exactly one trailer,
//! nothing after it, size caps on each envelope, and the `grpc-status`
//! verdict from the trailer block.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use grpcweb_core::{
    check_envelope_flags, check_payload_size, envelope_flags, parse_envelope_header,
    parse_trailer, trailer_status, Code, Compression, ENVELOPE_HEADER_SIZE,
};
use http::{HeaderMap, Method, Request};
use prost::Message;
use serde::{de::DeserializeOwned, Serialize};

#[cfg(feature = "tracing")]
use tracing::info_span;

use crate::builder::GrpcWebClientBuilder;
use crate::error::ClientError;
use crate::frame::{decode_message, decompress_envelope, encode_message, frame_payload, FrameDecoder, FrameEncoder};
use crate::headers::{build_request_headers, validate_response};
use crate::interceptor::{
    InterceptorChain, StreamType, StreamingRequest, UnaryFunc, UnaryRequest, UnaryResponse,
};
use crate::options::{CallOptions, CancelSignal};
use crate::response::{Metadata, RpcResponse};
use crate::streaming::Streaming;
use crate::transport::{HttpTransport, RequestBody, ResponseBody};

/// gRPC-Web client.
///
/// Built once via [`GrpcWebClient::builder`]; cheap to clone and safe to
/// share across tasks. Calls never share mutable state.
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::GrpcWebClient;
///
/// let client = GrpcWebClient::builder("https://api.example.com").build()?;
///
/// let response = client
///     .unary::<HelloRequest, HelloReply>("greet.v1.GreetService/Greet", &request)
///     .await?;
/// println!("reply: {:?}", response.into_inner());
/// ```
#[derive(Clone)]
pub struct GrpcWebClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    use_binary: bool,
    send_compression: Option<Compression>,
    accept_compression: Vec<Compression>,
    compress_min_bytes: usize,
    read_max_bytes: usize,
    write_max_bytes: usize,
    default_timeout: Option<Duration>,
    interceptors: InterceptorChain,
}

impl std::fmt::Debug for GrpcWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcWebClient")
            .field("base_url", &self.base_url)
            .field("use_binary", &self.use_binary)
            .field("send_compression", &self.send_compression)
            .field("accept_compression", &self.accept_compression)
            .field("compress_min_bytes", &self.compress_min_bytes)
            .field("read_max_bytes", &self.read_max_bytes)
            .field("write_max_bytes", &self.write_max_bytes)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl GrpcWebClient {
    /// Create a builder for the given base URL.
    pub fn builder<S: Into<String>>(base_url: S) -> GrpcWebClientBuilder {
        GrpcWebClientBuilder::new(base_url)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: String,
        use_binary: bool,
        send_compression: Option<Compression>,
        accept_compression: Vec<Compression>,
        compress_min_bytes: usize,
        read_max_bytes: usize,
        write_max_bytes: usize,
        default_timeout: Option<Duration>,
        interceptors: InterceptorChain,
    ) -> Self {
        Self {
            transport,
            base_url,
            use_binary,
            send_compression,
            accept_compression,
            compress_min_bytes,
            read_max_bytes,
            write_max_bytes,
            default_timeout,
            interceptors,
        }
    }

    /// The base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the binary (protobuf) format is in use.
    pub fn is_binary(&self) -> bool {
        self.use_binary
    }

    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    fn encoding_name(&self) -> &'static str {
        if self.use_binary {
            "proto"
        } else {
            "json"
        }
    }

    /// The fully qualified URL for a procedure.
    fn url_for(&self, procedure: &str) -> String {
        let procedure = procedure.strip_prefix('/').unwrap_or(procedure);
        format!("{}/{}", self.base_url, procedure)
    }

    /// Make a unary RPC call.
    ///
    /// # Arguments
    ///
    /// * `procedure` - the full procedure path ("package.Service/Method")
    /// * `request` - the request message
    ///
    /// # Errors
    ///
    /// Fails if the message cannot be encoded, the exchange fails, the
    /// response violates the protocol, or the trailer carries a non-OK
    /// `grpc-status`.
    pub async fn unary<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<RpcResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.unary_with_options(procedure, request, CallOptions::new())
            .await
    }

    /// Make a unary RPC call with per-call options.
    pub async fn unary_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<RpcResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "unary",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        )
        .entered();

        let timeout = options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        let headers = build_request_headers(
            self.use_binary,
            timeout,
            self.send_compression.as_ref(),
            &self.accept_compression,
            &options.headers,
        );
        let message = encode_message(request, self.use_binary)?;

        let func = self.interceptors.apply_unary(self.unary_base(procedure));
        let unary_request = UnaryRequest::new(procedure, headers, message);

        let response = with_guards(func(unary_request), deadline, options.cancel).await?;

        let message: Res = decode_message(&response.message, self.use_binary)?;
        Ok(
            RpcResponse::new(message, Metadata::new(response.headers))
                .with_trailers(Metadata::new(response.trailers)),
        )
    }

    /// The innermost unary call function, wrapped by the interceptor
    /// chain.
    fn unary_base(&self, procedure: &str) -> UnaryFunc {
        let transport = self.transport.clone();
        let url = self.url_for(procedure);
        let use_binary = self.use_binary;
        let send_compression = self.send_compression.clone();
        let accept_compression = self.accept_compression.clone();
        let compress_min_bytes = self.compress_min_bytes;
        let read_max_bytes = self.read_max_bytes;
        let write_max_bytes = self.write_max_bytes;

        Arc::new(move |request: UnaryRequest| {
            let transport = transport.clone();
            let url = url.clone();
            let send_compression = send_compression.clone();
            let accept_compression = accept_compression.clone();

            Box::pin(async move {
                let body = frame_payload(
                    request.message,
                    send_compression.as_ref(),
                    compress_min_bytes,
                    write_max_bytes,
                )?;

                let http_request =
                    build_http_request(&url, &request.headers, RequestBody::joined(body))?;
                let response = transport.call(http_request).await?;

                let status = response.status();
                let response_headers = response.headers().clone();
                let head =
                    validate_response(status, &response_headers, use_binary, &accept_compression)?;
                let body = response.into_body();

                if head.found_status {
                    assert_empty_body(body).await?;
                    let status = trailer_status(&response_headers)?;
                    if !status.is_ok() {
                        return Err(ClientError::Rpc(status));
                    }
                    return Err(ClientError::new(
                        Code::InvalidArgument,
                        "missing output message for unary method",
                    ));
                }

                let (message, trailers) =
                    collect_unary_frames(body, head.codec.as_ref(), read_max_bytes).await?;

                Ok(UnaryResponse::new(response_headers, message, trailers))
            })
        })
    }

    /// Make a server-streaming RPC call: one request message, a stream of
    /// responses.
    ///
    /// The returned stream yields messages in wire order; once it ends,
    /// the trailer block is available via
    /// [`Streaming::trailers`](crate::Streaming::trailers).
    pub async fn server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<RpcResponse<Streaming<FrameDecoder<ResponseBody, Res>>>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.server_stream_with_options(procedure, request, CallOptions::new())
            .await
    }

    /// Make a server-streaming RPC call with per-call options.
    pub async fn server_stream_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<RpcResponse<Streaming<FrameDecoder<ResponseBody, Res>>>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "server_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        )
        .entered();

        let payload = encode_message(request, self.use_binary)?;
        let body = frame_payload(
            payload,
            self.send_compression.as_ref(),
            self.compress_min_bytes,
            self.write_max_bytes,
        )?;

        self.start_stream(
            procedure,
            StreamType::ServerStream,
            RequestBody::joined(body),
            options,
        )
        .await
    }

    /// Make a client-streaming RPC call: a stream of request messages,
    /// one response.
    pub async fn client_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> Result<RpcResponse<Res>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: futures::Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.client_stream_with_options(procedure, requests, CallOptions::new())
            .await
    }

    /// Make a client-streaming RPC call with per-call options.
    pub async fn client_stream_with_options<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
        options: CallOptions,
    ) -> Result<RpcResponse<Res>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: futures::Stream<Item = Req> + Send + Unpin + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "client_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        )
        .entered();

        let encoder = FrameEncoder::new(
            requests,
            self.use_binary,
            self.send_compression.clone(),
            self.compress_min_bytes,
            self.write_max_bytes,
        );

        let cancel = options.cancel.clone();
        let timeout = options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        let response = self
            .start_stream::<Res>(
                procedure,
                StreamType::ClientStream,
                RequestBody::envelopes(encoder),
                options,
            )
            .await?;
        let (mut stream, metadata) = response.into_parts();

        // The response side has unary cardinality: one message, one
        // trailer.
        let read = async {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(ClientError::new(
                        Code::InvalidArgument,
                        "missing output message for unary method",
                    ));
                }
            };

            match stream.next().await {
                None => {}
                Some(Ok(_)) => {
                    return Err(ClientError::new(
                        Code::InvalidArgument,
                        "received extra output message for unary method",
                    ));
                }
                Some(Err(e)) => return Err(e),
            }

            Ok(message)
        };
        let message = with_guards(read, deadline, cancel).await?;

        let trailers = stream.take_trailers().unwrap_or_default();
        Ok(RpcResponse::new(message, metadata).with_trailers(trailers))
    }

    /// Make a bidirectional streaming RPC call.
    ///
    /// Full duplex requires HTTP/2; a server answering over HTTP/1.1
    /// fails the call with `Unimplemented`.
    pub async fn bidi_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> Result<RpcResponse<Streaming<FrameDecoder<ResponseBody, Res>>>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: futures::Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.bidi_stream_with_options(procedure, requests, CallOptions::new())
            .await
    }

    /// Make a bidirectional streaming RPC call with per-call options.
    pub async fn bidi_stream_with_options<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
        options: CallOptions,
    ) -> Result<RpcResponse<Streaming<FrameDecoder<ResponseBody, Res>>>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: futures::Stream<Item = Req> + Send + Unpin + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "bidi_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        )
        .entered();

        let encoder = FrameEncoder::new(
            requests,
            self.use_binary,
            self.send_compression.clone(),
            self.compress_min_bytes,
            self.write_max_bytes,
        );

        self.start_stream(
            procedure,
            StreamType::BidiStream,
            RequestBody::envelopes(encoder),
            options,
        )
        .await
    }

    /// Shared streaming call setup: headers, exchange, response
    /// validation, stream construction.
    async fn start_stream<Res>(
        &self,
        procedure: &str,
        stream_type: StreamType,
        body: RequestBody,
        options: CallOptions,
    ) -> Result<RpcResponse<Streaming<FrameDecoder<ResponseBody, Res>>>, ClientError>
    where
        Res: Message + DeserializeOwned + Default,
    {
        let timeout = options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let cancel = options.cancel.clone();

        let mut headers = build_request_headers(
            self.use_binary,
            timeout,
            self.send_compression.as_ref(),
            &self.accept_compression,
            &options.headers,
        );
        self.interceptors.apply_streaming(&mut StreamingRequest::new(
            procedure,
            stream_type,
            &mut headers,
        ));

        let http_request = build_http_request(&self.url_for(procedure), &headers, body)?;

        let exchange = async {
            let response = self.transport.call(http_request).await?;

            if stream_type == StreamType::BidiStream && response.version() < http::Version::HTTP_2
            {
                return Err(ClientError::new(
                    Code::Unimplemented,
                    format!(
                        "bidirectional streaming requires HTTP/2, but the server responded with {:?}",
                        response.version()
                    ),
                ));
            }

            let status = response.status();
            let response_headers = response.headers().clone();
            let head = validate_response(
                status,
                &response_headers,
                self.use_binary,
                &self.accept_compression,
            )?;
            let body = response.into_body();

            if head.found_status {
                assert_empty_body(body).await?;
                let status = trailer_status(&response_headers)?;
                let error = (!status.is_ok()).then(|| ClientError::Rpc(status));
                let streaming =
                    Streaming::trailers_only(Metadata::new(response_headers.clone()), error);
                return Ok((response_headers, streaming));
            }

            let decoder =
                FrameDecoder::new(body, self.use_binary, head.codec, self.read_max_bytes);
            Ok((response_headers, Streaming::new(decoder)))
        };

        let (response_headers, streaming) =
            with_guards(exchange, deadline, cancel.clone()).await?;
        let streaming = streaming.with_cancel(cancel).with_deadline(deadline);

        Ok(RpcResponse::new(streaming, Metadata::new(response_headers)))
    }
}

/// Assemble the HTTP request for a call.
fn build_http_request(
    url: &str,
    headers: &HeaderMap,
    body: RequestBody,
) -> Result<Request<RequestBody>, ClientError> {
    let mut builder = Request::builder().method(Method::POST).uri(url);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(body)
        .map_err(|e| ClientError::Protocol(format!("failed to build request: {e}")))
}

/// Race a call step against its deadline and cancel signal.
async fn with_guards<T>(
    fut: impl Future<Output = Result<T, ClientError>>,
    deadline: Option<tokio::time::Instant>,
    cancel: Option<CancelSignal>,
) -> Result<T, ClientError> {
    tokio::pin!(fut);

    let canceled = async {
        match &cancel {
            Some(signal) => signal.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;

        _ = canceled => Err(ClientError::canceled()),
        _ = expired => Err(ClientError::deadline_exceeded()),
        result = &mut fut => result,
    }
}

/// Drain a trailers-only body and require it to be empty.
async fn assert_empty_body(mut body: ResponseBody) -> Result<(), ClientError> {
    while let Some(chunk) = body.next().await {
        if !chunk?.is_empty() {
            return Err(ClientError::Protocol(
                "trailers-only response must have an empty body".into(),
            ));
        }
    }
    Ok(())
}

/// Collect a unary response body: exactly one message envelope and exactly
/// one trailer envelope, accepted in either order.
///
/// Returns the raw message payload and the trailer map once the trailer's
/// `grpc-status` is OK.
async fn collect_unary_frames(
    mut body: ResponseBody,
    codec: Option<&Compression>,
    read_max_bytes: usize,
) -> Result<(Bytes, HeaderMap), ClientError> {
    let mut buffer = BytesMut::new();
    let mut message: Option<Bytes> = None;
    let mut trailer: Option<HeaderMap> = None;

    loop {
        while buffer.len() >= ENVELOPE_HEADER_SIZE {
            let (flags, length) = parse_envelope_header(&buffer)?;
            check_envelope_flags(flags)?;

            let length = length as usize;
            check_payload_size(length, read_max_bytes)?;

            let frame_size = ENVELOPE_HEADER_SIZE + length;
            if buffer.len() < frame_size {
                break;
            }

            let frame = buffer.split_to(frame_size);
            let payload = Bytes::copy_from_slice(&frame[ENVELOPE_HEADER_SIZE..]);
            let payload = decompress_envelope(flags, payload, codec, read_max_bytes)?;

            if flags & envelope_flags::TRAILER != 0 {
                if trailer.is_some() {
                    return Err(ClientError::new(
                        Code::InvalidArgument,
                        "received extra trailer",
                    ));
                }
                trailer = Some(parse_trailer(&payload)?);
            } else {
                if message.is_some() {
                    return Err(ClientError::new(
                        Code::InvalidArgument,
                        "received extra output message for unary method",
                    ));
                }
                message = Some(payload);
            }
        }

        match body.next().await {
            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    if !buffer.is_empty() {
        return Err(ClientError::Protocol("premature end of stream".into()));
    }

    let trailer = trailer.ok_or_else(|| {
        ClientError::new(Code::InvalidArgument, "missing trailer")
    })?;

    let status = trailer_status(&trailer)?;
    if !status.is_ok() {
        return Err(ClientError::Rpc(status));
    }

    let message = message.ok_or_else(|| {
        ClientError::new(
            Code::InvalidArgument,
            "missing output message for unary method",
        )
    })?;

    Ok((message, trailer))
}
