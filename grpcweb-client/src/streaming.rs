//! Streaming response wrapper.
//!
//! [`Streaming`] wraps the response-side frame decoder and provides access
//! to the trailer block after the stream is consumed. Dropping a
//! `Streaming` cancels the RPC: the underlying HTTP connection is closed,
//! which signals cancellation via TCP RST or HTTP/2 RST_STREAM.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{Future, Stream};

use crate::error::ClientError;
use crate::frame::FrameDecoder;
use crate::options::CancelSignal;
use crate::response::Metadata;

enum State<S> {
    /// Decoding envelopes from the response body.
    Body(S),
    /// Trailers-only response: the header block was the trailer and the
    /// body was empty.
    TrailersOnly {
        trailers: Option<Metadata>,
        error: Option<ClientError>,
    },
}

/// Wrapper for streaming response messages.
///
/// Yields decoded messages in wire order; the trailer block becomes
/// available through [`trailers`](Streaming::trailers) once the stream has
/// ended. A failing stream yields the failure as its final item, and every
/// later poll reports the end of the stream.
pub struct Streaming<S> {
    state: State<S>,
    /// Pending cancel signal, if the call was given one.
    cancel: Option<BoxFuture<'static, ()>>,
    /// Pending deadline, if the call was given one.
    deadline: Option<Pin<Box<tokio::time::Sleep>>>,
    /// Set once a cancel/deadline/stream failure ended the stream.
    failed: bool,
}

impl<S> std::fmt::Debug for Streaming<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streaming")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<S> Streaming<S> {
    /// Wrap a frame decoder.
    pub(crate) fn new(inner: S) -> Self {
        Self {
            state: State::Body(inner),
            cancel: None,
            deadline: None,
            failed: false,
        }
    }

    /// Build a finished stream from a trailers-only response.
    pub(crate) fn trailers_only(trailers: Metadata, error: Option<ClientError>) -> Self {
        Self {
            state: State::TrailersOnly {
                trailers: Some(trailers),
                error,
            },
            cancel: None,
            deadline: None,
            failed: false,
        }
    }

    /// Attach a cancel signal; firing it fails the next read with
    /// `Canceled`.
    pub(crate) fn with_cancel(mut self, signal: Option<CancelSignal>) -> Self {
        self.cancel = signal.map(|s| s.into_future());
        self
    }

    /// Attach an absolute deadline; passing it fails the next read with
    /// `DeadlineExceeded`.
    pub(crate) fn with_deadline(mut self, deadline: Option<tokio::time::Instant>) -> Self {
        self.deadline = deadline.map(|at| Box::pin(tokio::time::sleep_until(at)));
        self
    }
}

impl<B, T> Streaming<FrameDecoder<B, T>> {
    /// The trailer block, once the stream has ended.
    ///
    /// Returns `None` while messages are still pending.
    pub fn trailers(&self) -> Option<&Metadata> {
        match &self.state {
            State::Body(decoder) => decoder.trailers(),
            State::TrailersOnly { trailers, .. } => trailers.as_ref(),
        }
    }

    /// Take the trailer block, leaving `None` in place.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        match &mut self.state {
            State::Body(decoder) => decoder.take_trailers(),
            State::TrailersOnly { trailers, .. } => trailers.take(),
        }
    }

    /// Whether the stream has finished.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Body(decoder) => decoder.is_finished() || self.failed,
            State::TrailersOnly { error, .. } => self.failed || error.is_none(),
        }
    }
}

impl<S, T> Streaming<S>
where
    S: Stream<Item = Result<T, ClientError>> + Unpin,
{
    /// Consume and discard all remaining messages.
    ///
    /// Draining lets the HTTP client observe the end of the response body
    /// and reuse the connection, and makes the trailers available without
    /// processing every message. Returns the number of messages drained.
    pub async fn drain(&mut self) -> usize {
        use futures::StreamExt;
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Like [`drain`](Self::drain), but gives up when the timeout expires.
    ///
    /// Returns `Ok(count)` if the stream ended, `Err(count)` on timeout.
    pub async fn drain_timeout(&mut self, timeout: std::time::Duration) -> Result<usize, usize> {
        use futures::StreamExt;
        let mut count = 0;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(count);
                }

                item = self.next() => {
                    match item {
                        Some(Ok(_)) => count += 1,
                        Some(Err(_)) => {}
                        None => return Ok(count),
                    }
                }
            }
        }
    }
}

impl<S> Unpin for Streaming<S> where S: Unpin {}

impl<S, T> Stream for Streaming<S>
where
    S: Stream<Item = Result<T, ClientError>> + Unpin,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.failed {
            return Poll::Ready(None);
        }

        if let Some(cancel) = &mut this.cancel {
            if cancel.as_mut().poll(cx).is_ready() {
                this.failed = true;
                return Poll::Ready(Some(Err(ClientError::canceled())));
            }
        }

        if let Some(deadline) = &mut this.deadline {
            if deadline.as_mut().poll(cx).is_ready() {
                this.failed = true;
                return Poll::Ready(Some(Err(ClientError::deadline_exceeded())));
            }
        }

        match &mut this.state {
            State::Body(inner) => Pin::new(inner).poll_next(cx),
            State::TrailersOnly { error, .. } => match error.take() {
                Some(err) => {
                    this.failed = true;
                    Poll::Ready(Some(Err(err)))
                }
                None => Poll::Ready(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use grpcweb_core::{wrap_envelope, Code};
    use http::HeaderMap;

    use crate::options::CancelHandle;

    // A minimal prost + serde message, the shape generated code has.
    #[derive(Clone, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
    struct Note {
        text: String,
    }

    impl prost::Message for Note {
        fn encode_raw(&self, buf: &mut impl bytes::BufMut)
        where
            Self: Sized,
        {
            if !self.text.is_empty() {
                prost::encoding::string::encode(1, &self.text, buf);
            }
        }

        fn merge_field(
            &mut self,
            tag: u32,
            wire_type: prost::encoding::WireType,
            buf: &mut impl bytes::Buf,
            ctx: prost::encoding::DecodeContext,
        ) -> Result<(), prost::DecodeError>
        where
            Self: Sized,
        {
            if tag == 1 {
                prost::encoding::string::merge(wire_type, &mut self.text, buf, ctx)
            } else {
                prost::encoding::skip_field(wire_type, tag, buf, ctx)
            }
        }

        fn encoded_len(&self) -> usize {
            if self.text.is_empty() {
                0
            } else {
                prost::encoding::string::encoded_len(1, &self.text)
            }
        }

        fn clear(&mut self) {
            self.text.clear();
        }
    }

    fn decoder_over(
        data: Vec<u8>,
    ) -> FrameDecoder<impl Stream<Item = Result<Bytes, ClientError>> + Unpin, Note> {
        FrameDecoder::new(
            stream::iter(vec![Ok(Bytes::from(data))]),
            false,
            None,
            usize::MAX,
        )
    }

    fn body_with(messages: &[&str], trailer: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        for text in messages {
            let payload = format!(r#"{{"text":"{text}"}}"#);
            data.extend_from_slice(&wrap_envelope(payload.as_bytes(), 0));
        }
        data.extend_from_slice(&wrap_envelope(trailer, 0x80));
        data
    }

    #[tokio::test]
    async fn test_streaming_yields_and_exposes_trailers() {
        let body = body_with(&["a", "b"], b"grpc-status: 0\r\nx-extra: 1\r\n");
        let mut streaming = Streaming::new(decoder_over(body));

        assert!(streaming.trailers().is_none());

        assert_eq!(streaming.next().await.unwrap().unwrap().text, "a");
        assert_eq!(streaming.next().await.unwrap().unwrap().text, "b");
        assert!(streaming.next().await.is_none());
        assert!(streaming.is_finished());

        let trailers = streaming.trailers().unwrap();
        assert_eq!(trailers.get("x-extra"), Some("1"));
    }

    #[tokio::test]
    async fn test_streaming_drain() {
        let body = body_with(&["a", "b", "c"], b"grpc-status: 0\r\n");
        let mut streaming = Streaming::new(decoder_over(body));

        assert_eq!(streaming.next().await.unwrap().unwrap().text, "a");
        assert_eq!(streaming.drain().await, 2);
        assert!(streaming.is_finished());
        assert!(streaming.trailers().is_some());
    }

    #[tokio::test]
    async fn test_streaming_drain_timeout_completes() {
        let body = body_with(&["a"], b"grpc-status: 0\r\n");
        let mut streaming = Streaming::new(decoder_over(body));

        let result = streaming
            .drain_timeout(std::time::Duration::from_secs(5))
            .await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_trailers_only_success() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", "0".parse().unwrap());

        let mut streaming: Streaming<FrameDecoder<stream::Empty<Result<Bytes, ClientError>>, Note>> =
            Streaming::trailers_only(Metadata::new(headers), None);

        assert!(streaming.next().await.is_none());
        assert!(streaming.is_finished());
        assert_eq!(streaming.trailers().unwrap().get("grpc-status"), Some("0"));
    }

    #[tokio::test]
    async fn test_trailers_only_error() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", "7".parse().unwrap());

        let mut streaming: Streaming<FrameDecoder<stream::Empty<Result<Bytes, ClientError>>, Note>> =
            Streaming::trailers_only(
                Metadata::new(headers),
                Some(ClientError::new(Code::PermissionDenied, "nope")),
            );

        let err = streaming.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
        assert!(streaming.next().await.is_none());
    }

    #[tokio::test]
    async fn test_streaming_cancel_signal() {
        // A body that never ends keeps the read pending until the signal
        // fires.
        let pending_body = stream::pending::<Result<Bytes, ClientError>>();
        let decoder = FrameDecoder::<_, Note>::new(pending_body, false, None, usize::MAX);

        let (handle, signal) = CancelHandle::new();
        let mut streaming = Streaming::new(decoder).with_cancel(Some(signal));

        handle.cancel();

        let err = streaming.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
        assert!(streaming.next().await.is_none());
        assert!(streaming.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_deadline() {
        let pending_body = stream::pending::<Result<Bytes, ClientError>>();
        let decoder = FrameDecoder::<_, Note>::new(pending_body, false, None, usize::MAX);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(50);
        let mut streaming = Streaming::new(decoder).with_deadline(Some(deadline));

        let err = streaming.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }
}
