//! The request body of a call.
//!
//! A gRPC-Web request body is a concatenation of envelopes. A unary or
//! server-streaming call joins its single envelope up front and sends one
//! buffer with an exact length; client- and bidi-streaming calls feed
//! envelopes to the wire as the caller produces them, and closing the
//! stream is the half-close.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};

use crate::error::ClientError;

type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

enum Inner {
    /// Every envelope already joined into one buffer; taken on first poll.
    Joined(Option<Bytes>),
    /// Envelopes produced while the call runs.
    Envelopes(EnvelopeStream),
}

/// A gRPC-Web request body.
pub struct RequestBody {
    inner: Inner,
}

impl RequestBody {
    /// A body whose envelopes are already joined into one buffer.
    ///
    /// The HTTP client sees an exact content length and needs no chunked
    /// transfer.
    pub fn joined(envelopes: Bytes) -> Self {
        Self {
            inner: Inner::Joined(Some(envelopes)),
        }
    }

    /// A body fed envelope by envelope from a stream.
    ///
    /// The stream ending half-closes the send side; a stream error aborts
    /// the request body.
    pub fn envelopes<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            inner: Inner::Envelopes(Box::pin(stream)),
        }
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Inner::Joined(envelopes) => {
                Poll::Ready(envelopes.take().map(|data| Ok(Frame::data(data))))
            }
            Inner::Envelopes(stream) => stream
                .as_mut()
                .poll_next(cx)
                .map(|next| next.map(|result| result.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.inner, Inner::Joined(None))
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Inner::Joined(envelopes) => {
                SizeHint::with_exact(envelopes.as_ref().map_or(0, |data| data.len() as u64))
            }
            Inner::Envelopes(_) => SizeHint::default(),
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Joined(envelopes) => f
                .debug_struct("RequestBody::Joined")
                .field("len", &envelopes.as_ref().map(Bytes::len))
                .finish(),
            Inner::Envelopes(_) => f.debug_struct("RequestBody::Envelopes").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_joined_body_sends_one_buffer() {
        let body = RequestBody::joined(Bytes::from_static(b"\x00\x00\x00\x00\x02hi"));

        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(7));

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"\x00\x00\x00\x00\x02hi"));
    }

    #[tokio::test]
    async fn test_joined_body_ends_after_the_buffer() {
        let mut body = RequestBody::joined(Bytes::from_static(b"data"));

        let frame = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"data"));

        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_envelope_body_streams_in_order() {
        let frames = vec![
            Ok(Bytes::from_static(b"\x00\x00\x00\x00\x01a")),
            Ok(Bytes::from_static(b"\x00\x00\x00\x00\x01b")),
        ];
        let body = RequestBody::envelopes(futures::stream::iter(frames));

        assert!(body.size_hint().exact().is_none());

        let collected = body.collect().await.unwrap();
        assert_eq!(
            collected.to_bytes(),
            Bytes::from_static(b"\x00\x00\x00\x00\x01a\x00\x00\x00\x00\x01b")
        );
    }

    #[tokio::test]
    async fn test_envelope_body_propagates_errors() {
        let frames: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"\x00\x00\x00\x00\x01a")),
            Err(ClientError::Encode("boom".into())),
        ];
        let body = RequestBody::envelopes(futures::stream::iter(frames));

        assert!(body.collect().await.is_err());
    }
}
