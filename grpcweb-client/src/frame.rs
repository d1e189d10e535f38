//! gRPC-Web frame encoding and decoding.
//!
//! This module provides:
//! - [`FrameDecoder`]: a stream adapter that splits a response byte stream
//!   into envelopes, decompresses them, separates the trailer block and
//!   yields decoded messages.
//! - [`FrameEncoder`]: a stream adapter that serializes outbound messages
//!   into envelopes, compressing when eligible.
//!
//! # Frame format
//!
//! ```text
//! [flags:1][length:4 big-endian][payload:length]
//! ```
//!
//! Flag bit 0 marks a compressed payload; flag bit 7 marks the trailer
//! envelope. The trailer is always the last envelope on the wire.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use grpcweb_core::{
    check_envelope_flags, check_payload_size, envelope_flags, parse_envelope_header,
    parse_trailer, trailer_status, wrap_envelope, Code, Compression, ENVELOPE_HEADER_SIZE,
};
use prost::Message;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ClientError;
use crate::response::Metadata;

/// Decode a message payload in the configured format.
pub(crate) fn decode_message<T>(bytes: &[u8], use_binary: bool) -> Result<T, ClientError>
where
    T: Message + DeserializeOwned + Default,
{
    if use_binary {
        T::decode(bytes).map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {e}")))
    } else {
        serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Decode(format!("JSON decoding failed: {e}")))
    }
}

/// Encode a message payload in the configured format.
pub(crate) fn encode_message<T>(msg: &T, use_binary: bool) -> Result<Bytes, ClientError>
where
    T: Message + Serialize,
{
    if use_binary {
        Ok(Bytes::from(msg.encode_to_vec()))
    } else {
        serde_json::to_vec(msg)
            .map(Bytes::from)
            .map_err(|e| ClientError::Encode(format!("JSON encoding failed: {e}")))
    }
}

/// Size-check, compress and frame one serialized payload.
pub(crate) fn frame_payload(
    payload: Bytes,
    send_compression: Option<&Compression>,
    compress_min_bytes: usize,
    write_max_bytes: usize,
) -> Result<Bytes, ClientError> {
    check_payload_size(payload.len(), write_max_bytes)?;

    let (payload, flags) = match send_compression {
        Some(codec) if payload.len() >= compress_min_bytes => {
            let compressed = codec
                .compress(&payload)
                .map_err(|e| ClientError::Encode(format!("compression failed: {e}")))?;
            (compressed, envelope_flags::COMPRESSED)
        }
        _ => (payload, 0),
    };

    Ok(Bytes::from(wrap_envelope(&payload, flags)))
}

/// Serialize, size-check, compress and frame one outbound message.
pub(crate) fn encode_frame<T>(
    msg: &T,
    use_binary: bool,
    send_compression: Option<&Compression>,
    compress_min_bytes: usize,
    write_max_bytes: usize,
) -> Result<Bytes, ClientError>
where
    T: Message + Serialize,
{
    let payload = encode_message(msg, use_binary)?;
    frame_payload(payload, send_compression, compress_min_bytes, write_max_bytes)
}

/// Decompress an envelope payload according to its flags, enforcing the
/// receive limit on the decompressed size.
pub(crate) fn decompress_envelope(
    flags: u8,
    payload: Bytes,
    codec: Option<&Compression>,
    read_max_bytes: usize,
) -> Result<Bytes, ClientError> {
    if flags & envelope_flags::COMPRESSED == 0 {
        return Ok(payload);
    }

    let Some(codec) = codec else {
        return Err(ClientError::Protocol(
            "received compressed envelope, but grpc-encoding is identity".into(),
        ));
    };

    let decompressed = codec
        .decompress(&payload)
        .map_err(|e| ClientError::new(Code::Internal, format!("decompression failed: {e}")))?;

    check_payload_size(decompressed.len(), read_max_bytes)?;

    Ok(decompressed)
}

/// A parsed frame, before message decoding.
enum ParsedFrame {
    Message(Bytes),
    Trailer,
}

/// Stream adapter that decodes gRPC-Web envelopes from a byte stream.
///
/// Yields decoded messages; the trailer block is captured internally and
/// becomes available through [`trailers`](FrameDecoder::trailers) once the
/// stream has ended. A non-OK `grpc-status` in the trailer is yielded as
/// the final stream error, after every message that preceded it on the
/// wire.
pub struct FrameDecoder<S, T> {
    /// The underlying byte stream.
    stream: S,
    /// Buffer for incomplete frames.
    buffer: BytesMut,
    /// Use protobuf (true) or JSON (false) decoding.
    use_binary: bool,
    /// Decompression codec; `None` means identity.
    codec: Option<Compression>,
    /// Hard cap on a single decoded payload.
    read_max_bytes: usize,
    /// Trailer block, once seen.
    trailers: Option<Metadata>,
    /// Whether the stream has finished (trailer error, EOF or failure).
    finished: bool,
    /// Type marker for the message type.
    _marker: PhantomData<T>,
}

impl<S, T> FrameDecoder<S, T> {
    /// Create a decoder over a response byte stream.
    pub fn new(
        stream: S,
        use_binary: bool,
        codec: Option<Compression>,
        read_max_bytes: usize,
    ) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            use_binary,
            codec,
            read_max_bytes,
            trailers: None,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// The trailer block, if the stream has delivered one.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.trailers.as_ref()
    }

    /// Take the trailer block, leaving `None` in place.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        self.trailers.take()
    }

    /// Whether the stream has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Try to parse one complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    fn try_parse_frame(&mut self) -> Result<Option<ParsedFrame>, ClientError> {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        check_envelope_flags(flags)?;

        let length = length as usize;
        check_payload_size(length, self.read_max_bytes)?;

        let frame_size = ENVELOPE_HEADER_SIZE + length;
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let frame = self.buffer.split_to(frame_size);
        let payload = Bytes::copy_from_slice(&frame[ENVELOPE_HEADER_SIZE..]);
        let payload =
            decompress_envelope(flags, payload, self.codec.as_ref(), self.read_max_bytes)?;

        if flags & envelope_flags::TRAILER != 0 {
            if self.trailers.is_some() {
                return Err(ClientError::new(
                    Code::InvalidArgument,
                    "received extra trailer",
                ));
            }
            let trailer = parse_trailer(&payload)?;
            let status = trailer_status(&trailer)?;
            self.trailers = Some(Metadata::new(trailer));
            if !status.is_ok() {
                return Err(ClientError::Rpc(status));
            }
            return Ok(Some(ParsedFrame::Trailer));
        }

        if self.trailers.is_some() {
            return Err(ClientError::new(
                Code::InvalidArgument,
                "received extra message after trailer",
            ));
        }

        Ok(Some(ParsedFrame::Message(payload)))
    }
}

impl<S, T> Unpin for FrameDecoder<S, T> where S: Unpin {}

impl<S, T> Stream for FrameDecoder<S, T>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(ParsedFrame::Message(payload))) => {
                    match decode_message(&payload, this.use_binary) {
                        Ok(msg) => return Poll::Ready(Some(Ok(msg))),
                        Err(e) => {
                            this.finished = true;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                Ok(Some(ParsedFrame::Trailer)) => {
                    // Keep consuming so envelopes after the trailer fail
                    // the stream.
                }
                Ok(None) => {}
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if !this.buffer.is_empty() {
                        return Poll::Ready(Some(Err(ClientError::Protocol(
                            "premature end of stream".into(),
                        ))));
                    }
                    if this.trailers.is_none() {
                        return Poll::Ready(Some(Err(ClientError::new(
                            Code::InvalidArgument,
                            "missing trailer",
                        ))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Stream adapter that encodes messages into gRPC-Web envelopes.
///
/// Wraps a message stream and yields framed bytes for a streaming request
/// body. gRPC-Web clients send no end-of-stream frame; closing the body is
/// the half-close.
pub struct FrameEncoder<S, T> {
    /// The underlying message stream.
    stream: S,
    /// Use protobuf (true) or JSON (false) encoding.
    use_binary: bool,
    /// Compression codec for outbound payloads; `None` means identity.
    send_compression: Option<Compression>,
    /// Payloads below this size are never compressed.
    compress_min_bytes: usize,
    /// Hard cap on a single serialized payload.
    write_max_bytes: usize,
    /// Whether the encoder has stopped (inner end or error).
    finished: bool,
    /// Type marker for the message type.
    _marker: PhantomData<T>,
}

impl<S, T> FrameEncoder<S, T> {
    /// Create an encoder over a message stream.
    pub fn new(
        stream: S,
        use_binary: bool,
        send_compression: Option<Compression>,
        compress_min_bytes: usize,
        write_max_bytes: usize,
    ) -> Self {
        Self {
            stream,
            use_binary,
            send_compression,
            compress_min_bytes,
            write_max_bytes,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Whether the encoder has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<S, T> Unpin for FrameEncoder<S, T> where S: Unpin {}

impl<S, T> Stream for FrameEncoder<S, T>
where
    S: Stream<Item = T> + Unpin,
    T: Message + Serialize,
{
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(msg)) => {
                let frame = encode_frame(
                    &msg,
                    this.use_binary,
                    this.send_compression.as_ref(),
                    this.compress_min_bytes,
                    this.write_max_bytes,
                );
                if frame.is_err() {
                    this.finished = true;
                }
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
