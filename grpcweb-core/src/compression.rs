//! Compression descriptors and encoding negotiation.
//!
//! A [`Compression`] is a value-level descriptor: a `grpc-encoding`
//! registry token plus a compress/decompress function pair. Callers hand
//! the transport a list of descriptors they accept and at most one to
//! apply on send; the response's `grpc-encoding` header is then matched
//! against the accepted list by name.
//!
//! `identity` is implicit: it never appears in a descriptor list and
//! [`match_encoding`] resolves it to "no codec".

use std::io;
use std::sync::Arc;

use bytes::Bytes;

#[cfg(any(feature = "compression-gzip", feature = "compression-zstd"))]
use std::io::Read;
#[cfg(feature = "compression-gzip")]
use std::io::Write;

type CompressFn = dyn Fn(&[u8]) -> io::Result<Bytes> + Send + Sync;

/// A per-envelope compression descriptor.
///
/// Cheap to clone; the function pair is shared. Built-in constructors
/// cover the registry tokens this crate ships ([`gzip`](Compression::gzip),
/// [`brotli`](Compression::brotli), [`zstd`](Compression::zstd)); anything
/// else is a [`Compression::new`] call away:
///
/// ```ignore
/// let snappy = Compression::new(
///     "snappy",
///     |data| Ok(Bytes::from(snap::raw::Encoder::new().compress_vec(data)?)),
///     |data| Ok(Bytes::from(snap::raw::Decoder::new().decompress_vec(data)?)),
/// );
/// ```
#[derive(Clone)]
pub struct Compression {
    name: &'static str,
    compress: Arc<CompressFn>,
    decompress: Arc<CompressFn>,
}

impl Compression {
    /// Create a descriptor from an encoding name and a function pair.
    pub fn new<C, D>(name: &'static str, compress: C, decompress: D) -> Self
    where
        C: Fn(&[u8]) -> io::Result<Bytes> + Send + Sync + 'static,
        D: Fn(&[u8]) -> io::Result<Bytes> + Send + Sync + 'static,
    {
        Self {
            name,
            compress: Arc::new(compress),
            decompress: Arc::new(decompress),
        }
    }

    /// The `grpc-encoding` registry token (e.g. "gzip").
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Compress a payload.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        (self.compress)(data)
    }

    /// Decompress a payload.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        (self.decompress)(data)
    }
}

impl std::fmt::Debug for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Compression").field(&self.name).finish()
    }
}

#[cfg(feature = "compression-gzip")]
impl Compression {
    /// Gzip at the default level (6).
    ///
    /// Requires the `compression-gzip` feature.
    pub fn gzip() -> Self {
        Self::gzip_with_level(6)
    }

    /// Gzip at a specific level (0-9, clamped).
    pub fn gzip_with_level(level: u32) -> Self {
        let level = flate2::Compression::new(level.min(9));
        Self::new(
            "gzip",
            move |data| {
                let mut encoder = flate2::write::GzEncoder::new(Vec::new(), level);
                encoder.write_all(data)?;
                Ok(Bytes::from(encoder.finish()?))
            },
            |data| {
                let mut out = Vec::with_capacity(data.len().saturating_mul(2));
                flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
                Ok(Bytes::from(out))
            },
        )
    }
}

#[cfg(feature = "compression-br")]
impl Compression {
    /// Brotli at the default quality (4).
    ///
    /// Requires the `compression-br` feature.
    pub fn brotli() -> Self {
        Self::brotli_with_quality(4)
    }

    /// Brotli at a specific quality (0-11, clamped).
    pub fn brotli_with_quality(quality: u32) -> Self {
        let quality = quality.min(11) as i32;
        Self::new(
            "br",
            move |data| {
                let params = brotli::enc::BrotliEncoderParams {
                    quality,
                    ..Default::default()
                };
                let mut out = Vec::new();
                brotli::enc::BrotliCompress(&mut io::Cursor::new(data), &mut out, &params)?;
                Ok(Bytes::from(out))
            },
            |data| {
                let mut out = Vec::new();
                brotli::BrotliDecompress(&mut io::Cursor::new(data), &mut out)?;
                Ok(Bytes::from(out))
            },
        )
    }
}

#[cfg(feature = "compression-zstd")]
impl Compression {
    /// Zstd at the default level (3).
    ///
    /// Requires the `compression-zstd` feature.
    pub fn zstd() -> Self {
        Self::zstd_with_level(3)
    }

    /// Zstd at a specific level (1-22, clamped).
    pub fn zstd_with_level(level: i32) -> Self {
        let level = level.clamp(1, 22);
        Self::new(
            "zstd",
            move |data| {
                zstd::bulk::compress(data, level)
                    .map(Bytes::from)
                    .map_err(io::Error::other)
            },
            |data| zstd::decode_all(data).map(Bytes::from),
        )
    }
}

/// A peer named an encoding outside the accepted set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownEncoding;

/// Resolve a `grpc-encoding` header value against the accepted
/// descriptors.
///
/// `identity`, the empty string and an absent header (passed as `""`)
/// resolve to `Ok(None)`: the payload needs no decompression. A name
/// missing from `accepted` is an [`UnknownEncoding`] error.
pub fn match_encoding<'a>(
    name: &str,
    accepted: &'a [Compression],
) -> Result<Option<&'a Compression>, UnknownEncoding> {
    if name.is_empty() || name == "identity" {
        return Ok(None);
    }
    accepted
        .iter()
        .find(|c| c.name() == name)
        .map(Some)
        .ok_or(UnknownEncoding)
}

/// Build the `grpc-accept-encoding` header value for the accepted
/// descriptors, in preference order.
///
/// Returns `None` when the list is empty; identity is implicit and never
/// listed.
pub fn accept_encoding_header(accepted: &[Compression]) -> Option<String> {
    if accepted.is_empty() {
        return None;
    }
    Some(
        accepted
            .iter()
            .map(Compression::name)
            .collect::<Vec<_>>()
            .join(", "),
    )
}
