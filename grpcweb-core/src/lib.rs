//! Core protocol types for the gRPC-Web client.
//!
//! This crate provides the reusable primitives the transport crate
//! (`grpcweb-client`) is built from:
//!
//! - [`envelope`]: length-prefixed envelope framing
//! - [`compression`]: compression descriptors and encoding negotiation
//! - [`status`]: gRPC status codes and the `Status` error payload
//! - [`trailer`]: the in-body trailer block codec

mod compression;
mod envelope;
mod status;
mod trailer;

pub use compression::*;
pub use envelope::*;
pub use status::*;
pub use trailer::*;
