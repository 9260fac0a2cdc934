//! Wire types for the `fuddle.Registry` gRPC service.
//!
//! The message and client code under `generated/` is produced from
//! `proto/fuddle.proto` and checked in, so building the crate does not need
//! `protoc`. Conversions to and from the domain types live in `exts`.

#[allow(clippy::all)]
mod pb {
    include!("generated/fuddle.rs");
}

pub use pb::*;

mod exts;
