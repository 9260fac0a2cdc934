//! Shared helpers for unit tests: random members, logger setup and an
//! in-memory transport.
mod common;
mod fake_transport;

pub(crate) use common::*;
pub(crate) use fake_transport::*;
