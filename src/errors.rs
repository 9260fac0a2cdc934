//! Fuddle client error hierarchy
//!
//! Errors are split by where they surface: connecting to the seeds, talking to
//! a connected server, an explicit rejection from the registry, and malformed
//! updates received on the stream.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;
use tonic::Code;
use tonic::Status;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// None of the seed addresses could be reached
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Transport failures after the client connected. Self-heals on reconnect.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The registry explicitly refused a register, unregister or metadata
    /// update. The local store is left unchanged.
    #[error("Request rejected by registry ({code:?}): {message}")]
    Rejected { code: Code, message: String },

    /// Malformed update received from the registry
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Invalid or unreadable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The client session has been closed
    #[error("Client is closed")]
    Closed,

    /// The member is not registered by this client
    #[error("Member {0} is not registered by this client")]
    UnknownMember(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Connect was called without any seed address
    #[error("No seed addresses given")]
    NoSeeds,

    /// Every seed address failed
    #[error("Failed to connect to any seed: {}", format_seed_failures(.failures))]
    AllSeedsFailed { failures: Vec<SeedFailure> },
}

/// Reason a single seed address could not be connected
#[derive(Debug)]
pub struct SeedFailure {
    pub addr: String,
    pub reason: String,
}

fn format_seed_failures(failures: &[SeedFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.addr, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Server unreachable or connection dropped
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Request did not complete in time
    #[error("Request {request_type} timed out after {duration:?}")]
    Timeout {
        request_type: &'static str,
        duration: Duration,
    },

    /// Malformed seed address
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// The update stream ended or failed
    #[error("Update stream terminated: {0}")]
    StreamTerminated(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Update kind outside the known set
    #[error("Unknown update type {kind} for member {id}")]
    UnknownUpdateKind { id: String, kind: i32 },

    /// Update without a member id
    #[error("Update missing member id")]
    MissingId,

    /// Register or metadata update without the member attributes
    #[error("{kind} update for member {id} missing member attributes")]
    MissingMember { id: String, kind: &'static str },
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Network(NetworkError::TonicError(Box::new(e)))
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        match status.code() {
            // The request never got an answer from the registry: treat as a
            // connectivity problem rather than a decision.
            Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
                Error::Network(NetworkError::ServiceUnavailable(status.message().to_string()))
            }
            code => Error::Rejected {
                code,
                message: status.message().to_string(),
            },
        }
    }
}

impl Error {
    /// Returns true if the registry explicitly refused the request
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }
}
