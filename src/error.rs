//! The closed Exceptions taxonomy a caller of [`crate::connection::Connection`] observes.
//!
//! This is the boundary error type: every fallible public operation on `Connection`
//! returns `Result<T, Error>`. It is deliberately narrower than the wire-level
//! [`crate::protocol::error::Error`] — `Connection::receive_response_to_request`
//! classifies per-partition wire codes into one of these kinds (§4.5 of SPEC_FULL.md).
//!
//! Each variant maps to a stable numeric [`ErrorCode`] so callers that only want the
//! "equality to a code" predicate don't need to match the full enum shape.

use std::fmt;

use thiserror::Error;

use crate::protocol::error::Error as ApiError;

/// Stable numeric codes, one per [`Error`] variant. Kept fieldless and `#[repr(i16)]` so
/// it round-trips through FFI-ish boundaries (logs, metrics) as a plain integer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(i16)]
pub enum ErrorCode {
    MismatchArgument = 1,
    CannotSend = 2,
    CannotRecv = 3,
    CannotBind = 4,
    ResponseMessageNotReceived = 5,
    NoConnection = 6,
    NoKnownBrokers = 7,
    UnknownTopicOrPartition = 8,
    LeaderNotAvailable = 9,
    NotLeaderForPartition = 10,
    MetadataAttemptsFail = 11,
    DescriptionMismatch = 12,
    CompressionCodecUnavailable = 13,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i16)
    }
}

/// The closed set of failure kinds a `Connection` operation can raise.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An argument failed validation before any IO was attempted (§4.5: argument
    /// validation happens unconditionally, independent of `RaiseError`).
    #[error("invalid argument: {message}")]
    MismatchArgument { message: String },

    /// A `send` could not be completed within the configured timeout or the peer closed
    /// the connection mid-write.
    #[error("cannot send to {host}:{port}: {message}")]
    CannotSend {
        host: String,
        port: u16,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A `receive` could not read the requested number of octets.
    #[error("cannot receive from {host}:{port}: {message}")]
    CannotRecv {
        host: String,
        port: u16,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The underlying socket could not be opened/bound at all.
    #[error("cannot connect to {host}:{port}: {message}")]
    CannotBind {
        host: String,
        port: u16,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A response frame's declared length was too short to contain a real message
    /// (§4.2 robustness rule iii).
    #[error("response message not received: {message}")]
    ResponseMessageNotReceived { message: String },

    /// An operation was attempted on a `Connection` with no usable IO handle and no way
    /// to transparently reopen one.
    #[error("no connection available: {message}")]
    NoConnection { message: String },

    /// None of the configured/known broker addresses could be reached.
    #[error("no known brokers available")]
    NoKnownBrokers,

    /// The cluster reports that a topic or partition the caller named does not exist.
    #[error("unknown topic or partition: {topic}:{partition}")]
    UnknownTopicOrPartition { topic: String, partition: i32 },

    /// The partition's leader is not currently available (transient; usually resolves
    /// after a metadata refresh).
    #[error("leader not available for {topic}:{partition}")]
    LeaderNotAvailable { topic: String, partition: i32 },

    /// The broker contacted is not the current leader for the named partition.
    #[error("not leader for {topic}:{partition}")]
    NotLeaderForPartition { topic: String, partition: i32 },

    /// The retry budget for refreshing cluster metadata was exhausted without success.
    #[error("failed to refresh metadata after exhausting retry budget: {message}")]
    MetadataAttemptsFail { message: String },

    /// A reply did not describe the request that produced it (mismatched correlation id,
    /// topic, or partition in the decoded response).
    #[error("response does not match request: {message}")]
    DescriptionMismatch { message: String },

    /// The message set used a compression codec this crate does not implement.
    #[error("compression codec unavailable: {codec}")]
    CompressionCodecUnavailable { codec: String },
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MismatchArgument { .. } => ErrorCode::MismatchArgument,
            Self::CannotSend { .. } => ErrorCode::CannotSend,
            Self::CannotRecv { .. } => ErrorCode::CannotRecv,
            Self::CannotBind { .. } => ErrorCode::CannotBind,
            Self::ResponseMessageNotReceived { .. } => ErrorCode::ResponseMessageNotReceived,
            Self::NoConnection { .. } => ErrorCode::NoConnection,
            Self::NoKnownBrokers => ErrorCode::NoKnownBrokers,
            Self::UnknownTopicOrPartition { .. } => ErrorCode::UnknownTopicOrPartition,
            Self::LeaderNotAvailable { .. } => ErrorCode::LeaderNotAvailable,
            Self::NotLeaderForPartition { .. } => ErrorCode::NotLeaderForPartition,
            Self::MetadataAttemptsFail { .. } => ErrorCode::MetadataAttemptsFail,
            Self::DescriptionMismatch { .. } => ErrorCode::DescriptionMismatch,
            Self::CompressionCodecUnavailable { .. } => ErrorCode::CompressionCodecUnavailable,
        }
    }

    /// Classifies a wire-level per-partition error into the boundary taxonomy, given the
    /// topic/partition it was returned for (§4.5 step 4).
    pub fn from_api_error(err: ApiError, topic: &str, partition: i32) -> Self {
        match err {
            ApiError::UnknownTopicOrPartition => Self::UnknownTopicOrPartition {
                topic: topic.to_string(),
                partition,
            },
            ApiError::LeaderNotAvailable => Self::LeaderNotAvailable {
                topic: topic.to_string(),
                partition,
            },
            ApiError::NotLeaderForPartition => Self::NotLeaderForPartition {
                topic: topic.to_string(),
                partition,
            },
            other => Self::DescriptionMismatch {
                message: format!("{topic}:{partition}: {other}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_variant() {
        let err = Error::NoKnownBrokers;
        assert_eq!(err.code(), ErrorCode::NoKnownBrokers);
    }

    #[test]
    fn from_api_error_classifies_stale_leadership() {
        let err = Error::from_api_error(ApiError::NotLeaderForPartition, "topic-a", 3);
        assert_eq!(err.code(), ErrorCode::NotLeaderForPartition);
    }

    #[test]
    fn from_api_error_falls_back_to_description_mismatch() {
        let err = Error::from_api_error(ApiError::CorruptMessage, "topic-a", 0);
        assert_eq!(err.code(), ErrorCode::DescriptionMismatch);
    }
}
