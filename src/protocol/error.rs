//! Wire-level API error codes, as carried per-response and per-partition.
//!
//! This is a *narrower* enum than [`crate::error::Error`] (the closed Exceptions taxonomy
//! a caller of [`crate::connection::Connection`] observes): it mirrors exactly the i16
//! codes the broker cluster puts on the wire. `Connection::receive_response_to_request`
//! classifies these into the Exceptions taxonomy (§4.5 of SPEC_FULL.md); callers that only
//! care about a single partition's outcome can match on this type directly.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Error {
    #[error("the server experienced an unexpected error when processing the request")]
    Unknown,

    #[error("the requested offset is outside the range of offsets maintained by the server")]
    OffsetOutOfRange,

    #[error("message contents does not match its CRC")]
    CorruptMessage,

    #[error("topic or partition does not exist on this server")]
    UnknownTopicOrPartition,

    #[error("message has a negative size")]
    InvalidFetchSize,

    #[error("the leader for this partition is not available")]
    LeaderNotAvailable,

    #[error("the server is not the leader for that topic-partition")]
    NotLeaderForPartition,

    #[error("the request timed out")]
    RequestTimedOut,

    #[error("the broker is not available")]
    BrokerNotAvailable,

    #[error("the replica is not available for the requested topic-partition")]
    ReplicaNotAvailable,

    #[error("the request included a message larger than the maximum message size")]
    MessageSizeTooLarge,

    #[error("the controller moved to another broker")]
    StaleControllerEpoch,

    #[error("the metadata field of the offset request was too large")]
    OffsetMetadataTooLarge,

    #[error("the server disconnected before a response was received")]
    NetworkException,

    /// Any code this crate does not name explicitly. Preserved rather than dropped, so
    /// decoding never fails just because the broker used a code outside this list.
    #[error("unrecognized broker error code {0}")]
    Other(i16),
}

impl Error {
    /// Maps a wire error code to `Some(Error)`, or `None` for the "no error" code (0).
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::Unknown),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidFetchSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderForPartition),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            9 => Some(Self::ReplicaNotAvailable),
            10 => Some(Self::MessageSizeTooLarge),
            11 => Some(Self::StaleControllerEpoch),
            12 => Some(Self::OffsetMetadataTooLarge),
            13 => Some(Self::NetworkException),
            other => Some(Self::Other(other)),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::Unknown => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageSizeTooLarge => 10,
            Self::StaleControllerEpoch => 11,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::Other(code) => code,
        }
    }

    /// Whether the condition is specific to one partition's leadership and warrants a
    /// metadata refresh + retry rather than being surfaced immediately (§4.5 step 4).
    pub fn is_stale_leadership(self) -> bool {
        matches!(self, Self::LeaderNotAvailable | Self::NotLeaderForPartition)
    }
}
