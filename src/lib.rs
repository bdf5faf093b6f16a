//! A client for the wire protocol and connection layer of a distributed commit-log
//! service (the Kafka legacy/non-flexible protocol: produce, fetch, list-offsets, and
//! metadata, framed behind a plain four-byte length prefix).
//!
//! [`connection::Connection`] is the entry point: it owns a cache of per-broker sockets,
//! the cluster's topic/partition metadata, and the retry/failover loop that routes a
//! request to the partition's current leader. See [`error::Error`] for the closed set of
//! failures a caller observes.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod int64;
pub mod internals;
pub mod io;
pub mod protocol;
pub mod topic;

pub use connection::{Connection, ConnectionConfig};
pub use error::{Error, ErrorCode};
