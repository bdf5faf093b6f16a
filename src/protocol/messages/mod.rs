//! Api-versioned request/response bodies.
//!
//! Every message in this module is framed the same way at the connection layer (§4.2):
//! a `RequestHeader`/`ResponseHeader` followed by a body whose exact layout can vary by
//! `api-version`. `ReadVersionedType`/`WriteVersionedType` carry that version alongside
//! the reader/writer so a single struct can encode/decode every version this crate
//! speaks, instead of one struct per version.

use std::io::{Read, Write};

use thiserror::Error;

use super::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    traits::{ReadError, ReadType, WriteError, WriteType},
};

pub mod api_versions;
pub mod fetch;
pub mod header;
pub mod metadata;
pub mod offset;
pub mod produce;

#[cfg(test)]
pub(crate) mod test_utils;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadVersionedError {
    #[error(transparent)]
    ReadError(#[from] ReadError),

    #[error("unsupported version: {version} for {api_key:?}")]
    UnsupportedVersion { version: i16, api_key: ApiKey },
}

pub trait ReadVersionedType<R>: Sized
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError>;
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteVersionedError {
    #[error(transparent)]
    WriteError(#[from] WriteError),

    #[error("unsupported version: {version} for {api_key:?}")]
    UnsupportedVersion { version: i16, api_key: ApiKey },
}

pub trait WriteVersionedType<W>: Sized
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError>;
}

/// Binds a request body to its `ApiKey` and the range of versions this crate can speak,
/// and names its matching response type.
pub trait RequestBody {
    type ResponseBody;

    const API_KEY: ApiKey;

    /// The inclusive range of versions this crate knows how to encode/decode, independent
    /// of what the connected broker might itself support.
    const API_VERSION_RANGE: ApiVersionRange;

    /// The header version to use when framing this body (§3: legacy headers are fixed
    /// per api-version, not negotiated independently).
    fn header_version(version: ApiVersion) -> ApiVersion;
}

/// Reads an `ARRAY<T>` of versioned elements, threading `version` through each one.
pub fn read_versioned_array<R, T>(
    reader: &mut R,
    version: ApiVersion,
) -> Result<Vec<T>, ReadVersionedError>
where
    R: Read,
    T: ReadVersionedType<R>,
{
    let count = i32::read(reader).map_err(ReadError::from)?;
    if count < 0 {
        return Err(ReadError::Malformed(
            format!("invalid negative array length: {count}").into(),
        )
        .into());
    }
    let count = usize::try_from(count).map_err(ReadError::from)?;
    let mut items = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        items.push(T::read_versioned(reader, version)?);
    }
    Ok(items)
}

/// Writes an `ARRAY<T>` of versioned elements, threading `version` through each one.
pub fn write_versioned_array<W, T>(
    writer: &mut W,
    items: &[T],
    version: ApiVersion,
) -> Result<(), WriteVersionedError>
where
    W: Write,
    T: WriteVersionedType<W>,
{
    let count = i32::try_from(items.len()).map_err(WriteError::from)?;
    count.write(writer).map_err(WriteError::from)?;
    for item in items {
        item.write_versioned(writer, version)?;
    }
    Ok(())
}

// Re-exported so callers don't need to know the internal module layout (mirrors the
// teacher's flattened `protocol::messages::*` surface).
pub use api_versions::{ApiVersionsRequest, ApiVersionsResponse};
pub use fetch::{
    FetchRequest, FetchRequestPartition, FetchRequestTopic, FetchResponse, FetchResponsePartition,
    FetchResponseTopic,
};
pub use header::{RequestHeader, ResponseHeader};
pub use metadata::{
    MetadataRequest, MetadataRequestTopic, MetadataResponse, MetadataResponseBroker,
    MetadataResponsePartition, MetadataResponseTopic,
};
pub use offset::{
    ListOffsetsRequest, ListOffsetsRequestPartition, ListOffsetsRequestTopic, ListOffsetsResponse,
    ListOffsetsResponsePartition, ListOffsetsResponseTopic,
};
pub use produce::{
    ProduceRequest, ProduceRequestPartition, ProduceRequestTopic, ProduceResponse,
    ProduceResponsePartition, ProduceResponseTopic,
};
