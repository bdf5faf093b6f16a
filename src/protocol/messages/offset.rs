//! `ListOffsets` request and response: looks up the offset boundary for a partition at
//! a given point in time (§4.1: `Time` selector `EARLIEST=-2, LATEST=-1, or
//! ms-since-epoch`, plus `MaxNumberOfOffsets`).

use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::read_versioned_array,
    primitives::{read_array, write_array},
    traits::{ReadType, WriteType},
};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};

/// A time selector for an offset lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Time {
    Earliest,
    Latest,
    At(i64),
}

impl Time {
    fn as_wire(self) -> i64 {
        match self {
            Self::Earliest => -2,
            Self::Latest => -1,
            Self::At(ms) => ms,
        }
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequestPartition {
    pub partition_index: i32,
    pub timestamp: Time,

    /// Defaults to 1 when omitted.
    pub max_num_offsets: Option<i32>,
}

impl<W> WriteType<W> for ListOffsetsRequestPartition
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.partition_index.write(writer)?;
        self.timestamp.as_wire().write(writer)?;
        self.max_num_offsets.unwrap_or(1).write(writer)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequestTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsRequestPartition>,
}

impl<W> WriteType<W> for ListOffsetsRequestTopic
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.name.write(writer)?;
        write_array(writer, &self.partitions)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequest {
    /// Always -1: this crate never speaks the broker-to-broker replication variant.
    pub replica_id: i32,
    pub topics: Vec<ListOffsetsRequestTopic>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.replica_id.write(writer)?;
        write_array(writer, &self.topics)?;

        Ok(())
    }
}

impl RequestBody for ListOffsetsRequest {
    type ResponseBody = ListOffsetsResponse;

    const API_KEY: ApiKey = ApiKey::ListOffsets;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 0);

    fn header_version(_version: ApiVersion) -> ApiVersion {
        // Client-id is part of this spec's mandatory base framing (§4.2), not an
        // optionally-negotiated header field, so every body always pairs with header
        // version 1 (the first version carrying client-id) regardless of its own version.
        ApiVersion(1)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponsePartition {
    pub partition_index: i32,
    pub error_code: Option<ApiError>,
    pub offsets: Vec<i64>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            partition_index: i32::read(reader)?,
            error_code: ApiError::new(i16::read(reader)?),
            offsets: read_array(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponseTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsResponsePartition>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    pub topics: Vec<ListOffsetsResponseTopic>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            topics: read_versioned_array(reader, version)?,
        })
    }
}
