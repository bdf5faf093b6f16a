//! `Produce` request and response. There is no teacher file for this request (the
//! retrieved corpus is a consumer-side client); its shape is modeled on `fetch.rs`'s
//! topic/partition nesting with the fields §4.1/§4.2 name for producing: a
//! `RequiredAcks` mode, a server-side timeout, and one message set per partition.

use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::read_versioned_array,
    primitives::write_array,
    record::MessageSet,
    traits::{ReadType, WriteType},
};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};

/// Controls how many replicas must acknowledge a write before the broker responds
/// (§4.1). `BlockUntilCommitted` is the strongest guarantee and the slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAcks {
    NoResponse,
    WaitLocalLog,
    BlockUntilCommitted,
}

impl RequiredAcks {
    fn as_wire(self) -> i16 {
        match self {
            Self::NoResponse => 0,
            Self::WaitLocalLog => 1,
            Self::BlockUntilCommitted => -1,
        }
    }
}

#[derive(Debug)]
pub struct ProduceRequestPartition {
    pub partition_index: i32,
    pub records: MessageSet,
}

impl<W> WriteType<W> for ProduceRequestPartition
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        use crate::protocol::traits::WriteError;

        self.partition_index.write(writer)?;

        let mut body = Vec::new();
        self.records.write(&mut body)?;
        let len = i32::try_from(body.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(&body)?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequestTopic {
    pub name: String,
    pub partitions: Vec<ProduceRequestPartition>,
}

impl<W> WriteType<W> for ProduceRequestTopic
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
pub struct ProduceRequest {
    pub required_acks: RequiredAcks,

    /// Milliseconds the broker is allowed to wait for the requested number of replica
    /// acknowledgements before responding.
    pub timeout_ms: i32,

    pub topics: Vec<ProduceRequestTopic>,
}

impl<W> WriteVersionedType<W> for ProduceRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.required_acks.as_wire().write(writer)?;
        self.timeout_ms.write(writer)?;
        write_array(writer, &self.topics)?;

        Ok(())
    }
}

impl RequestBody for ProduceRequest {
    type ResponseBody = ProduceResponse;

    const API_KEY: ApiKey = ApiKey::Produce;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 0);

    fn header_version(_version: ApiVersion) -> ApiVersion {
        // Client-id is part of this spec's mandatory base framing (§4.2), not an
        // optionally-negotiated header field, so every body always pairs with header
        // version 1 (the first version carrying client-id) regardless of its own version.
        ApiVersion(1)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponsePartition {
    pub partition_index: i32,
    pub error_code: Option<ApiError>,

    /// The offset assigned to the first message in the request's message set.
    pub base_offset: i64,
}

impl<R> ReadVersionedType<R> for ProduceResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            partition_index: i32::read(reader)?,
            error_code: ApiError::new(i16::read(reader)?),
            base_offset: i64::read(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponseTopic {
    pub name: String,
    pub partitions: Vec<ProduceResponsePartition>,
}

impl<R> ReadVersionedType<R> for ProduceResponseTopic
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
pub struct ProduceResponse {
    pub topics: Vec<ProduceResponseTopic>,
}

impl<R> ReadVersionedType<R> for ProduceResponse
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

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::protocol::record::Message;

    #[test]
    fn request_wire_layout() {
        let req = ProduceRequest {
            required_acks: RequiredAcks::WaitLocalLog,
            timeout_ms: 1500,
            topics: vec![ProduceRequestTopic {
                name: "topic".to_string(),
                partitions: vec![ProduceRequestPartition {
                    partition_index: 0,
                    records: MessageSet::from_messages(vec![(0, Message::new(b"hi".to_vec()))]),
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write_versioned(&mut buf, ApiVersion(0)).unwrap();

        assert_eq!(&buf[0..2], &1i16.to_be_bytes());
        assert_eq!(&buf[2..6], &1500i32.to_be_bytes());
    }

    #[test]
    fn response_roundtrip() {
        let mut buf = Vec::new();
        1i32.write(&mut buf).unwrap();
        "topic".to_string().write(&mut buf).unwrap();
        1i32.write(&mut buf).unwrap();
        0i32.write(&mut buf).unwrap();
        0i16.write(&mut buf).unwrap();
        42i64.write(&mut buf).unwrap();

        let got = ProduceResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(0)).unwrap();
        assert_eq!(got.topics[0].partitions[0].base_offset, 42);
        assert_eq!(got.topics[0].partitions[0].error_code, None);
    }
}
