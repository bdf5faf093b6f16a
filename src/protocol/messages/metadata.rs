use std::io::{Read, Write};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::messages::read_versioned_array;
use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    error::Error,
    primitives::{read_array, write_array},
    traits::{ReadType, WriteType},
};

/// Requests metadata for the named topics, or for every topic the cluster knows about
/// when `topics` is empty (§4.1: `get_metadata(topic?)`, a missing topic means "all").
#[derive(Debug)]
pub struct MetadataRequest {
    pub topics: Vec<MetadataRequestTopic>,
}

impl RequestBody for MetadataRequest {
    type ResponseBody = MetadataResponse;

    const API_KEY: ApiKey = ApiKey::Metadata;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 0);

    fn header_version(_version: ApiVersion) -> ApiVersion {
        // Client-id is part of this spec's mandatory base framing (§4.2), not an
        // optionally-negotiated header field, so every body always pairs with header
        // version 1 (the first version carrying client-id) regardless of its own version.
        ApiVersion(1)
    }
}

impl<W> WriteVersionedType<W> for MetadataRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        write_array(writer, &self.topics)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MetadataRequestTopic {
    pub name: String,
}

impl<W> WriteType<W> for MetadataRequestTopic
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.name.write(writer)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MetadataResponse {
    /// Each broker known to the responding node.
    pub brokers: Vec<MetadataResponseBroker>,

    /// Each topic's metadata.
    pub topics: Vec<MetadataResponseTopic>,
}

impl<R> ReadVersionedType<R> for MetadataResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            brokers: read_versioned_array(reader, version)?,
            topics: read_versioned_array(reader, version)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MetadataResponseBroker {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl<R> ReadVersionedType<R> for MetadataResponseBroker
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MetadataResponseTopic {
    /// The topic-level error, if any (e.g. `UnknownTopicOrPartition`).
    pub error: Option<Error>,
    pub name: String,
    pub partitions: Vec<MetadataResponsePartition>,
}

impl<R> ReadVersionedType<R> for MetadataResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error: Error::new(i16::read(reader)?),
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MetadataResponsePartition {
    /// The partition-level error, if any (e.g. `LeaderNotAvailable`).
    pub error: Option<Error>,
    pub partition_index: i32,
    pub leader_id: i32,
    pub replica_nodes: Vec<i32>,
    pub isr_nodes: Vec<i32>,
}

impl<R> ReadVersionedType<R> for MetadataResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error: Error::new(i16::read(reader)?),
            partition_index: i32::read(reader)?,
            leader_id: i32::read(reader)?,
            replica_nodes: read_array(reader)?,
            isr_nodes: read_array(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request_no_topics() {
        let req = MetadataRequest { topics: vec![] };
        let mut buf = Vec::new();
        req.write_versioned(&mut buf, ApiVersion(0)).unwrap();
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn request_three_topics() {
        let req = MetadataRequest {
            topics: vec![
                MetadataRequestTopic { name: "foo".to_string() },
                MetadataRequestTopic { name: "bar".to_string() },
                MetadataRequestTopic { name: "baz".to_string() },
            ],
        };
        let mut buf = Vec::new();
        req.write_versioned(&mut buf, ApiVersion(0)).unwrap();
        assert_eq!(
            buf,
            [
                0x00, 0x00, 0x00, 0x03, 0x00, 0x03, b'f', b'o', b'o', 0x00, 0x03, b'b', b'a',
                b'r', 0x00, 0x03, b'b', b'a', b'z',
            ]
        );
    }

    #[test]
    fn response_roundtrip() {
        let mut buf = Vec::new();
        // brokers: one entry
        1i32.write(&mut buf).unwrap();
        1i32.write(&mut buf).unwrap(); // node_id
        "host".to_string().write(&mut buf).unwrap();
        9092i32.write(&mut buf).unwrap();
        // topics: one entry
        1i32.write(&mut buf).unwrap();
        0i16.write(&mut buf).unwrap(); // no error
        "topic".to_string().write(&mut buf).unwrap();
        1i32.write(&mut buf).unwrap(); // one partition
        0i16.write(&mut buf).unwrap();
        0i32.write(&mut buf).unwrap(); // partition index
        1i32.write(&mut buf).unwrap(); // leader id
        write_array(&mut buf, &[1i32]).unwrap();
        write_array(&mut buf, &[1i32]).unwrap();

        let got = MetadataResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(0)).unwrap();
        assert_eq!(got.brokers.len(), 1);
        assert_eq!(got.brokers[0].host, "host");
        assert_eq!(got.topics.len(), 1);
        assert_eq!(got.topics[0].partitions[0].leader_id, 1);
        assert_eq!(got.topics[0].error, None);
    }
}
