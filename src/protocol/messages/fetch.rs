use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    primitives::write_array,
    record::MessageSet,
    traits::{ReadType, WriteType},
};

use super::{
    read_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError,
    WriteVersionedType,
};

#[derive(Debug)]
pub struct FetchRequestPartition {
    /// The partition index.
    pub partition: i32,

    /// The offset to fetch from.
    pub fetch_offset: i64,

    /// The maximum bytes to fetch from this partition.
    pub partition_max_bytes: i32,
}

impl<W> WriteType<W> for FetchRequestPartition
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.partition.write(writer)?;
        self.fetch_offset.write(writer)?;
        self.partition_max_bytes.write(writer)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FetchRequestTopic {
    /// The name of the topic to fetch.
    pub topic: String,

    /// The partitions to fetch.
    pub partitions: Vec<FetchRequestPartition>,
}

impl<W> WriteType<W> for FetchRequestTopic
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.topic.write(writer)?;
        write_array(writer, &self.partitions)?;
        Ok(())
    }
}

/// `MinBytes` mode: `IMMEDIATE` returns as soon as any data is available, `HAS_DATA`
/// waits until at least one byte is ready, `N` waits for at least `N` bytes or the
/// request's `max_wait_ms` timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinBytes {
    Immediate,
    HasData,
    N(i32),
}

impl MinBytes {
    fn as_wire(self) -> i32 {
        match self {
            Self::Immediate => 0,
            Self::HasData => 1,
            Self::N(n) => n,
        }
    }
}

#[derive(Debug)]
pub struct FetchRequest {
    /// Always -1: this crate never speaks the broker-to-broker replication variant of
    /// this request.
    pub replica_id: i32,

    /// The maximum time in milliseconds to wait for the response.
    pub max_wait_ms: i32,

    /// The minimum amount of data to accumulate before the broker replies.
    pub min_bytes: MinBytes,

    /// The topics to fetch.
    pub topics: Vec<FetchRequestTopic>,
}

impl<W> WriteVersionedType<W> for FetchRequest
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
        self.max_wait_ms.write(writer)?;
        self.min_bytes.as_wire().write(writer)?;
        write_array(writer, &self.topics)?;

        Ok(())
    }
}

impl RequestBody for FetchRequest {
    type ResponseBody = FetchResponse;

    const API_KEY: ApiKey = ApiKey::Fetch;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 0);

    fn header_version(_version: ApiVersion) -> ApiVersion {
        // Client-id is part of this spec's mandatory base framing (§4.2), not an
        // optionally-negotiated header field, so every body always pairs with header
        // version 1 (the first version carrying client-id) regardless of its own version.
        ApiVersion(1)
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FetchResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The error code, or `None` if there was no fetch error.
    pub error_code: Option<ApiError>,

    /// The current high water mark.
    pub high_watermark: i64,

    /// The fetched records, as a (possibly truncated) message set.
    pub records: MessageSet,
}

impl<R> ReadVersionedType<R> for FetchResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            partition_index: i32::read(reader)?,
            error_code: ApiError::new(i16::read(reader)?),
            high_watermark: i64::read(reader)?,
            records: read_message_set_field(reader)?,
        })
    }
}

/// Reads the message-set field: an `INT32` byte length followed by that many bytes of
/// packed `{offset, message-size, message}` entries (§4.2). The length prefix tells us
/// exactly how much of the stream belongs to this field, so we decode it through a
/// bounded sub-reader rather than letting `MessageSet::read` run off into the next field.
fn read_message_set_field<R: Read>(
    reader: &mut R,
) -> Result<MessageSet, crate::protocol::traits::ReadError> {
    use crate::protocol::traits::ReadError;

    let len = i32::read(reader)?;
    if len < 0 {
        return Err(ReadError::Malformed(
            format!("negative message set length: {len}").into(),
        ));
    }
    let mut buf = vec![0u8; usize::try_from(len)?];
    std::io::Read::read_exact(reader, &mut buf)?;
    MessageSet::read(&mut std::io::Cursor::new(buf))
}

fn write_message_set_field<W: Write>(
    writer: &mut W,
    set: &MessageSet,
) -> Result<(), crate::protocol::traits::WriteError> {
    use crate::protocol::traits::WriteError;

    let mut buf = Vec::new();
    set.write(&mut buf)?;
    let len = i32::try_from(buf.len()).map_err(WriteError::Overflow)?;
    len.write(writer)?;
    writer.write_all(&buf)?;
    Ok(())
}

impl<W> WriteType<W> for FetchResponsePartition
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), crate::protocol::traits::WriteError> {
        self.partition_index.write(writer)?;
        self.error_code.map(ApiError::code).unwrap_or(0).write(writer)?;
        self.high_watermark.write(writer)?;
        write_message_set_field(writer, &self.records)?;
        Ok(())
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FetchResponseTopic {
    /// The topic name.
    pub topic: String,

    /// The topic's partitions.
    pub partitions: Vec<FetchResponsePartition>,
}

impl<R> ReadVersionedType<R> for FetchResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            topic: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FetchResponse {
    /// The response topics.
    pub responses: Vec<FetchResponseTopic>,
}

impl<R> ReadVersionedType<R> for FetchResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            responses: read_versioned_array(reader, version)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::record::Message;
    use std::io::Cursor;

    #[test]
    fn request_roundtrip_wire() {
        let req = FetchRequest {
            replica_id: -1,
            max_wait_ms: 100,
            min_bytes: MinBytes::N(0x56),
            topics: vec![FetchRequestTopic {
                topic: "topic".to_string(),
                partitions: vec![FetchRequestPartition {
                    partition: 0x12,
                    fetch_offset: 0x34,
                    partition_max_bytes: 1024,
                }],
            }],
        };

        let mut buf = Vec::new();
        req.write_versioned(&mut buf, ApiVersion(0)).unwrap();

        assert_eq!(&buf[0..4], &(-1i32).to_be_bytes());
        assert_eq!(&buf[4..8], &100i32.to_be_bytes());
        assert_eq!(&buf[8..12], &0x56i32.to_be_bytes());
    }

    #[test]
    fn response_with_one_record_roundtrips() {
        let set = MessageSet::from_messages(vec![(0, Message::new(b"hi".to_vec()))]);
        let mut set_buf = Vec::new();
        set.write(&mut set_buf).unwrap();

        let mut buf = Vec::new();
        // responses array count
        1i32.write(&mut buf).unwrap();
        "topic".to_string().write(&mut buf).unwrap();
        1i32.write(&mut buf).unwrap();
        5i32.write(&mut buf).unwrap(); // partition_index
        0i16.write(&mut buf).unwrap(); // error code
        42i64.write(&mut buf).unwrap(); // high watermark
        (set_buf.len() as i32).write(&mut buf).unwrap();
        buf.extend_from_slice(&set_buf);

        let got = FetchResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(0)).unwrap();
        assert_eq!(got.responses.len(), 1);
        let partition = &got.responses[0].partitions[0];
        assert_eq!(partition.partition_index, 5);
        assert_eq!(partition.error_code, None);
        assert_eq!(partition.high_watermark, 42);
        assert_eq!(partition.records.0.len(), 1);
        assert!(partition.records.0[0].valid);
    }
}
