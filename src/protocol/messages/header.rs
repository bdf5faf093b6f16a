use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    traits::{ReadType, WriteType},
};

use super::{ReadVersionedError, ReadVersionedType, WriteVersionedError, WriteVersionedType};

/// Request header: `api-key, api-version, correlation-id` plus the optional `client-id`
/// added at version 1. There is no version 2 in this crate: that version introduces
/// tagged fields for the flexible protocol, which this crate does not speak (§4.2).
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct RequestHeader {
    pub request_api_key: ApiKey,
    pub request_api_version: ApiVersion,
    pub correlation_id: i32,

    /// Added in version 1.
    pub client_id: Option<String>,
}

impl<R> ReadVersionedType<R> for RequestHeader
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        Ok(Self {
            request_api_key: ApiKey::from(i16::read(reader)?),
            request_api_version: ApiVersion(i16::read(reader)?),
            correlation_id: i32::read(reader)?,
            client_id: if v >= 1 {
                Option::<String>::read(reader)?
            } else {
                None
            },
        })
    }
}

impl<W> WriteVersionedType<W> for RequestHeader
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        i16::from(self.request_api_key).write(writer)?;
        self.request_api_version.0.write(writer)?;
        self.correlation_id.write(writer)?;

        if v >= 1 {
            match self.client_id.as_ref() {
                Some(client_id) => {
                    client_id.write(writer)?;
                }
                None => {
                    Option::<String>::None.write(writer)?;
                }
            }
        }

        Ok(())
    }
}

/// Response header: just the `correlation-id` echoed back by the broker. There is no
/// tagged-fields version of this header in this crate for the same reason as above.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

impl<R> ReadVersionedType<R> for ResponseHeader
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            correlation_id: i32::read(reader)?,
        })
    }
}

// not strictly required in production, helpful for testing
impl<W> WriteVersionedType<W> for ResponseHeader
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.correlation_id.write(writer)?;
        Ok(())
    }
}
