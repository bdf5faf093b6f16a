//! `ApiVersions` request/response: the best-effort capability probe a `Connection`
//! sends once per new IO handle (§9 Open Question ii's resolution — a single probe at
//! construction, non-fatal on failure, rather than full per-request negotiation).

use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::read_versioned_array,
    traits::{ReadType, WriteType},
};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};

/// Carries no body fields at version 0: the request is simply the common header.
#[derive(Debug, PartialEq, Eq)]
pub struct ApiVersionsRequest;

impl<W> WriteVersionedType<W> for ApiVersionsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        _writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);
        Ok(())
    }
}

impl RequestBody for ApiVersionsRequest {
    type ResponseBody = ApiVersionsResponse;

    const API_KEY: ApiKey = ApiKey::ApiVersions;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 0);

    fn header_version(_version: ApiVersion) -> ApiVersion {
        // Client-id is part of this spec's mandatory base framing (§4.2), not an
        // optionally-negotiated header field, so every body always pairs with header
        // version 1 (the first version carrying client-id) regardless of its own version.
        ApiVersion(1)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiVersionsResponseApiKey {
    pub api_key: ApiKey,
    pub min_version: ApiVersion,
    pub max_version: ApiVersion,
}

impl<R> ReadVersionedType<R> for ApiVersionsResponseApiKey
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            api_key: i16::read(reader)?.into(),
            min_version: ApiVersion(i16::read(reader)?),
            max_version: ApiVersion(i16::read(reader)?),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiVersionsResponse {
    pub error_code: Option<ApiError>,
    pub api_keys: Vec<ApiVersionsResponseApiKey>,
}

impl<R> ReadVersionedType<R> for ApiVersionsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error_code: ApiError::new(i16::read(reader)?),
            api_keys: read_versioned_array(reader, version)?,
        })
    }
}

impl ApiVersionsResponse {
    /// Looks up the broker-advertised version range for one of this crate's api keys.
    pub fn range_for(&self, api_key: ApiKey) -> Option<ApiVersionRange> {
        self.api_keys
            .iter()
            .find(|k| k.api_key == api_key)
            .map(|k| ApiVersionRange::new(k.min_version.0, k.max_version.0))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn response_roundtrip() {
        let mut buf = Vec::new();
        0i16.write(&mut buf).unwrap();
        1i32.write(&mut buf).unwrap();
        i16::from(ApiKey::Fetch).write(&mut buf).unwrap();
        0i16.write(&mut buf).unwrap();
        0i16.write(&mut buf).unwrap();

        let got = ApiVersionsResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(0)).unwrap();
        assert_eq!(got.error_code, None);
        assert_eq!(
            got.range_for(ApiKey::Fetch),
            Some(ApiVersionRange::new(0, 0))
        );
        assert_eq!(got.range_for(ApiKey::Produce), None);
    }
}
