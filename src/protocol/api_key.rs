//! ApiKey to tag request types.
//!
//! Only the four API keys this crate's core speaks are named explicitly; every other
//! code is preserved as `Unknown` rather than dropped, so a response carrying a code
//! we don't implement still round-trips instead of panicking.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_api_keys>

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ApiKey {
    Produce,
    Fetch,
    ListOffsets,
    Metadata,
    ApiVersions,
    Unknown(i16),
}

impl From<i16> for ApiKey {
    fn from(key: i16) -> Self {
        match key {
            0 => Self::Produce,
            1 => Self::Fetch,
            2 => Self::ListOffsets,
            3 => Self::Metadata,
            18 => Self::ApiVersions,
            _ => Self::Unknown(key),
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Produce => 0,
            ApiKey::Fetch => 1,
            ApiKey::ListOffsets => 2,
            ApiKey::Metadata => 3,
            ApiKey::ApiVersions => 18,
            ApiKey::Unknown(code) => code,
        }
    }
}
