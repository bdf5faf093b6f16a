//! Int64Ops (§4.1): 8-octet unsigned integer pack/unpack and modular addition, portable
//! to hosts lacking a native 64-bit integer.
//!
//! Rust has no such host: `u64`/`i64` are native on every tier-1 and tier-2 target, so
//! this is the "thin alias" branch of §9's big-integer-fallback design note, not the
//! fallback itself. `packq` still takes a wider carrier (`i128`) than the 64-bit value it
//! packs, because the spec's sentinel convention (`-1` packed as all-ones) and its upper
//! bound (`2^64 - 1`) don't both fit in either `i64` or `u64` alone.

use crate::error::Error;

/// Packs `n` into its 8-byte big-endian two's-complement wire representation.
///
/// Accepts `-1 ..= u64::MAX` (as `i128`): the sentinel `-1` ("none", all-ones) and every
/// unsigned 64-bit offset. Anything outside that range — including fractional or
/// otherwise non-integral callers might otherwise be tempted to truncate — is rejected
/// rather than silently wrapped.
pub fn packq(n: i128) -> Result<[u8; 8], Error> {
    if n < -1 {
        return Err(Error::MismatchArgument {
            message: format!("packq: {n} is negative and is not the -1 sentinel"),
        });
    }
    if n > u64::MAX as i128 {
        return Err(Error::MismatchArgument {
            message: format!("packq: {n} does not fit in 64 bits"),
        });
    }
    Ok((n as i64).to_be_bytes())
}

/// Unpacks an 8-octet big-endian buffer into an unsigned 64-bit integer.
///
/// Rejects any input whose length isn't exactly 8.
pub fn unpackq(bytes: &[u8]) -> Result<u64, Error> {
    let octets: [u8; 8] = bytes.try_into().map_err(|_| Error::MismatchArgument {
        message: format!("unpackq: expected exactly 8 octets, got {}", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(octets))
}

/// 64-bit modular addition: `(a + b) mod 2^64`, expressed in the same two's-complement
/// carrier `packq`/`unpackq` use, so `-3` and `2^64 - 3` are the same wire value.
pub fn intsum(a: i64, b: i64) -> i64 {
    a.wrapping_add(b)
}
