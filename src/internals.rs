//! Small shared constants and mode enums named directly in §4.1/§4.2 that don't belong
//! to any one message module (they're referenced by more than one).

use std::time::Duration;

/// Platform flag (§6): whether this target has native 64-bit integer arithmetic for the
/// offset/correlation-id carrier. Always `true` — every tier-1/tier-2 Rust target does —
/// so [`crate::int64`] is the "thin alias" branch of §9's big-integer-fallback design
/// note, never the portable-fallback branch.
pub const BITS64: bool = true;

/// Default server-side wait for a Fetch request when the caller doesn't set one.
pub const DEFAULT_MAX_WAIT_MS: i32 = 500;

/// Default `MinBytes` when the caller doesn't set one: return as soon as any data is
/// ready.
pub const DEFAULT_MIN_BYTES: i32 = 0;

/// Default per-partition fetch size cap.
pub const DEFAULT_PARTITION_MAX_BYTES: i32 = 1024 * 1024;

/// Default number of offsets requested from a `ListOffsets` call when the caller only
/// wants the single boundary offset.
pub const DEFAULT_MAX_NUMBER_OF_OFFSETS: i32 = 1;

/// Default server-side timeout for a Produce request's acknowledgement wait.
pub const DEFAULT_PRODUCE_TIMEOUT_MS: i32 = 1500;

/// Default connect/send/receive timeout when the caller doesn't set one explicitly (§6).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default `SEND_MAX_ATTEMPTS` (§6).
pub const DEFAULT_SEND_MAX_ATTEMPTS: u32 = 4;

/// Default `RETRY_BACKOFF` between attempts (§4.1).
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);
