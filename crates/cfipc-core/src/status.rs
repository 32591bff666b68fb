//! Integer statuses returned by a remote call.
//!
//! The status is the only structured outcome that crosses the process
//! boundary. Zero is a completion acknowledgment, not a handler result:
//! under the default reply policy an unknown function name also yields
//! `STATUS_OK`.

pub type Status = i32;

/// The server processed the call.
pub const STATUS_OK: Status = 0;

/// Bus unreachable, error reply, malformed reply or no reply in time.
pub const STATUS_TRANSPORT_FAILURE: Status = -1;

/// The payload channel could not be created or attached.
pub const STATUS_RESOURCE_FAILURE: Status = -2;

/// No registered function matched. Only produced under the propagating
/// reply policy.
pub const STATUS_NO_SUCH_FUNCTION: Status = -3;

/// Short human-readable name for a status, for logs.
pub fn describe(status: Status) -> &'static str {
    match status {
        STATUS_OK => "ok",
        STATUS_TRANSPORT_FAILURE => "transport failure",
        STATUS_RESOURCE_FAILURE => "resource failure",
        STATUS_NO_SUCH_FUNCTION => "no such function",
        _ => "handler status",
    }
}
