//! Response head handling.

use http::{Response, StatusCode};

/// The header portion of a response, before the entity is attached.
pub type ResponseHead = Response<()>;

/// Whether a status code forbids a response entity on the wire.
///
/// 1xx, 204 and 304 responses never carry a body regardless of what the
/// application attached; the outbound way suppresses the entity and, for
/// these statuses, omits `Content-Length` rather than forcing `0`.
pub fn status_forbids_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
