//! Response construction
//!
//! Builders for the generic [`BasicResponse`] reply.

use crate::protocol::messages::{BasicResponse, ErrorCode, Message};

/// Success with no payload.
pub fn ok() -> Message {
    Message::BasicResponse(BasicResponse {
        code: ErrorCode::Ok,
        id: None,
        message: None,
    })
}

/// Success carrying the identifier of the record that was created.
pub fn ok_with_id(id: u64) -> Message {
    Message::BasicResponse(BasicResponse {
        code: ErrorCode::Ok,
        id: Some(id),
        message: None,
    })
}

/// Failure with a human-readable explanation.
pub fn failure(code: ErrorCode, message: impl Into<String>) -> Message {
    Message::BasicResponse(BasicResponse {
        code,
        id: None,
        message: Some(message.into()),
    })
}
