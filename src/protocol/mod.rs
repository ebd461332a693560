//! Wire protocol
//!
//! Message definitions, the frame codec, and response builders.

pub mod codec;
pub mod messages;
pub mod responses;

pub use codec::{FrameBuffer, FrameHeader, HEADER_LEN, decode, encode};
pub use messages::{ClientType, ErrorCode, Message, MessageKind};
