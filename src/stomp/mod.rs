//! Minimal STOMP client: the frames a topic publisher/subscriber needs.

mod client;
mod codec;

pub use client::{StompClient, StompConfig};
pub use codec::{StompCodec, DEFAULT_MAX_FRAME};
