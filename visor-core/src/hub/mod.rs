//! Hub protocol — method ids, typed payloads, and the wire codec.
//!
//! The host keeps one persistent, authenticated connection to the
//! coordinating server ("the hub") and exchanges method-call style
//! messages over it. See [`message`] for the method table and payload
//! types, [`codec`] for the framing.

pub mod codec;
pub mod message;

pub use codec::{HubCodec, MAX_FRAME_SIZE};
pub use message::{HubFrame, HubMethod};
