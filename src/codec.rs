//! The byte-level protocol spoken over the mower's GATT characteristics.
//!
//! Framing is left to the caller: [`BleMower`](crate::BleMower) only moves bytes
//! and asks a [`MowerCodec`] what they mean.

use serde_json::Value;

use crate::error::TransportError;
use crate::session::{Command, ResponseResult};

/// The verdict on a buffer of accumulated notification bytes.
#[derive(PartialEq, Eq, Debug)]
pub enum Frame {
    /// A whole message; carries its payload.
    Complete(Vec<u8>),
    Incomplete,
    Invalid(&'static str),
}

pub trait MowerCodec: Send + Sync {
    /// The request that opens a logical channel with the mower.
    fn handshake(&self, channel_id: u32) -> Result<Vec<u8>, TransportError>;

    fn parse_handshake(&self, payload: &[u8]) -> Result<ResponseResult, TransportError>;

    fn encode(&self, channel_id: u32, command: &Command) -> Result<Vec<u8>, TransportError>;

    /// Attempt to find a whole message in `buffer`.
    ///
    /// Notifications may be duplicated or truncated, so the buffer can hold
    /// more or fewer bytes than the header announces.
    fn try_parse(&self, buffer: &[u8]) -> Frame;

    /// Decode the payload of a response to `command`. A response carrying no
    /// value decodes to [`Value::Null`].
    fn decode(&self, command: &Command, payload: &[u8]) -> Result<Value, TransportError>;
}
