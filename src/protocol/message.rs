//! Protocol message definitions
//!
//! The logical view of a wire word. The bit-level translation lives in the
//! codec; these types give the rest of the crate something to match on.

use std::fmt;

use super::codec;

/// Discriminator decoded from the top two bits of a wire word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Client-originated request carrying a uri selector
    Request = 0,
    /// Server acknowledgment of a received message
    Confirm = 1,
    /// Server reply carrying a payload
    Response = 2,
    /// Reserved for input not reachable by the canonical encoding,
    /// e.g. transport-level garbage flagged before decoding
    Unknown = 3,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Confirm => "confirm",
            MessageKind::Response => "response",
            MessageKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A fully decoded protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Invoke the capability selected by `uri` (62 bits)
    Request { uri: u64 },
    /// Acknowledge receipt of inbound message number `request_id`
    Confirm { request_id: u64 },
    /// Answer inbound message number `request_id` with `data` (55 bits)
    Response { request_id: u64, data: u64 },
}

impl Message {
    /// Decode a wire word into its logical form. Total: every word decodes
    /// to exactly one variant.
    pub fn decode(word: u64) -> Self {
        match codec::decode_kind(word) {
            MessageKind::Request => Message::Request {
                uri: codec::decode_uri(word),
            },
            MessageKind::Confirm => {
                let (request_id, _) = codec::decode_reply(word);
                Message::Confirm { request_id }
            }
            _ => {
                let (request_id, data) = codec::decode_reply(word);
                Message::Response { request_id, data }
            }
        }
    }

    /// Encode back into the wire word form
    pub fn encode(&self) -> u64 {
        match *self {
            Message::Request { uri } => codec::encode_request(uri),
            Message::Confirm { request_id } => codec::encode_confirm(request_id),
            Message::Response { request_id, data } => codec::encode_response(request_id, data),
        }
    }

    /// The kind discriminator for this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request { .. } => MessageKind::Request,
            Message::Confirm { .. } => MessageKind::Confirm,
            Message::Response { .. } => MessageKind::Response,
        }
    }
}
