//! Bit-level codec for the 64-bit wire word
//!
//! All functions here are pure: they translate between a host-order `u64`
//! and the protocol's overlapping bit fields. Byte-order conversion happens
//! only at the transport boundary, via [`write_frame`] and [`read_frame`].

use bytes::{Buf, BufMut, BytesMut};

use super::{MessageKind, MESSAGE_SIZE_BYTES};

/// Bit 63: set on every Confirm/Response, clear on Requests
pub const REPLY_FLAG_MASK: u64 = 0x8000_0000_0000_0000;

/// Bit 62: set on Responses, clear on Confirms
pub const PAYLOAD_FLAG_MASK: u64 = 0x4000_0000_0000_0000;

/// Bits 61..55: request id slot shared by Confirm and Response
pub const REQUEST_ID_MASK: u64 = 0x3F80_0000_0000_0000;

/// Bits 61..0: uri selector of a Request
pub const URI_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

/// Bits 54..0: payload of a Response
pub const DATA_MASK: u64 = 0x007F_FFFF_FFFF_FFFF;

const REQUEST_ID_SHIFT: u32 = 55;

/// Classify a wire word by its discriminator bits.
///
/// Total over all inputs: every 64-bit value decodes to exactly one of
/// Request, Confirm, or Response. `MessageKind::Unknown` is reserved for
/// transport-level garbage classified before decoding is attempted; this
/// function never returns it.
pub fn decode_kind(word: u64) -> MessageKind {
    if word & REPLY_FLAG_MASK == 0 {
        MessageKind::Request
    } else if word & PAYLOAD_FLAG_MASK == 0 {
        MessageKind::Confirm
    } else {
        MessageKind::Response
    }
}

/// Extract the uri from a Request word.
///
/// Only meaningful when `decode_kind(word) == MessageKind::Request`; the
/// caller checks the kind first.
pub fn decode_uri(word: u64) -> u64 {
    word & URI_MASK
}

/// Extract `(request_id, data)` from a Confirm or Response word.
///
/// For a Confirm the data portion is zero by construction.
pub fn decode_reply(word: u64) -> (u64, u64) {
    let request_id = (word & REQUEST_ID_MASK) >> REQUEST_ID_SHIFT;
    let data = word & DATA_MASK;
    (request_id, data)
}

/// Encode a Request carrying `uri` (masked to 62 bits).
pub fn encode_request(uri: u64) -> u64 {
    uri & URI_MASK
}

/// Encode a Confirm for `request_id` (masked to 7 bits).
pub fn encode_confirm(request_id: u64) -> u64 {
    REPLY_FLAG_MASK | embed_request_id(request_id)
}

/// Encode a Response for `request_id` with `data`.
///
/// `data` is masked to 55 bits; values exceeding that range silently lose
/// their high bits. Lossy by design, not an error.
pub fn encode_response(request_id: u64, data: u64) -> u64 {
    REPLY_FLAG_MASK | PAYLOAD_FLAG_MASK | embed_request_id(request_id) | (data & DATA_MASK)
}

fn embed_request_id(request_id: u64) -> u64 {
    (request_id << REQUEST_ID_SHIFT) & REQUEST_ID_MASK
}

/// Append a wire word to `buf` in network byte order.
pub fn write_frame(word: u64, buf: &mut BytesMut) {
    buf.put_u64(word);
}

/// Consume one 8-byte frame from `buf`, returning the host-order word.
///
/// Returns `None` if fewer than 8 bytes are buffered.
pub fn read_frame(buf: &mut BytesMut) -> Option<u64> {
    if buf.len() < MESSAGE_SIZE_BYTES {
        return None;
    }
    Some(buf.get_u64())
}

/// Decode a received 8-byte frame into the host-order word.
pub fn frame_to_word(frame: [u8; MESSAGE_SIZE_BYTES]) -> u64 {
    u64::from_be_bytes(frame)
}

/// Encode a host-order word as the 8 bytes that go on the wire.
pub fn word_to_frame(word: u64) -> [u8; MESSAGE_SIZE_BYTES] {
    word.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        for uri in [0u64, 1, 0x4000, 0x1234_5678_9ABC, URI_MASK] {
            let word = encode_request(uri);
            assert_eq!(decode_kind(word), MessageKind::Request);
            assert_eq!(decode_uri(word), uri);
        }
    }

    #[test]
    fn confirm_roundtrip() {
        for request_id in 0u64..=127 {
            let word = encode_confirm(request_id);
            assert_eq!(decode_kind(word), MessageKind::Confirm);
            let (id, data) = decode_reply(word);
            assert_eq!(id, request_id);
            assert_eq!(data, 0);
        }
    }

    #[test]
    fn response_roundtrip() {
        for request_id in [0u64, 1, 63, 127] {
            for data in [0u64, 1, 0xDEAD_BEEF, DATA_MASK] {
                let word = encode_response(request_id, data);
                assert_eq!(decode_kind(word), MessageKind::Response);
                assert_eq!(decode_reply(word), (request_id, data));
            }
        }
    }

    #[test]
    fn request_id_wraps_at_128() {
        use crate::protocol::REQUEST_ID_BITS;

        let word = encode_confirm(1 << REQUEST_ID_BITS);
        let (id, _) = decode_reply(word);
        assert_eq!(id, 0);

        let word = encode_confirm(130);
        let (id, _) = decode_reply(word);
        assert_eq!(id, 2);
    }

    #[test]
    fn response_data_masked_to_55_bits() {
        let word = encode_response(1, u64::MAX);
        let (id, data) = decode_reply(word);
        assert_eq!(id, 1);
        assert_eq!(data, DATA_MASK);
        // The flag and id bits are unaffected by the oversized payload
        assert_eq!(decode_kind(word), MessageKind::Response);
    }

    #[test]
    fn decode_kind_is_total() {
        for word in [0u64, u64::MAX, REPLY_FLAG_MASK, PAYLOAD_FLAG_MASK, 0x5555_5555_5555_5555] {
            let kind = decode_kind(word);
            assert_ne!(kind, MessageKind::Unknown);
        }
    }

    #[test]
    fn kind_survives_reencode() {
        let original = encode_response(42, 7);
        let (id, data) = decode_reply(original);
        let reencoded = encode_response(id, data);
        assert_eq!(decode_kind(reencoded), decode_kind(original));
        assert_eq!(reencoded, original);
    }

    #[test]
    fn frame_byte_order_is_big_endian() {
        let word = encode_request(0x0102_0304_0506_0708);
        let frame = word_to_frame(word);
        assert_eq!(frame[0], 0x01);
        assert_eq!(frame[7], 0x08);
        assert_eq!(frame_to_word(frame), word);
    }

    #[test]
    fn buffer_framing_roundtrip() {
        let mut buf = BytesMut::new();
        write_frame(encode_confirm(5), &mut buf);
        write_frame(encode_response(5, 99), &mut buf);

        assert_eq!(read_frame(&mut buf), Some(encode_confirm(5)));
        assert_eq!(read_frame(&mut buf), Some(encode_response(5, 99)));
        assert_eq!(read_frame(&mut buf), None);
    }
}
