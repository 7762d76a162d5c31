//! Protocol module - Defines the 64-bit wire protocol for WordWire
//!
//! Every message is a single 64-bit word, transmitted big-endian:
//! - Bit 63: reply flag (0 = Request, 1 = Confirm/Response)
//! - Bit 62: payload flag (replies only; 0 = Confirm, 1 = Response)
//! - Bits 61..55: request id (replies only, 7 bits)
//! - Bits 61..0: uri (requests only)
//! - Bits 54..0: data (responses only)

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Size of every wire message in bytes
pub const MESSAGE_SIZE_BYTES: usize = 8;

/// Default port for WordWire communication
pub const DEFAULT_PORT: u16 = 6464;

/// Default idle timeout for a single read cycle, in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Width of the request id field; ids wrap at 2^7
pub const REQUEST_ID_BITS: u32 = 7;
