//! Length-prefixed message framing for datashare.
//!
//! Every logical message between a consumer and a provider travels as an
//! envelope:
//! - A 4-byte little-endian payload length
//! - Exactly that many payload bytes
//!
//! Inside a payload, [`block`] lays out the bundle, extra-data and bulk
//! sections. No partial reads, no buffer management in user code.

pub mod block;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use block::{decode_bulk, encode_bulk, get_block, get_i32, put_block, RequestBlocks};
pub use codec::{encode_message, parse_header, MessageConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;
