//! Protocol module containing message types, the JSON frame codec, and
//! application sequence numbering.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_frame, decode_message, encode_frame, encode_message, CodecError, WireFrame};
pub use messages::*;
pub use sequence::{SequenceCheck, SequenceCounter, SequenceTracker};
