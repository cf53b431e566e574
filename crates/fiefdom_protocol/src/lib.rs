//! The wire format spoken between the fiefdom server and its clients.
//!
//! Every frame on the wire is a [`VarInt`] length prefix followed by an
//! [`Envelope`]: a 16-bit [`Opcode`] and an opaque payload. Payloads are the
//! per-opcode structs in [`packets`], encoded with the [`Encode`]/[`Decode`]
//! traits below.

use std::io::Write;

pub mod codec;
pub mod envelope;
mod impls;
pub mod opcode;
pub mod packets;
pub mod var_int;

pub use codec::{frame_packet, FrameDecoder};
pub use envelope::Envelope;
pub use opcode::Opcode;
pub use var_int::VarInt;

/// Maximum size of a single frame in bytes, length prefix excluded.
pub const MAX_PACKET_SIZE: i32 = 2097152;

/// Maximum byte length of an encoded string field.
pub const MAX_STRING_LEN: usize = 32767;

/// The `Encode` trait allows objects to be written to the wire.
///
/// If the type also implements [`Decode`], then `encode` followed by `decode`
/// over the written bytes must reproduce the original value, consuming
/// exactly the bytes that were written.
pub trait Encode {
    /// Writes this object to the provided writer.
    fn encode(&self, w: impl Write) -> anyhow::Result<()>;
}

/// The inverse of [`Encode`].
///
/// `Decode` is parameterized by a lifetime so decoded values may borrow from
/// the byte slice they were read from. Implementations shrink the slice from
/// the front as bytes are consumed.
pub trait Decode<'a>: Sized {
    /// Reads this object from the provided byte slice.
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self>;
}

/// Types that form the payload of an [`Envelope`].
pub trait Packet: std::fmt::Debug {
    /// The opcode carried in the envelope for this payload.
    const OPCODE: Opcode;
    /// The name of this packet for debugging purposes.
    const NAME: &'static str;
}
