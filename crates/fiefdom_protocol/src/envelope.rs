use std::io::Write;

use anyhow::Context;
use bytes::{BufMut, BytesMut};

use crate::{Decode, Encode, Packet, VarInt};

/// The outermost structure of every frame: a raw 16-bit opcode and the
/// opaque payload bytes it discriminates.
///
/// The opcode is kept as a raw `u16` here so a verified envelope with an
/// unregistered opcode can be told apart from a malformed frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Envelope<'a> {
    pub opcode: u16,
    pub payload: &'a [u8],
}

impl Encode for Envelope<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.opcode.encode(&mut w)?;
        self.payload.encode(w)
    }
}

impl<'a> Decode<'a> for Envelope<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let opcode = u16::decode(r)?;
        let payload = <&[u8]>::decode(r)?;
        Ok(Self { opcode, payload })
    }
}

/// Encodes `pkt` and wraps it in an [`Envelope`] carrying its opcode.
pub fn encode_envelope<P>(pkt: &P) -> anyhow::Result<BytesMut>
where
    P: Packet + Encode,
{
    let mut payload = vec![];
    pkt.encode(&mut payload)
        .with_context(|| format!("encoding {}", P::NAME))?;

    let mut buf = BytesMut::new();
    let mut writer = (&mut buf).writer();
    (P::OPCODE as u16).encode(&mut writer)?;
    VarInt(payload.len() as i32).encode(&mut writer)?;
    buf.extend_from_slice(&payload);

    Ok(buf)
}
