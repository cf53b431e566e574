//! Stream framing: a [`VarInt`] byte-length prefix in front of every
//! encoded [`Envelope`](crate::Envelope).

use anyhow::{bail, ensure};
use bytes::{Buf, BytesMut};

use crate::envelope::encode_envelope;
use crate::var_int::VarIntDecodeError;
use crate::{Encode, Packet, VarInt, MAX_PACKET_SIZE};

/// Incremental decoder for length-prefixed frames arriving over a byte
/// stream.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes to the internal buffer.
    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete frame body, `None` if more data is needed,
    /// or an error if the stream is corrupt and must be torn down.
    pub fn try_next_frame(&mut self) -> anyhow::Result<Option<BytesMut>> {
        let mut r = &self.buf[..];

        let frame_len = match VarInt::decode_partial(&mut r) {
            Ok(len) => len,
            Err(VarIntDecodeError::Incomplete) => return Ok(None),
            Err(VarIntDecodeError::TooLarge) => bail!("malformed frame length VarInt"),
        };

        ensure!(
            (0..=MAX_PACKET_SIZE).contains(&frame_len),
            "frame length of {frame_len} is out of bounds"
        );

        if r.len() < frame_len as usize {
            // Not enough data arrived yet.
            return Ok(None);
        }

        let prefix_len = VarInt(frame_len).written_size();
        self.buf.advance(prefix_len);
        Ok(Some(self.buf.split_to(frame_len as usize)))
    }
}

/// Encodes `pkt` as a complete frame: length prefix plus envelope.
pub fn frame_packet<P>(pkt: &P) -> anyhow::Result<BytesMut>
where
    P: Packet + Encode,
{
    let envelope = encode_envelope(pkt)?;

    ensure!(
        envelope.len() <= MAX_PACKET_SIZE as usize,
        "frame exceeds maximum length"
    );

    let mut prefix = vec![];
    VarInt(envelope.len() as i32).encode(&mut prefix)?;

    let mut frame = BytesMut::with_capacity(prefix.len() + envelope.len());
    frame.extend_from_slice(&prefix);
    frame.extend_from_slice(&envelope);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{PingC2s, PongS2c};
    use crate::{Decode, Envelope, Opcode};

    #[test]
    fn frames_split_on_byte_boundaries() {
        let a = frame_packet(&PingC2s { timestamp: 1 }).unwrap();
        let b = frame_packet(&PongS2c {
            client_timestamp: 1,
            server_timestamp: 2,
        })
        .unwrap();

        let mut stream = vec![];
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        // Feed the stream one byte at a time.
        let mut dec = FrameDecoder::new();
        let mut frames = vec![];
        for byte in stream {
            dec.queue_bytes(&[byte]);
            while let Some(frame) = dec.try_next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);

        let mut r = &frames[0][..];
        assert_eq!(
            Envelope::decode(&mut r).unwrap().opcode,
            Opcode::PingC2s as u16
        );

        let mut r = &frames[1][..];
        assert_eq!(
            Envelope::decode(&mut r).unwrap().opcode,
            Opcode::PongS2c as u16
        );
    }

    #[test]
    fn oversized_frame_is_an_error() {
        let mut dec = FrameDecoder::new();

        let mut prefix = vec![];
        VarInt(MAX_PACKET_SIZE + 1).encode(&mut prefix).unwrap();
        dec.queue_bytes(&prefix);

        assert!(dec.try_next_frame().is_err());
    }
}
