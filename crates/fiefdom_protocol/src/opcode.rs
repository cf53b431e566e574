use std::io::Write;

use thiserror::Error;

use crate::{Decode, Encode};

/// The 16-bit discriminator identifying the payload carried in an
/// [`Envelope`](crate::Envelope).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u16)]
pub enum Opcode {
    PingC2s = 1,
    LoginC2s = 2,
    GuestLoginC2s = 3,
    ReconnectC2s = 4,
    BindAccountC2s = 5,
    BindSocialAccountC2s = 6,
    SocialLoginC2s = 7,
    RequestKingdomsC2s = 8,
    SelectKingdomC2s = 9,
    ModifyResourcesC2s = 10,
    PongS2c = 100,
    LoginResultS2c = 101,
    BindAccountResultS2c = 102,
    BindSocialAccountResultS2c = 103,
    KingdomListS2c = 104,
    PlayerDataS2c = 105,
    ResourceUpdateS2c = 106,
}

/// A syntactically valid opcode value with no registered meaning. Kept
/// distinct from malformed-frame errors so callers can log the two cases
/// apart.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u16);

impl TryFrom<u16> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: u16) -> Result<Self, UnknownOpcode> {
        match value {
            1 => Ok(Self::PingC2s),
            2 => Ok(Self::LoginC2s),
            3 => Ok(Self::GuestLoginC2s),
            4 => Ok(Self::ReconnectC2s),
            5 => Ok(Self::BindAccountC2s),
            6 => Ok(Self::BindSocialAccountC2s),
            7 => Ok(Self::SocialLoginC2s),
            8 => Ok(Self::RequestKingdomsC2s),
            9 => Ok(Self::SelectKingdomC2s),
            10 => Ok(Self::ModifyResourcesC2s),
            100 => Ok(Self::PongS2c),
            101 => Ok(Self::LoginResultS2c),
            102 => Ok(Self::BindAccountResultS2c),
            103 => Ok(Self::BindSocialAccountResultS2c),
            104 => Ok(Self::KingdomListS2c),
            105 => Ok(Self::PlayerDataS2c),
            106 => Ok(Self::ResourceUpdateS2c),
            other => Err(UnknownOpcode(other)),
        }
    }
}

impl Encode for Opcode {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        (*self as u16).encode(w)
    }
}

impl Decode<'_> for Opcode {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self::try_from(u16::decode(r)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for op in [
            Opcode::PingC2s,
            Opcode::ModifyResourcesC2s,
            Opcode::ResourceUpdateS2c,
        ] {
            assert_eq!(Opcode::try_from(op as u16), Ok(op));
        }
    }

    #[test]
    fn unknown_opcode_is_distinguishable() {
        assert_eq!(Opcode::try_from(0xbeef), Err(UnknownOpcode(0xbeef)));
    }
}
