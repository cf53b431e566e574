//! The per-opcode payload structs.
//!
//! Client-to-server packets borrow their string fields from the received
//! frame; server-to-client packets own theirs since they are built from
//! server state.

use std::io::Write;

use anyhow::bail;

use crate::{Decode, Encode, Opcode, Packet};

macro_rules! impl_packet {
    ($name:ident $(<$life:lifetime>)?, $opcode:ident) => {
        impl $(<$life>)? Packet for $name $(<$life>)? {
            const OPCODE: Opcode = Opcode::$opcode;
            const NAME: &'static str = stringify!($name);
        }
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PingC2s {
    /// Client wall-clock timestamp, echoed back verbatim.
    pub timestamp: i64,
}

impl_packet!(PingC2s, PingC2s);

impl Encode for PingC2s {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.timestamp.encode(w)
    }
}

impl Decode<'_> for PingC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            timestamp: i64::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PongS2c {
    pub client_timestamp: i64,
    /// Server monotonic time in milliseconds since startup.
    pub server_timestamp: i64,
}

impl_packet!(PongS2c, PongS2c);

impl Encode for PongS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.client_timestamp.encode(&mut w)?;
        self.server_timestamp.encode(w)
    }
}

impl Decode<'_> for PongS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            client_timestamp: i64::decode(r)?,
            server_timestamp: i64::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LoginC2s<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl_packet!(LoginC2s<'a>, LoginC2s);

impl Encode for LoginC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.username.encode(&mut w)?;
        self.password.encode(w)
    }
}

impl<'a> Decode<'a> for LoginC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            username: <&str>::decode(r)?,
            password: <&str>::decode(r)?,
        })
    }
}

/// Result of any of the authentication flows (login, guest login,
/// reconnect, social login).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginResultS2c {
    pub success: bool,
    pub account_id: i32,
    pub message: String,
    pub session_token: String,
}

impl_packet!(LoginResultS2c, LoginResultS2c);

impl Encode for LoginResultS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.success.encode(&mut w)?;
        self.account_id.encode(&mut w)?;
        self.message.encode(&mut w)?;
        self.session_token.encode(w)
    }
}

impl Decode<'_> for LoginResultS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            success: bool::decode(r)?,
            account_id: i32::decode(r)?,
            message: String::decode(r)?,
            session_token: String::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GuestLoginC2s<'a> {
    pub device_id: &'a str,
}

impl_packet!(GuestLoginC2s<'a>, GuestLoginC2s);

impl Encode for GuestLoginC2s<'_> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.device_id.encode(w)
    }
}

impl<'a> Decode<'a> for GuestLoginC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            device_id: <&str>::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReconnectC2s<'a> {
    pub account_id: i32,
    pub session_token: &'a str,
}

impl_packet!(ReconnectC2s<'a>, ReconnectC2s);

impl Encode for ReconnectC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.account_id.encode(&mut w)?;
        self.session_token.encode(w)
    }
}

impl<'a> Decode<'a> for ReconnectC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            account_id: i32::decode(r)?,
            session_token: <&str>::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BindAccountC2s<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl_packet!(BindAccountC2s<'a>, BindAccountC2s);

impl Encode for BindAccountC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.username.encode(&mut w)?;
        self.password.encode(w)
    }
}

impl<'a> Decode<'a> for BindAccountC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            username: <&str>::decode(r)?,
            password: <&str>::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BindAccountResultS2c {
    pub success: bool,
    pub message: String,
}

impl_packet!(BindAccountResultS2c, BindAccountResultS2c);

impl Encode for BindAccountResultS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.success.encode(&mut w)?;
        self.message.encode(w)
    }
}

impl Decode<'_> for BindAccountResultS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            success: bool::decode(r)?,
            message: String::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BindSocialAccountC2s<'a> {
    pub provider: &'a str,
    pub provider_id: &'a str,
}

impl_packet!(BindSocialAccountC2s<'a>, BindSocialAccountC2s);

impl Encode for BindSocialAccountC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.provider.encode(&mut w)?;
        self.provider_id.encode(w)
    }
}

impl<'a> Decode<'a> for BindSocialAccountC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            provider: <&str>::decode(r)?,
            provider_id: <&str>::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BindSocialAccountResultS2c {
    pub success: bool,
    pub message: String,
}

impl_packet!(BindSocialAccountResultS2c, BindSocialAccountResultS2c);

impl Encode for BindSocialAccountResultS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.success.encode(&mut w)?;
        self.message.encode(w)
    }
}

impl Decode<'_> for BindSocialAccountResultS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            success: bool::decode(r)?,
            message: String::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SocialLoginC2s<'a> {
    pub provider: &'a str,
    pub provider_id: &'a str,
}

impl_packet!(SocialLoginC2s<'a>, SocialLoginC2s);

impl Encode for SocialLoginC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.provider.encode(&mut w)?;
        self.provider_id.encode(w)
    }
}

impl<'a> Decode<'a> for SocialLoginC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            provider: <&str>::decode(r)?,
            provider_id: <&str>::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RequestKingdomsC2s;

impl_packet!(RequestKingdomsC2s, RequestKingdomsC2s);

impl Encode for RequestKingdomsC2s {
    fn encode(&self, _w: impl Write) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Decode<'_> for RequestKingdomsC2s {
    fn decode(_r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KingdomEntry {
    pub id: i32,
    pub name: String,
    pub player_count: i32,
    pub max_players: i32,
    /// 0 offline, 1 online, 2 full, 3 maintenance.
    pub status: u8,
}

impl Encode for KingdomEntry {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.id.encode(&mut w)?;
        self.name.encode(&mut w)?;
        self.player_count.encode(&mut w)?;
        self.max_players.encode(&mut w)?;
        self.status.encode(w)
    }
}

impl Decode<'_> for KingdomEntry {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            id: i32::decode(r)?,
            name: String::decode(r)?,
            player_count: i32::decode(r)?,
            max_players: i32::decode(r)?,
            status: u8::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KingdomListS2c {
    pub kingdoms: Vec<KingdomEntry>,
}

impl_packet!(KingdomListS2c, KingdomListS2c);

impl Encode for KingdomListS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.kingdoms.encode(w)
    }
}

impl Decode<'_> for KingdomListS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            kingdoms: Vec::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SelectKingdomC2s {
    pub kingdom_id: i32,
}

impl_packet!(SelectKingdomC2s, SelectKingdomC2s);

impl Encode for SelectKingdomC2s {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.kingdom_id.encode(w)
    }
}

impl Decode<'_> for SelectKingdomC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            kingdom_id: i32::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct PlayerDataS2c {
    pub account_id: i32,
    pub username: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub food: i32,
    pub wood: i32,
    pub stone: i32,
    pub gold: i32,
}

impl_packet!(PlayerDataS2c, PlayerDataS2c);

impl Encode for PlayerDataS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.account_id.encode(&mut w)?;
        self.username.encode(&mut w)?;
        self.pos_x.encode(&mut w)?;
        self.pos_y.encode(&mut w)?;
        self.food.encode(&mut w)?;
        self.wood.encode(&mut w)?;
        self.stone.encode(&mut w)?;
        self.gold.encode(w)
    }
}

impl Decode<'_> for PlayerDataS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            account_id: i32::decode(r)?,
            username: String::decode(r)?,
            pos_x: f32::decode(r)?,
            pos_y: f32::decode(r)?,
            food: i32::decode(r)?,
            wood: i32::decode(r)?,
            stone: i32::decode(r)?,
            gold: i32::decode(r)?,
        })
    }
}

/// One of the four player resources.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ResourceKind {
    Food = 0,
    Wood = 1,
    Stone = 2,
    Gold = 3,
}

impl Encode for ResourceKind {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        (*self as u8).encode(w)
    }
}

impl Decode<'_> for ResourceKind {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        match u8::decode(r)? {
            0 => Ok(Self::Food),
            1 => Ok(Self::Wood),
            2 => Ok(Self::Stone),
            3 => Ok(Self::Gold),
            other => bail!("unknown resource kind {other}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ModifyResourcesC2s {
    pub kind: ResourceKind,
    pub delta: i32,
}

impl_packet!(ModifyResourcesC2s, ModifyResourcesC2s);

impl Encode for ModifyResourcesC2s {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.kind.encode(&mut w)?;
        self.delta.encode(w)
    }
}

impl Decode<'_> for ModifyResourcesC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            kind: ResourceKind::decode(r)?,
            delta: i32::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceUpdateS2c {
    pub food: i32,
    pub wood: i32,
    pub stone: i32,
    pub gold: i32,
}

impl_packet!(ResourceUpdateS2c, ResourceUpdateS2c);

impl Encode for ResourceUpdateS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.food.encode(&mut w)?;
        self.wood.encode(&mut w)?;
        self.stone.encode(&mut w)?;
        self.gold.encode(w)
    }
}

impl Decode<'_> for ResourceUpdateS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            food: i32::decode(r)?,
            wood: i32::decode(r)?,
            stone: i32::decode(r)?,
            gold: i32::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<'a, P>(pkt: &P, buf: &'a mut Vec<u8>) -> P
    where
        P: Packet + Encode + Decode<'a> + PartialEq,
    {
        pkt.encode(&mut *buf).unwrap();
        let mut slice = buf.as_slice();
        let decoded = P::decode(&mut slice).unwrap();
        assert!(slice.is_empty(), "{} left trailing bytes", P::NAME);
        decoded
    }

    #[test]
    fn login_round_trip() {
        let mut buf = vec![];
        let pkt = LoginC2s {
            username: "alice",
            password: "pw12",
        };
        assert_eq!(round_trip(&pkt, &mut buf), pkt);
    }

    #[test]
    fn login_result_round_trip() {
        let mut buf = vec![];
        let pkt = LoginResultS2c {
            success: true,
            account_id: 1,
            message: "Bienvenue de retour !".to_owned(),
            session_token: "dG9rZW4".to_owned(),
        };
        assert_eq!(round_trip(&pkt, &mut buf), pkt);
    }

    #[test]
    fn kingdom_list_round_trip() {
        let mut buf = vec![];
        let pkt = KingdomListS2c {
            kingdoms: vec![
                KingdomEntry {
                    id: 1,
                    name: "Royaume Principal".to_owned(),
                    player_count: 3,
                    max_players: 1000,
                    status: 1,
                },
                KingdomEntry {
                    id: 2,
                    name: "Terres du Nord".to_owned(),
                    player_count: 0,
                    max_players: 1000,
                    status: 1,
                },
            ],
        };
        assert_eq!(round_trip(&pkt, &mut buf), pkt);
    }

    #[test]
    fn modify_resources_round_trip() {
        let mut buf = vec![];
        let pkt = ModifyResourcesC2s {
            kind: ResourceKind::Gold,
            delta: -250,
        };
        assert_eq!(round_trip(&pkt, &mut buf), pkt);
    }

    #[test]
    fn unknown_resource_kind_is_rejected() {
        let mut slice: &[u8] = &[4, 0, 0, 0, 0];
        assert!(ModifyResourcesC2s::decode(&mut slice).is_err());
    }
}
