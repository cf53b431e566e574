//! Per-peer session lifecycle: connect → authenticate → kingdom placement
//! → disconnect, plus session-token issuance for fast reconnects.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bevy_ecs::entity::Entity;
use rand::rngs::OsRng;
use rand::RngCore;
use rustc_hash::FxHashMap;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::network::transport::{PeerHandle, PeerId};

/// Sentinel player id of a session that has not authenticated yet.
pub const INVALID_PLAYER: i64 = 0;

/// Entropy of an issued session token, in bytes.
const TOKEN_BYTES: usize = 24;

/// Volatile state of one connected peer.
///
/// Invariants: `authenticated` implies `player_id != INVALID_PLAYER`, and
/// `kingdom_id.is_some()` implies `authenticated && entity.is_some()`.
#[derive(Clone, Debug)]
pub struct PlayerSession {
    pub peer: PeerHandle,
    pub player_id: i64,
    pub entity: Option<Entity>,
    pub authenticated: bool,
    pub kingdom_id: Option<i32>,
}

type DisconnectCallback = Box<dyn Fn(&PlayerSession)>;

/// Owns the peer-id → session map and the in-memory token store.
///
/// Only ever touched from the main thread; worker-thread completions must
/// re-resolve peers through [`find_peer`](Self::find_peer).
#[derive(Default)]
pub struct SessionManager {
    sessions: FxHashMap<PeerId, PlayerSession>,
    tokens: FxHashMap<i64, String>,
    on_disconnect: Option<DisconnectCallback>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unauthenticated session for a freshly connected peer.
    pub fn on_connect(&mut self, peer: PeerHandle) {
        let peer_id = peer.id();
        info!(peer = peer_id, ip = %peer.ip(), "session created");

        self.sessions.insert(
            peer_id,
            PlayerSession {
                peer,
                player_id: INVALID_PLAYER,
                entity: None,
                authenticated: false,
                kingdom_id: None,
            },
        );
    }

    /// Removes the session, fires the disconnect callback with its final
    /// snapshot, and returns it.
    pub fn on_disconnect(&mut self, peer_id: PeerId) -> Option<PlayerSession> {
        let Some(session) = self.sessions.remove(&peer_id) else {
            warn!(peer = peer_id, "disconnect from a peer without a session");
            return None;
        };

        if session.authenticated {
            info!(
                peer = peer_id,
                player_id = session.player_id,
                "player disconnected"
            );
        } else {
            info!(peer = peer_id, "unauthenticated client disconnected");
        }

        if let Some(callback) = &self.on_disconnect {
            callback(&session);
        }

        Some(session)
    }

    /// Promotes a session to authenticated and issues a fresh session
    /// token, invalidating any previous token for this player. Idempotent
    /// for already-authenticated sessions (the token rotates).
    ///
    /// Returns `None` if the peer has no session.
    pub fn on_login(
        &mut self,
        peer_id: PeerId,
        player_id: i64,
        entity: Option<Entity>,
    ) -> Option<String> {
        let Some(session) = self.sessions.get_mut(&peer_id) else {
            error!(peer = peer_id, "login for a peer without a session");
            return None;
        };

        session.player_id = player_id;
        session.entity = entity;
        session.authenticated = true;

        let token = generate_token();
        self.tokens.insert(player_id, token.clone());

        info!(peer = peer_id, player_id, "session authenticated");
        Some(token)
    }

    /// Validates a reconnect token against the in-memory store. Tokens do
    /// not survive a process restart.
    pub fn validate_token(&self, player_id: i64, token: &str) -> bool {
        let Some(current) = self.tokens.get(&player_id) else {
            return false;
        };

        token.as_bytes().ct_eq(current.as_bytes()).into()
    }

    /// Places an authenticated session into a kingdom.
    pub fn on_join_kingdom(&mut self, peer_id: PeerId, kingdom_id: i32, entity: Entity) {
        let Some(session) = self.sessions.get_mut(&peer_id) else {
            error!(peer = peer_id, "kingdom join for a peer without a session");
            return;
        };

        if !session.authenticated {
            error!(peer = peer_id, "kingdom join for an unauthenticated session");
            return;
        }

        session.kingdom_id = Some(kingdom_id);
        session.entity = Some(entity);

        info!(
            peer = peer_id,
            player_id = session.player_id,
            kingdom_id,
            "session joined kingdom"
        );
    }

    /// Resolves a peer id back to a live handle. Returns `None` after the
    /// peer disconnected; async completions use this to abort safely.
    pub fn find_peer(&self, peer_id: PeerId) -> Option<&PeerHandle> {
        self.sessions.get(&peer_id).map(|s| &s.peer)
    }

    pub fn is_connected(&self, peer_id: PeerId) -> bool {
        self.sessions.contains_key(&peer_id)
    }

    pub fn get(&self, peer_id: PeerId) -> Option<&PlayerSession> {
        self.sessions.get(&peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.values()
    }

    pub fn sessions_by_kingdom(&self, kingdom_id: i32) -> Vec<&PlayerSession> {
        self.sessions
            .values()
            .filter(|s| s.kingdom_id == Some(kingdom_id))
            .collect()
    }

    pub fn count_by_kingdom(&self, kingdom_id: i32) -> usize {
        self.sessions
            .values()
            .filter(|s| s.kingdom_id == Some(kingdom_id))
            .count()
    }

    /// Sets the callback fired on every disconnect. The tick loop uses
    /// this to schedule entity cleanup.
    pub fn set_disconnect_callback(&mut self, callback: impl Fn(&PlayerSession) + 'static) {
        self.on_disconnect = Some(Box::new(callback));
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
