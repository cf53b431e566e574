//! Server-authoritative resource mutation.

use fiefdom_protocol::packets::{ModifyResourcesC2s, ResourceUpdateS2c};
use fiefdom_protocol::Opcode;
use tracing::{info, warn};

use super::parse_payload;
use crate::network::dispatcher::PacketDispatcher;
use crate::network::transport::SendMode;
use crate::world::{PlayerInfo, Resources};

/// Per-request delta clamp, to bound client-driven swings.
pub(crate) const MAX_RESOURCE_DELTA: i32 = 1000;

pub(super) fn register(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::ModifyResourcesC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<ModifyResourcesC2s>(payload) else {
            return;
        };
        let delta = req.delta.clamp(-MAX_RESOURCE_DELTA, MAX_RESOURCE_DELTA);

        let Some(session) = state.sessions.get(peer.id()) else {
            warn!(peer = peer.id(), "resource change without a session");
            return;
        };
        let (Some(kingdom_id), Some(entity)) = (session.kingdom_id, session.entity) else {
            warn!(peer = peer.id(), "resource change from a peer outside a kingdom");
            return;
        };

        let Some(world) = state.kingdoms.get_mut(&kingdom_id) else {
            return;
        };

        let Some(info) = world.store.get::<PlayerInfo>(entity) else {
            return;
        };
        let account_id = info.account_id;
        let username = info.username.clone();

        let Some(mut resources) = world.store.get_mut::<Resources>(entity) else {
            return;
        };
        resources.apply(req.kind, delta);
        let updated = *resources;

        info!(
            username = %username,
            kind = ?req.kind,
            delta,
            food = updated.food,
            wood = updated.wood,
            stone = updated.stone,
            gold = updated.gold,
            "resources modified"
        );

        // Fire-and-forget save keyed by (account, kingdom).
        state.players.update_resources(
            account_id,
            kingdom_id,
            updated.food,
            updated.wood,
            updated.stone,
            updated.gold,
        );

        peer.send(
            &ResourceUpdateS2c {
                food: updated.food,
                wood: updated.wood,
                stone: updated.stone,
                gold: updated.gold,
            },
            SendMode::Unsequenced,
        );
    });
}
