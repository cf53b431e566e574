//! Kingdom listing and selection.

use fiefdom_protocol::packets::{
    KingdomEntry, KingdomListS2c, PlayerDataS2c, RequestKingdomsC2s, SelectKingdomC2s,
};
use fiefdom_protocol::Opcode;
use tracing::{error, info, warn};

use super::parse_payload;
use crate::database::{Account, PlayerData};
use crate::network::dispatcher::PacketDispatcher;
use crate::network::transport::{PeerId, SendMode};
use crate::server::MainThread;
use crate::world::registry::STATUS_ONLINE;
use crate::world::{PlayerInfo, Position, Resources};

/// Advertised capacity of every kingdom.
const KINGDOM_MAX_PLAYERS: i32 = 1000;

pub(super) fn register(dispatcher: &mut PacketDispatcher) {
    register_request_kingdoms(dispatcher);
    register_select_kingdom(dispatcher);
}

fn register_request_kingdoms(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::RequestKingdomsC2s, |state, peer, payload| {
        if parse_payload::<RequestKingdomsC2s>(payload).is_none() {
            return;
        }

        let Some(session) = state.sessions.get(peer.id()) else {
            warn!(peer = peer.id(), "kingdom list requested without a session");
            return;
        };
        if !session.authenticated {
            warn!(peer = peer.id(), "kingdom list requested by unauthenticated peer");
            return;
        }

        info!(
            player_id = session.player_id,
            count = state.kingdoms.len(),
            "sending kingdom list"
        );

        let kingdoms = state
            .kingdoms
            .values()
            .map(|world| KingdomEntry {
                id: world.id(),
                name: world.name().to_owned(),
                player_count: state.sessions.count_by_kingdom(world.id()) as i32,
                max_players: KINGDOM_MAX_PLAYERS,
                status: STATUS_ONLINE,
            })
            .collect();

        peer.send(&KingdomListS2c { kingdoms }, SendMode::Reliable);
    });
}

fn register_select_kingdom(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::SelectKingdomC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<SelectKingdomC2s>(payload) else {
            return;
        };

        let Some(session) = state.sessions.get(peer.id()) else {
            warn!(peer = peer.id(), "kingdom select without a session");
            return;
        };
        if !session.authenticated {
            warn!(peer = peer.id(), "kingdom select by unauthenticated peer");
            return;
        }
        if let Some(current) = session.kingdom_id {
            warn!(
                player_id = session.player_id,
                kingdom_id = current,
                "player is already in a kingdom"
            );
            return;
        }

        let kingdom_id = req.kingdom_id;
        if !state.kingdoms.contains_key(&kingdom_id) {
            warn!(kingdom_id, "kingdom not found");
            return;
        }

        let account_id = session.player_id;
        let peer_id = peer.id();
        info!(account_id, kingdom_id, "kingdom selected");

        let players = state.players.clone();
        let main = state.main_thread.clone();

        // Load the account, then the per-kingdom profile, creating it on
        // first join. The entity spawn happens back on the main thread.
        state.accounts.get_by_id(account_id, move |account| {
            let Some(account) = account else {
                error!(account_id, "account missing during kingdom select");
                return;
            };

            let create_players = players.clone();
            let main = main.clone();

            players.get_by_account_and_kingdom(account.id, kingdom_id, move |data| {
                match data {
                    Some(data) => join_on_main(&main, peer_id, account, data),
                    None => {
                        info!(
                            account_id = account.id,
                            kingdom_id, "creating player profile"
                        );
                        create_players.create(account.id, kingdom_id, move |created| {
                            let Some(data) = created else {
                                error!(
                                    account_id = account.id,
                                    kingdom_id, "player profile creation failed"
                                );
                                return;
                            };
                            join_on_main(&main, peer_id, account, data);
                        });
                    }
                }
            });
        });
    });
}

/// Finishes a kingdom join on the main thread: spawn the entity, index it,
/// promote the session, and send the profile to the client.
fn join_on_main(main: &MainThread, peer_id: PeerId, account: Account, data: PlayerData) {
    main.run(move |state| {
        let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
            return;
        };
        let Some(world) = state.kingdoms.get_mut(&data.kingdom_id) else {
            return;
        };

        let entity = world.spawn_player(
            PlayerInfo {
                player_id: account.id,
                account_id: account.id,
                username: account.username.clone(),
            },
            Position::new(data.pos_x, data.pos_y),
            Resources {
                food: data.food,
                wood: data.wood,
                stone: data.stone,
                gold: data.gold,
            },
        );

        state.sessions.on_join_kingdom(peer_id, data.kingdom_id, entity);

        info!(
            username = %account.username,
            kingdom = %world.name(),
            "player joined kingdom"
        );

        peer.send(
            &PlayerDataS2c {
                account_id: account.id as i32,
                username: account.username,
                pos_x: data.pos_x,
                pos_y: data.pos_y,
                food: data.food,
                wood: data.wood,
                stone: data.stone,
                gold: data.gold,
            },
            SendMode::Reliable,
        );
    });
}
