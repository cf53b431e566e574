use fiefdom_protocol::packets::{PingC2s, PongS2c};
use fiefdom_protocol::Opcode;

use super::parse_payload;
use crate::network::dispatcher::PacketDispatcher;
use crate::network::transport::SendMode;

pub(super) fn register(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::PingC2s, |state, peer, payload| {
        let Some(ping) = parse_payload::<PingC2s>(payload) else {
            return;
        };

        // High-frequency traffic; an unsequenced reply is fine.
        peer.send(
            &PongS2c {
                client_timestamp: ping.timestamp,
                server_timestamp: state.monotonic_ms(),
            },
            SendMode::Unsequenced,
        );
    });
}
