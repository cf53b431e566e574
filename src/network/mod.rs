//! Networking: the transport host wrapper, the packet dispatcher, and the
//! per-opcode handlers.

pub mod dispatcher;
pub mod handlers;
pub mod rate_limit;
pub mod transport;

use anyhow::Context;
use fiefdom_protocol::{frame_packet, Encode, Packet};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::server::GameState;
use crate::session::SessionManager;
use dispatcher::PacketDispatcher;
use transport::{PeerHandle, SendMode, TransportEvent, TransportHost};

/// Wraps the transport host: binds, pumps events into the session manager
/// and dispatcher, and sends outgoing packets.
pub struct NetworkManager {
    host: TransportHost,
}

impl NetworkManager {
    /// Binds `0.0.0.0:port`. Failure here aborts startup.
    pub fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let host = TransportHost::bind(config.port, config.max_players)
            .context("failed to create transport host")?;

        info!(addr = %host.local_addr(), "server listening");
        Ok(Self { host })
    }

    /// Drains all pending transport events in one non-blocking pass.
    /// Handlers run synchronously, on this (the main) thread.
    pub fn process_events(&mut self, dispatcher: &PacketDispatcher, state: &mut GameState) {
        while let Some(event) = self.host.try_recv() {
            match event {
                TransportEvent::Connect(peer) => {
                    state.sessions.on_connect(peer);
                }
                TransportEvent::Receive { peer_id, frame } => {
                    let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                        debug!(peer = peer_id, "frame from a peer without a session");
                        continue;
                    };
                    dispatcher.dispatch(state, &peer, &frame);
                    // The frame buffer is released here, after dispatch.
                }
                TransportEvent::Disconnect { peer_id, timed_out } => {
                    if timed_out {
                        debug!(peer = peer_id, "peer timed out");
                    }
                    state.sessions.on_disconnect(peer_id);
                }
            }
        }
    }

    pub fn send_packet<P>(&self, peer: &PeerHandle, pkt: &P, mode: SendMode)
    where
        P: Packet + Encode,
    {
        peer.send(pkt, mode);
    }

    /// Sends one packet to every connected session.
    pub fn broadcast_packet<P>(&self, sessions: &SessionManager, pkt: &P, mode: SendMode)
    where
        P: Packet + Encode,
    {
        let frame = match frame_packet(pkt) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode broadcast {}: {e:#}", P::NAME);
                return;
            }
        };

        for session in sessions.iter() {
            session.peer.send_frame(frame.clone(), mode);
        }
    }

    /// Destroys the host and stops all IO tasks.
    pub fn shutdown(&mut self) {
        self.host.shutdown();
        info!("network manager stopped");
    }
}
