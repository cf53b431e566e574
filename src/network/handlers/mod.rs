//! Per-opcode protocol handlers.
//!
//! Handlers run synchronously on the main thread. Database completions run
//! on the persistence worker and must re-post to the main thread through
//! [`MainThread`](crate::server::MainThread); any peer handle carried
//! across that hop is re-resolved via
//! [`SessionManager::find_peer`](crate::session::SessionManager::find_peer)
//! so callbacks for silently disconnected peers abort cleanly.

mod kingdom;
mod login;
mod ping;
mod resource;

use fiefdom_protocol::{Decode, Packet};
use tracing::{info, warn};

use crate::network::dispatcher::PacketDispatcher;

/// Registers every handler the server speaks.
pub fn register_all(dispatcher: &mut PacketDispatcher) {
    ping::register(dispatcher);
    login::register(dispatcher);
    kingdom::register(dispatcher);
    resource::register(dispatcher);

    info!("network handlers registered (ping, login, kingdom, resource)");
}

/// Decodes a typed payload, logging and dropping the frame on schema
/// violations.
fn parse_payload<'a, P>(mut payload: &'a [u8]) -> Option<P>
where
    P: Packet + Decode<'a>,
{
    match P::decode(&mut payload) {
        Ok(pkt) => Some(pkt),
        Err(e) => {
            warn!("dropping {}: malformed payload: {e:#}", P::NAME);
            None
        }
    }
}
