//! Opcode routing: verify the envelope, look the opcode up, invoke the
//! handler synchronously on the main thread.

use fiefdom_protocol::{Decode, Envelope, Opcode};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::network::transport::PeerHandle;
use crate::server::GameState;

type HandlerFn = Box<dyn Fn(&mut GameState, &PeerHandle, &[u8])>;

/// The opcode → handler table.
#[derive(Default)]
pub struct PacketDispatcher {
    handlers: FxHashMap<Opcode, HandlerFn>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one opcode. A second registration for the
    /// same opcode is rejected.
    pub fn register(
        &mut self,
        opcode: Opcode,
        handler: impl Fn(&mut GameState, &PeerHandle, &[u8]) + 'static,
    ) {
        use std::collections::hash_map::Entry;

        match self.handlers.entry(opcode) {
            Entry::Occupied(_) => {
                warn!(?opcode, "a handler is already registered for this opcode");
            }
            Entry::Vacant(slot) => {
                slot.insert(Box::new(handler));
            }
        }
    }

    /// Verifies and routes one received frame. Malformed frames and
    /// unknown opcodes are dropped with a warning and never reach a
    /// handler.
    pub fn dispatch(&self, state: &mut GameState, peer: &PeerHandle, data: &[u8]) {
        let mut r = data;
        let envelope = match Envelope::decode(&mut r) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer = peer.id(), "dropping malformed frame: {e:#}");
                return;
            }
        };

        let opcode = match Opcode::try_from(envelope.opcode) {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!(peer = peer.id(), "dropping frame: {e}");
                return;
            }
        };

        match self.handlers.get(&opcode) {
            Some(handler) => handler(state, peer, envelope.payload),
            None => warn!(?opcode, "no handler registered for this opcode"),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, opcode: Opcode) -> bool {
        self.handlers.contains_key(&opcode)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use fiefdom_protocol::frame_packet;
    use fiefdom_protocol::packets::PingC2s;

    use super::*;
    use crate::server::GameState;

    fn dispatch_frame(dispatcher: &PacketDispatcher, state: &mut GameState, bytes: &[u8]) {
        let (peer, _rx) = PeerHandle::test_pair(1);
        // Strip the stream length prefix; dispatch expects the envelope.
        let mut r = bytes;
        let len = fiefdom_protocol::VarInt::decode(&mut r).unwrap().0 as usize;
        dispatcher.dispatch(state, &peer, &r[..len]);
    }

    #[test]
    fn duplicate_registration_keeps_the_first_handler() {
        let mut dispatcher = PacketDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&hits);
        dispatcher.register(Opcode::PingC2s, move |_state, _peer, _payload| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.register(Opcode::PingC2s, move |_state, _peer, _payload| {
            panic!("second registration must not replace the first");
        });

        let (mut state, _dir) = GameState::new_for_test();
        let frame = frame_packet(&PingC2s { timestamp: 1 }).unwrap();
        dispatch_frame(&dispatcher, &mut state, &frame);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        let mut dispatcher = PacketDispatcher::new();
        dispatcher.register(Opcode::PingC2s, |_state, _peer, _payload| {
            panic!("handler must not run");
        });
        assert!(dispatcher.is_registered(Opcode::PingC2s));

        let (peer, _rx) = PeerHandle::test_pair(1);
        let (mut state, _dir) = GameState::new_for_test();

        // Garbage bytes.
        dispatcher.dispatch(&mut state, &peer, &[0xff]);

        // Valid envelope, unknown opcode.
        let mut envelope = vec![];
        use fiefdom_protocol::Encode;
        fiefdom_protocol::Envelope {
            opcode: 0xbeef,
            payload: &[],
        }
        .encode(&mut envelope)
        .unwrap();
        dispatcher.dispatch(&mut state, &peer, &envelope);

        // Known opcode with no handler.
        let mut envelope = vec![];
        fiefdom_protocol::Envelope {
            opcode: Opcode::LoginC2s as u16,
            payload: &[],
        }
        .encode(&mut envelope)
        .unwrap();
        dispatcher.dispatch(&mut state, &peer, &envelope);
    }
}
