//! The transport host: accepts connections, frames the byte stream, and
//! surfaces connect/receive/disconnect events to the main thread.
//!
//! All IO runs on a private tokio runtime with one reader and one writer
//! task per peer. The main thread drains a single event channel
//! non-blockingly each tick, so per-peer event order is arrival order.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use fiefdom_protocol::{frame_packet, Encode, FrameDecoder, Packet};
use flume::{Receiver, Sender};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, warn};

/// Stable numeric identifier assigned to a peer on connect. Used to
/// re-resolve peers across thread hops.
pub type PeerId = u32;

const READ_BUF_SIZE: usize = 4096;

/// Delivery mode requested for an outgoing packet.
///
/// The TCP-backed host delivers both modes reliably and in order; the
/// distinction is kept for datagram transports and for callers to mark
/// high-frequency traffic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendMode {
    Reliable,
    Unsequenced,
}

/// A handle addressing one connected peer. Cheap to clone; sending never
/// blocks.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    id: PeerId,
    ip: IpAddr,
    outgoing: Sender<BytesMut>,
}

impl PeerHandle {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Encodes `pkt` into a frame and queues it for delivery.
    pub fn send<P>(&self, pkt: &P, mode: SendMode)
    where
        P: Packet + Encode,
    {
        match frame_packet(pkt) {
            Ok(frame) => self.send_frame(frame, mode),
            Err(e) => warn!(peer = self.id, "failed to encode {}: {e:#}", P::NAME),
        }
    }

    /// Queues an already-encoded frame for delivery.
    pub fn send_frame(&self, frame: BytesMut, _mode: SendMode) {
        if self.outgoing.send(frame).is_err() {
            debug!(peer = self.id, "dropping packet for disconnected peer");
        }
    }

    /// Builds a handle backed by a bare channel, plus the receiving end so
    /// tests can observe what was sent.
    #[cfg(test)]
    pub(crate) fn test_pair(id: PeerId) -> (Self, Receiver<BytesMut>) {
        let (outgoing, rx) = flume::unbounded();
        let handle = Self {
            id,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            outgoing,
        };
        (handle, rx)
    }
}

/// An event surfaced by the transport, drained from the main thread.
#[derive(Debug)]
pub enum TransportEvent {
    Connect(PeerHandle),
    Receive { peer_id: PeerId, frame: BytesMut },
    Disconnect { peer_id: PeerId, timed_out: bool },
}

struct SharedTransport {
    events: Sender<TransportEvent>,
    connection_sema: Arc<Semaphore>,
    next_peer_id: AtomicU32,
}

/// Owns the listener, the IO runtime, and the event channel.
pub struct TransportHost {
    events: Receiver<TransportEvent>,
    local_addr: SocketAddr,
    // Holding a runtime handle is not enough to keep tokio working; the
    // runtime itself lives here until shutdown.
    runtime: Option<Runtime>,
}

impl TransportHost {
    /// Binds `0.0.0.0:port` with capacity for `max_peers` simultaneous
    /// connections and starts accepting.
    pub fn bind(port: u16, max_peers: usize) -> anyhow::Result<Self> {
        let runtime = Runtime::new().context("failed to create IO runtime")?;

        let address = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let listener = runtime
            .block_on(TcpListener::bind(address))
            .with_context(|| format!("failed to bind {address}"))?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = flume::unbounded();

        let shared = Arc::new(SharedTransport {
            events: events_tx,
            connection_sema: Arc::new(Semaphore::new(max_peers.min(Semaphore::MAX_PERMITS))),
            next_peer_id: AtomicU32::new(1),
        });

        runtime.spawn(do_accept_loop(listener, shared));

        Ok(Self {
            events: events_rx,
            local_addr,
            runtime: Some(runtime),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pops the next pending event, if any. Never blocks.
    pub fn try_recv(&self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }

    /// Stops accepting and tears down all peer tasks. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for TransportHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn do_accept_loop(listener: TcpListener, shared: Arc<SharedTransport>) {
    loop {
        let Ok(permit) = shared.connection_sema.clone().acquire_owned().await else {
            // Semaphore closed; shutting down.
            return;
        };

        match listener.accept().await {
            Ok((stream, remote)) => {
                tokio::spawn(handle_connection(shared.clone(), stream, remote, permit));
            }
            Err(e) => {
                error!("failed to accept connection: {e}");
            }
        }
    }
}

async fn handle_connection(
    shared: Arc<SharedTransport>,
    stream: TcpStream,
    remote: SocketAddr,
    permit: OwnedSemaphorePermit,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY: {e}");
    }

    let peer_id = shared.next_peer_id.fetch_add(1, Ordering::Relaxed);

    let (outgoing_tx, outgoing_rx) = flume::unbounded::<BytesMut>();

    let handle = PeerHandle {
        id: peer_id,
        ip: remote.ip(),
        outgoing: outgoing_tx,
    };

    if shared.events.send(TransportEvent::Connect(handle)).is_err() {
        return;
    }

    let (mut reader, mut writer) = stream.into_split();

    let writer_task = tokio::spawn(async move {
        while let Ok(bytes) = outgoing_rx.recv_async().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!("error writing data to stream: {e}");
                break;
            }
        }
    });

    let mut dec = FrameDecoder::new();
    let mut buf = BytesMut::new();

    let timed_out = loop {
        match dec.try_next_frame() {
            Ok(Some(frame)) => {
                if shared
                    .events
                    .send(TransportEvent::Receive { peer_id, frame })
                    .is_err()
                {
                    break false;
                }
                continue;
            }
            Ok(None) => {
                // Incomplete frame; need more data.
            }
            Err(e) => {
                warn!(peer = peer_id, "corrupt stream, disconnecting: {e:#}");
                break false;
            }
        }

        buf.reserve(READ_BUF_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break false, // Clean EOF.
            Ok(_) => dec.queue_bytes(&buf.split()),
            Err(e) => {
                debug!(peer = peer_id, "error reading from stream: {e}");
                break true;
            }
        }
    };

    writer_task.abort();

    let _ = shared
        .events
        .send(TransportEvent::Disconnect { peer_id, timed_out });

    drop(permit);
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::{Duration, Instant};

    use fiefdom_protocol::packets::PingC2s;

    use super::*;

    fn wait_event(host: &TransportHost) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = host.try_recv() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn connect_receive_disconnect() {
        let mut host = TransportHost::bind(0, 4).unwrap();
        let addr = host.local_addr();

        let mut client = std::net::TcpStream::connect(addr).unwrap();

        let TransportEvent::Connect(peer) = wait_event(&host) else {
            panic!("expected connect event");
        };
        assert_eq!(peer.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));

        let frame = frame_packet(&PingC2s { timestamp: 7 }).unwrap();
        client.write_all(&frame).unwrap();

        let TransportEvent::Receive { peer_id, frame } = wait_event(&host) else {
            panic!("expected receive event");
        };
        assert_eq!(peer_id, peer.id());
        assert!(!frame.is_empty());

        drop(client);

        let TransportEvent::Disconnect { peer_id, timed_out } = wait_event(&host) else {
            panic!("expected disconnect event");
        };
        assert_eq!(peer_id, peer.id());
        assert!(!timed_out);

        host.shutdown();
    }

    #[test]
    fn outgoing_frames_reach_the_socket() {
        use std::io::Read;

        let mut host = TransportHost::bind(0, 4).unwrap();
        let addr = host.local_addr();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        let TransportEvent::Connect(peer) = wait_event(&host) else {
            panic!("expected connect event");
        };

        let frame = frame_packet(&PingC2s { timestamp: 9 }).unwrap();
        let expected = frame.to_vec();
        peer.send(&PingC2s { timestamp: 9 }, SendMode::Reliable);

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut received = vec![0u8; expected.len()];
        client.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);

        host.shutdown();
    }
}
