//! Test helpers for the X-Vine overlay.
//!
//! [`SimNetwork`] wires several [`Overlay`]s together in memory. Transmit
//! requests are collected in one shared FIFO and [`SimNetwork::run_until_idle`]
//! plays them out, so a scenario runs the same way every time.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{trace, warn};
use tracing_subscriber::EnvFilter;
use xvine_net_codec::{decode_frame, encode_frame};
use xvine_overlay::{
    ClientHandler, ClientResult, FriendTransport, MemoryBlockStore, MemoryRoutingTable, Overlay,
    OverlayConfig,
};
use xvine_overlay_proto::{MessageType, OverlayMessage};
use xvine_primitives::{Key, PeerId};

/// Upper bound on frames played out by one [`SimNetwork::run_until_idle`].
pub const MAX_DELIVERIES: usize = 100_000;

/// Peer whose ring value is `value`.
pub fn peer_at(value: u64) -> PeerId {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&value.rotate_left(17).to_be_bytes());
    bytes[24..].copy_from_slice(&value.to_be_bytes());
    PeerId::new(bytes)
}

/// Key whose ring value is `value`.
pub fn key_at(value: u64) -> Key {
    let mut bytes = [0u8; 64];
    bytes[0] = 0x4b;
    bytes[56..].copy_from_slice(&value.to_be_bytes());
    Key::new(bytes)
}

/// Route test logs through the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type RequestQueue = Arc<Mutex<VecDeque<(PeerId, PeerId, usize)>>>;

/// Transport pushing `(from, to, size)` requests onto a shared queue.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    me: PeerId,
    requests: RequestQueue,
}

impl FriendTransport for RecordingTransport {
    fn request_transmit(&self, peer: &PeerId, size: usize) {
        self.requests.lock().push_back((self.me, *peer, size));
    }
}

/// Client collecting every delivered result.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    results: Arc<Mutex<Vec<ClientResult>>>,
}

impl RecordingClient {
    pub fn results(&self) -> Vec<ClientResult> {
        self.results.lock().clone()
    }
}

impl ClientHandler for RecordingClient {
    fn deliver_result(&self, result: ClientResult) {
        self.results.lock().push(result);
    }
}

pub type SimOverlay = Overlay<RecordingTransport, Arc<MemoryRoutingTable>>;

/// One simulated peer and handles to its collaborators.
#[derive(Debug)]
pub struct SimPeer {
    pub overlay: SimOverlay,
    pub routing: Arc<MemoryRoutingTable>,
    pub store: Arc<MemoryBlockStore>,
    pub client: RecordingClient,
}

/// A frame played out by the network, decoded for assertions.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: PeerId,
    pub to: PeerId,
    pub message: OverlayMessage,
}

impl Delivery {
    pub fn kind(&self) -> MessageType {
        self.message.kind()
    }
}

/// In-memory network of overlays.
#[derive(Debug, Default)]
pub struct SimNetwork {
    peers: HashMap<PeerId, SimPeer>,
    requests: RequestQueue,
    delivered: Vec<Delivery>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a started peer.
    pub fn add_peer(&mut self, id: PeerId, config: OverlayConfig) -> &mut SimPeer {
        let routing = Arc::new(MemoryRoutingTable::new(config.routing_table_threshold));
        let store = Arc::new(MemoryBlockStore::new());
        let client = RecordingClient::default();
        let transport = RecordingTransport {
            me: id,
            requests: Arc::clone(&self.requests),
        };
        let mut overlay = Overlay::new(id, config, transport, Arc::clone(&routing))
            .with_block_store(Arc::clone(&store))
            .with_client(client.clone());
        overlay.init();

        self.peers.entry(id).or_insert(SimPeer {
            overlay,
            routing,
            store,
            client,
        })
    }

    /// Add peers at the given ring values with a fixed seed each.
    pub fn with_peers(values: &[u64]) -> Self {
        let mut network = Self::new();
        for (seed, value) in values.iter().enumerate() {
            network.add_peer(
                peer_at(*value),
                OverlayConfig::default().with_rng_seed(seed as u64),
            );
        }
        network
    }

    pub fn peer(&self, id: &PeerId) -> &SimPeer {
        self.peers
            .get(id)
            .unwrap_or_else(|| panic!("unknown simulated peer {id}"))
    }

    pub fn peer_mut(&mut self, id: &PeerId) -> &mut SimPeer {
        self.peers
            .get_mut(id)
            .unwrap_or_else(|| panic!("unknown simulated peer {id}"))
    }

    pub fn overlay(&self, id: &PeerId) -> &SimOverlay {
        &self.peer(id).overlay
    }

    pub fn overlay_mut(&mut self, id: &PeerId) -> &mut SimOverlay {
        &mut self.peer_mut(id).overlay
    }

    /// Make `a` and `b` friends of each other.
    pub fn connect(&mut self, a: PeerId, b: PeerId) {
        self.overlay_mut(&a).handle_friend_connected(b);
        self.overlay_mut(&b).handle_friend_connected(a);
    }

    pub fn disconnect(&mut self, a: PeerId, b: PeerId) {
        self.overlay_mut(&a).handle_friend_disconnected(b);
        self.overlay_mut(&b).handle_friend_disconnected(a);
    }

    /// Hand `message` to `to` as if `from` had sent it.
    pub fn inject(&mut self, from: PeerId, to: PeerId, message: impl Into<OverlayMessage>) {
        let message = message.into();
        let frame = encode_frame(&message).unwrap_or_else(|err| panic!("cannot encode: {err}"));
        self.overlay_mut(&to).handle_message(from, &frame);
    }

    /// Transmit requests not yet played out.
    pub fn pending_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Play out transmit requests until none are left. Returns how many
    /// frames were delivered.
    pub fn run_until_idle(&mut self) -> usize {
        let mut count = 0;
        while count < MAX_DELIVERIES {
            let Some((from, to, _size)) = self.requests.lock().pop_front() else {
                break;
            };
            let Some(sender) = self.peers.get_mut(&from) else {
                continue;
            };
            let frames = sender.overlay.on_transmit_ready(to, usize::MAX);
            for frame in frames {
                match decode_frame::<OverlayMessage>(&frame) {
                    Ok(message) => {
                        trace!(%from, %to, kind = %message.kind(), "delivering frame");
                        self.delivered.push(Delivery { from, to, message });
                    }
                    Err(err) => warn!(%from, %to, %err, "undecodable frame"),
                }
                if let Some(receiver) = self.peers.get_mut(&to) {
                    receiver.overlay.handle_message(from, &frame);
                }
                count += 1;
            }
        }
        count
    }

    pub fn delivered(&self) -> &[Delivery] {
        &self.delivered
    }

    /// Deliveries of one message type, in order.
    pub fn delivered_of(&self, kind: MessageType) -> Vec<&Delivery> {
        self.delivered.iter().filter(|d| d.kind() == kind).collect()
    }

    pub fn clear_delivered(&mut self) {
        self.delivered.clear();
    }
}
