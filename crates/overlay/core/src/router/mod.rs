//! Message router: the overlay state machine.
//!
//! [`Overlay`] owns the friend and finger tables and reacts to four kinds of
//! events: inbound frames, friend connect/disconnect notifications,
//! transmit-ready callbacks and maintenance timers. Handlers never block; every
//! outbound message is queued on the friend table and the transport is asked
//! for a transmit-ready callback.

use bytes::Bytes;
use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, trace, warn};
use web_time::Instant;
use xvine_net_codec::{decode_frame, encode_frame};
use xvine_overlay_proto::OverlayMessage;
use xvine_primitives::{PeerId, RingValue};

use crate::{
    OverlayConfig, OverlayError, OverlayStats,
    client::{ClientHandler, NoopClient},
    datacache::{AcceptAll, BlockStore, BlockValidator, MemoryBlockStore},
    fingers::FingerTable,
    friends::{FriendTable, PendingMessage, Priority},
    maintenance::{Maintenance, jittered},
    metrics::OverlayMetrics,
    routing::RoutingTable,
    selector::{ClosestPeer, find_successor},
    transport::FriendTransport,
};

mod data;
mod ring;
mod setup;
mod teardown;

/// The overlay routing core of one peer.
pub struct Overlay<T, R> {
    me: PeerId,
    config: OverlayConfig,
    friends: FriendTable,
    fingers: FingerTable,
    routing: R,
    transport: T,
    store: Box<dyn BlockStore>,
    client: Box<dyn ClientHandler>,
    validator: Box<dyn BlockValidator>,
    maintenance: Maintenance,
    rng: StdRng,
    metrics: OverlayMetrics,
    running: bool,
}

impl<T, R> std::fmt::Debug for Overlay<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("me", &self.me)
            .field("friends", &self.friends.len())
            .field("fingers", &self.fingers.len())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    /// Create the overlay for `me`. Call [`Overlay::init`] to start it.
    pub fn new(me: PeerId, config: OverlayConfig, transport: T, routing: R) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            me,
            friends: FriendTable::new(
                config.max_pending_per_friend,
                config.trails_through_friend_threshold,
            ),
            fingers: FingerTable::new(),
            routing,
            transport,
            store: Box::new(MemoryBlockStore::new()),
            client: Box::new(NoopClient),
            validator: Box::new(AcceptAll),
            maintenance: Maintenance::default(),
            rng,
            metrics: OverlayMetrics::default(),
            running: false,
            config,
        }
    }

    pub fn with_block_store(mut self, store: impl BlockStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_client(mut self, client: impl ClientHandler + 'static) -> Self {
        self.client = Box::new(client);
        self
    }

    pub fn with_validator(mut self, validator: impl BlockValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.me
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn friends(&self) -> &FriendTable {
        &self.friends
    }

    pub fn fingers(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn routing(&self) -> &R {
        &self.routing
    }

    pub fn stats(&self) -> OverlayStats {
        self.metrics.stats()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the overlay. Maintenance begins once a friend is known.
    pub fn init(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(me = %self.me, "overlay started");
        if !self.friends.is_empty() {
            self.maintenance
                .start(Instant::now(), self.config.verify_successor_interval);
        }
    }

    /// Stop maintenance, drop every queue and clear all tables.
    pub fn shutdown(&mut self) {
        self.running = false;
        self.maintenance.cancel();
        self.friends.clear();
        self.fingers.clear();
        info!(me = %self.me, "overlay stopped");
    }

    /// When [`Overlay::on_timer`] next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.maintenance.next_deadline()
    }

    /// Run maintenance that is due at `now`.
    pub fn on_timer(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        if self.maintenance.take_due_find_finger(now) {
            self.send_find_finger_trail();
            let delay = jittered(&mut self.rng, self.config.find_finger_trail_interval);
            self.maintenance.schedule_find_finger(now + delay);
        }
        if self.maintenance.take_due_verify(now) {
            self.verify_successor();
            self.maintenance
                .schedule_verify(now + self.config.verify_successor_interval);
        }
    }

    /// Closest known peer to `target`.
    pub fn find_successor(&self, target: RingValue, is_predecessor: bool) -> ClosestPeer {
        find_successor(
            self.me,
            &self.friends,
            &self.fingers,
            target,
            is_predecessor,
            Instant::now(),
        )
    }

    /// A peer became directly reachable.
    pub fn handle_friend_connected(&mut self, peer: PeerId) {
        if peer == self.me || !self.friends.add_friend(peer) {
            return;
        }
        self.metrics.inc_friends_connected();
        info!(%peer, friends = self.friends.len(), "friend connected");
        if self.running && self.friends.len() == 1 {
            self.maintenance
                .start(Instant::now(), self.config.verify_successor_interval);
        }
    }

    /// A friend went away: drop every finger and trail that depends on it.
    pub fn handle_friend_disconnected(&mut self, peer: PeerId) {
        if !self.friends.contains(&peer) {
            return;
        }

        self.friends.remove_friend(&peer);
        let removed = self
            .fingers
            .remove_where(|finger| finger.identity == peer || finger.first_hops().any(|hop| hop == peer));
        for finger in removed {
            debug!(finger = %finger.identity, index = finger.index, "finger lost with friend");
            self.release_finger(finger);
        }
        let trails = self.routing.remove_trails_by_peer(&peer);
        info!(%peer, trails, friends = self.friends.len(), "friend disconnected");

        if self.friends.is_empty() {
            self.maintenance.cancel();
        }
    }

    /// Handle one frame received from `from`.
    pub fn handle_message(&mut self, from: PeerId, frame: &[u8]) {
        self.metrics.inc_messages_received();
        if let Err(err) = self.receive(from, frame) {
            self.record_error(&err);
        }
    }

    fn receive(&mut self, from: PeerId, frame: &[u8]) -> Result<(), OverlayError> {
        if !self.friends.contains(&from) {
            return Err(OverlayError::UnknownFriend { peer: from });
        }
        let message: OverlayMessage =
            decode_frame(frame).map_err(|source| OverlayError::Malformed { peer: from, source })?;
        trace!(%from, kind = %message.kind(), "received message");

        match message {
            OverlayMessage::Put(msg) => self.handle_put(from, msg),
            OverlayMessage::Get(msg) => self.handle_get(from, msg),
            OverlayMessage::GetResult(msg) => self.handle_get_result(from, msg),
            OverlayMessage::TrailSetup(msg) => self.handle_trail_setup(from, msg),
            OverlayMessage::TrailSetupResult(msg) => self.handle_trail_setup_result(from, msg),
            OverlayMessage::TrailRejection(msg) => self.handle_trail_rejection(from, msg),
            OverlayMessage::VerifySuccessor(msg) => self.handle_verify_successor(from, msg),
            OverlayMessage::VerifySuccessorResult(msg) => {
                self.handle_verify_successor_result(from, msg)
            }
            OverlayMessage::NotifyNewSuccessor(msg) => self.handle_notify_new_successor(from, msg),
            OverlayMessage::TrailCompression(msg) => self.handle_trail_compression(from, msg),
            OverlayMessage::TrailTeardown(msg) => self.handle_trail_teardown(from, msg),
            OverlayMessage::AddTrail(msg) => self.handle_add_trail(from, msg),
        }
    }

    /// The transport can take up to `capacity` bytes for `peer`.
    ///
    /// Returns the frames to transmit, oldest first.
    pub fn on_transmit_ready(&mut self, peer: PeerId, capacity: usize) -> Vec<Bytes> {
        let drained = self.friends.drain_ready(&peer, capacity, Instant::now());
        if drained.expired > 0 {
            debug!(%peer, expired = drained.expired, "dropped expired messages");
            self.metrics.add_messages_expired(drained.expired);
        }
        let bytes: usize = drained.frames.iter().map(Bytes::len).sum();
        self.metrics.add_bytes_transmitted(bytes as u64);
        if let Some(size) = drained.request_transmit {
            self.transport.request_transmit(&peer, size);
        }
        drained.frames
    }

    /// Queue `message` for the friend `to`. Failures are counted, not returned.
    pub(crate) fn send(&mut self, to: PeerId, message: impl Into<OverlayMessage>) {
        let message = message.into();
        let kind = message.kind();
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(source) => {
                self.record_error(&OverlayError::Encode { kind, source });
                return;
            }
        };

        let pending = PendingMessage {
            frame,
            expires_at: Instant::now() + self.config.get_timeout,
            priority: Priority::for_message(kind),
        };
        match self.friends.enqueue(&to, pending) {
            Ok(enqueued) => {
                trace!(%to, %kind, "queued message");
                if enqueued.evicted {
                    debug!(%to, "evicted queued message to make room");
                    self.metrics.inc_queue_overflows();
                }
                if let Some(size) = enqueued.request_transmit {
                    self.transport.request_transmit(&to, size);
                }
            }
            Err(err) => self.record_error(&err),
        }
    }

    /// Count and log a failure. Nothing here is fatal.
    fn record_error(&mut self, err: &OverlayError) {
        match err {
            OverlayError::Malformed { .. }
            | OverlayError::InvalidMessage { .. }
            | OverlayError::Encode { .. } => {
                warn!(%err, "dropping message");
                self.metrics.inc_messages_malformed();
            }
            OverlayError::RoutingMiss { .. }
            | OverlayError::UnknownFriend { .. }
            | OverlayError::NotOnTrail { .. }
            | OverlayError::UnexpectedSender { .. }
            | OverlayError::TrailLoop { .. } => {
                debug!(%err, "dropping message");
                self.metrics.inc_routing_misses();
            }
            OverlayError::QueueOverflow { .. } => {
                debug!(%err, "dropping message");
                self.metrics.inc_queue_overflows();
            }
            OverlayError::DuplicateTrail { .. } => {
                debug!(%err, "ignoring trail");
                self.metrics.inc_duplicate_trails();
            }
            OverlayError::Congested { .. } => debug!(%err, "trail not admitted"),
            OverlayError::InvalidFingerIndex { .. } | OverlayError::ServiceStopped => {
                debug!(%err, "ignoring event")
            }
        }
    }
}
