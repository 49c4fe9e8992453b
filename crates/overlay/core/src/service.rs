//! Tokio driver for the overlay.
//!
//! [`OverlayService`] owns an [`Overlay`] and runs it on a single task: commands
//! arrive over an unbounded channel, maintenance runs when its deadline
//! passes, and everything the overlay wants from the outside world (transmit
//! requests, results for the local client) leaves as [`OverlayEvent`]s.

use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use web_time::Instant;
use xvine_overlay_proto::RouteOptions;
use xvine_primitives::{Key, PeerId};

use crate::{
    Overlay, OverlayConfig, OverlayError, OverlayStats,
    client::{ClientHandler, ClientResult},
    datacache::{BlockStore, BlockValidator},
    routing::RoutingTable,
    transport::FriendTransport,
};

/// Requests accepted by the service.
#[derive(Debug)]
pub enum OverlayCommand {
    FriendConnected(PeerId),
    FriendDisconnected(PeerId),
    /// A frame arrived from a friend.
    Inbound { from: PeerId, frame: Bytes },
    /// The transport can take `capacity` bytes for `peer`.
    TransmitReady {
        peer: PeerId,
        capacity: usize,
        reply: oneshot::Sender<Vec<Bytes>>,
    },
    ClientPut {
        key: Key,
        block_type: u32,
        options: RouteOptions,
        replication_level: u32,
        expiration: SystemTime,
        payload: Bytes,
    },
    ClientGet {
        key: Key,
        block_type: u32,
        options: RouteOptions,
        replication_level: u32,
    },
    Snapshot(oneshot::Sender<RingSnapshot>),
    Shutdown,
}

/// Output of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// Call [`OverlayHandle::transmit_ready`] for `peer` once `size` bytes fit.
    TransmitRequest { peer: PeerId, size: usize },
    /// A GET issued through this service found a block.
    Result(ClientResult),
}

/// Point-in-time view of the local ring state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSnapshot {
    pub me: PeerId,
    pub successor: Option<PeerId>,
    pub predecessor: Option<PeerId>,
    /// `(slot, identity, stored trails)` for every occupied slot.
    pub fingers: Vec<(u8, PeerId, usize)>,
    pub friends: usize,
    pub stats: OverlayStats,
}

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            me: self.local_peer_id(),
            successor: self.fingers().successor().map(|finger| finger.identity),
            predecessor: self.fingers().predecessor().map(|finger| finger.identity),
            fingers: self
                .fingers()
                .iter()
                .map(|finger| (finger.index, finger.identity, finger.trails.len()))
                .collect(),
            friends: self.friends().len(),
            stats: self.stats(),
        }
    }
}

/// Transport that turns transmit requests into [`OverlayEvent`]s.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    event_tx: mpsc::UnboundedSender<OverlayEvent>,
}

impl FriendTransport for ChannelTransport {
    fn request_transmit(&self, peer: &PeerId, size: usize) {
        let _ = self.event_tx.send(OverlayEvent::TransmitRequest { peer: *peer, size });
    }
}

/// Client handler that turns results into [`OverlayEvent`]s.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    event_tx: mpsc::UnboundedSender<OverlayEvent>,
}

impl ClientHandler for ChannelClient {
    fn deliver_result(&self, result: ClientResult) {
        let _ = self.event_tx.send(OverlayEvent::Result(result));
    }
}

/// Cloneable handle to a running [`OverlayService`].
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    command_tx: mpsc::UnboundedSender<OverlayCommand>,
}

impl OverlayHandle {
    pub fn send_command(&self, command: OverlayCommand) -> Result<(), OverlayError> {
        self.command_tx
            .send(command)
            .map_err(|_| OverlayError::ServiceStopped)
    }

    pub fn friend_connected(&self, peer: PeerId) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::FriendConnected(peer))
    }

    pub fn friend_disconnected(&self, peer: PeerId) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::FriendDisconnected(peer))
    }

    pub fn inbound(&self, from: PeerId, frame: Bytes) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::Inbound { from, frame })
    }

    /// Collect the frames queued for `peer` that fit in `capacity` bytes.
    pub async fn transmit_ready(&self, peer: PeerId, capacity: usize) -> Result<Vec<Bytes>, OverlayError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(OverlayCommand::TransmitReady {
            peer,
            capacity,
            reply,
        })?;
        rx.await.map_err(|_| OverlayError::ServiceStopped)
    }

    pub fn put(
        &self,
        key: Key,
        block_type: u32,
        expiration: SystemTime,
        payload: Bytes,
    ) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::ClientPut {
            key,
            block_type,
            options: RouteOptions::RECORD_ROUTE,
            replication_level: 1,
            expiration,
            payload,
        })
    }

    pub fn get(&self, key: Key, block_type: u32) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::ClientGet {
            key,
            block_type,
            options: RouteOptions::NONE,
            replication_level: 1,
        })
    }

    pub async fn snapshot(&self) -> Result<RingSnapshot, OverlayError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(OverlayCommand::Snapshot(reply))?;
        rx.await.map_err(|_| OverlayError::ServiceStopped)
    }

    pub fn shutdown(&self) -> Result<(), OverlayError> {
        self.send_command(OverlayCommand::Shutdown)
    }
}

/// Runs one overlay peer on a tokio task.
#[derive(Debug)]
pub struct OverlayService<R> {
    overlay: Overlay<ChannelTransport, R>,
    command_rx: mpsc::UnboundedReceiver<OverlayCommand>,
}

impl<R: RoutingTable> OverlayService<R> {
    /// Returns the service, a handle to drive it and the event stream.
    pub fn new(
        me: PeerId,
        config: OverlayConfig,
        routing: R,
    ) -> (Self, OverlayHandle, mpsc::UnboundedReceiver<OverlayEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = ChannelTransport {
            event_tx: event_tx.clone(),
        };
        let overlay = Overlay::new(me, config, transport, routing).with_client(ChannelClient { event_tx });

        (
            Self {
                overlay,
                command_rx,
            },
            OverlayHandle { command_tx },
            event_rx,
        )
    }

    pub fn with_block_store(mut self, store: impl BlockStore + 'static) -> Self {
        self.overlay = self.overlay.with_block_store(store);
        self
    }

    pub fn with_validator(mut self, validator: impl BlockValidator + 'static) -> Self {
        self.overlay = self.overlay.with_validator(validator);
        self
    }

    /// Consume self and run as a spawnable future.
    pub async fn into_task(self) {
        self.run().await;
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        self.overlay.init();
        loop {
            let deadline = self.overlay.next_deadline();
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(OverlayCommand::Shutdown) | None => break,
                    Some(command) => self.process_command(command),
                },
                _ = sleep_until(deadline) => {
                    self.overlay.on_timer(Instant::now());
                }
            }
        }
        self.overlay.shutdown();
        debug!(me = %self.overlay.local_peer_id(), "overlay service stopped");
    }

    fn process_command(&mut self, command: OverlayCommand) {
        match command {
            OverlayCommand::FriendConnected(peer) => self.overlay.handle_friend_connected(peer),
            OverlayCommand::FriendDisconnected(peer) => self.overlay.handle_friend_disconnected(peer),
            OverlayCommand::Inbound { from, frame } => self.overlay.handle_message(from, &frame),
            OverlayCommand::TransmitReady {
                peer,
                capacity,
                reply,
            } => {
                let frames = self.overlay.on_transmit_ready(peer, capacity);
                let _ = reply.send(frames);
            }
            OverlayCommand::ClientPut {
                key,
                block_type,
                options,
                replication_level,
                expiration,
                payload,
            } => self
                .overlay
                .send_put(key, block_type, options, replication_level, expiration, payload),
            OverlayCommand::ClientGet {
                key,
                block_type,
                options,
                replication_level,
            } => self.overlay.send_get(key, block_type, options, replication_level),
            OverlayCommand::Snapshot(reply) => {
                let _ = reply.send(self.overlay.snapshot());
            }
            OverlayCommand::Shutdown => {}
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
