//! PUT, GET and GET_RESULT routing, and the client entry points.

use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, trace};
use xvine_overlay_proto::{Get, GetResult, MessageType, Put, RouteOptions};
use xvine_primitives::{Direction, Key, PeerId, TrailId};

use super::Overlay;
use crate::{
    OverlayError,
    client::ClientResult,
    datacache::{BlockRecord, BlockVerdict},
    routing::RoutingTable,
    selector::ClosestPeer,
    trail::search_my_index,
    transport::FriendTransport,
};

impl<T: FriendTransport, R: RoutingTable> Overlay<T, R> {
    /// Store `payload` under `key` at the peer responsible for it.
    pub fn send_put(
        &mut self,
        key: Key,
        block_type: u32,
        options: RouteOptions,
        replication_level: u32,
        expiration: SystemTime,
        payload: Bytes,
    ) {
        let next = self.find_successor(key.ring_value(), false);
        if next.is_local(&self.me) {
            trace!(%key, "storing put locally");
            self.store.put(BlockRecord {
                key,
                block_type,
                expiration,
                put_path: Vec::new(),
                payload,
            });
            return;
        }

        let put = Put {
            options,
            block_type,
            hop_count: 0,
            replication_level,
            best_known_destination: next.best_known_destination,
            intermediate_trail_id: next.trail_id,
            expiration,
            key,
            put_path: Vec::new(),
            payload,
        };
        self.send(next.next_hop, put);
    }

    /// Look `key` up at the peer responsible for it. Results reach the
    /// client handler.
    pub fn send_get(&mut self, key: Key, block_type: u32, options: RouteOptions, replication_level: u32) {
        let next = self.find_successor(key.ring_value(), false);
        if next.is_local(&self.me) {
            trace!(%key, "answering get locally");
            for record in self.store.get(&key, block_type) {
                self.client.deliver_result(ClientResult {
                    expiration: record.expiration,
                    key,
                    get_path: vec![self.me],
                    put_path: record.put_path,
                    block_type: record.block_type,
                    payload: record.payload,
                });
            }
            return;
        }

        let get = Get {
            options,
            block_type,
            hop_count: 0,
            replication_level,
            best_known_destination: next.best_known_destination,
            intermediate_trail_id: next.trail_id,
            key,
            get_path: Vec::new(),
        };
        self.send(next.next_hop, get);
    }

    /// Send a found block back along `get_path`, which ends with the local
    /// peer.
    pub fn send_get_result(
        &mut self,
        key: Key,
        block_type: u32,
        expiration: SystemTime,
        put_path: Vec<PeerId>,
        get_path: Vec<PeerId>,
        payload: Bytes,
    ) {
        let Some(&querying_peer) = get_path.first() else {
            return;
        };
        let reply_to = get_path
            .len()
            .checked_sub(2)
            .and_then(|i| get_path.get(i).copied());

        let Some(reply_to) = reply_to else {
            self.client.deliver_result(ClientResult {
                expiration,
                key,
                get_path,
                put_path,
                block_type,
                payload,
            });
            return;
        };

        let result = GetResult {
            block_type,
            querying_peer,
            expiration,
            key,
            put_path,
            get_path,
            payload,
        };
        self.send(reply_to, result);
    }

    pub(super) fn handle_put(&mut self, from: PeerId, mut msg: Put) -> Result<(), OverlayError> {
        if self.validator.validate(msg.block_type, &msg.key, &msg.payload) == BlockVerdict::Invalid {
            return Err(OverlayError::InvalidMessage {
                peer: from,
                kind: MessageType::Put,
                reason: "block failed validation",
            });
        }

        if msg.options.contains(RouteOptions::RECORD_ROUTE) && msg.can_extend_path() {
            msg.put_path.push(from);
        } else {
            msg.put_path.clear();
        }
        msg.hop_count = msg.hop_count.saturating_add(1);

        let next = self.next_data_hop(msg.best_known_destination, msg.intermediate_trail_id, &msg.key)?;
        if next.is_local(&self.me) {
            debug!(key = %msg.key, hops = msg.hop_count, "storing put");
            self.store.put(BlockRecord {
                key: msg.key,
                block_type: msg.block_type,
                expiration: msg.expiration,
                put_path: msg.put_path,
                payload: msg.payload,
            });
            return Ok(());
        }

        msg.best_known_destination = next.best_known_destination;
        msg.intermediate_trail_id = next.trail_id;
        self.send(next.next_hop, msg);
        Ok(())
    }

    pub(super) fn handle_get(&mut self, from: PeerId, mut msg: Get) -> Result<(), OverlayError> {
        if !msg.can_extend_path() {
            return Err(OverlayError::InvalidMessage {
                peer: from,
                kind: MessageType::Get,
                reason: "get path full",
            });
        }
        msg.get_path.push(from);
        msg.hop_count = msg.hop_count.saturating_add(1);

        let next = self.next_data_hop(msg.best_known_destination, msg.intermediate_trail_id, &msg.key)?;
        if next.is_local(&self.me) {
            debug!(key = %msg.key, hops = msg.hop_count, "answering get");
            let mut get_path = msg.get_path;
            get_path.push(self.me);
            for record in self.store.get(&msg.key, msg.block_type) {
                self.send_get_result(
                    msg.key,
                    record.block_type,
                    record.expiration,
                    record.put_path,
                    get_path.clone(),
                    record.payload,
                );
            }
            return Ok(());
        }

        msg.best_known_destination = next.best_known_destination;
        msg.intermediate_trail_id = next.trail_id;
        self.send(next.next_hop, msg);
        Ok(())
    }

    pub(super) fn handle_get_result(&mut self, from: PeerId, msg: GetResult) -> Result<(), OverlayError> {
        let i = search_my_index(&msg.get_path, &self.me).ok_or(OverlayError::InvalidMessage {
            peer: from,
            kind: MessageType::GetResult,
            reason: "local peer not on get path",
        })?;

        match i.checked_sub(1).and_then(|prev| msg.get_path.get(prev).copied()) {
            Some(prev_hop) => self.send(prev_hop, msg),
            None => {
                trace!(key = %msg.key, "delivering get result");
                self.client.deliver_result(ClientResult {
                    expiration: msg.expiration,
                    key: msg.key,
                    get_path: msg.get_path,
                    put_path: msg.put_path,
                    block_type: msg.block_type,
                    payload: msg.payload,
                });
            }
        }
        Ok(())
    }

    /// Next hop for a data message in flight.
    ///
    /// A message whose best known destination is another peer stays on the
    /// trail it travels; otherwise the local tables pick the next hop.
    fn next_data_hop(
        &self,
        best_known_destination: PeerId,
        intermediate_trail_id: TrailId,
        key: &Key,
    ) -> Result<ClosestPeer, OverlayError> {
        if best_known_destination != self.me && !intermediate_trail_id.is_zero() {
            let direction = Direction::SrcToDest;
            let next_hop = self
                .routing
                .get_next_hop(&intermediate_trail_id, direction)
                .ok_or(OverlayError::RoutingMiss {
                    trail_id: intermediate_trail_id,
                    direction,
                })?;
            return Ok(ClosestPeer {
                next_hop,
                best_known_destination,
                trail_id: intermediate_trail_id,
            });
        }
        Ok(self.find_successor(key.ring_value(), false))
    }
}
