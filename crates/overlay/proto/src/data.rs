//! PUT, GET and GET_RESULT.

use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use xvine_net_codec::{
    CodecError, WireReader,
    utils::{micros_to_system_time, system_time_to_micros},
};
use xvine_primitives::{KEY_LEN, Key, PEER_ID_LEN, PeerId, TRAIL_ID_LEN, TrailId};

use crate::{
    Body, RouteOptions, max_path_len, peers_len, put_key, put_peer, put_peers, put_trail_id,
    read_key, read_path, read_peer, read_trail_id,
};

/// Store a block at the peer responsible for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub options: RouteOptions,
    pub block_type: u32,
    pub hop_count: u32,
    pub replication_level: u32,
    /// Peer the sender believes is responsible for `key`.
    pub best_known_destination: PeerId,
    /// Trail toward `best_known_destination`, zero when it is a friend.
    pub intermediate_trail_id: TrailId,
    pub expiration: SystemTime,
    pub key: Key,
    /// Peers the PUT traversed, recorded only with [`RouteOptions::RECORD_ROUTE`].
    pub put_path: Vec<PeerId>,
    pub payload: Bytes,
}

impl Put {
    /// Whether one more path entry still fits in a frame.
    pub fn can_extend_path(&self) -> bool {
        self.put_path.len() < max_path_len(Self::FIXED_LEN + self.payload.len())
    }
}

impl Body for Put {
    const FIXED_LEN: usize = 5 * 4 + PEER_ID_LEN + TRAIL_ID_LEN + 8 + KEY_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.put_path) + self.payload.len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.options.bits());
        dst.put_u32(self.block_type);
        dst.put_u32(self.hop_count);
        dst.put_u32(self.replication_level);
        dst.put_u32(self.put_path.len() as u32);
        put_peer(dst, &self.best_known_destination);
        put_trail_id(dst, &self.intermediate_trail_id);
        dst.put_u64(system_time_to_micros(self.expiration));
        put_key(dst, &self.key);
        put_peers(dst, &self.put_path);
        dst.put_slice(&self.payload);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let options = RouteOptions::from(r.read_u32()?);
        let block_type = r.read_u32()?;
        let hop_count = r.read_u32()?;
        let replication_level = r.read_u32()?;
        let path_len = r.read_u32()?;
        let best_known_destination = read_peer(r)?;
        let intermediate_trail_id = read_trail_id(r)?;
        let expiration = micros_to_system_time(r.read_u64()?);
        let key = read_key(r)?;
        let put_path = read_path(r, "put_path_length", path_len, max_path_len(Self::FIXED_LEN))?;
        let payload = Bytes::copy_from_slice(r.rest());
        Ok(Self {
            options,
            block_type,
            hop_count,
            replication_level,
            best_known_destination,
            intermediate_trail_id,
            expiration,
            key,
            put_path,
            payload,
        })
    }
}

/// Look up `key` at the peer responsible for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub options: RouteOptions,
    pub block_type: u32,
    pub hop_count: u32,
    pub replication_level: u32,
    pub best_known_destination: PeerId,
    pub intermediate_trail_id: TrailId,
    pub key: Key,
    /// Peers the GET traversed, always recorded so results can walk back.
    pub get_path: Vec<PeerId>,
}

impl Get {
    pub fn can_extend_path(&self) -> bool {
        self.get_path.len() < max_path_len(Self::FIXED_LEN)
    }
}

impl Body for Get {
    const FIXED_LEN: usize = 5 * 4 + PEER_ID_LEN + TRAIL_ID_LEN + KEY_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.get_path)
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.options.bits());
        dst.put_u32(self.block_type);
        dst.put_u32(self.hop_count);
        dst.put_u32(self.replication_level);
        dst.put_u32(self.get_path.len() as u32);
        put_peer(dst, &self.best_known_destination);
        put_trail_id(dst, &self.intermediate_trail_id);
        put_key(dst, &self.key);
        put_peers(dst, &self.get_path);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let options = RouteOptions::from(r.read_u32()?);
        let block_type = r.read_u32()?;
        let hop_count = r.read_u32()?;
        let replication_level = r.read_u32()?;
        let path_len = r.read_u32()?;
        let best_known_destination = read_peer(r)?;
        let intermediate_trail_id = read_trail_id(r)?;
        let key = read_key(r)?;
        let get_path = read_path(r, "get_path_length", path_len, max_path_len(Self::FIXED_LEN))?;
        Ok(Self {
            options,
            block_type,
            hop_count,
            replication_level,
            best_known_destination,
            intermediate_trail_id,
            key,
            get_path,
        })
    }
}

/// One record answering a GET, retracing the GET path toward the querier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub block_type: u32,
    pub querying_peer: PeerId,
    pub expiration: SystemTime,
    pub key: Key,
    pub put_path: Vec<PeerId>,
    pub get_path: Vec<PeerId>,
    pub payload: Bytes,
}

impl Body for GetResult {
    const FIXED_LEN: usize = 3 * 4 + PEER_ID_LEN + 8 + KEY_LEN;

    fn trailer_len(&self) -> usize {
        peers_len(&self.put_path) + peers_len(&self.get_path) + self.payload.len()
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.block_type);
        dst.put_u32(self.put_path.len() as u32);
        dst.put_u32(self.get_path.len() as u32);
        put_peer(dst, &self.querying_peer);
        dst.put_u64(system_time_to_micros(self.expiration));
        put_key(dst, &self.key);
        put_peers(dst, &self.put_path);
        put_peers(dst, &self.get_path);
        dst.put_slice(&self.payload);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let max = max_path_len(Self::FIXED_LEN);
        let block_type = r.read_u32()?;
        let put_len = r.read_u32()?;
        let get_len = r.read_u32()?;
        if put_len as usize + get_len as usize > max {
            return Err(CodecError::InvalidField {
                field: "get_path_length",
                value: get_len,
            });
        }
        let querying_peer = read_peer(r)?;
        let expiration = micros_to_system_time(r.read_u64()?);
        let key = read_key(r)?;
        let put_path = read_path(r, "put_path_length", put_len, max)?;
        let get_path = read_path(r, "get_path_length", get_len, max)?;
        let payload = Bytes::copy_from_slice(r.rest());
        Ok(Self {
            block_type,
            querying_peer,
            expiration,
            key,
            put_path,
            get_path,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        OverlayMessage,
        tests::{peer, trail_id},
    };
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use xvine_net_codec::{decode_frame, encode_frame};

    fn sample_put(path: Vec<PeerId>, payload: &'static [u8]) -> Put {
        Put {
            options: RouteOptions::RECORD_ROUTE,
            block_type: 8,
            hop_count: 2,
            replication_level: 3,
            best_known_destination: peer(9),
            intermediate_trail_id: trail_id(7),
            expiration: micros_to_system_time(1_800_000_000_000_000),
            key: Key::new([5; 64]),
            put_path: path,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_put_layout() {
        let put = sample_put(vec![peer(1), peer(2)], b"hello");
        let frame = encode_frame(&OverlayMessage::from(put.clone())).unwrap();
        assert_eq!(frame.len(), 4 + 156 + 64 + 5);
        // put_path_length sits after four u32 fields
        assert_eq!(&frame[4 + 16..4 + 20], &2u32.to_be_bytes());
        assert_eq!(decode_frame::<OverlayMessage>(&frame).unwrap(), OverlayMessage::Put(put));
    }

    #[test]
    fn test_put_declared_path_longer_than_body() {
        let put = sample_put(vec![peer(1)], b"");
        let mut frame = encode_frame(&OverlayMessage::from(put)).unwrap().to_vec();
        frame[4 + 16..4 + 20].copy_from_slice(&3u32.to_be_bytes());
        assert_matches!(
            decode_frame::<OverlayMessage>(&frame),
            Err(CodecError::Truncated { .. })
        );
    }

    #[test]
    fn test_put_path_length_above_maximum() {
        let put = sample_put(vec![], b"");
        let mut frame = encode_frame(&OverlayMessage::from(put)).unwrap().to_vec();
        frame[4 + 16..4 + 20].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_matches!(
            decode_frame::<OverlayMessage>(&frame),
            Err(CodecError::InvalidField { field: "put_path_length", .. })
        );
    }

    #[test]
    fn test_get_trailer_must_match_declared_count() {
        let get = Get {
            options: RouteOptions::NONE,
            block_type: 1,
            hop_count: 0,
            replication_level: 1,
            best_known_destination: peer(3),
            intermediate_trail_id: TrailId::ZERO,
            key: Key::new([1; 64]),
            get_path: vec![peer(1)],
        };
        let mut frame = encode_frame(&OverlayMessage::from(get.clone())).unwrap().to_vec();
        assert_eq!(decode_frame::<OverlayMessage>(&frame).unwrap(), OverlayMessage::Get(get));

        frame.extend_from_slice(&[0; 32]);
        let size = (frame.len() as u16).to_be_bytes();
        frame[..2].copy_from_slice(&size);
        assert_matches!(
            decode_frame::<OverlayMessage>(&frame),
            Err(CodecError::TrailingBytes(32))
        );
    }

    #[test]
    fn test_get_result_paths_and_payload() {
        let result = GetResult {
            block_type: 8,
            querying_peer: peer(1),
            expiration: micros_to_system_time(42),
            key: Key::new([2; 64]),
            put_path: vec![peer(4)],
            get_path: vec![peer(1), peer(2), peer(3)],
            payload: Bytes::from_static(b"block"),
        };
        let frame = encode_frame(&OverlayMessage::from(result.clone())).unwrap();
        assert_eq!(frame.len(), 4 + 116 + 4 * 32 + 5);
        assert_eq!(
            decode_frame::<OverlayMessage>(&frame).unwrap(),
            OverlayMessage::GetResult(result)
        );
    }

    #[test]
    fn test_put_can_extend_path_near_frame_limit() {
        let payload: &'static [u8] = Box::leak(vec![0u8; 60_000].into_boxed_slice());
        let mut put = sample_put(vec![], payload);
        let room = max_path_len(Put::FIXED_LEN + payload.len());
        put.put_path = vec![peer(1); room];
        assert!(!put.can_extend_path());
        assert!(encode_frame(&OverlayMessage::from(put.clone())).is_ok());
        put.put_path.pop();
        assert!(put.can_extend_path());
    }

    proptest! {
        #[test]
        fn test_truncated_get_never_panics(cut in 0usize..300) {
            let get = Get {
                options: RouteOptions::NONE,
                block_type: 1,
                hop_count: 0,
                replication_level: 1,
                best_known_destination: peer(3),
                intermediate_trail_id: TrailId::ZERO,
                key: Key::new([1; 64]),
                get_path: vec![peer(1), peer(2)],
            };
            let frame = encode_frame(&OverlayMessage::from(get)).unwrap();
            let cut = cut.min(frame.len());
            let mut partial = frame[..cut].to_vec();
            if partial.len() >= 2 {
                let size = (partial.len() as u16).to_be_bytes();
                partial[..2].copy_from_slice(&size);
            }
            let decoded = decode_frame::<OverlayMessage>(&partial);
            prop_assert_eq!(decoded.is_ok(), cut == frame.len());
        }
    }
}
