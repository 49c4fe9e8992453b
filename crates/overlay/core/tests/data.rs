//! PUT and GET routing over fingers and trails.

use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use bytes::Bytes;
use xvine_overlay::{BLOCK_TYPE_ANY, BlockStore};
use xvine_overlay_proto::{Get, MessageType, OverlayMessage, Put, RouteOptions};
use xvine_primitives::TrailId;
use xvine_test_utils::{SimNetwork, init_tracing, key_at, peer_at};

const BLOCK_TYPE: u32 = 8;

/// A(100) - B(50) - C(300), with A holding C as finger 7 over B.
fn network_with_finger() -> SimNetwork {
    init_tracing();
    let mut network = SimNetwork::with_peers(&[100, 50, 300]);
    network.connect(peer_at(100), peer_at(50));
    network.connect(peer_at(50), peer_at(300));
    network.overlay_mut(&peer_at(100)).discover_finger(7);
    network.run_until_idle();
    network.clear_delivered();
    network
}

fn expiration() -> SystemTime {
    SystemTime::now() + Duration::from_secs(600)
}

#[test]
fn test_put_follows_trail_and_records_route() {
    let (a, b, c) = (peer_at(100), peer_at(50), peer_at(300));
    let mut network = network_with_finger();
    let key = key_at(250);

    network.overlay_mut(&a).send_put(
        key,
        BLOCK_TYPE,
        RouteOptions::RECORD_ROUTE,
        1,
        expiration(),
        Bytes::from_static(b"hello"),
    );
    network.run_until_idle();

    let puts = network.delivered_of(MessageType::Put);
    assert_eq!(puts.len(), 2);
    assert_eq!((puts[0].from, puts[0].to), (a, b));
    assert_eq!((puts[1].from, puts[1].to), (b, c));
    assert_matches!(&puts[1].message, OverlayMessage::Put(put) => {
        assert_eq!(put.best_known_destination, c);
        assert_eq!(put.hop_count, 1);
    });

    let stored = network.peer(&c).store.get(&key, BLOCK_TYPE);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].put_path, vec![a, b]);
    assert_eq!(stored[0].payload, Bytes::from_static(b"hello"));
    assert!(network.peer(&b).store.is_empty());
}

#[test]
fn test_put_without_record_route_keeps_empty_path() {
    let (a, c) = (peer_at(100), peer_at(300));
    let mut network = network_with_finger();
    let key = key_at(250);

    network.overlay_mut(&a).send_put(
        key,
        BLOCK_TYPE,
        RouteOptions::NONE,
        1,
        expiration(),
        Bytes::from_static(b"hello"),
    );
    network.run_until_idle();

    let stored = network.peer(&c).store.get(&key, BLOCK_TYPE);
    assert_eq!(stored.len(), 1);
    assert!(stored[0].put_path.is_empty());
}

#[test]
fn test_get_round_trip() {
    let (a, b, c) = (peer_at(100), peer_at(50), peer_at(300));
    let mut network = network_with_finger();
    let key = key_at(250);

    network.overlay_mut(&a).send_put(
        key,
        BLOCK_TYPE,
        RouteOptions::RECORD_ROUTE,
        1,
        expiration(),
        Bytes::from_static(b"block"),
    );
    network.run_until_idle();
    network.clear_delivered();

    network
        .overlay_mut(&a)
        .send_get(key, BLOCK_TYPE_ANY, RouteOptions::NONE, 1);
    network.run_until_idle();

    let gets = network.delivered_of(MessageType::Get);
    assert_eq!(gets.len(), 2);
    assert_eq!((gets[1].from, gets[1].to), (b, c));
    assert_matches!(&gets[1].message, OverlayMessage::Get(get) => {
        assert_eq!(get.get_path, vec![a]);
        assert_eq!(get.hop_count, 1);
    });

    let results = network.delivered_of(MessageType::GetResult);
    let hops: Vec<_> = results.iter().map(|d| (d.from, d.to)).collect();
    assert_eq!(hops, vec![(c, b), (b, a)]);

    let delivered = network.peer(&a).client.results();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].key, key);
    assert_eq!(delivered[0].get_path, vec![a, b, c]);
    assert_eq!(delivered[0].put_path, vec![a, b]);
    assert_eq!(delivered[0].block_type, BLOCK_TYPE);
    assert_eq!(delivered[0].payload, Bytes::from_static(b"block"));
}

#[test]
fn test_local_put_and_get() {
    init_tracing();
    let a = peer_at(100);
    let mut network = SimNetwork::with_peers(&[100]);
    let key = key_at(42);

    network.overlay_mut(&a).send_put(
        key,
        BLOCK_TYPE,
        RouteOptions::RECORD_ROUTE,
        1,
        expiration(),
        Bytes::from_static(b"mine"),
    );
    network
        .overlay_mut(&a)
        .send_get(key, BLOCK_TYPE, RouteOptions::NONE, 1);

    assert_eq!(network.pending_requests(), 0);
    let delivered = network.peer(&a).client.results();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].get_path, vec![a]);
}

#[test]
fn test_get_on_unknown_trail_is_dropped() {
    init_tracing();
    let (a, b) = (peer_at(100), peer_at(50));
    let mut network = SimNetwork::with_peers(&[100, 50]);
    network.connect(a, b);

    network.inject(
        a,
        b,
        Get {
            options: RouteOptions::NONE,
            block_type: BLOCK_TYPE,
            hop_count: 0,
            replication_level: 1,
            best_known_destination: peer_at(300),
            intermediate_trail_id: TrailId::new([9; 32]),
            key: key_at(250),
            get_path: vec![],
        },
    );

    assert_eq!(network.pending_requests(), 0);
    assert_eq!(network.overlay(&b).stats().routing_misses, 1);
}

#[test]
fn test_rejected_block_is_not_stored() {
    use xvine_overlay::{
        BlockValidator, BlockVerdict, FriendTransport, MemoryRoutingTable, Overlay, OverlayConfig,
    };
    use xvine_primitives::{Key, PeerId};

    struct Silent;

    impl FriendTransport for Silent {
        fn request_transmit(&self, _peer: &PeerId, _size: usize) {}
    }

    struct RejectAll;

    impl BlockValidator for RejectAll {
        fn validate(&self, _block_type: u32, _key: &Key, _payload: &[u8]) -> BlockVerdict {
            BlockVerdict::Invalid
        }
    }

    init_tracing();
    let (a, b) = (peer_at(100), peer_at(50));
    let mut overlay = Overlay::new(a, OverlayConfig::default(), Silent, MemoryRoutingTable::new(8))
        .with_validator(RejectAll);
    overlay.init();
    overlay.handle_friend_connected(b);

    let put = Put {
        options: RouteOptions::NONE,
        block_type: BLOCK_TYPE,
        hop_count: 0,
        replication_level: 1,
        best_known_destination: a,
        intermediate_trail_id: TrailId::ZERO,
        expiration: expiration(),
        key: key_at(120),
        put_path: vec![],
        payload: Bytes::from_static(b"bad"),
    };
    let frame = xvine_net_codec::encode_frame(&OverlayMessage::from(put)).unwrap();
    overlay.handle_message(b, &frame);

    assert_eq!(overlay.stats().messages_malformed, 1);
}
