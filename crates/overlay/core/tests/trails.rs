//! Finger discovery, rejection, trail replacement and disconnects on a small
//! simulated network.

use assert_matches::assert_matches;
use proptest::prelude::*;
use web_time::Instant;
use xvine_overlay::OverlayConfig;
use xvine_overlay_proto::{MessageType, OverlayMessage, TrailSetup, TrailSetupResult};
use xvine_primitives::{Direction, TrailId, finger_target, ring_distance};
use xvine_test_utils::{SimNetwork, init_tracing, peer_at};

/// A(100) - B(50) - C(300), with A searching slot 7 (target 228).
fn line_network() -> SimNetwork {
    init_tracing();
    let mut network = SimNetwork::with_peers(&[100, 50, 300]);
    network.connect(peer_at(100), peer_at(50));
    network.connect(peer_at(50), peer_at(300));
    network
}

#[test]
fn test_discovery_through_intermediate_hop() {
    let (a, b, c) = (peer_at(100), peer_at(50), peer_at(300));
    let mut network = line_network();

    network.overlay_mut(&a).discover_finger(7);
    network.run_until_idle();

    let hops: Vec<_> = network
        .delivered()
        .iter()
        .map(|d| (d.kind(), d.from, d.to))
        .collect();
    assert_eq!(
        hops,
        vec![
            (MessageType::TrailSetup, a, b),
            (MessageType::TrailSetup, b, c),
            (MessageType::TrailSetupResult, c, b),
            (MessageType::TrailSetupResult, b, a),
        ]
    );

    let finger = network.overlay(&a).fingers().get(7).cloned().unwrap();
    assert_eq!(finger.identity, c);
    assert_eq!(finger.trails.len(), 1);
    assert_eq!(finger.trails[0].elements, vec![b]);

    let entry = network.peer(&b).routing.get(&finger.trails[0].id).unwrap();
    assert_eq!(entry.hop(Direction::DestToSrc), a);
    assert_eq!(entry.hop(Direction::SrcToDest), c);

    // the round for slot 7 is done, the next one goes down a slot
    assert_eq!(network.overlay(&a).fingers().current_search_index(), 6);
    assert!(network.overlay(&a).fingers().active_search().is_none());
    assert_eq!(network.overlay(&a).friends().get(&b).unwrap().trails_count(), 1);
    assert_eq!(network.overlay(&a).stats().fingers_admitted, 1);
}

#[test]
fn test_congested_hop_rejects_setup() {
    init_tracing();
    let (a, p, c) = (peer_at(100), peer_at(50), peer_at(300));
    let mut network = SimNetwork::new();
    network.add_peer(a, OverlayConfig::default().with_rng_seed(1));
    network.add_peer(p, OverlayConfig::default().with_rng_seed(2).with_routing_table_threshold(0));
    network.add_peer(c, OverlayConfig::default().with_rng_seed(3));
    network.connect(a, p);
    network.connect(p, c);

    network.overlay_mut(&a).discover_finger(7);
    network.run_until_idle();

    let kinds: Vec<_> = network.delivered().iter().map(|d| d.kind()).collect();
    assert_eq!(kinds, vec![MessageType::TrailSetup, MessageType::TrailRejection]);
    assert!(network.delivered_of(MessageType::TrailSetup).iter().all(|d| d.to != c));
    assert!(network.peer(&p).routing.is_empty());

    let overlay = network.overlay(&a);
    assert!(overlay.fingers().is_empty());
    assert!(overlay.fingers().active_search().is_none());
    assert!(overlay.friends().is_congested(&p, Instant::now()));
    assert_eq!(overlay.stats().trail_rejections_received, 1);
    assert_eq!(network.overlay(&p).stats().trail_rejections_sent, 1);
}

#[test]
fn test_rejected_hop_retries_another_friend() {
    init_tracing();
    let (a, b, p, d) = (peer_at(100), peer_at(50), peer_at(250), peer_at(400));
    let mut network = SimNetwork::new();
    network.add_peer(a, OverlayConfig::default().with_rng_seed(1));
    network.add_peer(b, OverlayConfig::default().with_rng_seed(2));
    network.add_peer(p, OverlayConfig::default().with_rng_seed(3).with_routing_table_threshold(0));
    network.add_peer(d, OverlayConfig::default().with_rng_seed(4));
    network.connect(a, b);
    network.connect(b, p);
    network.connect(b, d);

    network.overlay_mut(&a).discover_finger(7);
    network.run_until_idle();

    // P is closest to 228 but full, so B falls back to D
    let rejection = network.delivered_of(MessageType::TrailRejection);
    assert_eq!(rejection.len(), 1);
    assert_eq!((rejection[0].from, rejection[0].to), (p, b));
    assert!(network.overlay(&b).friends().is_congested(&p, Instant::now()));

    let finger = network.overlay(&a).fingers().get(7).cloned().unwrap();
    assert_eq!(finger.identity, d);
    assert_eq!(finger.trails[0].elements, vec![b]);
    assert!(network.peer(&b).routing.get(&finger.trails[0].id).is_some());
}

#[test]
fn test_shorter_trail_replaces_longest() {
    init_tracing();
    let (a, b, e) = (peer_at(100), peer_at(50), peer_at(90));
    let finger = peer_at(260);
    let mut network = SimNetwork::with_peers(&[100, 50, 90]);
    network.connect(a, b);
    network.connect(a, e);

    let result = |trail_id: u8, trail: Vec<_>| TrailSetupResult {
        finger_identity: finger,
        querying_peer: a,
        is_predecessor: false,
        ultimate_destination: finger_target(100, 7),
        trail_id: TrailId::new([trail_id; 32]),
        trail,
    };

    network.inject(b, a, result(1, vec![b, peer_at(1_001), peer_at(1_002)]));
    network.inject(e, a, result(2, vec![e, peer_at(1_003)]));
    assert_eq!(network.overlay(&a).fingers().get(7).unwrap().trails.len(), 2);

    network.inject(b, a, result(3, vec![b, peer_at(1_004)]));
    network.run_until_idle();

    let stored = network.overlay(&a).fingers().get(7).cloned().unwrap();
    let mut ids: Vec<_> = stored.trails.iter().map(|trail| trail.id).collect();
    ids.sort();
    assert_eq!(ids, vec![TrailId::new([2; 32]), TrailId::new([3; 32])]);

    let teardowns = network.delivered_of(MessageType::TrailTeardown);
    assert_eq!(teardowns.len(), 1);
    assert_eq!((teardowns[0].from, teardowns[0].to), (a, b));
    assert_matches!(&teardowns[0].message, OverlayMessage::TrailTeardown(msg) => {
        assert_eq!(msg.trail_id, TrailId::new([1; 32]));
        assert_eq!(msg.destination, finger);
        assert_eq!(msg.direction, Direction::SrcToDest);
    });

    // one trail left through B, one through E
    let friends = network.overlay(&a).friends();
    assert_eq!(friends.get(&b).unwrap().trails_count(), 1);
    assert_eq!(friends.get(&e).unwrap().trails_count(), 1);
}

#[test]
fn test_duplicate_trail_is_counted() {
    init_tracing();
    let (a, b) = (peer_at(100), peer_at(50));
    let mut network = SimNetwork::with_peers(&[100, 50]);
    network.connect(a, b);

    let result = TrailSetupResult {
        finger_identity: peer_at(260),
        querying_peer: a,
        is_predecessor: false,
        ultimate_destination: finger_target(100, 7),
        trail_id: TrailId::new([1; 32]),
        trail: vec![b, peer_at(1_001)],
    };
    network.inject(b, a, result.clone());
    network.inject(
        b,
        a,
        TrailSetupResult {
            trail_id: TrailId::new([2; 32]),
            ..result
        },
    );

    let overlay = network.overlay(&a);
    assert_eq!(overlay.fingers().get(7).unwrap().trails.len(), 1);
    assert_eq!(overlay.stats().duplicate_trails, 1);
}

#[test]
fn test_result_from_wrong_neighbour_is_dropped() {
    init_tracing();
    let (a, b, e) = (peer_at(100), peer_at(50), peer_at(90));
    let mut network = SimNetwork::with_peers(&[100, 50, 90]);
    network.connect(a, b);
    network.connect(a, e);

    network.inject(
        e,
        a,
        TrailSetupResult {
            finger_identity: peer_at(260),
            querying_peer: a,
            is_predecessor: false,
            ultimate_destination: finger_target(100, 7),
            trail_id: TrailId::new([1; 32]),
            trail: vec![b],
        },
    );

    assert!(network.overlay(&a).fingers().is_empty());
    assert_eq!(network.overlay(&a).stats().routing_misses, 1);
}

#[test]
fn test_disconnect_drops_dependent_fingers_and_routes() {
    let (a, b, c) = (peer_at(100), peer_at(50), peer_at(300));
    let mut network = line_network();
    network.overlay_mut(&a).discover_finger(7);
    network.run_until_idle();
    assert!(network.overlay(&a).fingers().get(7).is_some());
    assert_eq!(network.peer(&b).routing.len(), 1);
    network.clear_delivered();

    network.disconnect(a, b);
    network.run_until_idle();

    let overlay = network.overlay(&a);
    assert!(overlay.fingers().get(7).is_none());
    assert!(!overlay.friends().contains(&b));
    assert!(overlay.friends().is_empty());
    assert!(overlay.next_deadline().is_none());
    assert!(network.peer(&b).routing.is_empty());
    // the trail ran through the departed friend, so nothing is sent over it
    assert!(network.delivered().is_empty());
    // B still knows C
    assert!(network.overlay(&b).friends().contains(&c));
}

#[test]
fn test_frame_from_stranger_is_dropped() {
    init_tracing();
    let (a, b) = (peer_at(100), peer_at(50));
    let mut network = SimNetwork::with_peers(&[100, 50]);

    network.inject(
        b,
        a,
        TrailSetupResult {
            finger_identity: b,
            querying_peer: a,
            is_predecessor: false,
            ultimate_destination: 101,
            trail_id: TrailId::new([1; 32]),
            trail: vec![],
        },
    );

    assert!(network.overlay(&a).fingers().is_empty());
    assert_eq!(network.overlay(&a).stats().routing_misses, 1);
    assert_eq!(network.overlay(&a).stats().messages_received, 1);
}

#[test]
fn test_trail_is_compressed_to_closer_friend() {
    init_tracing();
    let (a, b, c, d) = (peer_at(100), peer_at(1_000), peer_at(500), peer_at(300));
    let mut network = SimNetwork::with_peers(&[100, 1_000, 500, 300]);
    network.connect(a, b);
    network.connect(b, c);
    network.connect(c, d);
    network.connect(a, c);

    let trail_id = TrailId::new([7; 32]);
    network.inject(
        a,
        b,
        TrailSetup {
            is_predecessor: false,
            ultimate_destination: finger_target(100, 7),
            source: a,
            best_known_destination: b,
            intermediate_trail_id: TrailId::ZERO,
            trail_id,
            trail: vec![],
        },
    );
    network.run_until_idle();

    // the result came back over B, but C is a friend of A as well
    let finger = network.overlay(&a).fingers().get(7).cloned().unwrap();
    assert_eq!(finger.identity, d);
    assert_eq!(finger.trails.len(), 1);
    assert_eq!(finger.trails[0].id, trail_id);
    assert_eq!(finger.trails[0].elements, vec![c]);

    let compressions = network.delivered_of(MessageType::TrailCompression);
    let hops: Vec<_> = compressions.iter().map(|d| (d.from, d.to)).collect();
    assert_eq!(hops, vec![(a, b), (b, c)]);
    assert_matches!(&compressions[0].message, OverlayMessage::TrailCompression(msg) => {
        assert_eq!(msg.source, a);
        assert_eq!(msg.destination, d);
        assert_eq!(msg.new_first_friend, c);
        assert_eq!(msg.trail_id, trail_id);
    });

    assert!(network.peer(&b).routing.get(&trail_id).is_none());
    let entry = network.peer(&c).routing.get(&trail_id).unwrap();
    assert_eq!(entry.hop(Direction::DestToSrc), a);
    assert_eq!(entry.hop(Direction::SrcToDest), d);

    let friends = network.overlay(&a).friends();
    assert_eq!(friends.get(&c).unwrap().trails_count(), 1);
    assert_eq!(friends.get(&b).unwrap().trails_count(), 0);
}

#[test]
fn test_saturated_first_hop_is_not_used() {
    init_tracing();
    let (a, b) = (peer_at(100), peer_at(50));
    let mut network = SimNetwork::new();
    network.add_peer(a, OverlayConfig::default().with_rng_seed(1).with_trails_through_friend_threshold(1));
    network.add_peer(b, OverlayConfig::default().with_rng_seed(2));
    network.connect(a, b);

    let result = |trail_id: u8, finger: u64, index: u8, hop: u64| TrailSetupResult {
        finger_identity: peer_at(finger),
        querying_peer: a,
        is_predecessor: false,
        ultimate_destination: finger_target(100, index),
        trail_id: TrailId::new([trail_id; 32]),
        trail: vec![b, peer_at(hop)],
    };
    network.inject(b, a, result(1, 260, 7, 1_001));
    network.inject(b, a, result(2, 170, 6, 1_002));
    network.run_until_idle();

    let overlay = network.overlay(&a);
    assert!(overlay.fingers().get(7).is_some());
    assert!(overlay.fingers().get(6).is_none());
    assert_eq!(overlay.friends().get(&b).unwrap().trails_count(), 1);
    assert_eq!(overlay.stats().trails_discarded, 1);

    let teardowns = network.delivered_of(MessageType::TrailTeardown);
    assert_eq!(teardowns.len(), 1);
    assert_matches!(&teardowns[0].message, OverlayMessage::TrailTeardown(msg) => {
        assert_eq!(msg.trail_id, TrailId::new([2; 32]));
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_setup_never_moves_away_from_target(
        values in proptest::collection::btree_set(any::<u64>(), 3..10),
        extra in proptest::collection::vec((any::<usize>(), any::<usize>()), 0..8),
        index in 0u8..64,
    ) {
        // a line in scrambled order keeps the graph connected
        let mut order: Vec<u64> = values.into_iter().collect();
        order.sort_by_key(|value| value.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut network = SimNetwork::with_peers(&order);
        for pair in order.windows(2) {
            network.connect(peer_at(pair[0]), peer_at(pair[1]));
        }
        for (i, j) in extra {
            let (x, y) = (order[i % order.len()], order[j % order.len()]);
            if x != y {
                network.connect(peer_at(x), peer_at(y));
            }
        }

        let source = order[0];
        network.overlay_mut(&peer_at(source)).discover_finger(index);
        network.run_until_idle();

        let target = finger_target(source, index);
        let distances: Vec<u64> = network
            .delivered_of(MessageType::TrailSetup)
            .iter()
            .filter_map(|delivery| match &delivery.message {
                OverlayMessage::TrailSetup(msg) => Some(msg.best_known_destination),
                _ => None,
            })
            .map(|best| ring_distance(target, best.ring_value(), index))
            .collect();
        prop_assert!(!distances.is_empty());
        for pair in distances.windows(2) {
            prop_assert!(pair[1] <= pair[0], "best known destination moved away: {distances:?}");
        }
    }
}
