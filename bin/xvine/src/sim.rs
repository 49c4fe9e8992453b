//! In-process simulation.
//!
//! Every peer runs its own [`OverlayService`]. A forwarding task per peer
//! turns transmit requests into `transmit_ready` calls on the sender and
//! `inbound` calls on the receiver, which stands in for the link layer. Each
//! link is a byte stream that the receiving side cuts back into frames.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, SystemTime},
};

use asynchronous_codec::Decoder;
use bytes::{Bytes, BytesMut};
use eyre::{Result, eyre};
use rand::{
    Rng, SeedableRng,
    rngs::StdRng,
    seq::{IndexedRandom, SliceRandom},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use xvine_net_codec::{CodecError, FrameCodec, RawFrame, encode_frame};
use xvine_observability::MetricsSnapshot;
use xvine_overlay::{
    BLOCK_TYPE_ANY, ClientResult, MemoryRoutingTable, OverlayConfig, OverlayEvent, OverlayHandle,
    OverlayService, RingSnapshot,
};
use xvine_primitives::{Key, KEY_LEN, PeerId};

use crate::cli::SimulateArgs;

/// Block type used for simulated PUTs.
const SIM_BLOCK_TYPE: u32 = 1;

/// How long to wait for GET results.
const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

type Handles = Arc<HashMap<PeerId, OverlayHandle>>;

pub(crate) async fn run(config: OverlayConfig, args: SimulateArgs) -> Result<()> {
    if args.peers < 2 {
        return Err(eyre!("a simulation needs at least two peers"));
    }
    let metrics = MetricsSnapshot::install()?;
    let config = apply_overrides(config, &args);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut ids: Vec<PeerId> = (0..args.peers).map(|_| PeerId::random(&mut rng)).collect();
    ids.sort_by_key(PeerId::ring_value);
    let friendships = friend_graph(&ids, args.extra_friends, &mut rng);
    info!(peers = ids.len(), friendships = friendships.len(), "starting simulation");

    let mut handles = HashMap::with_capacity(ids.len());
    let mut receivers = Vec::with_capacity(ids.len());
    let mut services = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let peer_config = config.clone().with_rng_seed(args.seed.wrapping_add(i as u64 + 1));
        let routing = MemoryRoutingTable::new(peer_config.routing_table_threshold);
        let (service, handle, events) = OverlayService::new(*id, peer_config, routing);
        services.push(tokio::spawn(service.into_task()));
        handles.insert(*id, handle);
        receivers.push((*id, events));
    }
    let handles: Handles = Arc::new(handles);

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let links: Vec<JoinHandle<()>> = receivers
        .into_iter()
        .map(|(id, events)| tokio::spawn(forward_events(id, events, Arc::clone(&handles), results_tx.clone())))
        .collect();

    for (a, b) in &friendships {
        handle(&handles, a)?.friend_connected(*b)?;
        handle(&handles, b)?.friend_connected(*a)?;
    }

    info!(secs = args.settle_secs, "letting the ring settle");
    tokio::time::sleep(Duration::from_secs(args.settle_secs)).await;

    let mut expected = 0;
    for _ in 0..args.keys {
        let key = random_key(&mut rng);
        let (Some(writer), Some(reader)) = (ids.choose(&mut rng), ids.choose(&mut rng)) else {
            break;
        };
        let expiration = SystemTime::now() + Duration::from_secs(3600);
        handle(&handles, writer)?.put(key, SIM_BLOCK_TYPE, expiration, Bytes::from(key.as_bytes().to_vec()))?;
        // give the PUT a head start over the GET
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle(&handles, reader)?.get(key, BLOCK_TYPE_ANY)?;
        expected += 1;
    }

    let results = collect_results(&mut results_rx, expected).await;

    let mut snapshots = Vec::with_capacity(ids.len());
    for id in &ids {
        snapshots.push(handle(&handles, id)?.snapshot().await?);
    }
    report(&ids, &snapshots, &results, expected, &metrics);

    for handle in handles.values() {
        let _ = handle.shutdown();
    }
    for service in services {
        service.await?;
    }
    for link in links {
        link.abort();
    }
    Ok(())
}

fn apply_overrides(mut config: OverlayConfig, args: &SimulateArgs) -> OverlayConfig {
    if let Some(secs) = args.find_finger_interval {
        config = config.with_find_finger_trail_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = args.verify_interval {
        config = config.with_verify_successor_interval(Duration::from_secs(secs));
    }
    config
}

fn handle<'a>(handles: &'a Handles, id: &PeerId) -> Result<&'a OverlayHandle> {
    handles.get(id).ok_or_else(|| eyre!("no service for peer {id}"))
}

/// A random friend ring over `ids` plus `extra` random edges per peer.
fn friend_graph(ids: &[PeerId], extra: usize, rng: &mut StdRng) -> BTreeSet<(PeerId, PeerId)> {
    let mut order = ids.to_vec();
    order.shuffle(rng);

    let mut edges = BTreeSet::new();
    let mut add = |a: PeerId, b: PeerId| {
        if a != b {
            edges.insert((a.min(b), a.max(b)));
        }
    };
    for (a, b) in order.iter().zip(order.iter().cycle().skip(1)) {
        add(*a, *b);
    }
    for a in ids {
        for _ in 0..extra {
            if let Some(b) = ids.choose(rng) {
                add(*a, *b);
            }
        }
    }
    edges
}

fn random_key(rng: &mut StdRng) -> Key {
    let mut bytes = [0u8; KEY_LEN];
    rng.fill(&mut bytes[..]);
    Key::new(bytes)
}

/// One direction of a simulated connection.
#[derive(Default)]
struct Link {
    stream: BytesMut,
    codec: FrameCodec<RawFrame>,
}

impl Link {
    fn write(&mut self, frame: &[u8]) {
        self.stream.extend_from_slice(frame);
    }

    /// Complete frames received so far. A partial frame stays buffered.
    fn read_frames(&mut self) -> Result<Vec<Bytes>, CodecError> {
        let mut frames = Vec::new();
        while let Some(raw) = self.codec.decode(&mut self.stream)? {
            frames.push(encode_frame(&raw)?);
        }
        Ok(frames)
    }
}

/// Deliver every frame `from` asks to send.
async fn forward_events(
    from: PeerId,
    mut events: mpsc::UnboundedReceiver<OverlayEvent>,
    handles: Handles,
    results: mpsc::UnboundedSender<(PeerId, ClientResult)>,
) {
    let mut links: HashMap<PeerId, Link> = HashMap::new();
    while let Some(event) = events.recv().await {
        match event {
            OverlayEvent::TransmitRequest { peer, size } => {
                let (Some(sender), Some(receiver)) = (handles.get(&from), handles.get(&peer)) else {
                    warn!(%from, to = %peer, "transmit request for unknown peer");
                    continue;
                };
                let Ok(frames) = sender.transmit_ready(peer, usize::MAX).await else {
                    return;
                };
                debug!(%from, to = %peer, size, frames = frames.len(), "link transmit");

                let link = links.entry(peer).or_default();
                for frame in &frames {
                    link.write(frame);
                }
                let received = match link.read_frames() {
                    Ok(received) => received,
                    Err(err) => {
                        warn!(%from, to = %peer, %err, "link stream corrupted, resetting");
                        links.remove(&peer);
                        continue;
                    }
                };
                for frame in received {
                    if receiver.inbound(from, frame).is_err() {
                        break;
                    }
                }
            }
            OverlayEvent::Result(result) => {
                let _ = results.send((from, result));
            }
        }
    }
}

async fn collect_results(
    results_rx: &mut mpsc::UnboundedReceiver<(PeerId, ClientResult)>,
    expected: usize,
) -> Vec<(PeerId, ClientResult)> {
    let mut results = Vec::new();
    let deadline = tokio::time::Instant::now() + RESULT_TIMEOUT;
    while results.len() < expected {
        match tokio::time::timeout_at(deadline, results_rx.recv()).await {
            Ok(Some(result)) => results.push(result),
            Ok(None) | Err(_) => break,
        }
    }
    results
}

fn report(
    ids: &[PeerId],
    snapshots: &[RingSnapshot],
    results: &[(PeerId, ClientResult)],
    expected: usize,
    metrics: &MetricsSnapshot,
) {
    println!("{:<10} {:<10} {:<10} {:>7} {:>7}", "peer", "successor", "pred", "fingers", "friends");
    let mut correct = 0;
    for (i, snapshot) in snapshots.iter().enumerate() {
        let true_successor = ids.get((i + 1) % ids.len()).copied();
        if snapshot.successor == true_successor {
            correct += 1;
        }
        println!(
            "{:<10} {:<10} {:<10} {:>7} {:>7}",
            snapshot.me.to_string(),
            short(snapshot.successor),
            short(snapshot.predecessor),
            snapshot.fingers.len(),
            snapshot.friends,
        );
    }
    println!();
    println!("correct successors: {correct}/{}", ids.len());
    println!("get results:        {}/{expected}", results.len());
    println!();
    for counter in metrics.counters() {
        println!("{:<36} {}", counter.name, counter.value);
    }
}

fn short(peer: Option<PeerId>) -> String {
    peer.map_or_else(|| "-".to_string(), |peer| peer.to_string())
}
