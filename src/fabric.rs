use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rustc_hash::FxHasher;

/// State shared by every endpoint of one fabric: the global message
/// counters the quiescence check reads, the rendezvous barrier, and the
/// per-rank scratch slots used by collective reductions.
struct SharedState {
    /// Messages handed to any peer channel.
    sent: AtomicU64,
    /// Messages dequeued (and therefore dispatched) by their owning rank.
    delivered: AtomicU64,
    gate: Barrier,
    reduce_slots: Mutex<Vec<u64>>,
}

/// Builder for a closed group of rank endpoints wired all-to-all.
///
/// The fabric realizes the bulk-synchronous message-passing model the
/// algorithms run on: each rank is a single logical executor that owns a
/// partition of the key space, receives asynchronous visits through its
/// inbox, and meets the other ranks at collective barriers. Rank threads are
/// the only parallelism; a record owned by rank `r` is only ever touched by
/// rank `r`, so no locks guard the records themselves.
///
/// Messages from one origin to one target rank are delivered in submission
/// order (channels are FIFO per sender). Messages from different origins are
/// unordered relative to each other. Self-sends travel through the rank's
/// own channel so the ordering rule is uniform.
pub struct RankFabric;

impl RankFabric {
    /// Wires `rank_num` endpoints together and returns them, one per rank.
    pub fn build<M: Send>(rank_num: usize) -> Vec<Endpoint<M>> {
        let mut senders = Vec::with_capacity(rank_num);
        let mut receivers = Vec::with_capacity(rank_num);
        for _ in 0..rank_num {
            let (sender, receiver) = unbounded();
            senders.push(sender);
            receivers.push(receiver);
        }

        let shared = Arc::new(SharedState {
            sent: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            gate: Barrier::new(rank_num),
            reduce_slots: Mutex::new(vec![0; rank_num]),
        });

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Endpoint {
                rank,
                peers: senders.clone(),
                inbox,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One rank's handle on the fabric.
///
/// Collective operations (`quiescent`, the reductions) must be called by
/// every rank in the same order; this is the usual bulk-synchronous
/// discipline and is not checked at runtime.
pub struct Endpoint<M> {
    rank: usize,
    peers: Vec<Sender<M>>,
    inbox: Receiver<M>,
    shared: Arc<SharedState>,
}

impl<M: Send> Endpoint<M> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn rank_num(&self) -> usize {
        self.peers.len()
    }

    /// Rank that owns a key. Every endpoint computes the same owner for the
    /// same key, which is what makes fire-and-forget visits addressable.
    pub fn owner<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.peers.len()
    }

    /// Fire-and-forget enqueue to a peer. Delivery happens when the target
    /// rank drains its inbox; the enclosing barrier guarantees it happens
    /// before the barrier completes.
    pub fn send(&self, to: usize, message: M) {
        self.shared.sent.fetch_add(1, Ordering::SeqCst);
        self.peers[to]
            .send(message)
            .expect("fabric peer inbox disconnected");
    }

    /// Non-blocking dequeue of the next message addressed to this rank.
    /// Counts the message as delivered; the caller must dispatch it before
    /// entering a quiescence check.
    pub fn recv(&self) -> Option<M> {
        match self.inbox.try_recv() {
            Ok(message) => {
                self.shared.delivered.fetch_add(1, Ordering::SeqCst);
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Two-phase global quiescence check. The caller must be locally idle:
    /// inbox drained and no pending local work.
    ///
    /// Between the two rendezvous points no rank sends or dispatches, so the
    /// counters are stable and every rank reads the same verdict: if every
    /// message ever sent has been dispatched, nothing is in flight anywhere
    /// and the barrier may complete. Otherwise all ranks loop back to
    /// draining. Termination follows from the monotonicity of the algorithms
    /// layered on top, not from the fabric itself.
    pub fn quiescent(&self) -> bool {
        self.shared.gate.wait();
        let quiet = self.shared.sent.load(Ordering::SeqCst)
            == self.shared.delivered.load(Ordering::SeqCst);
        self.shared.gate.wait();
        quiet
    }

    /// Collective sum over one `u64` per rank.
    pub fn reduce_sum(&self, value: u64) -> u64 {
        self.reduce(value, |a, b| a + b)
    }

    /// Collective max over one `u64` per rank.
    pub fn reduce_max(&self, value: u64) -> u64 {
        self.reduce(value, u64::max)
    }

    /// Collective min over one `u64` per rank.
    pub fn reduce_min(&self, value: u64) -> u64 {
        self.reduce(value, u64::min)
    }

    fn reduce<F>(&self, value: u64, combine: F) -> u64
    where
        F: Fn(u64, u64) -> u64,
    {
        {
            let mut slots = self.shared.reduce_slots.lock().unwrap();
            slots[self.rank] = value;
        }
        self.shared.gate.wait();
        let combined = {
            let slots = self.shared.reduce_slots.lock().unwrap();
            slots
                .iter()
                .copied()
                .reduce(|a, b| combine(a, b))
                .expect("fabric has at least one rank")
        };
        self.shared.gate.wait();
        combined
    }
}

#[cfg(test)]
mod test_fabric {
    use super::{Endpoint, RankFabric};
    use crossbeam_utils::thread;

    /// Drains the inbox with `handle` until global quiescence.
    fn drain_until_quiescent<M: Send>(endpoint: &Endpoint<M>, mut handle: impl FnMut(&Endpoint<M>, M)) {
        loop {
            while let Some(message) = endpoint.recv() {
                handle(endpoint, message);
            }
            if endpoint.quiescent() {
                break;
            }
        }
    }

    #[test]
    fn test_reductions() {
        let endpoints = RankFabric::build::<()>(3);
        thread::scope(|s| {
            for endpoint in endpoints {
                s.spawn(move |_| {
                    let contribution = endpoint.rank() as u64 + 1;
                    assert_eq!(endpoint.reduce_sum(contribution), 6);
                    assert_eq!(endpoint.reduce_max(contribution), 3);
                    assert_eq!(endpoint.reduce_min(contribution), 1);
                });
            }
        })
        .unwrap();
    }

    /// A message that respawns itself a bounded number of times. The barrier
    /// must not complete until every cascade has run dry on every rank.
    #[test]
    fn test_quiescence_under_cascades() {
        const RANKS: usize = 4;
        const HOPS: u64 = 64;

        let endpoints = RankFabric::build::<u64>(RANKS);
        thread::scope(|s| {
            for endpoint in endpoints {
                s.spawn(move |_| {
                    let next = (endpoint.rank() + 1) % RANKS;
                    endpoint.send(next, HOPS);

                    let mut dispatched = 0u64;
                    drain_until_quiescent(&endpoint, |endpoint, hops| {
                        dispatched += 1;
                        if hops > 0 {
                            let next = (endpoint.rank() + 1) % RANKS;
                            endpoint.send(next, hops - 1);
                        }
                    });

                    // Each of the RANKS seeds spawns a chain of HOPS + 1
                    // messages in total.
                    let total = endpoint.reduce_sum(dispatched);
                    assert_eq!(total, RANKS as u64 * (HOPS + 1));
                });
            }
        })
        .unwrap();
    }

    /// Same-origin messages to one target arrive in submission order.
    #[test]
    fn test_same_origin_fifo() {
        const COUNT: u64 = 200;

        let endpoints = RankFabric::build::<u64>(2);
        thread::scope(|s| {
            for endpoint in endpoints {
                s.spawn(move |_| {
                    if endpoint.rank() == 0 {
                        for sequence in 0..COUNT {
                            endpoint.send(1, sequence);
                        }
                    }
                    let mut received = Vec::new();
                    drain_until_quiescent(&endpoint, |_, sequence| received.push(sequence));
                    if endpoint.rank() == 1 {
                        let expected: Vec<u64> = (0..COUNT).collect();
                        assert_eq!(received, expected);
                    }
                });
            }
        })
        .unwrap();
    }
}
