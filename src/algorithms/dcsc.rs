use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_utils::thread;
use dashmap::DashMap;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::{DEFAULT_RANK_NUM, GOLDEN_RATIO_SEED, SPINNER_TICK_LINES};
use crate::error::{io_error, DcscError};
use crate::fabric::{Endpoint, RankFabric};
use crate::graph::{parse_edge_line, Direction, Msg, VtxInfo};
use crate::permuter::VertexPermuter;

/// Configuration for a divide-and-conquer strong connectivity run.
///
/// # Fields
///
/// * `rank_num` - Number of rank executors the fabric is built over
/// * `seed_base` - Base of the per-round permuter seed schedule; round `r`
///   uses `seed_base + r`. Two runs with the same base, input and rank
///   count produce identical component labels.
/// * `collect_assignments` - Whether to gather the per-vertex component
///   labels into the returned summary. Off by default; the label map is as
///   large as the graph.
#[derive(Debug, Clone)]
pub struct DcscConfig {
    pub rank_num: usize,
    pub seed_base: u64,
    pub collect_assignments: bool,
}

impl Default for DcscConfig {
    fn default() -> Self {
        Self {
            rank_num: DEFAULT_RANK_NUM,
            seed_base: GOLDEN_RATIO_SEED,
            collect_assignments: false,
        }
    }
}

/// Aggregate result of a run.
///
/// `assignments` maps external vertex ids to their component label and is
/// only populated when the config asks for it.
#[derive(Debug, Clone, Serialize)]
pub struct DcscSummary {
    pub node_count: u64,
    pub edge_count: u64,
    pub rounds: usize,
    pub scc_count: u64,
    pub largest_scc: u64,
    pub assignments: FxHashMap<u32, u64>,
}

/// Where a run takes its input from.
#[derive(Clone, Copy)]
enum IngestSource<'a> {
    File(&'a Path),
    Edges { edges: &'a [(u32, u32)], vertices: &'a [u32] },
}

/// Controller for SCC enumeration via distributed divide-and-conquer
/// strong connectivity.
///
/// Builds a rank fabric, runs one `RankWorker` per rank on scoped threads,
/// and reduces their results into a single summary. The underlying rounds
/// alternate trivial trimming, randomized WCC pivot selection,
/// forward/backward reachability marking, and freeze/shear until every
/// vertex carries a final component label.
pub struct DcscController {
    config: DcscConfig,
}

impl DcscController {
    pub fn new(config: DcscConfig) -> Self {
        Self { config }
    }

    /// Runs the full pipeline over a whitespace-separated edge-list file.
    ///
    /// The path is validated up front so an unreadable input surfaces as an
    /// `Io` error instead of a fabric-wide abort.
    pub fn run_file(&self, path: &Path) -> Result<DcscSummary, DcscError> {
        File::open(path).map_err(|e| {
            io_error(format!("Cannot open edge list {}: {}", path.display(), e))
        })?;
        self.run(IngestSource::File(path))
    }

    /// Runs the full pipeline over an in-memory edge list plus a list of
    /// isolated vertex ids to declare. Ids are external; the same +1 ingest
    /// offset as the file path applies.
    pub fn run_edges(&self, edges: &[(u32, u32)], vertices: &[u32]) -> DcscSummary {
        self.run(IngestSource::Edges { edges, vertices })
            .expect("in-memory ingest cannot fail")
    }

    fn run(&self, source: IngestSource<'_>) -> Result<DcscSummary, DcscError> {
        let rank_num = self.config.rank_num.max(1);
        let endpoints = RankFabric::build::<Msg>(rank_num);
        let assignments: Arc<DashMap<u32, u64>> = Arc::new(DashMap::new());

        let mut summary = thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|endpoint| {
                    let config = self.config.clone();
                    let assignments = Arc::clone(&assignments);
                    scope.spawn(move |_| {
                        let mut worker = RankWorker::new(endpoint, config, assignments);
                        worker.ingest(source);
                        worker.run()
                    })
                })
                .collect();

            // Every rank computes the same global summary through the
            // collective reductions; keep rank 0's copy.
            let mut summary = None;
            for handle in handles {
                let rank_summary = handle.join().expect("rank thread panicked");
                summary.get_or_insert(rank_summary);
            }
            summary.expect("fabric has at least one rank")
        })
        .expect("rank scope panicked");

        if self.config.collect_assignments {
            summary.assignments = assignments
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect();
        }
        Ok(summary)
    }
}

/// One rank of the computation: a partition of the vertex store, the
/// fabric endpoint, and the rank-local pivot work queue.
///
/// All mutation of owned records happens in `dispatch`, one message at a
/// time, which is what lets the handlers touch records without locks.
struct RankWorker {
    net: Endpoint<Msg>,
    config: DcscConfig,
    store: FxHashMap<u32, VtxInfo>,

    /// Rank-local (pivot, vertex) min-queue driving pivot propagation; must
    /// be empty whenever a barrier completes.
    workqueue: BinaryHeap<Reverse<(u32, u32)>>,
    /// Component-size tally for labels this rank owns.
    scc_sizes: FxHashMap<u64, u64>,

    /// Distinct directed edges first recorded on this rank.
    local_edge_count: u64,
    node_count: u64,
    edge_count: u64,
    min_vtx: u32,
    max_vtx: u32,

    assignments: Arc<DashMap<u32, u64>>,
}

impl RankWorker {
    fn new(net: Endpoint<Msg>, config: DcscConfig, assignments: Arc<DashMap<u32, u64>>) -> Self {
        Self {
            net,
            config,
            store: FxHashMap::default(),
            workqueue: BinaryHeap::new(),
            scc_sizes: FxHashMap::default(),
            local_edge_count: 0,
            node_count: 0,
            edge_count: 0,
            min_vtx: 0,
            max_vtx: 0,
            assignments,
        }
    }

    fn send_vertex(&self, target: u32, message: Msg) {
        self.net.send(self.net.owner(&target), message);
    }

    fn send_edge(&self, src: u32, dst: u32) {
        self.send_vertex(src, Msg::AddOut { vtx: src, dst });
        self.send_vertex(dst, Msg::AddIn { vtx: dst, src });
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, message: Msg) {
        match message {
            Msg::Declare { vtx } => {
                self.store.entry(vtx).or_default();
            }
            Msg::AddOut { vtx, dst } => {
                if self.store.entry(vtx).or_default().out_edges.insert(dst) {
                    self.local_edge_count += 1;
                }
            }
            Msg::AddIn { vtx, src } => {
                self.store.entry(vtx).or_default().in_edges.insert(src);
            }
            Msg::Trim { vtx, sender, direction } => self.on_trim(vtx, sender, direction),
            Msg::PivotOffer { vtx, pivot } => self.on_pivot_offer(vtx, pivot),
            Msg::Mark { vtx, pivot, marker, direction } => {
                self.on_mark(vtx, pivot, marker, direction)
            }
            Msg::Detach { vtx, sender, direction } => {
                if let Some(info) = self.store.get_mut(&vtx) {
                    match direction {
                        Direction::Forward => info.in_edges.remove(&sender),
                        Direction::Backward => info.out_edges.remove(&sender),
                    };
                }
            }
            Msg::ShearProbe { vtx, sender, mark_pred, mark_desc } => {
                self.on_shear_probe(vtx, sender, mark_pred, mark_desc)
            }
            Msg::ShearPrune { vtx, nbr } => {
                if let Some(info) = self.store.get_mut(&vtx) {
                    info.out_edges.remove(&nbr);
                }
            }
            Msg::SccTally { comp_id } => {
                *self.scc_sizes.entry(comp_id).or_insert(0) += 1;
            }
        }
    }

    /// Collective barrier: drains the inbox and pumps the pivot queue until
    /// this rank is idle, then joins the global quiescence check; repeats
    /// until no rank has pending work and no message is in flight.
    /// Handlers that submit further visits are drained transitively.
    fn barrier(&mut self) {
        loop {
            loop {
                let mut progress = false;
                while let Some(message) = self.net.recv() {
                    self.dispatch(message);
                    progress = true;
                }
                if self.pump_workqueue() {
                    progress = true;
                }
                if !progress {
                    break;
                }
            }
            if self.net.quiescent() {
                break;
            }
        }
        assert!(
            self.workqueue.is_empty(),
            "rank {}: pivot work queue not drained at barrier exit",
            self.net.rank()
        );
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    fn ingest(&mut self, source: IngestSource<'_>) {
        match source {
            IngestSource::File(path) => self.ingest_file(path),
            IngestSource::Edges { edges, vertices } => self.ingest_edges(edges, vertices),
        }
        self.finish_ingest();
    }

    /// Scans this rank's slice of the memory-mapped edge list and submits
    /// both half-edges of every parsed line to their owning ranks.
    ///
    /// The path was validated by the controller, so a failure here is a
    /// fatal condition rather than a recoverable error.
    fn ingest_file(&mut self, path: &Path) {
        let rank = self.net.rank();
        if rank == 0 {
            println!("Reading edges from {}", path.display());
        }

        let file = File::open(path).expect("edge list vanished after validation");
        let file_len = file.metadata().expect("cannot stat edge list").len();
        // Mapping a zero-length file is EINVAL; an empty edge list is valid
        // input and simply yields an empty vertex map.
        if file_len == 0 {
            return;
        }

        let mmap = unsafe { Mmap::map(&file) }.expect("cannot mmap edge list");
        let (start, end) = rank_line_slice(&mmap, rank, self.net.rank_num());
        let slice = &mmap[start..end];

        let progress = (rank == 0).then(|| {
            let pb = ProgressBar::new(slice.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap()
                    .progress_chars("=>-"),
            );
            pb.set_message("Scanning edge list.");
            pb
        });

        let mut consumed = 0u64;
        let mut lines = 0u64;
        for line in slice.split(|&byte| byte == b'\n') {
            consumed += line.len() as u64 + 1;
            lines += 1;
            if lines % SPINNER_TICK_LINES == 0 {
                if let Some(pb) = &progress {
                    pb.set_position(consumed.min(slice.len() as u64));
                }
            }

            let Ok(text) = std::str::from_utf8(line) else {
                continue;
            };
            let Some((src, dst)) = parse_edge_line(text) else {
                continue;
            };
            // Ids are stored shifted by one; an id at the top of the u32
            // range is out of scope and its line is dropped.
            let (Some(src), Some(dst)) = (src.checked_add(1), dst.checked_add(1)) else {
                continue;
            };
            self.send_edge(src, dst);
        }

        if let Some(pb) = progress {
            pb.finish_with_message("Edge list scanned.");
        }
        debug!("rank {} scanned {} lines ({} bytes)", rank, lines, slice.len());
    }

    /// In-memory ingest: edges and isolated vertex declarations are dealt
    /// round-robin across ranks by index.
    fn ingest_edges(&mut self, edges: &[(u32, u32)], vertices: &[u32]) {
        let rank = self.net.rank();
        let rank_num = self.net.rank_num();

        for (index, &(src, dst)) in edges.iter().enumerate() {
            if index % rank_num != rank {
                continue;
            }
            let (Some(src), Some(dst)) = (src.checked_add(1), dst.checked_add(1)) else {
                continue;
            };
            self.send_edge(src, dst);
        }
        for (index, &vtx) in vertices.iter().enumerate() {
            if index % rank_num != rank {
                continue;
            }
            let Some(vtx) = vtx.checked_add(1) else {
                continue;
            };
            self.send_vertex(vtx, Msg::Declare { vtx });
        }
    }

    fn finish_ingest(&mut self) {
        self.barrier();
        self.node_count = self.net.reduce_sum(self.store.len() as u64);
        self.edge_count = self.net.reduce_sum(self.local_edge_count);
        if self.net.rank() == 0 {
            println!("Node Count: {}", self.node_count);
            println!("Edge Count: {}", self.edge_count);
        }
    }

    // ------------------------------------------------------------------
    // Trim
    // ------------------------------------------------------------------

    /// Finalizes `vtx` as a singleton component if one of its adjacency
    /// sides is empty, notifying the surviving side so the removal
    /// cascades. A vertex with both sides empty sends nothing.
    fn try_trim(&mut self, vtx: u32) {
        let (fwd_targets, bwd_targets) = {
            let Some(info) = self.store.get_mut(&vtx) else {
                return;
            };
            if !info.active {
                return;
            }
            if info.in_edges.is_empty() {
                // No predecessors: cannot sit on a cycle.
                info.comp_id = Some(u64::from(vtx));
                info.active = false;
                (info.out_edges.drain().collect::<Vec<_>>(), Vec::new())
            } else if info.out_edges.is_empty() {
                info.comp_id = Some(u64::from(vtx));
                info.active = false;
                (Vec::new(), info.in_edges.drain().collect::<Vec<_>>())
            } else {
                return;
            }
        };

        for target in fwd_targets {
            self.send_vertex(target, Msg::Trim { vtx: target, sender: vtx, direction: Direction::Forward });
        }
        for target in bwd_targets {
            self.send_vertex(target, Msg::Trim { vtx: target, sender: vtx, direction: Direction::Backward });
        }
    }

    fn on_trim(&mut self, vtx: u32, sender: u32, direction: Direction) {
        {
            let Some(info) = self.store.get_mut(&vtx) else {
                return;
            };
            if !info.active {
                return;
            }
            match direction {
                Direction::Forward => info.in_edges.remove(&sender),
                Direction::Backward => info.out_edges.remove(&sender),
            };
        }
        self.try_trim(vtx);
    }

    /// Removes every vertex that can only be a trivial component, cascading
    /// through the enclosing barrier until no adjacency side is empty.
    fn trim_trivial(&mut self) {
        let candidates: Vec<u32> = self
            .store
            .iter()
            .filter(|(_, info)| {
                info.active && (info.in_edges.is_empty() || info.out_edges.is_empty())
            })
            .map(|(&vtx, _)| vtx)
            .collect();
        for vtx in candidates {
            self.try_trim(vtx);
        }
        self.barrier();
    }

    // ------------------------------------------------------------------
    // WCC pivot selection
    // ------------------------------------------------------------------

    /// Assigns every active vertex the minimum permuter image over its
    /// weakly connected component, by label-propagation of the minimum
    /// along undirected edges.
    fn init_wcc_pivots(&mut self, round: usize) {
        let seed = self.config.seed_base.wrapping_add(round as u64);
        let perm = VertexPermuter::new(self.min_vtx, self.max_vtx, seed);

        for (&vtx, info) in self.store.iter_mut() {
            if info.active {
                let pivot = perm.permute(vtx);
                info.my_pivot = Some(pivot);
                info.wcc_pivot = Some(pivot);
                info.my_marker = Some(vtx);
            }
        }
        self.barrier();

        // Seed the queue only with local minima of the permuter image over
        // the closed undirected neighborhood; everyone else would send
        // offers that immediately lose. Purely an optimization, the
        // propagation is correct without it.
        let mut seeded = 0u64;
        for (&vtx, info) in &self.store {
            if !info.active {
                continue;
            }
            let own = info.wcc_pivot.expect("active vertex missing pivot");
            let dominated = info
                .out_edges
                .iter()
                .chain(info.in_edges.iter())
                .any(|&nbr| perm.permute(nbr) < own);
            if !dominated {
                self.workqueue.push(Reverse((own, vtx)));
                seeded += 1;
            }
        }
        debug!("rank {} seeded {} pivot sources", self.net.rank(), seeded);

        // The barrier pumps the queue to quiescence; on completion every
        // active vertex holds its WCC-wide minimum.
        self.barrier();
    }

    /// Pops one queue entry and offers its pivot to every undirected
    /// neighbor. Returns false when the queue is empty.
    fn pump_workqueue(&mut self) -> bool {
        let Some(Reverse((pivot, vtx))) = self.workqueue.pop() else {
            return false;
        };
        let targets: Vec<u32> = match self.store.get(&vtx) {
            Some(info) if info.wcc_pivot == Some(pivot) => info
                .out_edges
                .iter()
                .chain(info.in_edges.iter())
                .copied()
                .collect(),
            // Stale entry: a lower pivot already replaced this one.
            _ => return true,
        };
        for nbr in targets {
            self.send_vertex(nbr, Msg::PivotOffer { vtx: nbr, pivot });
        }
        true
    }

    fn on_pivot_offer(&mut self, vtx: u32, pivot: u32) {
        let Some(info) = self.store.get_mut(&vtx) else {
            return;
        };
        if !info.active {
            return;
        }
        match info.wcc_pivot {
            Some(current) if pivot < current => {
                info.wcc_pivot = Some(pivot);
                self.workqueue.push(Reverse((pivot, vtx)));
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Forward/backward marking
    // ------------------------------------------------------------------

    /// Each WCC representative (the vertex whose own image equals the WCC
    /// minimum) floods its descendants and predecessors; the floods carry
    /// the representative's id and stop at WCC boundaries.
    fn mark_from_pivots(&mut self) {
        let representatives: Vec<u32> = self
            .store
            .iter()
            .filter(|(_, info)| info.active && info.wcc_pivot == info.my_pivot)
            .map(|(&vtx, _)| vtx)
            .collect();

        for vtx in representatives {
            let (pivot, preds, succs) = {
                let info = self.store.get_mut(&vtx).expect("representative owned by this rank");
                info.mark_desc = true;
                info.mark_pred = true;
                info.my_marker = Some(vtx);
                (
                    info.wcc_pivot.expect("active vertex missing pivot"),
                    info.in_edges.iter().copied().collect::<Vec<_>>(),
                    info.out_edges.iter().copied().collect::<Vec<_>>(),
                )
            };
            for nbr in preds {
                self.send_vertex(nbr, Msg::Mark { vtx: nbr, pivot, marker: vtx, direction: Direction::Backward });
            }
            for nbr in succs {
                self.send_vertex(nbr, Msg::Mark { vtx: nbr, pivot, marker: vtx, direction: Direction::Forward });
            }
        }
        self.barrier();
    }

    fn on_mark(&mut self, vtx: u32, pivot: u32, marker: u32, direction: Direction) {
        let targets: Vec<u32> = {
            let Some(info) = self.store.get_mut(&vtx) else {
                return;
            };
            if !info.active {
                return;
            }
            let already_marked = match direction {
                Direction::Forward => info.mark_desc,
                Direction::Backward => info.mark_pred,
            };
            if already_marked {
                return;
            }
            // A different wcc_pivot means a different WCC; the flood stops.
            if info.wcc_pivot != Some(pivot) {
                return;
            }
            match direction {
                Direction::Forward => info.mark_desc = true,
                Direction::Backward => info.mark_pred = true,
            }
            info.my_marker = Some(marker);
            match direction {
                Direction::Forward => info.out_edges.iter().copied().collect(),
                Direction::Backward => info.in_edges.iter().copied().collect(),
            }
        };
        for nbr in targets {
            self.send_vertex(nbr, Msg::Mark { vtx: nbr, pivot, marker, direction });
        }
    }

    // ------------------------------------------------------------------
    // Freeze & shear
    // ------------------------------------------------------------------

    /// Finalizes every vertex reached by both floods as a member of its
    /// representative's component and detaches it from the surviving
    /// graph. Returns the cluster-wide number of still-active vertices.
    fn freeze_and_detach(&mut self) -> u64 {
        let mut remaining = 0u64;
        let mut frozen = Vec::new();
        for (&vtx, info) in self.store.iter_mut() {
            if !info.active {
                continue;
            }
            if info.mark_pred && info.mark_desc {
                let marker = info.my_marker.expect("marked vertex missing marker");
                info.comp_id = Some(u64::from(marker));
                info.active = false;
                frozen.push(vtx);
            } else {
                remaining += 1;
            }
        }

        // Survivors must not keep edges into frozen territory.
        for vtx in frozen {
            let (succs, preds) = {
                let info = self.store.get_mut(&vtx).expect("frozen vertex owned by this rank");
                (
                    info.out_edges.drain().collect::<Vec<_>>(),
                    info.in_edges.drain().collect::<Vec<_>>(),
                )
            };
            for nbr in succs {
                self.send_vertex(nbr, Msg::Detach { vtx: nbr, sender: vtx, direction: Direction::Forward });
            }
            for nbr in preds {
                self.send_vertex(nbr, Msg::Detach { vtx: nbr, sender: vtx, direction: Direction::Backward });
            }
        }
        self.barrier();
        self.net.reduce_sum(remaining)
    }

    /// Removes edges whose endpoints ended the round in different marking
    /// classes, splitting each WCC into the disjoint sub-problems the next
    /// round recurses on.
    fn shear_edges(&mut self) {
        let mut probes = Vec::new();
        for (&vtx, info) in &self.store {
            if !info.active {
                continue;
            }
            for &nbr in &info.out_edges {
                probes.push((nbr, vtx, info.mark_pred, info.mark_desc));
            }
        }
        for (nbr, vtx, mark_pred, mark_desc) in probes {
            self.send_vertex(nbr, Msg::ShearProbe { vtx: nbr, sender: vtx, mark_pred, mark_desc });
        }
        self.barrier();
    }

    fn on_shear_probe(&mut self, vtx: u32, sender: u32, sender_pred: bool, sender_desc: bool) {
        let mismatch = {
            let Some(info) = self.store.get_mut(&vtx) else {
                return;
            };
            if info.mark_pred != sender_pred || info.mark_desc != sender_desc {
                info.in_edges.remove(&sender);
                true
            } else {
                false
            }
        };
        if mismatch {
            self.send_vertex(sender, Msg::ShearPrune { vtx: sender, nbr: vtx });
        }
    }

    /// Round-start reset of the per-round scratch fields of survivors.
    /// Runs after the previous round's shear has consumed the mark flags.
    fn reset_round_flags(&mut self) {
        for info in self.store.values_mut() {
            if info.active {
                info.reset_round_state();
            }
        }
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Number of components: every SCC has exactly one vertex whose label
    /// is its own id (trimmed singletons label themselves, marked
    /// components label themselves after their representative).
    fn count_sccs(&mut self) -> u64 {
        let local = self
            .store
            .iter()
            .filter(|(&vtx, info)| info.is_anchor(vtx))
            .count() as u64;
        self.net.reduce_sum(local)
    }

    /// Size of the largest component: each rank tallies its vertices'
    /// labels at the label's owning rank, then the per-rank maxima are
    /// max-reduced.
    fn count_largest_scc(&mut self) -> u64 {
        self.scc_sizes.clear();
        let labels: Vec<u64> = self
            .store
            .values()
            .map(|info| info.comp_id.expect("vertex left unlabeled after convergence"))
            .collect();
        for comp_id in labels {
            let to = self.net.owner(&comp_id);
            self.net.send(to, Msg::SccTally { comp_id });
        }
        self.barrier();

        let local_max = self.scc_sizes.values().copied().max().unwrap_or(0);
        self.net.reduce_max(local_max)
    }

    // ------------------------------------------------------------------
    // Round driver
    // ------------------------------------------------------------------

    fn run(&mut self) -> DcscSummary {
        // Permuter domain: the global id range observed at ingest.
        let local_min = self.store.keys().copied().min().map_or(u64::from(u32::MAX), u64::from);
        let local_max = self.store.keys().copied().max().map_or(0, u64::from);
        self.min_vtx = self.net.reduce_min(local_min) as u32;
        self.max_vtx = self.net.reduce_max(local_max) as u32;

        if self.net.rank() == 0 {
            println!("Starting DCSC");
        }

        let mut round = 0usize;
        let mut unterminated = self.node_count;
        while unterminated > 0 {
            let round_start = Instant::now();

            self.reset_round_flags();
            self.trim_trivial();
            self.init_wcc_pivots(round);
            self.mark_from_pivots();
            unterminated = self.freeze_and_detach();
            self.shear_edges();

            if self.net.rank() == 0 {
                println!("Iteration {} left {} unterminated.", round, unterminated);
                debug!("round {} took {:?}", round, round_start.elapsed());
            }
            round += 1;
        }
        debug_assert!(self.store.values().all(|info| !info.active));

        let scc_count = self.count_sccs();
        let largest_scc = self.count_largest_scc();

        if self.config.collect_assignments {
            for (&vtx, info) in &self.store {
                if let Some(comp_id) = info.comp_id {
                    // Undo the ingest offset on the way out.
                    self.assignments.insert(vtx - 1, comp_id);
                }
            }
        }

        DcscSummary {
            node_count: self.node_count,
            edge_count: self.edge_count,
            rounds: round,
            scc_count,
            largest_scc,
            assignments: FxHashMap::default(),
        }
    }
}

/// Byte range of the lines rank `rank` owns: a line belongs to the rank
/// whose raw `len / rank_num` slice contains the line's first byte.
fn rank_line_slice(data: &[u8], rank: usize, rank_num: usize) -> (usize, usize) {
    let len = data.len();
    let start = next_line_start(data, rank * len / rank_num);
    let end = if rank + 1 == rank_num {
        len
    } else {
        next_line_start(data, (rank + 1) * len / rank_num)
    };
    (start, end)
}

/// First line start at or after `pos`.
fn next_line_start(data: &[u8], pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut index = pos;
    while index < data.len() {
        if data[index - 1] == b'\n' {
            return index;
        }
        index += 1;
    }
    data.len()
}

#[cfg(test)]
mod test_dcsc {
    use std::sync::Arc;

    use dashmap::DashMap;
    use rustc_hash::FxHashMap;

    use super::{rank_line_slice, DcscConfig, DcscController, IngestSource, RankWorker};
    use crate::error::ErrorType;
    use crate::fabric::RankFabric;
    use crate::graph::{Msg, VtxInfo};
    use crate::util::generate_timestamp_us;

    fn controller(rank_num: usize) -> DcscController {
        DcscController::new(DcscConfig {
            rank_num,
            collect_assignments: true,
            ..DcscConfig::default()
        })
    }

    /// Sizes of the label groups in an assignment map, largest first.
    fn component_sizes(assignments: &FxHashMap<u32, u64>) -> Vec<u64> {
        let mut sizes = FxHashMap::<u64, u64>::default();
        for &comp_id in assignments.values() {
            *sizes.entry(comp_id).or_insert(0) += 1;
        }
        let mut sizes: Vec<u64> = sizes.into_values().collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    /// A single-rank worker for driving phases by hand.
    fn single_rank_worker(edges: &[(u32, u32)]) -> RankWorker {
        let endpoints = RankFabric::build::<Msg>(1);
        let mut worker = RankWorker::new(
            endpoints.into_iter().next().unwrap(),
            DcscConfig { rank_num: 1, ..DcscConfig::default() },
            Arc::new(DashMap::new()),
        );
        worker.ingest(IngestSource::Edges { edges, vertices: &[] });
        worker
    }

    fn store_snapshot(worker: &RankWorker) -> Vec<(u32, VtxInfo)> {
        let mut snapshot: Vec<(u32, VtxInfo)> = worker
            .store
            .iter()
            .map(|(&vtx, info)| (vtx, info.clone()))
            .collect();
        snapshot.sort_by_key(|(vtx, _)| *vtx);
        snapshot
    }

    #[test]
    fn test_empty_input() {
        let summary = controller(2).run_edges(&[], &[]);
        assert_eq!(summary.node_count, 0);
        assert_eq!(summary.edge_count, 0);
        assert_eq!(summary.rounds, 0);
        assert_eq!(summary.scc_count, 0);
        assert_eq!(summary.largest_scc, 0);
    }

    /// Ten declared vertices with no edges all trim away in the first
    /// round: ten singleton components, at any rank count.
    #[test]
    fn test_isolated_vertices_trim_in_first_round() {
        let vertices: Vec<u32> = (1..=10).collect();
        for rank_num in 1..=3 {
            let summary = controller(rank_num).run_edges(&[], &vertices);

            assert_eq!(summary.node_count, 10);
            assert_eq!(summary.edge_count, 0);
            assert_eq!(summary.rounds, 1);
            assert_eq!(summary.scc_count, 10);
            assert_eq!(summary.largest_scc, 1);
            assert_eq!(component_sizes(&summary.assignments), vec![1; 10]);
        }
    }

    /// A directed 4-cycle survives trimming and freezes whole in one
    /// round: a single component of size 4, at any rank count.
    #[test]
    fn test_single_cycle() {
        let edges = [(1, 2), (2, 3), (3, 4), (4, 1)];
        for rank_num in 1..=3 {
            let summary = controller(rank_num).run_edges(&edges, &[]);

            assert_eq!(summary.node_count, 4);
            assert_eq!(summary.edge_count, 4);
            assert_eq!(summary.rounds, 1);
            assert_eq!(summary.scc_count, 1);
            assert_eq!(summary.largest_scc, 4);
            assert_eq!(component_sizes(&summary.assignments), vec![4]);
        }
    }

    /// Two disjoint triangles are two independent WCCs and resolve to two
    /// components of three, at any rank count.
    #[test]
    fn test_two_triangles() {
        let edges = [(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4)];
        for rank_num in 1..=3 {
            let summary = controller(rank_num).run_edges(&edges, &[]);
            assert_eq!(summary.node_count, 6);
            assert_eq!(summary.edge_count, 6);
            assert_eq!(summary.scc_count, 2);
            assert_eq!(summary.largest_scc, 3);
            assert_eq!(component_sizes(&summary.assignments), vec![3, 3]);
        }
    }

    /// A directed path is fully resolved by cascading trim alone, inside
    /// the first round, at any rank count.
    #[test]
    fn test_path_resolves_during_trim() {
        let edges = [(1, 2), (2, 3), (3, 4), (4, 5)];
        for rank_num in 1..=3 {
            let summary = controller(rank_num).run_edges(&edges, &[]);

            assert_eq!(summary.node_count, 5);
            assert_eq!(summary.rounds, 1);
            assert_eq!(summary.scc_count, 5);
            assert_eq!(summary.largest_scc, 1);
        }
    }

    /// Two triangles joined by a bridge form one WCC. The first round
    /// freezes the representative's triangle; shearing and freeze-time
    /// detachment split off the other triangle, which resolves in round
    /// two.
    #[test]
    fn test_bowtie_takes_two_rounds() {
        let edges = [(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4), (3, 4)];
        for rank_num in 1..=3 {
            let summary = controller(rank_num).run_edges(&edges, &[]);
            assert_eq!(summary.node_count, 6);
            assert_eq!(summary.edge_count, 7);
            assert_eq!(summary.rounds, 2);
            assert_eq!(summary.scc_count, 2);
            assert_eq!(summary.largest_scc, 3);
            assert_eq!(component_sizes(&summary.assignments), vec![3, 3]);
        }
    }

    /// A self-loop with no other adjacency is strongly connected to itself
    /// only: one component of size one, resolved by marking, not trim.
    #[test]
    fn test_self_loop_singleton() {
        let summary = controller(2).run_edges(&[(3, 3)], &[]);
        assert_eq!(summary.node_count, 1);
        assert_eq!(summary.edge_count, 1);
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.scc_count, 1);
        assert_eq!(summary.largest_scc, 1);
    }

    /// Identical seed schedule and rank count give identical labels.
    #[test]
    fn test_deterministic_labels_for_same_seed() {
        let edges = [(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4), (3, 4)];
        let first = controller(2).run_edges(&edges, &[]);
        let second = controller(2).run_edges(&edges, &[]);
        assert_eq!(first.assignments, second.assignments);
    }

    /// Aggregate results do not depend on the partitioning.
    #[test]
    fn test_rank_counts_agree() {
        let edges = [(1, 2), (2, 3), (3, 1), (3, 4), (4, 5), (5, 6), (6, 4), (6, 7)];
        let baseline = controller(1).run_edges(&edges, &[]);
        for rank_num in 2..=4 {
            let summary = controller(rank_num).run_edges(&edges, &[]);
            assert_eq!(summary.scc_count, baseline.scc_count);
            assert_eq!(summary.largest_scc, baseline.largest_scc);
            assert_eq!(summary.node_count, baseline.node_count);
            assert_eq!(summary.edge_count, baseline.edge_count);
        }
    }

    /// Trimming is idempotent: a second pass over an already-trimmed store
    /// changes nothing.
    #[test]
    fn test_trim_twice_is_idempotent() {
        let mut worker = single_rank_worker(&[(1, 2), (2, 3), (3, 1), (3, 4)]);
        worker.trim_trivial();
        let after_once = store_snapshot(&worker);
        worker.trim_trivial();
        assert_eq!(after_once, store_snapshot(&worker));
    }

    /// Edge symmetry holds at the barrier after trimming: v is a successor
    /// of u exactly when u is a predecessor of v.
    #[test]
    fn test_edge_symmetry_after_trim() {
        let mut worker = single_rank_worker(&[(1, 2), (2, 3), (3, 1), (3, 4), (4, 5)]);
        worker.trim_trivial();

        for (&vtx, info) in &worker.store {
            for &nbr in &info.out_edges {
                assert!(worker.store[&nbr].in_edges.contains(&vtx));
            }
            for &nbr in &info.in_edges {
                assert!(worker.store[&nbr].out_edges.contains(&vtx));
            }
        }
    }

    /// Comments, blank lines, malformed lines and duplicate edges in an
    /// input file: only well-formed distinct edges survive ingest.
    #[test]
    fn test_ingest_file_with_junk_lines() {
        let path = std::env::temp_dir()
            .join(format!("dcsc_ingest_{}.edges", generate_timestamp_us()));
        std::fs::write(&path, "# comment\n1 2\n2 1\n\n1 2\nbogus line\n3 3\n2 1 17\n")
            .unwrap();

        let summary = controller(2).run_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.edge_count, 3);
        assert_eq!(summary.scc_count, 2);
        assert_eq!(summary.largest_scc, 2);
    }

    /// A zero-length edge list is valid input: no vertices, no rounds, no
    /// components, and a clean return rather than a worker panic.
    #[test]
    fn test_empty_file() {
        let path = std::env::temp_dir()
            .join(format!("dcsc_empty_{}.edges", generate_timestamp_us()));
        std::fs::write(&path, "").unwrap();

        let summary = controller(2).run_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary.node_count, 0);
        assert_eq!(summary.edge_count, 0);
        assert_eq!(summary.rounds, 0);
        assert_eq!(summary.scc_count, 0);
        assert_eq!(summary.largest_scc, 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir()
            .join(format!("dcsc_missing_{}.edges", generate_timestamp_us()));
        let error = controller(1).run_file(&path).unwrap_err();
        assert_eq!(error.error_type(), ErrorType::Io);
    }

    /// Rank line slices cover the file without overlap and only cut at
    /// line boundaries.
    #[test]
    fn test_rank_line_slices_partition_lines() {
        let data = b"1 2\n33 44\n5 6\n7 8\n9 10\n";
        for rank_num in 1..=5 {
            let mut previous_end = 0;
            for rank in 0..rank_num {
                let (start, end) = rank_line_slice(data, rank, rank_num);
                assert_eq!(start, previous_end);
                assert!(start == 0 || data[start - 1] == b'\n');
                previous_end = end;
            }
            assert_eq!(previous_end, data.len());
        }
    }
}
