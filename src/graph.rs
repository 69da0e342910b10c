use rustc_hash::FxHashSet;

/// Per-vertex record of the distributed vertex store.
///
/// The id space is fixed at ingest; afterwards only the adjacency sets and
/// the flags mutate. The record is owned by exactly one rank and only ever
/// mutated by that rank's dispatch loop, one message at a time.
///
/// Invariants maintained at every barrier boundary:
/// - edge symmetry: `v ∈ u.out_edges` iff `u ∈ v.in_edges`
/// - once `active` is false, `comp_id` is set and no adjacency set anywhere
///   still references this vertex
/// - `wcc_pivot` only ever decreases within one pivot-selection phase
#[derive(Debug, Clone, PartialEq)]
pub struct VtxInfo {
    /// Successors along active edges.
    pub out_edges: FxHashSet<u32>,
    /// Predecessors along active edges.
    pub in_edges: FxHashSet<u32>,

    /// Final SCC label once frozen; `None` while active.
    pub comp_id: Option<u64>,
    /// True until the vertex is assigned a final SCC.
    pub active: bool,

    /// Id of the WCC representative this vertex was claimed by.
    pub my_marker: Option<u32>,
    /// This vertex's own permuter image for the current round.
    pub my_pivot: Option<u32>,
    /// Lowest permuter image seen over the vertex's weakly connected
    /// component so far.
    pub wcc_pivot: Option<u32>,

    /// Reached by the backward flood from the representative.
    pub mark_pred: bool,
    /// Reached by the forward flood from the representative.
    pub mark_desc: bool,
}

impl Default for VtxInfo {
    fn default() -> Self {
        Self {
            out_edges: FxHashSet::default(),
            in_edges: FxHashSet::default(),
            comp_id: None,
            active: true,
            my_marker: None,
            my_pivot: None,
            wcc_pivot: None,
            mark_pred: false,
            mark_desc: false,
        }
    }
}

impl VtxInfo {
    /// True when this vertex anchors its component (one per SCC).
    pub fn is_anchor(&self, vtx: u32) -> bool {
        self.comp_id == Some(u64::from(vtx))
    }

    /// Clears the per-round scratch state of a vertex that survived freeze.
    pub fn reset_round_state(&mut self) {
        self.mark_pred = false;
        self.mark_desc = false;
        self.my_marker = None;
        self.my_pivot = None;
        self.wcc_pivot = None;
    }
}

/// Which side of an edge a trim/mark/detach message travels along.
///
/// `Forward` follows out-edges (sender is a predecessor of the target),
/// `Backward` follows in-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Asynchronous visit, addressed by target key. The dispatch loop on the
/// owning rank decodes the variant and mutates the target record with
/// exclusive access; handlers that fan out submit further messages of the
/// same kind, which the enclosing barrier drains transitively.
#[derive(Debug, Clone)]
pub enum Msg {
    /// Ensure a record exists for `vtx` (isolated vertices have no edge to
    /// create them as a side effect).
    Declare { vtx: u32 },
    /// Insert `dst` into the successor set of `vtx`.
    AddOut { vtx: u32, dst: u32 },
    /// Insert `src` into the predecessor set of `vtx`.
    AddIn { vtx: u32, src: u32 },
    /// `sender` was trimmed; erase it from the given side of `vtx` and
    /// cascade if `vtx` became trimmable.
    Trim { vtx: u32, sender: u32, direction: Direction },
    /// Candidate WCC pivot for `vtx`; kept only if it lowers `wcc_pivot`.
    PivotOffer { vtx: u32, pivot: u32 },
    /// Forward/backward reachability flood within the WCC whose
    /// representative's image is `pivot`.
    Mark { vtx: u32, pivot: u32, marker: u32, direction: Direction },
    /// `sender` froze this round; erase it from the given side of `vtx`.
    /// Unlike `Trim`, never cascades.
    Detach { vtx: u32, sender: u32, direction: Direction },
    /// Marking-class comparison for the edge `sender -> vtx`; mismatch
    /// removes the edge on both sides.
    ShearProbe { vtx: u32, sender: u32, mark_pred: bool, mark_desc: bool },
    /// Second half of a shear removal: erase `nbr` from `vtx`'s successors.
    ShearPrune { vtx: u32, nbr: u32 },
    /// One vertex finalized with label `comp_id`; tallied by the label's
    /// owning rank when sizing components.
    SccTally { comp_id: u64 },
}

/// Parses one edge-list line into a raw `(src, dst)` pair.
///
/// Empty lines and lines starting with `#` are skipped, as is any line that
/// does not begin with two non-negative decimal integers. Tokens after the
/// first two are ignored.
pub fn parse_edge_line(line: &str) -> Option<(u32, u32)> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut tokens = line.split_whitespace();
    let src = tokens.next()?.parse().ok()?;
    let dst = tokens.next()?.parse().ok()?;
    Some((src, dst))
}

#[cfg(test)]
mod test_graph {
    use super::{parse_edge_line, VtxInfo};

    #[test]
    fn test_fresh_record_is_active() {
        let info = VtxInfo::default();
        assert!(info.active);
        assert_eq!(info.comp_id, None);
        assert!(info.out_edges.is_empty());
        assert!(info.in_edges.is_empty());
    }

    #[test]
    fn test_parse_valid_lines() {
        assert_eq!(parse_edge_line("12 34"), Some((12, 34)));
        assert_eq!(parse_edge_line("0 0"), Some((0, 0)));
        assert_eq!(parse_edge_line("  7\t9  "), Some((7, 9)));
        // Trailing tokens are ignored, matching stream extraction semantics.
        assert_eq!(parse_edge_line("1 2 weight=3"), Some((1, 2)));
    }

    #[test]
    fn test_parse_skipped_lines() {
        assert_eq!(parse_edge_line(""), None);
        assert_eq!(parse_edge_line("# a comment"), None);
        assert_eq!(parse_edge_line("#1 2"), None);
        assert_eq!(parse_edge_line("one two"), None);
        assert_eq!(parse_edge_line("42"), None);
        assert_eq!(parse_edge_line("-1 2"), None);
        assert_eq!(parse_edge_line("1.5 2"), None);
    }
}
