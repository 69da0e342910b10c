/// Base value of the per-round permuter seed schedule. Round `r` seeds its
/// permuter with `GOLDEN_RATIO_SEED + r`, so every rank derives the same
/// permutation without communicating.
pub const GOLDEN_RATIO_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Default number of rank executors when the CLI does not override it.
pub const DEFAULT_RANK_NUM: usize = 4;

/// How many parsed lines rank 0 scans between ingest spinner ticks.
pub const SPINNER_TICK_LINES: u64 = 100_000;
