// IO and wall-clock accounting for the batch run.
use std::fmt;
use std::time::{Duration, Instant};

/// Process-level IO counters sampled around a measured block.
///
/// A DCSC run is ingest-heavy: the edge list is scanned exactly once and
/// everything afterwards is memory-resident, so the interesting signal is
/// how many bytes the ingest actually pulled in versus the wall clock of the
/// rounds that follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_syscalls: u64,
    pub write_syscalls: u64,
}

impl IoStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter delta against an earlier snapshot. Saturating, so a counter
    /// reset never produces a bogus huge value.
    pub fn diff(&self, other: &IoStats) -> IoStats {
        IoStats {
            read_bytes: self.read_bytes.saturating_sub(other.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(other.write_bytes),
            read_syscalls: self.read_syscalls.saturating_sub(other.read_syscalls),
            write_syscalls: self.write_syscalls.saturating_sub(other.write_syscalls),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.read_bytes + self.write_bytes
    }

    pub fn has_io(&self) -> bool {
        self.total_bytes() > 0 || self.read_syscalls + self.write_syscalls > 0
    }
}

impl fmt::Display for IoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IO: read {} bytes ({} syscalls), write {} bytes ({} syscalls)",
            self.read_bytes, self.read_syscalls, self.write_bytes, self.write_syscalls
        )
    }
}

/// Return value of a measured block together with its duration and the IO
/// it performed.
pub struct ExecutionResult<T> {
    pub result: T,
    pub duration: Duration,
    pub io_stats: IoStats,
}

impl<T> ExecutionResult<T> {
    /// One-line summary, suitable for the end-of-run report.
    pub fn print_summary(&self, operation_name: &str) {
        println!(
            "{}: Time {:?}, IO {} bytes",
            operation_name,
            self.duration,
            self.io_stats.total_bytes()
        );
    }
}

/// Samples `/proc/self/io` before and after a block to attribute IO to it.
pub struct IoStatsCollector;

impl IoStatsCollector {
    #[cfg(target_os = "linux")]
    fn current() -> std::io::Result<IoStats> {
        let content = std::fs::read_to_string("/proc/self/io")?;
        let mut stats = IoStats::new();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(field), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Ok(value) = value.parse::<u64>() else {
                continue;
            };
            match field {
                "read_bytes:" => stats.read_bytes = value,
                "write_bytes:" => stats.write_bytes = value,
                "syscr:" => stats.read_syscalls = value,
                "syscw:" => stats.write_syscalls = value,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Fallback where per-process IO accounting is unavailable.
    #[cfg(not(target_os = "linux"))]
    fn current() -> std::io::Result<IoStats> {
        Ok(IoStats::new())
    }

    /// Runs `f`, returning its result plus duration and attributed IO.
    pub fn measure<F, R>(f: F) -> ExecutionResult<R>
    where
        F: FnOnce() -> R,
    {
        let start_io = Self::current().unwrap_or_default();
        let start_time = Instant::now();

        let result = f();

        let duration = start_time.elapsed();
        let end_io = Self::current().unwrap_or_default();

        ExecutionResult { result, duration, io_stats: end_io.diff(&start_io) }
    }
}

/// Measures a block and prints its one-line summary under the given name.
#[macro_export]
macro_rules! measure_io {
    ($name:expr, $block:expr) => {{
        let execution = $crate::stats::IoStatsCollector::measure(|| $block);
        execution.print_summary($name);
        execution.result
    }};
}

#[cfg(test)]
mod test_stats {
    use super::{IoStats, IoStatsCollector};

    #[test]
    fn test_diff_saturates() {
        let before = IoStats { read_bytes: 100, write_bytes: 5, read_syscalls: 2, write_syscalls: 1 };
        let after = IoStats { read_bytes: 160, write_bytes: 0, read_syscalls: 4, write_syscalls: 0 };
        let delta = after.diff(&before);
        assert_eq!(delta.read_bytes, 60);
        assert_eq!(delta.write_bytes, 0);
        assert_eq!(delta.read_syscalls, 2);
        assert_eq!(delta.write_syscalls, 0);
    }

    #[test]
    fn test_measure_returns_result() {
        let execution = IoStatsCollector::measure(|| 21 * 2);
        assert_eq!(execution.result, 42);
    }
}
