use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond-precision timestamp since the Unix epoch. Used to stamp
/// uniquely named scratch files in the test suite.
///
/// # Panics
/// Panics if the system clock reads before the epoch.
pub fn generate_timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_micros() as u64
}
