use chrono::Local;
use log::{Level, Log, Metadata, Record};

use crate::error::{internal_error, DcscError};

struct DcscLogger {
    level: Level,
}

impl Log for DcscLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    #[allow(clippy::print_stdout)]
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!(
                "{} {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
                record.level().to_string(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the process-wide logger at the given level. Diagnostic output
/// (phase timings, per-round counters) goes through the `log` facade; the
/// result lines the driver is required to emit stay on plain stdout.
pub fn init_logger_with_level(level: Level) -> Result<(), DcscError> {
    let logger = DcscLogger { level };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| internal_error(format!("Could not set logger: {}", e)))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}
