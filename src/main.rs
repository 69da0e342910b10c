use std::path::PathBuf;

use clap::Parser;
use log::Level;
use serde::Serialize;

use dcsc::algorithms::dcsc::{DcscConfig, DcscController};
use dcsc::config::DEFAULT_RANK_NUM;
use dcsc::error::ErrorType;
use dcsc::logger::init_logger_with_level;
use dcsc::measure_io;

#[derive(Parser, Debug, Serialize)]
#[command(author, version, about)]
struct Args {
    /// Path of the edge list file (one "src dst" pair per line).
    edgelist: PathBuf,

    /// Number of rank executors.
    #[arg(short, long, default_value_t = DEFAULT_RANK_NUM)]
    ranks: usize,

    /// Base seed of the per-round pivot permutations.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Logging verbosity (error, warn, info, debug, trace).
    #[arg(short, long, default_value_t = String::from("info"))]
    log_level: String,
}

fn main() {
    // A missing or malformed argument is a usage error, reported on stderr
    // with exit code 1.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };

    let level = args.log_level.parse::<Level>().unwrap_or(Level::Info);
    if let Err(error) = init_logger_with_level(level) {
        eprintln!("{}", error);
    }

    let mut config = DcscConfig { rank_num: args.ranks.max(1), ..DcscConfig::default() };
    if let Some(seed) = args.seed {
        config.seed_base = seed;
    }

    let controller = DcscController::new(config);
    let result = measure_io!("DCSC", controller.run_file(&args.edgelist));

    match result {
        Ok(summary) => {
            println!("Converged to final SCCs. Enumerated {}", summary.scc_count);
            println!("Largest SCC contains {}", summary.largest_scc);
        }
        Err(error) => {
            eprintln!("{}", error);
            let code = match error.error_type() {
                ErrorType::Usage => 1,
                _ => 2,
            };
            std::process::exit(code);
        }
    }
}
