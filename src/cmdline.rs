use std::path::PathBuf;

use clap::ValueHint::FilePath;
use clap::{Args, Parser, Subcommand};
use log::{debug, info};

use crate::error::Error;
use crate::session::Session;
use crate::stores;
use crate::workload::PhasedWorkload;
use crate::RunOptions;

#[derive(Args, Debug)]
struct RunArgs {
    /// Store configuration file (the `[map]` section).
    #[arg(short = 's')]
    #[arg(value_hint = FilePath)]
    store_config: String,

    /// Workload configuration file.
    #[arg(short = 'w')]
    #[arg(value_hint = FilePath)]
    workload_config: String,

    /// Number of worker threads (and producers).
    #[arg(short = 't', default_value_t = 1)]
    threads: usize,

    /// Master PRNG seed; reruns with the same seed reproduce the same request streams.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Override the workload's record size in bytes.
    #[arg(long)]
    record_size_bytes: Option<usize>,

    /// Pin worker threads to these cores (comma-separated, one per thread).
    #[arg(long, value_delimiter = ',')]
    pin: Option<Vec<usize>>,

    /// Skip the initial bulk load.
    #[arg(long)]
    skip_load: bool,

    /// Time every Nth request.
    #[arg(long, default_value_t = 1)]
    latency_sample_period: u64,

    /// Write a throughput sample every N requests (0 disables).
    #[arg(long, default_value_t = 0)]
    throughput_sample_period: u64,

    /// Directory for throughput sample files.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Prefix for throughput sample file names.
    #[arg(long, default_value = "throughput-")]
    throughput_output_file_prefix: String,

    /// Abort if any database operation reports failure.
    #[arg(long)]
    expect_request_success: bool,

    /// Abort if a scan returns fewer records than requested.
    #[arg(long)]
    expect_scan_amount_found: bool,

    /// Print the result as a CSV row instead of the human-readable report.
    #[arg(long)]
    csv: bool,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workload against a store.
    Run(RunArgs),
}

fn run_cli(args: &RunArgs) -> Result<(), Error> {
    let store_text = std::fs::read_to_string(&args.store_config)?;
    let store = stores::build_from_toml_str(&store_text)?;
    let workload = PhasedWorkload::load_from(
        &args.workload_config,
        args.seed,
        args.record_size_bytes.unwrap_or(0),
    )?;

    let mut session = match &args.pin {
        Some(core_map) => Session::with_core_map(store, args.threads, core_map.clone())?,
        None => Session::new(store, args.threads)?,
    };
    session.initialize();

    if !args.skip_load {
        let load = workload.load_trace(true)?;
        info!("bulk loading {} records", load.len());
        let load_result = session.replay_bulk_load(&load)?;
        info!(
            "bulk load finished in {} us",
            load_result.run_time().as_micros()
        );
    }

    let options = RunOptions {
        latency_sample_period: args.latency_sample_period,
        throughput_sample_period: args.throughput_sample_period,
        output_dir: args.output_dir.clone(),
        throughput_output_file_prefix: args.throughput_output_file_prefix.clone(),
        expect_request_success: args.expect_request_success,
        expect_scan_amount_found: args.expect_scan_amount_found,
    };
    let result = session.run_workload(&workload, &options)?;

    if args.csv {
        let mut stdout = std::io::stdout().lock();
        result.write_csv(&mut stdout, true)?;
    } else {
        println!("{}", result);
    }

    session.terminate();
    Ok(())
}

/// The default command line entry point, reusable from custom `main` functions after
/// registering your own stores.
pub fn cmdline() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("Starting phasebench with args: {:?}", cli);
    match cli.command {
        Commands::Run(args) => run_cli(&args),
    }
}
