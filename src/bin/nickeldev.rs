//! Print the device table compiled into a libnickel image.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use nickelscan::config::RecoveryConfig;
use nickelscan::io::{IOLimits, MappedImage};
use nickelscan::logging;
use nickelscan::memory::VirtualAddressSpace;
use nickelscan::recovery::{self, DeviceRecord};

#[derive(Debug, Parser)]
#[command(name = "nickeldev", version)]
#[command(about = "Print the device table compiled into a libnickel image")]
#[command(after_help = "compatibility: works with 20400+, tested up to 175773")]
struct Args {
    /// Path to libnickel.so
    #[arg(value_name = "LIBNICKEL_PATH")]
    path: PathBuf,

    /// Print records as a JSON array
    #[arg(short, long)]
    json: bool,

    /// JSON recovery configuration (markers, layout, limits)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More logging on stderr (repeatable; RUST_LOG overrides)
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn run(args: &Args) -> Result<Vec<DeviceRecord>> {
    let image = MappedImage::open(&args.path, &IOLimits::default())
        .with_context(|| format!("open {}", args.path.display()))?;
    let elf = nickelscan::formats::elf::load(image.as_bytes())
        .with_context(|| format!("read segment table of {}", args.path.display()))?;

    let mut config = match &args.config {
        Some(path) => RecoveryConfig::from_json_file(path)?,
        None => RecoveryConfig::default(),
    };
    config.layout = Some(config.effective_layout(Some(elf.default_layout())));

    let space = VirtualAddressSpace::new(elf.segments, &image);
    let records = recovery::recover(&space, &config).context("scan for device info table")?;
    Ok(records)
}

fn print_table(records: &[DeviceRecord]) {
    println!(
        "| {:<36} | {:<20} | {:<20} | {:<26} |",
        "ID", "Codename", "Family", "Name"
    );
    println!(
        "| {:<36} | {:<20} | {:<20} | {:<26} |",
        "---", "---", "---", "---"
    );
    for d in records {
        println!(
            "| {:<36} | {:<20} | {:<20} | {:<26} |",
            d.id, d.codename, d.family, d.name
        );
    }
}

fn main() -> ExitCode {
    // usage errors exit with status 2
    let args = Args::parse();
    let level = logging::level_for_verbosity(args.verbose);
    if args.log_json {
        logging::init_tracing_json(level);
    } else {
        logging::init_tracing(level);
    }

    let records = match run(&args) {
        Ok(records) => records,
        Err(err) => {
            eprintln!("nickeldev: error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&records) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("nickeldev: error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_table(&records);
    }
    ExitCode::SUCCESS
}
