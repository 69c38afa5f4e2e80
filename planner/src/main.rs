//! Dynamic pool planning CLI.
//!
//! Usage:
//!   plan-pool --tle data/starlink.tle --tle data/oneweb.tle \
//!             --output-dir data/leo_outputs
//!
//! Exit codes: 0 success, 2 feasibility not achieved (artifacts still
//! written), 3 fatal stage error, 4 invalid configuration.

use anyhow::Context;
use clap::Parser;
use planner::{
    run_pipeline, PlannerConfig, EXIT_CONFIG_INVALID, EXIT_STAGE_FAILURE,
};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "plan-pool",
    about = "Plan a handover-ready LEO satellite pool for a fixed observer"
)]
struct Args {
    /// TLE catalog file(s), Celestrak three-line format. Repeatable.
    #[arg(short, long, required = true)]
    tle: Vec<PathBuf>,

    /// JSON configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Permanent bucket for downstream artifacts.
    #[arg(short, long, default_value = "data/leo_outputs")]
    output_dir: PathBuf,

    /// Temporary bucket for large working artifacts.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to initialize logging");
    }

    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration rejected: {e:#}");
            return EXIT_CONFIG_INVALID;
        }
    };

    let tle_text = match read_catalogs(&args.tle) {
        Ok(text) => text,
        Err(e) => {
            error!("TLE input unreadable: {e:#}");
            return EXIT_STAGE_FAILURE;
        }
    };

    let temp_dir = args
        .temp_dir
        .unwrap_or_else(|| std::env::temp_dir().join("leo_temporary_outputs"));

    info!("temporary bucket: {}", temp_dir.display());
    info!("permanent bucket: {}", args.output_dir.display());

    match run_pipeline(&tle_text, &config, &temp_dir, &args.output_dir) {
        Ok(outcome) => {
            info!(
                starlink = outcome.solution.starlink_members.len(),
                oneweb = outcome.solution.oneweb_members.len(),
                events = outcome.events_total,
                feasible = outcome.solution.feasible,
                "planning finished"
            );
            outcome.exit_code
        }
        Err(e) => {
            error!("pipeline aborted: {e}");
            EXIT_STAGE_FAILURE
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<PlannerConfig> {
    match &args.config {
        Some(path) => {
            PlannerConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            let config = PlannerConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn read_catalogs(paths: &[PathBuf]) -> anyhow::Result<String> {
    let mut text = String::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        text.push_str(&content);
        if !content.ends_with('\n') {
            text.push('\n');
        }
    }
    Ok(text)
}
