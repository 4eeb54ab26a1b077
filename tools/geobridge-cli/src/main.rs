use anyhow::Result;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::Duration;

mod scenario;

use scenario::{Scenario, replay};

#[derive(Parser)]
#[command(name = "geobridge")]
#[command(about = "Replays location bridge scenarios against a simulated engine", long_about = None)]
struct Cli {
    /// Deadline of safeStopWatch in milliseconds, unless the scenario sets one
    #[arg(long, global = true, default_value_t = 2000)]
    stop_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the built-in demo scenario
    Demo,
    /// Replay a scenario file
    Run {
        /// Path to the JSON scenario
        scenario: PathBuf,
    },
    /// Print the built-in demo scenario as a starting point
    Template,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let stop_timeout = Duration::from_millis(cli.stop_timeout_ms);

    let scenario = match cli.command {
        Commands::Demo => Scenario::demo()?,
        Commands::Run { scenario } => Scenario::load(&scenario)?,
        Commands::Template => {
            print!("{}", scenario::DEMO);
            return Ok(());
        }
    };

    println!("{}", "Replaying location scenario...".green().bold());
    let summary = replay(&scenario, stop_timeout)?;
    println!(
        "{} {} resolved, {} rejected",
        "Done:".green().bold(),
        summary.resolved,
        summary.rejected
    );
    Ok(())
}
