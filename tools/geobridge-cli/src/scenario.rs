use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::executor::block_on;
use geobridge_bridge::{EventName, LocationPlugin};
use geobridge_location::{RawFix, SessionKind};
use geobridge_provider_sim::SimProvider;
use owo_colors::OwoColorize;
use serde::Deserialize;
use serde_json::Value;

pub const DEMO: &str = include_str!("../scenarios/demo.json");

/// A scripted session against the simulated engine.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stop_timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub auto_privacy: bool,
    pub steps: Vec<Step>,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Calls a bridge method.
    Invoke {
        method: String,
        #[serde(default)]
        args: Value,
    },
    /// Scripts the determination of the next one-shot client.
    QueueOnce { fix: Option<RawFix> },
    /// Delivers a determination to the latest client of `kind`.
    Push {
        #[serde(default = "watch_kind")]
        kind: SessionKind,
        fix: Option<RawFix>,
    },
    /// Makes the first stop of clients built afterwards block.
    StallStop { ms: u64 },
    FailCreate { enabled: bool },
    FailStart { enabled: bool },
    FailStop { enabled: bool },
    RejectPrivacy { enabled: bool },
    SafeStopWatch,
    Sleep { ms: u64 },
}

const fn watch_kind() -> SessionKind {
    SessionKind::Watch
}

impl Scenario {
    pub fn demo() -> Result<Self> {
        serde_json::from_str(DEMO).context("Parse built-in demo scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Read scenario {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Parse scenario {}", path.display()))
    }
}

/// Outcome counts of a replay.
#[derive(Debug, Default)]
pub struct Summary {
    pub resolved: usize,
    pub rejected: usize,
}

pub fn replay(scenario: &Scenario, stop_timeout: Duration) -> Result<Summary> {
    if let Some(name) = &scenario.name {
        println!("{} {}", "scenario:".bold(), name.cyan());
    }

    let sim = Arc::new(SimProvider::new());
    let stop_timeout = scenario
        .stop_timeout_ms
        .map_or(stop_timeout, Duration::from_millis);
    let plugin = LocationPlugin::builder()
        .auto_privacy(scenario.auto_privacy)
        .stop_timeout(stop_timeout)
        .build(sim.clone())
        .context("Load location plugin")?;

    for event in [EventName::LocationUpdate, EventName::LocationError] {
        plugin.add_listener(event, move |payload| {
            println!("  {} {} {payload}", "event".magenta(), event.as_str().bold());
        });
    }

    let mut summary = Summary::default();
    for (index, step) in scenario.steps.iter().enumerate() {
        let label = format!("[{:>2}]", index + 1);
        match step {
            Step::Invoke { method, args } => {
                println!("{} {} {}", label.dimmed(), "invoke".blue(), method.bold());
                match block_on(plugin.invoke(method, args.clone())) {
                    Ok(value) => {
                        summary.resolved += 1;
                        println!("  {} {value}", "resolve".green());
                    }
                    Err(rejection) => {
                        summary.rejected += 1;
                        println!(
                            "  {} {} {}",
                            "reject".red(),
                            rejection.code.red().bold(),
                            rejection.message
                        );
                    }
                }
            }
            Step::QueueOnce { fix } => {
                println!("{} queue one-shot determination", label.dimmed());
                sim.queue_once(fix.clone());
            }
            Step::Push { kind, fix } => {
                println!("{} push to {kind} client", label.dimmed());
                if !sim.push(*kind, fix.clone()) {
                    println!("  {} no live {kind} client", "skipped".yellow());
                }
            }
            Step::StallStop { ms } => {
                println!("{} stall next stop for {ms}ms", label.dimmed());
                sim.stall_stop(Some(Duration::from_millis(*ms)));
            }
            Step::FailCreate { enabled } => sim.fail_create(*enabled),
            Step::FailStart { enabled } => sim.fail_start(*enabled),
            Step::FailStop { enabled } => sim.fail_stop(*enabled),
            Step::RejectPrivacy { enabled } => sim.reject_privacy(*enabled),
            Step::SafeStopWatch => {
                println!("{} {}", label.dimmed(), "safeStopWatch".blue());
                let outcome = plugin.safe_stop_watch();
                let path = if outcome.is_forced() {
                    "forced".yellow().to_string()
                } else {
                    "stopped".green().to_string()
                };
                println!(
                    "  {path}: {} released, {} fault(s)",
                    outcome.report().released.len(),
                    outcome.report().faults.len()
                );
            }
            Step::Sleep { ms } => thread::sleep(Duration::from_millis(*ms)),
        }
        // Let the pump print events raised by this step before the next one.
        thread::sleep(Duration::from_millis(20));
    }

    plugin.unload();
    Ok(summary)
}
