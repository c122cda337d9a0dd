// CLI entry point for running a lemmings level without a renderer.
//
// Loads a level JSON (and optionally a `GameConfig` JSON and an action
// script), steps the simulation at a fixed frame delta until the level ends
// or the wall-clock budget runs out, then prints a JSON summary to stdout.
// Logging goes to stderr through `tracing-subscriber`; set `RUST_LOG` to
// change the filter (default `info`).
//
// Usage:
//   lemmings_headless --level <PATH> [OPTIONS]
//     --config <PATH>     GameConfig JSON (default: built-in tuning)
//     --script <PATH>     JSON list of { "at_ms", "action" } entries
//     --seed <N>          PRNG seed (default: 0)
//     --dt <MS>           Frame delta fed to each step (default: 16.667)
//     --max-secs <S>      Wall-clock budget in fed seconds (default: 3600)
//     --events            Also print every event as a JSON line
//
// Script times are measured in fed frame time, the same clock `--dt`
// advances, so a script replays identically at any speed setting.

use lemmings_sim::command::{ScriptedAction, SimAction};
use lemmings_sim::config::GameConfig;
use lemmings_sim::event::LevelOutcome;
use lemmings_sim::level::LevelDef;
use lemmings_sim::sim::{LevelStats, SimState};
use lemmings_sim::types::Ability;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct RunArgs {
    level: PathBuf,
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    seed: u64,
    dt_ms: f32,
    max_secs: f32,
    print_events: bool,
}

/// Printed to stdout when the run finishes.
#[derive(Serialize)]
struct RunSummary {
    level_id: u32,
    level_name: String,
    seed: u64,
    ticks: u64,
    fed_ms: f32,
    /// `None` if the wall-clock budget ran out first.
    outcome: Option<LevelOutcome>,
    stats: LevelStats,
    abilities_left: BTreeMap<Ability, u32>,
}

fn main() {
    init_tracing();
    let args = parse_args();

    let level = load_or_exit("level", || load_level(&args.level));
    let config = match &args.config {
        Some(path) => load_or_exit("config", || load_config(path)),
        None => GameConfig::default(),
    };
    let script = match &args.script {
        Some(path) => load_or_exit("script", || load_script(path)),
        None => Vec::new(),
    };

    let summary = run(&level, config, Script::new(script), &args);
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error = %e, "failed to serialize summary");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> RunArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut level = None;
    let mut out = RunArgs {
        level: PathBuf::new(),
        config: None,
        script: None,
        seed: 0,
        dt_ms: 1000.0 / 60.0,
        max_secs: 3600.0,
        print_events: false,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--level" => {
                i += 1;
                level = Some(PathBuf::from(value(&args, i, "--level")));
            }
            "--config" => {
                i += 1;
                out.config = Some(PathBuf::from(value(&args, i, "--config")));
            }
            "--script" => {
                i += 1;
                out.script = Some(PathBuf::from(value(&args, i, "--script")));
            }
            "--seed" => {
                i += 1;
                out.seed = parsed(&args, i, "--seed");
            }
            "--dt" => {
                i += 1;
                out.dt_ms = parsed(&args, i, "--dt");
            }
            "--max-secs" => {
                i += 1;
                out.max_secs = parsed(&args, i, "--max-secs");
            }
            "--events" => out.print_events = true,
            "--help" | "-h" => {
                println!("Usage: lemmings_headless --level <PATH> [OPTIONS]");
                println!("  --config <PATH>     GameConfig JSON");
                println!("  --script <PATH>     Action script JSON");
                println!("  --seed <N>          PRNG seed (default: 0)");
                println!("  --dt <MS>           Frame delta (default: 16.667)");
                println!("  --max-secs <S>      Wall-clock budget (default: 3600)");
                println!("  --events            Print every event as a JSON line");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    match level {
        Some(path) => out.level = path,
        None => {
            eprintln!("--level is required");
            std::process::exit(1);
        }
    }
    if !out.dt_ms.is_finite() || out.dt_ms <= 0.0 {
        eprintln!("--dt must be a positive number of milliseconds");
        std::process::exit(1);
    }
    out
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    args.get(i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("{flag} requires a value");
        std::process::exit(1);
    })
}

fn parsed<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    value(args, i, flag).parse().unwrap_or_else(|_| {
        eprintln!("{flag} requires a valid number");
        std::process::exit(1);
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_or_exit<T>(what: &str, load: impl FnOnce() -> Result<T, String>) -> T {
    load().unwrap_or_else(|e| {
        error!(error = %e, "failed to load {what}");
        std::process::exit(1);
    })
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))
}

fn load_level(path: &Path) -> Result<LevelDef, String> {
    LevelDef::from_json(&read(path)?).map_err(|e| format!("{}: {e}", path.display()))
}

fn load_config(path: &Path) -> Result<GameConfig, String> {
    GameConfig::from_json(&read(path)?).map_err(|e| format!("{}: {e}", path.display()))
}

fn load_script(path: &Path) -> Result<Vec<ScriptedAction>, String> {
    serde_json::from_str(&read(path)?).map_err(|e| format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Script playback
// ---------------------------------------------------------------------------

/// Scripted actions in time order with a playback cursor.
struct Script {
    entries: Vec<ScriptedAction>,
    next: usize,
}

impl Script {
    /// Sorts by `at_ms`; entries with equal times keep their file order.
    fn new(mut entries: Vec<ScriptedAction>) -> Self {
        entries.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        Self { entries, next: 0 }
    }

    /// Every not-yet-taken action due at or before `elapsed_ms`.
    fn take_due(&mut self, elapsed_ms: f32) -> Vec<SimAction> {
        let start = self.next;
        while self.next < self.entries.len() && self.entries[self.next].at_ms <= elapsed_ms {
            self.next += 1;
        }
        self.entries[start..self.next]
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    fn remaining(&self) -> usize {
        self.entries.len() - self.next
    }
}

fn run(level: &LevelDef, config: GameConfig, mut script: Script, args: &RunArgs) -> RunSummary {
    let mut sim = SimState::from_level(args.seed, config, level);
    let budget_ms = args.max_secs * 1000.0;
    let mut fed_ms = 0.0;

    while !sim.is_over() && fed_ms < budget_ms {
        let actions = script.take_due(fed_ms);
        let result = sim.step(&actions, args.dt_ms);
        if args.print_events {
            for event in &result.events {
                match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to serialize event"),
                }
            }
        }
        fed_ms += args.dt_ms;
    }

    if sim.is_over() {
        info!(ticks = sim.tick, fed_ms, "run finished");
    } else {
        warn!(ticks = sim.tick, fed_ms, "wall-clock budget exhausted before the level ended");
    }
    if script.remaining() > 0 {
        warn!(unused = script.remaining(), "script actions left unapplied");
    }

    RunSummary {
        level_id: level.id,
        level_name: level.name.clone(),
        seed: args.seed,
        ticks: sim.tick,
        fed_ms,
        outcome: sim.outcome(),
        stats: sim.stats.clone(),
        abilities_left: sim.pool.clone(),
    }
}
