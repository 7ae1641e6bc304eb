//! # Warden Sim
//!
//! Headless arena harness for the Warden NPC behavior core.
//!
//! Builds a small arena with cover, a scripted player and a mixed squad of
//! soldiers and melee warriors, then runs the level on a fixed timestep and
//! reports what the NPCs did.
//!
//! ```text
//! warden-sim [--config <path>] [--seconds <n>] [--seed <n>] [--json]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod timing;
mod world;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warden_ai::{AiEvent, Npc, NpcKind, StateId};

use crate::config::SimConfig;
use crate::timing::FixedStep;
use crate::world::Arena;

/// Headless arena harness for the Warden NPC behavior core
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulated seconds to run (overrides the config)
    #[arg(long)]
    seconds: Option<f32>,
    /// Random seed (overrides the config)
    #[arg(long)]
    seed: Option<u64>,
    /// Emit events and the report as JSON lines
    #[arg(long)]
    json: bool,
}

/// Final state of one NPC.
#[derive(Debug, Serialize)]
struct NpcSummary {
    id: u64,
    kind: NpcKind,
    state: Option<StateId>,
    health: i32,
}

impl From<&Npc> for NpcSummary {
    fn from(npc: &Npc) -> Self {
        Self {
            id: npc.id().raw(),
            kind: npc.kind(),
            state: npc.current_state(),
            health: npc.health().current(),
        }
    }
}

/// End-of-run report.
#[derive(Debug, Serialize)]
struct Report {
    simulated_seconds: f64,
    ticks: u64,
    player_health: Option<i32>,
    events: BTreeMap<String, usize>,
    npcs: Vec<NpcSummary>,
}

/// Variant name of an event, taken from its serialized form.
fn event_name(event: &AiEvent) -> String {
    match serde_json::to_value(event) {
        Ok(serde_json::Value::Object(map)) => map.keys().next().cloned().unwrap_or_default(),
        Ok(serde_json::Value::String(name)) => name,
        _ => String::from("Unknown"),
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("warden_sim=info".parse()?)
        .add_directive("warden_ai=info".parse()?);
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
    Ok(())
}

/// Main entry point.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json)?;

    info!("Warden sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = args
        .config
        .as_ref()
        .map(SimConfig::load_from)
        .unwrap_or_default();
    if let Some(seconds) = args.seconds {
        config.sim.duration = seconds;
    }
    if args.seed.is_some() {
        config.sim.seed = args.seed;
    }
    config.validate();

    let mut arena = Arena::build(&config.sim, config.ai.clone())?;
    let mut step = FixedStep::new(config.sim.tick_rate);
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();

    while step.elapsed() < f64::from(config.sim.duration) {
        for _ in 0..step.accumulate(config.sim.frame_dt) {
            arena.step(step.fixed_dt())?;
        }
        for event in arena.level().events().drain() {
            if args.json {
                println!("{}", serde_json::to_string(&event)?);
            }
            *tally.entry(event_name(&event)).or_default() += 1;
        }
        if !arena.player_alive() {
            warn!(at = step.elapsed(), "Player is down, ending run");
            break;
        }
    }

    let report = Report {
        simulated_seconds: step.elapsed(),
        ticks: step.ticks(),
        player_health: arena.level().player_health().ok().map(|h| h.current()),
        events: tally,
        npcs: arena.level().npcs().map(NpcSummary::from).collect(),
    };
    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    info!(player = %arena.player(), "Warden sim finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::EntityId;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("warden-sim").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&[]).expect("parse");
        assert!(args.config.is_none());
        assert!(!args.json);
    }

    #[test]
    fn test_parse_all_flags() {
        let args = parse(&["--config", "arena.toml", "--seconds", "12.5", "--seed", "9", "--json"])
            .expect("parse");
        assert_eq!(args.config, Some(PathBuf::from("arena.toml")));
        assert_eq!(args.seconds, Some(12.5));
        assert_eq!(args.seed, Some(9));
        assert!(args.json);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse(&["--seconds"]).is_err());
        assert!(parse(&["--seed", "many"]).is_err());
        assert!(parse(&["--fast"]).is_err());
    }

    #[test]
    fn test_event_name() {
        let event = AiEvent::NpcDespawned {
            entity_id: EntityId::from_raw(4),
        };
        assert_eq!(event_name(&event), "NpcDespawned");
    }
}
