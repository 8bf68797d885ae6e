// SPDX-License-Identifier: Apache-2.0
//! rulecraft developer CLI.
//!
//! Loads a JSON rule file and a JSON state document, then either ticks the
//! engine N times or replays a recorded step stream, printing the
//! resulting state (or the first error encountered) to stdout.
//!
//! # Usage
//! ```text
//! rulecraft run --rules rules.json --state state.json --ticks 10 --dt-ms 100
//! rulecraft replay --rules rules.json --state state.json --steps steps.json
//! ```

#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod steps;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use rulecraft_core::{Engine, EngineError, Rule, Trigger, Value};

use crate::steps::Step;

#[derive(Parser)]
#[command(name = "rulecraft", about = "Run rulecraft rule files against a state document")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the engine for a fixed number of equal-length ticks.
    Run {
        /// Path to a JSON array of rule definitions.
        #[arg(long)]
        rules: PathBuf,
        /// Path to the JSON state document the rules operate over.
        #[arg(long)]
        state: PathBuf,
        /// Number of ticks to run.
        #[arg(long, default_value_t = 1)]
        ticks: u32,
        /// Delta time per tick, in milliseconds.
        #[arg(long = "dt-ms", default_value_t = 100.0)]
        dt_ms: f64,
    },
    /// Replays a recorded sequence of ticks and events from a JSON file.
    Replay {
        /// Path to a JSON array of rule definitions.
        #[arg(long)]
        rules: PathBuf,
        /// Path to the JSON state document the rules operate over.
        #[arg(long)]
        state: PathBuf,
        /// Path to a JSON array of `{"kind":"tick",...}` /
        /// `{"kind":"event",...}` steps.
        #[arg(long)]
        steps: PathBuf,
    },
    /// Prints a summary table of the rules in a rule file without running
    /// the engine.
    List {
        /// Path to a JSON array of rule definitions.
        #[arg(long)]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { rules, state, ticks, dt_ms } => run(&rules, &state, ticks, dt_ms),
        Command::Replay { rules, state, steps } => replay(&rules, &state, &steps),
        Command::List { rules } => list(&rules),
    }
}

fn load_rules(path: &PathBuf) -> Result<Vec<Rule>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading rule file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing rule file {}", path.display()))
}

fn load_state(path: &PathBuf) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading state file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing state file {}", path.display()))
}

fn build_engine(rules: Vec<Rule>) -> Result<Engine> {
    let mut engine = Engine::builder().build();
    for rule in rules {
        engine.register_rule(rule).context("registering rule")?;
    }
    Ok(engine)
}

fn run(rules_path: &PathBuf, state_path: &PathBuf, ticks: u32, dt_ms: f64) -> Result<()> {
    let mut engine = build_engine(load_rules(rules_path)?)?;
    let mut state = load_state(state_path)?;
    for _ in 0..ticks {
        if let Err(err) = engine.tick(&mut state, dt_ms) {
            print_error(&err);
            print_state(&state)?;
            anyhow::bail!("tick failed: {err}");
        }
    }
    print_state(&state)
}

fn replay(rules_path: &PathBuf, state_path: &PathBuf, steps_path: &PathBuf) -> Result<()> {
    let mut engine = build_engine(load_rules(rules_path)?)?;
    let mut state = load_state(state_path)?;
    let text = fs::read_to_string(steps_path).with_context(|| format!("reading step file {}", steps_path.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&text).with_context(|| format!("parsing step file {}", steps_path.display()))?;

    for step in steps {
        let result = match step {
            Step::Tick { dt_ms } => engine.tick(&mut state, dt_ms),
            Step::Event { name, params, sender, dt_ms } => engine.handle_event(&mut state, dt_ms, &name, params, sender),
        };
        if let Err(err) = result {
            print_error(&err);
            print_state(&state)?;
            anyhow::bail!("replay failed: {err}");
        }
    }
    print_state(&state)
}

fn list(rules_path: &PathBuf) -> Result<()> {
    let rules = load_rules(rules_path)?;
    let mut table = Table::new();
    table.set_header(vec!["Name", "Priority", "Enabled", "Trigger"]);
    for rule in &rules {
        table.add_row(vec![
            rule.name.clone(),
            rule.priority.to_string(),
            rule.is_enabled().to_string(),
            trigger_kind(rule),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn trigger_kind(rule: &Rule) -> String {
    match &rule.trigger {
        None => "always".to_owned(),
        Some(Trigger::OnTick { .. }) => "on-tick".to_owned(),
        Some(Trigger::OnEvent { .. }) => "on-event".to_owned(),
        Some(Trigger::OnChange { .. }) => "on-change".to_owned(),
        Some(Trigger::Distance { .. }) => "distance".to_owned(),
        Some(Trigger::Timer { .. }) => "timer".to_owned(),
        Some(Trigger::Wait { .. }) => "wait".to_owned(),
        Some(Trigger::Condition { .. }) => "condition".to_owned(),
        Some(Trigger::Cron { .. }) => "cron".to_owned(),
        Some(Trigger::Schedule { .. }) => "schedule".to_owned(),
    }
}

fn print_error(err: &EngineError) {
    eprintln!("error: {err}");
}

fn print_state(state: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(state).context("serializing final state")?;
    println!("{pretty}");
    Ok(())
}
