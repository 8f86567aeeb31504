//! Demonstration runner: evolves bit-string organisms toward all ones.
//!
//! Usage: `evopop-runner [config.json]`. Set `EVOPOP_LOG_FORMAT=json` for
//! JSON log lines.

mod organism;
mod policies;
mod report;
mod telemetry;

use anyhow::{Context, Result};
use evopop_core::RunnerConfig;
use evopop_world::LifecycleManager;
use organism::{BitMutator, BitOrganism};
use report::RunStats;
use tracing::{info, instrument, warn};

fn main() -> Result<()> {
    let json_logs = std::env::var("EVOPOP_LOG_FORMAT")
        .map(|format| format == "json")
        .unwrap_or(false);
    telemetry::init_telemetry(json_logs)?;

    let config = match std::env::args().nth(1) {
        Some(path) => RunnerConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => {
            info!("No config file given; using defaults");
            RunnerConfig::default()
        }
    };

    run(&config)
}

#[instrument(skip(config), fields(num_updates = config.num_updates))]
fn run(config: &RunnerConfig) -> Result<()> {
    let mut manager: LifecycleManager<BitOrganism> =
        LifecycleManager::from_config(&config.population)?;

    let synchronous = manager.is_synchronous();
    policies::install_well_mixed(
        manager.policies_mut(),
        BitMutator::new(config.mutation_rate),
        synchronous,
    );
    let stats = RunStats::subscribe(&mut manager);

    let genome_length = config.genome_length;
    let placed = manager.initialize_with(|rng| BitOrganism::random(genome_length, rng))?;
    if placed == 0 {
        anyhow::bail!("no initial organisms could be placed");
    }

    for _ in 0..config.num_updates {
        step(&mut manager, config.births_per_update)?;

        if config.report_interval > 0 && manager.update_count() as u64 % config.report_interval == 0 {
            report::emit_population_metrics(&mut manager, &stats)?;
        }

        if manager.num_orgs() == 0 {
            warn!(update = manager.update_count(), "Population went extinct");
            break;
        }
    }

    let summary = report::summarize(&mut manager)?;
    info!(
        event = "run_summary",
        updates = manager.update_count(),
        survivors = summary.count,
        mean_fitness = format!("{:.2}", summary.mean),
        max_fitness = summary.max,
        genome_length,
        births = stats.births.get(),
        deaths = stats.deaths.get(),
        max_generation = stats.max_generation.get(),
        "Run complete"
    );
    Ok(())
}

/// One update: tournament-selected births, then advance the clock
fn step(manager: &mut LifecycleManager<BitOrganism>, births: usize) -> Result<()> {
    for _ in 0..births {
        if manager.num_orgs() == 0 {
            break;
        }
        let a = manager.random_org_index()?;
        let b = manager.random_org_index()?;
        let winner = if manager.fitness_at(a)? >= manager.fitness_at(b)? {
            a
        } else {
            b
        };

        let pos = manager.do_birth_at(winner, 1)?;
        if pos.is_valid() {
            manager.mutate_at(pos)?;
        }
    }

    // Keep a steady trickle of random deaths in asynchronous mode
    if !manager.is_synchronous() && manager.num_orgs() > 1 {
        manager.kill_org()?;
    }

    manager.update();
    Ok(())
}
