//! Run statistics gathered by signal subscribers.

use crate::organism::BitOrganism;
use evopop_core::Result;
use evopop_world::LifecycleManager;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, event, info, Level};

/// Counters shared with the subscribers that update them
#[derive(Debug, Default)]
pub struct RunStats {
    pub placements: Cell<u64>,
    pub deaths: Cell<u64>,
    pub births: Cell<u64>,
    pub max_generation: Cell<u32>,
}

impl RunStats {
    /// Register counting subscribers on the manager's signals
    pub fn subscribe(manager: &mut LifecycleManager<BitOrganism>) -> Rc<RunStats> {
        let stats = Rc::new(RunStats::default());
        let signals = manager.signals_mut();

        let s = stats.clone();
        signals.on_placement.add(move |_, org: &BitOrganism| {
            s.placements.set(s.placements.get() + 1);
            if org.generation > s.max_generation.get() {
                s.max_generation.set(org.generation);
            }
        });

        let s = stats.clone();
        signals.on_death.add(move |index, org: &BitOrganism| {
            s.deaths.set(s.deaths.get() + 1);
            debug!(index, organism_id = %org.id, generation = org.generation, "Organism died");
        });

        let s = stats.clone();
        signals.offspring_ready.add(move |org: &mut BitOrganism, _| {
            org.become_offspring();
            s.births.set(s.births.get() + 1);
        });

        let s = stats.clone();
        signals.on_update.add(move |update| {
            event!(
                Level::DEBUG,
                update,
                placements = s.placements.get(),
                deaths = s.deaths.get(),
                "Update started"
            );
        });

        stats
    }
}

/// Fitness summary over the active population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

pub fn summarize(manager: &mut LifecycleManager<BitOrganism>) -> Result<FitnessSummary> {
    let indices: Vec<usize> = manager.iter_orgs().map(|(index, _)| index).collect();
    let mut total = 0.0;
    let mut max = f64::MIN;
    for &index in &indices {
        let fitness = manager.fitness_at(index)?;
        total += fitness;
        max = max.max(fitness);
    }

    let count = indices.len();
    Ok(FitnessSummary {
        count,
        mean: if count > 0 { total / count as f64 } else { 0.0 },
        max: if count > 0 { max } else { 0.0 },
    })
}

pub fn emit_population_metrics(
    manager: &mut LifecycleManager<BitOrganism>,
    stats: &RunStats,
) -> Result<()> {
    let summary = summarize(manager)?;
    info!(
        event = "population_metrics",
        update = manager.update_count(),
        num_orgs = manager.num_orgs(),
        mean_fitness = format!("{:.2}", summary.mean),
        max_fitness = summary.max,
        births = stats.births.get(),
        deaths = stats.deaths.get(),
        max_generation = stats.max_generation.get(),
        "Population metrics snapshot"
    );
    Ok(())
}
