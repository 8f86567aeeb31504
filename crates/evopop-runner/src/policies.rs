//! Well-mixed placement policies for the demonstration runner.
//!
//! Any organism may land anywhere: injections go to a random empty slot,
//! offspring to a uniformly random slot, and the kill target is a random
//! occupied slot.

use crate::organism::{BitMutator, BitOrganism};
use evopop_core::{PopulationId, WorldPosition};
use evopop_world::{PolicySet, PopulationStore};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const RANDOM_PROBES: usize = 100;

/// Random empty active slot, or invalid if the population is full
pub fn random_empty_slot<O>(store: &PopulationStore<O>, rng: &mut ChaCha8Rng) -> WorldPosition {
    let size = store.active_len();
    if size == 0 || store.num_orgs() >= size {
        return WorldPosition::invalid();
    }

    for _ in 0..RANDOM_PROBES {
        let pos = WorldPosition::active(rng.gen_range(0..size));
        if !store.is_occupied(pos) {
            return pos;
        }
    }

    // Dense population; fall back to a scan
    store
        .first_empty_active()
        .map(WorldPosition::active)
        .unwrap_or_default()
}

/// Random occupied active slot, or invalid if the population is empty
pub fn random_occupied_slot<O>(store: &PopulationStore<O>, rng: &mut ChaCha8Rng) -> WorldPosition {
    let occupied = store.occupied_indices(PopulationId::Active);
    if occupied.is_empty() {
        return WorldPosition::invalid();
    }
    WorldPosition::active(occupied[rng.gen_range(0..occupied.len())])
}

/// Install every policy the runner relies on.
///
/// With `synchronous` set, offspring are staged in the next population.
pub fn install_well_mixed(
    policies: &mut PolicySet<BitOrganism>,
    mutator: BitMutator,
    synchronous: bool,
) {
    let birth_population = if synchronous {
        PopulationId::Next
    } else {
        PopulationId::Active
    };

    policies
        .set_find_inject_position(|_, ctx| random_empty_slot(ctx.store, ctx.rng))
        .set_find_birth_position(move |_, _, ctx| {
            let size = ctx.store.active_len();
            if size == 0 {
                return WorldPosition::invalid();
            }
            WorldPosition::new(ctx.rng.gen_range(0..size), birth_population)
        })
        .set_find_kill_target(|ctx| random_occupied_slot(ctx.store, ctx.rng))
        .set_find_neighbor(|pos, ctx| {
            let size = ctx.store.active_len();
            if !pos.is_valid() || size == 0 {
                return WorldPosition::invalid();
            }
            WorldPosition::active(ctx.rng.gen_range(0..size))
        })
        .set_calc_fitness(|org| org.ones() as f64)
        .set_do_mutations(move |org, rng| mutator.mutate(org, rng));
}
