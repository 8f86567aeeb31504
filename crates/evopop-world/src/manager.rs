//! Population lifecycle manager.
//!
//! Every placement and removal goes through [`LifecycleManager::add_org_at`]
//! and [`LifecycleManager::remove_org_at`]; injection, birth, death, resize,
//! clear and generation hand-off are built on those two protocols so that
//! signals fire in a fixed order and no occupant is ever overwritten without
//! being released first.

use crate::policy::{PolicyContext, PolicySet};
use crate::population::PopulationStore;
use crate::signal::SignalBus;
use evopop_core::{Error, PolicyKind, PopulationConfig, PopulationId, Result, WorldPosition};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, trace};

pub struct LifecycleManager<O> {
    name: String,
    store: PopulationStore<O>,
    signals: SignalBus<O>,
    policies: PolicySet<O>,
    rng: ChaCha8Rng,
    update: usize,
    init_size: usize,
    is_synchronous: bool,
    is_space_structured: bool,
    is_pheno_structured: bool,
}

impl<O> LifecycleManager<O> {
    /// Empty manager with no slots and no policies
    pub fn new(name: impl Into<String>, rng: ChaCha8Rng) -> Self {
        let name = name.into();
        Self {
            signals: SignalBus::new(&name),
            name,
            store: PopulationStore::new(),
            policies: PolicySet::new(),
            rng,
            update: 0,
            init_size: 1,
            is_synchronous: false,
            is_space_structured: false,
            is_pheno_structured: false,
        }
    }

    /// Build a manager sized and seeded from startup configuration
    pub fn from_config(config: &PopulationConfig) -> Result<Self> {
        config.validate()?;
        let mut manager = Self::new(config.name.clone(), config.build_rng());
        match config.grid {
            Some((width, height)) => manager.resize_grid(width, height)?,
            None => manager.resize(config.world_size),
        }
        manager.init_size = config.init_size;
        manager.is_synchronous = config.synchronous;
        manager.set_cache(config.cache_fitness);

        info!(
            world = %manager.name,
            size = manager.size(),
            init_size = manager.init_size,
            synchronous = manager.is_synchronous,
            cache_fitness = config.cache_fitness,
            "Population manager configured"
        );
        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots in the active population
    pub fn size(&self) -> usize {
        self.store.active_len()
    }

    /// Number of organisms in the active population
    pub fn num_orgs(&self) -> usize {
        self.store.num_orgs()
    }

    /// How many times `update` has been called since the last reset
    pub fn update_count(&self) -> usize {
        self.update
    }

    pub fn width(&self) -> usize {
        self.store.width()
    }

    pub fn height(&self) -> usize {
        self.store.height()
    }

    pub fn init_size(&self) -> usize {
        self.init_size
    }

    pub fn store(&self) -> &PopulationStore<O> {
        &self.store
    }

    pub fn signals_mut(&mut self) -> &mut SignalBus<O> {
        &mut self.signals
    }

    pub fn policies_mut(&mut self) -> &mut PolicySet<O> {
        &mut self.policies
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn is_occupied(&self, pos: WorldPosition) -> bool {
        self.store.is_occupied(pos)
    }

    pub fn is_cache_on(&self) -> bool {
        self.store.fitness_cache().is_enabled()
    }

    /// Turn fitness caching on or off; either way every entry starts uncomputed
    pub fn set_cache(&mut self, enabled: bool) {
        let len = self.store.active_len();
        self.store.fitness_cache_mut().set_enabled(enabled, len);
    }

    pub fn is_synchronous(&self) -> bool {
        self.is_synchronous
    }

    pub fn is_space_structured(&self) -> bool {
        self.is_space_structured
    }

    pub fn is_pheno_structured(&self) -> bool {
        self.is_pheno_structured
    }

    /// Hand the next generation over to the active one on every update
    pub fn mark_synchronous(&mut self, synchronous: bool) {
        self.is_synchronous = synchronous;
    }

    /// Record that placement policies impose a spatial structure
    pub fn mark_space_structured(&mut self, structured: bool) {
        self.is_space_structured = structured;
    }

    /// Record that placement policies group organisms by phenotype
    pub fn mark_pheno_structured(&mut self, structured: bool) {
        self.is_pheno_structured = structured;
    }

    /// Organism in an active slot, if any
    pub fn org(&self, index: usize) -> Option<&O> {
        self.store.get(WorldPosition::active(index))
    }

    /// Organism in an active slot, failing if the slot is empty
    pub fn get_org(&self, index: usize) -> Result<&O> {
        self.org(index).ok_or_else(|| {
            Error::PreconditionViolation(format!("no organism at active[{}]", index))
        })
    }

    /// Mutable access to an active organism; its cached fitness is discarded
    pub fn org_mut(&mut self, index: usize) -> Option<&mut O> {
        self.store.fitness_cache_mut().invalidate(index);
        self.store.get_mut(WorldPosition::active(index))
    }

    pub fn next_org(&self, index: usize) -> Option<&O> {
        self.store.get(WorldPosition::next(index))
    }

    /// Occupied active slots with their indices
    pub fn iter_orgs(&self) -> impl Iterator<Item = (usize, &O)> + '_ {
        self.store.iter_active()
    }

    /// Place `org` at `pos`, releasing any previous occupant first.
    ///
    /// `before_placement` and `on_placement` fire only for the active
    /// population. On return `pos` owns `org`.
    pub fn add_org_at(
        &mut self,
        org: O,
        pos: WorldPosition,
        parent_pos: WorldPosition,
    ) -> Result<()> {
        if !pos.is_valid() {
            return Err(Error::PreconditionViolation(
                "cannot place an organism at an invalid position".to_string(),
            ));
        }
        self.place_org(org, pos, parent_pos);
        Ok(())
    }

    /// Placement protocol for a position already known to be valid
    fn place_org(&mut self, org: O, pos: WorldPosition, parent_pos: WorldPosition) {
        if pos.is_active() {
            self.signals.before_placement.trigger(&org, pos.index());
        }

        self.remove_org_at(pos);

        let previous = self.store.insert(pos, org);
        debug_assert!(previous.is_none());

        debug!(world = %self.name, %pos, %parent_pos, "Organism placed");

        if pos.is_active() {
            if let Some(placed) = self.store.get(pos) {
                self.signals.on_placement.trigger(pos.index(), placed);
            }
        }
    }

    /// Release the occupant at `pos`; a no-op when the slot is empty, out of
    /// range, or `pos` is invalid.
    pub fn remove_org_at(&mut self, pos: WorldPosition) {
        if !self.store.is_occupied(pos) {
            return;
        }

        if pos.is_active() {
            if let Some(dying) = self.store.get(pos) {
                self.signals.on_death.trigger(pos.index(), dying);
            }
        }

        let released = self.store.take(pos);
        debug!(world = %self.name, %pos, "Organism removed");
        drop(released);
    }

    /// Kill the organism at `pos`
    pub fn do_death(&mut self, pos: WorldPosition) {
        self.remove_org_at(pos);
    }

    /// Exchange two slots without per-slot signals, then fire `on_swap` once
    pub fn swap(&mut self, pos1: WorldPosition, pos2: WorldPosition) -> Result<()> {
        if !pos1.is_valid() || !pos2.is_valid() {
            return Err(Error::PreconditionViolation(format!(
                "cannot swap {} with {}",
                pos1, pos2
            )));
        }
        self.store.swap(pos1, pos2);
        trace!(world = %self.name, %pos1, %pos2, "Slots swapped");
        self.signals.on_swap.trigger(pos1, pos2);
        Ok(())
    }

    /// Change the number of active slots. Organisms past the new end are
    /// removed through the full removal protocol; new slots start empty.
    pub fn resize(&mut self, new_size: usize) {
        self.resize_to(new_size, vec![new_size]);
    }

    pub fn resize_grid(&mut self, width: usize, height: usize) -> Result<()> {
        self.resize_dims(&[width, height])
    }

    /// Resize to the product of `dims` and record them as the spatial layout.
    ///
    /// Fails without touching the population if `dims` is empty or the
    /// product overflows.
    pub fn resize_dims(&mut self, dims: &[usize]) -> Result<()> {
        if dims.is_empty() {
            return Err(Error::PreconditionViolation(
                "cannot resize to an empty list of dimensions".to_string(),
            ));
        }
        let new_size = dims
            .iter()
            .try_fold(1usize, |size, &dim| size.checked_mul(dim))
            .ok_or_else(|| {
                Error::PreconditionViolation(format!("dimensions {:?} overflow the slot count", dims))
            })?;
        self.resize_to(new_size, dims.to_vec());
        Ok(())
    }

    fn resize_to(&mut self, new_size: usize, dims: Vec<usize>) {
        for index in new_size..self.store.active_len() {
            self.remove_org_at(WorldPosition::active(index));
        }
        self.store.resize_active(new_size);
        info!(world = %self.name, new_size, ?dims, "Population resized");
        self.store.set_dims(dims);
    }

    /// Release every organism in both buffers and shrink them to zero length
    pub fn clear(&mut self) {
        for population in PopulationId::all() {
            for index in 0..self.store.len(population) {
                self.remove_org_at(WorldPosition::new(index, population));
            }
        }
        self.store.truncate_all();
        debug!(world = %self.name, "Population cleared");
    }

    /// Clear the population and restart the update counter
    pub fn reset(&mut self) {
        self.clear();
        self.update = 0;
        info!(world = %self.name, "Population reset");
    }

    /// Uniformly chosen occupied active index
    pub fn random_org_index(&mut self) -> Result<usize> {
        if self.store.num_orgs() == 0 {
            return Err(Error::EmptyPopulation);
        }
        let size = self.store.active_len();
        loop {
            let index = self.rng.gen_range(0..size);
            if self.store.is_occupied(WorldPosition::active(index)) {
                return Ok(index);
            }
        }
    }

    pub fn random_org(&mut self) -> Result<&O> {
        let index = self.random_org_index()?;
        self.get_org(index)
    }

    /// Advance one discrete time step.
    ///
    /// Fires `on_update` with the current step number. In synchronous mode the
    /// next generation then replaces the active one.
    #[instrument(skip(self), fields(world = %self.name, update = self.update))]
    pub fn update(&mut self) {
        self.signals.on_update.trigger(self.update);
        if self.is_synchronous {
            self.advance_generation();
        }
        self.update += 1;
    }

    /// Replace the active generation with the next one.
    ///
    /// Current occupants die with `on_death`; each next-generation organism
    /// lands at the same index through the placement protocol, so
    /// `before_placement` and `on_placement` both fire. The active buffer grows
    /// if the next one is longer, and the next buffer is left empty.
    pub fn advance_generation(&mut self) {
        for index in 0..self.store.active_len() {
            self.remove_org_at(WorldPosition::active(index));
        }

        let next = self.store.take_next();
        if next.len() > self.store.active_len() {
            self.store.resize_active(next.len());
        }

        for (index, slot) in next.into_iter().enumerate() {
            let Some(org) = slot else { continue };
            self.place_org(org, WorldPosition::active(index), WorldPosition::next(index));
        }

        info!(
            world = %self.name,
            num_orgs = self.store.num_orgs(),
            "Next generation moved into active population"
        );
    }

    /// Ask the kill-target policy for a victim and kill it
    pub fn kill_org(&mut self) -> Result<WorldPosition> {
        let mut ctx = PolicyContext {
            store: &self.store,
            rng: &mut self.rng,
            update: self.update,
        };
        let pos = self.policies.find_kill_target(&mut ctx)?;
        if pos.is_valid() {
            self.do_death(pos);
        }
        Ok(pos)
    }

    /// Position the neighbor policy considers near `pos`
    pub fn neighbor_of(&mut self, pos: WorldPosition) -> Result<WorldPosition> {
        let mut ctx = PolicyContext {
            store: &self.store,
            rng: &mut self.rng,
            update: self.update,
        };
        self.policies.find_neighbor(pos, &mut ctx)
    }

    /// Fitness of an active organism, served from the cache when enabled
    pub fn fitness_at(&mut self, index: usize) -> Result<f64> {
        if let Some(cached) = self.store.fitness_cache().get(index) {
            return Ok(cached);
        }

        let org = self.store.get(WorldPosition::active(index)).ok_or_else(|| {
            Error::PreconditionViolation(format!("no organism at active[{}]", index))
        })?;
        let fitness = self.policies.calc_fitness(org)?;

        self.store.fitness_cache_mut().set(index, fitness);
        Ok(fitness)
    }

    /// Apply the mutation policy to a resident organism; returns the mutation count
    pub fn mutate_at(&mut self, pos: WorldPosition) -> Result<usize> {
        let org = self.store.get_mut(pos).ok_or_else(|| {
            Error::PreconditionViolation(format!("no organism to mutate at {}", pos))
        })?;
        let mutations = self.policies.do_mutations(org, &mut self.rng)?;

        if mutations > 0 && pos.is_active() {
            self.store.fitness_cache_mut().invalidate(pos.index());
        }
        trace!(world = %self.name, %pos, mutations, "Organism mutated");
        Ok(mutations)
    }
}

impl<O: Clone> LifecycleManager<O> {
    /// Inject `copy_count` copies of `org` through the inject-position policy.
    ///
    /// Each copy is its own clone. A copy whose position comes back invalid is
    /// dropped. Returns how many copies were placed.
    #[instrument(skip(self, org), fields(world = %self.name))]
    pub fn inject(&mut self, org: O, copy_count: usize) -> Result<usize> {
        self.policies.require(PolicyKind::FindInjectPosition)?;

        let mut template = Some(org);
        let mut placed = 0;
        for copy in 0..copy_count {
            let next_copy = if copy + 1 < copy_count {
                template.clone()
            } else {
                template.take()
            };
            let Some(mut new_org) = next_copy else { break };

            self.signals.inject_ready.trigger(&mut new_org);

            let mut ctx = PolicyContext {
                store: &self.store,
                rng: &mut self.rng,
                update: self.update,
            };
            let pos = self.policies.find_inject_position(&new_org, &mut ctx)?;

            if pos.is_valid() {
                self.add_org_at(new_org, pos, WorldPosition::invalid())?;
                placed += 1;
            } else {
                debug!(world = %self.name, copy, "Injection rejected; organism discarded");
            }
        }
        Ok(placed)
    }

    /// Inject one organism at a caller-chosen position, bypassing the policy
    pub fn inject_at(&mut self, mut org: O, pos: WorldPosition) -> Result<()> {
        if !pos.is_valid() {
            return Err(Error::PreconditionViolation(
                "cannot inject at an invalid position".to_string(),
            ));
        }
        self.signals.inject_ready.trigger(&mut org);
        self.add_org_at(org, pos, WorldPosition::invalid())
    }

    /// Produce `copy_count` offspring cloned from `parent`.
    ///
    /// `before_repro` fires once for the batch. Each clone gets
    /// `offspring_ready`, then the birth-position policy decides where it goes;
    /// that policy sees placements made earlier in the same batch, which may
    /// include the parent's own slot being overwritten. Returns the position of
    /// the last offspring placed, or an invalid position if none were.
    #[instrument(skip(self, parent), fields(world = %self.name))]
    pub fn do_birth(
        &mut self,
        parent: &O,
        parent_index: usize,
        copy_count: usize,
    ) -> Result<WorldPosition> {
        self.policies.require(PolicyKind::FindBirthPosition)?;

        self.signals.before_repro.trigger(parent_index);

        let parent_pos = WorldPosition::active(parent_index);
        let mut last_placed = WorldPosition::invalid();
        for _ in 0..copy_count {
            let mut offspring = parent.clone();
            self.signals.offspring_ready.trigger(&mut offspring, parent_index);

            let mut ctx = PolicyContext {
                store: &self.store,
                rng: &mut self.rng,
                update: self.update,
            };
            let pos = self
                .policies
                .find_birth_position(&offspring, parent_index, &mut ctx)?;

            if pos.is_valid() {
                self.add_org_at(offspring, pos, parent_pos)?;
                last_placed = pos;
            } else {
                debug!(world = %self.name, parent_index, "Birth rejected; offspring discarded");
            }
        }
        Ok(last_placed)
    }

    /// Birth from the organism currently living at `parent_index`
    pub fn do_birth_at(&mut self, parent_index: usize, copy_count: usize) -> Result<WorldPosition> {
        let parent = self.get_org(parent_index)?.clone();
        self.do_birth(&parent, parent_index, copy_count)
    }

    /// Inject `init_size` organisms built by `build`; returns how many were placed
    pub fn initialize_with(&mut self, mut build: impl FnMut(&mut ChaCha8Rng) -> O) -> Result<usize> {
        let mut placed = 0;
        for _ in 0..self.init_size {
            let org = build(&mut self.rng);
            placed += self.inject(org, 1)?;
        }
        info!(world = %self.name, placed, requested = self.init_size, "Initial population injected");
        Ok(placed)
    }
}

impl<O> Drop for LifecycleManager<O> {
    fn drop(&mut self) {
        self.clear();
        self.signals.on_destruct.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Organism that records when it is dropped
    #[derive(Debug)]
    struct TestOrg {
        id: u32,
        drops: Rc<RefCell<Vec<u32>>>,
    }

    impl Clone for TestOrg {
        fn clone(&self) -> Self {
            Self {
                id: self.id + 100,
                drops: self.drops.clone(),
            }
        }
    }

    impl Drop for TestOrg {
        fn drop(&mut self) {
            self.drops.borrow_mut().push(self.id);
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn create_manager(size: usize) -> LifecycleManager<TestOrg> {
        let mut manager = LifecycleManager::new("test", ChaCha8Rng::seed_from_u64(42));
        manager.resize(size);
        manager
    }

    fn record_signals(manager: &mut LifecycleManager<TestOrg>) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let signals = manager.signals_mut();

        let l = log.clone();
        signals.before_repro.add(move |p| l.borrow_mut().push(format!("before_repro {}", p)));
        let l = log.clone();
        signals
            .offspring_ready
            .add(move |org: &mut TestOrg, p| l.borrow_mut().push(format!("offspring_ready {} {}", org.id, p)));
        let l = log.clone();
        signals
            .inject_ready
            .add(move |org: &mut TestOrg| l.borrow_mut().push(format!("inject_ready {}", org.id)));
        let l = log.clone();
        signals
            .before_placement
            .add(move |org: &TestOrg, i| l.borrow_mut().push(format!("before_placement {} {}", org.id, i)));
        let l = log.clone();
        signals
            .on_placement
            .add(move |i, _: &TestOrg| l.borrow_mut().push(format!("on_placement {}", i)));
        let l = log.clone();
        signals
            .on_death
            .add(move |i, org: &TestOrg| l.borrow_mut().push(format!("on_death {} {}", i, org.id)));
        let l = log.clone();
        signals
            .on_swap
            .add(move |a, b| l.borrow_mut().push(format!("on_swap {} {}", a, b)));
        let l = log.clone();
        signals.on_update.add(move |u| l.borrow_mut().push(format!("on_update {}", u)));
        let l = log.clone();
        signals.on_destruct.add(move || l.borrow_mut().push("on_destruct".to_string()));

        log
    }

    fn org(id: u32, drops: &Rc<RefCell<Vec<u32>>>) -> TestOrg {
        TestOrg {
            id,
            drops: drops.clone(),
        }
    }

    fn count_of(log: &Log, prefix: &str) -> usize {
        log.borrow().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn assert_count_consistent(manager: &LifecycleManager<TestOrg>) {
        assert_eq!(
            manager.num_orgs(),
            manager.store().count_occupied(PopulationId::Active)
        );
    }

    #[test]
    fn test_add_org_fires_signals_in_order() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        let log = record_signals(&mut manager);

        manager
            .add_org_at(org(1, &drops), WorldPosition::active(1), WorldPosition::invalid())
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["before_placement 1 1".to_string(), "on_placement 1".to_string()]
        );
        assert_eq!(manager.num_orgs(), 1);
        assert_eq!(manager.org(1).map(|o| o.id), Some(1));
    }

    #[test]
    fn test_overwrite_releases_previous_occupant() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        let log = record_signals(&mut manager);
        let pos = WorldPosition::active(0);

        manager.add_org_at(org(1, &drops), pos, WorldPosition::invalid()).unwrap();
        log.borrow_mut().clear();
        manager.add_org_at(org(2, &drops), pos, WorldPosition::invalid()).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "before_placement 2 0".to_string(),
                "on_death 0 1".to_string(),
                "on_placement 0".to_string(),
            ]
        );
        assert_eq!(*drops.borrow(), vec![1]);
        assert_eq!(manager.num_orgs(), 1);
        assert_eq!(manager.org(0).map(|o| o.id), Some(2));
    }

    #[test]
    fn test_add_at_invalid_position_fails() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        let result = manager.add_org_at(org(1, &drops), WorldPosition::invalid(), WorldPosition::invalid());
        assert!(matches!(result, Err(Error::PreconditionViolation(_))));
        assert_eq!(manager.num_orgs(), 0);
        // The rejected handle is not leaked
        assert_eq!(*drops.borrow(), vec![1]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        let log = record_signals(&mut manager);
        let pos = WorldPosition::active(2);

        manager.add_org_at(org(1, &drops), pos, WorldPosition::invalid()).unwrap();
        manager.remove_org_at(pos);
        manager.remove_org_at(pos);
        manager.remove_org_at(WorldPosition::active(50));
        manager.remove_org_at(WorldPosition::invalid());

        assert_eq!(count_of(&log, "on_death"), 1);
        assert_eq!(*drops.borrow(), vec![1]);
        assert_eq!(manager.num_orgs(), 0);
    }

    #[test]
    fn test_next_population_is_silent() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        let log = record_signals(&mut manager);
        let pos = WorldPosition::next(4);

        manager.add_org_at(org(1, &drops), pos, WorldPosition::invalid()).unwrap();
        assert_eq!(manager.store().next_len(), 5);
        manager.add_org_at(org(2, &drops), pos, WorldPosition::invalid()).unwrap();
        manager.remove_org_at(pos);

        assert!(log.borrow().is_empty());
        assert_eq!(manager.num_orgs(), 0);
        assert_eq!(*drops.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_resize_then_fill() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(0);
        manager.resize(5);
        for i in 0..5 {
            manager
                .add_org_at(org(i as u32, &drops), WorldPosition::active(i), WorldPosition::invalid())
                .unwrap();
        }
        assert_eq!(manager.num_orgs(), 5);

        for _ in 0..100 {
            let index = manager.random_org_index().unwrap();
            assert!(index < 5);
        }
    }

    #[test]
    fn test_shrinking_resize_removes_with_signals() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(4);
        let log = record_signals(&mut manager);
        for i in 0..4 {
            manager
                .add_org_at(org(i as u32, &drops), WorldPosition::active(i), WorldPosition::invalid())
                .unwrap();
        }
        log.borrow_mut().clear();

        manager.resize(2);
        assert_eq!(manager.size(), 2);
        assert_eq!(manager.num_orgs(), 2);
        assert_eq!(
            *log.borrow(),
            vec!["on_death 2 2".to_string(), "on_death 3 3".to_string()]
        );
        assert_eq!(*drops.borrow(), vec![2, 3]);
    }

    #[test]
    fn test_resize_grid_records_dims() {
        let mut manager = create_manager(0);
        manager.resize_grid(4, 3).unwrap();
        assert_eq!(manager.size(), 12);
        assert_eq!(manager.width(), 4);
        assert_eq!(manager.height(), 3);

        manager.resize_dims(&[2, 2, 2]).unwrap();
        assert_eq!(manager.size(), 8);
        assert_eq!(manager.store().dims(), &[2, 2, 2]);
    }

    #[test]
    fn test_resize_dims_rejects_bad_layouts() {
        let mut manager = create_manager(4);
        assert!(matches!(
            manager.resize_dims(&[]),
            Err(Error::PreconditionViolation(_))
        ));
        assert!(matches!(
            manager.resize_grid(usize::MAX, 2),
            Err(Error::PreconditionViolation(_))
        ));
        assert_eq!(manager.size(), 4);
        assert_eq!(manager.store().dims(), &[4]);
    }

    #[test]
    fn test_growth_past_end_tracks_flat_dims() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager
            .add_org_at(org(1, &drops), WorldPosition::active(5), WorldPosition::invalid())
            .unwrap();
        assert_eq!(manager.size(), 6);
        assert_eq!(manager.width(), 6);
        assert_eq!(manager.height(), 1);

        manager.resize_grid(2, 2).unwrap();
        manager
            .add_org_at(org(2, &drops), WorldPosition::active(7), WorldPosition::invalid())
            .unwrap();
        assert_eq!(manager.size(), 8);
        assert_eq!(manager.store().dims(), &[2, 2]);
    }

    #[test]
    fn test_random_selection_on_empty_population_fails() {
        let mut manager = create_manager(5);
        assert!(matches!(manager.random_org_index(), Err(Error::EmptyPopulation)));
    }

    #[test]
    fn test_random_selection_skips_empty_slots() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(10);
        manager
            .add_org_at(org(7, &drops), WorldPosition::active(6), WorldPosition::invalid())
            .unwrap();
        for _ in 0..20 {
            assert_eq!(manager.random_org_index().unwrap(), 6);
        }
        assert_eq!(manager.random_org().unwrap().id, 7);
    }

    #[test]
    fn test_do_birth_fills_lowest_empty_slots() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(5);
        manager
            .add_org_at(org(1, &drops), WorldPosition::active(2), WorldPosition::invalid())
            .unwrap();
        manager.policies_mut().set_find_birth_position(|_, _, ctx| {
            ctx.store
                .first_empty_active()
                .map(WorldPosition::active)
                .unwrap_or_default()
        });
        let log = record_signals(&mut manager);

        let parent = manager.get_org(2).unwrap().clone();
        let last = manager.do_birth(&parent, 2, 3).unwrap();

        let placements: Vec<String> = log
            .borrow()
            .iter()
            .filter(|e| e.starts_with("on_placement"))
            .cloned()
            .collect();
        assert_eq!(placements, vec!["on_placement 0", "on_placement 1", "on_placement 3"]);
        assert_eq!(count_of(&log, "before_repro"), 1);
        assert_eq!(count_of(&log, "offspring_ready"), 3);
        assert_eq!(log.borrow()[0], "before_repro 2");
        assert_eq!(last, WorldPosition::active(3));
        assert_eq!(manager.num_orgs(), 4);
        assert_count_consistent(&manager);
    }

    #[test]
    fn test_do_birth_when_full_returns_invalid() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(1);
        manager
            .add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid())
            .unwrap();
        manager.policies_mut().set_find_birth_position(|_, _, ctx| {
            ctx.store
                .first_empty_active()
                .map(WorldPosition::active)
                .unwrap_or_default()
        });

        let last = manager.do_birth_at(0, 2).unwrap();
        assert!(!last.is_valid());
        assert_eq!(manager.num_orgs(), 1);
        // Both offspring, then the cloned parent handle, were released
        assert_eq!(*drops.borrow(), vec![201, 201, 101]);
    }

    #[test]
    fn test_do_birth_may_replace_parent() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager
            .add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid())
            .unwrap();
        manager
            .policies_mut()
            .set_find_birth_position(|_, parent_index, _| WorldPosition::active(parent_index));

        let parent = manager.get_org(0).unwrap().clone();
        let last = manager.do_birth(&parent, 0, 2).unwrap();

        assert_eq!(last, WorldPosition::active(0));
        assert_eq!(manager.num_orgs(), 1);
        assert_eq!(manager.org(0).map(|o| o.id), Some(201));
    }

    #[test]
    fn test_do_birth_without_policy_fails() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        let log = record_signals(&mut manager);
        let result = manager.do_birth(&org(1, &drops), 0, 1);
        assert!(matches!(
            result,
            Err(Error::PolicyMissing(PolicyKind::FindBirthPosition))
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_rejected_injection_releases_every_copy() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(4);
        manager
            .policies_mut()
            .set_find_inject_position(|_, _| WorldPosition::invalid());
        let log = record_signals(&mut manager);

        let placed = manager.inject(org(5, &drops), 2).unwrap();

        assert_eq!(placed, 0);
        assert_eq!(manager.num_orgs(), 0);
        assert_eq!(count_of(&log, "inject_ready"), 2);
        assert_eq!(drops.borrow().len(), 2);
    }

    #[test]
    fn test_inject_clones_per_copy() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(4);
        manager.policies_mut().set_find_inject_position(|_, ctx| {
            ctx.store
                .first_empty_active()
                .map(WorldPosition::active)
                .unwrap_or_default()
        });

        let placed = manager.inject(org(5, &drops), 3).unwrap();
        assert_eq!(placed, 3);
        assert_eq!(manager.num_orgs(), 3);
        assert_eq!(manager.org(0).map(|o| o.id), Some(105));
        assert_eq!(manager.org(2).map(|o| o.id), Some(5));
        assert!(drops.borrow().is_empty());
    }

    #[test]
    fn test_inject_at_bypasses_policy() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(4);
        let log = record_signals(&mut manager);

        manager.inject_at(org(9, &drops), WorldPosition::active(3)).unwrap();
        assert_eq!(log.borrow()[0], "inject_ready 9");
        assert_eq!(manager.num_orgs(), 1);

        let result = manager.inject_at(org(10, &drops), WorldPosition::invalid());
        assert!(matches!(result, Err(Error::PreconditionViolation(_))));
    }

    #[test]
    fn test_swap_round_trip() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        let a = WorldPosition::active(0);
        let b = WorldPosition::active(2);
        manager.add_org_at(org(1, &drops), a, WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(2, &drops), b, WorldPosition::invalid()).unwrap();
        let log = record_signals(&mut manager);

        manager.swap(a, b).unwrap();
        assert_eq!(manager.org(0).map(|o| o.id), Some(2));
        manager.swap(b, a).unwrap();
        assert_eq!(manager.org(0).map(|o| o.id), Some(1));
        assert_eq!(manager.org(2).map(|o| o.id), Some(2));

        assert_eq!(
            *log.borrow(),
            vec![
                "on_swap active[0] active[2]".to_string(),
                "on_swap active[2] active[0]".to_string(),
            ]
        );
        assert!(drops.borrow().is_empty());
    }

    #[test]
    fn test_swap_across_buffers_keeps_count() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager
            .add_org_at(org(1, &drops), WorldPosition::next(0), WorldPosition::invalid())
            .unwrap();
        manager.swap(WorldPosition::active(1), WorldPosition::next(0)).unwrap();
        assert_eq!(manager.num_orgs(), 1);
        assert_count_consistent(&manager);

        assert!(manager.swap(WorldPosition::invalid(), WorldPosition::active(0)).is_err());
    }

    #[test]
    fn test_clear_and_reset() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(2, &drops), WorldPosition::next(1), WorldPosition::invalid()).unwrap();
        let log = record_signals(&mut manager);
        manager.update();
        manager.update();

        manager.clear();
        assert_eq!(manager.num_orgs(), 0);
        assert_eq!(manager.store().active_len(), 0);
        assert_eq!(manager.store().next_len(), 0);
        assert_eq!(manager.update_count(), 2);
        assert_eq!(count_of(&log, "on_death"), 1);
        assert_eq!(drops.borrow().len(), 2);

        manager.reset();
        assert_eq!(manager.update_count(), 0);
    }

    #[test]
    fn test_update_fires_step_number() {
        let mut manager = create_manager(1);
        let log = record_signals(&mut manager);
        manager.update();
        manager.update();
        assert_eq!(*log.borrow(), vec!["on_update 0".to_string(), "on_update 1".to_string()]);
        assert_eq!(manager.update_count(), 2);
    }

    #[test]
    fn test_synchronous_generation_hand_off() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        manager.mark_synchronous(true);
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(2, &drops), WorldPosition::next(1), WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(3, &drops), WorldPosition::next(2), WorldPosition::invalid()).unwrap();
        let log = record_signals(&mut manager);

        manager.update();

        assert_eq!(
            *log.borrow(),
            vec![
                "on_update 0".to_string(),
                "on_death 0 1".to_string(),
                "before_placement 2 1".to_string(),
                "on_placement 1".to_string(),
                "before_placement 3 2".to_string(),
                "on_placement 2".to_string(),
            ]
        );
        assert_eq!(count_of(&log, "before_placement"), count_of(&log, "on_placement"));
        assert_eq!(manager.num_orgs(), 2);
        assert_eq!(manager.size(), 3);
        assert_eq!(manager.store().next_len(), 0);
        assert_eq!(manager.org(1).map(|o| o.id), Some(2));
        assert_count_consistent(&manager);
    }

    #[test]
    fn test_fitness_cache() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager.set_cache(true);
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        manager.policies_mut().set_calc_fitness(move |org: &TestOrg| {
            *calls_clone.borrow_mut() += 1;
            if org.id == 1 { 0.0 } else { org.id as f64 }
        });

        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        assert_eq!(manager.fitness_at(0).unwrap(), 0.0);
        assert_eq!(manager.fitness_at(0).unwrap(), 0.0);
        assert_eq!(*calls.borrow(), 1);

        manager.add_org_at(org(4, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        assert_eq!(manager.fitness_at(0).unwrap(), 4.0);
        assert_eq!(*calls.borrow(), 2);

        assert!(matches!(manager.fitness_at(1), Err(Error::PreconditionViolation(_))));
    }

    #[test]
    fn test_fitness_without_cache_recomputes() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(1);
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        manager.policies_mut().set_calc_fitness(move |_: &TestOrg| {
            *calls_clone.borrow_mut() += 1;
            1.0
        });
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        manager.fitness_at(0).unwrap();
        manager.fitness_at(0).unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert!(!manager.is_cache_on());
    }

    #[test]
    fn test_mutate_at_invalidates_cache() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(1);
        manager.set_cache(true);
        manager.policies_mut().set_calc_fitness(|org: &TestOrg| org.id as f64);
        manager.policies_mut().set_do_mutations(|org: &mut TestOrg, _| {
            org.id += 1;
            1
        });
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();

        assert_eq!(manager.fitness_at(0).unwrap(), 1.0);
        assert_eq!(manager.mutate_at(WorldPosition::active(0)).unwrap(), 1);
        assert_eq!(manager.fitness_at(0).unwrap(), 2.0);

        assert!(manager.mutate_at(WorldPosition::next(0)).is_err());
    }

    #[test]
    fn test_accessors() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        manager.set_cache(true);
        manager.policies_mut().set_calc_fitness(|org: &TestOrg| org.id as f64);
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(2, &drops), WorldPosition::active(2), WorldPosition::invalid()).unwrap();
        manager.add_org_at(org(3, &drops), WorldPosition::next(1), WorldPosition::invalid()).unwrap();

        let occupied: Vec<usize> = manager.iter_orgs().map(|(i, _)| i).collect();
        assert_eq!(occupied, vec![0, 2]);
        assert_eq!(manager.next_org(1).map(|o| o.id), Some(3));
        assert!(manager.get_org(1).is_err());

        assert_eq!(manager.fitness_at(2).unwrap(), 2.0);
        if let Some(resident) = manager.org_mut(2) {
            resident.id = 5;
        }
        assert_eq!(manager.fitness_at(2).unwrap(), 5.0);
    }

    #[test]
    fn test_kill_and_neighbor_policies() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(3);
        manager.add_org_at(org(1, &drops), WorldPosition::active(1), WorldPosition::invalid()).unwrap();

        assert!(matches!(
            manager.kill_org(),
            Err(Error::PolicyMissing(PolicyKind::FindKillTarget))
        ));

        manager
            .policies_mut()
            .set_find_kill_target(|_| WorldPosition::active(1))
            .set_find_neighbor(|pos, ctx| {
                WorldPosition::active((pos.index() + 1) % ctx.store.active_len())
            });

        assert_eq!(manager.kill_org().unwrap(), WorldPosition::active(1));
        assert_eq!(manager.num_orgs(), 0);
        assert_eq!(
            manager.neighbor_of(WorldPosition::active(2)).unwrap(),
            WorldPosition::active(0)
        );
    }

    #[test]
    fn test_offspring_ready_can_modify_offspring() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager
            .policies_mut()
            .set_find_birth_position(|_, _, _| WorldPosition::active(1));
        manager
            .signals_mut()
            .offspring_ready
            .add(|org: &mut TestOrg, _| org.id = 77);

        manager.do_birth(&org(1, &drops), 0, 1).unwrap();
        assert_eq!(manager.org(1).map(|o| o.id), Some(77));
    }

    #[test]
    fn test_drop_clears_then_fires_destruct() {
        let drops = Rc::new(RefCell::new(Vec::new()));
        let mut manager = create_manager(2);
        manager.add_org_at(org(1, &drops), WorldPosition::active(0), WorldPosition::invalid()).unwrap();
        let log = record_signals(&mut manager);

        drop(manager);

        assert_eq!(
            *log.borrow(),
            vec!["on_death 0 1".to_string(), "on_destruct".to_string()]
        );
        assert_eq!(*drops.borrow(), vec![1]);
    }

    #[test]
    fn test_from_config() {
        let config = PopulationConfig {
            name: "cfg".to_string(),
            random_seed: 3,
            init_size: 4,
            grid: Some((3, 3)),
            cache_fitness: true,
            synchronous: true,
            ..Default::default()
        };
        let mut manager: LifecycleManager<u32> = LifecycleManager::from_config(&config).unwrap();
        assert_eq!(manager.size(), 9);
        assert_eq!(manager.width(), 3);
        assert!(manager.is_cache_on());
        assert!(manager.is_synchronous());
        assert_eq!(manager.name(), "cfg");

        manager.policies_mut().set_find_inject_position(|_, ctx| {
            ctx.store
                .first_empty_active()
                .map(WorldPosition::active)
                .unwrap_or_default()
        });
        let placed = manager.initialize_with(|rng| rng.gen_range(0..10)).unwrap();
        assert_eq!(placed, 4);
        assert_eq!(manager.num_orgs(), 4);
    }
}
