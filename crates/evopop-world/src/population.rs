//! Slot storage for the active and next generations.

use evopop_core::{FitnessCache, PopulationId, WorldPosition};

/// Two parallel arenas of optionally occupied slots.
///
/// The store keeps `num_orgs` and the fitness cache in step with every change
/// to an active slot. Signals are not its concern: the lifecycle manager runs
/// the removal protocol before calling the mutating methods here.
#[derive(Debug)]
pub struct PopulationStore<O> {
    active: Vec<Option<O>>,
    next: Vec<Option<O>>,
    dims: Vec<usize>,
    num_orgs: usize,
    fitness_cache: FitnessCache,
}

impl<O> Default for PopulationStore<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> PopulationStore<O> {
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            next: Vec::new(),
            dims: vec![0],
            num_orgs: 0,
            fitness_cache: FitnessCache::new(),
        }
    }

    /// Number of slots in the active population
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn next_len(&self) -> usize {
        self.next.len()
    }

    pub fn len(&self, population: PopulationId) -> usize {
        self.buffer(population).len()
    }

    /// Number of occupied active slots
    pub fn num_orgs(&self) -> usize {
        self.num_orgs
    }

    /// Sizes of the active population's dimensions (two values for a grid).
    ///
    /// A flat layout follows the active length as it grows. A grid keeps its
    /// recorded dims when a placement grows the buffer past `width * height`;
    /// slots beyond the grid have no spatial meaning.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn width(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.dims.get(1).copied().unwrap_or(1)
    }

    pub fn fitness_cache(&self) -> &FitnessCache {
        &self.fitness_cache
    }

    pub fn get(&self, pos: WorldPosition) -> Option<&O> {
        if !pos.is_valid() {
            return None;
        }
        self.buffer(pos.population())
            .get(pos.index())
            .and_then(Option::as_ref)
    }

    /// Valid, in range and holding an organism
    pub fn is_occupied(&self, pos: WorldPosition) -> bool {
        self.get(pos).is_some()
    }

    /// Occupied active slots with their indices
    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &O)> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|org| (index, org)))
    }

    pub fn occupied_indices(&self, population: PopulationId) -> Vec<usize> {
        self.buffer(population)
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index)
            .collect()
    }

    /// Count occupied slots by scanning; for checking `num_orgs`, never for maintaining it
    pub fn count_occupied(&self, population: PopulationId) -> usize {
        self.buffer(population).iter().filter(|slot| slot.is_some()).count()
    }

    /// Lowest-index empty slot in the active population
    pub fn first_empty_active(&self) -> Option<usize> {
        self.active.iter().position(Option::is_none)
    }

    fn buffer(&self, population: PopulationId) -> &Vec<Option<O>> {
        match population {
            PopulationId::Active => &self.active,
            PopulationId::Next => &self.next,
        }
    }

    fn buffer_mut(&mut self, population: PopulationId) -> &mut Vec<Option<O>> {
        match population {
            PopulationId::Active => &mut self.active,
            PopulationId::Next => &mut self.next,
        }
    }

    pub(crate) fn get_mut(&mut self, pos: WorldPosition) -> Option<&mut O> {
        if !pos.is_valid() {
            return None;
        }
        self.buffer_mut(pos.population())
            .get_mut(pos.index())
            .and_then(Option::as_mut)
    }

    pub(crate) fn fitness_cache_mut(&mut self) -> &mut FitnessCache {
        &mut self.fitness_cache
    }

    /// Grow the addressed buffer so `pos` can be indexed
    pub(crate) fn make_valid(&mut self, pos: WorldPosition) {
        debug_assert!(pos.is_valid());
        let needed = pos.index() + 1;
        let buffer = self.buffer_mut(pos.population());
        if buffer.len() < needed {
            buffer.resize_with(needed, || None);
            if pos.is_active() {
                self.fitness_cache.resize(needed);
                self.sync_flat_dims();
            }
        }
    }

    fn sync_flat_dims(&mut self) {
        if self.dims.len() == 1 {
            self.dims[0] = self.active.len();
        }
    }

    /// Store an organism, returning whatever the slot held before
    pub(crate) fn insert(&mut self, pos: WorldPosition, org: O) -> Option<O> {
        self.make_valid(pos);
        let index = pos.index();
        let previous = self.buffer_mut(pos.population())[index].replace(org);
        if pos.is_active() {
            if previous.is_none() {
                self.num_orgs += 1;
            }
            self.fitness_cache.invalidate(index);
        }
        previous
    }

    /// Empty a slot, handing its occupant to the caller
    pub(crate) fn take(&mut self, pos: WorldPosition) -> Option<O> {
        if !pos.is_valid() {
            return None;
        }
        let index = pos.index();
        let taken = self
            .buffer_mut(pos.population())
            .get_mut(index)
            .and_then(Option::take);
        if taken.is_some() && pos.is_active() {
            self.num_orgs -= 1;
            self.fitness_cache.invalidate(index);
        }
        taken
    }

    /// Exchange the contents of two slots, growing buffers as needed
    pub(crate) fn swap(&mut self, pos1: WorldPosition, pos2: WorldPosition) {
        self.make_valid(pos1);
        self.make_valid(pos2);

        match (pos1.population(), pos2.population()) {
            (PopulationId::Active, PopulationId::Active) => {
                self.active.swap(pos1.index(), pos2.index());
                self.fitness_cache.swap(pos1.index(), pos2.index());
            }
            (PopulationId::Next, PopulationId::Next) => {
                self.next.swap(pos1.index(), pos2.index());
            }
            (PopulationId::Active, PopulationId::Next) => {
                self.swap_across(pos1.index(), pos2.index());
            }
            (PopulationId::Next, PopulationId::Active) => {
                self.swap_across(pos2.index(), pos1.index());
            }
        }
    }

    fn swap_across(&mut self, active_index: usize, next_index: usize) {
        let was_occupied = self.active[active_index].is_some();
        std::mem::swap(&mut self.active[active_index], &mut self.next[next_index]);
        let now_occupied = self.active[active_index].is_some();

        match (was_occupied, now_occupied) {
            (false, true) => self.num_orgs += 1,
            (true, false) => self.num_orgs -= 1,
            _ => {}
        }
        self.fitness_cache.invalidate(active_index);
    }

    /// Set the active length; trailing slots must already be empty
    pub(crate) fn resize_active(&mut self, new_size: usize) {
        debug_assert!(self.active.iter().skip(new_size).all(Option::is_none));
        self.active.resize_with(new_size, || None);
        self.fitness_cache.resize(new_size);
        self.sync_flat_dims();
    }

    pub(crate) fn set_dims(&mut self, dims: Vec<usize>) {
        self.dims = dims;
    }

    /// Drop both buffers to length zero; every slot must already be empty
    pub(crate) fn truncate_all(&mut self) {
        debug_assert_eq!(self.num_orgs, 0);
        self.active.clear();
        self.next.clear();
        self.fitness_cache.clear();
        self.sync_flat_dims();
    }

    /// Move the next generation out, leaving the next buffer empty
    pub(crate) fn take_next(&mut self) -> Vec<Option<O>> {
        std::mem::take(&mut self.next)
    }
}
