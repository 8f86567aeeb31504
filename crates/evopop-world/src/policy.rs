//! Externally supplied decision functions.
//!
//! The manager never decides where organisms go, which die, or how fit they
//! are. Surrounding modules install closures here during setup; an operation
//! that needs a policy which was never installed fails with
//! [`Error::PolicyMissing`].

use crate::population::PopulationStore;
use evopop_core::{Error, PolicyKind, Result, WorldPosition};
use rand_chacha::ChaCha8Rng;

/// Read-only view of the world handed to position-finding policies
pub struct PolicyContext<'a, O> {
    /// Population state, including changes made earlier in the same batch
    pub store: &'a PopulationStore<O>,
    /// The manager's random number generator
    pub rng: &'a mut ChaCha8Rng,
    /// Current update number
    pub update: usize,
}

type FindInjectFn<O> = Box<dyn FnMut(&O, &mut PolicyContext<'_, O>) -> WorldPosition>;
type FindBirthFn<O> = Box<dyn FnMut(&O, usize, &mut PolicyContext<'_, O>) -> WorldPosition>;
type FindKillFn<O> = Box<dyn FnMut(&mut PolicyContext<'_, O>) -> WorldPosition>;
type FindNeighborFn<O> = Box<dyn FnMut(WorldPosition, &mut PolicyContext<'_, O>) -> WorldPosition>;
type CalcFitnessFn<O> = Box<dyn FnMut(&O) -> f64>;
type DoMutationsFn<O> = Box<dyn FnMut(&mut O, &mut ChaCha8Rng) -> usize>;

/// One optional entry per policy
pub struct PolicySet<O> {
    find_inject_position: Option<FindInjectFn<O>>,
    find_birth_position: Option<FindBirthFn<O>>,
    find_kill_target: Option<FindKillFn<O>>,
    find_neighbor: Option<FindNeighborFn<O>>,
    calc_fitness: Option<CalcFitnessFn<O>>,
    do_mutations: Option<DoMutationsFn<O>>,
}

impl<O> Default for PolicySet<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> PolicySet<O> {
    pub fn new() -> Self {
        Self {
            find_inject_position: None,
            find_birth_position: None,
            find_kill_target: None,
            find_neighbor: None,
            calc_fitness: None,
            do_mutations: None,
        }
    }

    pub fn set_find_inject_position(
        &mut self,
        policy: impl FnMut(&O, &mut PolicyContext<'_, O>) -> WorldPosition + 'static,
    ) -> &mut Self {
        self.find_inject_position = Some(Box::new(policy));
        self
    }

    pub fn set_find_birth_position(
        &mut self,
        policy: impl FnMut(&O, usize, &mut PolicyContext<'_, O>) -> WorldPosition + 'static,
    ) -> &mut Self {
        self.find_birth_position = Some(Box::new(policy));
        self
    }

    pub fn set_find_kill_target(
        &mut self,
        policy: impl FnMut(&mut PolicyContext<'_, O>) -> WorldPosition + 'static,
    ) -> &mut Self {
        self.find_kill_target = Some(Box::new(policy));
        self
    }

    pub fn set_find_neighbor(
        &mut self,
        policy: impl FnMut(WorldPosition, &mut PolicyContext<'_, O>) -> WorldPosition + 'static,
    ) -> &mut Self {
        self.find_neighbor = Some(Box::new(policy));
        self
    }

    pub fn set_calc_fitness(&mut self, policy: impl FnMut(&O) -> f64 + 'static) -> &mut Self {
        self.calc_fitness = Some(Box::new(policy));
        self
    }

    pub fn set_do_mutations(
        &mut self,
        policy: impl FnMut(&mut O, &mut ChaCha8Rng) -> usize + 'static,
    ) -> &mut Self {
        self.do_mutations = Some(Box::new(policy));
        self
    }

    pub fn is_set(&self, kind: PolicyKind) -> bool {
        match kind {
            PolicyKind::FindInjectPosition => self.find_inject_position.is_some(),
            PolicyKind::FindBirthPosition => self.find_birth_position.is_some(),
            PolicyKind::FindKillTarget => self.find_kill_target.is_some(),
            PolicyKind::FindNeighbor => self.find_neighbor.is_some(),
            PolicyKind::CalcFitness => self.calc_fitness.is_some(),
            PolicyKind::DoMutations => self.do_mutations.is_some(),
        }
    }

    /// Fail unless the policy is installed
    pub fn require(&self, kind: PolicyKind) -> Result<()> {
        if self.is_set(kind) {
            Ok(())
        } else {
            Err(Error::PolicyMissing(kind))
        }
    }

    pub fn find_inject_position(
        &mut self,
        org: &O,
        ctx: &mut PolicyContext<'_, O>,
    ) -> Result<WorldPosition> {
        let policy = self
            .find_inject_position
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::FindInjectPosition))?;
        Ok(policy(org, ctx))
    }

    pub fn find_birth_position(
        &mut self,
        org: &O,
        parent_index: usize,
        ctx: &mut PolicyContext<'_, O>,
    ) -> Result<WorldPosition> {
        let policy = self
            .find_birth_position
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::FindBirthPosition))?;
        Ok(policy(org, parent_index, ctx))
    }

    pub fn find_kill_target(&mut self, ctx: &mut PolicyContext<'_, O>) -> Result<WorldPosition> {
        let policy = self
            .find_kill_target
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::FindKillTarget))?;
        Ok(policy(ctx))
    }

    pub fn find_neighbor(
        &mut self,
        pos: WorldPosition,
        ctx: &mut PolicyContext<'_, O>,
    ) -> Result<WorldPosition> {
        let policy = self
            .find_neighbor
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::FindNeighbor))?;
        Ok(policy(pos, ctx))
    }

    pub fn calc_fitness(&mut self, org: &O) -> Result<f64> {
        let policy = self
            .calc_fitness
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::CalcFitness))?;
        Ok(policy(org))
    }

    pub fn do_mutations(&mut self, org: &mut O, rng: &mut ChaCha8Rng) -> Result<usize> {
        let policy = self
            .do_mutations
            .as_mut()
            .ok_or(Error::PolicyMissing(PolicyKind::DoMutations))?;
        Ok(policy(org, rng))
    }
}
