//! Ordered, synchronous lifecycle signals.
//!
//! Each event kind owns a list of subscriber closures. Triggering a signal runs
//! every subscriber to completion, in registration order, before returning.
//! Subscribers get plain arguments rather than access to the manager, so they
//! cannot re-enter the operation that fired them.

use evopop_core::WorldPosition;
use tracing::trace;

/// A named list of subscribers sharing one callback signature
pub struct Signal<F: ?Sized> {
    name: String,
    handlers: Vec<Box<F>>,
}

impl<F: ?Sized> Signal<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn log_trigger(&self) {
        if !self.handlers.is_empty() {
            trace!(signal = %self.name, subscribers = self.handlers.len(), "Triggering signal");
        }
    }
}

impl Signal<dyn FnMut()> {
    pub fn add(&mut self, handler: impl FnMut() + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler();
        }
    }
}

impl Signal<dyn FnMut(usize)> {
    pub fn add(&mut self, handler: impl FnMut(usize) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, value: usize) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(value);
        }
    }
}

impl Signal<dyn FnMut(WorldPosition, WorldPosition)> {
    pub fn add(&mut self, handler: impl FnMut(WorldPosition, WorldPosition) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, pos1: WorldPosition, pos2: WorldPosition) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(pos1, pos2);
        }
    }
}

impl<O> Signal<dyn FnMut(&mut O)> {
    pub fn add(&mut self, handler: impl FnMut(&mut O) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, org: &mut O) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(org);
        }
    }
}

impl<O> Signal<dyn FnMut(&mut O, usize)> {
    pub fn add(&mut self, handler: impl FnMut(&mut O, usize) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, org: &mut O, index: usize) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(org, index);
        }
    }
}

impl<O> Signal<dyn FnMut(&O, usize)> {
    pub fn add(&mut self, handler: impl FnMut(&O, usize) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, org: &O, index: usize) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(org, index);
        }
    }
}

impl<O> Signal<dyn FnMut(usize, &O)> {
    pub fn add(&mut self, handler: impl FnMut(usize, &O) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn trigger(&mut self, index: usize, org: &O) {
        self.log_trigger();
        for handler in &mut self.handlers {
            handler(index, org);
        }
    }
}

/// Every lifecycle event the manager fires
pub struct SignalBus<O> {
    /// Before a parent reproduces; fired once per birth batch with the parent index
    pub before_repro: Signal<dyn FnMut(usize)>,
    /// Each offspring clone, before a position is chosen for it
    pub offspring_ready: Signal<dyn FnMut(&mut O, usize)>,
    /// Each injected copy, before a position is chosen for it
    pub inject_ready: Signal<dyn FnMut(&mut O)>,
    /// Before an organism goes into an active slot
    pub before_placement: Signal<dyn FnMut(&O, usize)>,
    /// After an active slot receives an occupant
    pub on_placement: Signal<dyn FnMut(usize, &O)>,
    /// Immediately before an active occupant is destroyed
    pub on_death: Signal<dyn FnMut(usize, &O)>,
    /// After two slots exchange contents
    pub on_swap: Signal<dyn FnMut(WorldPosition, WorldPosition)>,
    /// Once per discrete time step
    pub on_update: Signal<dyn FnMut(usize)>,
    /// Once, when the manager is torn down
    pub on_destruct: Signal<dyn FnMut()>,
}

impl<O> SignalBus<O> {
    /// Build a bus whose signal names are prefixed with `world`
    pub fn new(world: &str) -> Self {
        let named = |event: &str| format!("{}::{}", world, event);
        Self {
            before_repro: Signal::new(named("before-repro")),
            offspring_ready: Signal::new(named("offspring-ready")),
            inject_ready: Signal::new(named("inject-ready")),
            before_placement: Signal::new(named("before-placement")),
            on_placement: Signal::new(named("on-placement")),
            on_death: Signal::new(named("on-death")),
            on_swap: Signal::new(named("on-swap")),
            on_update: Signal::new(named("on-update")),
            on_destruct: Signal::new(named("world-destruct")),
        }
    }

    /// (signal name, subscriber count) for every event
    pub fn subscriber_counts(&self) -> Vec<(&str, usize)> {
        vec![
            (self.before_repro.name(), self.before_repro.len()),
            (self.offspring_ready.name(), self.offspring_ready.len()),
            (self.inject_ready.name(), self.inject_ready.len()),
            (self.before_placement.name(), self.before_placement.len()),
            (self.on_placement.name(), self.on_placement.len()),
            (self.on_death.name(), self.on_death.len()),
            (self.on_swap.name(), self.on_swap.len()),
            (self.on_update.name(), self.on_update.len()),
            (self.on_destruct.name(), self.on_destruct.len()),
        ]
    }
}
