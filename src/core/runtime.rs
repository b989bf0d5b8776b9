/// Per-session runtime state shared by every dispatch.
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::core::actor_map::{ActorHandle, ActorMap};
use crate::core::config::DispatchConfig;
use crate::core::thread::{random_variance, NarrativeThread, ThreadHandle, ThreadPool};
use crate::core::thread_map::{TargetKey, ThreadMap};
use crate::core::variables::{Resolvers, TablePool, VariableResolver, Variables};
use crate::schema::actor::{Actor, ActorId};

/// Owns the actors, threads, pools and random source of one game
/// session. Created at boot and dropped at shutdown; nothing in it is
/// process-global, so independent runtimes can coexist.
#[derive(Debug)]
pub struct RuntimeState {
    pub(crate) actors: ActorMap,
    pub(crate) thread_map: ThreadMap,
    pub(crate) threads: ThreadPool,
    pub(crate) tables: TablePool,
    pub(crate) variables: Variables,
    pub(crate) resolvers: Resolvers,
    pub(crate) rng: StdRng,
    pub(crate) cutscene: Option<ThreadHandle>,
    clock: f64,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(&DispatchConfig::default())
    }
}

impl RuntimeState {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            actors: ActorMap::new(),
            thread_map: ThreadMap::new(),
            threads: ThreadPool::with_capacity(config.thread_pool_capacity),
            tables: TablePool::with_capacity(config.table_pool_capacity),
            variables: Variables::new(),
            resolvers: Resolvers::new(),
            rng: StdRng::seed_from_u64(config.seed),
            cutscene: None,
            clock: 0.0,
        }
    }

    /// Simulated time in seconds.
    pub fn now(&self) -> f64 {
        self.clock
    }

    pub(crate) fn advance_clock(&mut self, dt: f64) {
        if dt.is_finite() && dt >= 0.0 {
            self.clock += dt;
        } else {
            warn!(dt, "ignoring invalid tick delta");
        }
    }

    pub fn register_actor(&mut self, actor: Actor) -> ActorHandle {
        self.actors.register(actor)
    }

    pub fn deregister_actor(&mut self, handle: ActorHandle) -> Option<Actor> {
        self.actors.deregister(handle)
    }

    pub fn actors(&self) -> &ActorMap {
        &self.actors
    }

    pub fn actors_mut(&mut self) -> &mut ActorMap {
        &mut self.actors
    }

    pub fn actor_by_id(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.by_id(id)
    }

    /// The actor a trigger speaks for: its explicit actor context if
    /// still registered, otherwise the actor named by the target.
    pub fn context_actor(
        &self,
        actor_context: Option<ActorHandle>,
        target: &TargetKey,
    ) -> Option<&Actor> {
        actor_context
            .and_then(|h| self.actors.get(h))
            .or_else(|| target.as_ref().and_then(|id| self.actors.by_id(id)))
    }

    pub fn thread_map(&self) -> &ThreadMap {
        &self.thread_map
    }

    pub fn threads(&self) -> &ThreadPool {
        &self.threads
    }

    pub fn thread(&self, handle: ThreadHandle) -> Option<&NarrativeThread> {
        self.threads.get(handle)
    }

    pub fn tables(&self) -> &TablePool {
        &self.tables
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn register_resolver(
        &mut self,
        name: impl Into<String>,
        resolver: Box<dyn VariableResolver>,
    ) {
        let name = name.into();
        debug!(resolver = %name, "variable resolver registered");
        self.resolvers.register(name, resolver);
    }

    pub fn resolvers(&self) -> &Resolvers {
        &self.resolvers
    }

    /// The running cutscene thread, if any.
    pub fn cutscene(&self) -> Option<ThreadHandle> {
        self.cutscene.filter(|h| self.threads.is_live(*h))
    }

    pub fn is_cutscene_running(&self) -> bool {
        self.cutscene().is_some()
    }

    /// `base` plus a uniform random offset in `[-variance, variance]`,
    /// clamped at zero.
    pub fn random_variance(&mut self, base: f64, variance: f64) -> f64 {
        random_variance(&mut self.rng, base, variance)
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    #[test]
    fn clock_ignores_bad_deltas() {
        let mut runtime = RuntimeState::default();
        runtime.advance_clock(0.5);
        runtime.advance_clock(-1.0);
        runtime.advance_clock(f64::NAN);
        assert_eq!(runtime.now(), 0.5);
    }

    #[test]
    fn context_actor_prefers_explicit_handle() {
        let mut runtime = RuntimeState::default();
        let target = runtime.register_actor(Actor::named("Penguin1"));
        let speaker = runtime.register_actor(Actor::anonymous("narrator"));
        let key = Some(ActorId::from("Penguin1"));
        assert_eq!(runtime.context_actor(Some(speaker), &key).unwrap().name, "narrator");
        assert_eq!(runtime.context_actor(None, &key).unwrap().name, "Penguin1");

        runtime.deregister_actor(speaker);
        assert_eq!(runtime.context_actor(Some(speaker), &key).unwrap().name, "Penguin1");
        runtime.deregister_actor(target);
        assert!(runtime.context_actor(None, &key).is_none());
    }

    #[test]
    fn same_seed_same_variance() {
        let config = DispatchConfig {
            seed: 99,
            ..DispatchConfig::default()
        };
        let mut a = RuntimeState::new(&config);
        let mut b = RuntimeState::new(&config);
        for _ in 0..10 {
            assert_eq!(a.random_variance(3.0, 1.0), b.random_variance(3.0, 1.0));
        }
    }

    #[test]
    fn resolvers_are_registered() {
        let mut runtime = RuntimeState::default();
        runtime.register_resolver("clock", Box::new(|_: &str| Some(Value::Int(12))));
        assert!(runtime.resolvers().contains("clock"));
    }
}
