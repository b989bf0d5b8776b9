/// The dispatcher: trigger selection policy, thread lifecycle and the
/// per-tick scheduler.
///
/// Firing a trigger gathers matching trigger nodes from every selectable
/// package, drops those gated by cutscenes, cooldowns, `Once` history or
/// false conditions, then resolves each target independently: a candidate
/// may only displace the thread already controlling its target by
/// outranking it (or matching it with `@interrupt`), the most specific
/// survivors win, and weights break the remaining tie.
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::core::actor_map::ActorHandle;
use crate::core::conditions::{ConditionEvaluator, EvalContext, StandardEvaluator};
use crate::core::config::{ConfigError, DispatchConfig};
use crate::core::loader::{self, LoaderError, PackageDef};
use crate::core::persistence::{PersistenceMap, PersistenceSnapshot};
use crate::core::runtime::RuntimeState;
use crate::core::thread::{
    BodyFactory, EmittedTrigger, NarrativeThread, ScriptBodyFactory, Step, StepContext, Suspend,
    ThreadHandle, ThreadState,
};
use crate::core::thread_map::TargetKey;
use crate::core::variables::VariableResolver;
use crate::schema::actor::{Actor, ActorId};
use crate::schema::node::{Node, NodeFlags, PersistenceScope, Priority, Target};
use crate::schema::package::{NodeRef, PackageError, PackageId, PackageLibrary};
use crate::schema::value::{Value, VariableTable};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("package error: {0}")]
    Package(#[from] PackageError),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node '{0}' is not exposed")]
    NotExposed(String),
    #[error("node '{0}' belongs to an inactive or failed package")]
    NotSelectable(String),
}

/// A trigger raised by game code: the trigger id plus optional target,
/// actor context and thread-local variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerRequest {
    pub trigger: String,
    pub target: Option<ActorId>,
    pub actor_context: Option<ActorHandle>,
    pub locals: Option<VariableTable>,
}

impl TriggerRequest {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            ..Self::default()
        }
    }

    pub fn target(mut self, id: impl Into<String>) -> Self {
        self.target = Some(ActorId::new(id));
        self
    }

    pub fn actor_context(mut self, actor: ActorHandle) -> Self {
        self.actor_context = Some(actor);
        self
    }

    pub fn locals(mut self, locals: VariableTable) -> Self {
        self.locals = Some(locals);
        self
    }

    pub fn local(mut self, name: &str, value: Value) -> Self {
        self.locals
            .get_or_insert_with(VariableTable::new)
            .set(name, value);
        self
    }
}

impl From<EmittedTrigger> for TriggerRequest {
    fn from(emitted: EmittedTrigger) -> Self {
        Self {
            trigger: emitted.trigger,
            target: emitted.target,
            ..Self::default()
        }
    }
}

/// What one call to [`Dispatcher::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub polled: usize,
    pub finished: usize,
    pub cancelled: usize,
    /// Threads started by triggers that bodies emitted during the tick.
    pub started: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    node: NodeRef,
    target: TargetKey,
    priority: Priority,
    score: i32,
    weight: f32,
    interrupt_same: bool,
}

enum Outcome {
    Parked,
    Completed,
    Cancelled,
}

/// The narrative dispatcher. Built via `Dispatcher::builder()`.
pub struct Dispatcher {
    library: PackageLibrary,
    persistence: PersistenceMap,
    runtime: RuntimeState,
    evaluator: Box<dyn ConditionEvaluator>,
    bodies: Box<dyn BodyFactory>,
    config: DispatchConfig,
    pending: Vec<EmittedTrigger>,
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    config: Option<DispatchConfig>,
    seed: Option<u64>,
    packages_dir: Option<PathBuf>,
    packages: Vec<PackageDef>,
    evaluator: Option<Box<dyn ConditionEvaluator>>,
    bodies: Option<Box<dyn BodyFactory>>,
    resolvers: Vec<(String, Box<dyn VariableResolver>)>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    // --- triggers ---------------------------------------------------------

    /// Raise a trigger. Returns the threads started, one per target at
    /// most; an empty result is the common case, not an error.
    pub fn trigger(&mut self, request: TriggerRequest) -> Vec<ThreadHandle> {
        let now = self.runtime.now();
        let mut groups: Vec<(TargetKey, Vec<Candidate>)> = Vec::new();
        let mut matched = 0usize;

        for package in self.library.selectable() {
            for (node_ref, node) in package.node_refs() {
                if !node.is_trigger() || node.event_id() != Some(request.trigger.as_str()) {
                    continue;
                }
                let Some(target) = resolve_target(node, request.target.as_ref()) else {
                    continue;
                };
                matched += 1;
                if !self.passes_gates(node, &target, &request, now) {
                    continue;
                }
                let candidate = Candidate {
                    node: node_ref,
                    target: target.clone(),
                    priority: node.priority(),
                    score: node.sorting_score(),
                    weight: node.weight(),
                    interrupt_same: node.has(NodeFlags::INTERRUPT_SAME_PRIORITY),
                };
                match groups.iter_mut().find(|(t, _)| *t == target) {
                    Some((_, group)) => group.push(candidate),
                    None => groups.push((target, vec![candidate])),
                }
            }
        }

        trace!(
            trigger = %request.trigger,
            matched,
            eligible = groups.iter().map(|(_, g)| g.len()).sum::<usize>(),
            "trigger gathered"
        );

        let mut started = Vec::new();
        for (target, mut group) in groups {
            self.retain_interrupting(&target, &mut group);
            let Some(choice) = self.choose(group) else {
                trace!(trigger = %request.trigger, ?target, "running thread keeps its target");
                continue;
            };
            if let Some(handle) = self.start_thread(
                choice.node,
                choice.target,
                true,
                request.actor_context,
                request.locals.as_ref(),
            ) {
                started.push(handle);
            }
        }
        started
    }

    /// Shorthand for a trigger with an optional target and nothing else.
    pub fn fire(&mut self, trigger: &str, target: Option<&str>) -> Vec<ThreadHandle> {
        let mut request = TriggerRequest::new(trigger);
        if let Some(target) = target {
            request = request.target(target);
        }
        self.trigger(request)
    }

    /// Run every eligible function node bound to `function_id`. Function
    /// threads never claim their target in the Thread Map, so they neither
    /// interrupt nor get interrupted.
    pub fn call_function(&mut self, function_id: &str, target: Option<&str>) -> Vec<ThreadHandle> {
        let request = TriggerRequest {
            trigger: function_id.to_string(),
            target: target.map(ActorId::from),
            ..TriggerRequest::default()
        };
        let now = self.runtime.now();
        let mut eligible = Vec::new();
        for package in self.library.selectable() {
            for (node_ref, node) in package.node_refs() {
                if !node.is_function() || node.event_id() != Some(function_id) {
                    continue;
                }
                let Some(target) = resolve_target(node, request.target.as_ref()) else {
                    continue;
                };
                if self.passes_gates(node, &target, &request, now) {
                    eligible.push((node_ref, target));
                }
            }
        }
        eligible
            .into_iter()
            .filter_map(|(node, target)| self.start_thread(node, target, false, None, None))
            .collect()
    }

    /// Start an `@exposed` node by full name, bypassing trigger matching
    /// and gating. Trigger nodes claim their target as usual.
    pub fn run_exposed(
        &mut self,
        full_name: &str,
        target: Option<&str>,
    ) -> Result<ThreadHandle, DispatchError> {
        let node_ref = self
            .library
            .find_node(full_name)
            .ok_or_else(|| DispatchError::NodeNotFound(full_name.to_string()))?;
        let selectable = self
            .library
            .get(node_ref.package)
            .is_some_and(|p| p.active() && !p.is_failed());
        if !selectable {
            return Err(DispatchError::NotSelectable(full_name.to_string()));
        }
        let node = self
            .library
            .node(node_ref)
            .ok_or_else(|| DispatchError::NodeNotFound(full_name.to_string()))?;
        if !node.has(NodeFlags::EXPOSED) {
            return Err(DispatchError::NotExposed(full_name.to_string()));
        }
        let explicit = target.map(ActorId::from);
        let target = resolve_target(node, explicit.as_ref()).unwrap_or(explicit);
        let tracked = node.is_trigger();
        self.start_thread(node_ref, target, tracked, None, None)
            .ok_or_else(|| DispatchError::NodeNotFound(full_name.to_string()))
    }

    /// Ask the thread controlling `target` to stop. Returns false if no
    /// thread is mapped there.
    pub fn cancel(&mut self, target: &TargetKey) -> bool {
        let Some(handle) = self.runtime.thread_map.current_handle(target) else {
            return false;
        };
        match self.runtime.threads.get_mut(handle) {
            Some(thread) => {
                thread.request_cancel();
                debug!(thread = %handle, ?target, "thread cancellation requested");
                true
            }
            None => false,
        }
    }

    // --- scheduling ---------------------------------------------------------

    /// Advance the clock by `dt` seconds and poll every live thread once.
    /// Triggers emitted by bodies are dispatched after the pass; threads
    /// they start first run on the next tick.
    pub fn tick(&mut self, dt: f64) -> TickSummary {
        self.runtime.advance_clock(dt);
        let mut summary = TickSummary::default();

        for handle in self.runtime.threads.handles() {
            summary.polled += 1;
            match self.poll_thread(handle) {
                Outcome::Parked => {}
                Outcome::Completed => {
                    self.finish_thread(handle);
                    summary.finished += 1;
                }
                Outcome::Cancelled => {
                    self.finish_thread(handle);
                    summary.finished += 1;
                    summary.cancelled += 1;
                }
            }
        }

        for emitted in std::mem::take(&mut self.pending) {
            summary.started += self.trigger(emitted.into()).len();
        }
        summary
    }

    fn poll_thread(&mut self, handle: ThreadHandle) -> Outcome {
        let Dispatcher {
            library,
            persistence,
            runtime,
            evaluator,
            config,
            pending,
            ..
        } = self;
        let now = runtime.now();
        let RuntimeState {
            actors,
            threads,
            variables,
            resolvers,
            rng,
            ..
        } = runtime;

        let Some(thread) = threads.get_mut(handle) else {
            return Outcome::Parked;
        };
        let Some(node) = thread.origin.and_then(|r| library.node(r)) else {
            error!(thread = %handle, "thread lost its origin node");
            return Outcome::Cancelled;
        };
        let NarrativeThread {
            target,
            actor_context,
            locals,
            body,
            state,
            cancel_requested,
            ..
        } = thread;
        let actor = (*actor_context).or_else(|| target.as_ref().and_then(|id| actors.find(id)));

        if *cancel_requested {
            if let Some(body) = body.as_mut() {
                let mut ctx = StepContext {
                    node,
                    thread: handle,
                    target: target.as_ref(),
                    variables,
                    actor: actor.and_then(|h| actors.get_mut(h)),
                    locals,
                    rng,
                    now,
                    emitted: pending,
                };
                body.on_cancel(&mut ctx);
            }
            debug!(thread = %handle, node = %node.name(), "thread cancelled");
            return Outcome::Cancelled;
        }

        let ready = match state {
            ThreadState::Ready => true,
            ThreadState::Sleeping { wake_at } => now >= *wake_at,
            ThreadState::Waiting(group) => {
                let ctx = EvalContext {
                    variables: &*variables,
                    persistence: &*persistence,
                    resolvers: &*resolvers,
                    actor: actor.and_then(|h| actors.get(h)),
                    locals: Some(&*locals),
                    now,
                };
                evaluator.evaluate(group, &ctx).unwrap_or_else(|error| {
                    warn!(node = %node.name(), %error, "wait condition failed; still waiting");
                    false
                })
            }
        };
        if !ready {
            return Outcome::Parked;
        }
        *state = ThreadState::Ready;

        let Some(body) = body.as_mut() else {
            return Outcome::Completed;
        };
        let mut ctx = StepContext {
            node,
            thread: handle,
            target: target.as_ref(),
            variables,
            actor: actor.and_then(|h| actors.get_mut(h)),
            locals,
            rng,
            now,
            emitted: pending,
        };
        for _ in 0..config.max_steps_per_tick {
            match body.step(&mut ctx) {
                Step::Continue => {}
                Step::Suspend(suspend) => {
                    *state = match suspend {
                        Suspend::NextTick => ThreadState::Ready,
                        Suspend::Seconds(seconds) => ThreadState::Sleeping {
                            wake_at: now + seconds,
                        },
                        Suspend::Until(group) => ThreadState::Waiting(group),
                    };
                    return Outcome::Parked;
                }
                Step::Complete => {
                    debug!(thread = %handle, node = %node.name(), "thread completed");
                    return Outcome::Completed;
                }
            }
        }
        trace!(thread = %handle, node = %node.name(), "step budget spent; resuming next tick");
        Outcome::Parked
    }

    // --- chapter and persistence -------------------------------------------

    /// Chapter transition: clear chapter variables and the Chapter-scope
    /// visited set.
    pub fn reset_chapter(&mut self) {
        self.runtime.variables.reset_chapter();
        self.persistence.clear_scope(PersistenceScope::Chapter);
    }

    pub fn snapshot(&self) -> PersistenceSnapshot {
        self.persistence.snapshot()
    }

    pub fn restore(&mut self, snapshot: &PersistenceSnapshot) {
        self.persistence.restore(snapshot);
    }

    // --- packages and actors -------------------------------------------------

    pub fn load_package_str(
        &mut self,
        fallback_name: &str,
        source: &str,
    ) -> Result<PackageId, DispatchError> {
        Ok(loader::load_str(&mut self.library, fallback_name, source)?)
    }

    pub fn load_package_file(&mut self, path: &Path) -> Result<PackageId, DispatchError> {
        Ok(loader::load_file(&mut self.library, path)?)
    }

    /// Unload a package by name. Refused while any thread still runs one
    /// of its nodes.
    pub fn unload_package(&mut self, name: &str) -> Result<(), DispatchError> {
        let id = self
            .library
            .id_of(name)
            .ok_or_else(|| DispatchError::NodeNotFound(name.to_string()))?;
        self.library.unload(id)?;
        Ok(())
    }

    /// Toggle a package's active flag, returning the previous value.
    pub fn set_package_active(&mut self, name: &str, active: bool) -> Option<bool> {
        let id = self.library.id_of(name)?;
        self.library.get_mut(id).map(|p| p.set_active(active))
    }

    pub fn register_actor(&mut self, actor: Actor) -> ActorHandle {
        self.runtime.register_actor(actor)
    }

    pub fn deregister_actor(&mut self, handle: ActorHandle) -> Option<Actor> {
        self.runtime.deregister_actor(handle)
    }

    // --- accessors -------------------------------------------------------------

    pub fn now(&self) -> f64 {
        self.runtime.now()
    }

    pub fn library(&self) -> &PackageLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut PackageLibrary {
        &mut self.library
    }

    pub fn persistence(&self) -> &PersistenceMap {
        &self.persistence
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut RuntimeState {
        &mut self.runtime
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn thread(&self, handle: ThreadHandle) -> Option<&NarrativeThread> {
        self.runtime.threads.get(handle)
    }

    /// The thread controlling `target`, if any.
    pub fn current_thread(&self, target: Option<&str>) -> Option<ThreadHandle> {
        self.runtime
            .thread_map
            .current_handle(&target.map(ActorId::from))
    }

    /// The node a live thread was started from.
    pub fn node_of(&self, handle: ThreadHandle) -> Option<&Node> {
        self.thread(handle)
            .and_then(|t| t.origin())
            .and_then(|r| self.library.node(r))
    }

    // --- internals -------------------------------------------------------------

    fn passes_gates(
        &self,
        node: &Node,
        target: &TargetKey,
        request: &TriggerRequest,
        now: f64,
    ) -> bool {
        if node.has(NodeFlags::IGNORE_DURING_CUTSCENE)
            && !node.is_cutscene()
            && self.runtime.is_cutscene_running()
        {
            trace!(node = %node.name(), "skipped during cutscene");
            return false;
        }
        if let Some(cooldown) = node.cooldown() {
            if self.persistence.is_on_cooldown(node.id(), cooldown, now) {
                trace!(node = %node.name(), ?cooldown, "on cooldown");
                return false;
            }
        }
        if node.has(NodeFlags::ONCE) && self.persistence.has_seen(node.id(), node.scope()) {
            trace!(node = %node.name(), scope = ?node.scope(), "already seen");
            return false;
        }
        if node.conditions().is_empty() {
            return true;
        }
        let ctx = EvalContext {
            variables: &self.runtime.variables,
            persistence: &self.persistence,
            resolvers: &self.runtime.resolvers,
            actor: self.runtime.context_actor(request.actor_context, target),
            locals: request.locals.as_ref(),
            now,
        };
        match self.evaluator.evaluate(node.conditions(), &ctx) {
            Ok(holds) => holds,
            Err(error) => {
                warn!(node = %node.name(), %error, "condition evaluation failed; treating as false");
                false
            }
        }
    }

    /// Drop candidates that may not displace the thread already
    /// controlling `target`.
    fn retain_interrupting(&self, target: &TargetKey, group: &mut Vec<Candidate>) {
        let Some(running) = self.runtime.thread_map.current_priority(target) else {
            return;
        };
        let running_node = self
            .runtime
            .thread_map
            .current_handle(target)
            .and_then(|h| self.runtime.threads.get(h))
            .and_then(|t| t.origin());
        group.retain(|c| {
            if running_node == Some(c.node) {
                return false;
            }
            c.priority > running || (c.priority == running && c.interrupt_same)
        });
    }

    /// Highest sorting score wins; ties are drawn by weight.
    fn choose(&mut self, group: Vec<Candidate>) -> Option<Candidate> {
        let best = group.iter().map(|c| c.score).max()?;
        let mut top: Vec<Candidate> = group.into_iter().filter(|c| c.score == best).collect();
        if top.len() == 1 {
            return top.pop();
        }
        let weights: Vec<f32> = top.iter().map(|c| c.weight).collect();
        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.runtime.rng),
            Err(error) => {
                warn!(%error, "invalid selection weights; taking the first candidate");
                0
            }
        };
        Some(top.swap_remove(index))
    }

    fn start_thread(
        &mut self,
        node_ref: NodeRef,
        target: TargetKey,
        tracked: bool,
        actor_context: Option<ActorHandle>,
        locals: Option<&VariableTable>,
    ) -> Option<ThreadHandle> {
        let now = self.runtime.now();
        let node = self.library.node(node_ref)?;
        let body = self.bodies.create(node);
        let (node_id, priority, scope) = (node.id(), node.priority(), node.scope());
        let (is_trigger, is_cutscene) = (node.is_trigger(), node.is_cutscene());
        debug!(node = %node.name(), ?target, %priority, tracked, "starting thread");

        if tracked {
            if let Some(old) = self.runtime.thread_map.current_handle(&target) {
                if let Some(thread) = self.runtime.threads.get_mut(old) {
                    thread.request_cancel();
                    debug!(thread = %old, ?target, "superseded thread cancelled");
                }
            }
        }

        let mut table = self.runtime.tables.acquire();
        if let Some(locals) = locals {
            for (name, value) in locals.iter() {
                table.set(name.clone(), value.clone());
            }
        }
        let handle = self.runtime.threads.acquire();
        if let Some(thread) = self.runtime.threads.get_mut(handle) {
            thread.origin = Some(node_ref);
            thread.node_id = Some(node_id);
            thread.priority = priority;
            thread.target = target.clone();
            thread.tracked = tracked;
            thread.actor_context = actor_context;
            thread.locals = table;
            thread.body = Some(body);
            thread.started_at = now;
        }
        if tracked {
            self.runtime.thread_map.assign(target, handle, priority);
        }
        if let Some(package) = self.library.get_mut(node_ref.package) {
            package.add_reference();
        }
        self.persistence.record_visit(node_id, scope, now, is_trigger);
        if is_cutscene {
            // One cutscene at a time: a newer one supersedes the last.
            if let Some(previous) = self.runtime.cutscene() {
                if let Some(thread) = self.runtime.threads.get_mut(previous) {
                    thread.request_cancel();
                    debug!(thread = %previous, "superseded cutscene cancelled");
                }
            }
            self.runtime.cutscene = Some(handle);
        }
        Some(handle)
    }

    fn finish_thread(&mut self, handle: ThreadHandle) {
        let Some(thread) = self.runtime.threads.get(handle) else {
            return;
        };
        let (origin, target, tracked) = (thread.origin(), thread.target.clone(), thread.tracked);
        if let Some(package) = origin.and_then(|r| self.library.get_mut(r.package)) {
            package.release_reference();
        }
        if tracked {
            self.runtime.thread_map.remove_if(&target, handle);
        }
        if self.runtime.cutscene == Some(handle) {
            self.runtime.cutscene = None;
        }
        if let Some(locals) = self.runtime.threads.release(handle) {
            self.runtime.tables.release(locals);
        }
        trace!(thread = %handle, "thread released");
    }
}

/// Which target a node would run for, given the trigger's explicit
/// target. `None` means the node does not match.
fn resolve_target(node: &Node, explicit: Option<&ActorId>) -> Option<TargetKey> {
    match (explicit, node.target()) {
        (Some(wanted), Target::Actor(id)) => (id == wanted).then(|| Some(wanted.clone())),
        (Some(wanted), Target::Any) => Some(Some(wanted.clone())),
        (None, Target::Actor(id)) => Some(Some(id.clone())),
        (None, Target::Any) => Some(None),
    }
}

impl DispatcherBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load every `.ron` package in `path` at build time.
    pub fn packages_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.packages_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Provide a package directly (for testing without files).
    pub fn with_package(mut self, package: PackageDef) -> Self {
        self.packages.push(package);
        self
    }

    pub fn evaluator(mut self, evaluator: impl ConditionEvaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    pub fn body_factory(mut self, factory: impl BodyFactory + 'static) -> Self {
        self.bodies = Some(Box::new(factory));
        self
    }

    pub fn resolver(mut self, name: &str, resolver: impl VariableResolver + 'static) -> Self {
        self.resolvers.push((name.to_string(), Box::new(resolver)));
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let mut config = self.config.unwrap_or_default();
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;

        let mut library = PackageLibrary::new();
        for package in self.packages {
            loader::compile(&mut library, package)?;
        }
        if let Some(dir) = &self.packages_dir {
            if dir.exists() {
                loader::load_dir(&mut library, dir)?;
            } else {
                warn!(dir = %dir.display(), "packages directory not found");
            }
        }

        let mut runtime = RuntimeState::new(&config);
        for (name, resolver) in self.resolvers {
            runtime.register_resolver(name, resolver);
        }

        debug!(packages = library.len(), seed = config.seed, "dispatcher built");
        Ok(Dispatcher {
            library,
            persistence: PersistenceMap::from_config(&config),
            runtime,
            evaluator: self
                .evaluator
                .unwrap_or_else(|| Box::new(StandardEvaluator)),
            bodies: self
                .bodies
                .unwrap_or_else(|| Box::new(ScriptBodyFactory)),
            config,
            pending: Vec::new(),
        })
    }
}
