/// Narrative threads: pooled, cooperatively scheduled execution contexts
/// that run one node's body across ticks.
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use tracing::{info, warn};

use crate::core::actor_map::ActorHandle;
use crate::core::variables::Variables;
use crate::schema::actor::{Actor, ActorId};
use crate::schema::condition::{ConditionGroup, VarRef, VarScope};
use crate::schema::node::{Node, NodeId, Priority};
use crate::schema::package::NodeRef;
use crate::schema::script::Action;
use crate::schema::value::{Value, VariableTable};

/// Generational handle to a pooled thread. A handle goes stale as soon as
/// its thread finishes, even if the slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Why a body yielded.
#[derive(Debug, Clone, PartialEq)]
pub enum Suspend {
    NextTick,
    Seconds(f64),
    /// Resume on the first tick the group evaluates true.
    Until(ConditionGroup),
}

/// Result of advancing a body by one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Step again within the same tick.
    Continue,
    Suspend(Suspend),
    Complete,
}

/// Where a thread is parked between ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ThreadState {
    #[default]
    Ready,
    Sleeping {
        wake_at: f64,
    },
    Waiting(ConditionGroup),
}

/// A trigger raised by a running body. Dispatched after the current
/// tick's thread pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedTrigger {
    pub trigger: String,
    pub target: Option<ActorId>,
}

/// What a body sees while it runs.
pub struct StepContext<'a> {
    pub node: &'a Node,
    pub thread: ThreadHandle,
    /// The actor this thread controls, if it targets one.
    pub target: Option<&'a ActorId>,
    pub variables: &'a mut Variables,
    /// The trigger's actor context, falling back to the target actor.
    pub actor: Option<&'a mut Actor>,
    pub locals: &'a mut VariableTable,
    pub rng: &'a mut StdRng,
    pub now: f64,
    pub(crate) emitted: &'a mut Vec<EmittedTrigger>,
}

impl StepContext<'_> {
    /// Queue a trigger for dispatch once this tick's thread pass ends.
    pub fn emit(&mut self, trigger: impl Into<String>, target: Option<ActorId>) {
        self.emitted.push(EmittedTrigger {
            trigger: trigger.into(),
            target,
        });
    }

    /// Write a variable visible to this thread. Custom variables are
    /// read-only, and actor variables need an actor in context.
    pub fn set(&mut self, var: &VarRef, value: Value) -> bool {
        match var.scope {
            VarScope::Global | VarScope::Chapter | VarScope::Session => {
                self.variables.set(var.scope, var.name.clone(), value)
            }
            VarScope::Local => {
                self.locals.set(var.name.clone(), value);
                true
            }
            VarScope::Actor => match self.actor.as_deref_mut() {
                Some(actor) => {
                    actor.variables.set(var.name.clone(), value);
                    true
                }
                None => false,
            },
            VarScope::Custom => false,
        }
    }

    /// `base` plus a uniform offset in `[-variance, variance]`, never
    /// negative.
    pub fn vary(&mut self, base: f64, variance: f64) -> f64 {
        random_variance(self.rng, base, variance)
    }
}

pub fn random_variance(rng: &mut StdRng, base: f64, variance: f64) -> f64 {
    if variance > 0.0 && variance.is_finite() {
        (base + rng.gen_range(-variance..=variance)).max(0.0)
    } else {
        base.max(0.0)
    }
}

/// A node's executable body, advanced one step at a time by the scheduler.
pub trait NodeBody {
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Step;

    /// Runs once when a cancelled thread is next polled, before it is
    /// finished.
    fn on_cancel(&mut self, _ctx: &mut StepContext<'_>) {}
}

/// Creates a body for each thread a node starts.
///
/// Any `Fn(&Node) -> Box<dyn NodeBody>` closure is a factory.
pub trait BodyFactory {
    fn create(&self, node: &Node) -> Box<dyn NodeBody>;
}

impl<F> BodyFactory for F
where
    F: Fn(&Node) -> Box<dyn NodeBody>,
{
    fn create(&self, node: &Node) -> Box<dyn NodeBody> {
        self(node)
    }
}

/// Runs the node's authored [`Action`] list.
#[derive(Debug, Clone, Default)]
pub struct ScriptBody {
    pc: usize,
}

impl NodeBody for ScriptBody {
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Step {
        let node = ctx.node;
        let Some(action) = node.script().get(self.pc) else {
            return Step::Complete;
        };
        self.pc += 1;
        match action {
            Action::Wait { seconds, variance } => {
                Step::Suspend(Suspend::Seconds(ctx.vary(*seconds, *variance)))
            }
            Action::WaitUntil(group) => Step::Suspend(Suspend::Until(group.clone())),
            Action::Set { var, value } => {
                if !ctx.set(var, value.clone()) {
                    warn!(node = %node.name(), variable = %var.name, scope = ?var.scope, "variable not writable here");
                }
                Step::Continue
            }
            Action::Emit { trigger, target } => {
                ctx.emit(trigger.clone(), target.as_deref().map(ActorId::from));
                Step::Continue
            }
            Action::Log(message) => {
                info!(node = %node.name(), target = ?ctx.target, "{}", message);
                Step::Continue
            }
        }
    }
}

/// The default factory: every node runs its script.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptBodyFactory;

impl BodyFactory for ScriptBodyFactory {
    fn create(&self, _node: &Node) -> Box<dyn NodeBody> {
        Box::new(ScriptBody::default())
    }
}

/// One running instance of a node.
#[derive(Default)]
pub struct NarrativeThread {
    pub(crate) origin: Option<NodeRef>,
    pub(crate) node_id: Option<NodeId>,
    pub(crate) priority: Priority,
    pub(crate) target: Option<ActorId>,
    pub(crate) tracked: bool,
    pub(crate) actor_context: Option<ActorHandle>,
    pub(crate) locals: VariableTable,
    pub(crate) body: Option<Box<dyn NodeBody>>,
    pub(crate) state: ThreadState,
    pub(crate) cancel_requested: bool,
    pub(crate) started_at: f64,
}

impl fmt::Debug for NarrativeThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeThread")
            .field("origin", &self.origin)
            .field("priority", &self.priority)
            .field("target", &self.target)
            .field("tracked", &self.tracked)
            .field("state", &self.state)
            .field("cancel_requested", &self.cancel_requested)
            .finish_non_exhaustive()
    }
}

impl NarrativeThread {
    pub fn origin(&self) -> Option<NodeRef> {
        self.origin
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The actor this thread controls; `None` for any-target threads.
    pub fn target(&self) -> Option<&ActorId> {
        self.target.as_ref()
    }

    /// Whether this thread holds a Thread Map entry. Function calls do not.
    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    pub fn actor_context(&self) -> Option<ActorHandle> {
        self.actor_context
    }

    pub fn locals(&self) -> &VariableTable {
        &self.locals
    }

    pub fn state(&self) -> &ThreadState {
        &self.state
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Ask the thread to stop. Its body observes this the next time the
    /// thread is polled.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    /// Return the thread to its pristine state, handing back the locals
    /// table for reuse.
    fn reset(&mut self) -> VariableTable {
        let locals = std::mem::take(&mut self.locals);
        *self = NarrativeThread::default();
        locals
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    live: bool,
    thread: NarrativeThread,
}

/// Reusable thread objects. Finished threads go back on the free list;
/// the pool grows when it runs dry.
#[derive(Debug, Default)]
pub struct ThreadPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ThreadPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
            free: (0..capacity as u32).rev().collect(),
            live: 0,
        }
    }

    pub fn acquire(&mut self) -> ThreadHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        self.live += 1;
        ThreadHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Return a thread to the pool. Yields its locals table, or `None` if
    /// the handle was stale.
    pub fn release(&mut self, handle: ThreadHandle) -> Option<VariableTable> {
        let slot = self.slot_mut(handle)?;
        let locals = slot.thread.reset();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(locals)
    }

    pub fn get(&self, handle: ThreadHandle) -> Option<&NarrativeThread> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.live && s.generation == handle.generation)
            .map(|s| &s.thread)
    }

    pub fn get_mut(&mut self, handle: ThreadHandle) -> Option<&mut NarrativeThread> {
        self.slot_mut(handle).map(|s| &mut s.thread)
    }

    pub fn is_live(&self, handle: ThreadHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Handles of every live thread, in slot order.
    pub fn handles(&self) -> Vec<ThreadHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.live)
            .map(|(i, s)| ThreadHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ThreadHandle, &NarrativeThread)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.live)
            .map(|(i, s)| {
                (
                    ThreadHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    &s.thread,
                )
            })
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Slots ever allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, handle: ThreadHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.live && s.generation == handle.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::package::PackageLibrary;
    use rand::SeedableRng;

    #[test]
    fn pool_reuses_slots_and_invalidates_handles() {
        let mut pool = ThreadPool::with_capacity(1);
        let a = pool.acquire();
        pool.get_mut(a).unwrap().locals.set("x", Value::Int(1));
        let b = pool.acquire();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.live_count(), 2);

        let locals = pool.release(a).unwrap();
        assert_eq!(locals.get("x"), Some(&Value::Int(1)));
        assert!(pool.get(a).is_none());
        assert!(pool.release(a).is_none());

        let c = pool.acquire();
        assert_ne!(a, c);
        assert!(pool.get(c).unwrap().locals().is_empty());
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.handles(), vec![c, b]);
    }

    #[test]
    fn variance_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let v = random_variance(&mut rng, 2.0, 0.5);
            assert!((1.5..=2.5).contains(&v));
        }
        assert_eq!(random_variance(&mut rng, 2.0, 0.0), 2.0);
        assert!(random_variance(&mut rng, 0.1, 5.0) >= 0.0);
    }

    #[test]
    fn script_body_runs_actions_in_order() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        let node = package.create_node("greet").unwrap();
        node.set_trigger("Greet");
        node.set_script(vec![
            Action::Set {
                var: VarRef::local("greeted"),
                value: Value::Bool(true),
            },
            Action::Emit {
                trigger: "Wave".into(),
                target: Some("Penguin2".into()),
            },
            Action::Wait {
                seconds: 1.0,
                variance: 0.0,
            },
        ]);
        let node = &package.nodes()[0];

        let mut variables = Variables::new();
        let mut locals = VariableTable::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut emitted = Vec::new();
        let mut pool = ThreadPool::default();
        let mut ctx = StepContext {
            node,
            thread: pool.acquire(),
            target: None,
            variables: &mut variables,
            actor: None,
            locals: &mut locals,
            rng: &mut rng,
            now: 0.0,
            emitted: &mut emitted,
        };

        let mut body = ScriptBody::default();
        assert_eq!(body.step(&mut ctx), Step::Continue);
        assert_eq!(body.step(&mut ctx), Step::Continue);
        assert_eq!(body.step(&mut ctx), Step::Suspend(Suspend::Seconds(1.0)));
        assert_eq!(body.step(&mut ctx), Step::Complete);
        assert_eq!(locals.get("greeted"), Some(&Value::Bool(true)));
        assert_eq!(
            emitted,
            vec![EmittedTrigger {
                trigger: "Wave".into(),
                target: Some(ActorId::from("Penguin2")),
            }]
        );
    }

    #[test]
    fn actor_and_custom_writes() {
        let mut library = PackageLibrary::new();
        let package = library.create("p").unwrap();
        package.create_node("n").unwrap();
        let node = &package.nodes()[0];
        let mut variables = Variables::new();
        let mut locals = VariableTable::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut emitted = Vec::new();
        let mut actor = Actor::named("Penguin1");
        let mut pool = ThreadPool::default();
        let mut ctx = StepContext {
            node,
            thread: pool.acquire(),
            target: None,
            variables: &mut variables,
            actor: Some(&mut actor),
            locals: &mut locals,
            rng: &mut rng,
            now: 0.0,
            emitted: &mut emitted,
        };
        assert!(ctx.set(&VarRef::actor("fed"), Value::Bool(true)));
        assert!(!ctx.set(&VarRef::new(VarScope::Custom, "clock.hour"), Value::Int(1)));
        assert_eq!(actor.variables.get("fed"), Some(&Value::Bool(true)));
    }
}
