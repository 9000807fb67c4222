use crate::model::{
    apply_transformer, BuildCtx, Listeners, Model, ModelBuilder, Transformer,
};
use crate::runtime::{
    fifo_select, Calendar, CancelHandle, Event, SelectFn, SimError, SimResult,
};
use crate::time::SimTime;
use crate::util::Dynamic;
use log::trace;
use std::any::{type_name, Any};
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

/// The source label attached to inputs arriving from outside the model tree.
const EXTERNAL_SOURCE: &str = "external";

///
/// An atomic DEVS model: the tuple ⟨S₀, δ_ext, δ_int, λ, ta⟩.
///
/// - `X` is the input type delivered to the external transition,
/// - `Y` the output type produced by the output function,
/// - `S` the state space.
///
/// The blueprint is inert; building it (usually as a component of a
/// [`Compound`](crate::model::Compound), or directly as the root of a
/// simulation) creates the running state machine and schedules its first
/// internal transition at `start + ta(S₀)`.
///
pub struct Atomic<X, Y, S> {
    initial: S,
    delta_ext: Box<dyn Fn(&S, SimTime, &X) -> S>,
    delta_int: Box<dyn Fn(&S) -> S>,
    output: Box<dyn Fn(&S) -> Y>,
    ta: Box<dyn Fn(&S) -> SimTime>,
}

impl<X, Y, S> Atomic<X, Y, S>
where
    X: 'static,
    Y: Clone + 'static,
    S: Debug + 'static,
{
    ///
    /// Creates an atomic model blueprint.
    ///
    /// `ta` must yield a non-negative time advance; [`SimTime::INFINITY`]
    /// marks a passive state with no autonomous transition.
    ///
    pub fn new(
        initial: S,
        delta_ext: impl Fn(&S, SimTime, &X) -> S + 'static,
        delta_int: impl Fn(&S) -> S + 'static,
        output: impl Fn(&S) -> Y + 'static,
        ta: impl Fn(&S) -> SimTime + 'static,
    ) -> Self {
        Self {
            initial,
            delta_ext: Box::new(delta_ext),
            delta_int: Box::new(delta_int),
            output: Box::new(output),
            ta: Box::new(ta),
        }
    }
}

impl<X, Y, S> ModelBuilder for Atomic<X, Y, S>
where
    X: 'static,
    Y: Clone + 'static,
    S: Debug + 'static,
{
    fn build(self: Box<Self>, name: &str, ctx: &BuildCtx) -> SimResult<Rc<dyn Model>> {
        let Atomic {
            initial,
            delta_ext,
            delta_int,
            output,
            ta,
        } = *self;

        let behavior = Behavior {
            fmt: Box::new(|s| format!("{:?}", state_of::<S>(s))),
            delta_int: Box::new(move |s| Box::new(delta_int(state_of::<S>(s))) as Box<dyn Any>),
            delta_ext: Box::new(move |s, elapsed, value| match value.try_cast_ref::<X>() {
                Some(x) => Ok(Box::new(delta_ext(state_of::<S>(s), elapsed, x)) as Box<dyn Any>),
                None => Err(SimError::type_mismatch(type_name::<X>(), value.ty())),
            }),
            output: Box::new(move |s| Dynamic::wrap(output(state_of::<S>(s)))),
            ta: Box::new(move |s| ta(state_of::<S>(s))),
        };

        let sim = AtomicSim::create(
            name.to_string(),
            Rc::clone(&ctx.calendar),
            Box::new(initial),
            behavior,
            ctx.time,
        )?;
        Ok(sim)
    }
}

fn state_of<S: 'static>(state: &dyn Any) -> &S {
    state
        .downcast_ref::<S>()
        .expect("unreachable: atomic state always carries its construction type")
}

/// Type-erased behavior of an atomic model.
struct Behavior {
    fmt: Box<dyn Fn(&dyn Any) -> String>,
    delta_int: Box<dyn Fn(&dyn Any) -> Box<dyn Any>>,
    delta_ext: Box<dyn Fn(&dyn Any, SimTime, &Dynamic) -> SimResult<Box<dyn Any>>>,
    output: Box<dyn Fn(&dyn Any) -> Dynamic>,
    ta: Box<dyn Fn(&dyn Any) -> SimTime>,
}

///
/// The running state machine behind an atomic model.
///
/// Keeps the current state, the time of the last transition (for
/// elapsed-time bookkeeping), and the cancellation handle of the one
/// pending internal transition.
///
pub(crate) struct AtomicSim {
    me: Weak<AtomicSim>,
    name: String,
    calendar: Rc<Calendar>,
    state: RefCell<Box<dyn Any>>,
    last_transition: Cell<SimTime>,
    pending_internal: RefCell<Option<CancelHandle>>,
    behavior: Behavior,
    outputs: Listeners<dyn Fn(&str, SimTime, &Dynamic)>,
    transitions: Listeners<dyn Fn(&str, SimTime, &str, &str)>,
    started: Listeners<dyn Fn(&str, SimTime, &str)>,
    ended: Listeners<dyn Fn(&str, SimTime, &str)>,
}

impl AtomicSim {
    fn create(
        name: String,
        calendar: Rc<Calendar>,
        initial: Box<dyn Any>,
        behavior: Behavior,
        now: SimTime,
    ) -> SimResult<Rc<Self>> {
        let sim = Rc::new_cyclic(|me| AtomicSim {
            me: me.clone(),
            name,
            calendar,
            state: RefCell::new(initial),
            last_transition: Cell::new(now),
            pending_internal: RefCell::new(None),
            behavior,
            outputs: Listeners::new(),
            transitions: Listeners::new(),
            started: Listeners::new(),
            ended: Listeners::new(),
        });
        sim.schedule_internal(now)?;
        Ok(sim)
    }

    fn fmt_state(&self) -> String {
        (self.behavior.fmt)(self.state.borrow().as_ref())
    }

    ///
    /// Schedules the next internal transition at `now + ta(S)`, cancelling
    /// any previously pending one first so that at most one internal
    /// transition per atomic is ever live in the calendar.
    ///
    fn schedule_internal(&self, now: SimTime) -> SimResult<()> {
        if let Some(handle) = self.pending_internal.borrow_mut().take() {
            handle.cancel();
        }

        let advance = (self.behavior.ta)(self.state.borrow().as_ref());
        debug_assert!(
            advance >= SimTime::ZERO,
            "time advance must be non-negative"
        );
        let at = now + advance;

        let me = self.me.clone();
        let event = Event::new(at, &self.name, "internal transition", move || {
            if let Some(sim) = me.upgrade() {
                if let Err(err) = sim.internal_transition() {
                    sim.calendar.report_fault(err);
                }
            }
        });

        let handle = self.calendar.schedule(event)?;
        *self.pending_internal.borrow_mut() = Some(handle);
        Ok(())
    }

    ///
    /// The action of the scheduled internal-transition event: produce the
    /// output of the current state, step δ_int, then reschedule.
    ///
    fn internal_transition(&self) -> SimResult<()> {
        let now = self.calendar.time();

        if self.pending_internal.borrow_mut().take().is_none() {
            return Err(SimError::InvariantViolation {
                reason: format!(
                    "'{}' fired an internal transition without a pending schedule",
                    self.name
                ),
            });
        }

        let (output, prev, next_state) = {
            let state = self.state.borrow();
            let output = (self.behavior.output)(state.as_ref());
            let prev = (self.behavior.fmt)(state.as_ref());
            let next_state = (self.behavior.delta_int)(state.as_ref());
            (output, prev, next_state)
        };

        *self.state.borrow_mut() = next_state;
        self.last_transition.set(now);
        self.notify_transition(now, &prev);

        self.emit_output(now, &output);
        self.schedule_internal(now)
    }

    ///
    /// Delivery of one external input: retract the pending internal
    /// transition, step δ_ext with the elapsed time, then reschedule.
    ///
    fn external_transition(&self, source: &str, value: &Dynamic) -> SimResult<()> {
        let now = self.calendar.time();

        if let Some(handle) = self.pending_internal.borrow_mut().take() {
            handle.cancel();
        }

        let elapsed = now - self.last_transition.get();
        let (prev, next_state) = {
            let state = self.state.borrow();
            let prev = (self.behavior.fmt)(state.as_ref());
            let next_state = (self.behavior.delta_ext)(state.as_ref(), elapsed, value)
                .map_err(|e| e.with_endpoints(source, &self.name))?;
            (prev, next_state)
        };

        *self.state.borrow_mut() = next_state;
        self.last_transition.set(now);
        self.notify_transition(now, &prev);

        self.schedule_internal(now)
    }

    fn emit_output(&self, now: SimTime, value: &Dynamic) {
        trace!("{} emits {:?} at T={}", self.name, value, now);
        for listener in self.outputs.snapshot() {
            listener(&self.name, now, value);
        }
    }

    /// Notifies transition listeners, suppressing no-op transitions whose
    /// pretty-printed states are equal.
    fn notify_transition(&self, now: SimTime, prev: &str) {
        let next = self.fmt_state();
        if prev == next {
            return;
        }
        for listener in self.transitions.snapshot() {
            listener(&self.name, now, prev, &next);
        }
    }

    /// Schedules a delivery event for this input at the current instant.
    fn schedule_delivery(
        &self,
        time: SimTime,
        source: &str,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle> {
        let me = self.me.clone();
        let source = source.to_string();
        let event = Event::new(time, &self.name, description, move || {
            if let Some(sim) = me.upgrade() {
                if let Err(err) = sim.external_transition(&source, &value) {
                    sim.calendar.report_fault(err);
                }
            }
        });
        self.calendar.schedule(event)
    }
}

impl Model for AtomicSim {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Option<String> {
        Some(self.fmt_state())
    }

    fn components(&self) -> Vec<Rc<dyn Model>> {
        Vec::new()
    }

    fn select(&self) -> SelectFn {
        fifo_select()
    }

    fn schedule_external_input(
        &self,
        time: SimTime,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle> {
        self.schedule_delivery(time, EXTERNAL_SOURCE, value, description)
    }

    fn add_output_listener(&self, listener: crate::model::OutputListener) {
        self.outputs.push(listener);
    }

    fn add_transition_listener(&self, listener: crate::model::TransitionListener) {
        self.transitions.push(listener);
    }

    fn add_sim_start_listener(&self, listener: crate::model::LifecycleListener) {
        self.started.push(listener);
    }

    fn add_sim_end_listener(&self, listener: crate::model::LifecycleListener) {
        self.ended.push(listener);
    }

    fn receive_input_from(
        &self,
        source: &str,
        value: Dynamic,
        transformer: Option<Rc<Transformer>>,
    ) -> SimResult<()> {
        if source == self.name {
            return Err(SimError::SelfLoop {
                model: self.name.clone(),
            });
        }
        let value = apply_transformer(transformer.as_ref(), value)
            .map_err(|e| e.with_endpoints(source, &self.name))?;

        let now = self.calendar.time();
        self.schedule_delivery(now, source, value, &format!("input from {source}"))?;
        Ok(())
    }

    fn direct_input(
        &self,
        source: &str,
        value: Dynamic,
        transformer: Option<Rc<Transformer>>,
    ) -> SimResult<()> {
        if source == self.name {
            return Err(SimError::SelfLoop {
                model: self.name.clone(),
            });
        }
        let value = apply_transformer(transformer.as_ref(), value)
            .map_err(|e| e.with_endpoints(source, &self.name))?;
        self.external_transition(source, &value)
    }

    fn notify_sim_start(&self, time: SimTime) {
        let state = self.fmt_state();
        for listener in self.started.snapshot() {
            listener(&self.name, time, &state);
        }
    }

    fn notify_sim_end(&self, time: SimTime) {
        let state = self.fmt_state();
        for listener in self.ended.snapshot() {
            listener(&self.name, time, &state);
        }
    }
}
