//!
//! The DEVS model layer: atomic models, compound models, and the common
//! surface both expose to the simulation driver.
//!

use crate::runtime::{Calendar, CancelHandle, SelectFn, SimError, SimResult};
use crate::time::SimTime;
use crate::util::Dynamic;
use std::any::type_name;
use std::cell::RefCell;
use std::rc::Rc;

mod atomic;
pub use atomic::Atomic;

mod compound;
pub use compound::Compound;

/// Listener for emitted outputs: `(model_name, time, value)`.
pub type OutputListener = Rc<dyn Fn(&str, SimTime, &Dynamic)>;
/// Listener for state transitions: `(model_name, time, prev, next)`.
pub type TransitionListener = Rc<dyn Fn(&str, SimTime, &str, &str)>;
/// Listener for simulation start/end: `(model_name, time, state)`.
pub type LifecycleListener = Rc<dyn Fn(&str, SimTime, &str)>;

///
/// A function adapting an output value to a target's expected input type.
///
/// Transformers run where a value crosses an influencer edge and produce a
/// fresh carrier; a failed cast inside surfaces as
/// [`SimError::TypeMismatch`].
///
pub type Transformer = dyn Fn(Dynamic) -> SimResult<Dynamic>;

///
/// Builds a typed [`Transformer`] from a plain function.
///
/// The wrapped function receives the downcast input and its result is
/// wrapped back into a [`Dynamic`]; a value of the wrong type yields a
/// [`SimError::TypeMismatch`] whose endpoints the wiring layer fills in.
///
pub fn transform<X, Y, F>(f: F) -> Rc<Transformer>
where
    X: 'static,
    Y: Clone + 'static,
    F: Fn(&X) -> Y + 'static,
{
    Rc::new(move |value: Dynamic| match value.try_cast_ref::<X>() {
        Some(x) => Ok(Dynamic::wrap(f(x))),
        None => Err(SimError::type_mismatch(type_name::<X>(), value.ty())),
    })
}

pub(crate) fn apply_transformer(
    transformer: Option<&Rc<Transformer>>,
    value: Dynamic,
) -> SimResult<Dynamic> {
    match transformer {
        Some(tf) => tf(value),
        None => Ok(value),
    }
}

///
/// The common surface of atomic and compound models.
///
/// The driver and the wiring layer only ever see models through this
/// trait; whether a component is a single state machine or a whole nested
/// compound is invisible to them.
///
pub trait Model {
    /// Returns the model's name.
    fn name(&self) -> &str;

    /// Returns the pretty-printed current state. Only atomic models carry
    /// state; compounds yield `None`.
    fn state(&self) -> Option<String>;

    /// Returns the direct components. Only meaningful for compounds;
    /// atomics yield an empty list.
    fn components(&self) -> Vec<Rc<dyn Model>>;

    /// Returns this model's tie-break selector for concurrent events.
    fn select(&self) -> SelectFn;

    ///
    /// Schedules an input arriving from outside the model tree.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::PastSchedule`] when `time` lies in the past.
    ///
    fn schedule_external_input(
        &self,
        time: SimTime,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle>;

    /// Registers a listener for this model's outputs.
    fn add_output_listener(&self, listener: OutputListener);

    /// Registers a listener for state transitions. On a compound the
    /// registration is forwarded to every component.
    fn add_transition_listener(&self, listener: TransitionListener);

    /// Registers a listener invoked when the simulation starts.
    fn add_sim_start_listener(&self, listener: LifecycleListener);

    /// Registers a listener invoked when the simulation ends.
    fn add_sim_end_listener(&self, listener: LifecycleListener);

    ///
    /// Accepts a value routed from a sibling's output.
    ///
    /// The delivery re-enters the calendar as a zero-delay event owned by
    /// this model, so concurrent deliveries are tie-broken alongside
    /// everything else firing at the current instant.
    ///
    /// # Errors
    ///
    /// [`SimError::SelfLoop`] when `source` names this model itself, and
    /// any transformer failure.
    ///
    fn receive_input_from(
        &self,
        source: &str,
        value: Dynamic,
        transformer: Option<Rc<Transformer>>,
    ) -> SimResult<()>;

    ///
    /// Delivers a value synchronously, without touching the calendar.
    ///
    /// Used for compound-boundary inputs, where the event carrying the
    /// value is already firing and ordering is fixed by registration
    /// order.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Model::receive_input_from`].
    ///
    fn direct_input(
        &self,
        source: &str,
        value: Dynamic,
        transformer: Option<Rc<Transformer>>,
    ) -> SimResult<()>;

    /// Fires sim-start listeners; compounds recurse into their components.
    fn notify_sim_start(&self, time: SimTime);

    /// Fires sim-end listeners; compounds recurse into their components.
    fn notify_sim_end(&self, time: SimTime);
}

///
/// A blueprint that a simulator instantiates into a live model.
///
/// Implemented by [`Atomic`] and [`Compound`]; building consumes the
/// blueprint, wires the model into the calendar, and schedules the first
/// internal transitions.
///
pub trait ModelBuilder {
    ///
    /// Builds the model under the given name.
    ///
    /// # Errors
    ///
    /// Construction fails on invalid compound wiring or when an initial
    /// internal transition cannot be scheduled.
    ///
    fn build(self: Box<Self>, name: &str, ctx: &BuildCtx) -> SimResult<Rc<dyn Model>>;
}

/// Construction context handed to [`ModelBuilder::build`].
pub struct BuildCtx {
    pub(crate) calendar: Rc<Calendar>,
    pub(crate) time: SimTime,
}

impl BuildCtx {
    pub(crate) fn new(calendar: Rc<Calendar>, time: SimTime) -> Self {
        Self { calendar, time }
    }
}

///
/// An append-only listener list.
///
/// Callbacks are invoked on a snapshot, so a listener registered during a
/// delivery observes only subsequent events.
///
pub(crate) struct Listeners<T: ?Sized> {
    items: RefCell<Vec<Rc<T>>>,
}

impl<T: ?Sized> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, listener: Rc<T>) {
        self.items.borrow_mut().push(listener);
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<T>> {
        self.items.borrow().clone()
    }
}
