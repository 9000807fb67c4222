use crate::model::{BuildCtx, ModelBuilder};
use crate::printer::{Printer, SilentPrinter};
use crate::runtime::{Calendar, SimResult, Simulator, DEFAULT_EPSILON};
use crate::time::SimTime;
use std::fmt::Debug;
use std::rc::Rc;

///
/// A builder for a [`Simulator`] instance.
///
/// # Examples
///
/// ```
/// use devs::prelude::*;
///
/// # fn clock() -> Atomic<(), i64, i64> {
/// #     Atomic::new(0, |s, _, _: &()| *s, |s| s + 1, |s| *s, |_| SimTime::new(1.0))
/// # }
/// let sim = Builder::new()
///     .start_time(0.0)
///     .end_time(10.0)
///     .epsilon(1e-6)
///     .build("clock", clock())
///     .unwrap();
/// ```
///
#[must_use]
pub struct Builder {
    start_time: SimTime,
    end_time: SimTime,
    epsilon: f64,
    printer: Rc<dyn Printer>,
}

impl Builder {
    /// Creates a builder with time range `[0, ∞)`, the default epsilon
    /// and the silent printer.
    pub fn new() -> Self {
        Self {
            start_time: SimTime::ZERO,
            end_time: SimTime::INFINITY,
            epsilon: DEFAULT_EPSILON,
            printer: Rc::new(SilentPrinter),
        }
    }

    /// Sets the time the simulation starts at.
    pub fn start_time(mut self, time: impl Into<SimTime>) -> Self {
        self.start_time = time.into();
        self
    }

    /// Sets the time the simulation ends at.
    pub fn end_time(mut self, time: impl Into<SimTime>) -> Self {
        self.end_time = time.into();
        self
    }

    /// Sets the tolerance under which event times count as concurrent.
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the trace printer.
    pub fn printer(mut self, printer: impl Printer + 'static) -> Self {
        self.printer = Rc::new(printer);
        self
    }

    ///
    /// Builds the root model and assembles the [`Simulator`].
    ///
    /// The printer is subscribed to the calendar's observers and to every
    /// model's lifecycle and transition listeners before the first event
    /// is scheduled by user code.
    ///
    /// # Errors
    ///
    /// Propagates construction failures of the root model.
    ///
    pub fn build(
        self,
        root_name: &str,
        root: impl ModelBuilder + 'static,
    ) -> SimResult<Simulator> {
        let calendar = Rc::new(Calendar::new(self.start_time, self.end_time, self.epsilon));

        let printer = Rc::clone(&self.printer);
        calendar.on_time_advanced(Rc::new(move |prev, next| {
            printer.on_time_advanced(prev, next);
        }));
        let printer = Rc::clone(&self.printer);
        calendar.on_event_scheduled(Rc::new(move |now, event| {
            printer.on_event_scheduled(now, event);
        }));
        let printer = Rc::clone(&self.printer);
        calendar.on_event_about_to_fire(Rc::new(move |now, event| {
            printer.on_event_fired(now, event);
        }));

        let ctx = BuildCtx::new(Rc::clone(&calendar), self.start_time);
        let root = Box::new(root).build(root_name, &ctx)?;

        let printer = Rc::clone(&self.printer);
        root.add_sim_start_listener(Rc::new(move |name, time, state| {
            printer.on_sim_start(name, time, state);
        }));
        let printer = Rc::clone(&self.printer);
        root.add_sim_end_listener(Rc::new(move |name, time, state| {
            printer.on_sim_end(name, time, state);
        }));
        let printer = Rc::clone(&self.printer);
        root.add_transition_listener(Rc::new(move |name, time, prev, next| {
            printer.on_state_transition(name, time, prev, next);
        }));

        Ok(Simulator {
            calendar,
            root,
            printer: self.printer,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("epsilon", &self.epsilon)
            .finish_non_exhaustive()
    }
}
