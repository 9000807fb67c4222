//!
//! Central primitives for running a discrete event simulation.
//!

use crate::model::Model;
use crate::printer::Printer;
use crate::time::SimTime;
use crate::util::Dynamic;
use std::fmt::{Debug, Display};
use std::rc::Rc;
use std::time::{Duration, Instant};

mod calendar;
pub use self::calendar::*;

mod event;
pub use self::event::*;

mod error;
pub use self::error::*;

mod builder;
pub use self::builder::*;

///
/// The top-level driver of a simulation.
///
/// Owns the calendar and the root model, and runs the main loop: advance
/// logical time to the next concurrent group, fire it, and report each
/// step to the configured printer until no live event remains before the
/// end time.
///
/// # Examples
///
/// ```
/// use devs::prelude::*;
///
/// let counter = Atomic::new(
///     0_i64,
///     |s: &i64, _elapsed: SimTime, x: &i64| s + x,
///     |s: &i64| s + 1,
///     |s: &i64| *s,
///     |_: &i64| SimTime::new(1.0),
/// );
///
/// let sim = Simulator::new("counter", counter, 0.0, 3.0).unwrap();
/// let summary = sim.run().unwrap();
/// assert_eq!(summary.time, SimTime::new(3.0));
/// ```
///
pub struct Simulator {
    pub(crate) calendar: Rc<Calendar>,
    pub(crate) root: Rc<dyn Model>,
    pub(crate) printer: Rc<dyn Printer>,
}

///
/// What a finished run amounted to.
///
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The final logical time; equals the configured end time unless the
    /// run was unbounded.
    pub time: SimTime,
    /// The number of concurrent groups processed.
    pub steps: usize,
    /// The number of events fired.
    pub events_fired: usize,
    /// The number of events scheduled over the whole run.
    pub events_scheduled: usize,
    /// The wall-clock duration of the run.
    pub duration: Duration,
}

impl Simulator {
    ///
    /// Creates a simulator over `[start_time, end_time]` with the default
    /// epsilon and the silent printer. Use [`Builder`] for anything
    /// fancier.
    ///
    /// # Errors
    ///
    /// Propagates construction failures of the root model.
    ///
    pub fn new(
        root_name: &str,
        root: impl crate::model::ModelBuilder + 'static,
        start_time: f64,
        end_time: f64,
    ) -> SimResult<Self> {
        Builder::new()
            .start_time(start_time)
            .end_time(end_time)
            .build(root_name, root)
    }

    /// Returns a fresh [`Builder`].
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Returns the current logical time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.calendar.time()
    }

    /// Returns the root model.
    #[must_use]
    pub fn root(&self) -> Rc<dyn Model> {
        Rc::clone(&self.root)
    }

    ///
    /// Schedules an input arriving from outside the model tree, delivered
    /// to the root model at `time`.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::PastSchedule`] when `time` lies in the past.
    ///
    pub fn schedule_external_input(
        &self,
        time: impl Into<SimTime>,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle> {
        self.root
            .schedule_external_input(time.into(), value, description)
    }

    /// Registers a listener for the root model's outputs.
    pub fn add_output_listener(&self, listener: crate::model::OutputListener) {
        self.root.add_output_listener(listener);
    }

    ///
    /// Runs the simulation to completion.
    ///
    /// Start listeners fire first (each atomic reporting its initial
    /// state), then the main loop advances and fires until the calendar
    /// is exhausted or fenced by the end time, then end listeners fire.
    ///
    /// # Errors
    ///
    /// Terminal on the first error raised anywhere in the kernel; see
    /// [`SimError`] for the taxonomy.
    ///
    pub fn run(self) -> SimResult<RunSummary> {
        let wall_start = Instant::now();
        let select = self.root.select();

        self.root.notify_sim_start(self.calendar.time());

        let mut steps = 0;
        while self.calendar.advance_and_fire(&select)? {
            steps += 1;
            self.printer.on_sim_step(self.calendar.time(), steps);
        }

        self.root.notify_sim_end(self.calendar.time());

        Ok(RunSummary {
            time: self.calendar.time(),
            steps,
            events_fired: self.calendar.num_events_fired(),
            events_scheduled: self.calendar.num_events_scheduled(),
            duration: wall_start.elapsed(),
        })
    }
}

impl Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Simulator {{ root: {} {:?} }}",
            self.root.name(),
            self.calendar
        )
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "finished at T={} after {} steps ({} events fired, {} scheduled, {:?} wall time)",
            self.time, self.steps, self.events_fired, self.events_scheduled, self.duration
        )
    }
}
