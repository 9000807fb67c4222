//! A collection of the most common types of this crate.

pub use crate::model::{
    transform, Atomic, Compound, LifecycleListener, Model, ModelBuilder, OutputListener,
    TransitionListener, Transformer,
};
pub use crate::printer::{Printer, SilentPrinter, VerbosePrinter};
pub use crate::random::Random;
pub use crate::runtime::{
    fifo_select, Builder, Calendar, CancelHandle, Event, RunSummary, SelectFn, SimError,
    SimResult, Simulator, DEFAULT_EPSILON,
};
pub use crate::time::SimTime;
pub use crate::util::Dynamic;
