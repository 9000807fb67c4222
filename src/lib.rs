//!
//! A discrete event simulator for hierarchically composed DEVS models.
//!
//! A model is either an [`Atomic`](model::Atomic) state machine (initial
//! state, external and internal transition functions, output function,
//! time advance) or a [`Compound`](model::Compound) wiring the outputs of
//! components to the inputs of others through an influencer graph. Both
//! present the same [`Model`](model::Model) surface, so compounds nest.
//!
//! A [`Simulator`](runtime::Simulator) drives the root model through a
//! global [`Calendar`](runtime::Calendar): events fire in non-decreasing
//! logical time, events within an epsilon of each other form a concurrent
//! group tie-broken by the model's selector, and zero-delay chains
//! converge within a single tick.
//!
//! ```
//! use devs::prelude::*;
//!
//! let counter = Atomic::new(
//!     0_i64,
//!     |s: &i64, _elapsed: SimTime, x: &i64| s + x,
//!     |s: &i64| s + 1,
//!     |s: &i64| *s,
//!     |_: &i64| SimTime::new(1.0),
//! );
//!
//! let sim = Simulator::new("counter", counter, 0.0, 3.0).unwrap();
//! sim.schedule_external_input(1.5, Dynamic::wrap(10_i64), "bump").unwrap();
//! let summary = sim.run().unwrap();
//! assert_eq!(summary.time, SimTime::new(3.0));
//! ```
//!

pub mod model;
pub mod prelude;
pub mod printer;
pub mod random;
pub mod runtime;
pub mod time;
pub mod util;
