use crate::time::SimTime;
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

///
/// A scheduled action in the calendar.
///
/// An event carries the logical time it fires at, the name of the model it
/// belongs to (used to tie-break concurrent firings), a free-form
/// description for traces, and a shared cancellation flag. The action is a
/// thunk without inputs or outputs; it captures whatever state it needs.
///
pub struct Event {
    time: SimTime,
    model: String,
    description: String,
    action: RefCell<Option<Box<dyn FnOnce()>>>,
    cancelled: Rc<Cell<bool>>,
}

impl Event {
    ///
    /// Creates a new event firing `action` at `time`.
    ///
    pub fn new(
        time: SimTime,
        model: impl Into<String>,
        description: impl Into<String>,
        action: impl FnOnce() + 'static,
    ) -> Self {
        Self {
            time,
            model: model.into(),
            description: description.into(),
            action: RefCell::new(Some(Box::new(action))),
            cancelled: Rc::new(Cell::new(false)),
        }
    }

    /// Returns the scheduled firing time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Returns the name of the model this event belongs to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the trace description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns whether the event has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    ///
    /// Returns a handle that cancels this event.
    ///
    /// All handles of one event share a single flag, so any of them (and
    /// the event itself) observe a cancellation no matter where the event
    /// currently lives.
    ///
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Rc::clone(&self.cancelled),
        }
    }

    ///
    /// Invokes the action, consuming it.
    ///
    /// # Panics
    ///
    /// Firing a cancelled event, or firing twice, is a program error; the
    /// calendar is responsible for never doing either.
    ///
    pub(crate) fn fire(&self) {
        assert!(
            !self.cancelled.get(),
            "attempted to fire a cancelled event ({} '{}')",
            self.model,
            self.description
        );
        let action = self
            .action
            .borrow_mut()
            .take()
            .expect("unreachable: the calendar fires each event once");
        action();
    }
}

impl Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("model", &self.model)
            .field("description", &self.description)
            .field("cancelled", &self.cancelled.get())
            .finish_non_exhaustive()
    }
}

///
/// A cancellation handle for a scheduled [`Event`].
///
/// Cancellation is cooperative and lazy: the event stays in the calendar
/// and is discarded when it surfaces. Cancelling an event that has already
/// fired is a no-op.
///
#[derive(Clone)]
pub struct CancelHandle {
    flag: Rc<Cell<bool>>,
}

impl CancelHandle {
    /// Marks the event as cancelled.
    pub fn cancel(&self) {
        self.flag.set(true);
    }

    /// Returns whether the event has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }
}

impl Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CancelHandle({})", self.flag.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn handles_share_one_flag() {
        let event = Event::new(SimTime::new(1.0), "m", "test", || {});
        let a = event.cancel_handle();
        let b = a.clone();

        assert!(!event.is_cancelled());
        b.cancel();
        assert!(event.is_cancelled());
        assert!(a.is_cancelled());
    }

    #[test]
    fn fire_invokes_action_once() {
        let hits = Rc::new(Cell::new(0));
        let probe = Rc::clone(&hits);
        let event = Event::new(SimTime::ZERO, "m", "test", move || {
            probe.set(probe.get() + 1);
        });

        event.fire();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    #[should_panic(expected = "cancelled event")]
    fn firing_cancelled_event_is_a_program_error() {
        let event = Event::new(SimTime::ZERO, "m", "test", || {});
        event.cancel_handle().cancel();
        event.fire();
    }
}
