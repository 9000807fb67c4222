use crate::runtime::{CancelHandle, Event, SimError, SimResult};
use crate::time::SimTime;
use log::trace;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::rc::Rc;

/// The default tolerance under which two instants count as concurrent.
pub const DEFAULT_EPSILON: f64 = 1e-3;

///
/// A tie-break selector for concurrent events.
///
/// Given the owning-model names of all events in a concurrent group, the
/// selector returns the name whose event fires next. Returning a name that
/// is not a candidate is fatal ([`SimError::BadSelect`]).
///
pub type SelectFn = Rc<dyn Fn(&[&str]) -> String>;

/// The default selector: first-in-first-out among the submitted candidates.
#[must_use]
pub fn fifo_select() -> SelectFn {
    Rc::new(|names: &[&str]| names[0].to_string())
}

/// Observer of logical time advances, called with `(prev, next)`.
pub type TimeObserver = Rc<dyn Fn(SimTime, SimTime)>;
/// Observer of calendar activity on a single event.
pub type EventObserver = Rc<dyn Fn(SimTime, &Event)>;

#[derive(Debug)]
struct EventNode {
    /// Monotonic insertion counter, stabilizing ties among equal times.
    seq: usize,
    event: Rc<Event>,
}

impl PartialEq for EventNode {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for EventNode {}

impl PartialOrd for EventNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted, so the std max-heap yields the earliest event first.
        other
            .event
            .time()
            .cmp(&self.event.time())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    time: SimTime,
    end_time: SimTime,
    epsilon: f64,
    seq: usize,
    fired: usize,
    heap: BinaryHeap<EventNode>,
}

///
/// The global priority-ordered event calendar.
///
/// Owns every pending [`Event`], advances logical time monotonically, and
/// fires events whose times lie within `epsilon` of each other as one
/// concurrent group, tie-broken by a [`SelectFn`].
///
/// The calendar lives behind an `Rc` and uses interior mutability so that
/// a firing action can schedule follow-up events into it; no borrow is
/// held while an action runs.
///
pub struct Calendar {
    inner: RefCell<Inner>,
    advanced: RefCell<Vec<TimeObserver>>,
    scheduled: RefCell<Vec<EventObserver>>,
    about_to_fire: RefCell<Vec<EventObserver>>,
    fault: RefCell<Option<SimError>>,
}

impl Calendar {
    ///
    /// Creates an empty calendar covering `[start_time, end_time]`.
    ///
    #[must_use]
    pub fn new(start_time: SimTime, end_time: SimTime, epsilon: f64) -> Self {
        Self {
            inner: RefCell::new(Inner {
                time: start_time,
                end_time,
                epsilon,
                seq: 0,
                fired: 0,
                heap: BinaryHeap::with_capacity(64),
            }),
            advanced: RefCell::new(Vec::new()),
            scheduled: RefCell::new(Vec::new()),
            about_to_fire: RefCell::new(Vec::new()),
            fault: RefCell::new(None),
        }
    }

    /// Returns the current logical time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.inner.borrow().time
    }

    /// Returns the time the simulation ends at.
    #[must_use]
    pub fn end_time(&self) -> SimTime {
        self.inner.borrow().end_time
    }

    /// Returns the concurrency tolerance.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.inner.borrow().epsilon
    }

    /// Returns the number of pending events, cancelled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().heap.len()
    }

    /// Returns whether no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().heap.is_empty()
    }

    /// Returns the firing time of the earliest live pending event.
    #[must_use]
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.inner
            .borrow()
            .heap
            .iter()
            .filter(|n| !n.event.is_cancelled())
            .map(|n| n.event.time())
            .min()
    }

    /// Returns the number of events scheduled so far.
    #[must_use]
    pub fn num_events_scheduled(&self) -> usize {
        self.inner.borrow().seq
    }

    /// Returns the number of events fired so far.
    #[must_use]
    pub fn num_events_fired(&self) -> usize {
        self.inner.borrow().fired
    }

    /// Registers an observer of time advances.
    pub fn on_time_advanced(&self, observer: TimeObserver) {
        self.advanced.borrow_mut().push(observer);
    }

    /// Registers an observer of successful schedules.
    pub fn on_event_scheduled(&self, observer: EventObserver) {
        self.scheduled.borrow_mut().push(observer);
    }

    /// Registers an observer called right before an event's action runs.
    pub fn on_event_about_to_fire(&self, observer: EventObserver) {
        self.about_to_fire.borrow_mut().push(observer);
    }

    ///
    /// Schedules an event, returning its cancellation handle.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::PastSchedule`] when the event's time lies
    /// strictly before the current time; the calendar is left unchanged.
    ///
    pub fn schedule(&self, event: Event) -> SimResult<CancelHandle> {
        let now = {
            let inner = self.inner.borrow();
            if event.time() < inner.time {
                return Err(SimError::PastSchedule {
                    time: event.time(),
                    now: inner.time,
                });
            }
            inner.time
        };

        trace!(
            "scheduling '{}' of {} at T={}",
            event.description(),
            event.model(),
            event.time()
        );

        let handle = event.cancel_handle();
        let event = Rc::new(event);

        {
            let mut inner = self.inner.borrow_mut();
            let seq = inner.seq;
            inner.seq += 1;
            inner.heap.push(EventNode {
                seq,
                event: Rc::clone(&event),
            });
        }

        // Observers run after the append, so they see the event pending.
        self.notify_scheduled(now, &event);

        Ok(handle)
    }

    ///
    /// Advances logical time to the next live event and fires its whole
    /// concurrent group.
    ///
    /// Returns `Ok(true)` when at least one event group was processed, and
    /// `Ok(false)` when no live event remains at or before `end_time`; in
    /// the latter case time has been advanced to `end_time`.
    ///
    /// # Errors
    ///
    /// Propagates [`SimError::BadSelect`] from the tie-break selector and
    /// any fault recorded by a firing action.
    ///
    pub fn advance_and_fire(&self, select: &SelectFn) -> SimResult<bool> {
        let (t, mut group) = {
            let mut inner = self.inner.borrow_mut();

            // Cancelled events tombstone in place; drop them as they surface.
            while inner
                .heap
                .peek()
                .is_some_and(|n| n.event.is_cancelled())
            {
                let node = inner.heap.pop().expect("peeked");
                trace!(
                    "dropping cancelled '{}' of {}",
                    node.event.description(),
                    node.event.model()
                );
            }

            let top_time = match inner.heap.peek() {
                Some(node) => node.event.time(),
                None => {
                    let (prev, end) = (inner.time, inner.end_time);
                    inner.time = end;
                    drop(inner);
                    self.notify_advanced(prev, end);
                    return Ok(false);
                }
            };

            // An infinite deadline is "never", even on an unbounded run.
            if !top_time.is_finite() || top_time > inner.end_time {
                let (prev, end) = (inner.time, inner.end_time);
                inner.time = end;
                drop(inner);
                self.notify_advanced(prev, end);
                return Ok(false);
            }

            let prev = inner.time;
            inner.time = top_time;

            let mut group = Vec::new();
            group.push(inner.heap.pop().expect("peeked").event);
            while inner
                .heap
                .peek()
                .is_some_and(|n| n.event.time().eq_approx(top_time, inner.epsilon))
            {
                group.push(inner.heap.pop().expect("peeked").event);
            }

            drop(inner);
            self.notify_advanced(prev, top_time);
            (top_time, group)
        };

        while !group.is_empty() {
            let idx = if group.len() == 1 {
                0
            } else {
                let names: Vec<&str> = group.iter().map(|e| e.model()).collect();
                let chosen = select(&names);
                match group.iter().position(|e| e.model() == chosen) {
                    Some(idx) => idx,
                    None => {
                        return Err(SimError::BadSelect {
                            chosen,
                            candidates: names.iter().map(ToString::to_string).collect(),
                        })
                    }
                }
            };

            let event = group.remove(idx);
            if event.is_cancelled() {
                trace!(
                    "skipping cancelled '{}' of {}",
                    event.description(),
                    event.model()
                );
                continue;
            }

            self.notify_about_to_fire(t, &event);
            self.inner.borrow_mut().fired += 1;
            event.fire();

            if let Some(err) = self.fault.borrow_mut().take() {
                return Err(err);
            }

            // Zero-delay successors join the running group, so chains of
            // immediate transitions converge within one logical tick.
            let mut inner = self.inner.borrow_mut();
            while inner
                .heap
                .peek()
                .is_some_and(|n| n.event.time().eq_approx(t, inner.epsilon))
            {
                group.push(inner.heap.pop().expect("peeked").event);
            }
        }

        Ok(true)
    }

    ///
    /// Records a fault raised inside an event action or a listener.
    ///
    /// Action thunks have no return channel, so errors raised while firing
    /// are parked here and surfaced by `advance_and_fire`. The first fault
    /// wins; later ones are logged and dropped.
    ///
    pub(crate) fn report_fault(&self, err: SimError) {
        let mut slot = self.fault.borrow_mut();
        if let Some(pending) = slot.as_ref() {
            log::debug!("suppressing subsequent fault {err} (pending: {pending})");
        } else {
            *slot = Some(err);
        }
    }

    fn notify_advanced(&self, prev: SimTime, next: SimTime) {
        let epsilon = self.epsilon();
        if prev.eq_approx(next, epsilon) {
            return;
        }
        trace!("advancing time {prev} -> {next}");
        let observers: Vec<_> = self.advanced.borrow().clone();
        for observer in observers {
            observer(prev, next);
        }
    }

    fn notify_scheduled(&self, now: SimTime, event: &Event) {
        let observers: Vec<_> = self.scheduled.borrow().clone();
        for observer in observers {
            observer(now, event);
        }
    }

    fn notify_about_to_fire(&self, now: SimTime, event: &Event) {
        let observers: Vec<_> = self.about_to_fire.borrow().clone();
        for observer in observers {
            observer(now, event);
        }
    }
}

impl Debug for Calendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        write!(
            f,
            "Calendar {{ time: {} end: {} pending: {} fired: {} }}",
            inner.time,
            inner.end_time,
            inner.heap.len(),
            inner.fired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn probe_event(
        time: f64,
        model: &str,
        log: &Rc<RefCell<Vec<(String, SimTime)>>>,
    ) -> Event {
        let log = Rc::clone(log);
        let name = model.to_string();
        Event::new(SimTime::new(time), model, "probe", move || {
            log.borrow_mut().push((name.clone(), SimTime::new(time)));
        })
    }

    #[test]
    fn fires_in_time_order() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(10.0), DEFAULT_EPSILON);
        let log = Rc::new(RefCell::new(Vec::new()));

        cal.schedule(probe_event(3.0, "c", &log)).unwrap();
        cal.schedule(probe_event(1.0, "a", &log)).unwrap();
        cal.schedule(probe_event(2.0, "b", &log)).unwrap();

        let select = fifo_select();
        while cal.advance_and_fire(&select).unwrap() {}

        let fired: Vec<String> = log.borrow().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
        assert_eq!(cal.time(), SimTime::new(10.0));
    }

    #[test]
    fn same_time_fires_fifo_by_default() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(10.0), DEFAULT_EPSILON);
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second", "third"] {
            cal.schedule(probe_event(1.0, name, &log)).unwrap();
        }

        let select = fifo_select();
        assert!(cal.advance_and_fire(&select).unwrap());

        let fired: Vec<String> = log.borrow().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(fired, vec!["first", "second", "third"]);
    }

    #[test]
    fn rejects_past_schedule_and_stays_unchanged() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(10.0), DEFAULT_EPSILON);
        cal.schedule(Event::new(SimTime::new(2.0), "m", "e", || {}))
            .unwrap();

        let select = fifo_select();
        assert!(cal.advance_and_fire(&select).unwrap());
        assert_eq!(cal.time(), SimTime::new(2.0));

        let err = cal
            .schedule(Event::new(SimTime::new(1.5), "m", "late", || {}))
            .unwrap_err();
        assert!(matches!(err, SimError::PastSchedule { .. }));
        assert!(cal.is_empty());
        assert_eq!(cal.time(), SimTime::new(2.0));
    }

    #[test]
    fn cancelled_events_never_fire() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(5.0), DEFAULT_EPSILON);
        let log = Rc::new(RefCell::new(Vec::new()));

        let handle = cal.schedule(probe_event(2.0, "victim", &log)).unwrap();
        handle.cancel();

        let select = fifo_select();
        assert!(!cal.advance_and_fire(&select).unwrap());
        assert!(log.borrow().is_empty());
        assert_eq!(cal.time(), SimTime::new(5.0));
    }

    #[test]
    fn bad_selector_is_fatal() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(5.0), DEFAULT_EPSILON);
        let log = Rc::new(RefCell::new(Vec::new()));

        cal.schedule(probe_event(1.0, "a", &log)).unwrap();
        cal.schedule(probe_event(1.0, "b", &log)).unwrap();

        let select: SelectFn = Rc::new(|_: &[&str]| "nobody".to_string());
        let err = cal.advance_and_fire(&select).unwrap_err();
        assert!(matches!(err, SimError::BadSelect { .. }));
    }

    #[test]
    fn end_time_fence_holds_infinite_events() {
        let cal = Calendar::new(SimTime::ZERO, SimTime::new(5.0), DEFAULT_EPSILON);
        let log = Rc::new(RefCell::new(Vec::new()));

        let probe = Rc::clone(&log);
        cal.schedule(Event::new(SimTime::INFINITY, "passive", "never", move || {
            probe.borrow_mut().push(("never".to_string(), SimTime::INFINITY));
        }))
        .unwrap();

        let select = fifo_select();
        assert!(!cal.advance_and_fire(&select).unwrap());
        assert!(log.borrow().is_empty());
        assert_eq!(cal.time(), SimTime::new(5.0));
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn concurrent_group_admits_zero_delay_successors() {
        let cal = Rc::new(Calendar::new(
            SimTime::ZERO,
            SimTime::new(5.0),
            DEFAULT_EPSILON,
        ));
        let log = Rc::new(RefCell::new(Vec::new()));

        let chained = Rc::clone(&log);
        let chain_cal = Rc::clone(&cal);
        cal.schedule(Event::new(SimTime::new(1.0), "a", "root", move || {
            chained.borrow_mut().push(("a".to_string(), SimTime::new(1.0)));
            let inner = Rc::clone(&chained);
            chain_cal
                .schedule(Event::new(SimTime::new(1.0), "b", "chained", move || {
                    inner.borrow_mut().push(("b".to_string(), SimTime::new(1.0)));
                }))
                .unwrap();
        }))
        .unwrap();

        let select = fifo_select();
        // One tick processes the whole zero-delay chain.
        assert!(cal.advance_and_fire(&select).unwrap());
        let fired: Vec<String> = log.borrow().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(fired, vec!["a", "b"]);

        // Grouping closure: nothing live remains at or near T=1.
        assert!(cal
            .next_event_time()
            .map_or(true, |t| t > SimTime::new(1.0 + DEFAULT_EPSILON)));
    }
}
