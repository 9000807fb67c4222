use crate::model::{
    apply_transformer, BuildCtx, Listeners, Model, ModelBuilder, Transformer,
};
use crate::runtime::{
    fifo_select, Calendar, CancelHandle, Event, SelectFn, SimError, SimResult,
};
use crate::time::SimTime;
use crate::util::Dynamic;
use fxhash::FxHashMap;
use log::trace;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

///
/// A compound (coupled) DEVS model blueprint: named components plus an
/// influencer graph wiring outputs to inputs through optional
/// transformers.
///
/// `None` in an edge position denotes the compound itself: an edge with
/// source `None` routes the compound's own input to a component, an edge
/// with target `None` routes a component's output out of the compound.
///
/// # Examples
///
/// ```no_run
/// use devs::prelude::*;
///
/// # fn counter() -> Atomic<i64, i64, i64> {
/// #     Atomic::new(0, |s, _, x| s + x, |s| s + 1, |s| *s, |_| SimTime::new(1.0))
/// # }
/// let pair = Compound::new()
///     .component("a", counter())
///     .component("b", counter())
///     .route("a", "b", None)
///     .output("b", None);
/// ```
///
pub struct Compound {
    components: Vec<(String, Box<dyn ModelBuilder>)>,
    edges: Vec<Edge>,
    select: Option<SelectFn>,
}

struct Edge {
    source: Option<String>,
    target: Option<String>,
    transformer: Option<Rc<Transformer>>,
}

impl Compound {
    /// Creates an empty blueprint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            edges: Vec::new(),
            select: None,
        }
    }

    /// Adds a named component.
    #[must_use]
    pub fn component(
        mut self,
        name: impl Into<String>,
        builder: impl ModelBuilder + 'static,
    ) -> Self {
        self.components.push((name.into(), Box::new(builder)));
        self
    }

    ///
    /// Adds an influencer edge. `None` denotes the compound itself, as
    /// source (compound input) or as target (compound output). Declaring
    /// the same `source → target` pair again replaces the earlier edge.
    ///
    #[must_use]
    pub fn influence(
        mut self,
        source: Option<&str>,
        target: Option<&str>,
        transformer: Option<Rc<Transformer>>,
    ) -> Self {
        let source = source.map(ToString::to_string);
        let target = target.map(ToString::to_string);
        self.edges
            .retain(|e| e.source != source || e.target != target);
        self.edges.push(Edge {
            source,
            target,
            transformer,
        });
        self
    }

    /// Wires a component's output to a sibling's input.
    #[must_use]
    pub fn route(self, source: &str, target: &str, transformer: Option<Rc<Transformer>>) -> Self {
        self.influence(Some(source), Some(target), transformer)
    }

    /// Wires the compound's own input to a component.
    #[must_use]
    pub fn input(self, target: &str, transformer: Option<Rc<Transformer>>) -> Self {
        self.influence(None, Some(target), transformer)
    }

    /// Wires a component's output out of the compound.
    #[must_use]
    pub fn output(self, source: &str, transformer: Option<Rc<Transformer>>) -> Self {
        self.influence(Some(source), None, transformer)
    }

    /// Sets the tie-break selector used for concurrent events.
    #[must_use]
    pub fn select(mut self, select: SelectFn) -> Self {
        self.select = Some(select);
        self
    }
}

impl Default for Compound {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder for Compound {
    fn build(self: Box<Self>, name: &str, ctx: &BuildCtx) -> SimResult<Rc<dyn Model>> {
        let sim = CompoundSim::create(*self, name, ctx)?;
        Ok(sim)
    }
}

/// A synchronous route from the compound's input to one component.
type InputRoute = Rc<dyn Fn(&Dynamic) -> SimResult<()>>;

///
/// The runtime form of a compound model: built components plus the
/// subscriptions realizing the influencer graph.
///
pub(crate) struct CompoundSim {
    me: Weak<CompoundSim>,
    name: String,
    calendar: Rc<Calendar>,
    order: Vec<String>,
    components: FxHashMap<String, Rc<dyn Model>>,
    input_routes: RefCell<Vec<InputRoute>>,
    outputs: Listeners<dyn Fn(&str, SimTime, &Dynamic)>,
    started: Listeners<dyn Fn(&str, SimTime, &str)>,
    ended: Listeners<dyn Fn(&str, SimTime, &str)>,
    select: SelectFn,
}

impl CompoundSim {
    fn create(blueprint: Compound, name: &str, ctx: &BuildCtx) -> SimResult<Rc<Self>> {
        if blueprint.components.is_empty() {
            return Err(SimError::EmptyComponents {
                compound: name.to_string(),
            });
        }

        let mut order = Vec::with_capacity(blueprint.components.len());
        let mut components = FxHashMap::default();
        for (component_name, builder) in blueprint.components {
            if component_name == name {
                return Err(SimError::NameCollision {
                    compound: name.to_string(),
                });
            }
            trace!("building component {component_name} of {name}");
            let component = builder.build(&component_name, ctx)?;
            if components.insert(component_name.clone(), component).is_none() {
                order.push(component_name);
            }
        }

        let sim = Rc::new_cyclic(|me| CompoundSim {
            me: me.clone(),
            name: name.to_string(),
            calendar: Rc::clone(&ctx.calendar),
            order,
            components,
            input_routes: RefCell::new(Vec::new()),
            outputs: Listeners::new(),
            started: Listeners::new(),
            ended: Listeners::new(),
            select: blueprint.select.unwrap_or_else(fifo_select),
        });

        for edge in blueprint.edges {
            sim.wire(edge)?;
        }
        Ok(sim)
    }

    fn component(&self, component: &str) -> SimResult<&Rc<dyn Model>> {
        self.components
            .get(component)
            .ok_or_else(|| SimError::UnknownComponent {
                compound: self.name.clone(),
                component: component.to_string(),
            })
    }

    fn wire(&self, edge: Edge) -> SimResult<()> {
        let Edge {
            source,
            target,
            transformer,
        } = edge;

        match (source, target) {
            // The compound influencing itself is the degenerate self-loop.
            (None, None) => Err(SimError::SelfLoop {
                model: self.name.clone(),
            }),

            // Component output -> sibling input, via the calendar. The
            // endpoints must exist before an edge can count as a self-loop.
            (Some(source), Some(target)) => {
                let source_model = self.component(&source)?;
                if source == target {
                    return Err(SimError::SelfLoop { model: source });
                }
                let target_model = Rc::downgrade(self.component(&target)?);
                let calendar = Rc::clone(&self.calendar);
                source_model.add_output_listener(Rc::new(move |from, _time, value| {
                    let Some(target_model) = target_model.upgrade() else {
                        return;
                    };
                    if let Err(err) =
                        target_model.receive_input_from(from, value.clone(), transformer.clone())
                    {
                        calendar.report_fault(err);
                    }
                }));
                Ok(())
            }

            // Component output -> compound output: synchronous passthrough.
            (Some(source), None) => {
                let source_model = self.component(&source)?;
                let me = self.me.clone();
                let calendar = Rc::clone(&self.calendar);
                source_model.add_output_listener(Rc::new(move |from, time, value| {
                    let Some(compound) = me.upgrade() else {
                        return;
                    };
                    match apply_transformer(transformer.as_ref(), value.clone()) {
                        Ok(value) => compound.emit_output(time, &value),
                        Err(err) => {
                            calendar.report_fault(err.with_endpoints(from, &compound.name));
                        }
                    }
                }));
                Ok(())
            }

            // Compound input -> component: synchronous delivery at firing
            // time, in registration order.
            (None, Some(target)) => {
                let target_model = Rc::downgrade(self.component(&target)?);
                let compound_name = self.name.clone();
                self.input_routes.borrow_mut().push(Rc::new(move |value| {
                    let Some(target_model) = target_model.upgrade() else {
                        return Ok(());
                    };
                    target_model.direct_input(&compound_name, value.clone(), transformer.clone())
                }));
                Ok(())
            }
        }
    }

    /// Fans a value arriving at the compound boundary out to every wired
    /// component, in the order the input edges were declared.
    fn route_input(&self, value: &Dynamic) -> SimResult<()> {
        let routes: Vec<InputRoute> = self.input_routes.borrow().clone();
        for route in routes {
            route(value)?;
        }
        Ok(())
    }

    fn emit_output(&self, time: SimTime, value: &Dynamic) {
        trace!("{} emits {:?} at T={}", self.name, value, time);
        for listener in self.outputs.snapshot() {
            listener(&self.name, time, value);
        }
    }

    /// Schedules an event that fans `value` into the compound when fired.
    fn schedule_delivery(
        &self,
        time: SimTime,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle> {
        let me = self.me.clone();
        let event = Event::new(time, &self.name, description, move || {
            if let Some(compound) = me.upgrade() {
                if let Err(err) = compound.route_input(&value) {
                    compound.calendar.report_fault(err);
                }
            }
        });
        self.calendar.schedule(event)
    }
}

impl Model for CompoundSim {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Option<String> {
        None
    }

    fn components(&self) -> Vec<Rc<dyn Model>> {
        self.order
            .iter()
            .filter_map(|name| self.components.get(name).cloned())
            .collect()
    }

    fn select(&self) -> SelectFn {
        Rc::clone(&self.select)
    }

    fn schedule_external_input(
        &self,
        time: SimTime,
        value: Dynamic,
        description: &str,
    ) -> SimResult<CancelHandle> {
        self.schedule_delivery(time, value, description)
    }

    fn add_output_listener(&self, listener: crate::model::OutputListener) {
        self.outputs.push(listener);
    }

    fn add_transition_listener(&self, listener: crate::model::TransitionListener) {
        // Compounds carry no state of their own; listening on a compound
        // means listening on everything underneath it.
        for component in self.components() {
            component.add_transition_listener(Rc::clone(&listener));
        }
    }

    fn add_sim_start_listener(&self, listener: crate::model::LifecycleListener) {
        for component in self.components() {
            component.add_sim_start_listener(Rc::clone(&listener));
        }
        self.started.push(listener);
    }

    fn add_sim_end_listener(&self, listener: crate::model::LifecycleListener) {
        for component in self.components() {
            component.add_sim_end_listener(Rc::clone(&listener));
        }
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
        self.schedule_delivery(now, value, &format!("input from {source}"))?;
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
        self.route_input(&value)
    }

    fn notify_sim_start(&self, time: SimTime) {
        for listener in self.started.snapshot() {
            listener(&self.name, time, "");
        }
        for component in self.components() {
            component.notify_sim_start(time);
        }
    }

    fn notify_sim_end(&self, time: SimTime) {
        for listener in self.ended.snapshot() {
            listener(&self.name, time, "");
        }
        for component in self.components() {
            component.notify_sim_end(time);
        }
    }
}
