use devs::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Emits its tag once at T=1, then goes passive.
fn one_shot(tag: i64) -> Atomic<i64, i64, u8> {
    Atomic::new(
        0_u8,
        |s: &u8, _elapsed: SimTime, _x: &i64| *s,
        |_s: &u8| 1,
        move |_s: &u8| tag,
        |s: &u8| match s {
            0 => SimTime::new(1.0),
            _ => SimTime::INFINITY,
        },
    )
}

/// Accumulates every input it receives.
fn sink() -> Atomic<i64, i64, Vec<i64>> {
    Atomic::new(
        Vec::new(),
        |s: &Vec<i64>, _elapsed: SimTime, x: &i64| {
            let mut next = s.clone();
            next.push(*x);
            next
        },
        |s: &Vec<i64>| s.clone(),
        |_s: &Vec<i64>| 0,
        |_: &Vec<i64>| SimTime::INFINITY,
    )
}

#[test]
fn empty_compound_is_rejected() {
    let err = Simulator::new("shell", Compound::new(), 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::EmptyComponents {
            compound: "shell".to_string()
        }
    );
}

#[test]
fn component_shadowing_compound_name_is_rejected() {
    let model = Compound::new().component("shell", one_shot(1));
    let err = Simulator::new("shell", model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::NameCollision {
            compound: "shell".to_string()
        }
    );
}

#[test]
fn unknown_component_in_edge_is_rejected() {
    let model = Compound::new()
        .component("src", one_shot(1))
        .route("src", "ghost", None);
    let err = Simulator::new("shell", model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::UnknownComponent {
            compound: "shell".to_string(),
            component: "ghost".to_string()
        }
    );
}

#[test]
fn self_influence_is_rejected() {
    let model = Compound::new()
        .component("src", one_shot(1))
        .route("src", "src", None);
    let err = Simulator::new("shell", model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::SelfLoop {
            model: "src".to_string()
        }
    );
}

#[test]
fn self_edge_on_unknown_component_is_rejected_as_unknown() {
    // A typo'd name is an unknown component even when it appears on both
    // ends of the edge.
    let model = Compound::new()
        .component("src", one_shot(1))
        .route("ghost", "ghost", None);
    let err = Simulator::new("shell", model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::UnknownComponent {
            compound: "shell".to_string(),
            component: "ghost".to_string()
        }
    );
}

#[test]
fn compound_influencing_itself_is_rejected() {
    let model = Compound::new()
        .component("src", one_shot(1))
        .influence(None, None, None);
    let err = Simulator::new("shell", model, 0.0, 1.0).unwrap_err();
    assert_eq!(
        err,
        SimError::SelfLoop {
            model: "shell".to_string()
        }
    );
}

#[test]
fn each_edge_delivers_exactly_once() {
    let model = Compound::new()
        .component("src", one_shot(7))
        .component("dst", sink())
        .route("src", "dst", None);

    let sim = Simulator::new("shell", model, 0.0, 2.0).unwrap();
    let root = sim.root();
    sim.run().unwrap();

    let dst = root
        .components()
        .into_iter()
        .find(|m| m.name() == "dst")
        .unwrap();
    assert_eq!(dst.state().unwrap(), "[7]");
}

#[test]
fn transformer_adapts_the_value_on_the_edge() {
    let model = Compound::new()
        .component("src", one_shot(7))
        .component("dst", sink())
        .route("src", "dst", Some(transform(|x: &i64| x * 2)));

    let sim = Simulator::new("shell", model, 0.0, 2.0).unwrap();
    let root = sim.root();
    sim.run().unwrap();

    let dst = root
        .components()
        .into_iter()
        .find(|m| m.name() == "dst")
        .unwrap();
    assert_eq!(dst.state().unwrap(), "[14]");
}

#[test]
fn type_mismatch_names_both_endpoints() {
    // "dst" expects strings; "src" emits integers and no transformer
    // mediates.
    let expects_strings = Atomic::new(
        0_u8,
        |s: &u8, _elapsed: SimTime, _x: &String| *s,
        |s: &u8| *s,
        |_s: &u8| 0_i64,
        |_: &u8| SimTime::INFINITY,
    );
    let model = Compound::new()
        .component("src", one_shot(7))
        .component("dst", expects_strings)
        .route("src", "dst", None);

    let sim = Simulator::new("shell", model, 0.0, 2.0).unwrap();
    let err = sim.run().unwrap_err();
    match err {
        SimError::TypeMismatch { source, target, expected, found } => {
            assert_eq!(source, "src");
            assert_eq!(target, "dst");
            assert!(expected.contains("String"));
            assert!(found.contains("i64"));
        }
        other => panic!("expected a type mismatch, got {other}"),
    }
}

#[test]
fn compound_input_reaches_nested_components() {
    let inner = Compound::new()
        .component("leaf", sink())
        .input("leaf", None);
    let outer = Compound::new()
        .component("inner", inner)
        .input("inner", None);

    let sim = Simulator::new("outer", outer, 0.0, 3.0).unwrap();
    sim.schedule_external_input(1.0, Dynamic::wrap(5_i64), "poke")
        .unwrap();

    let root = sim.root();
    sim.run().unwrap();

    let leaf = root.components()[0].components()[0].clone();
    assert_eq!(leaf.name(), "leaf");
    assert_eq!(leaf.state().unwrap(), "[5]");
}

#[test]
fn compound_output_applies_the_boundary_transformer() {
    let model = Compound::new()
        .component("src", one_shot(3))
        .influence(Some("src"), None, Some(transform(|x: &i64| x + 100)));

    let sim = Simulator::new("shell", model, 0.0, 2.0).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let probe = Rc::clone(&seen);
    sim.add_output_listener(Rc::new(move |name, time, value| {
        if let Some(v) = value.try_cast_ref::<i64>() {
            probe.borrow_mut().push((name.to_string(), *v, time));
        }
    }));

    sim.run().unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![("shell".to_string(), 103, SimTime::new(1.0))]
    );
}

#[test]
fn redeclared_edge_replaces_the_earlier_transformer() {
    let model = Compound::new()
        .component("src", one_shot(1))
        .component("dst", sink())
        .route("src", "dst", Some(transform(|x: &i64| x * 10)))
        .route("src", "dst", Some(transform(|x: &i64| x * 1000)));

    let sim = Simulator::new("shell", model, 0.0, 2.0).unwrap();
    let root = sim.root();
    sim.run().unwrap();

    let dst = root
        .components()
        .into_iter()
        .find(|m| m.name() == "dst")
        .unwrap();
    assert_eq!(dst.state().unwrap(), "[1000]");
}

#[test]
fn unchanged_state_suppresses_transition_listeners() {
    // The internal transition is the identity, so only the output side
    // is observable.
    let silent = Atomic::new(
        0_u8,
        |s: &u8, _elapsed: SimTime, _x: &()| *s,
        |s: &u8| *s,
        |s: &u8| *s,
        |_: &u8| SimTime::new(1.0),
    );

    let sim = Simulator::new("silent", silent, 0.0, 3.0).unwrap();
    let transitions = Rc::new(RefCell::new(Vec::new()));
    let probe = Rc::clone(&transitions);
    sim.root()
        .add_transition_listener(Rc::new(move |name, _time, prev, next| {
            probe
                .borrow_mut()
                .push((name.to_string(), prev.to_string(), next.to_string()));
        }));

    let summary = sim.run().unwrap();
    assert!(transitions.borrow().is_empty());
    assert_eq!(summary.steps, 3);
}

#[test]
fn listener_added_during_delivery_sees_only_later_events() {
    let sim = Simulator::new(
        "clock",
        Atomic::new(
            0_i64,
            |s: &i64, _elapsed: SimTime, _x: &()| *s,
            |s: &i64| s + 1,
            |s: &i64| *s,
            |_: &i64| SimTime::new(1.0),
        ),
        0.0,
        2.0,
    )
    .unwrap();

    let late_log = Rc::new(RefCell::new(Vec::new()));
    let root = sim.root();
    let registered = Rc::new(RefCell::new(false));

    let late_probe = Rc::clone(&late_log);
    let root_probe = Rc::downgrade(&root);
    sim.add_output_listener(Rc::new(move |_name, _time, value| {
        let mut registered = registered.borrow_mut();
        if *registered {
            return;
        }
        *registered = true;

        if let (Some(root), Some(_)) = (root_probe.upgrade(), value.try_cast_ref::<i64>()) {
            let log = Rc::clone(&late_probe);
            root.add_output_listener(Rc::new(move |_name, time, value| {
                if let Some(v) = value.try_cast_ref::<i64>() {
                    log.borrow_mut().push((*v, time));
                }
            }));
        }
    }));

    sim.run().unwrap();

    // The listener registered during the T=1 delivery observed only T=2.
    assert_eq!(*late_log.borrow(), vec![(1, SimTime::new(2.0))]);
}
