//! A traffic light cycling through its phases, with a manual override
//! that switches it off and back on while the simulation runs.

use devs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Red,
    Green,
    Yellow,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    PowerOff,
    PowerOn,
}

fn traffic_light() -> Atomic<Command, Phase, Phase> {
    Atomic::new(
        Phase::Red,
        |_phase: &Phase, _elapsed: SimTime, cmd: &Command| match cmd {
            Command::PowerOff => Phase::Off,
            Command::PowerOn => Phase::Red,
        },
        |phase: &Phase| match phase {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Yellow,
            Phase::Yellow => Phase::Red,
            Phase::Off => Phase::Off,
        },
        |phase: &Phase| *phase,
        |phase: &Phase| match phase {
            Phase::Red => SimTime::new(4.0),
            Phase::Green => SimTime::new(3.0),
            Phase::Yellow => SimTime::new(1.0),
            Phase::Off => SimTime::INFINITY,
        },
    )
}

fn main() -> SimResult<()> {
    let intersection = Compound::new()
        .component("light", traffic_light())
        .input("light", None)
        .output("light", None);

    let sim = Builder::new()
        .start_time(0.0)
        .end_time(20.0)
        .printer(VerbosePrinter::new())
        .build("intersection", intersection)?;

    sim.schedule_external_input(9.5, Dynamic::wrap(Command::PowerOff), "manual override")?;
    sim.schedule_external_input(13.0, Dynamic::wrap(Command::PowerOn), "back to service")?;

    sim.add_output_listener(std::rc::Rc::new(|name, time, value| {
        if let Some(phase) = value.try_cast_ref::<Phase>() {
            println!("{name} leaves phase {phase:?} at T={time}");
        }
    }));

    let summary = sim.run()?;
    println!("{summary}");
    Ok(())
}
