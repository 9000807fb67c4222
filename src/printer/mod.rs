//! Formatting of run traces to a console.

use crate::runtime::Event;
use crate::time::SimTime;
use std::io::Write;
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

///
/// Trace callbacks invoked by the kernel as a run progresses.
///
/// All methods default to no-ops, so a printer implements only what it
/// cares about. Callbacks run synchronously on the simulation thread.
///
pub trait Printer {
    /// A model reported its initial state.
    fn on_sim_start(&self, name: &str, time: SimTime, state: &str) {
        let _ = (name, time, state);
    }

    /// One concurrent group finished firing.
    fn on_sim_step(&self, time: SimTime, step: usize) {
        let _ = (time, step);
    }

    /// A model reported its final state.
    fn on_sim_end(&self, name: &str, time: SimTime, state: &str) {
        let _ = (name, time, state);
    }

    /// Logical time advanced.
    fn on_time_advanced(&self, prev: SimTime, next: SimTime) {
        let _ = (prev, next);
    }

    /// An event was accepted into the calendar.
    fn on_event_scheduled(&self, now: SimTime, event: &Event) {
        let _ = (now, event);
    }

    /// An event's action is about to run.
    fn on_event_fired(&self, now: SimTime, event: &Event) {
        let _ = (now, event);
    }

    /// A model changed state.
    fn on_state_transition(&self, name: &str, time: SimTime, prev: &str, next: &str) {
        let _ = (name, time, prev, next);
    }
}

/// A printer that swallows everything. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPrinter;

impl Printer for SilentPrinter {}

const PARENS_COLOR: Color = Color::Rgb(0x7f, 0x8c, 0x8d);

///
/// A printer rendering every callback as a `[ time ] scope: message`
/// line on stdout, decorated with SGR color codes when the stream
/// supports them.
///
#[derive(Debug, Clone, Copy)]
pub struct VerbosePrinter {
    choice: ColorChoice,
}

impl VerbosePrinter {
    /// Creates a printer that colors output when stdout is a terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            choice: ColorChoice::Auto,
        }
    }

    /// Creates a printer that never emits color codes.
    #[must_use]
    pub fn no_color() -> Self {
        Self {
            choice: ColorChoice::Never,
        }
    }

    fn line(&self, time: SimTime, color: Color, scope: &str, msg: &str) {
        let out = BufferWriter::stdout(self.choice);
        let mut buffer = out.buffer();
        self.fmt(&mut buffer, time, color, scope, msg)
            .expect("failed to format trace record");
        out.print(&buffer).expect("failed to write trace record");
    }

    fn fmt(
        &self,
        out: &mut Buffer,
        time: SimTime,
        color: Color,
        scope: &str,
        msg: &str,
    ) -> std::io::Result<()> {
        out.set_color(ColorSpec::new().set_fg(Some(PARENS_COLOR)))?;
        write!(out, "[ ")?;
        let time = format!("{time}");
        write!(out, "{time:^7}")?;
        write!(out, " ] ")?;

        out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(out, "{scope}: ")?;

        out.reset()?;
        writeln!(out, "{msg}")?;
        Ok(())
    }
}

impl Default for VerbosePrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer for VerbosePrinter {
    fn on_sim_start(&self, name: &str, time: SimTime, state: &str) {
        if state.is_empty() {
            self.line(time, Color::Green, name, "starting");
        } else {
            self.line(time, Color::Green, name, &format!("starting in state {state}"));
        }
    }

    fn on_sim_step(&self, time: SimTime, step: usize) {
        self.line(time, Color::Blue, "sim", &format!("step #{step} done"));
    }

    fn on_sim_end(&self, name: &str, time: SimTime, state: &str) {
        if state.is_empty() {
            self.line(time, Color::Green, name, "finished");
        } else {
            self.line(time, Color::Green, name, &format!("finished in state {state}"));
        }
    }

    fn on_time_advanced(&self, prev: SimTime, next: SimTime) {
        self.line(prev, Color::Cyan, "time", &format!("advancing to {next}"));
    }

    fn on_event_scheduled(&self, _now: SimTime, event: &Event) {
        self.line(
            event.time(),
            Color::Magenta,
            event.model(),
            &format!("scheduled '{}'", event.description()),
        );
    }

    fn on_event_fired(&self, now: SimTime, event: &Event) {
        self.line(
            now,
            Color::Yellow,
            event.model(),
            &format!("executing '{}'", event.description()),
        );
    }

    fn on_state_transition(&self, name: &str, time: SimTime, prev: &str, next: &str) {
        self.line(time, Color::White, name, &format!("{prev} -> {next}"));
    }
}
