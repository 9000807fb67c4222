use crate::time::SimTime;
use std::error::Error as StdError;
use std::fmt::Display;

/// An error that terminates a simulation run.
///
/// Nothing is retried inside the kernel: every variant is fatal for
/// [`run`](crate::runtime::Simulator::run) and propagates to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// An event was scheduled strictly before the calendar's current time.
    PastSchedule {
        /// The requested schedule time.
        time: SimTime,
        /// The calendar time at the moment of scheduling.
        now: SimTime,
    },

    /// A tie-break selector returned a name that was not a candidate.
    BadSelect {
        chosen: String,
        candidates: Vec<String>,
    },

    /// An influencer edge connects a model to itself.
    SelfLoop { model: String },

    /// A compound model was declared without components.
    EmptyComponents { compound: String },

    /// A component's name equals the name of its enclosing compound.
    NameCollision { compound: String },

    /// An influencer edge references a component that does not exist.
    UnknownComponent {
        compound: String,
        component: String,
    },

    /// A dynamic value failed its checked cast at a model boundary.
    TypeMismatch {
        source: String,
        target: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The simulator reached a configuration its protocol forbids.
    InvariantViolation { reason: String },
}

impl SimError {
    /// A type mismatch whose endpoints are filled in at the delivery site.
    pub(crate) fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            source: String::new(),
            target: String::new(),
            expected,
            found,
        }
    }

    /// Attaches source/target names to a [`SimError::TypeMismatch`] raised
    /// below the wiring layer. Other variants pass through unchanged.
    pub(crate) fn with_endpoints(self, source: &str, target: &str) -> Self {
        match self {
            Self::TypeMismatch {
                source: s,
                target: t,
                expected,
                found,
            } => Self::TypeMismatch {
                source: if s.is_empty() { source.to_string() } else { s },
                target: if t.is_empty() { target.to_string() } else { t },
                expected,
                found,
            },
            other => other,
        }
    }
}

impl Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PastSchedule { time, now } => write!(
                f,
                "cannot schedule an event at T={time} when current time is T={now}"
            ),
            Self::BadSelect { chosen, candidates } => write!(
                f,
                "selector chose '{chosen}' which is not among the concurrent candidates {candidates:?}"
            ),
            Self::SelfLoop { model } => {
                write!(f, "model '{model}' may not influence itself")
            }
            Self::EmptyComponents { compound } => {
                write!(f, "compound '{compound}' has no components")
            }
            Self::NameCollision { compound } => write!(
                f,
                "compound '{compound}' contains a component with the same name"
            ),
            Self::UnknownComponent { compound, component } => write!(
                f,
                "compound '{compound}' wires unknown component '{component}'"
            ),
            Self::TypeMismatch {
                source,
                target,
                expected,
                found,
            } => write!(
                f,
                "value from '{source}' to '{target}' is a {found}, expected {expected}"
            ),
            Self::InvariantViolation { reason } => {
                write!(f, "simulator invariant violated: {reason}")
            }
        }
    }
}

impl StdError for SimError {}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_past_schedule() {
        let e = SimError::PastSchedule {
            time: SimTime::new(1.5),
            now: SimTime::new(2.0),
        };
        assert_eq!(
            e.to_string(),
            "cannot schedule an event at T=1.5 when current time is T=2"
        );
    }

    #[test]
    fn endpoints_fill_only_type_mismatch() {
        let e = SimError::type_mismatch("i64", "f64").with_endpoints("gen", "server");
        match e {
            SimError::TypeMismatch { source, target, .. } => {
                assert_eq!(source, "gen");
                assert_eq!(target, "server");
            }
            _ => panic!("expected a type mismatch"),
        }

        let e = SimError::SelfLoop {
            model: "a".to_string(),
        }
        .with_endpoints("x", "y");
        assert_eq!(
            e,
            SimError::SelfLoop {
                model: "a".to_string()
            }
        );
    }
}
