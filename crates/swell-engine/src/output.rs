//! Output writers, diagnostics, and the schedules that drive them.
//!
//! Both are offered a [`ModelSnapshot`] only between steps, after the
//! trailing halo exchange, so every halo they see is current.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;
use swell_core::ConfigError;

use crate::clock::Clock;
use crate::snapshot::ModelSnapshot;

// ── Schedule ───────────────────────────────────────────────────────

/// When a writer or diagnostic actuates.
///
/// Every schedule actuates on the initial state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Schedule {
    /// Every `n` iterations.
    IterationInterval(u64),
    /// Each time model time crosses a multiple of the interval, in
    /// seconds. Steps are not shortened to land on the boundary.
    TimeInterval(f64),
}

impl Schedule {
    /// Reject empty intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::IterationInterval(0) => Err(ConfigError::InvalidParameter {
                name: "schedule",
                reason: "iteration interval must be at least 1".into(),
            }),
            Self::TimeInterval(t) if !t.is_finite() || t <= 0.0 => {
                Err(ConfigError::InvalidParameter {
                    name: "schedule",
                    reason: format!("time interval must be finite and positive, got {t}"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// A [`Schedule`] plus its actuation count.
#[derive(Clone, Debug)]
pub(crate) struct ScheduleState {
    schedule: Schedule,
    actuations: u64,
}

impl ScheduleState {
    pub(crate) fn new(schedule: Schedule) -> Result<Self, ConfigError> {
        schedule.validate()?;
        Ok(Self {
            schedule,
            actuations: 0,
        })
    }

    /// Whether to actuate at `clock`, recording the actuation if so.
    pub(crate) fn actuate(&mut self, clock: Clock) -> bool {
        let due = match self.schedule {
            Schedule::IterationInterval(n) => clock.iteration % n == 0,
            Schedule::TimeInterval(t) => {
                let next = self.actuations as f64 * t;
                clock.time >= next - 1e-9 * t
            }
        };
        if due {
            self.actuations = match self.schedule {
                Schedule::IterationInterval(_) => self.actuations + 1,
                // Skip any boundaries a long step jumped over.
                Schedule::TimeInterval(t) => (clock.time / t + 1e-9).floor() as u64 + 1,
            };
        }
        due
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from output writers.
#[derive(Debug)]
pub enum OutputError {
    /// The destination could not be written.
    Io(std::io::Error),
    /// The writer refused the snapshot.
    Rejected {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "output i/o failed: {e}"),
            Self::Rejected { reason } => write!(f, "output rejected: {reason}"),
        }
    }
}

impl Error for OutputError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<std::io::Error> for OutputError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A diagnostic found the state unacceptable.
#[derive(Clone, Debug, PartialEq)]
pub enum DiagnosticError {
    /// A NaN or infinity in the interior of a field on this rank.
    NonFinite {
        /// Field name.
        field: String,
        /// Iteration at which it was found.
        iteration: u64,
    },
    /// Another rank's diagnostic failed.
    RemoteFailure {
        /// Name of the diagnostic.
        diagnostic: String,
        /// Iteration at which it failed.
        iteration: u64,
    },
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { field, iteration } => {
                write!(f, "non-finite value in '{field}' at iteration {iteration}")
            }
            Self::RemoteFailure {
                diagnostic,
                iteration,
            } => write!(
                f,
                "diagnostic '{diagnostic}' failed on another rank at iteration {iteration}"
            ),
        }
    }
}

impl Error for DiagnosticError {}

// ── Traits ─────────────────────────────────────────────────────────

/// Receives named arrays at scheduled times.
pub trait OutputWriter: Send {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Write this rank's share of `snapshot`.
    fn write(&mut self, snapshot: &ModelSnapshot<'_>) -> Result<(), OutputError>;
}

/// Checks the state at scheduled times and may stop the run.
pub trait Diagnostic: Send {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Inspect this rank's share of `snapshot`.
    fn check(&mut self, snapshot: &ModelSnapshot<'_>) -> Result<(), DiagnosticError>;
}

// ── NanCheck ───────────────────────────────────────────────────────

/// Fails on the first NaN or infinity in the interior of a field.
#[derive(Clone, Debug, Default)]
pub struct NanCheck {
    fields: Option<Vec<String>>,
}

impl NanCheck {
    /// Check every field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check only the named fields.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    fn watches(&self, name: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |f| f.iter().any(|n| n == name))
    }
}

impl Diagnostic for NanCheck {
    fn name(&self) -> &str {
        "nan_check"
    }

    fn check(&mut self, snapshot: &ModelSnapshot<'_>) -> Result<(), DiagnosticError> {
        for (name, field) in snapshot.arrays().filter(|(n, _)| self.watches(n)) {
            let mut finite = true;
            field.for_each_interior(|_, v| finite &= v.is_finite());
            if !finite {
                return Err(DiagnosticError::NonFinite {
                    field: name.to_string(),
                    iteration: snapshot.clock().iteration,
                });
            }
        }
        Ok(())
    }
}

// ── FieldRecorder ──────────────────────────────────────────────────

/// One recorded output.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// When it was taken.
    pub clock: Clock,
    /// Interior values by field name.
    pub arrays: IndexMap<String, Vec<f64>>,
}

/// Keeps copies of field interiors in memory.
#[derive(Clone, Debug, Default)]
pub struct FieldRecorder {
    fields: Option<Vec<String>>,
    records: Vec<Record>,
}

impl FieldRecorder {
    /// Record every field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record only the named fields.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(names.into_iter().map(Into::into).collect()),
            records: Vec::new(),
        }
    }

    /// Everything recorded so far, oldest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl OutputWriter for FieldRecorder {
    fn name(&self) -> &str {
        "field_recorder"
    }

    fn write(&mut self, snapshot: &ModelSnapshot<'_>) -> Result<(), OutputError> {
        let fields = &self.fields;
        let arrays = snapshot
            .arrays()
            .filter(|(n, _)| fields.as_ref().map_or(true, |f| f.iter().any(|x| x == n)))
            .map(|(n, f)| (n.to_string(), f.interior_values()))
            .collect();
        self.records.push(Record {
            clock: snapshot.clock(),
            arrays,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(iteration: u64, time: f64) -> Clock {
        Clock {
            time,
            iteration,
            last_dt: 0.0,
        }
    }

    #[test]
    fn iteration_schedule_fires_on_multiples() {
        let mut s = ScheduleState::new(Schedule::IterationInterval(3)).unwrap();
        let fired: Vec<u64> = (0..10).filter(|&i| s.actuate(at(i, 0.0))).collect();
        assert_eq!(fired, [0, 3, 6, 9]);
    }

    #[test]
    fn time_schedule_fires_once_per_interval() {
        let mut s = ScheduleState::new(Schedule::TimeInterval(10.0)).unwrap();
        let fired: Vec<u64> = (0..12)
            .filter(|&i| s.actuate(at(i, i as f64 * 4.0)))
            .collect();
        // t = 0, 12, 20, 32, 40
        assert_eq!(fired, [0, 3, 5, 8, 10]);
    }

    #[test]
    fn time_schedule_skips_jumped_boundaries() {
        let mut s = ScheduleState::new(Schedule::TimeInterval(1.0)).unwrap();
        assert!(s.actuate(at(0, 0.0)));
        assert!(s.actuate(at(1, 3.5)));
        assert!(!s.actuate(at(2, 3.9)));
        assert!(s.actuate(at(3, 4.0)));
    }

    #[test]
    fn empty_schedules_rejected() {
        assert!(Schedule::IterationInterval(0).validate().is_err());
        assert!(Schedule::TimeInterval(0.0).validate().is_err());
        assert!(Schedule::TimeInterval(f64::NAN).validate().is_err());
        assert!(Schedule::TimeInterval(0.5).validate().is_ok());
    }

    #[test]
    fn error_display() {
        let e = DiagnosticError::NonFinite {
            field: "T".into(),
            iteration: 7,
        };
        assert_eq!(e.to_string(), "non-finite value in 'T' at iteration 7");
        let io = OutputError::from(std::io::Error::other("disk full"));
        assert!(io.source().is_some());
    }
}
