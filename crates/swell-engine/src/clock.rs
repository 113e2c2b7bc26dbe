//! Model time.

use std::fmt;

/// Time and iteration count of a model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Clock {
    /// Model time, in seconds.
    pub time: f64,
    /// Completed steps.
    pub iteration: u64,
    /// Length of the most recent step, zero before the first.
    pub last_dt: f64,
}

impl Clock {
    /// Whether no step has completed yet.
    pub fn is_first_step(&self) -> bool {
        self.iteration == 0
    }

    pub(crate) fn tick(&mut self, dt: f64) {
        self.time += dt;
        self.iteration += 1;
        self.last_dt = dt;
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iteration {} at t = {} s", self.iteration, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_time_and_iteration() {
        let mut c = Clock::default();
        assert!(c.is_first_step());
        c.tick(0.5);
        c.tick(0.25);
        assert_eq!(c.iteration, 2);
        assert_eq!(c.time, 0.75);
        assert_eq!(c.last_dt, 0.25);
        assert!(!c.is_first_step());
    }
}
