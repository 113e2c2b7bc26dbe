//! Per-step performance metrics for the model.
//!
//! [`StepMetrics`] captures stage timings, halo traffic, and solver
//! effort for a single time step.

use swell_comm::ExchangeStats;
use swell_solver::SolveReport;

/// Timing and communication metrics collected during a single step.
///
/// All durations are in microseconds. The model fills these in after
/// each `time_step()` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step, in microseconds.
    pub total_us: u64,
    /// Tendency computation, including the explicit free-surface tendency.
    pub tendency_us: u64,
    /// AB2 update of every prognostic field.
    pub ab2_us: u64,
    /// Free-surface stage (explicit update or implicit solve).
    pub free_surface_us: u64,
    /// Barotropic velocity correction (implicit only).
    pub correction_us: u64,
    /// Trailing halo exchange.
    pub halo_us: u64,
    /// Halo messages sent during the step, across all exchanges.
    pub halo_messages: usize,
    /// Halo values sent during the step.
    pub halo_values: usize,
    /// Report of the implicit free-surface solve, if one ran.
    pub solve: Option<SolveReport>,
}

impl StepMetrics {
    pub(crate) fn record_exchange(&mut self, stats: ExchangeStats) {
        self.halo_messages += stats.messages;
        self.halo_values += stats.values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.halo_messages, 0);
        assert!(m.solve.is_none());
    }

    #[test]
    fn exchanges_accumulate() {
        let mut m = StepMetrics::default();
        let stats = ExchangeStats {
            messages: 4,
            values: 64,
            local_fills: 2,
            physical_fills: 0,
        };
        m.record_exchange(stats);
        m.record_exchange(stats);
        assert_eq!(m.halo_messages, 8);
        assert_eq!(m.halo_values, 128);
    }
}
