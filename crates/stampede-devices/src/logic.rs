//! Shared logic-level helpers for gates and chips.

use serde::{Deserialize, Serialize};
use stampede_core::{Convergence, StepContext};

/// Output voltage of a logic 1.
pub const HIGH: f64 = 5.0;

/// Output voltage of a logic 0.
pub const LOW: f64 = 0.0;

/// Inputs strictly above this voltage read as logic 1.
pub const THRESHOLD: f64 = 2.5;

/// Newton iterations a digital output may keep changing within one step
/// before it is accepted as is. Feedback loops that never settle (a ring of
/// inverters) continue oscillating across steps instead.
pub const DIGITAL_SETTLE_ITERATIONS: usize = 20;

/// Threshold an input voltage.
pub fn is_high(v: f64) -> bool {
    v > THRESHOLD
}

/// Voltage driven for a logic level.
pub fn level(high: bool) -> f64 {
    if high {
        HIGH
    } else {
        LOW
    }
}

/// Verdict for a digital output.
///
/// The first iteration of a step is never accepted, so an output reacts to
/// input changes within the same step. After that the output is settled once
/// it stops changing, or once the settle bound is reached.
pub fn settle(changed: bool, ctx: &StepContext) -> Convergence {
    if ctx.iteration >= DIGITAL_SETTLE_ITERATIONS {
        if changed {
            log::trace!(
                "t={:e}: digital output still changing after {} iterations",
                ctx.time,
                ctx.iteration
            );
        }
        return Convergence::Converged;
    }
    Convergence::when(ctx.iteration > 0 && !changed)
}

/// Rising-edge detector state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    /// Feed the present clock level. True on a low to high transition.
    pub fn rising(&mut self, clock: bool) -> bool {
        let edge = clock && !self.last;
        self.last = clock;
        edge
    }

    pub fn last(&self) -> bool {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::IntegrationMethod;

    fn ctx(iteration: usize) -> StepContext {
        StepContext {
            iteration,
            ..StepContext::new(1e-6, IntegrationMethod::Trapezoidal)
        }
    }

    #[test]
    fn test_threshold() {
        assert!(is_high(5.0));
        assert!(is_high(2.6));
        assert!(!is_high(2.5));
        assert!(!is_high(0.0));
        assert_eq!(level(true), HIGH);
        assert_eq!(level(false), LOW);
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle(false, &ctx(0)), Convergence::NotConverged);
        assert_eq!(settle(false, &ctx(1)), Convergence::Converged);
        assert_eq!(settle(true, &ctx(1)), Convergence::NotConverged);
        assert_eq!(
            settle(true, &ctx(DIGITAL_SETTLE_ITERATIONS)),
            Convergence::Converged
        );
    }

    #[test]
    fn test_rising_edge_only() {
        let mut edge = EdgeDetector::default();
        assert!(!edge.rising(false));
        assert!(edge.rising(true));
        // held high
        assert!(!edge.rising(true));
        // falling
        assert!(!edge.rising(false));
        assert!(edge.rising(true));
    }
}
