//! Gradient-based minimization over simple feasible sets
//!
//! The per-point fits are small smooth problems with analytic gradients. They
//! are solved by projected gradient descent with Armijo backtracking: each
//! trial point is projected back onto the feasible set, so bound and
//! equality constraints hold at every iterate. Non-convergence is not an
//! error; the last accepted iterate is returned.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, Result};

/// A smooth function with an analytic gradient
pub trait Objective {
    /// Number of variables
    fn dimension(&self) -> usize;

    /// Evaluate the function at `x`, writing the gradient into `gradient`
    fn evaluate(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64;

    /// Evaluate only the function value
    fn value(&self, x: &DVector<f64>) -> f64 {
        let mut gradient = DVector::zeros(self.dimension());
        self.evaluate(x, &mut gradient)
    }
}

/// Euclidean projection onto a convex feasible set
pub trait Projection {
    fn project(&self, x: &mut DVector<f64>);
}

/// The whole space
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl Projection for Unconstrained {
    fn project(&self, _x: &mut DVector<f64>) {}
}

/// `{ x : 0 <= x_j <= 1, sum_j x_j = total }` over the first `count`
/// coordinates; the remaining coordinates are free.
#[derive(Debug, Clone, Copy)]
pub struct CappedSimplex {
    pub count: usize,
    pub total: f64,
}

/// Bisection steps used to locate the projection shift
const PROJECTION_BISECTIONS: usize = 100;

impl CappedSimplex {
    /// The balanced split used by the bi-normal fit: `sum = count / 2`
    pub fn balanced(count: usize) -> Self {
        Self {
            count,
            total: count as f64 / 2.0,
        }
    }
}

impl Projection for CappedSimplex {
    /// Projects by finding the shift `tau` with
    /// `sum_j clamp(y_j - tau, 0, 1) = total` and clamping.
    fn project(&self, x: &mut DVector<f64>) {
        if self.count == 0 {
            return;
        }
        let y = x.rows(0, self.count).clone_owned();
        let shifted_sum = |tau: f64| -> f64 { y.iter().map(|v| (v - tau).clamp(0.0, 1.0)).sum() };

        // shifted_sum is non-increasing in tau: count at `lo`, 0 at `hi`.
        let mut lo = y.min() - 1.0;
        let mut hi = y.max();
        for _ in 0..PROJECTION_BISECTIONS {
            let mid = 0.5 * (lo + hi);
            if shifted_sum(mid) > self.total {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= f64::EPSILON * (1.0 + hi.abs()) {
                break;
            }
        }

        let tau = 0.5 * (lo + hi);
        for (slot, v) in x.rows_mut(0, self.count).iter_mut().zip(y.iter()) {
            *slot = (v - tau).clamp(0.0, 1.0);
        }
    }
}

/// Stopping rules for [`minimize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizerConfig {
    pub max_iterations: usize,
    /// Stop when no coordinate moves more than this
    pub step_tolerance: f64,
    /// Stop when the relative decrease of the objective falls below this
    pub value_tolerance: f64,
    /// Stop when the projected gradient step is this small
    pub gradient_tolerance: f64,
    /// Halvings of the step before giving up on a line search
    pub max_backtracks: usize,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            step_tolerance: 1e-10,
            value_tolerance: 1e-12,
            gradient_tolerance: 1e-9,
            max_backtracks: 40,
        }
    }
}

impl MinimizerConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be greater than 0".to_string()));
        }
        if self.step_tolerance < 0.0 || self.value_tolerance < 0.0 || self.gradient_tolerance < 0.0 {
            return Err(Error::Config("minimizer tolerances must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Why [`minimize`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    StepTolerance,
    ValueTolerance,
    GradientTolerance,
    /// The line search found no decrease
    LineSearchFailed,
    MaxIterations,
}

/// Final iterate of a minimization
#[derive(Debug, Clone)]
pub struct MinimizeReport {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub termination: Termination,
}

const ARMIJO_SLOPE: f64 = 1e-4;

/// Minimize `objective` over the set described by `projection`, starting from `x0`.
///
/// `x0` is projected first, so any starting point is accepted.
pub fn minimize<O, P>(
    objective: &O,
    projection: &P,
    x0: DVector<f64>,
    config: &MinimizerConfig,
) -> MinimizeReport
where
    O: Objective + ?Sized,
    P: Projection + ?Sized,
{
    let n = objective.dimension();
    let mut x = x0;
    projection.project(&mut x);

    let mut gradient = DVector::zeros(n);
    let mut value = objective.evaluate(&x, &mut gradient);
    let mut trial_gradient = DVector::zeros(n);
    let mut step = 1.0;

    for iteration in 1..=config.max_iterations {
        // Projected gradient at unit step measures stationarity.
        let mut projected = &x - &gradient;
        projection.project(&mut projected);
        if (&projected - &x).amax() <= config.gradient_tolerance {
            return MinimizeReport { x, value, iterations: iteration, termination: Termination::GradientTolerance };
        }

        let mut accepted = None;
        for _ in 0..=config.max_backtracks {
            let mut trial = &x - &gradient * step;
            projection.project(&mut trial);
            let direction = &trial - &x;
            let trial_value = objective.evaluate(&trial, &mut trial_gradient);
            if trial_value <= value + ARMIJO_SLOPE * gradient.dot(&direction) {
                accepted = Some((trial, trial_value, direction));
                break;
            }
            step *= 0.5;
        }

        let Some((trial, trial_value, direction)) = accepted else {
            return MinimizeReport { x, value, iterations: iteration, termination: Termination::LineSearchFailed };
        };

        let decrease = value - trial_value;
        let moved = direction.amax();
        x = trial;
        value = trial_value;
        std::mem::swap(&mut gradient, &mut trial_gradient);
        step = (step * 2.0).min(1e6);

        if moved <= config.step_tolerance {
            return MinimizeReport { x, value, iterations: iteration, termination: Termination::StepTolerance };
        }
        if decrease <= config.value_tolerance * value.abs().max(1.0) {
            return MinimizeReport { x, value, iterations: iteration, termination: Termination::ValueTolerance };
        }
    }

    MinimizeReport {
        x,
        value,
        iterations: config.max_iterations,
        termination: Termination::MaxIterations,
    }
}
