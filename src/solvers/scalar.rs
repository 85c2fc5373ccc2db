//! Bounded one-dimensional Newton iteration.
//!
//! Used for temperature and pressure searches where the residual is a black-box
//! function of a single physical variable. The slope is estimated by a forward
//! difference and every iterate is clamped to the configured bounds.
//!
//! Every evaluated point is recorded; once two of them straddle a sign change
//! the search keeps that bracket and replaces by bisection any Newton step
//! that leaves it or fails to halve the previous step, as well as any flat
//! slope. Residuals with steep but monotone
//! sections, such as enthalpy across a two-phase window, then cannot cycle.

use serde::{Deserialize, Serialize};

/// Finite difference step used to estimate the slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Fixed increment in the units of the search variable
    Absolute(f64),
    /// Increment proportional to the current iterate
    Relative(f64),
}

impl Step {
    fn at(self, x: f64) -> f64 {
        match self {
            Step::Absolute(h) => h,
            Step::Relative(fraction) => fraction * x,
        }
    }
}

/// Result of a one-dimensional search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarSolution {
    /// Last iterate (the root when `converged` is true)
    pub root: f64,
    /// Residual at `root`
    pub residual: f64,
    /// Iterations of the search loop
    pub iterations: usize,
    /// Whether |residual| dropped below the tolerance
    pub converged: bool,
}

/// Bounded Newton iteration with a finite-difference slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarNewton {
    /// Convergence tolerance on |f(x)|
    pub tolerance: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Lower bound of the search variable
    pub lower: f64,
    /// Upper bound of the search variable
    pub upper: f64,
    /// Finite difference step
    pub step: Step,
    /// The search stops when |f'(x)| falls to this value and no bracket is known
    pub min_slope: f64,
    /// Evaluate both bounds first and seed the bracket when they differ in sign
    #[serde(default)]
    pub seed_bracket: bool,
}

/// Closest known points on either side of a sign change.
#[derive(Debug, Clone, Copy, Default)]
struct Bracket {
    negative: Option<f64>,
    positive: Option<f64>,
}

impl Bracket {
    fn interval(&self) -> Option<(f64, f64)> {
        match (self.negative, self.positive) {
            (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
            _ => None,
        }
    }

    /// Only points inside an established bracket may tighten it.
    fn record(&mut self, x: f64, fx: f64) {
        if !fx.is_finite() {
            return;
        }
        if let Some((lo, hi)) = self.interval() {
            if !(x > lo && x < hi) {
                return;
            }
        }
        if fx < 0.0 {
            self.negative = Some(x);
        } else {
            self.positive = Some(x);
        }
    }
}

impl ScalarNewton {
    /// Creates a solver over `[lower, upper]` with the given tolerance.
    ///
    /// Defaults to 50 iterations, a 1.0 absolute step and a 1e-10 slope guard.
    pub fn new(lower: f64, upper: f64, tolerance: f64) -> Self {
        ScalarNewton {
            tolerance,
            max_iterations: 50,
            lower,
            upper,
            step: Step::Absolute(1.0),
            min_slope: 1e-10,
            seed_bracket: false,
        }
    }

    /// Sets the maximum iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the finite difference step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.step = step;
        self
    }

    /// Sets the slope guard.
    pub fn with_min_slope(mut self, min_slope: f64) -> Self {
        self.min_slope = min_slope;
        self
    }

    /// Evaluates both bounds before iterating.
    ///
    /// Needed when the residual is flat away from the root, e.g. a vapor
    /// fraction pinned at 0 or 1 outside the two-phase region.
    pub fn with_bracket_seeding(mut self) -> Self {
        self.seed_bracket = true;
        self
    }

    /// Searches for a root of `f` starting from `x0`.
    ///
    /// The search stops early (not converged) when the residual is not finite
    /// or the slope is flatter than `min_slope`.
    pub fn solve<F>(&self, mut f: F, x0: f64) -> ScalarSolution
    where
        F: FnMut(f64) -> f64,
    {
        let within = |x: f64| x >= self.lower && x <= self.upper;
        let mut bracket = Bracket::default();

        if self.seed_bracket {
            for bound in [self.lower, self.upper] {
                let fb = f(bound);
                if fb.abs() < self.tolerance {
                    return ScalarSolution { root: bound, residual: fb, iterations: 0, converged: true };
                }
                bracket.record(bound, fb);
            }
        }

        let mut x = x0;
        let mut previous_step = f64::INFINITY;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let fx = f(x);
            if !fx.is_finite() {
                return ScalarSolution { root: x, residual: fx, iterations, converged: false };
            }
            if fx.abs() < self.tolerance {
                return ScalarSolution { root: x, residual: fx, iterations, converged: true };
            }
            bracket.record(x, fx);

            let h = self.step.at(x);
            let fh = f(x + h);
            if within(x + h) {
                bracket.record(x + h, fh);
            }
            let slope = (fh - fx) / h;
            let newton = (slope.is_finite() && slope.abs() > self.min_slope).then(|| x - fx / slope);

            // Inside a bracket a Newton step must stay in it and at least
            // halve the previous step, otherwise bisect
            let next = match (newton, bracket.interval()) {
                (Some(next), Some((lo, hi)))
                    if next > lo && next < hi && (next - x).abs() <= 0.5 * previous_step.abs() =>
                {
                    next
                }
                (_, Some((lo, hi))) => 0.5 * (lo + hi),
                (Some(next), None) => next.clamp(self.lower, self.upper),
                (None, None) => return ScalarSolution { root: x, residual: fx, iterations, converged: false },
            };
            previous_step = next - x;
            x = next;
        }

        // The last step moved x; report the residual that belongs to it
        let residual = f(x);
        ScalarSolution { root: x, residual, iterations, converged: residual.abs() < self.tolerance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scalar_newton_quadratic() {
        let solver = ScalarNewton::new(0.0, 10.0, 1e-10).with_step(Step::Absolute(1e-6));
        let solution = solver.solve(|x| x * x - 2.0, 1.0);

        assert!(solution.converged);
        assert_abs_diff_eq!(solution.root, 2.0_f64.sqrt(), epsilon = 1e-8);
    }

    #[test]
    fn test_scalar_newton_respects_bounds() {
        // Root at 10, outside the bounds
        let solver = ScalarNewton::new(0.0, 5.0, 1e-8).with_max_iterations(10);
        let solution = solver.solve(|x| x - 10.0, 1.0);

        assert!(!solution.converged);
        assert_eq!(solution.root, 5.0);
        assert_eq!(solution.iterations, 10);
    }

    #[test]
    fn test_flat_residual_stops() {
        let solver = ScalarNewton::new(0.0, 5.0, 1e-8);
        let solution = solver.solve(|_| 1.0, 1.0);

        assert!(!solution.converged);
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.residual, 1.0);
    }

    #[test]
    fn test_exhausted_search_reports_residual_at_root() {
        let solver = ScalarNewton::new(0.0, 5.0, 1e-8).with_max_iterations(1);
        let solution = solver.solve(|x| x - 10.0, 1.0);

        assert_eq!(solution.root, 5.0);
        assert_eq!(solution.residual, -5.0);
    }

    #[test]
    fn test_steep_step_is_bracketed() {
        // Shallow slope on both sides of a steep rise: plain Newton from
        // either side jumps across the rise and oscillates between the bounds
        let f = |t: f64| {
            let shallow = 150.0 * (t - 370.0);
            let steep = 30_000.0 / (1.0 + (-(t - 368.0) * 2.0).exp()) - 15_000.0;
            shallow + steep
        };
        let solver = ScalarNewton::new(200.0, 800.0, 100.0);

        for guess in [330.0, 400.0, 250.0, 700.0] {
            let solution = solver.solve(f, guess);
            assert!(solution.converged, "guess {}: {:?}", guess, solution);
            assert!(solution.residual.abs() < 100.0);
            assert!(solution.iterations <= 50);
        }
    }

    #[test]
    fn test_seeded_bracket_escapes_flat_region() {
        // Flat outside (1, 2), like a vapor fraction pinned at 0 or 1
        let f = |x: f64| (1.5 - x).clamp(-0.5, 0.5);
        let plain = ScalarNewton::new(0.0, 10.0, 1e-6);
        assert!(!plain.solve(f, 8.0).converged);

        let seeded = plain.with_bracket_seeding();
        for guess in [0.2, 8.0] {
            let solution = seeded.solve(f, guess);
            assert!(solution.converged, "guess {}", guess);
            assert_abs_diff_eq!(solution.root, 1.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_relative_step() {
        // Root near 2e5, relative step keeps the slope estimate meaningful
        let solver =
            ScalarNewton::new(1e3, 1e7, 1e-9).with_step(Step::Relative(0.01)).with_min_slope(1e-15);
        let solution = solver.solve(|p| (p / 2e5).ln(), 1e5);

        assert!(solution.converged);
        assert_abs_diff_eq!(solution.root, 2e5, epsilon = 1e-2);
    }
}
