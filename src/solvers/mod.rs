//! Numerical solvers for stage-wise equilibrium calculations.
//!
//! Two families of root finders are used throughout the crate:
//!
//! - [`SteadyStateSolver`]: Newton-Raphson for square algebraic systems F(x) = 0
//!   with a finite-difference Jacobian, a dense LU step and a backtracking line
//!   search. This drives the column MESH equations.
//! - [`scalar::ScalarNewton`]: bounded one-dimensional Newton iteration with a
//!   finite-difference slope, used by the flash and bubble/dew point searches.
//!
//! # Convergence failures are values
//!
//! Running out of iterations is not an error. Both solvers return the best
//! iterate they reached together with a `converged` flag and [`SolverStats`],
//! so callers can report a diagnostic result instead of unwinding. Only
//! structural problems (singular Jacobian, non-finite starting residuals,
//! mismatched dimensions) are reported through [`SolverError`].
//!
//! ```
//! use stagewise::solvers::{SolverConfig, SteadyStateSolver};
//!
//! let solver = SteadyStateSolver::new(SolverConfig::new().with_tolerance(1e-10));
//! let solution = solver.solve(|x: &[f64]| vec![x[0] + x[1] - 3.0, 2.0 * x[0] - x[1]], &[0.0, 0.0])?;
//! assert!(solution.converged);
//! assert!((solution.x[1] - 2.0).abs() < 1e-8);
//! # Ok::<(), stagewise::solvers::SolverError>(())
//! ```

pub mod scalar;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors that can occur during solving.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// Singular Jacobian matrix encountered
    #[error("Singular Jacobian matrix at iteration {0}")]
    SingularJacobian(usize),
    /// Residuals could not be evaluated at the initial guess
    #[error("Non-finite residual at the initial guess")]
    InvalidInitialConditions,
    /// Residual vector length differs from the number of unknowns
    #[error("Residual function returned {residuals} values for {unknowns} unknowns")]
    DimensionMismatch {
        /// Number of unknowns
        unknowns: usize,
        /// Number of residuals
        residuals: usize,
    },
}

/// Statistics from a solver run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    /// Number of iterations performed
    pub iterations: usize,
    /// Number of function evaluations
    pub function_evals: usize,
    /// Number of Jacobian evaluations
    pub jacobian_evals: usize,
    /// Final residual norm (infinity norm)
    pub final_residual: f64,
}

impl SolverStats {
    /// Creates new solver statistics.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Configuration for [`SteadyStateSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum Newton iterations
    pub max_iterations: usize,
    /// Convergence tolerance on the residual infinity norm
    pub tolerance: f64,
    /// Relative finite difference step for Jacobian columns
    pub fd_step: f64,
    /// Maximum step halvings per iteration in the line search
    pub max_backtracks: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig { max_iterations: 100, tolerance: 1e-6, fd_step: 1e-7, max_backtracks: 12 }
    }
}

impl SolverConfig {
    /// Creates a new solver configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the relative finite difference step.
    pub fn with_fd_step(mut self, fd_step: f64) -> Self {
        self.fd_step = fd_step;
        self
    }

    /// Sets the maximum number of step halvings in the line search.
    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }
}

/// Outcome of a [`SteadyStateSolver`] run.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Last iterate (the root when `converged` is true)
    pub x: Vec<f64>,
    /// Whether the residual infinity norm dropped below the tolerance
    pub converged: bool,
    /// Iteration statistics
    pub stats: SolverStats,
}

/// Newton-Raphson solver for steady-state algebraic systems.
///
/// Solves F(x) = 0 with
///
/// x_{k+1} = x_k + λ·dx,  J(x_k)·dx = -F(x_k)
///
/// where J is approximated column by column with forward differences and λ is
/// chosen by halving until the Euclidean residual norm decreases.
#[derive(Debug, Clone, Default)]
pub struct SteadyStateSolver {
    config: SolverConfig,
}

impl SteadyStateSolver {
    /// Creates a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Self {
        SteadyStateSolver { config }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves the system starting from `x0`.
    ///
    /// # Arguments
    ///
    /// * `residuals_fn` - Function that computes F(x) given state vector x
    /// * `x0` - Initial guess for the solution
    ///
    /// # Errors
    ///
    /// - `InvalidInitialConditions`: F(x0) contains NaN or infinity
    /// - `DimensionMismatch`: F does not return one residual per unknown
    /// - `SingularJacobian`: the Newton step could not be computed
    pub fn solve<F>(&self, residuals_fn: F, x0: &[f64]) -> SolverResult<Solution>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let n = x0.len();
        let mut x = x0.to_vec();
        let mut stats = SolverStats::new();

        let mut residuals = residuals_fn(&x);
        stats.function_evals += 1;
        if residuals.len() != n {
            return Err(SolverError::DimensionMismatch { unknowns: n, residuals: residuals.len() });
        }
        if !all_finite(&residuals) {
            return Err(SolverError::InvalidInitialConditions);
        }

        for iteration in 0..self.config.max_iterations {
            let norm = infinity_norm(&residuals);
            stats.final_residual = norm;
            tracing::debug!(iteration, residual = norm, "newton iteration");
            if norm < self.config.tolerance {
                return Ok(Solution { x, converged: true, stats });
            }
            stats.iterations = iteration + 1;

            let jacobian = self.compute_jacobian(&residuals_fn, &x, &residuals);
            stats.jacobian_evals += 1;
            stats.function_evals += n;

            // Solve J * dx = -F using LU decomposition
            let r_vec = DVector::from_column_slice(&residuals);
            let dx = jacobian.lu().solve(&(-r_vec)).ok_or(SolverError::SingularJacobian(iteration))?;

            // Backtracking on the Euclidean norm
            let base = euclidean_norm(&residuals);
            let mut lambda = 1.0;
            let mut trial_x = x.clone();
            let mut trial_residuals = Vec::new();
            for _ in 0..=self.config.max_backtracks {
                for i in 0..n {
                    trial_x[i] = x[i] + lambda * dx[i];
                }
                trial_residuals = residuals_fn(&trial_x);
                stats.function_evals += 1;
                if all_finite(&trial_residuals)
                    && euclidean_norm(&trial_residuals) < (1.0 - 1e-4 * lambda) * base
                {
                    break;
                }
                lambda *= 0.5;
            }

            if !all_finite(&trial_residuals) {
                tracing::warn!(iteration, "line search could not find a finite residual");
                break;
            }
            x = trial_x;
            residuals = trial_residuals;
        }

        stats.final_residual = infinity_norm(&residuals);
        let converged = stats.final_residual < self.config.tolerance;
        Ok(Solution { x, converged, stats })
    }

    /// Computes the Jacobian matrix using forward differences.
    ///
    /// J[i][j] = partialF_i/partialx_j aprox (F_i(x + h_j*e_j) - F_i(x)) / h_j
    /// with h_j = fd_step * max(1, |x_j|).
    fn compute_jacobian<F>(&self, f: &F, x: &[f64], f0: &[f64]) -> DMatrix<f64>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let n = x.len();
        let mut jacobian = DMatrix::zeros(n, n);
        let mut x_perturbed = x.to_vec();

        for j in 0..n {
            let h = self.config.fd_step * x[j].abs().max(1.0);
            x_perturbed[j] = x[j] + h;
            let f_perturbed = f(&x_perturbed);
            for i in 0..n {
                jacobian[(i, j)] = (f_perturbed[i] - f0[i]) / h;
            }
            x_perturbed[j] = x[j];
        }

        jacobian
    }
}

/// Largest absolute residual.
pub fn infinity_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

fn euclidean_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
