//! Rigorous tray-by-tray distillation column.
//!
//! Solves the MESH equations of an N-stage column with a total condenser
//! (stage 1) and a partial reboiler (stage N) as one square nonlinear system.
//!
//! # Unknowns
//!
//! Per stage j: temperature T_j, liquid composition x_j, vapor composition
//! y_j, liquid flow L_j and vapor flow V_j, packed as
//!
//! ```text
//! [T_1..T_N | x_1..x_N | y_1..y_N | L_1..L_N | V_1..V_N]
//! ```
//!
//! giving N(2nc + 3) unknowns.
//!
//! # Equations
//!
//! - **M**: L_{j-1} x_{j-1} + V_{j+1} y_{j+1} + F z δ_{jf}
//!   - L_j x_j - V_j y_j - D x_1 δ_{j1} - B x_N δ_{jN} = 0
//! - **E**: y_j - K_eff x_j = 0 with K_eff = 1 + η (K - 1); the reboiler is
//!   an equilibrium stage (η = 1) since its Σx row is replaced
//! - **S**: Σx_j = 1 and Σy_j = 1 on interior stages. At the condenser the
//!   reflux specification L_1 = R·D replaces Σy (implied by the bubble point),
//!   at the reboiler L_N = 0 replaces Σx (implied by the dew point)
//! - **H**: condenser at the bubble point of x_1, reboiler at the dew point
//!   of y_N, interior stages adiabatic in constant-molar-overflow form:
//!   V_j - V_{j+1} = F β δ_{jf}, β being the feed vapor fraction
//!
//! Duties are estimated from the end vapor flows and an average latent heat.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagewise::catalog::ComponentCatalog;
//! use stagewise::models::distillation::{ColumnSpecification, RigorousColumn};
//! use stagewise::thermodynamics::PropertyEngine;
//!
//! let engine = Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())));
//! let spec = ColumnSpecification::new(vec!["benzene".into(), "toluene".into()], 100.0, vec![0.5, 0.5])
//!     .with_feed_conditions(368.15, 101325.0)
//!     .with_stages(20, 10)
//!     .with_reflux_ratio(2.5)
//!     .with_distillate_rate(50.0);
//!
//! let solution = RigorousColumn::new(engine).solve_column(&spec);
//! assert!(solution.converged);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sizing::{ColumnDesign, ColumnSizing, SizingInput, size_column};
use crate::catalog::Component;
use crate::solvers::{SolverConfig, SolverError, SteadyStateSolver};
use crate::thermodynamics::equilibrium::{EquilibriumConfig, PhaseEquilibrium};
use crate::thermodynamics::flash::{normalize, rachford_rice};
use crate::thermodynamics::vapor_pressure::VaporPressureModel;
use crate::thermodynamics::{
    Mixture, PropertyEngine, PropertyMethod, ThermoError, validate_composition, validate_conditions,
};

/// Errors raised while setting up or solving a column.
///
/// [`RigorousColumn::solve_column`] converts these into a failed
/// [`ColumnSolution`].
#[derive(Debug, thiserror::Error)]
pub enum ColumnError {
    /// Specification rejected before iterating
    #[error("Invalid column specification: {0}")]
    InvalidSpecification(String),
    /// Property calculation failure
    #[error(transparent)]
    Thermo(#[from] ThermoError),
    /// Structural solver failure
    #[error("MESH solve failed: {0}")]
    Solver(#[from] SolverError),
}

fn default_pressure() -> f64 {
    101325.0
}

fn default_efficiency() -> f64 {
    0.75
}

/// Column design and operating specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpecification {
    /// Component identifiers
    pub components: Vec<String>,
    /// Feed flow [kmol/h]
    pub feed_flow: f64,
    /// Feed mole fractions
    pub feed_composition: Vec<f64>,
    /// Feed temperature [K]
    pub feed_temperature: f64,
    /// Feed pressure [Pa]
    #[serde(default = "default_pressure")]
    pub feed_pressure: f64,
    /// Feed stage, 1 = condenser
    pub feed_stage: usize,
    /// Number of stages including condenser and reboiler
    pub stages: usize,
    /// Reflux ratio L/D
    pub reflux_ratio: f64,
    /// Distillate rate [kmol/h]
    pub distillate_rate: f64,
    /// Column pressure [Pa], the feed pressure when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// Murphree-style tray efficiency in (0, 1]
    #[serde(default = "default_efficiency")]
    pub tray_efficiency: f64,
    /// Property method for the reported feed properties
    #[serde(default)]
    pub method: PropertyMethod,
}

impl ColumnSpecification {
    /// Creates a specification for a feed; the remaining settings default to a
    /// 10-stage column fed at stage 5, reflux ratio 1.5 and half the feed
    /// taken overhead.
    pub fn new(components: Vec<String>, feed_flow: f64, feed_composition: Vec<f64>) -> Self {
        Self {
            components,
            feed_flow,
            feed_composition,
            feed_temperature: 350.0,
            feed_pressure: default_pressure(),
            feed_stage: 5,
            stages: 10,
            reflux_ratio: 1.5,
            distillate_rate: 0.5 * feed_flow,
            pressure: None,
            tray_efficiency: default_efficiency(),
            method: PropertyMethod::default(),
        }
    }

    /// Sets feed temperature [K] and pressure [Pa].
    pub fn with_feed_conditions(mut self, temperature: f64, pressure: f64) -> Self {
        self.feed_temperature = temperature;
        self.feed_pressure = pressure;
        self
    }

    /// Sets the stage count and the 1-indexed feed stage.
    pub fn with_stages(mut self, stages: usize, feed_stage: usize) -> Self {
        self.stages = stages;
        self.feed_stage = feed_stage;
        self
    }

    /// Sets the reflux ratio.
    pub fn with_reflux_ratio(mut self, reflux_ratio: f64) -> Self {
        self.reflux_ratio = reflux_ratio;
        self
    }

    /// Sets the distillate rate [kmol/h].
    pub fn with_distillate_rate(mut self, distillate_rate: f64) -> Self {
        self.distillate_rate = distillate_rate;
        self
    }

    /// Sets a column pressure different from the feed pressure.
    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Sets the tray efficiency.
    pub fn with_tray_efficiency(mut self, efficiency: f64) -> Self {
        self.tray_efficiency = efficiency;
        self
    }

    /// Sets the property method.
    pub fn with_method(mut self, method: PropertyMethod) -> Self {
        self.method = method;
        self
    }

    /// Operating pressure [Pa].
    pub fn column_pressure(&self) -> f64 {
        self.pressure.unwrap_or(self.feed_pressure)
    }

    /// Bottoms rate F - D [kmol/h].
    pub fn bottoms_rate(&self) -> f64 {
        self.feed_flow - self.distillate_rate
    }

    fn validate(&self) -> Result<(), ColumnError> {
        let invalid = |msg: String| Err(ColumnError::InvalidSpecification(msg));

        if self.components.is_empty() {
            return invalid("component list is empty".to_string());
        }
        validate_composition(&self.feed_composition, self.components.len())?;
        validate_conditions(self.feed_temperature, self.column_pressure())?;
        validate_conditions(self.feed_temperature, self.feed_pressure)?;
        if self.stages < 2 {
            return invalid(format!("at least 2 stages are required, got {}", self.stages));
        }
        if self.feed_stage < 1 || self.feed_stage > self.stages {
            return invalid(format!("feed stage {} outside 1..={}", self.feed_stage, self.stages));
        }
        if !(self.feed_flow.is_finite() && self.feed_flow > 0.0) {
            return invalid(format!("feed flow must be positive, got {}", self.feed_flow));
        }
        if !(self.distillate_rate > 0.0 && self.distillate_rate < self.feed_flow) {
            return invalid(format!(
                "distillate rate must lie strictly between 0 and the feed flow, got {}",
                self.distillate_rate
            ));
        }
        if !(self.reflux_ratio.is_finite() && self.reflux_ratio >= 0.0) {
            return invalid(format!("reflux ratio must be non-negative, got {}", self.reflux_ratio));
        }
        if !(self.tray_efficiency > 0.0 && self.tray_efficiency <= 1.0) {
            return invalid(format!("tray efficiency must lie in (0, 1], got {}", self.tray_efficiency));
        }
        Ok(())
    }
}

/// Solver settings for [`RigorousColumn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSolverConfig {
    /// Tolerance on the residual infinity norm
    pub tolerance: f64,
    /// Newton iteration budget
    pub max_iterations: usize,
    /// Average latent heat for duty estimates [J/mol]
    pub latent_heat: f64,
    /// Size the column after a converged solve
    pub compute_sizing: bool,
    /// Sizing parameters
    pub design: ColumnDesign,
    /// K-value correlation
    pub vapor_pressure: VaporPressureModel,
}

impl Default for ColumnSolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            latent_heat: 35_000.0,
            compute_sizing: false,
            design: ColumnDesign::default(),
            vapor_pressure: VaporPressureModel::Antoine,
        }
    }
}

impl ColumnSolverConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enables sizing of converged columns.
    pub fn with_sizing(mut self, design: ColumnDesign) -> Self {
        self.compute_sizing = true;
        self.design = design;
        self
    }
}

/// Outcome discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStatus {
    /// Residual norm below tolerance
    Converged,
    /// Iteration budget exhausted; the profile is the last iterate
    NotConverged,
    /// Setup or solver failure; see `error`
    Failed,
}

/// Converged (or last) state of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    /// Stage number, 1 = condenser
    pub stage: usize,
    /// Temperature [K]
    pub temperature: f64,
    /// Liquid mole fractions
    pub liquid_composition: Vec<f64>,
    /// Vapor mole fractions
    pub vapor_composition: Vec<f64>,
    /// Liquid flow leaving the stage [kmol/h]
    pub liquid_flow: f64,
    /// Vapor flow leaving the stage [kmol/h]
    pub vapor_flow: f64,
}

/// Result of a column solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSolution {
    /// Outcome discriminator
    pub status: ColumnStatus,
    /// Whether the MESH residuals met the tolerance
    pub converged: bool,
    /// Newton iterations used
    pub iterations: usize,
    /// Final residual infinity norm
    pub residual_norm: f64,
    /// Stage profile, top to bottom
    pub stages: Vec<StageState>,
    /// Distillate mole fractions
    pub distillate_composition: Vec<f64>,
    /// Bottoms mole fractions
    pub bottoms_composition: Vec<f64>,
    /// Distillate rate [kmol/h]
    pub distillate_rate: f64,
    /// Bottoms rate [kmol/h]
    pub bottoms_rate: f64,
    /// Fraction of each component's feed recovered in the distillate
    pub recoveries: Vec<f64>,
    /// Condenser duty [kW], negative for heat removed
    pub condenser_duty: f64,
    /// Reboiler duty [kW]
    pub reboiler_duty: f64,
    /// Property method that produced the feed properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_used: Option<PropertyMethod>,
    /// Substitutions and downgrades made along the way
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Hydraulic sizing when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizing: Option<ColumnSizing>,
    /// Failure or non-convergence message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnSolution {
    fn failed(message: String) -> Self {
        Self {
            status: ColumnStatus::Failed,
            converged: false,
            iterations: 0,
            residual_norm: f64::NAN,
            stages: Vec::new(),
            distillate_composition: Vec::new(),
            bottoms_composition: Vec::new(),
            distillate_rate: 0.0,
            bottoms_rate: 0.0,
            recoveries: Vec::new(),
            condenser_duty: 0.0,
            reboiler_duty: 0.0,
            method_used: None,
            warnings: Vec::new(),
            sizing: None,
            error: Some(message),
        }
    }
}

/// Index map of the packed unknown vector.
#[derive(Debug, Clone, Copy)]
struct Layout {
    stages: usize,
    components: usize,
}

impl Layout {
    fn len(&self) -> usize {
        self.stages * (2 * self.components + 3)
    }

    fn t(&self, j: usize) -> usize {
        j
    }

    fn x(&self, j: usize, i: usize) -> usize {
        self.stages + j * self.components + i
    }

    fn y(&self, j: usize, i: usize) -> usize {
        self.stages * (1 + self.components) + j * self.components + i
    }

    fn l(&self, j: usize) -> usize {
        self.stages * (1 + 2 * self.components) + j
    }

    fn v(&self, j: usize) -> usize {
        self.stages * (2 + 2 * self.components) + j
    }

    fn liquid<'v>(&self, values: &'v [f64], j: usize) -> &'v [f64] {
        &values[self.x(j, 0)..self.x(j, 0) + self.components]
    }

    fn vapor<'v>(&self, values: &'v [f64], j: usize) -> &'v [f64] {
        &values[self.y(j, 0)..self.y(j, 0) + self.components]
    }
}

/// MESH system of one column, borrowed from a single `solve_column` call.
struct Mesh<'a> {
    layout: Layout,
    records: &'a [Component],
    feed: &'a [f64],
    feed_flow: f64,
    feed_stage: usize,
    reflux_ratio: f64,
    distillate: f64,
    bottoms: f64,
    efficiency: f64,
    pressure: f64,
    feed_vapor_fraction: f64,
    engine: &'a PropertyEngine,
    model: VaporPressureModel,
    equilibrium: PhaseEquilibrium,
}

impl Mesh<'_> {
    fn k_values(&self, temperature: f64) -> Vec<f64> {
        self.engine.k_values(self.records, temperature, self.pressure, self.model)
    }

    /// Linear temperature and composition profiles between the feed-based
    /// end estimates, with uniform flows corrected at the ends.
    fn initial_guess(&self, feed_temperature: f64) -> Vec<f64> {
        let Layout { stages: n, components: nc } = self.layout;
        let mut guess = vec![0.0; self.layout.len()];

        let k_feed = self.k_values(feed_temperature);
        let by_volatility = |pick: fn(f64, f64) -> bool| {
            (0..nc).fold(0, |best, i| if pick(k_feed[i], k_feed[best]) { i } else { best })
        };
        let light = by_volatility(|a, b| a > b);
        let heavy = by_volatility(|a, b| a < b);

        for j in 0..n {
            let f = j as f64 / (n - 1) as f64;
            guess[self.layout.t(j)] = feed_temperature - 20.0 + 40.0 * f;

            let mut x: Vec<f64> = (0..nc)
                .map(|i| {
                    if light == heavy {
                        1.0
                    } else if i == light {
                        1.0 - 0.8 * f
                    } else if i == heavy {
                        0.8 * f
                    } else {
                        0.2 / (nc.saturating_sub(2).max(1)) as f64
                    }
                })
                .collect();
            normalize(&mut x);
            for (i, xi) in x.iter().enumerate() {
                guess[self.layout.x(j, i)] = *xi;
                guess[self.layout.y(j, i)] = *xi;
            }

            guess[self.layout.l(j)] = 0.7 * self.feed_flow;
            guess[self.layout.v(j)] = 0.6 * self.feed_flow;
        }

        guess[self.layout.l(0)] = self.reflux_ratio * self.distillate;
        guess[self.layout.v(n - 1)] = guess[self.layout.l(n - 1)] + self.bottoms;
        guess
    }

    fn residuals(&self, values: &[f64]) -> Vec<f64> {
        let lay = self.layout;
        let (n, nc) = (lay.stages, lay.components);
        let last = n - 1;
        let mut r = Vec::with_capacity(lay.len());

        for j in 0..n {
            let t = values[lay.t(j)];
            let k = self.k_values(t);
            let eta = if j == last { 1.0 } else { self.efficiency };

            // Material
            for i in 0..nc {
                let mut balance = -values[lay.l(j)] * values[lay.x(j, i)] - values[lay.v(j)] * values[lay.y(j, i)];
                if j > 0 {
                    balance += values[lay.l(j - 1)] * values[lay.x(j - 1, i)];
                }
                if j < last {
                    balance += values[lay.v(j + 1)] * values[lay.y(j + 1, i)];
                }
                if j == self.feed_stage {
                    balance += self.feed_flow * self.feed[i];
                }
                if j == 0 {
                    balance -= self.distillate * values[lay.x(0, i)];
                }
                if j == last {
                    balance -= self.bottoms * values[lay.x(last, i)];
                }
                r.push(balance);
            }

            // Equilibrium
            for i in 0..nc {
                let k_eff = 1.0 + eta * (k[i] - 1.0);
                r.push(values[lay.y(j, i)] - k_eff * values[lay.x(j, i)]);
            }

            // Summation and flow specifications
            let sum_x: f64 = lay.liquid(values, j).iter().sum();
            let sum_y: f64 = lay.vapor(values, j).iter().sum();
            if j == 0 {
                r.push(sum_x - 1.0);
                r.push(values[lay.l(0)] - self.reflux_ratio * self.distillate);
            } else if j == last {
                r.push(values[lay.l(last)]);
                r.push(sum_y - 1.0);
            } else {
                r.push(sum_x - 1.0);
                r.push(sum_y - 1.0);
            }

            // Heat
            if j == 0 {
                let bubble = self.equilibrium.bubble_point_of(self.records, lay.liquid(values, 0), self.pressure, t);
                r.push(t - bubble.temperature);
            } else if j == last {
                let dew = self.equilibrium.dew_point_of(self.records, lay.vapor(values, last), self.pressure, t);
                r.push(t - dew.temperature);
            } else {
                let feed_vapor = if j == self.feed_stage { self.feed_flow * self.feed_vapor_fraction } else { 0.0 };
                r.push(values[lay.v(j)] - values[lay.v(j + 1)] - feed_vapor);
            }
        }

        r
    }
}

/// Rigorous MESH column solver.
///
/// Holds a shared handle to the property engine; each call to
/// [`solve_column`](Self::solve_column) owns its stage profile, so one solver
/// can serve concurrent solves from several threads.
#[derive(Debug, Clone)]
pub struct RigorousColumn {
    engine: Arc<PropertyEngine>,
    config: ColumnSolverConfig,
}

impl RigorousColumn {
    /// Creates a solver with the default configuration.
    pub fn new(engine: Arc<PropertyEngine>) -> Self {
        Self { engine, config: ColumnSolverConfig::default() }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: ColumnSolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ColumnSolverConfig {
        &self.config
    }

    /// Solves the column.
    ///
    /// Never fails: invalid specifications and solver breakdowns come back
    /// as a solution with [`ColumnStatus::Failed`] and `error` set.
    pub fn solve_column(&self, spec: &ColumnSpecification) -> ColumnSolution {
        tracing::info!(
            stages = spec.stages,
            feed_stage = spec.feed_stage,
            components = spec.components.len(),
            "solving column"
        );
        match self.try_solve(spec) {
            Ok(solution) => {
                tracing::info!(
                    status = ?solution.status,
                    iterations = solution.iterations,
                    residual = solution.residual_norm,
                    "column solve finished"
                );
                solution
            }
            Err(err) => {
                tracing::warn!(error = %err, "column solve failed");
                ColumnSolution::failed(err.to_string())
            }
        }
    }

    fn try_solve(&self, spec: &ColumnSpecification) -> Result<ColumnSolution, ColumnError> {
        spec.validate()?;

        let resolved = self.engine.resolve(&spec.components);
        let records = &resolved.components;
        let mut warnings = resolved.warnings.clone();
        let pressure = spec.column_pressure();
        let z = &spec.feed_composition;

        let feed = Mixture::new(records, z, spec.feed_temperature, spec.feed_pressure);
        let feed_props = self.engine.mixture_properties(&feed, spec.method)?;
        warnings.extend(feed_props.warnings);

        let k_feed = self.engine.k_values(records, spec.feed_temperature, pressure, self.config.vapor_pressure);
        let feed_vapor_fraction = rachford_rice(z, &k_feed).vapor_fraction;

        let equilibrium = PhaseEquilibrium::new(self.engine.clone()).with_config(
            EquilibriumConfig::new()
                .with_tolerance(1e-12)
                .with_temperature_step(0.01)
                .with_vapor_pressure(self.config.vapor_pressure),
        );

        let mesh = Mesh {
            layout: Layout { stages: spec.stages, components: spec.components.len() },
            records,
            feed: z,
            feed_flow: spec.feed_flow,
            feed_stage: spec.feed_stage - 1,
            reflux_ratio: spec.reflux_ratio,
            distillate: spec.distillate_rate,
            bottoms: spec.bottoms_rate(),
            efficiency: spec.tray_efficiency,
            pressure,
            feed_vapor_fraction,
            engine: &self.engine,
            model: self.config.vapor_pressure,
            equilibrium,
        };

        let solver = SteadyStateSolver::new(
            SolverConfig::new()
                .with_tolerance(self.config.tolerance)
                .with_max_iterations(self.config.max_iterations),
        );
        let initial = mesh.initial_guess(spec.feed_temperature);
        let solution = solver.solve(|v| mesh.residuals(v), &initial)?;

        let lay = mesh.layout;
        let values = &solution.x;
        let stages: Vec<StageState> = (0..lay.stages)
            .map(|j| StageState {
                stage: j + 1,
                temperature: values[lay.t(j)],
                liquid_composition: lay.liquid(values, j).to_vec(),
                vapor_composition: lay.vapor(values, j).to_vec(),
                liquid_flow: values[lay.l(j)],
                vapor_flow: values[lay.v(j)],
            })
            .collect();

        let last = lay.stages - 1;
        let distillate_composition = stages[0].liquid_composition.clone();
        let bottoms_composition = stages[last].liquid_composition.clone();
        let recoveries = distillate_composition
            .iter()
            .zip(z)
            .map(|(xd, zi)| if *zi > 0.0 { spec.distillate_rate * xd / (spec.feed_flow * zi) } else { 0.0 })
            .collect();

        // kmol/h * J/mol -> kW
        let to_kw = self.config.latent_heat / 3600.0;
        let condenser_duty = -stages[1].vapor_flow * to_kw;
        let reboiler_duty = stages[last].vapor_flow * to_kw;

        let (status, error) = if solution.converged {
            (ColumnStatus::Converged, None)
        } else {
            tracing::warn!(
                iterations = solution.stats.iterations,
                residual = solution.stats.final_residual,
                "column did not converge"
            );
            let message = format!(
                "MESH equations did not converge after {} iterations (residual {:.3e})",
                solution.stats.iterations, solution.stats.final_residual
            );
            (ColumnStatus::NotConverged, Some(message))
        };

        let sizing = (self.config.compute_sizing && solution.converged)
            .then(|| self.size(records, &stages, pressure, &self.config.design));

        Ok(ColumnSolution {
            status,
            converged: solution.converged,
            iterations: solution.stats.iterations,
            residual_norm: solution.stats.final_residual,
            distillate_composition,
            bottoms_composition,
            distillate_rate: spec.distillate_rate,
            bottoms_rate: spec.bottoms_rate(),
            recoveries,
            condenser_duty,
            reboiler_duty,
            method_used: Some(feed_props.method),
            warnings,
            sizing,
            error,
            stages,
        })
    }

    /// Sizes from the largest stage flows (at least two stages), ideal-gas vapor density at the top
    /// and Rackett liquid density at the bottom.
    fn size(&self, records: &[Component], stages: &[StageState], pressure: f64, design: &ColumnDesign) -> ColumnSizing {
        let (top, bottom) = (&stages[0], &stages[stages.len() - 1]);
        let molecular_weight =
            |x: &[f64]| -> f64 { records.iter().zip(x).map(|(c, xi)| c.molecular_weight * xi).sum() };

        let vapor = Mixture::new(records, &top.vapor_composition, top.temperature, pressure);
        let vapor_density = self
            .engine
            .mixture_properties(&vapor, PropertyMethod::Ideal)
            .map(|props| props.density)
            .unwrap_or(f64::NAN);
        let liquid_density =
            self.engine.liquid_density(records, &bottom.liquid_composition, bottom.temperature);

        let input = SizingInput {
            vapor_flow: stages.iter().map(|s| s.vapor_flow).fold(0.0, f64::max),
            liquid_flow: stages.iter().map(|s| s.liquid_flow).fold(0.0, f64::max),
            vapor_molecular_weight: molecular_weight(&top.vapor_composition),
            liquid_molecular_weight: molecular_weight(&bottom.liquid_composition),
            vapor_density,
            liquid_density,
            pressure,
            temperature: top.temperature,
            stages: stages.len(),
        };
        size_column(&input, design)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use approx::assert_abs_diff_eq;

    fn engine() -> Arc<PropertyEngine> {
        Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())))
    }

    fn benzene_toluene() -> ColumnSpecification {
        ColumnSpecification::new(vec!["benzene".to_string(), "toluene".to_string()], 100.0, vec![0.5, 0.5])
            .with_feed_conditions(368.15, 101325.0)
            .with_stages(20, 10)
            .with_reflux_ratio(2.5)
            .with_distillate_rate(50.0)
    }

    #[test]
    fn test_layout_indices_are_disjoint() {
        let layout = Layout { stages: 3, components: 2 };
        let mut seen = vec![false; layout.len()];
        for j in 0..3 {
            let mut indices = vec![layout.t(j), layout.l(j), layout.v(j)];
            for i in 0..2 {
                indices.push(layout.x(j, i));
                indices.push(layout.y(j, i));
            }
            for index in indices {
                assert!(!seen[index]);
                seen[index] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_tray_efficiency_applies_above_the_reboiler() {
        let engine = engine();
        let spec = benzene_toluene();
        let solution = RigorousColumn::new(engine.clone()).solve_column(&spec);
        assert!(solution.converged);

        let records = engine.resolve(&spec.components).components;
        let k_at = |stage: &StageState| engine.k_values(&records, stage.temperature, 101325.0, VaporPressureModel::Antoine);

        let condenser = &solution.stages[0];
        for ((y, x), k) in condenser.vapor_composition.iter().zip(&condenser.liquid_composition).zip(k_at(condenser)) {
            assert_abs_diff_eq!(*y, (1.0 + 0.75 * (k - 1.0)) * x, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(condenser.vapor_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-6);

        let reboiler = &solution.stages[19];
        for ((y, x), k) in reboiler.vapor_composition.iter().zip(&reboiler.liquid_composition).zip(k_at(reboiler)) {
            assert_abs_diff_eq!(*y, k * x, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(reboiler.liquid_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_benzene_toluene_column() {
        let spec = benzene_toluene();
        let solution = RigorousColumn::new(engine()).solve_column(&spec);

        assert!(solution.converged, "{:?}", solution.error);
        assert_eq!(solution.status, ColumnStatus::Converged);
        assert!(solution.iterations <= 100);
        assert!(solution.residual_norm < 1e-6);
        assert_eq!(solution.stages.len(), 20);
        assert!(solution.distillate_composition[0] > 0.5);
        assert!(solution.distillate_composition[0] > 0.9);
        assert!(solution.bottoms_composition[0] < 0.1);
        assert_eq!(solution.method_used, Some(PropertyMethod::PengRobinson));

        // Temperature rises down the column
        assert!(solution.stages[0].temperature < solution.stages[19].temperature);
        for stage in &solution.stages {
            assert_abs_diff_eq!(stage.liquid_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
        }
        assert!(solution.condenser_duty < 0.0);
        assert!(solution.reboiler_duty > 0.0);
    }

    #[test]
    fn test_duties_are_in_kilowatts() {
        let solution = RigorousColumn::new(engine()).solve_column(&benzene_toluene());
        assert!(solution.converged);

        // V2 = (R + 1) D = 175 kmol/h, 175 kmol/h * 35 kJ/mol = 1701.4 kW
        assert_abs_diff_eq!(solution.stages[1].vapor_flow, 175.0, epsilon = 1e-4);
        assert_abs_diff_eq!(solution.condenser_duty, -175.0 * 35_000.0 / 3600.0, epsilon = 1e-2);
        assert_abs_diff_eq!(
            solution.reboiler_duty,
            solution.stages[19].vapor_flow * 35_000.0 / 3600.0,
            epsilon = 1e-9
        );
        assert!(solution.condenser_duty < -1000.0);
    }

    #[test]
    fn test_component_mass_balance_closes() {
        let spec = benzene_toluene();
        let solution = RigorousColumn::new(engine()).solve_column(&spec);
        assert!(solution.converged);

        for i in 0..2 {
            let feed = spec.feed_flow * spec.feed_composition[i];
            let products = solution.distillate_rate * solution.distillate_composition[i]
                + solution.bottoms_rate * solution.bottoms_composition[i];
            assert!((products - feed).abs() <= 0.01 * feed, "component {}", i);
        }
        assert!(solution.recoveries[0] > 0.5 && solution.recoveries[0] <= 1.0 + 1e-6);
        assert_abs_diff_eq!(
            solution.recoveries[0],
            50.0 * solution.distillate_composition[0] / 50.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_invalid_specification_gives_failed_result() {
        let column = RigorousColumn::new(engine());

        let bad_stage = benzene_toluene().with_stages(20, 0);
        let solution = column.solve_column(&bad_stage);
        assert_eq!(solution.status, ColumnStatus::Failed);
        assert!(!solution.converged);
        assert!(solution.error.unwrap().contains("feed stage"));

        let mut bad_composition = benzene_toluene();
        bad_composition.feed_composition = vec![0.7, 0.7];
        let solution = column.solve_column(&bad_composition);
        assert_eq!(solution.status, ColumnStatus::Failed);
        assert!(solution.error.unwrap().contains("Invalid composition"));

        let too_much_distillate = benzene_toluene().with_distillate_rate(150.0);
        assert_eq!(column.solve_column(&too_much_distillate).status, ColumnStatus::Failed);
    }

    #[test]
    fn test_iteration_budget_reports_not_converged() {
        let column = RigorousColumn::new(engine()).with_config(ColumnSolverConfig::new().with_max_iterations(1));
        let solution = column.solve_column(&benzene_toluene());

        assert_eq!(solution.status, ColumnStatus::NotConverged);
        assert!(!solution.converged);
        assert_eq!(solution.stages.len(), 20);
        assert!(solution.error.unwrap().contains("did not converge"));
    }

    #[test]
    fn test_sizing_on_request() {
        let column = RigorousColumn::new(engine()).with_config(ColumnSolverConfig::new().with_sizing(ColumnDesign::default()));
        let solution = column.solve_column(&benzene_toluene());
        assert!(solution.converged);

        let sizing = solution.sizing.unwrap();
        assert!(sizing.error.is_none(), "{:?}", sizing.error);
        assert!(sizing.tower_diameter > 0.5 && sizing.tower_diameter < 5.0);
        assert_abs_diff_eq!(sizing.tower_height, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_concurrent_solves_share_engine() {
        let column = RigorousColumn::new(engine());
        let specs = [benzene_toluene(), benzene_toluene().with_reflux_ratio(3.0)];

        let solutions: Vec<ColumnSolution> = std::thread::scope(|scope| {
            let handles: Vec<_> = specs.iter().map(|spec| scope.spawn(|| column.solve_column(spec))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(solutions.iter().all(|s| s.converged));
        assert!(solutions[1].distillate_composition[0] > solutions[0].distillate_composition[0]);
    }

    #[test]
    fn test_specification_from_json_uses_defaults() {
        let json = r#"{
            "components": ["benzene", "toluene"],
            "feed_flow": 100.0,
            "feed_composition": [0.5, 0.5],
            "feed_temperature": 368.15,
            "feed_stage": 10,
            "stages": 20,
            "reflux_ratio": 2.5,
            "distillate_rate": 50.0
        }"#;
        let spec: ColumnSpecification = serde_json::from_str(json).unwrap();

        assert_eq!(spec.tray_efficiency, 0.75);
        assert_eq!(spec.feed_pressure, 101325.0);
        assert_eq!(spec.column_pressure(), 101325.0);
        assert_eq!(spec.method, PropertyMethod::PengRobinson);
        assert_eq!(spec, benzene_toluene());
    }

    #[test]
    fn test_failed_solution_serializes_status() {
        let solution = ColumnSolution::failed("boom".to_string());
        let json = serde_json::to_value(&solution).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["converged"], false);
        assert_eq!(json["error"], "boom");
    }
}
