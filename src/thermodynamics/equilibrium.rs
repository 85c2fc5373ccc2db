//! Bubble and dew points and azeotrope detection.
//!
//! K-values come from a vapor-pressure correlation
//! ([`VaporPressureModel`]) evaluated through the [`PropertyEngine`]:
//!
//! - bubble temperature: Σ x_i K_i(T, P) = 1
//! - dew temperature: Σ y_i / K_i(T, P) = 1
//!
//! Temperature searches use a bounded Newton iteration with a finite-difference
//! slope. With Antoine K-values the bubble and dew pressures have closed forms;
//! otherwise they are found by successive substitution on P.
//!
//! Running out of iterations yields an [`EquilibriumPoint`] with
//! `converged == false` and an `error` message, not an `Err`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::flash::normalize;
use super::vapor_pressure::VaporPressureModel;
use super::{PropertyEngine, ThermoError, ThermoResult, validate_composition, validate_conditions};
use crate::catalog::Component;
use crate::solvers::scalar::{ScalarNewton, Step};

const MIN_DEW_K: f64 = 1e-10;
const AZEOTROPE_GRID_POINTS: usize = 100;
const AZEOTROPE_K_GAP: f64 = 0.01;
const AZEOTROPE_UNITY_GAP: f64 = 0.1;
const INITIAL_PRESSURE: f64 = 101325.0;

/// Settings for bubble and dew point searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumConfig {
    /// Tolerance on the summation residual
    pub tolerance: f64,
    /// Iteration budget of each search
    pub max_iterations: usize,
    /// Temperature bounds [K]
    pub temperature_bounds: (f64, f64),
    /// Finite-difference temperature step [K]
    pub temperature_step: f64,
    /// Searches stop when the residual slope falls to this value
    pub min_slope: f64,
    /// Starting temperature when none is supplied [K]
    pub temperature_guess: f64,
    /// Pressure bounds of the iterative pressure searches [Pa]
    pub pressure_bounds: (f64, f64),
    /// Vapor-pressure correlation for K-values
    pub vapor_pressure: VaporPressureModel,
}

impl Default for EquilibriumConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 50,
            temperature_bounds: (200.0, 800.0),
            temperature_step: 1.0,
            min_slope: 1e-10,
            temperature_guess: 350.0,
            pressure_bounds: (1e3, 1e7),
            vapor_pressure: VaporPressureModel::Antoine,
        }
    }
}

impl EquilibriumConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the summation tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the finite-difference temperature step.
    pub fn with_temperature_step(mut self, step: f64) -> Self {
        self.temperature_step = step;
        self
    }

    /// Sets the vapor-pressure correlation.
    pub fn with_vapor_pressure(mut self, model: VaporPressureModel) -> Self {
        self.vapor_pressure = model;
        self
    }

    fn temperature_search(&self) -> ScalarNewton {
        let (lower, upper) = self.temperature_bounds;
        ScalarNewton::new(lower, upper, self.tolerance)
            .with_max_iterations(self.max_iterations)
            .with_step(Step::Absolute(self.temperature_step))
            .with_min_slope(self.min_slope)
    }
}

/// A bubble or dew point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumPoint {
    /// Whether the summation residual met the tolerance
    pub converged: bool,
    /// Temperature [K]
    pub temperature: f64,
    /// Pressure [Pa]
    pub pressure: f64,
    /// Liquid mole fractions
    pub liquid_composition: Vec<f64>,
    /// Vapor mole fractions
    pub vapor_composition: Vec<f64>,
    /// K-values at the reported conditions
    pub k_values: Vec<f64>,
    /// Pure-component vapor pressures [Pa], reported by the analytic pressure routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapor_pressures: Option<Vec<f64>>,
    /// Iterations used
    pub iterations: usize,
    /// Final summation residual
    pub residual: f64,
    /// Synthetic-component substitutions
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Set when the search did not converge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Type of a detected azeotrope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AzeotropeKind {
    /// Found in the lower half of the searched range
    Minimum,
    /// Found in the upper half of the searched range
    Maximum,
}

/// A candidate azeotropic point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Azeotrope {
    /// Temperature [K]
    pub temperature: f64,
    /// Approximate composition [x1, x2]
    pub composition: Vec<f64>,
    /// K-values at the candidate point
    pub k_values: Vec<f64>,
    /// Boiling type
    pub kind: AzeotropeKind,
}

/// Outcome of an azeotrope search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AzeotropeSearch {
    /// Search ran over the whole grid
    Completed {
        /// Candidate points in order of temperature
        azeotropes: Vec<Azeotrope>,
        /// Searched temperature range [K]
        temperature_range: (f64, f64),
        /// Pressure [Pa]
        pressure: f64,
    },
    /// The system is not binary
    Unsupported {
        /// Why the search did not run
        reason: String,
    },
}

impl AzeotropeSearch {
    /// Candidate points, empty when unsupported.
    pub fn azeotropes(&self) -> &[Azeotrope] {
        match self {
            AzeotropeSearch::Completed { azeotropes, .. } => azeotropes,
            AzeotropeSearch::Unsupported { .. } => &[],
        }
    }
}

/// Bubble/dew point and azeotrope calculations.
#[derive(Debug, Clone)]
pub struct PhaseEquilibrium {
    engine: Arc<PropertyEngine>,
    config: EquilibriumConfig,
}

impl PhaseEquilibrium {
    /// Creates a solver with the default configuration.
    pub fn new(engine: Arc<PropertyEngine>) -> Self {
        Self { engine, config: EquilibriumConfig::default() }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: EquilibriumConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &EquilibriumConfig {
        &self.config
    }

    fn k_values(&self, records: &[Component], temperature: f64, pressure: f64) -> Vec<f64> {
        self.engine.k_values(records, temperature, pressure, self.config.vapor_pressure)
    }

    /// Bubble temperature of liquid `x` at pressure `pressure`.
    ///
    /// # Errors
    ///
    /// Validation errors only. Non-convergence is reported in the result.
    pub fn bubble_point<S: AsRef<str>>(
        &self,
        components: &[S],
        x: &[f64],
        pressure: f64,
        temperature_guess: Option<f64>,
    ) -> ThermoResult<EquilibriumPoint> {
        validate_composition(x, components.len())?;
        let guess = temperature_guess.unwrap_or(self.config.temperature_guess);
        validate_conditions(guess, pressure)?;
        let resolved = self.engine.resolve(components);
        let mut point = self.bubble_point_of(&resolved.components, x, pressure, guess);
        point.warnings = resolved.warnings;
        Ok(point)
    }

    /// Dew temperature of vapor `y` at pressure `pressure`.
    ///
    /// # Errors
    ///
    /// Validation errors only. Non-convergence is reported in the result.
    pub fn dew_point<S: AsRef<str>>(
        &self,
        components: &[S],
        y: &[f64],
        pressure: f64,
        temperature_guess: Option<f64>,
    ) -> ThermoResult<EquilibriumPoint> {
        validate_composition(y, components.len())?;
        let guess = temperature_guess.unwrap_or(self.config.temperature_guess);
        validate_conditions(guess, pressure)?;
        let resolved = self.engine.resolve(components);
        let mut point = self.dew_point_of(&resolved.components, y, pressure, guess);
        point.warnings = resolved.warnings;
        Ok(point)
    }

    /// Bubble temperature for resolved records without input validation.
    ///
    /// `x` need not sum exactly to one, which lets the column solver evaluate
    /// the condenser constraint at intermediate Newton iterates.
    pub fn bubble_point_of(&self, records: &[Component], x: &[f64], pressure: f64, guess: f64) -> EquilibriumPoint {
        let residual = |t: f64| -> f64 {
            let k = self.k_values(records, t, pressure);
            x.iter().zip(&k).map(|(xi, ki)| xi * ki).sum::<f64>() - 1.0
        };
        let search = self.config.temperature_search().solve(residual, guess);

        let k = self.k_values(records, search.root, pressure);
        let mut y: Vec<f64> = x.iter().zip(&k).map(|(xi, ki)| xi * ki).collect();
        normalize(&mut y);

        let error = (!search.converged).then(|| {
            tracing::warn!(temperature = search.root, iterations = search.iterations, "bubble point did not converge");
            format!("Bubble point did not converge after {} iterations", search.iterations)
        });

        EquilibriumPoint {
            converged: search.converged,
            temperature: search.root,
            pressure,
            liquid_composition: x.to_vec(),
            vapor_composition: y,
            k_values: k,
            vapor_pressures: None,
            iterations: search.iterations,
            residual: search.residual,
            warnings: Vec::new(),
            error,
        }
    }

    /// Dew temperature for resolved records without input validation.
    pub fn dew_point_of(&self, records: &[Component], y: &[f64], pressure: f64, guess: f64) -> EquilibriumPoint {
        let residual = |t: f64| -> f64 {
            let k = self.k_values(records, t, pressure);
            y.iter().zip(&k).map(|(yi, ki)| yi / ki.max(MIN_DEW_K)).sum::<f64>() - 1.0
        };
        let search = self.config.temperature_search().solve(residual, guess);

        let k = self.k_values(records, search.root, pressure);
        let mut x: Vec<f64> = y.iter().zip(&k).map(|(yi, ki)| yi / ki.max(MIN_DEW_K)).collect();
        normalize(&mut x);

        let error = (!search.converged).then(|| {
            tracing::warn!(temperature = search.root, iterations = search.iterations, "dew point did not converge");
            format!("Dew point did not converge after {} iterations", search.iterations)
        });

        EquilibriumPoint {
            converged: search.converged,
            temperature: search.root,
            pressure,
            liquid_composition: x,
            vapor_composition: y.to_vec(),
            k_values: k,
            vapor_pressures: None,
            iterations: search.iterations,
            residual: search.residual,
            warnings: Vec::new(),
            error,
        }
    }

    /// Bubble pressure of liquid `x` at `temperature`.
    ///
    /// Antoine: P = Σ x_i P_sat,i. Otherwise P ← P Σ x_i K_i(T, P).
    pub fn bubble_pressure<S: AsRef<str>>(
        &self,
        components: &[S],
        x: &[f64],
        temperature: f64,
    ) -> ThermoResult<EquilibriumPoint> {
        validate_composition(x, components.len())?;
        validate_conditions(temperature, INITIAL_PRESSURE)?;
        let resolved = self.engine.resolve(components);
        let records = &resolved.components;

        let mut point = match self.saturation_pressures(records, temperature) {
            Some(psat) => {
                let pressure: f64 = x.iter().zip(&psat).map(|(xi, p)| xi * p).sum();
                let mut y: Vec<f64> = x.iter().zip(&psat).map(|(xi, p)| xi * p / pressure).collect();
                normalize(&mut y);
                analytic_point(temperature, pressure, x.to_vec(), y, psat)
            }
            None => self.substitute_pressure(records, temperature, |k, p| {
                let s: f64 = x.iter().zip(k).map(|(xi, ki)| xi * ki).sum();
                (p * s, s - 1.0)
            }),
        };
        if point.vapor_pressures.is_none() {
            let k = point.k_values.clone();
            point.liquid_composition = x.to_vec();
            point.vapor_composition = x.iter().zip(&k).map(|(xi, ki)| xi * ki).collect();
            normalize(&mut point.vapor_composition);
        }
        point.warnings = resolved.warnings;
        Ok(point)
    }

    /// Dew pressure of vapor `y` at `temperature`.
    ///
    /// Antoine: P = 1 / Σ (y_i / P_sat,i). Otherwise P ← P / Σ y_i / K_i(T, P).
    pub fn dew_pressure<S: AsRef<str>>(
        &self,
        components: &[S],
        y: &[f64],
        temperature: f64,
    ) -> ThermoResult<EquilibriumPoint> {
        validate_composition(y, components.len())?;
        validate_conditions(temperature, INITIAL_PRESSURE)?;
        let resolved = self.engine.resolve(components);
        let records = &resolved.components;

        let mut point = match self.saturation_pressures(records, temperature) {
            Some(psat) => {
                let pressure = 1.0 / y.iter().zip(&psat).map(|(yi, p)| yi / p).sum::<f64>();
                let mut x: Vec<f64> = y.iter().zip(&psat).map(|(yi, p)| yi * pressure / p).collect();
                normalize(&mut x);
                analytic_point(temperature, pressure, x, y.to_vec(), psat)
            }
            None => self.substitute_pressure(records, temperature, |k, p| {
                let s: f64 = y.iter().zip(k).map(|(yi, ki)| yi / ki.max(MIN_DEW_K)).sum();
                (p / s, s - 1.0)
            }),
        };
        if point.vapor_pressures.is_none() {
            let k = point.k_values.clone();
            point.vapor_composition = y.to_vec();
            point.liquid_composition = y.iter().zip(&k).map(|(yi, ki)| yi / ki.max(MIN_DEW_K)).collect();
            normalize(&mut point.liquid_composition);
        }
        point.warnings = resolved.warnings;
        Ok(point)
    }

    /// Saturation pressures when the model is analytic and every record has data.
    fn saturation_pressures(&self, records: &[Component], temperature: f64) -> Option<Vec<f64>> {
        let model = self.config.vapor_pressure;
        if !model.is_analytic() {
            return None;
        }
        records
            .iter()
            .map(|c| model.saturation_pressure(c, temperature).filter(|p| p.is_finite() && *p > 0.0))
            .collect()
    }

    /// Successive substitution on pressure. `update` maps (K, P) to the next
    /// pressure and the summation residual.
    fn substitute_pressure<F>(&self, records: &[Component], temperature: f64, update: F) -> EquilibriumPoint
    where
        F: Fn(&[f64], f64) -> (f64, f64),
    {
        let (lower, upper) = self.config.pressure_bounds;
        let mut pressure = INITIAL_PRESSURE;
        let mut residual = f64::NAN;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let k = self.k_values(records, temperature, pressure);
            let (next, r) = update(&k, pressure);
            residual = r;
            if r.abs() < self.config.tolerance {
                converged = true;
                break;
            }
            if !next.is_finite() {
                break;
            }
            pressure = next.clamp(lower, upper);
        }

        let error = (!converged).then(|| {
            tracing::warn!(pressure, iterations, "saturation pressure did not converge");
            format!("Saturation pressure did not converge after {} iterations", iterations)
        });

        EquilibriumPoint {
            converged,
            temperature,
            pressure,
            liquid_composition: Vec::new(),
            vapor_composition: Vec::new(),
            k_values: self.k_values(records, temperature, pressure),
            vapor_pressures: None,
            iterations,
            residual,
            warnings: Vec::new(),
            error,
        }
    }

    /// Grid search for binary azeotropes.
    ///
    /// Flags temperatures where both K-values are close to each other and to
    /// unity, then estimates x1 = 1 / (1 + (K2 - 1)/(K1 - 1)). This is a
    /// screening heuristic, not a rigorous azeotrope calculation.
    pub fn azeotrope_search<S: AsRef<str>>(
        &self,
        components: &[S],
        pressure: f64,
        temperature_range: Option<(f64, f64)>,
    ) -> ThermoResult<AzeotropeSearch> {
        if components.len() != 2 {
            return Ok(AzeotropeSearch::Unsupported {
                reason: format!("Azeotrope search requires a binary system, got {} components", components.len()),
            });
        }
        let (low, high) = temperature_range.unwrap_or((250.0, 450.0));
        validate_conditions(low, pressure)?;
        if !(high.is_finite() && high > low) {
            return Err(ThermoError::InvalidInput(format!("invalid temperature range ({}, {})", low, high)));
        }

        let resolved = self.engine.resolve(components);
        let midpoint = 0.5 * (low + high);
        let step = (high - low) / (AZEOTROPE_GRID_POINTS - 1) as f64;

        let azeotropes = (0..AZEOTROPE_GRID_POINTS)
            .filter_map(|i| {
                let t = low + step * i as f64;
                let k = self.k_values(&resolved.components, t, pressure);
                let (k1, k2) = (k[0], k[1]);
                if (k1 - k2).abs() >= AZEOTROPE_K_GAP || (k1 - 1.0).abs() >= AZEOTROPE_UNITY_GAP {
                    return None;
                }
                let x1 = 1.0 / (1.0 + (k2 - 1.0) / (k1 - 1.0));
                let x1 = if x1.is_finite() { x1.clamp(0.0, 1.0) } else { 0.5 };
                let kind = if t < midpoint { AzeotropeKind::Minimum } else { AzeotropeKind::Maximum };
                Some(Azeotrope { temperature: t, composition: vec![x1, 1.0 - x1], k_values: k, kind })
            })
            .collect::<Vec<_>>();

        tracing::debug!(candidates = azeotropes.len(), pressure, "azeotrope search finished");
        Ok(AzeotropeSearch::Completed { azeotropes, temperature_range: (low, high), pressure })
    }
}

fn analytic_point(temperature: f64, pressure: f64, x: Vec<f64>, y: Vec<f64>, psat: Vec<f64>) -> EquilibriumPoint {
    let k = psat.iter().map(|p| p / pressure).collect();
    EquilibriumPoint {
        converged: true,
        temperature,
        pressure,
        liquid_composition: x,
        vapor_composition: y,
        k_values: k,
        vapor_pressures: Some(psat),
        iterations: 0,
        residual: 0.0,
        warnings: Vec::new(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn equilibrium() -> PhaseEquilibrium {
        PhaseEquilibrium::new(Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin()))))
    }

    const BT: [&str; 2] = ["benzene", "toluene"];

    #[test]
    fn test_bubble_and_dew_temperature() {
        let eq = equilibrium();
        let bubble = eq.bubble_point(&BT, &[0.5, 0.5], 101325.0, None).unwrap();
        let dew = eq.dew_point(&BT, &[0.5, 0.5], 101325.0, None).unwrap();

        assert!(bubble.converged && dew.converged);
        assert!(bubble.temperature > 362.0 && bubble.temperature < 368.0, "T_bubble = {}", bubble.temperature);
        assert!(dew.temperature > 369.0 && dew.temperature < 375.0, "T_dew = {}", dew.temperature);
        assert!(bubble.vapor_composition[0] > 0.5);
        assert!(dew.liquid_composition[0] < 0.5);
        assert!(bubble.residual.abs() < 1e-6);
    }

    #[test]
    fn test_bubble_below_dew_of_equilibrium_vapor() {
        let eq = equilibrium();
        for x1 in [0.05, 0.2, 0.5, 0.8, 0.95] {
            let x = [x1, 1.0 - x1];
            let bubble = eq.bubble_point(&BT, &x, 101325.0, None).unwrap();
            let dew = eq.dew_point(&BT, &bubble.vapor_composition, 101325.0, None).unwrap();

            assert!(bubble.converged && dew.converged);
            assert!(bubble.temperature <= dew.temperature + 1e-3, "x1 = {}", x1);
            assert_abs_diff_eq!(dew.liquid_composition[0], x1, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_bubble_point_budget_exhausted() {
        let eq = equilibrium().with_config(EquilibriumConfig::new().with_max_iterations(1));
        let point = eq.bubble_point(&BT, &[0.5, 0.5], 101325.0, Some(300.0)).unwrap();

        assert!(!point.converged);
        assert!(point.error.unwrap().contains("did not converge"));
    }

    #[test]
    fn test_bubble_point_rejects_bad_composition() {
        let eq = equilibrium();
        let result = eq.bubble_point(&BT, &[0.6, 0.6], 101325.0, None);
        assert!(matches!(result, Err(ThermoError::InvalidComposition(_))));
    }

    #[test]
    fn test_antoine_bubble_and_dew_pressure() {
        let eq = equilibrium();
        let bubble = eq.bubble_pressure(&BT, &[0.5, 0.5], 368.15).unwrap();
        let dew = eq.dew_pressure(&BT, &[0.5, 0.5], 368.15).unwrap();

        assert!(bubble.converged && dew.converged);
        assert_relative_eq!(bubble.pressure, 110_230.0, max_relative = 0.01);
        assert_relative_eq!(dew.pressure, 90_496.0, max_relative = 0.01);
        assert!(bubble.pressure > dew.pressure);

        let psat = bubble.vapor_pressures.unwrap();
        assert_relative_eq!(bubble.pressure, 0.5 * (psat[0] + psat[1]), max_relative = 1e-12);
    }

    #[test]
    fn test_riedel_pressure_by_substitution() {
        let eq = equilibrium().with_config(EquilibriumConfig::new().with_vapor_pressure(VaporPressureModel::Riedel));
        let bubble = eq.bubble_pressure(&BT, &[0.5, 0.5], 368.15).unwrap();
        let dew = eq.dew_pressure(&BT, &[0.5, 0.5], 368.15).unwrap();

        assert!(bubble.converged && dew.converged);
        assert!(bubble.vapor_pressures.is_none());
        assert!(bubble.pressure > dew.pressure);
        assert!(bubble.pressure > 5e4 && bubble.pressure < 2.5e5);
        assert_abs_diff_eq!(bubble.vapor_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_azeotrope_search_requires_binary() {
        let eq = equilibrium();
        let result = eq.azeotrope_search(&["benzene", "toluene", "water"], 101325.0, None).unwrap();
        assert!(matches!(result, AzeotropeSearch::Unsupported { .. }));
        assert!(result.azeotropes().is_empty());
    }

    #[test]
    fn test_azeotrope_search_ideal_system_has_none() {
        let eq = equilibrium();
        let result = eq.azeotrope_search(&BT, 101325.0, None).unwrap();
        assert!(matches!(result, AzeotropeSearch::Completed { .. }));
        assert!(result.azeotropes().is_empty());
    }

    #[test]
    fn test_azeotrope_search_flags_identical_volatility() {
        // Two unknown species share the default synthetic correlation
        let eq = equilibrium();
        let result = eq.azeotrope_search(&["twin_a", "twin_b"], 101325.0, None).unwrap();

        let found = result.azeotropes();
        assert!(!found.is_empty());
        for azeotrope in found {
            assert_abs_diff_eq!(azeotrope.composition[0], 0.5, epsilon = 1e-12);
            assert_eq!(azeotrope.kind, AzeotropeKind::Minimum);
        }
    }

    #[test]
    fn test_azeotrope_search_serializes_with_status_tag() {
        let result = AzeotropeSearch::Unsupported { reason: "ternary".to_string() };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "unsupported");
    }
}
