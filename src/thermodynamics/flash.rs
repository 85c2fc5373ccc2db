//! Vapor-liquid flash calculations.
//!
//! - [`rachford_rice`]: vapor fraction from feed composition and K-values
//! - [`FlashCalculator`]: isothermal (T-P), adiabatic (P-H), pressure (T-V)
//!   and an approximate three-phase flash on top of the [`PropertyEngine`]
//!
//! # Rachford-Rice
//!
//! For feed z and equilibrium ratios K the vapor fraction V solves
//!
//! f(V) = Σ z_i (K_i - 1) / (1 + V (K_i - 1)) = 0
//!
//! f is monotonically decreasing between the asymptotes 1/(1 - K_max) and
//! 1/(1 - K_min), so the root is bracketed whenever K_max > 1 > K_min.
//! Phase compositions follow from x_i = z_i / (1 + V (K_i - 1)), y_i = K_i x_i.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    Mixture, Phase, PropertyEngine, PropertyMethod, ThermoError, ThermoResult, validate_composition,
    validate_conditions,
};
use crate::catalog::Component;
use crate::solvers::scalar::{ScalarNewton, Step};

const RR_TOLERANCE: f64 = 1e-12;
const RR_MAX_ITERATIONS: usize = 100;

/// Solution of the Rachford-Rice equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RachfordRice {
    /// Physical vapor fraction, the root clamped to [0, 1]
    pub vapor_fraction: f64,
    /// Unconstrained root, `None` when every K lies on one side of unity
    pub root: Option<f64>,
    /// f at the root (or at the bound when there is none)
    pub residual: f64,
    /// Iterations used
    pub iterations: usize,
    /// Whether |residual| < 1e-6 or no root exists
    pub converged: bool,
}

fn rr_function(z: &[f64], k: &[f64], v: f64) -> f64 {
    z.iter().zip(k).map(|(zi, ki)| zi * (ki - 1.0) / (1.0 + v * (ki - 1.0))).sum()
}

fn rr_derivative(z: &[f64], k: &[f64], v: f64) -> f64 {
    -z.iter()
        .zip(k)
        .map(|(zi, ki)| {
            let d = 1.0 + v * (ki - 1.0);
            zi * (ki - 1.0) * (ki - 1.0) / (d * d)
        })
        .sum::<f64>()
}

/// Solves the Rachford-Rice equation with a bracketed Newton iteration.
///
/// When every K-value of the components present is at or below unity the feed
/// is a subcooled liquid (V = 0); at or above unity it is a superheated vapor
/// (V = 1). Otherwise the root between the asymptotes is returned, clamped to
/// [0, 1] for the physical vapor fraction.
pub fn rachford_rice(z: &[f64], k: &[f64]) -> RachfordRice {
    let present = z.iter().zip(k).filter(|(zi, _)| **zi > 0.0).map(|(_, ki)| *ki);
    let (k_min, k_max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), ki| (lo.min(ki), hi.max(ki)));

    if k_max <= 1.0 {
        let residual = rr_function(z, k, 0.0);
        return RachfordRice { vapor_fraction: 0.0, root: None, residual, iterations: 0, converged: true };
    }
    if k_min >= 1.0 {
        let residual = rr_function(z, k, 1.0);
        return RachfordRice { vapor_fraction: 1.0, root: None, residual, iterations: 0, converged: true };
    }

    let mut lower = 1.0 / (1.0 - k_max);
    let mut upper = 1.0 / (1.0 - k_min);
    let mut v = 0.5;
    let mut fv = rr_function(z, k, v);
    let mut iterations = 0;

    while iterations < RR_MAX_ITERATIONS && fv.abs() >= RR_TOLERANCE {
        iterations += 1;
        if fv > 0.0 {
            lower = v;
        } else {
            upper = v;
        }

        let newton = v - fv / rr_derivative(z, k, v);
        let next = if newton > lower && newton < upper { newton } else { 0.5 * (lower + upper) };
        if next == v {
            break;
        }
        v = next;
        fv = rr_function(z, k, v);
    }

    RachfordRice {
        vapor_fraction: v.clamp(0.0, 1.0),
        root: Some(v),
        residual: fv,
        iterations,
        converged: fv.abs() < 1e-6,
    }
}

/// Scales a vector so its entries sum to one (no-op for a zero vector).
pub(crate) fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

fn prepend_warnings(flash: &mut FlashResult, mut warnings: Vec<String>) {
    warnings.append(&mut flash.warnings);
    flash.warnings = warnings;
}

/// Outcome of an isothermal flash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashResult {
    /// Temperature [K]
    pub temperature: f64,
    /// Pressure [Pa]
    pub pressure: f64,
    /// Molar vapor fraction in [0, 1]
    pub vapor_fraction: f64,
    /// Liquid mole fractions (zeros when no liquid is present)
    pub liquid_composition: Vec<f64>,
    /// Vapor mole fractions (zeros when no vapor is present)
    pub vapor_composition: Vec<f64>,
    /// Equilibrium ratios y/x
    pub k_values: Vec<f64>,
    /// Phase label
    pub phase: Phase,
    /// Whether the split calculation converged
    pub converged: bool,
    /// Iterations used by the split calculation
    pub iterations: usize,
    /// Final residual of the split calculation
    pub residual: f64,
    /// Method that produced the result
    pub method: PropertyMethod,
    /// Substitutions and downgrades made along the way
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FlashResult {
    /// Builds phase compositions from a Rachford-Rice split.
    pub fn from_split(mixture: &Mixture<'_>, k_values: Vec<f64>, split: RachfordRice, method: PropertyMethod) -> Self {
        let z = mixture.mole_fractions;
        let n = z.len();
        let v = split.vapor_fraction;

        let (liquid, vapor, phase) = if v <= 0.0 {
            (z.to_vec(), vec![0.0; n], Phase::Liquid)
        } else if v >= 1.0 {
            (vec![0.0; n], z.to_vec(), Phase::Vapor)
        } else {
            let mut x: Vec<f64> = z.iter().zip(&k_values).map(|(zi, ki)| zi / (1.0 + v * (ki - 1.0))).collect();
            let mut y: Vec<f64> = x.iter().zip(&k_values).map(|(xi, ki)| ki * xi).collect();
            normalize(&mut x);
            normalize(&mut y);
            (x, y, Phase::TwoPhase)
        };

        FlashResult {
            temperature: mixture.temperature,
            pressure: mixture.pressure,
            vapor_fraction: v,
            liquid_composition: liquid,
            vapor_composition: vapor,
            k_values,
            phase,
            converged: split.converged,
            iterations: split.iterations,
            residual: split.residual,
            method,
            warnings: Vec::new(),
        }
    }
}

/// Outcome of an adiabatic (P-H) flash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdiabaticFlash {
    /// Flash at the final temperature
    pub flash: FlashResult,
    /// Final temperature [K]
    pub temperature: f64,
    /// Requested enthalpy [J/mol]
    pub enthalpy_target: f64,
    /// Mixture enthalpy at the final temperature [J/mol]
    pub enthalpy_calculated: f64,
    /// Whether |H - H_target| < 100 J/mol
    pub converged: bool,
    /// Newton iterations used
    pub iterations: usize,
    /// Set when the search did not converge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a pressure (T-V) flash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureFlash {
    /// Flash at the final pressure
    pub flash: FlashResult,
    /// Final pressure [Pa]
    pub pressure: f64,
    /// Requested vapor fraction
    pub vapor_fraction_target: f64,
    /// Whether |V - V_target| < 0.001
    pub converged: bool,
    /// Newton iterations used
    pub iterations: usize,
    /// Set when the search did not converge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Approximate liquid-liquid split reported by the three-phase flash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidSplit {
    /// Molar fraction of the first liquid
    pub liquid1_fraction: f64,
    /// Molar fraction of the second liquid
    pub liquid2_fraction: f64,
    /// First liquid composition (the two-phase liquid)
    pub liquid1_composition: Vec<f64>,
    /// Second liquid composition
    pub liquid2_composition: Vec<f64>,
    /// Describes the approximation
    pub note: String,
}

/// Outcome of a three-phase flash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreePhaseFlash {
    /// Number of phases present (1, 2 or 3)
    pub phases: usize,
    /// Underlying vapor-liquid flash
    pub flash: FlashResult,
    /// Liquid-liquid split when the immiscibility test fires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquid_split: Option<LiquidSplit>,
}

/// Flash calculations driven by the property engine.
///
/// ```
/// use std::sync::Arc;
/// use stagewise::catalog::ComponentCatalog;
/// use stagewise::thermodynamics::{PropertyEngine, PropertyMethod};
/// use stagewise::thermodynamics::flash::FlashCalculator;
///
/// let engine = Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())));
/// let flash = FlashCalculator::new(engine).with_method(PropertyMethod::Ideal);
/// let result = flash.isothermal_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 101325.0).unwrap();
/// assert!(result.vapor_fraction > 0.0 && result.vapor_fraction < 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct FlashCalculator {
    engine: Arc<PropertyEngine>,
    method: PropertyMethod,
}

impl FlashCalculator {
    /// Creates a calculator using the Peng-Robinson method.
    pub fn new(engine: Arc<PropertyEngine>) -> Self {
        FlashCalculator { engine, method: PropertyMethod::PengRobinson }
    }

    /// Sets the property method.
    pub fn with_method(mut self, method: PropertyMethod) -> Self {
        self.method = method;
        self
    }

    /// The property method requested by this calculator.
    pub fn method(&self) -> PropertyMethod {
        self.method
    }

    fn resolve<S: AsRef<str>>(&self, components: &[S], z: &[f64]) -> ThermoResult<(Vec<Component>, Vec<String>)> {
        validate_composition(z, components.len())?;
        let resolved = self.engine.resolve(components);
        Ok((resolved.components, resolved.warnings))
    }

    /// Flash at fixed temperature and pressure.
    pub fn isothermal_flash<S: AsRef<str>>(
        &self,
        components: &[S],
        z: &[f64],
        temperature: f64,
        pressure: f64,
    ) -> ThermoResult<FlashResult> {
        self.engine.flash(components, z, temperature, pressure, self.method)
    }

    /// Flash at fixed pressure and enthalpy.
    ///
    /// Newton iteration on temperature (ΔT = 1 K finite difference, bounds
    /// [200, 800] K, 50 iterations) until the mixture enthalpy is within
    /// 100 J/mol of `enthalpy`. The search brackets the sign change of
    /// H(T) - H_target and bisects when Newton overshoots, which happens
    /// across the steep two-phase window of an equation of state.
    ///
    /// Non-convergence is reported in the result. When the flash at the final
    /// temperature fails, the best converged evaluation of the search is
    /// returned instead.
    ///
    /// # Errors
    ///
    /// Validation errors, or [`ThermoError::ConvergenceFailure`] when no
    /// temperature visited produced a converged flash.
    pub fn adiabatic_flash<S: AsRef<str>>(
        &self,
        components: &[S],
        z: &[f64],
        enthalpy: f64,
        pressure: f64,
        temperature_guess: f64,
    ) -> ThermoResult<AdiabaticFlash> {
        validate_conditions(temperature_guess, pressure)?;
        if !enthalpy.is_finite() {
            return Err(ThermoError::InvalidInput(format!("target enthalpy must be finite, got {}", enthalpy)));
        }
        let (records, warnings) = self.resolve(components, z)?;
        let mixture = Mixture::new(&records, z, temperature_guess, pressure);

        let mut best = BestEstimate::default();
        let solver = ScalarNewton::new(200.0, 800.0, 100.0)
            .with_step(Step::Absolute(1.0))
            .with_min_slope(1e-6)
            .with_bracket_seeding();
        let search = solver.solve(
            |t| match self.flash_and_enthalpy(&mixture.at(t, pressure)) {
                Ok((flash, h)) => best.offer(t, h - enthalpy, flash, h),
                Err(_) => f64::NAN,
            },
            temperature_guess,
        );

        let (temperature, mut flash, enthalpy_calculated, converged) =
            match self.flash_and_enthalpy(&mixture.at(search.root, pressure)) {
                Ok((flash, h)) => (search.root, flash, h, search.converged),
                Err(err) => {
                    let (t, flash, h) = best.take().ok_or(err)?;
                    (t, flash, h, false)
                }
            };
        prepend_warnings(&mut flash, warnings);
        let error = (!converged).then(|| {
            tracing::warn!(temperature, iterations = search.iterations, "adiabatic flash did not converge");
            format!("Adiabatic flash did not converge after {} iterations", search.iterations)
        });

        Ok(AdiabaticFlash {
            flash,
            temperature,
            enthalpy_target: enthalpy,
            enthalpy_calculated,
            converged,
            iterations: search.iterations,
            error,
        })
    }

    /// Flash at fixed temperature and vapor fraction.
    ///
    /// Newton iteration on pressure (1 % finite difference, bounds
    /// [1e3, 1e7] Pa, 50 iterations) until the vapor fraction is within 0.001
    /// of `vapor_fraction`. The vapor fraction is flat at 0 or 1 outside the
    /// two-phase region, so both pressure bounds are flashed first and the
    /// search bisects toward the window from a guess on either side.
    ///
    /// Failures at the final pressure fall back to the best converged
    /// evaluation, as in [`adiabatic_flash`](Self::adiabatic_flash).
    pub fn pressure_flash<S: AsRef<str>>(
        &self,
        components: &[S],
        z: &[f64],
        temperature: f64,
        vapor_fraction: f64,
        pressure_guess: f64,
    ) -> ThermoResult<PressureFlash> {
        validate_conditions(temperature, pressure_guess)?;
        if !(0.0..=1.0).contains(&vapor_fraction) {
            return Err(ThermoError::InvalidInput(format!("vapor fraction must lie in [0, 1], got {}", vapor_fraction)));
        }
        let (records, warnings) = self.resolve(components, z)?;
        let mixture = Mixture::new(&records, z, temperature, pressure_guess);

        let mut best = BestEstimate::default();
        let solver = ScalarNewton::new(1e3, 1e7, 1e-3)
            .with_step(Step::Relative(0.01))
            .with_min_slope(1e-12)
            .with_bracket_seeding();
        let search = solver.solve(
            |p| match self.converged_flash(&mixture.at(temperature, p)) {
                Ok(flash) => {
                    let v = flash.vapor_fraction;
                    best.offer(p, v - vapor_fraction, flash, v)
                }
                Err(_) => f64::NAN,
            },
            pressure_guess,
        );

        let (pressure, mut flash, converged) = match self.converged_flash(&mixture.at(temperature, search.root)) {
            Ok(flash) => (search.root, flash, search.converged),
            Err(err) => {
                let (p, flash, _) = best.take().ok_or(err)?;
                (p, flash, false)
            }
        };
        prepend_warnings(&mut flash, warnings);
        let error = (!converged).then(|| {
            tracing::warn!(pressure, iterations = search.iterations, "pressure flash did not converge");
            format!("Pressure flash did not converge after {} iterations", search.iterations)
        });

        Ok(PressureFlash {
            flash,
            pressure,
            vapor_fraction_target: vapor_fraction,
            converged,
            iterations: search.iterations,
            error,
        })
    }

    /// Vapor-liquid flash followed by a heuristic liquid-liquid split.
    ///
    /// This is an approximation, not a VLLE solve: when 0.1 < V < 0.9 and any
    /// liquid mole fraction deviates from the feed by more than 0.3, the
    /// liquid is divided 60/40 and the second liquid composition is taken as
    /// x_i for x_i >= 0.5 and 1 - x_i otherwise.
    pub fn three_phase_flash<S: AsRef<str>>(
        &self,
        components: &[S],
        z: &[f64],
        temperature: f64,
        pressure: f64,
    ) -> ThermoResult<ThreePhaseFlash> {
        let flash = self.isothermal_flash(components, z, temperature, pressure)?;
        let v = flash.vapor_fraction;

        let immiscible = flash.liquid_composition.iter().zip(z).any(|(xi, zi)| (xi - zi).abs() > 0.3);
        if v > 0.1 && v < 0.9 && immiscible {
            let x = flash.liquid_composition.clone();
            let liquid2 = x.iter().map(|&xi| if xi < 0.5 { 1.0 - xi } else { xi }).collect();
            let split = LiquidSplit {
                liquid1_fraction: (1.0 - v) * 0.6,
                liquid2_fraction: (1.0 - v) * 0.4,
                liquid1_composition: x,
                liquid2_composition: liquid2,
                note: "Simplified three-phase calculation".to_string(),
            };
            return Ok(ThreePhaseFlash { phases: 3, flash, liquid_split: Some(split) });
        }

        let phases = if v > 0.0 && v < 1.0 { 2 } else { 1 };
        Ok(ThreePhaseFlash { phases, flash, liquid_split: None })
    }

    /// Mixture enthalpy consistent with a flash result [J/mol].
    ///
    /// (1 - V) H_L(x) + V H_V(y) for two-phase results, H(z) otherwise.
    pub fn mixture_enthalpy<S: AsRef<str>>(&self, components: &[S], z: &[f64], flash: &FlashResult) -> ThermoResult<f64> {
        let (records, _) = self.resolve(components, z)?;
        let mixture = Mixture::new(&records, z, flash.temperature, flash.pressure);
        self.enthalpy_of(&mixture, flash)
    }

    fn enthalpy_of(&self, mixture: &Mixture<'_>, flash: &FlashResult) -> ThermoResult<f64> {
        let v = flash.vapor_fraction;
        if v > 0.0 && v < 1.0 {
            let liquid = mixture.with_composition(&flash.liquid_composition);
            let vapor = mixture.with_composition(&flash.vapor_composition);
            let h_liquid = self.engine.phase_enthalpy(&liquid, Phase::Liquid, self.method)?;
            let h_vapor = self.engine.phase_enthalpy(&vapor, Phase::Vapor, self.method)?;
            Ok((1.0 - v) * h_liquid + v * h_vapor)
        } else {
            Ok(self.engine.mixture_properties(mixture, self.method)?.enthalpy)
        }
    }

    fn converged_flash(&self, mixture: &Mixture<'_>) -> ThermoResult<FlashResult> {
        let flash = self.engine.flash_mixture(mixture, self.method)?;
        if !flash.converged {
            return Err(ThermoError::ConvergenceFailure(format!(
                "flash at {} K, {} Pa",
                mixture.temperature, mixture.pressure
            )));
        }
        Ok(flash)
    }

    fn flash_and_enthalpy(&self, mixture: &Mixture<'_>) -> ThermoResult<(FlashResult, f64)> {
        let flash = self.converged_flash(mixture)?;
        let enthalpy = self.enthalpy_of(mixture, &flash)?;
        Ok((flash, enthalpy))
    }
}

/// Converged evaluation with the smallest residual seen during a search.
#[derive(Default)]
struct BestEstimate {
    residual: f64,
    estimate: Option<(f64, FlashResult, f64)>,
}

impl BestEstimate {
    /// Keeps the evaluation if it beats the current one; returns `residual`.
    fn offer(&mut self, at: f64, residual: f64, flash: FlashResult, value: f64) -> f64 {
        if self.estimate.is_none() || residual.abs() < self.residual.abs() {
            self.residual = residual;
            self.estimate = Some((at, flash, value));
        }
        residual
    }

    fn take(self) -> Option<(f64, FlashResult, f64)> {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use crate::thermodynamics::ideal::IdealGas;
    use crate::thermodynamics::{MixtureProperties, PropertyStrategy};
    use approx::assert_abs_diff_eq;

    const BT: [&str; 2] = ["benzene", "toluene"];

    fn calculator(method: PropertyMethod) -> FlashCalculator {
        let engine = Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())));
        FlashCalculator::new(engine).with_method(method)
    }

    /// Ideal-gas physics served as Peng-Robinson, with flashes that fail to
    /// converge above a temperature or pressure limit.
    #[derive(Debug)]
    struct Limited {
        max_temperature: f64,
        max_pressure: f64,
    }

    impl PropertyStrategy for Limited {
        fn name(&self) -> &'static str {
            "limited"
        }

        fn methods(&self) -> &'static [PropertyMethod] {
            &[PropertyMethod::PengRobinson]
        }

        fn properties(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<MixtureProperties> {
            IdealGas.properties(method, mixture)
        }

        fn phase_enthalpy(&self, method: PropertyMethod, mixture: &Mixture<'_>, phase: Phase) -> ThermoResult<f64> {
            IdealGas.phase_enthalpy(method, mixture, phase)
        }

        fn flash(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<FlashResult> {
            let mut result = IdealGas.flash(method, mixture)?;
            result.converged = mixture.temperature < self.max_temperature && mixture.pressure < self.max_pressure;
            Ok(result)
        }
    }

    fn limited(max_temperature: f64, max_pressure: f64) -> FlashCalculator {
        let catalog = Arc::new(ComponentCatalog::with_builtin());
        let engine = PropertyEngine::ideal_only(catalog).with_strategy(Box::new(Limited { max_temperature, max_pressure }));
        FlashCalculator::new(Arc::new(engine))
    }

    #[test]
    fn test_rachford_rice_symmetric_binary() {
        let split = rachford_rice(&[0.5, 0.5], &[2.0, 0.5]);
        assert!(split.converged);
        assert_abs_diff_eq!(split.vapor_fraction, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_rachford_rice_binary_residual_property() {
        for &k1 in &[1.05, 1.5, 3.0, 10.0, 150.0] {
            for &k2 in &[0.01, 0.1, 0.5, 0.95] {
                for &z1 in &[0.01, 0.2, 0.5, 0.8, 0.99] {
                    let z = [z1, 1.0 - z1];
                    let k = [k1, k2];
                    let split = rachford_rice(&z, &k);
                    let root = split.root.unwrap();
                    assert!(rr_function(&z, &k, root).abs() < 1e-6, "K = {:?}, z = {:?}", k, z);
                    assert!((0.0..=1.0).contains(&split.vapor_fraction));
                }
            }
        }
    }

    #[test]
    fn test_rachford_rice_single_phase() {
        let vapor = rachford_rice(&[0.3, 0.7], &[2.0, 1.5]);
        assert_eq!(vapor.vapor_fraction, 1.0);
        assert!(vapor.root.is_none());

        let liquid = rachford_rice(&[0.3, 0.7], &[0.9, 0.2]);
        assert_eq!(liquid.vapor_fraction, 0.0);

        // Absent component does not count
        let only_heavy = rachford_rice(&[0.0, 1.0], &[5.0, 0.4]);
        assert_eq!(only_heavy.vapor_fraction, 0.0);
    }

    #[test]
    fn test_ideal_isothermal_flash() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.isothermal_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 101325.0).unwrap();

        assert!(result.converged);
        assert_eq!(result.phase, Phase::TwoPhase);
        assert_eq!(result.method, PropertyMethod::Ideal);
        assert_abs_diff_eq!(result.vapor_fraction, 0.43, epsilon = 0.01);
        assert!(result.vapor_composition[0] > 0.5);
        assert!(result.liquid_composition[0] < 0.5);
        assert_abs_diff_eq!(result.liquid_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(result.vapor_composition.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_isothermal_flash_rejects_bad_composition() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.isothermal_flash(&["benzene", "toluene"], &[0.7, 0.7], 368.15, 101325.0);
        assert!(matches!(result, Err(ThermoError::InvalidComposition(_))));
    }

    #[test]
    fn test_adiabatic_flash_round_trip() {
        let flash = calculator(PropertyMethod::Ideal);
        let comps = ["benzene", "toluene"];
        let z = [0.5, 0.5];

        let reference = flash.isothermal_flash(&comps, &z, 370.0, 101325.0).unwrap();
        let target = flash.mixture_enthalpy(&comps, &z, &reference).unwrap();

        let result = flash.adiabatic_flash(&comps, &z, target, 101325.0, 330.0).unwrap();
        assert!(result.converged);
        assert!(result.error.is_none());

        let recomputed = flash.mixture_enthalpy(&comps, &z, &result.flash).unwrap();
        assert!((recomputed - target).abs() < 100.0);
        assert_abs_diff_eq!(result.temperature, 370.0, epsilon = 1.0);
    }

    #[test]
    fn test_adiabatic_flash_unreachable_target_reports_failure() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.adiabatic_flash(&["benzene", "toluene"], &[0.5, 0.5], 1e9, 101325.0, 350.0).unwrap();

        assert!(!result.converged);
        assert!(result.error.is_some());
        assert_eq!(result.temperature, 800.0);
    }

    #[test]
    fn test_pressure_flash() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.pressure_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 0.5, 101325.0).unwrap();

        assert!(result.converged);
        assert!((result.flash.vapor_fraction - 0.5).abs() < 1e-3);
        assert!(result.pressure > 90_000.0 && result.pressure < 110_300.0);
    }

    #[test]
    fn test_pressure_flash_rejects_bad_target() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.pressure_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 1.5, 101325.0);
        assert!(matches!(result, Err(ThermoError::InvalidInput(_))));
    }

    #[test]
    fn test_three_phase_flash_immiscible() {
        let flash = calculator(PropertyMethod::Ideal);
        let result = flash.three_phase_flash(&["methane", "water"], &[0.5, 0.5], 300.0, 101325.0).unwrap();

        assert_eq!(result.phases, 3);
        let split = result.liquid_split.unwrap();
        let liquid = 1.0 - result.flash.vapor_fraction;
        assert_abs_diff_eq!(split.liquid1_fraction, 0.6 * liquid, epsilon = 1e-12);
        assert_abs_diff_eq!(split.liquid2_fraction, 0.4 * liquid, epsilon = 1e-12);
        assert_eq!(split.note, "Simplified three-phase calculation");
    }

    #[test]
    fn test_three_phase_flash_miscible() {
        let flash = calculator(PropertyMethod::Ideal);
        let two = flash.three_phase_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 101325.0).unwrap();
        assert_eq!(two.phases, 2);
        assert!(two.liquid_split.is_none());

        let one = flash.three_phase_flash(&["benzene", "toluene"], &[0.5, 0.5], 300.0, 101325.0).unwrap();
        assert_eq!(one.phases, 1);
    }

    #[test]
    fn test_peng_robinson_adiabatic_round_trip() {
        let flash = calculator(PropertyMethod::PengRobinson);
        let z = [0.5, 0.5];

        // Subcooled liquid, two-phase and superheated vapor targets
        for (reference_temperature, guesses) in [(340.0, [300.0, 380.0]), (370.0, [330.0, 400.0]), (420.0, [380.0, 460.0])]
        {
            let reference = flash.isothermal_flash(&BT, &z, reference_temperature, 101325.0).unwrap();
            let target = flash.mixture_enthalpy(&BT, &z, &reference).unwrap();

            for guess in guesses {
                let result = flash.adiabatic_flash(&BT, &z, target, 101325.0, guess).unwrap();
                assert!(result.converged, "T_ref {} from {}: {:?}", reference_temperature, guess, result.error);
                assert!(result.iterations <= 50);
                assert_eq!(result.flash.method, PropertyMethod::PengRobinson);

                let recomputed = flash.mixture_enthalpy(&BT, &z, &result.flash).unwrap();
                assert!((recomputed - target).abs() < 100.0, "T_ref {} from {}", reference_temperature, guess);
                assert_abs_diff_eq!(result.temperature, reference_temperature, epsilon = 1.0);
            }
        }
    }

    #[test]
    fn test_adiabatic_flash_falls_back_to_best_converged_estimate() {
        let reference = calculator(PropertyMethod::Ideal);
        let z = [0.5, 0.5];
        let hot = reference.isothermal_flash(&BT, &z, 370.0, 101325.0).unwrap();
        let target = reference.mixture_enthalpy(&BT, &z, &hot).unwrap();

        // Flashes stop converging at 360 K, short of the target temperature
        let flash = limited(360.0, f64::INFINITY);
        let result = flash.adiabatic_flash(&BT, &z, target, 101325.0, 340.0).unwrap();

        assert!(!result.converged);
        assert!(result.error.is_some());
        assert!(result.temperature < 360.0);
        assert!(result.flash.converged);
        assert!(result.enthalpy_calculated < target);
    }

    #[test]
    fn test_pressure_flash_falls_back_to_best_converged_estimate() {
        // The V = 0.5 pressure lies near 99.8 kPa, above the convergence limit
        let flash = limited(f64::INFINITY, 98_000.0);
        let result = flash.pressure_flash(&BT, &[0.5, 0.5], 368.15, 0.5, 95_000.0).unwrap();

        assert!(!result.converged);
        assert!(result.error.is_some());
        assert!(result.pressure < 98_000.0);
        assert!(result.flash.converged);
        assert!(result.flash.vapor_fraction > 0.5);
    }

    #[test]
    fn test_pressure_flash_from_single_phase_guesses() {
        for method in [PropertyMethod::Ideal, PropertyMethod::PengRobinson] {
            let flash = calculator(method);
            // Superheated at 50 kPa, subcooled at 200 kPa
            for guess in [50_000.0, 95_000.0, 105_000.0, 200_000.0] {
                let result = flash.pressure_flash(&BT, &[0.5, 0.5], 368.15, 0.5, guess).unwrap();

                assert!(result.converged, "{} from {} Pa: {:?}", method, guess, result.error);
                assert!((result.flash.vapor_fraction - 0.5).abs() < 1e-3);
                assert!(result.pressure > 90_000.0 && result.pressure < 110_300.0);
                assert_eq!(result.flash.method, method);
            }
        }
    }

    #[test]
    fn test_peng_robinson_three_phase_flash() {
        let flash = calculator(PropertyMethod::PengRobinson);

        let immiscible = flash.three_phase_flash(&["methane", "water"], &[0.5, 0.5], 300.0, 101325.0).unwrap();
        assert_eq!(immiscible.flash.method, PropertyMethod::PengRobinson);
        assert_eq!(immiscible.phases, 3);
        let split = immiscible.liquid_split.unwrap();
        let liquid = 1.0 - immiscible.flash.vapor_fraction;
        assert_abs_diff_eq!(split.liquid1_fraction + split.liquid2_fraction, liquid, epsilon = 1e-12);

        let two = flash.three_phase_flash(&BT, &[0.5, 0.5], 368.15, 101325.0).unwrap();
        assert_eq!(two.flash.method, PropertyMethod::PengRobinson);
        assert_eq!(two.phases, 2);
        assert!(two.liquid_split.is_none());

        let one = flash.three_phase_flash(&BT, &[0.5, 0.5], 300.0, 101325.0).unwrap();
        assert_eq!(one.phases, 1);
    }
}
