//! Peng-Robinson and Soave-Redlich-Kwong equations of state.
//!
//! Both are written in the generic two-parameter cubic form
//!
//! P = RT / (v - b) - a(T) / ((v + δ1 b)(v + δ2 b))
//!
//! with δ1 = 1 + √2, δ2 = 1 - √2 for Peng-Robinson and δ1 = 1, δ2 = 0 for SRK.
//! Pure-component parameters follow from the critical constants and acentric
//! factor; mixtures use van der Waals one-fluid mixing with k_ij = 0, for which
//! a_mix = (Σ x_i √a_i)².
//!
//! The temperature derivative of a(T) needed for the residual enthalpy is
//! evaluated exactly with dual numbers.

use std::f64::consts::{PI, SQRT_2};

use num_dual::{Dual64, DualNum};

use super::flash::{FlashResult, RachfordRice, normalize, rachford_rice};
use super::ideal;
use super::{
    GAS_CONSTANT, Mixture, MixtureProperties, Phase, PropertyMethod, PropertyStrategy, ThermoError, ThermoResult,
};
use crate::catalog::Component;

const MAX_FLASH_ITERATIONS: usize = 200;
const FLASH_TOLERANCE: f64 = 1e-10;
const TRIVIAL_LN_K: f64 = 1e-4;

/// Cubic equation of state family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubicFamily {
    /// Peng-Robinson (1976)
    PengRobinson,
    /// Soave-Redlich-Kwong (1972)
    Srk,
}

impl CubicFamily {
    /// Family serving a property method, if any.
    pub fn for_method(method: PropertyMethod) -> Option<Self> {
        match method {
            PropertyMethod::PengRobinson => Some(CubicFamily::PengRobinson),
            PropertyMethod::Srk => Some(CubicFamily::Srk),
            _ => None,
        }
    }

    fn omega_a(self) -> f64 {
        match self {
            CubicFamily::PengRobinson => 0.45724,
            CubicFamily::Srk => 0.42748,
        }
    }

    fn omega_b(self) -> f64 {
        match self {
            CubicFamily::PengRobinson => 0.07780,
            CubicFamily::Srk => 0.08664,
        }
    }

    fn deltas(self) -> (f64, f64) {
        match self {
            CubicFamily::PengRobinson => (1.0 + SQRT_2, 1.0 - SQRT_2),
            CubicFamily::Srk => (1.0, 0.0),
        }
    }

    fn kappa(self, omega: f64) -> f64 {
        match self {
            CubicFamily::PengRobinson => 0.37464 + (1.54226 - 0.26992 * omega) * omega,
            CubicFamily::Srk => 0.480 + (1.574 - 0.176 * omega) * omega,
        }
    }
}

/// Which root of the cubic to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    /// Smallest root above the covolume
    Liquid,
    /// Largest root
    Vapor,
    /// Root with the lowest residual Gibbs energy
    Stable,
}

#[derive(Debug, Clone)]
struct Species {
    tc: f64,
    sqrt_ac: f64,
    b: f64,
    kappa: f64,
    pc: f64,
    omega: f64,
}

/// Cubic EOS parameterized for a set of components.
#[derive(Debug, Clone)]
pub struct CubicModel {
    family: CubicFamily,
    species: Vec<Species>,
}

impl CubicModel {
    /// Builds the model, `None` when a component lacks Tc, Pc or ω.
    pub fn new(family: CubicFamily, components: &[Component]) -> Option<Self> {
        if components.is_empty() {
            return None;
        }
        let species = components
            .iter()
            .map(|c| {
                let tc = c.critical_temperature?;
                let pc = c.critical_pressure?;
                let omega = c.acentric_factor?;
                let rtc = GAS_CONSTANT * tc;
                Some(Species {
                    tc,
                    sqrt_ac: (family.omega_a() * rtc * rtc / pc).sqrt(),
                    b: family.omega_b() * rtc / pc,
                    kappa: family.kappa(omega),
                    pc,
                    omega,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(CubicModel { family, species })
    }

    /// √a_i(T) = √a_c,i (1 + κ_i (1 - √(T/Tc,i)))
    fn sqrt_attraction<D: DualNum<f64> + Copy>(&self, species: &Species, temperature: D) -> D {
        ((temperature / species.tc).sqrt() * (-species.kappa) + (1.0 + species.kappa)) * species.sqrt_ac
    }

    /// Σ x_i √a_i(T), so that a_mix = S².
    fn attraction_sum<D: DualNum<f64> + Copy>(&self, x: &[f64], temperature: D) -> D {
        let first = self.sqrt_attraction(&self.species[0], temperature) * x[0];
        self.species
            .iter()
            .zip(x)
            .skip(1)
            .fold(first, |acc, (s, xi)| acc + self.sqrt_attraction(s, temperature) * *xi)
    }

    /// Mixture attraction parameter and its temperature derivative.
    pub fn attraction(&self, x: &[f64], temperature: f64) -> (f64, f64) {
        let a = self.attraction_sum(x, Dual64::from(temperature).derivative()).powi(2);
        (a.re, a.eps)
    }

    fn covolume(&self, x: &[f64]) -> f64 {
        self.species.iter().zip(x).map(|(s, xi)| xi * s.b).sum()
    }

    /// Real roots of the cubic in Z above the covolume, ascending.
    fn roots(&self, a: f64, b: f64, temperature: f64, pressure: f64) -> (Vec<f64>, f64, f64) {
        let rt = GAS_CONSTANT * temperature;
        let big_a = a * pressure / (rt * rt);
        let big_b = b * pressure / rt;
        let (d1, d2) = self.family.deltas();

        let c2 = (d1 + d2 - 1.0) * big_b - 1.0;
        let c1 = big_a + d1 * d2 * big_b * big_b - (d1 + d2) * big_b * (big_b + 1.0);
        let c0 = -(big_a * big_b + d1 * d2 * big_b * big_b * (big_b + 1.0));

        let mut roots: Vec<f64> = cubic_roots(c2, c1, c0).into_iter().filter(|z| *z > big_b).collect();
        roots.sort_by(f64::total_cmp);
        roots.dedup_by(|p, q| (*p - *q).abs() < 1e-12);
        (roots, big_a, big_b)
    }

    fn ln_phi_at(&self, x: &[f64], e: &Evaluation, temperature: f64) -> Vec<f64> {
        let (d1, d2) = self.family.deltas();
        let s = self.attraction_sum(x, temperature);
        let log_term = ((e.z + d1 * e.big_b) / (e.z + d2 * e.big_b)).ln();
        let prefactor = e.big_a / (e.big_b * (d1 - d2));

        self.species
            .iter()
            .map(|sp| {
                let bi_b = sp.b / e.b;
                let partial = 2.0 * self.sqrt_attraction(sp, temperature) * s / e.a;
                bi_b * (e.z - 1.0) - (e.z - e.big_b).ln() - prefactor * (partial - bi_b) * log_term
            })
            .collect()
    }

    fn select_root(&self, x: &[f64], temperature: f64, pressure: f64, root: Root) -> Option<Evaluation> {
        let (a, _) = self.attraction(x, temperature);
        let b = self.covolume(x);
        if a <= 0.0 || b <= 0.0 {
            return None;
        }
        let (roots, big_a, big_b) = self.roots(a, b, temperature, pressure);

        let at = |z: f64| Evaluation { z, a, b, big_a, big_b };

        match root {
            Root::Liquid => roots.first().map(|z| at(*z)),
            Root::Vapor => roots.last().map(|z| at(*z)),
            Root::Stable => {
                let gibbs = |z: f64| -> f64 {
                    let ln_phi = self.ln_phi_at(x, &at(z), temperature);
                    x.iter().zip(&ln_phi).map(|(xi, lp)| xi * lp).sum()
                };
                roots.iter().copied().min_by(|p, q| gibbs(*p).total_cmp(&gibbs(*q))).map(at)
            }
        }
    }

    /// Compressibility factor Z = Pv/RT of the selected root.
    pub fn compressibility(&self, x: &[f64], temperature: f64, pressure: f64, root: Root) -> Option<f64> {
        self.select_root(x, temperature, pressure, root).map(|e| e.z)
    }

    /// ln φ_i of every component on the selected root.
    ///
    /// ln φ_i = (b_i/b)(Z - 1) - ln(Z - B)
    ///          - A / (B (δ1 - δ2)) (2 Σ_j x_j a_ij / a - b_i/b) ln((Z + δ1 B)/(Z + δ2 B))
    pub fn ln_fugacity_coefficients(&self, x: &[f64], temperature: f64, pressure: f64, root: Root) -> Option<Vec<f64>> {
        let e = self.select_root(x, temperature, pressure, root)?;
        let ln_phi = self.ln_phi_at(x, &e, temperature);
        ln_phi.iter().all(|v| v.is_finite()).then_some(ln_phi)
    }

    /// Residual molar enthalpy H - H_ig [J/mol] on the selected root.
    ///
    /// H_res = RT(Z - 1) + (T da/dT - a) / (b (δ1 - δ2)) ln((Z + δ1 B)/(Z + δ2 B))
    pub fn residual_enthalpy(&self, x: &[f64], temperature: f64, pressure: f64, root: Root) -> Option<f64> {
        let e = self.select_root(x, temperature, pressure, root)?;
        let (_, dadt) = self.attraction(x, temperature);
        let (d1, d2) = self.family.deltas();
        let log_term = ((e.z + d1 * e.big_b) / (e.z + d2 * e.big_b)).ln();
        let h = GAS_CONSTANT * temperature * (e.z - 1.0) + (temperature * dadt - e.a) / (e.b * (d1 - d2)) * log_term;
        h.is_finite().then_some(h)
    }

    /// Wilson correlation K-values, the usual flash starting point.
    pub fn wilson_k_values(&self, temperature: f64, pressure: f64) -> Vec<f64> {
        self.species
            .iter()
            .map(|s| s.pc / pressure * (5.373 * (1.0 + s.omega) * (1.0 - s.tc / temperature)).exp())
            .collect()
    }

    /// Isothermal flash by successive substitution on fugacity ratios.
    pub fn flash(&self, mixture: &Mixture<'_>, method: PropertyMethod) -> ThermoResult<FlashResult> {
        let z = mixture.mole_fractions;
        let (t, p) = (mixture.temperature, mixture.pressure);
        let mut k = self.wilson_k_values(t, p);
        let mut converged = false;
        let mut iterations = 0;
        let mut change = f64::INFINITY;

        while iterations < MAX_FLASH_ITERATIONS {
            iterations += 1;
            let split = rachford_rice(z, &k);
            let v = split.vapor_fraction;
            let mut x: Vec<f64> = z.iter().zip(&k).map(|(zi, ki)| zi / (1.0 + v * (ki - 1.0))).collect();
            let mut y: Vec<f64> = x.iter().zip(&k).map(|(xi, ki)| ki * xi).collect();
            normalize(&mut x);
            normalize(&mut y);

            let failure = || ThermoError::ConvergenceFailure(format!("no valid cubic root at {} K, {} Pa", t, p));
            let ln_phi_l = self.ln_fugacity_coefficients(&x, t, p, Root::Liquid).ok_or_else(failure)?;
            let ln_phi_v = self.ln_fugacity_coefficients(&y, t, p, Root::Vapor).ok_or_else(failure)?;

            change = 0.0;
            for i in 0..k.len() {
                let ln_k = ln_phi_l[i] - ln_phi_v[i];
                change += (ln_k - k[i].ln()).powi(2);
                k[i] = ln_k.exp();
            }
            if change < FLASH_TOLERANCE {
                converged = true;
                break;
            }
        }

        let mut result = if k.iter().all(|ki| ki.ln().abs() < TRIVIAL_LN_K) {
            // Trivial solution: one phase, classified by packing fraction b/v
            let e = self
                .select_root(z, t, p, Root::Stable)
                .ok_or_else(|| ThermoError::ConvergenceFailure(format!("no valid cubic root at {} K, {} Pa", t, p)))?;
            let v = if e.big_b / e.z > 0.1 { 0.0 } else { 1.0 };
            let split = RachfordRice { vapor_fraction: v, root: None, residual: 0.0, iterations: 0, converged };
            FlashResult::from_split(mixture, k, split, method)
        } else {
            let split = rachford_rice(z, &k);
            FlashResult::from_split(mixture, k, split, method)
        };
        result.converged = converged;
        result.iterations = iterations;
        result.residual = change;
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy)]
struct Evaluation {
    z: f64,
    a: f64,
    b: f64,
    big_a: f64,
    big_b: f64,
}

/// Real roots of Z³ + c2 Z² + c1 Z + c0 = 0.
fn cubic_roots(c2: f64, c1: f64, c0: f64) -> Vec<f64> {
    let shift = -c2 / 3.0;
    let p = c1 - c2 * c2 / 3.0;
    let q = 2.0 * c2.powi(3) / 27.0 - c2 * c1 / 3.0 + c0;
    let discriminant = q * q / 4.0 + p.powi(3) / 27.0;

    let mut roots = if discriminant > 0.0 {
        let s = discriminant.sqrt();
        vec![(-q / 2.0 + s).cbrt() + (-q / 2.0 - s).cbrt() + shift]
    } else if p.abs() < f64::EPSILON {
        vec![(-q).cbrt() + shift]
    } else {
        let r = 2.0 * (-p / 3.0).sqrt();
        let phi = ((3.0 * q / (2.0 * p)) * (-3.0 / p).sqrt()).clamp(-1.0, 1.0).acos() / 3.0;
        (0..3).map(|k| r * (phi - 2.0 * PI * k as f64 / 3.0).cos() + shift).collect()
    };

    // Polish
    for z in roots.iter_mut() {
        for _ in 0..3 {
            let f = ((*z + c2) * *z + c1) * *z + c0;
            let df = (3.0 * *z + 2.0 * c2) * *z + c1;
            if df != 0.0 {
                *z -= f / df;
            }
        }
    }
    roots
}

struct PhaseState {
    z: f64,
    enthalpy: f64,
    heat_capacity: f64,
}

/// Native cubic EOS strategy (Peng-Robinson and SRK).
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicEos;

impl CubicEos {
    fn model(&self, method: PropertyMethod, components: &[Component]) -> ThermoResult<CubicModel> {
        let family = CubicFamily::for_method(method)
            .ok_or_else(|| ThermoError::PropertyNotAvailable(format!("{} is not a cubic method", method)))?;
        CubicModel::new(family, components)
            .ok_or_else(|| ThermoError::PropertyNotAvailable("critical constants missing".to_string()))
    }

    fn phase_state(&self, model: &CubicModel, mixture: &Mixture<'_>, x: &[f64], root: Root) -> ThermoResult<PhaseState> {
        let (t, p) = (mixture.temperature, mixture.pressure);
        let enthalpy_at = |t: f64| -> ThermoResult<f64> {
            let residual = model
                .residual_enthalpy(x, t, p, root)
                .ok_or_else(|| ThermoError::ConvergenceFailure(format!("no valid cubic root at {} K", t)))?;
            Ok(ideal::mixture_enthalpy(mixture.components, x, t) + residual)
        };

        let z = model
            .compressibility(x, t, p, root)
            .ok_or_else(|| ThermoError::ConvergenceFailure(format!("no valid cubic root at {} K", t)))?;
        let dt = 0.01;
        let heat_capacity = (enthalpy_at(t + dt)? - enthalpy_at(t - dt)?) / (2.0 * dt);
        Ok(PhaseState { z, enthalpy: enthalpy_at(t)?, heat_capacity })
    }
}

impl PropertyStrategy for CubicEos {
    fn name(&self) -> &'static str {
        "cubic-eos"
    }

    fn methods(&self) -> &'static [PropertyMethod] {
        &[PropertyMethod::PengRobinson, PropertyMethod::Srk]
    }

    fn supports(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> bool {
        CubicFamily::for_method(method).is_some() && mixture.components.iter().all(Component::has_critical_constants)
    }

    fn properties(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<MixtureProperties> {
        let model = self.model(method, mixture.components)?;
        let flash = model.flash(mixture, method)?;
        let (t, p) = (mixture.temperature, mixture.pressure);
        let molecular_weight = mixture.molecular_weight();
        let rt_p = GAS_CONSTANT * t / p;

        let (molar_volume, enthalpy, heat_capacity) = match flash.phase {
            Phase::TwoPhase => {
                let v = flash.vapor_fraction;
                let liquid = self.phase_state(&model, mixture, &flash.liquid_composition, Root::Liquid)?;
                let vapor = self.phase_state(&model, mixture, &flash.vapor_composition, Root::Vapor)?;
                (
                    rt_p * ((1.0 - v) * liquid.z + v * vapor.z),
                    (1.0 - v) * liquid.enthalpy + v * vapor.enthalpy,
                    (1.0 - v) * liquid.heat_capacity + v * vapor.heat_capacity,
                )
            }
            phase => {
                let root = if phase == Phase::Liquid { Root::Liquid } else { Root::Vapor };
                let state = self.phase_state(&model, mixture, mixture.mole_fractions, root)?;
                (rt_p * state.z, state.enthalpy, state.heat_capacity)
            }
        };

        let mut warnings = Vec::new();
        if !flash.converged {
            warnings.push(format!("{} flash did not converge; phase split is approximate", method));
        }

        Ok(MixtureProperties {
            temperature: t,
            pressure: p,
            mole_fractions: mixture.mole_fractions.to_vec(),
            method,
            molecular_weight,
            density: molecular_weight / 1000.0 / molar_volume,
            heat_capacity,
            enthalpy,
            entropy: None,
            phase: flash.phase,
            vapor_fraction: flash.vapor_fraction,
            viscosity: None,
            thermal_conductivity: None,
            warnings,
        })
    }

    fn phase_enthalpy(&self, method: PropertyMethod, mixture: &Mixture<'_>, phase: Phase) -> ThermoResult<f64> {
        let model = self.model(method, mixture.components)?;
        let root = match phase {
            Phase::Liquid => Root::Liquid,
            Phase::Vapor => Root::Vapor,
            Phase::TwoPhase | Phase::Supercritical => Root::Stable,
        };
        Ok(self.phase_state(&model, mixture, mixture.mole_fractions, root)?.enthalpy)
    }

    fn flash(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<FlashResult> {
        self.model(method, mixture.components)?.flash(mixture, method)
    }
}
