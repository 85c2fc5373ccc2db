//! Vapor-pressure correlations and Raoult's-law K-values.
//!
//! K = P_sat(T) / P, with P_sat from either the Antoine equation (catalog
//! coefficients in mmHg and °C) or a simplified Riedel corresponding-states
//! estimate built from critical constants.

use serde::{Deserialize, Serialize};

use crate::catalog::Component;

/// Pressure of one mmHg [Pa].
pub const MMHG_TO_PA: f64 = 133.322;

/// Lower bound applied to every K-value.
pub const MIN_K_VALUE: f64 = 1e-3;

/// Upper bound applied to every K-value, keeps residuals finite when a
/// correlation is evaluated far outside its range.
pub const MAX_K_VALUE: f64 = 1e8;

const DEFAULT_CRITICAL_TEMPERATURE: f64 = 500.0;
const DEFAULT_CRITICAL_PRESSURE: f64 = 5e6;
const DEFAULT_ACENTRIC_FACTOR: f64 = 0.1;

/// Vapor-pressure correlation used for K-values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaporPressureModel {
    /// log10(P_sat/mmHg) = A - B / (T/°C + C)
    #[default]
    Antoine,
    /// ln(P_sat/Pc) = 5.37 (1 + ω)(1 - Tc/T), K = 1 above Tc
    Riedel,
}

impl VaporPressureModel {
    /// Saturation pressure [Pa], `None` when the record lacks the data.
    pub fn saturation_pressure(self, component: &Component, temperature: f64) -> Option<f64> {
        match self {
            VaporPressureModel::Antoine => {
                let [a, b, c] = component.antoine_coefficients?;
                let celsius = temperature - 273.15;
                Some(10f64.powf(a - b / (celsius + c)) * MMHG_TO_PA)
            }
            VaporPressureModel::Riedel => {
                let tc = component.critical_temperature.unwrap_or(DEFAULT_CRITICAL_TEMPERATURE);
                let pc = component.critical_pressure.unwrap_or(DEFAULT_CRITICAL_PRESSURE);
                let omega = component.acentric_factor.unwrap_or(DEFAULT_ACENTRIC_FACTOR);
                let tr = temperature / tc;
                if tr >= 1.0 {
                    return None;
                }
                Some(pc * (5.37 * (1.0 + omega) * (1.0 - 1.0 / tr)).exp())
            }
        }
    }

    /// Equilibrium ratio y/x of one component.
    ///
    /// Components without correlation data (and supercritical components
    /// under Riedel) get K = 1.
    pub fn k_value(self, component: &Component, temperature: f64, pressure: f64) -> f64 {
        match self.saturation_pressure(component, temperature) {
            Some(psat) if psat.is_finite() => (psat / pressure).clamp(MIN_K_VALUE, MAX_K_VALUE),
            Some(_) => MAX_K_VALUE,
            None => 1.0,
        }
    }

    /// K-values for every component, in order.
    pub fn k_values(self, components: &[Component], temperature: f64, pressure: f64) -> Vec<f64> {
        components.iter().map(|c| self.k_value(c, temperature, pressure)).collect()
    }

    /// Whether bubble and dew pressures have a closed form.
    pub fn is_analytic(self) -> bool {
        matches!(self, VaporPressureModel::Antoine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use approx::assert_relative_eq;

    #[test]
    fn test_antoine_normal_boiling_point() {
        let catalog = ComponentCatalog::with_builtin();
        let water = catalog.get("water").unwrap();

        let psat = VaporPressureModel::Antoine.saturation_pressure(&water, 373.15).unwrap();
        assert_relative_eq!(psat, 101325.0, max_relative = 0.01);
    }

    #[test]
    fn test_benzene_more_volatile_than_toluene() {
        let catalog = ComponentCatalog::with_builtin();
        let resolved = catalog.resolve(&["benzene", "toluene"]);

        let k = VaporPressureModel::Antoine.k_values(&resolved.components, 368.15, 101325.0);
        assert!(k[0] > 1.0);
        assert!(k[1] < 1.0);
    }

    #[test]
    fn test_riedel_supercritical_gives_unity() {
        let catalog = ComponentCatalog::with_builtin();
        let methane = catalog.get("methane").unwrap();

        assert_eq!(VaporPressureModel::Riedel.k_value(&methane, 300.0, 101325.0), 1.0);
        let k_sub = VaporPressureModel::Riedel.k_value(&methane, 150.0, 101325.0);
        assert!(k_sub > 1.0);
    }

    #[test]
    fn test_missing_data_gives_unity_and_floor_applies() {
        let mut bare = Component::synthetic("bare");
        bare.antoine_coefficients = None;
        assert_eq!(VaporPressureModel::Antoine.k_value(&bare, 350.0, 101325.0), 1.0);

        let heavy = Component::synthetic("heavy");
        let k = VaporPressureModel::Antoine.k_value(&heavy, 250.0, 1e7);
        assert_eq!(k, MIN_K_VALUE);
    }
}
