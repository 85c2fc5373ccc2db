//! Ideal-gas properties with a Raoult's-law flash.
//!
//! The baseline strategy: always available and defined for every component,
//! including synthetic records. Enthalpy is the integral of the ideal-gas heat
//! capacity polynomial from 298.15 K and does not depend on phase.

use super::flash::{FlashResult, rachford_rice};
use super::vapor_pressure::VaporPressureModel;
use super::{GAS_CONSTANT, Mixture, MixtureProperties, Phase, PropertyMethod, PropertyStrategy, ThermoResult};
use crate::catalog::Component;

/// Enthalpy reference temperature [K].
pub const REFERENCE_TEMPERATURE: f64 = 298.15;

const DEFAULT_HEAT_CAPACITY: f64 = 29.1;

/// Ideal-gas heat capacity of one component [J/(mol*K)].
pub fn heat_capacity(component: &Component, temperature: f64) -> f64 {
    match component.heat_capacity_coefficients {
        Some([a, b, c, d]) => a + temperature * (b + temperature * (c + temperature * d)),
        None => DEFAULT_HEAT_CAPACITY,
    }
}

/// Ideal-gas enthalpy of one component relative to 298.15 K [J/mol].
pub fn enthalpy(component: &Component, temperature: f64) -> f64 {
    let integral = |t: f64| match component.heat_capacity_coefficients {
        Some([a, b, c, d]) => t * (a + t * (b / 2.0 + t * (c / 3.0 + t * d / 4.0))),
        None => DEFAULT_HEAT_CAPACITY * t,
    };
    integral(temperature) - integral(REFERENCE_TEMPERATURE)
}

/// Mole-fraction-weighted ideal-gas enthalpy [J/mol].
pub fn mixture_enthalpy(components: &[Component], z: &[f64], temperature: f64) -> f64 {
    components.iter().zip(z).map(|(c, zi)| zi * enthalpy(c, temperature)).sum()
}

/// Mole-fraction-weighted ideal-gas heat capacity [J/(mol*K)].
pub fn mixture_heat_capacity(components: &[Component], z: &[f64], temperature: f64) -> f64 {
    components.iter().zip(z).map(|(c, zi)| zi * heat_capacity(c, temperature)).sum()
}

/// Ideal-gas strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealGas;

impl PropertyStrategy for IdealGas {
    fn name(&self) -> &'static str {
        "ideal-gas"
    }

    fn methods(&self) -> &'static [PropertyMethod] {
        &[PropertyMethod::Ideal]
    }

    fn properties(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<MixtureProperties> {
        let Mixture { components, mole_fractions, temperature, pressure } = *mixture;
        let molecular_weight = mixture.molecular_weight();
        let molar_density = pressure / (GAS_CONSTANT * temperature);

        Ok(MixtureProperties {
            temperature,
            pressure,
            mole_fractions: mole_fractions.to_vec(),
            method,
            molecular_weight,
            density: molar_density * molecular_weight / 1000.0,
            heat_capacity: mixture_heat_capacity(components, mole_fractions, temperature),
            enthalpy: mixture_enthalpy(components, mole_fractions, temperature),
            entropy: None,
            phase: Phase::Vapor,
            vapor_fraction: 1.0,
            viscosity: None,
            thermal_conductivity: None,
            warnings: Vec::new(),
        })
    }

    fn phase_enthalpy(&self, _method: PropertyMethod, mixture: &Mixture<'_>, _phase: Phase) -> ThermoResult<f64> {
        Ok(mixture_enthalpy(mixture.components, mixture.mole_fractions, mixture.temperature))
    }

    fn flash(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<FlashResult> {
        let k = VaporPressureModel::Antoine.k_values(mixture.components, mixture.temperature, mixture.pressure);
        let split = rachford_rice(mixture.mole_fractions, &k);
        Ok(FlashResult::from_split(mixture, k, split, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use approx::assert_relative_eq;

    #[test]
    fn test_enthalpy_zero_at_reference() {
        let catalog = ComponentCatalog::with_builtin();
        let water = catalog.get("water").unwrap();
        assert!(enthalpy(&water, REFERENCE_TEMPERATURE).abs() < 1e-9);
    }

    #[test]
    fn test_enthalpy_is_heat_capacity_integral() {
        let catalog = ComponentCatalog::with_builtin();
        let benzene = catalog.get("benzene").unwrap();

        let t = 400.0;
        let slope = (enthalpy(&benzene, t + 0.01) - enthalpy(&benzene, t - 0.01)) / 0.02;
        assert_relative_eq!(slope, heat_capacity(&benzene, t), max_relative = 1e-6);
    }

    #[test]
    fn test_default_heat_capacity() {
        let mut bare = Component::synthetic("bare");
        bare.heat_capacity_coefficients = None;
        assert_eq!(heat_capacity(&bare, 500.0), 29.1);
        assert_relative_eq!(enthalpy(&bare, 308.15), 291.0, max_relative = 1e-9);
    }

    #[test]
    fn test_ideal_properties() {
        let catalog = ComponentCatalog::with_builtin();
        let comps = catalog.resolve(&["methane"]).components;
        let mixture = Mixture::new(&comps, &[1.0], 300.0, 101325.0);

        let props = IdealGas.properties(PropertyMethod::Ideal, &mixture).unwrap();
        assert_eq!(props.phase, Phase::Vapor);
        assert_eq!(props.vapor_fraction, 1.0);
        assert_relative_eq!(props.density, 0.6517, max_relative = 1e-3);
        assert!(props.heat_capacity > 30.0 && props.heat_capacity < 40.0);
    }
}
