//! Reference-equation properties for pure fluids through CoolProp (via rfluids).
//!
//! Only single-component mixtures of species with a CoolProp counterpart are
//! served; anything else is declined so the engine moves down the fallback
//! chain. Per-mass CoolProp outputs are converted to molar values. Enthalpy is
//! on CoolProp's reference state, not the ideal-gas 298.15 K reference of the
//! other strategies.

use rfluids::prelude::*;

use super::{Mixture, MixtureProperties, Phase, PropertyMethod, PropertyStrategy, ThermoError, ThermoResult};
use crate::catalog::Component;

/// CoolProp fluid for a catalog record.
fn pure_fluid(component: &Component) -> Option<Pure> {
    let pure = match component.id.as_str() {
        "water" => Pure::Water,
        "methane" => Pure::Methane,
        "ethane" => Pure::Ethane,
        "propane" => Pure::nPropane,
        "n_butane" => Pure::nButane,
        "carbon_dioxide" => Pure::CarbonDioxide,
        "nitrogen" => Pure::Nitrogen,
        "oxygen" => Pure::Oxygen,
        "hydrogen" => Pure::Hydrogen,
        "methanol" => Pure::Methanol,
        "ethanol" => Pure::Ethanol,
        _ => return None,
    };
    Some(pure)
}

/// CoolProp strategy for `COOLPROP-PR` and `COOLPROP-SRK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoolProp;

impl CoolProp {
    fn pure(mixture: &Mixture<'_>) -> ThermoResult<Pure> {
        match mixture.components {
            [component] => pure_fluid(component)
                .ok_or_else(|| ThermoError::PropertyNotAvailable(format!("no CoolProp fluid for {}", component.id))),
            _ => Err(ThermoError::PropertyNotAvailable("CoolProp strategy handles pure fluids only".to_string())),
        }
    }

    fn state(pure: Pure, temperature: f64, pressure: f64) -> ThermoResult<rfluids::fluid::Fluid> {
        rfluids::fluid::Fluid::from(pure)
            .in_state(FluidInput::pressure(pressure), FluidInput::temperature(temperature))
            .map_err(|e| ThermoError::ConvergenceFailure(format!("CoolProp state at {} K, {} Pa: {:?}", temperature, pressure, e)))
    }

    /// Phase from the saturation temperature at `pressure`.
    fn phase(pure: Pure, temperature: f64, pressure: f64) -> Phase {
        let mut fluid = rfluids::fluid::Fluid::from(pure);
        if let (Ok(tc), Ok(pc)) = (fluid.critical_temperature(), fluid.critical_pressure()) {
            if temperature >= tc && pressure >= pc {
                return Phase::Supercritical;
            }
        }

        let saturation = rfluids::fluid::Fluid::from(pure)
            .in_state(FluidInput::pressure(pressure), FluidInput::quality(0.0))
            .ok()
            .and_then(|mut saturated| saturated.temperature().ok());
        match saturation {
            Some(t_sat) if temperature < t_sat => Phase::Liquid,
            Some(_) => Phase::Vapor,
            None => Phase::Supercritical,
        }
    }
}

impl PropertyStrategy for CoolProp {
    fn name(&self) -> &'static str {
        "coolprop"
    }

    fn methods(&self) -> &'static [PropertyMethod] {
        &[PropertyMethod::CoolPropPr, PropertyMethod::CoolPropSrk]
    }

    fn supports(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> bool {
        self.methods().contains(&method) && Self::pure(mixture).is_ok()
    }

    fn properties(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<MixtureProperties> {
        let pure = Self::pure(mixture)?;
        let (t, p) = (mixture.temperature, mixture.pressure);
        let mut fluid = Self::state(pure, t, p)?;
        let molar_mass = mixture.molecular_weight() / 1000.0;

        let density = fluid
            .density()
            .map_err(|e| ThermoError::PropertyNotAvailable(format!("Density not available: {:?}", e)))?;
        let enthalpy = fluid
            .enthalpy()
            .map_err(|e| ThermoError::PropertyNotAvailable(format!("Enthalpy not available: {:?}", e)))?;
        let cp = fluid
            .specific_heat()
            .map_err(|e| ThermoError::PropertyNotAvailable(format!("Specific heat (Cp) not available: {:?}", e)))?;

        let phase = Self::phase(pure, t, p);
        tracing::debug!(fluid = ?pure, ?phase, "coolprop state evaluated");

        Ok(MixtureProperties {
            temperature: t,
            pressure: p,
            mole_fractions: mixture.mole_fractions.to_vec(),
            method,
            molecular_weight: mixture.molecular_weight(),
            density,
            heat_capacity: cp * molar_mass,
            enthalpy: enthalpy * molar_mass,
            entropy: fluid.entropy().ok().map(|s| s * molar_mass),
            phase,
            vapor_fraction: if phase == Phase::Liquid { 0.0 } else { 1.0 },
            // Transport properties depend on backend support
            viscosity: fluid.dynamic_viscosity().ok(),
            thermal_conductivity: fluid.conductivity().ok(),
            warnings: Vec::new(),
        })
    }

    fn phase_enthalpy(&self, method: PropertyMethod, mixture: &Mixture<'_>, _phase: Phase) -> ThermoResult<f64> {
        self.properties(method, mixture).map(|props| props.enthalpy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use crate::thermodynamics::PropertyEngine;
    use std::sync::Arc;

    #[test]
    fn test_liquid_water() {
        let comps = ComponentCatalog::with_builtin().resolve(&["water"]).components;
        let mixture = Mixture::new(&comps, &[1.0], 300.0, 101325.0);

        let props = CoolProp.properties(PropertyMethod::CoolPropPr, &mixture).unwrap();
        assert_eq!(props.phase, Phase::Liquid);
        assert!((props.density - 996.5).abs() < 2.0);
        assert!(props.heat_capacity > 70.0 && props.heat_capacity < 80.0);
    }

    #[test]
    fn test_propane_vapor() {
        let comps = ComponentCatalog::with_builtin().resolve(&["propane"]).components;
        let mixture = Mixture::new(&comps, &[1.0], 300.0, 101325.0);

        let props = CoolProp.properties(PropertyMethod::CoolPropSrk, &mixture).unwrap();
        assert_eq!(props.phase, Phase::Vapor);
        assert_eq!(props.vapor_fraction, 1.0);
    }

    #[test]
    fn test_mixtures_are_declined() {
        let comps = ComponentCatalog::with_builtin().resolve(&["methane", "ethane"]).components;
        let mixture = Mixture::new(&comps, &[0.5, 0.5], 300.0, 101325.0);
        assert!(!CoolProp.supports(PropertyMethod::CoolPropPr, &mixture));

        let engine = PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin()));
        let props = engine
            .calculate(&["methane", "ethane"], &[0.5, 0.5], 300.0, 101325.0, PropertyMethod::CoolPropPr)
            .unwrap();
        assert_eq!(props.method, PropertyMethod::PengRobinson);
    }
}
