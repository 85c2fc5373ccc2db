//! Thermodynamic property engine.
//!
//! Mixture properties (molecular weight, density, heat capacity, enthalpy,
//! phase) and two-phase flashes are computed by interchangeable
//! [`PropertyStrategy`] implementations:
//!
//! | Strategy | Methods | Availability |
//! |----------|---------|--------------|
//! | [`ideal::IdealGas`] | `IDEAL` | always |
//! | [`cubic::CubicEos`] | `PENG-ROBINSON`, `SRK` | components with Tc, Pc and ω |
//! | `coolprop::CoolProp` | `COOLPROP-PR`, `COOLPROP-SRK` | `coolprop` feature, pure fluids |
//!
//! # Method fallback chain
//!
//! A requested method that no registered strategy can serve is downgraded
//! along an explicit chain, ending at the ideal-gas baseline:
//!
//! ```text
//! REFPROP -> COOLPROP-PR -> PENG-ROBINSON -> IDEAL
//! COOLPROP-SRK -> SRK -> IDEAL
//! UNIFAC | WILSON | NRTL -> IDEAL
//! ```
//!
//! Every result is tagged with the method that produced it.
//!
//! ```
//! use std::sync::Arc;
//! use stagewise::catalog::ComponentCatalog;
//! use stagewise::thermodynamics::{PropertyEngine, PropertyMethod};
//!
//! let engine = PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin()));
//! let props = engine
//!     .calculate(&["methane", "ethane"], &[0.9, 0.1], 300.0, 101325.0, PropertyMethod::Ideal)
//!     .unwrap();
//! assert_eq!(props.method, PropertyMethod::Ideal);
//! assert!(props.density > 0.0);
//! ```

pub mod cubic;
pub mod equilibrium;
pub mod flash;
pub mod ideal;
pub mod vapor_pressure;

#[cfg(feature = "coolprop")]
pub mod coolprop;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Component, ComponentCatalog, ResolvedComponents};
use flash::FlashResult;
use vapor_pressure::VaporPressureModel;

/// Universal gas constant [J/(mol*K)].
pub const GAS_CONSTANT: f64 = 8.314;

/// Tolerance on the sum of mole fractions.
pub const COMPOSITION_TOLERANCE: f64 = 1e-6;

/// Liquid density used when critical data are missing [kg/m³].
pub const DEFAULT_LIQUID_DENSITY: f64 = 800.0;

/// Result type for thermodynamic calculations.
pub type ThermoResult<T> = Result<T, ThermoError>;

/// Errors that can occur in thermodynamic calculations.
#[derive(Debug, thiserror::Error)]
pub enum ThermoError {
    /// Mole fractions are negative, non-finite or do not sum to one
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),
    /// Composition vector and component list differ in length
    #[error("Composition has {fractions} entries for {components} components")]
    LengthMismatch {
        /// Number of components
        components: usize,
        /// Number of mole fractions
        fractions: usize,
    },
    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Method name outside the enumerated set
    #[error("Unknown property method: {0}")]
    UnknownMethod(String),
    /// Calculation failed to converge
    #[error("Calculation failed to converge: {0}")]
    ConvergenceFailure(String),
    /// Property not available from this strategy
    #[error("Property not available: {0}")]
    PropertyNotAvailable(String),
}

/// Property calculation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyMethod {
    /// Ideal gas with Raoult's-law flash
    #[serde(rename = "IDEAL")]
    Ideal,
    /// Peng-Robinson cubic equation of state
    #[default]
    #[serde(rename = "PENG-ROBINSON")]
    PengRobinson,
    /// Soave-Redlich-Kwong cubic equation of state
    #[serde(rename = "SRK")]
    Srk,
    /// UNIFAC group contribution activity model
    #[serde(rename = "UNIFAC")]
    Unifac,
    /// Wilson activity model
    #[serde(rename = "WILSON")]
    Wilson,
    /// NRTL activity model
    #[serde(rename = "NRTL")]
    Nrtl,
    /// CoolProp reference equation, Peng-Robinson family
    #[serde(rename = "COOLPROP-PR")]
    CoolPropPr,
    /// CoolProp reference equation, SRK family
    #[serde(rename = "COOLPROP-SRK")]
    CoolPropSrk,
    /// REFPROP reference equations
    #[serde(rename = "REFPROP")]
    Refprop,
}

impl PropertyMethod {
    /// Every method, in declaration order.
    pub const ALL: [PropertyMethod; 9] = [
        PropertyMethod::Ideal,
        PropertyMethod::PengRobinson,
        PropertyMethod::Srk,
        PropertyMethod::Unifac,
        PropertyMethod::Wilson,
        PropertyMethod::Nrtl,
        PropertyMethod::CoolPropPr,
        PropertyMethod::CoolPropSrk,
        PropertyMethod::Refprop,
    ];

    /// Canonical method name.
    pub fn name(self) -> &'static str {
        match self {
            PropertyMethod::Ideal => "IDEAL",
            PropertyMethod::PengRobinson => "PENG-ROBINSON",
            PropertyMethod::Srk => "SRK",
            PropertyMethod::Unifac => "UNIFAC",
            PropertyMethod::Wilson => "WILSON",
            PropertyMethod::Nrtl => "NRTL",
            PropertyMethod::CoolPropPr => "COOLPROP-PR",
            PropertyMethod::CoolPropSrk => "COOLPROP-SRK",
            PropertyMethod::Refprop => "REFPROP",
        }
    }

    /// Next method to try when this one cannot be served.
    pub fn fallback(self) -> Option<PropertyMethod> {
        match self {
            PropertyMethod::Ideal => None,
            PropertyMethod::Refprop => Some(PropertyMethod::CoolPropPr),
            PropertyMethod::CoolPropPr => Some(PropertyMethod::PengRobinson),
            PropertyMethod::CoolPropSrk => Some(PropertyMethod::Srk),
            PropertyMethod::PengRobinson
            | PropertyMethod::Srk
            | PropertyMethod::Unifac
            | PropertyMethod::Wilson
            | PropertyMethod::Nrtl => Some(PropertyMethod::Ideal),
        }
    }

    /// The full chain starting at this method.
    pub fn chain(self) -> Vec<PropertyMethod> {
        std::iter::successors(Some(self), |m| m.fallback()).collect()
    }
}

impl fmt::Display for PropertyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PropertyMethod {
    type Err = ThermoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('_', "-");
        PropertyMethod::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| ThermoError::UnknownMethod(s.to_string()))
    }
}

/// Phase label of a mixture at given conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Single liquid phase
    Liquid,
    /// Single vapor phase
    Vapor,
    /// Vapor and liquid in equilibrium
    TwoPhase,
    /// Above the critical point
    Supercritical,
}

/// Input record for a property calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureState {
    /// Component identifiers
    pub components: Vec<String>,
    /// Mole fractions, same order as `components`
    pub mole_fractions: Vec<f64>,
    /// Temperature [K]
    pub temperature: f64,
    /// Pressure [Pa]
    pub pressure: f64,
}

impl MixtureState {
    /// Checks composition and state variables.
    pub fn validate(&self) -> ThermoResult<()> {
        validate_composition(&self.mole_fractions, self.components.len())?;
        validate_conditions(self.temperature, self.pressure)
    }
}

/// A mixture with resolved component records, as seen by strategies.
#[derive(Debug, Clone, Copy)]
pub struct Mixture<'a> {
    /// Component records
    pub components: &'a [Component],
    /// Mole fractions
    pub mole_fractions: &'a [f64],
    /// Temperature [K]
    pub temperature: f64,
    /// Pressure [Pa]
    pub pressure: f64,
}

impl<'a> Mixture<'a> {
    /// Creates a mixture view.
    pub fn new(components: &'a [Component], mole_fractions: &'a [f64], temperature: f64, pressure: f64) -> Self {
        Mixture { components, mole_fractions, temperature, pressure }
    }

    /// Same components and composition at other conditions.
    pub fn at(self, temperature: f64, pressure: f64) -> Self {
        Mixture { temperature, pressure, ..self }
    }

    /// Same components at another composition.
    pub fn with_composition(self, mole_fractions: &'a [f64]) -> Self {
        Mixture { mole_fractions, ..self }
    }

    /// Mole-fraction-weighted molecular weight [g/mol].
    pub fn molecular_weight(&self) -> f64 {
        self.components.iter().zip(self.mole_fractions).map(|(c, z)| z * c.molecular_weight).sum()
    }
}

/// Bulk properties of a mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureProperties {
    /// Temperature [K]
    pub temperature: f64,
    /// Pressure [Pa]
    pub pressure: f64,
    /// Mole fractions
    pub mole_fractions: Vec<f64>,
    /// Method that produced the result
    pub method: PropertyMethod,
    /// Molecular weight [g/mol]
    pub molecular_weight: f64,
    /// Mass density [kg/m³]
    pub density: f64,
    /// Molar heat capacity [J/(mol*K)]
    pub heat_capacity: f64,
    /// Molar enthalpy relative to the ideal gas at 298.15 K [J/mol]
    pub enthalpy: f64,
    /// Molar entropy [J/(mol*K)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    /// Phase label
    pub phase: Phase,
    /// Molar vapor fraction
    pub vapor_fraction: f64,
    /// Dynamic viscosity [Pa*s]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viscosity: Option<f64>,
    /// Thermal conductivity [W/(m*K)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal_conductivity: Option<f64>,
    /// Substitutions and downgrades made along the way
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A family of property calculations.
///
/// Strategies are stateless apart from configuration and must be shareable
/// across threads.
pub trait PropertyStrategy: fmt::Debug + Send + Sync {
    /// Short strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Methods this strategy implements.
    fn methods(&self) -> &'static [PropertyMethod];

    /// Whether `method` can be evaluated for this mixture.
    fn supports(&self, method: PropertyMethod, _mixture: &Mixture<'_>) -> bool {
        self.methods().contains(&method)
    }

    /// Bulk properties at the mixture conditions.
    fn properties(&self, method: PropertyMethod, mixture: &Mixture<'_>) -> ThermoResult<MixtureProperties>;

    /// Molar enthalpy of the mixture in the given phase [J/mol].
    fn phase_enthalpy(&self, method: PropertyMethod, mixture: &Mixture<'_>, phase: Phase) -> ThermoResult<f64>;

    /// Isothermal two-phase flash.
    fn flash(&self, _method: PropertyMethod, _mixture: &Mixture<'_>) -> ThermoResult<FlashResult> {
        Err(ThermoError::PropertyNotAvailable(format!("{} does not provide flash calculations", self.name())))
    }
}

/// Value computed through the fallback chain.
struct Dispatched<T> {
    value: T,
    method: PropertyMethod,
    notes: Vec<String>,
}

/// Entry point for property and flash calculations.
///
/// Holds a read-only handle to the component catalog and the registered
/// strategies. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct PropertyEngine {
    catalog: Arc<ComponentCatalog>,
    ideal: ideal::IdealGas,
    strategies: Vec<Box<dyn PropertyStrategy>>,
}

impl PropertyEngine {
    /// Creates an engine with every strategy compiled into this build.
    pub fn new(catalog: Arc<ComponentCatalog>) -> Self {
        let engine = Self::ideal_only(catalog).with_strategy(Box::new(cubic::CubicEos));
        #[cfg(feature = "coolprop")]
        let engine = engine.with_strategy(Box::new(coolprop::CoolProp));
        tracing::debug!(methods = ?engine.available_methods(), "property engine ready");
        engine
    }

    /// Creates an engine with only the ideal-gas baseline.
    pub fn ideal_only(catalog: Arc<ComponentCatalog>) -> Self {
        PropertyEngine { catalog, ideal: ideal::IdealGas, strategies: Vec::new() }
    }

    /// Registers an additional strategy, tried in registration order.
    pub fn with_strategy(mut self, strategy: Box<dyn PropertyStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// The component catalog.
    pub fn catalog(&self) -> &Arc<ComponentCatalog> {
        &self.catalog
    }

    /// Methods served by a registered strategy.
    pub fn available_methods(&self) -> Vec<PropertyMethod> {
        PropertyMethod::ALL
            .into_iter()
            .filter(|m| {
                *m == PropertyMethod::Ideal || self.strategies.iter().any(|s| s.methods().contains(m))
            })
            .collect()
    }

    /// Resolves identifiers against the catalog.
    pub fn resolve<S: AsRef<str>>(&self, components: &[S]) -> ResolvedComponents {
        self.catalog.resolve(components)
    }

    /// Bulk mixture properties.
    ///
    /// # Errors
    ///
    /// Validation errors for malformed compositions or non-positive state
    /// variables. Strategy failures are absorbed by the fallback chain.
    pub fn calculate<S: AsRef<str>>(
        &self,
        components: &[S],
        mole_fractions: &[f64],
        temperature: f64,
        pressure: f64,
        method: PropertyMethod,
    ) -> ThermoResult<MixtureProperties> {
        validate_composition(mole_fractions, components.len())?;
        validate_conditions(temperature, pressure)?;
        let resolved = self.resolve(components);
        let mixture = Mixture::new(&resolved.components, mole_fractions, temperature, pressure);

        let mut props = self.mixture_properties(&mixture, method)?;
        let mut warnings = resolved.warnings;
        warnings.append(&mut props.warnings);
        props.warnings = warnings;
        Ok(props)
    }

    /// Bulk properties for a [`MixtureState`] record.
    pub fn calculate_state(&self, state: &MixtureState, method: PropertyMethod) -> ThermoResult<MixtureProperties> {
        self.calculate(&state.components, &state.mole_fractions, state.temperature, state.pressure, method)
    }

    /// Bulk properties of an already resolved mixture.
    pub fn mixture_properties(&self, mixture: &Mixture<'_>, method: PropertyMethod) -> ThermoResult<MixtureProperties> {
        let dispatched = self.dispatch(method, mixture, |s, m| s.properties(m, mixture))?;
        let mut props = dispatched.value;
        props.method = dispatched.method;
        props.warnings.extend(dispatched.notes);
        Ok(props)
    }

    /// Isothermal flash at the given conditions.
    pub fn flash<S: AsRef<str>>(
        &self,
        components: &[S],
        z: &[f64],
        temperature: f64,
        pressure: f64,
        method: PropertyMethod,
    ) -> ThermoResult<FlashResult> {
        validate_composition(z, components.len())?;
        validate_conditions(temperature, pressure)?;
        let resolved = self.resolve(components);
        let mixture = Mixture::new(&resolved.components, z, temperature, pressure);

        let mut result = self.flash_mixture(&mixture, method)?;
        let mut warnings = resolved.warnings;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Isothermal flash of an already resolved mixture.
    pub fn flash_mixture(&self, mixture: &Mixture<'_>, method: PropertyMethod) -> ThermoResult<FlashResult> {
        let dispatched = self.dispatch(method, mixture, |s, m| s.flash(m, mixture))?;
        let mut result = dispatched.value;
        result.method = dispatched.method;
        result.warnings.extend(dispatched.notes);
        Ok(result)
    }

    /// Molar enthalpy of a resolved mixture in one phase [J/mol].
    pub fn phase_enthalpy(&self, mixture: &Mixture<'_>, phase: Phase, method: PropertyMethod) -> ThermoResult<f64> {
        self.dispatch(method, mixture, |s, m| s.phase_enthalpy(m, mixture, phase)).map(|d| d.value)
    }

    /// Raoult's-law K-values from a vapor-pressure correlation.
    pub fn k_values(&self, components: &[Component], temperature: f64, pressure: f64, model: VaporPressureModel) -> Vec<f64> {
        model.k_values(components, temperature, pressure)
    }

    /// Saturated liquid density [kg/m³] from the Rackett equation.
    ///
    /// Falls back to [`DEFAULT_LIQUID_DENSITY`] when a component lacks
    /// critical data.
    pub fn liquid_density(&self, components: &[Component], x: &[f64], temperature: f64) -> f64 {
        rackett_liquid_density(components, x, temperature).unwrap_or(DEFAULT_LIQUID_DENSITY)
    }

    /// Walks the fallback chain until a strategy succeeds.
    fn dispatch<T, F>(&self, requested: PropertyMethod, mixture: &Mixture<'_>, op: F) -> ThermoResult<Dispatched<T>>
    where
        F: Fn(&dyn PropertyStrategy, PropertyMethod) -> ThermoResult<T>,
    {
        let mut notes = Vec::new();

        for method in requested.chain() {
            if method == PropertyMethod::Ideal {
                break;
            }
            for strategy in self.strategies.iter().filter(|s| s.supports(method, mixture)) {
                match op(strategy.as_ref(), method) {
                    Ok(value) => return Ok(Dispatched { value, method, notes }),
                    Err(err) => {
                        tracing::warn!(method = %method, strategy = strategy.name(), error = %err, "strategy failed");
                        notes.push(format!("{} ({}) failed: {}", method, strategy.name(), err));
                    }
                }
            }
            if let Some(next) = method.fallback() {
                tracing::warn!(method = %method, fallback = %next, "method unavailable, falling back");
                notes.push(format!("Method {} not available, using {}", method, next));
            }
        }

        let value = op(&self.ideal, PropertyMethod::Ideal)?;
        Ok(Dispatched { value, method: PropertyMethod::Ideal, notes })
    }
}

/// Checks that mole fractions are finite, non-negative and sum to one.
pub fn validate_composition(mole_fractions: &[f64], components: usize) -> ThermoResult<()> {
    if components == 0 {
        return Err(ThermoError::InvalidInput("Component list is empty".to_string()));
    }
    if mole_fractions.len() != components {
        return Err(ThermoError::LengthMismatch { components, fractions: mole_fractions.len() });
    }
    if let Some(bad) = mole_fractions.iter().find(|z| !z.is_finite() || **z < 0.0) {
        return Err(ThermoError::InvalidComposition(format!("mole fraction {} is not a non-negative number", bad)));
    }
    let sum: f64 = mole_fractions.iter().sum();
    if (sum - 1.0).abs() > COMPOSITION_TOLERANCE {
        return Err(ThermoError::InvalidComposition(format!("mole fractions sum to {}, expected 1", sum)));
    }
    Ok(())
}

/// Checks that temperature and pressure are positive and finite.
pub fn validate_conditions(temperature: f64, pressure: f64) -> ThermoResult<()> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(ThermoError::InvalidInput(format!("temperature must be positive, got {}", temperature)));
    }
    if !(pressure.is_finite() && pressure > 0.0) {
        return Err(ThermoError::InvalidInput(format!("pressure must be positive, got {}", pressure)));
    }
    Ok(())
}

/// Rackett (Yamada-Gunn) saturated liquid density [kg/m³].
///
/// V_i = (R Tc_i / Pc_i) Z_RA^(1 + (1 - Tr)^(2/7)), Z_RA = 0.29056 - 0.08775 ω,
/// mixed linearly in mole fraction. Tr is capped just below one.
pub fn rackett_liquid_density(components: &[Component], x: &[f64], temperature: f64) -> Option<f64> {
    let mut volume = 0.0;
    let mut mass = 0.0;
    for (component, xi) in components.iter().zip(x) {
        let tc = component.critical_temperature?;
        let pc = component.critical_pressure?;
        let omega = component.acentric_factor?;
        let z_ra = 0.29056 - 0.08775 * omega;
        let tr = (temperature / tc).min(0.99);
        let molar_volume = GAS_CONSTANT * tc / pc * z_ra.powf(1.0 + (1.0 - tr).powf(2.0 / 7.0));
        volume += xi * molar_volume;
        mass += xi * component.molecular_weight / 1000.0;
    }
    (volume > 0.0).then(|| mass / volume)
}
