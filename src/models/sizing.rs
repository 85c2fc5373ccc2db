//! Tray column hydraulic sizing.
//!
//! Diameter from the Souders-Brown flooding velocity, height from a fixed tray
//! spacing and a velocity-scaled tray pressure drop:
//!
//! - u_flood = C √((ρ_L - ρ_V) / ρ_V)
//! - u_design = 0.8 u_flood
//! - A = Q_V / u_design,  D = √(4A/π)
//! - H = N · spacing
//! - ΔP_tray = 700 (1 + (u_design / 3)²) Pa
//!
//! Any fault yields default dimensions with the error recorded.
//!
//! # Example
//!
//! ```
//! use stagewise::models::sizing::{ColumnDesign, SizingInput, size_column};
//!
//! let input = SizingInput {
//!     vapor_flow: 100.0,
//!     liquid_flow: 80.0,
//!     vapor_molecular_weight: 78.1,
//!     liquid_molecular_weight: 92.1,
//!     vapor_density: 2.7,
//!     liquid_density: 800.0,
//!     pressure: 101325.0,
//!     temperature: 360.0,
//!     stages: 20,
//! };
//! let sizing = size_column(&input, &ColumnDesign::default());
//! assert!(sizing.error.is_none());
//! assert!(sizing.tower_diameter > 1.0 && sizing.tower_diameter < 1.2);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Errors raised while sizing. Reported through [`ColumnSizing::error`].
#[derive(Debug, thiserror::Error)]
pub enum SizingError {
    /// Non-finite input, non-positive property or negative flow
    #[error("Invalid sizing input: {0}")]
    InvalidInput(String),
    /// Liquid no denser than vapor
    #[error("Liquid density {liquid} kg/m³ does not exceed vapor density {vapor} kg/m³")]
    DensityInversion {
        /// Liquid density [kg/m³]
        liquid: f64,
        /// Vapor density [kg/m³]
        vapor: f64,
    },
}

/// Fixed design parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDesign {
    /// Tray spacing [m]
    pub tray_spacing: f64,
    /// Design velocity as a fraction of flooding
    pub design_factor: f64,
    /// Dry tray pressure drop at zero vapor velocity [Pa]
    pub base_tray_pressure_drop: f64,
    /// Vapor velocity scale of the tray pressure drop [m/s]
    pub reference_velocity: f64,
    /// Diameter reported when sizing fails [m]
    pub default_diameter: f64,
    /// Height reported when sizing fails [m]
    pub default_height: f64,
}

impl Default for ColumnDesign {
    fn default() -> Self {
        Self {
            tray_spacing: 0.6,
            design_factor: 0.8,
            base_tray_pressure_drop: 700.0,
            reference_velocity: 3.0,
            default_diameter: 1.0,
            default_height: 10.0,
        }
    }
}

impl ColumnDesign {
    /// Sets the tray spacing.
    pub fn with_tray_spacing(mut self, spacing: f64) -> Self {
        self.tray_spacing = spacing;
        self
    }

    /// Sets the design fraction of flooding.
    pub fn with_design_factor(mut self, factor: f64) -> Self {
        self.design_factor = factor;
        self
    }
}

/// Flow and property data for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingInput {
    /// Vapor flow [kmol/h]
    pub vapor_flow: f64,
    /// Liquid flow [kmol/h]
    pub liquid_flow: f64,
    /// Vapor molecular weight [g/mol]
    pub vapor_molecular_weight: f64,
    /// Liquid molecular weight [g/mol]
    pub liquid_molecular_weight: f64,
    /// Vapor density [kg/m³]
    pub vapor_density: f64,
    /// Liquid density [kg/m³]
    pub liquid_density: f64,
    /// Column pressure [Pa]
    pub pressure: f64,
    /// Temperature [K]
    pub temperature: f64,
    /// Number of trays
    pub stages: usize,
}

/// Hydraulic details of a successful sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hydraulics {
    /// Souders-Brown constant [m/s]
    pub souders_brown_constant: f64,
    /// Flooding velocity [m/s]
    pub flooding_velocity: f64,
    /// Design vapor velocity [m/s]
    pub design_velocity: f64,
    /// Design velocity as a percentage of flooding
    pub approach_to_flood: f64,
    /// Pressure drop per tray [Pa]
    pub pressure_drop_per_tray: f64,
    /// Column pressure drop [Pa]
    pub total_pressure_drop: f64,
    /// Tower cross-section [m²]
    pub cross_sectional_area: f64,
    /// Vapor volumetric flow [m³/h]
    pub vapor_volumetric_flow: f64,
    /// Liquid volumetric flow [m³/h]
    pub liquid_volumetric_flow: f64,
}

/// Tower dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSizing {
    /// Tower diameter [m]
    pub tower_diameter: f64,
    /// Tower height [m]
    pub tower_height: f64,
    /// Tray spacing [m]
    pub tray_spacing: f64,
    /// Present when sizing succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydraulics: Option<Hydraulics>,
    /// Present when sizing failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Souders-Brown constant [m/s] by pressure regime.
pub fn souders_brown_constant(pressure: f64) -> f64 {
    let bar = pressure / 1e5;
    if bar < 0.2 {
        0.1
    } else if bar < 1.0 {
        0.08
    } else if bar < 10.0 {
        0.06
    } else {
        0.05
    }
}

/// Sizes a tray column. Never fails: faults give default dimensions.
pub fn size_column(input: &SizingInput, design: &ColumnDesign) -> ColumnSizing {
    match try_size(input, design) {
        Ok(sizing) => sizing,
        Err(err) => {
            tracing::warn!(error = %err, "column sizing failed, using default dimensions");
            ColumnSizing {
                tower_diameter: design.default_diameter,
                tower_height: design.default_height,
                tray_spacing: design.tray_spacing,
                hydraulics: None,
                error: Some(err.to_string()),
            }
        }
    }
}

fn try_size(input: &SizingInput, design: &ColumnDesign) -> Result<ColumnSizing, SizingError> {
    let positive = [
        ("vapor_molecular_weight", input.vapor_molecular_weight),
        ("liquid_molecular_weight", input.liquid_molecular_weight),
        ("vapor_density", input.vapor_density),
        ("liquid_density", input.liquid_density),
        ("pressure", input.pressure),
        ("temperature", input.temperature),
    ];
    if let Some((name, value)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
        return Err(SizingError::InvalidInput(format!("{} must be positive, got {}", name, value)));
    }
    let non_negative = [("vapor_flow", input.vapor_flow), ("liquid_flow", input.liquid_flow)];
    if let Some((name, value)) = non_negative.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
        return Err(SizingError::InvalidInput(format!("{} must be non-negative, got {}", name, value)));
    }
    if input.stages == 0 {
        return Err(SizingError::InvalidInput("stage count must be at least one".to_string()));
    }
    if input.liquid_density <= input.vapor_density {
        return Err(SizingError::DensityInversion { liquid: input.liquid_density, vapor: input.vapor_density });
    }

    let c = souders_brown_constant(input.pressure);
    let flooding_velocity = c * ((input.liquid_density - input.vapor_density) / input.vapor_density).sqrt();
    let design_velocity = design.design_factor * flooding_velocity;

    // kmol/h * kg/kmol -> kg/h
    let vapor_volumetric_flow = input.vapor_flow * input.vapor_molecular_weight / input.vapor_density;
    let liquid_volumetric_flow = input.liquid_flow * input.liquid_molecular_weight / input.liquid_density;
    let area = vapor_volumetric_flow / 3600.0 / design_velocity;
    let diameter = (4.0 * area / PI).sqrt();

    let stages = input.stages as f64;
    let pressure_drop_per_tray =
        design.base_tray_pressure_drop * (1.0 + (design_velocity / design.reference_velocity).powi(2));

    Ok(ColumnSizing {
        tower_diameter: diameter,
        tower_height: stages * design.tray_spacing,
        tray_spacing: design.tray_spacing,
        hydraulics: Some(Hydraulics {
            souders_brown_constant: c,
            flooding_velocity,
            design_velocity,
            approach_to_flood: design.design_factor * 100.0,
            pressure_drop_per_tray,
            total_pressure_drop: stages * pressure_drop_per_tray,
            cross_sectional_area: area,
            vapor_volumetric_flow,
            liquid_volumetric_flow,
        }),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn benzene_toluene() -> SizingInput {
        SizingInput {
            vapor_flow: 100.0,
            liquid_flow: 80.0,
            vapor_molecular_weight: 78.0,
            liquid_molecular_weight: 92.0,
            vapor_density: 2.7,
            liquid_density: 800.0,
            pressure: 101325.0,
            temperature: 360.0,
            stages: 20,
        }
    }

    #[test]
    fn test_souders_brown_regimes() {
        assert_eq!(souders_brown_constant(1e4), 0.1);
        assert_eq!(souders_brown_constant(5e4), 0.08);
        assert_eq!(souders_brown_constant(101325.0), 0.06);
        assert_eq!(souders_brown_constant(2e6), 0.05);
    }

    #[test]
    fn test_size_column_reference_case() {
        let sizing = size_column(&benzene_toluene(), &ColumnDesign::default());
        let hydraulics = sizing.hydraulics.unwrap();

        assert_relative_eq!(hydraulics.flooding_velocity, 1.0308, max_relative = 1e-3);
        assert_relative_eq!(hydraulics.design_velocity, 0.8 * hydraulics.flooding_velocity, max_relative = 1e-12);
        assert_relative_eq!(sizing.tower_diameter, 1.113, max_relative = 2e-3);
        assert_relative_eq!(sizing.tower_height, 12.0, max_relative = 1e-12);
        assert_relative_eq!(hydraulics.total_pressure_drop, 20.0 * hydraulics.pressure_drop_per_tray, max_relative = 1e-12);
        assert!(hydraulics.pressure_drop_per_tray > 700.0 && hydraulics.pressure_drop_per_tray < 800.0);
        assert_relative_eq!(hydraulics.approach_to_flood, 80.0, max_relative = 1e-12);
    }

    #[test]
    fn test_diameter_monotonic_in_vapor_flow() {
        let design = ColumnDesign::default();
        let mut input = benzene_toluene();
        let mut previous = 0.0;
        for flow in [0.0, 1.0, 10.0, 50.0, 100.0, 500.0, 2000.0] {
            input.vapor_flow = flow;
            let diameter = size_column(&input, &design).tower_diameter;
            assert!(diameter >= previous, "diameter fell at V = {}", flow);
            previous = diameter;
        }
    }

    #[test]
    fn test_zero_vapor_flow_gives_zero_diameter() {
        let design = ColumnDesign::default();
        let mut idle = benzene_toluene();
        idle.vapor_flow = 0.0;

        let sizing = size_column(&idle, &design);
        assert!(sizing.error.is_none(), "{:?}", sizing.error);
        assert_eq!(sizing.tower_diameter, 0.0);
        assert_relative_eq!(sizing.tower_height, 12.0, max_relative = 1e-12);

        idle.vapor_flow = -1.0;
        let sizing = size_column(&idle, &design);
        assert_eq!(sizing.tower_diameter, 1.0);
        assert!(sizing.error.unwrap().contains("vapor_flow must be non-negative"));
    }

    #[test]
    fn test_faults_give_defaults() {
        let design = ColumnDesign::default();

        let mut inverted = benzene_toluene();
        inverted.liquid_density = 1.0;
        let sizing = size_column(&inverted, &design);
        assert_eq!(sizing.tower_diameter, 1.0);
        assert_eq!(sizing.tower_height, 10.0);
        assert_eq!(sizing.tray_spacing, 0.6);
        assert!(sizing.hydraulics.is_none());
        assert!(sizing.error.unwrap().contains("does not exceed"));

        let mut empty = benzene_toluene();
        empty.stages = 0;
        assert!(size_column(&empty, &design).error.is_some());

        let mut nan = benzene_toluene();
        nan.vapor_density = f64::NAN;
        assert!(size_column(&nan, &design).error.is_some());
    }

    #[test]
    fn test_design_builder() {
        let design = ColumnDesign::default().with_tray_spacing(0.5).with_design_factor(0.7);
        let sizing = size_column(&benzene_toluene(), &design);
        assert_relative_eq!(sizing.tower_height, 10.0, max_relative = 1e-12);
        assert_relative_eq!(sizing.hydraulics.unwrap().approach_to_flood, 70.0, max_relative = 1e-12);
    }
}
