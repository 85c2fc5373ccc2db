//! Pure-component reference data.
//!
//! The catalog stores one [`Component`] record per chemical species with the
//! constants needed by the property correlations: critical properties,
//! acentric factor, Antoine vapor-pressure coefficients and ideal-gas heat
//! capacity polynomials.
//!
//! The catalog is built once (built-in data plus optional imports and custom
//! records) and then shared read-only, typically behind an `Arc`:
//!
//! ```
//! use std::sync::Arc;
//! use stagewise::catalog::ComponentCatalog;
//!
//! let catalog = Arc::new(ComponentCatalog::with_builtin());
//! let benzene = catalog.get("Benzene").unwrap();
//! assert_eq!(benzene.formula, "C6H6");
//! assert!(catalog.get("71-43-2").is_some());
//! ```
//!
//! # Identifier matching
//!
//! Identifiers are normalized (lowercase, `-` and spaces become `_`) and
//! matched against record keys first, then case-insensitively against names
//! and formulas, then exactly against CAS numbers.

mod builtin;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised by catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No record matches the identifier
    #[error("Component not found: {0}")]
    NotFound(String),
    /// A required field is missing or empty
    #[error("Required field '{field}' missing from component '{id}'")]
    MissingField {
        /// Component identifier
        id: String,
        /// Field name
        field: &'static str,
    },
    /// A field holds an unusable value
    #[error("Invalid field '{field}' in component '{id}': {reason}")]
    InvalidField {
        /// Component identifier
        id: String,
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
    /// Reading or writing a catalog file failed
    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The catalog document could not be (de)serialized
    #[error("Catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reference data for one chemical species.
///
/// Units: molecular weight g/mol, temperatures K, pressures Pa, critical volume
/// m³/kmol, energies J/mol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Catalog key
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Chemical formula
    #[serde(default)]
    pub formula: String,
    /// CAS registry number
    #[serde(default)]
    pub cas_number: String,
    /// Molecular weight [g/mol]
    #[serde(default)]
    pub molecular_weight: f64,
    /// Critical temperature [K]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_temperature: Option<f64>,
    /// Critical pressure [Pa]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_pressure: Option<f64>,
    /// Critical volume [m³/kmol]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_volume: Option<f64>,
    /// Acentric factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acentric_factor: Option<f64>,
    /// Antoine A, B, C for P_sat in mmHg and T in °C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antoine_coefficients: Option<[f64; 3]>,
    /// Ideal-gas Cp = A + BT + CT² + DT³ [J/(mol*K)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_capacity_coefficients: Option<[f64; 4]>,
    /// Normal boiling point [K]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_boiling_point: Option<f64>,
    /// Melting point [K]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melting_point: Option<f64>,
    /// Ideal-gas heat of formation at 298.15 K [J/mol]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_of_formation: Option<f64>,
    /// Heat of vaporization at the normal boiling point [J/mol]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_of_vaporization: Option<f64>,
    /// Liquid density correlation coefficients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquid_density_coefficients: Option<Vec<f64>>,
    /// Liquid viscosity correlation coefficients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viscosity_coefficients: Option<Vec<f64>>,
}

impl Component {
    /// Default record used when a species is not in the catalog.
    ///
    /// Carries a generic molecular weight (100 g/mol), Antoine coefficients and
    /// a constant heat capacity so calculations can proceed.
    pub fn synthetic(identifier: &str) -> Self {
        Component {
            id: ComponentCatalog::normalize_id(identifier),
            name: identifier.to_string(),
            formula: String::new(),
            cas_number: String::new(),
            molecular_weight: 100.0,
            critical_temperature: None,
            critical_pressure: None,
            critical_volume: None,
            acentric_factor: None,
            antoine_coefficients: Some([8.0, 1500.0, 250.0]),
            heat_capacity_coefficients: Some([29.1, 0.0, 0.0, 0.0]),
            normal_boiling_point: None,
            melting_point: None,
            heat_of_formation: None,
            heat_of_vaporization: None,
            liquid_density_coefficients: None,
            viscosity_coefficients: None,
        }
    }

    /// Returns completeness and consistency warnings for this record.
    ///
    /// An empty list means the record carries every field the property
    /// correlations can use.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.name.trim().is_empty() {
            warnings.push("Missing required field: name".to_string());
        }
        if self.formula.trim().is_empty() {
            warnings.push("Missing required field: formula".to_string());
        }

        let recommended = [
            ("critical_temperature", self.critical_temperature.is_some()),
            ("critical_pressure", self.critical_pressure.is_some()),
            ("critical_volume", self.critical_volume.is_some()),
            ("acentric_factor", self.acentric_factor.is_some()),
            ("antoine_coefficients", self.antoine_coefficients.is_some()),
            ("normal_boiling_point", self.normal_boiling_point.is_some()),
        ];
        for (field, present) in recommended {
            if !present {
                warnings.push(format!("Missing recommended field: {}", field));
            }
        }

        if self.molecular_weight <= 0.0 {
            warnings.push("Molecular weight must be positive".to_string());
        }
        if self.critical_temperature.is_some_and(|tc| tc <= 0.0) {
            warnings.push("Critical temperature must be positive".to_string());
        }

        warnings
    }

    /// Whether the record carries Tc, Pc and ω.
    pub fn has_critical_constants(&self) -> bool {
        self.critical_temperature.is_some()
            && self.critical_pressure.is_some()
            && self.acentric_factor.is_some()
    }

    fn check_required(&self, id: &str) -> CatalogResult<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::MissingField { id: id.to_string(), field: "name" });
        }
        if self.formula.trim().is_empty() {
            return Err(CatalogError::MissingField { id: id.to_string(), field: "formula" });
        }
        if self.molecular_weight == 0.0 {
            return Err(CatalogError::MissingField { id: id.to_string(), field: "molecular_weight" });
        }
        if !self.molecular_weight.is_finite() || self.molecular_weight < 0.0 {
            return Err(CatalogError::InvalidField {
                id: id.to_string(),
                field: "molecular_weight",
                reason: format!("{} is not a positive number", self.molecular_weight),
            });
        }
        Ok(())
    }
}

/// Components resolved for a calculation, with substitution warnings.
#[derive(Debug, Clone, Default)]
pub struct ResolvedComponents {
    /// One record per requested identifier, in order
    pub components: Vec<Component>,
    /// Warnings for identifiers replaced by synthetic records
    pub warnings: Vec<String>,
}

/// Collection of component records keyed by normalized identifier.
#[derive(Debug, Clone, Default)]
pub struct ComponentCatalog {
    components: BTreeMap<String, Component>,
}

impl ComponentCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the built-in species.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        for component in builtin::components() {
            catalog.components.insert(component.id.clone(), component);
        }
        tracing::info!(count = catalog.len(), "loaded built-in components");
        catalog
    }

    /// Normalizes an identifier into catalog key form.
    pub fn normalize_id(identifier: &str) -> String {
        identifier.trim().to_lowercase().replace(['-', ' '], "_")
    }

    fn find(&self, identifier: &str) -> Option<&Component> {
        let key = Self::normalize_id(identifier);
        if let Some(component) = self.components.get(&key) {
            return Some(component);
        }

        let needle = identifier.trim();
        self.components.values().find(|c| {
            c.name.eq_ignore_ascii_case(needle)
                || (!c.formula.is_empty() && c.formula.eq_ignore_ascii_case(needle))
                || (!c.cas_number.is_empty() && c.cas_number == needle)
        })
    }

    /// Returns a copy of the record matching `identifier`.
    pub fn get(&self, identifier: &str) -> Option<Component> {
        self.find(identifier).cloned()
    }

    /// Returns the record matching `identifier` or a not-found error.
    pub fn lookup(&self, identifier: &str) -> CatalogResult<&Component> {
        self.find(identifier).ok_or_else(|| CatalogError::NotFound(identifier.to_string()))
    }

    /// Whether a record matches `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.find(identifier).is_some()
    }

    /// Resolves identifiers for a calculation.
    ///
    /// Unknown identifiers are replaced by [`Component::synthetic`] records and
    /// reported in the returned warnings.
    pub fn resolve<S: AsRef<str>>(&self, identifiers: &[S]) -> ResolvedComponents {
        let mut resolved = ResolvedComponents::default();
        for identifier in identifiers {
            let identifier = identifier.as_ref();
            match self.find(identifier) {
                Some(component) => resolved.components.push(component.clone()),
                None => {
                    tracing::warn!(component = identifier, "component not found, using default data");
                    resolved.warnings.push(format!(
                        "Component '{}' not found in catalog; using default properties",
                        identifier
                    ));
                    resolved.components.push(Component::synthetic(identifier));
                }
            }
        }
        resolved
    }

    /// Case-insensitive substring search over names, formulas and keys.
    pub fn search(&self, query: &str) -> Vec<Component> {
        let query = query.to_lowercase();
        self.components
            .iter()
            .filter(|(key, c)| {
                c.name.to_lowercase().contains(&query)
                    || c.formula.to_lowercase().contains(&query)
                    || key.contains(&query)
            })
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Adds or replaces a custom record.
    ///
    /// # Errors
    ///
    /// `MissingField` when name, formula or molecular weight are absent,
    /// `InvalidField` when the molecular weight is negative or not finite.
    pub fn add_component(&mut self, id: &str, mut component: Component) -> CatalogResult<()> {
        let key = Self::normalize_id(id);
        component.check_required(&key)?;
        component.id = key.clone();
        tracing::info!(component = %key, "added component");
        self.components.insert(key, component);
        Ok(())
    }

    /// Names of all records.
    pub fn names(&self) -> Vec<String> {
        self.components.values().map(|c| c.name.clone()).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the catalog holds no records.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Records whose molecular weight lies within `tolerance` of the target,
    /// closest first.
    pub fn similar_by_molecular_weight(&self, molecular_weight: f64, tolerance: f64) -> Vec<Component> {
        let mut matches: Vec<Component> = self
            .components
            .values()
            .filter(|c| (c.molecular_weight - molecular_weight).abs() <= tolerance)
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            let da = (a.molecular_weight - molecular_weight).abs();
            let db = (b.molecular_weight - molecular_weight).abs();
            da.total_cmp(&db)
        });
        matches
    }

    /// Serializes the catalog as a JSON object keyed by component id.
    pub fn export_json(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(&self.components)?)
    }

    /// Merges records from a JSON object keyed by component id.
    ///
    /// Every record is validated before any is inserted, so a failed import
    /// leaves the catalog unchanged. Returns the number of imported records.
    pub fn import_json(&mut self, json: &str) -> CatalogResult<usize> {
        let incoming: BTreeMap<String, Component> = serde_json::from_str(json)?;

        let mut staged = Vec::with_capacity(incoming.len());
        for (id, mut component) in incoming {
            let key = Self::normalize_id(&id);
            component.check_required(&key)?;
            component.id = key.clone();
            staged.push((key, component));
        }

        let count = staged.len();
        self.components.extend(staged);
        tracing::info!(count, "imported components");
        Ok(count)
    }

    /// Writes the catalog to a JSON file.
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> CatalogResult<()> {
        let path = path.as_ref();
        fs::write(path, self.export_json()?)?;
        tracing::info!(path = %path.display(), "exported component catalog");
        Ok(())
    }

    /// Merges records from a JSON file.
    pub fn import_from_path(&mut self, path: impl AsRef<Path>) -> CatalogResult<usize> {
        let json = fs::read_to_string(path)?;
        self.import_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str, formula: &str, molecular_weight: f64) -> Component {
        let mut component = Component::synthetic(name);
        component.formula = formula.to_string();
        component.molecular_weight = molecular_weight;
        component
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = ComponentCatalog::with_builtin();
        assert_eq!(catalog.len(), 16);
        assert!(catalog.names().contains(&"Benzene".to_string()));
    }

    #[test]
    fn test_lookup_by_key_name_formula_and_cas() {
        let catalog = ComponentCatalog::with_builtin();

        assert_eq!(catalog.get("n-butane").unwrap().name, "n-Butane");
        assert_eq!(catalog.get("Carbon Dioxide").unwrap().formula, "CO2");
        assert_eq!(catalog.get("c7h8").unwrap().name, "Toluene");
        assert_eq!(catalog.get("64-17-5").unwrap().name, "Ethanol");
        assert!(catalog.get("unobtainium").is_none());
        assert!(matches!(catalog.lookup("unobtainium"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_get_returns_copy() {
        let catalog = ComponentCatalog::with_builtin();
        let mut water = catalog.get("water").unwrap();
        water.molecular_weight = 1.0;
        assert_eq!(catalog.get("water").unwrap().molecular_weight, 18.015);
    }

    #[test]
    fn test_search() {
        let catalog = ComponentCatalog::with_builtin();
        let names: Vec<String> = catalog.search("eth").into_iter().map(|c| c.name).collect();

        assert!(names.contains(&"Methane".to_string()));
        assert!(names.contains(&"Ethanol".to_string()));
        assert!(names.contains(&"Methanol".to_string()));
        assert!(!names.contains(&"Water".to_string()));
    }

    #[test]
    fn test_add_component_requires_identity_and_weight() {
        let mut catalog = ComponentCatalog::new();

        let no_formula = custom("Xylene", "", 106.16);
        assert!(matches!(
            catalog.add_component("xylene", no_formula),
            Err(CatalogError::MissingField { field: "formula", .. })
        ));

        let no_weight = custom("Xylene", "C8H10", 0.0);
        assert!(matches!(
            catalog.add_component("xylene", no_weight),
            Err(CatalogError::MissingField { field: "molecular_weight", .. })
        ));

        let negative = custom("Xylene", "C8H10", -1.0);
        assert!(matches!(
            catalog.add_component("xylene", negative),
            Err(CatalogError::InvalidField { .. })
        ));

        catalog.add_component("O-Xylene", custom("o-Xylene", "C8H10", 106.16)).unwrap();
        assert_eq!(catalog.get("o_xylene").unwrap().id, "o_xylene");
    }

    #[test]
    fn test_similar_by_molecular_weight_sorted() {
        let catalog = ComponentCatalog::with_builtin();
        let similar = catalog.similar_by_molecular_weight(44.0, 5.0);
        let ids: Vec<&str> = similar.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["carbon_dioxide", "propane", "ethanol"]);
    }

    #[test]
    fn test_validate_component() {
        let catalog = ComponentCatalog::with_builtin();
        assert!(catalog.get("benzene").unwrap().validate().is_empty());

        let synthetic = Component::synthetic("mystery");
        let warnings = synthetic.validate();
        assert!(warnings.iter().any(|w| w.contains("formula")));
        assert!(warnings.iter().any(|w| w.contains("critical_temperature")));
        assert!(!warnings.iter().any(|w| w.contains("antoine")));
    }

    #[test]
    fn test_resolve_substitutes_unknown() {
        let catalog = ComponentCatalog::with_builtin();
        let resolved = catalog.resolve(&["benzene", "mystery"]);

        assert_eq!(resolved.components.len(), 2);
        assert_eq!(resolved.components[1].molecular_weight, 100.0);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("mystery"));
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut source = ComponentCatalog::new();
        source.add_component("xylene", custom("Xylene", "C8H10", 106.16)).unwrap();
        source.export_to_path(&path).unwrap();

        let mut target = ComponentCatalog::with_builtin();
        let count = target.import_from_path(&path).unwrap();

        assert_eq!(count, 1);
        assert_eq!(target.len(), 17);
        assert_eq!(target.get("C8H10").unwrap(), source.get("xylene").unwrap());
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let mut catalog = ComponentCatalog::new();
        let json = r#"{
            "good": {"name": "Good", "formula": "G", "molecular_weight": 10.0},
            "bad": {"name": "Bad", "formula": "B"}
        }"#;

        let result = catalog.import_json(json);
        assert!(matches!(result, Err(CatalogError::MissingField { field: "molecular_weight", .. })));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_import_malformed_json() {
        let mut catalog = ComponentCatalog::new();
        assert!(matches!(catalog.import_json("[1, 2"), Err(CatalogError::Serialization(_))));
    }
}
