//! # Stagewise: equilibrium-stage separation calculations
//!
//! Thermodynamic properties, vapor-liquid equilibrium and rigorous
//! distillation for chemical process design.
//!
//! The crate is organised bottom-up:
//!
//! - [`catalog`]: pure-component reference data
//! - [`thermodynamics`]: property engine with a method fallback chain, flash
//!   calculations, bubble/dew points and azeotrope detection
//! - [`solvers`]: Newton solvers for square systems and scalar roots
//! - [`models`]: rigorous MESH column and tower sizing
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stagewise::{ComponentCatalog, FlashCalculator, PropertyEngine, PropertyMethod};
//!
//! let engine = Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())));
//! let flash = FlashCalculator::new(engine).with_method(PropertyMethod::Ideal);
//!
//! let result = flash
//!     .isothermal_flash(&["benzene", "toluene"], &[0.5, 0.5], 368.15, 101325.0)
//!     .unwrap();
//! assert!(result.vapor_fraction > 0.0 && result.vapor_fraction < 1.0);
//! ```
//!
//! ## Optional Features
//!
//! - **`coolprop`**: reference-equation properties for pure fluids using
//!   `rfluids`. Without it `COOLPROP-*` and `REFPROP` requests fall back to
//!   the cubic equations of state.
//!
//! ## Concurrency
//!
//! The catalog and the property engine are immutable after construction and
//! meant to be shared behind an `Arc`. Every calculation owns its working
//! state, so independent flashes and column solves can run in parallel.

pub mod catalog;
pub mod models;
pub mod solvers;
pub mod thermodynamics;

pub use catalog::{CatalogError, Component, ComponentCatalog};
pub use models::{ColumnSolution, ColumnSpecification, RigorousColumn};
pub use solvers::{SolverConfig, SolverError, SteadyStateSolver};
pub use thermodynamics::equilibrium::PhaseEquilibrium;
pub use thermodynamics::flash::{FlashCalculator, FlashResult};
pub use thermodynamics::{MixtureProperties, Phase, PropertyEngine, PropertyMethod, ThermoError};
