//! Separation unit models.
//!
//! - [`distillation`]: rigorous tray-by-tray column solved as one MESH system
//! - [`sizing`]: Souders-Brown diameter and tray-count height of a tray tower
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagewise::catalog::ComponentCatalog;
//! use stagewise::models::{ColumnDesign, ColumnSolverConfig, ColumnSpecification, RigorousColumn};
//! use stagewise::thermodynamics::PropertyEngine;
//!
//! let engine = Arc::new(PropertyEngine::new(Arc::new(ComponentCatalog::with_builtin())));
//! let column = RigorousColumn::new(engine)
//!     .with_config(ColumnSolverConfig::new().with_sizing(ColumnDesign::default()));
//!
//! let spec = ColumnSpecification::new(vec!["benzene".into(), "toluene".into()], 100.0, vec![0.5, 0.5])
//!     .with_feed_conditions(368.15, 101325.0)
//!     .with_stages(20, 10)
//!     .with_reflux_ratio(2.5)
//!     .with_distillate_rate(50.0);
//!
//! let solution = column.solve_column(&spec);
//! println!("xD = {:?}, D = {:?} m", solution.distillate_composition, solution.sizing.map(|s| s.tower_diameter));
//! ```

pub mod distillation;
pub mod sizing;

pub use distillation::{
    ColumnError, ColumnSolution, ColumnSolverConfig, ColumnSpecification, ColumnStatus, RigorousColumn, StageState,
};
pub use sizing::{ColumnDesign, ColumnSizing, Hydraulics, SizingError, SizingInput, size_column, souders_brown_constant};
