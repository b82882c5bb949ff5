//! In-memory tables and the loaders that build them.

/// Delimited file loader.
pub mod loader;
/// Tables built from caller-supplied JSON rows.
pub mod rows;
/// Column/cell model shared by every loader.
pub mod table;

pub use loader::DatasetLoader;
pub use table::{Cell, Column, ColumnKind, Dataset};
