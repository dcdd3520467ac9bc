//! Cell-related types
//!
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A rectangular block of cells (e.g., "A1:B10", "C:C", "3:3")
//! - [`CellValue`] - The value carried to and from a cell

mod address;
mod value;

pub use address::{CellAddress, CellRange};
pub use value::{CellError, CellValue};
