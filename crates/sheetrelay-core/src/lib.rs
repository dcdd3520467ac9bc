//! # sheetrelay-core
//!
//! Plain data types shared by every sheetrelay crate:
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing, including whole rows and columns
//! - [`SheetReference`] - an address optionally qualified with a sheet name (`'Q1 Data'!A1:B2`)
//! - [`NamedRange`] and [`NamedRangeCollection`] - workbook-level defined names
//! - [`CellValue`] - values exchanged with the automation backends
//!
//! Nothing in here talks to a spreadsheet application; the types only describe
//! what callers ask for and what comes back.
//!
//! ## Example
//!
//! ```rust
//! use sheetrelay_core::SheetReference;
//!
//! let reference = SheetReference::parse("'Q1 Data'!A1:B2").unwrap();
//! assert_eq!(reference.sheet.as_deref(), Some("Q1 Data"));
//! assert_eq!(reference.range.row_count(), 2);
//! ```

pub mod cell;
pub mod error;
pub mod named_range;
pub mod reference;

pub use cell::{CellAddress, CellError, CellRange, CellValue};
pub use error::{Error, Result};
pub use named_range::{NamedRange, NamedRangeCollection};
pub use reference::{quote_sheet_name, split_sheet_qualifier, SheetReference};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
