//! Excel backend for sheetrelay, driving Excel through COM from a bridge process.
//!
//! This crate spawns a Windows `.exe` under WINE that automates Excel through COM,
//! communicating over JSON-over-stdio. [`ExcelBridge`] implements
//! [`sheetrelay::Automation`], so it plugs straight into a
//! [`sheetrelay::SessionRegistry`].
//!
//! # Architecture
//!
//! ```text
//! SessionRegistry (sheetrelay)
//!     └── ExcelBridge (this crate)
//!           └── spawns: wine excel-com-bridge.exe
//!                 └── COM: Excel.Application (handle table of Workbook/Worksheet/Range objects)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheetrelay::{ops, Access, Executor, SessionConfig, SessionRegistry, Target};
//! use sheetrelay_excel_com::{ExcelBridge, ExcelBridgeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Arc::new(ExcelBridge::new(ExcelBridgeConfig::default()));
//!     let registry = SessionRegistry::new(bridge, SessionConfig::default());
//!     let id = registry.begin("/data/report.xlsx")?;
//!     Executor::new(&registry).execute(&Target::Session(id.clone()), Access::Write, |wb| {
//!         ops::set_values(wb, "Sheet1", "B2", &[vec![42.into()]])
//!     })?;
//!     registry.commit(&id, true)?;
//!     Ok(())
//! }
//! ```

mod automation;
mod bridge;

pub use bridge::{find_bridge_exe, linux_to_wine_path, BridgeError, ExcelBridge, ExcelBridgeConfig};
