//! sheetrelay CLI - serve spreadsheet tool calls over stdio

mod config;
mod serve;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sheetrelay::memory::MemoryAutomation;
use sheetrelay::{ops, Access, Automation, CellValue, Executor, SessionRegistry, Target};
use sheetrelay_excel_com::ExcelBridge;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "sheetrelay")]
#[command(
    author,
    version,
    about = "Session-based spreadsheet automation over a JSON tool protocol"
)]
struct Cli {
    /// TOML config file with [session] and [bridge] tables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Excel through the WINE COM bridge
    Excel,
    /// JSON documents handled in-process, no Excel needed
    Memory,
}

#[derive(Args)]
struct BackendArgs {
    /// Automation backend
    #[arg(short, long, value_enum, default_value = "excel")]
    backend: Backend,

    /// Seconds a session may sit idle before it is closed without saving
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Path to excel-com-bridge.exe
    #[arg(long)]
    bridge_exe: Option<PathBuf>,

    /// WINE executable
    #[arg(long)]
    wine: Option<PathBuf>,

    /// WINEPREFIX for the bridge process
    #[arg(long)]
    wine_prefix: Option<PathBuf>,
}

impl BackendArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            idle_timeout_secs: self.idle_timeout,
            bridge_exe: self.bridge_exe.clone(),
            wine: self.wine.clone(),
            wine_prefix: self.wine_prefix.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Answer tool calls read from stdin, one JSON object per line
    Serve {
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Print the values (or formulas) of a range
    Get {
        /// Workbook file
        input: PathBuf,

        /// Range address, sheet-qualified or a defined name
        range: String,

        /// Sheet the address is relative to
        #[arg(short, long, default_value = "")]
        sheet: String,

        /// Print formulas instead of values
        #[arg(short, long)]
        formulas: bool,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Write values into a range and save the workbook
    Set {
        /// Workbook file
        input: PathBuf,

        /// Range address, sheet-qualified or a defined name
        range: String,

        /// Row-major JSON array, e.g. '[[1, "two"], [true, null]]'
        values: String,

        /// Sheet the address is relative to
        #[arg(short, long, default_value = "")]
        sheet: String,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// List the sheets of a workbook
    Sheets {
        /// Workbook file
        input: PathBuf,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        backend: BackendArgs,
    },
}

fn main() -> Result<()> {
    // stdout carries protocol traffic; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let file = cli.config.as_deref();

    match cli.command {
        Commands::Serve { backend } => {
            let registry = open_registry(file, &backend)?;
            let executor = Executor::new(&registry);
            info!("serving tool calls on stdin");
            let result = serve::serve(&executor, io::stdin().lock(), io::stdout().lock());
            registry.shutdown();
            result.map(drop)
        }
        Commands::Get {
            input,
            range,
            sheet,
            formulas,
            backend,
        } => {
            let registry = open_registry(file, &backend)?;
            get_range(&registry, &input, &sheet, &range, formulas)
        }
        Commands::Set {
            input,
            range,
            values,
            sheet,
            backend,
        } => {
            let registry = open_registry(file, &backend)?;
            set_range(&registry, &input, &sheet, &range, &values)
        }
        Commands::Sheets { input, backend } => {
            let registry = open_registry(file, &backend)?;
            let sheets = Executor::new(&registry)
                .execute(&Target::OneShot(input.clone()), Access::Read, ops::list_sheets)
                .with_context(|| format!("Failed to list sheets of '{}'", input.display()))?;
            for (i, name) in sheets.iter().enumerate() {
                println!("{i}\t{name}");
            }
            Ok(())
        }
        Commands::Config { backend } => {
            let config = Config::load(file)?.apply(&backend.overrides());
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_registry(file: Option<&Path>, args: &BackendArgs) -> Result<SessionRegistry> {
    let config = Config::load(file)?.apply(&args.overrides());
    let automation: Arc<dyn Automation> = match args.backend {
        Backend::Excel => Arc::new(ExcelBridge::new(config.bridge)),
        Backend::Memory => Arc::new(MemoryAutomation::new()),
    };
    Ok(SessionRegistry::new(automation, config.session))
}

fn get_range(
    registry: &SessionRegistry,
    input: &Path,
    sheet: &str,
    range: &str,
    formulas: bool,
) -> Result<()> {
    let executor = Executor::new(registry);
    let target = Target::OneShot(input.to_path_buf());
    let json = if formulas {
        let read = executor.execute(&target, Access::Read, |wb| ops::get_formulas(wb, sheet, range));
        serde_json::to_string_pretty(&read.with_context(|| format!("Failed to read '{range}'"))?)?
    } else {
        let read = executor.execute(&target, Access::Read, |wb| ops::get_values(wb, sheet, range));
        serde_json::to_string_pretty(&read.with_context(|| format!("Failed to read '{range}'"))?)?
    };
    println!("{json}");
    Ok(())
}

fn set_range(
    registry: &SessionRegistry,
    input: &Path,
    sheet: &str,
    range: &str,
    values: &str,
) -> Result<()> {
    let values: Vec<Vec<CellValue>> =
        serde_json::from_str(values).context("Values must be a JSON array of rows")?;
    let written = Executor::new(registry)
        .execute(&Target::OneShot(input.to_path_buf()), Access::Write, |wb| {
            ops::set_values(wb, sheet, range, &values)
        })
        .with_context(|| format!("Failed to write '{range}'"))?;
    eprintln!("Wrote {} to '{}'", written.address, input.display());
    Ok(())
}
