//! Command-line surface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cvc", version, about = "Static electrical rule checker for flat transistor netlists")]
pub struct Cli {
    /// Logging verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Optional `cvcrc`-style TOML config file; command-line flags
    /// override values loaded from it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a netlist + model + power file, propagate Min/Sim/Max
    /// voltages, and run the error checker.
    Check {
        /// Flat netlist file.
        #[arg(long)]
        netlist: PathBuf,
        /// Device model file.
        #[arg(long)]
        model: PathBuf,
        /// Power/ground declaration file.
        #[arg(long)]
        power: PathBuf,
        /// Where to write the error report; stdout if omitted.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Gate-oxide / junction overvoltage limit, in mV.
        #[arg(long)]
        overvoltage_limit_mv: Option<i32>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Parse the inputs and report structural diagnostics without running
    /// propagation — useful for quickly catching netlist typos.
    Validate {
        #[arg(long)]
        netlist: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        power: PathBuf,
    },
    /// Print the effective configuration (defaults merged with `--config`)
    /// as TOML, for saving as a starting `cvcrc`.
    Config,
}
