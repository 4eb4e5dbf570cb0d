//! Command line and logging setup

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{AcqConfig, DEFAULT_CONFIG_PATH};
use crate::error::{AcqSrvError, Result};

pub const SERVICE_NAME: &str = "acqsrv";

/// Command-line arguments for acqsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "acqsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Gas analyzer acquisition service",
    long_about = None
)]
pub struct Args {
    /// Configuration file; missing file means built-in defaults
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll the analyzer until stopped (default)
    Run,
    /// Load and validate the configuration, then exit
    Validate,
    /// Write the effective configuration (defaults, file, environment) as YAML
    SaveConfig {
        /// Target file; defaults to the `--config` path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Open and close the serial port
    TestPort,
    /// FC08 loopback with the configured slave
    TestComm,
    /// Send one request and print the reply as hex
    Command {
        /// Function code: 2, 3, 4 or 8
        #[arg(short, long)]
        function: u8,
        /// Start register, or the FC08 subfunction
        #[arg(short, long, default_value_t = 0)]
        start: u16,
        /// Register count, or the FC08 data word
        #[arg(short = 'n', long, default_value_t = 1)]
        length: u16,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Level from the command line, else from the configuration
    pub fn effective_log_level<'a>(&'a self, config: &'a AcqConfig) -> &'a str {
        self.log_level
            .as_deref()
            .unwrap_or(config.logging.level.as_str())
    }
}

/// Console plus rolling file for `run`; console only for one-shot commands
pub fn initialize_logging(args: &Args, config: &AcqConfig) -> Result<()> {
    let level = args.effective_log_level(config);
    let outcome = match args.command() {
        Command::Run => common::logging::init_with_config(common::logging::LogConfig {
            service_name: SERVICE_NAME.to_string(),
            log_dir: config.logging.dir.clone(),
            level: level.to_string(),
            enable_json: config.logging.json,
            enable_file: true,
        }),
        _ => common::logging::init_console(level),
    };
    outcome.map_err(|e| AcqSrvError::Config(format!("Failed to init logging: {}", e)))
}
