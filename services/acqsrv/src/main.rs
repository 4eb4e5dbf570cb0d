//! Acquisition service entry point

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use acqsrv::bootstrap::{self, Args, Command};
use acqsrv::diagnostics::{self, DiagnosticOutcome};
use acqsrv::{AcqConfig, AcquisitionService};
use gasmon_rtu::{ModbusMaster, SerialPortFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AcqConfig::load(Some(args.config.as_path()))
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    bootstrap::initialize_logging(&args, &config)?;

    let settings = config.serial_settings();
    let mut master = ModbusMaster::with_factory(Arc::new(SerialPortFactory));

    let outcome = match args.command() {
        Command::Run => {
            let mut service =
                AcquisitionService::from_config(&config, Arc::new(SerialPortFactory))
                    .context("Failed to start acquisition")?;
            service.run(common::shutdown_token()).await;
            return Ok(());
        },
        Command::Validate => {
            info!("Configuration {} is valid", args.config.display());
            println!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        },
        Command::SaveConfig { output } => {
            let path = output.unwrap_or_else(|| args.config.clone());
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to {}", path.display());
            return Ok(());
        },
        Command::TestPort => diagnostics::test_port(&mut master, &settings),
        Command::TestComm => {
            diagnostics::test_communication(&mut master, &settings, config.modbus.slave).await
        },
        Command::Command {
            function,
            start,
            length,
        } => {
            diagnostics::run_command(
                &mut master,
                &settings,
                config.modbus.slave,
                function,
                start,
                length,
            )
            .await
        },
    };

    report(outcome)
}

fn report(outcome: DiagnosticOutcome) -> anyhow::Result<()> {
    println!("{}", outcome.status);
    if !outcome.ok {
        bail!("Diagnostic failed");
    }
    Ok(())
}
