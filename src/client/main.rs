//! End-user command line: check the license file on this machine.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use licstore::config::get_config;
use licstore::errors::LicenseResult;
use licstore::hardware::HardwareComponents;
use licstore::logging::init_logging;
use licstore::validator::{BindingMode, LicenseState, Validator};

#[derive(Parser, Debug)]
#[command(author, version, about = "licstore client - license status for this machine", long_about = None)]
struct Cli {
    /// License file (overrides config and LICSTORE_VALIDATOR_LICENSE_PATH)
    #[arg(short, long, global = true)]
    license: Option<PathBuf>,

    /// Binding policy (overrides config and LICSTORE_BINDING_POLICY)
    #[arg(long, global = true)]
    policy: Option<BindingMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the license state without changing anything
    Status,
    /// Validate and bind this device if a slot is free
    Validate,
    /// Print this machine's fingerprint
    Fingerprint,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> LicenseResult<ExitCode> {
    let config = get_config()?;
    init_logging(&config.logging);

    if let Command::Fingerprint = cli.command {
        println!("{}", HardwareComponents::detect().fingerprint());
        return Ok(ExitCode::SUCCESS);
    }

    let path = match cli.license {
        Some(path) => path,
        None => config.validator.resolved_license_path()?,
    };
    let policy = match cli.policy {
        Some(policy) => policy,
        None => config.validator.binding_mode()?,
    };
    let validator = Validator::new(path).with_policy(policy);

    let report = match cli.command {
        Command::Validate => validator.validate()?,
        _ => validator.status_report(),
    };

    println!("state: {}", report.state);
    if let Some(key) = &report.key {
        println!("key: {key}");
    }
    if let Some(plan) = report.plan {
        println!("plan: {}", plan.label());
    }
    if let Some(days) = report.days_until_expiry {
        println!("days until expiry: {days}");
    }
    if let Some(reason) = &report.reason {
        println!("reason: {reason}");
    }

    Ok(if report.state == LicenseState::Active {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
