//! Operator command line for the license store.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use licstore::config::get_config;
use licstore::delivery::KeyDelivery;
use licstore::errors::{LicenseError, LicenseResult};
use licstore::intake::IntakeRequest;
use licstore::logging::init_logging;
use licstore::plans::{Plan, PlanOverrides};
use licstore::price::Price;
use licstore::records::NewCustomer;
use licstore::report::admin_report;
use licstore::store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about = "licstore - license key store administration", long_about = None)]
struct Cli {
    /// License database path (overrides config and LICSTORE_STORE_PATH)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint new keys for a plan
    Generate(GenerateArgs),
    /// Manage customers
    #[command(subcommand)]
    Customer(CustomerCommand),
    /// Assign a generated key to a customer
    Assign { key: String, email: String },
    /// Bind a key to a device
    Activate { key: String, hardware_id: String },
    /// Revoke a key
    Revoke { key: String },
    /// Move overdue assigned/activated keys to expired
    Expire,
    /// Print a license record
    Show { key: String },
    /// List keys, optionally for one plan
    List {
        #[arg(long)]
        plan: Option<Plan>,
    },
    /// Print store statistics as JSON
    Stats,
    /// Print the operator report
    Report,
    /// Write a single license file for the client validator
    Export { key: String, path: PathBuf },
    /// Write a copy containing only unsold keys
    CleanCopy { path: PathBuf },
    /// Parse a request message and issue a key for it
    Intake {
        file: PathBuf,
        /// Only print the parsed request
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the delivery message for an assigned key
    Compose { key: String },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    plan: Plan,
    /// Validity in days (at most 365000)
    #[arg(long)]
    days: Option<u32>,
    /// Price per billing period in dollars, e.g. 29.99
    #[arg(long)]
    price: Option<Price>,
    /// Device slots
    #[arg(long)]
    devices: Option<u32>,
    /// Billing periods (monthly, quarterly and multi_device only)
    #[arg(long)]
    periods: Option<u32>,
    /// Number of keys to mint
    #[arg(long, default_value_t = 1)]
    count: usize,
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    /// Create a customer (returns the existing one for a known email)
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },
    /// Print a customer record
    Show { email: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> LicenseResult<()> {
    let config = get_config()?;
    init_logging(&config.logging);

    let path = match cli.store {
        Some(path) => path,
        None => config.store.resolved_path()?,
    };
    let mut store = Store::open(&path, config)?;

    match cli.command {
        Command::Generate(args) => {
            let overrides = PlanOverrides {
                duration_days: args.days,
                price: args.price,
                max_devices: args.devices,
                periods: args.periods,
            };
            for record in store.generate_batch(args.plan, overrides, args.count)? {
                println!(
                    "{}  {}  {} days  {} device(s)  ${}",
                    record.key, record.plan, record.duration_days, record.max_devices, record.price
                );
            }
        }
        Command::Customer(CustomerCommand::Add {
            email,
            name,
            phone,
            company,
        }) => {
            let customer = store.create_customer(NewCustomer {
                email,
                name,
                phone,
                company,
            })?;
            print_json(&customer)?;
        }
        Command::Customer(CustomerCommand::Show { email }) => {
            let customer = store
                .lookup_customer(&email)
                .ok_or_else(|| LicenseError::InvalidRequest(format!("no customer {email}")))?;
            print_json(customer)?;
        }
        Command::Assign { key, email } => {
            store.assign(&key, &email)?;
            println!("{} assigned to {}", store.normalize_key(&key), email);
        }
        Command::Activate { key, hardware_id } => {
            if store.activate(&key, &hardware_id)? {
                println!("device bound");
            } else {
                println!("device was already bound");
            }
        }
        Command::Revoke { key } => {
            store.revoke(&key)?;
            println!("{} revoked", store.normalize_key(&key));
        }
        Command::Expire => {
            let count = store.expire_overdue(Utc::now())?;
            println!("{count} license(s) expired");
        }
        Command::Show { key } => print_json(store.license(&key)?)?,
        Command::List { plan } => {
            let records = match plan {
                Some(plan) => store.keys_by_plan(plan),
                None => store.licenses().iter().collect(),
            };
            for record in records {
                println!(
                    "{}  {:<12}  {:<9}  {}  {}",
                    record.key,
                    record.plan,
                    record.status,
                    record.expiry_date.format("%Y-%m-%d"),
                    record.customer_email.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Stats => print_json(&store.get_statistics())?,
        Command::Report => print!("{}", admin_report(&store, Utc::now())),
        Command::Export { key, path } => {
            store.export_license(&key, &path)?;
            println!("license written to {}", path.display());
        }
        Command::CleanCopy { path } => {
            let kept = store.write_clean_copy(&path)?;
            println!("{kept} unsold key(s) written to {}", path.display());
        }
        Command::Intake { file, dry_run } => {
            let raw = fs::read_to_string(&file)?;
            let request = IntakeRequest::parse_message(&raw)?;
            println!(
                "request from {} <{}>: {}",
                request.sender_name, request.sender_email, request.plan
            );
            if !dry_run {
                let (license, customer) = store.fulfil_request(&request)?;
                let message = KeyDelivery::compose(&license, &customer);
                println!("To: {}\nSubject: {}\n\n{}", message.to, message.subject, message.body);
            }
        }
        Command::Compose { key } => {
            let license = store.license(&key)?;
            let customer = store.customer_for_key(&key).ok_or_else(|| {
                LicenseError::InvalidRequest(format!("{} is not assigned", license.key))
            })?;
            let message = KeyDelivery::compose(license, customer);
            println!("To: {}\nSubject: {}\n\n{}", message.to, message.subject, message.body);
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> LicenseResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| LicenseError::SerializationError(e.to_string()))?;
    println!("{json}");
    Ok(())
}
