//! Gas Receipt Logger
//!
//! Records fuel-ups in LubeLogger from a photo of the receipt:
//! - `serve` runs the submission API (vision extraction, document upload, gas record)
//! - `submit` fills in the fuel-up form from the command line and posts it to the API
//! - `vehicles` / `health` query a running API

mod api;
mod api_routes;
mod auth;
mod config;
mod error;
mod extraction;
mod form;
mod lubelogger;
mod server;
mod state;
mod submission;
mod theme;
mod vehicles;

use crate::api::{BackendClient, ClientError, FormSession, SubmissionStatus};
use crate::config::Config;
use crate::form::{FormField, GasForm, OdometerInputMethod, Upload, YesNo};
use crate::theme::{Palette, Theme};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "gas_receipt=info,tower_http=info";

/// Gas Receipt Logger - log fuel-ups in LubeLogger from receipt photos
#[derive(Parser)]
#[command(name = "gas-receipt")]
#[command(version)]
#[command(about = "Log fuel-ups in LubeLogger from a photo of the receipt")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the submission API
    Serve {
        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Fill in the fuel-up form and submit it
    Submit {
        /// LubeLogger vehicle id (see `gas-receipt vehicles`)
        #[arg(short, long)]
        vehicle: Option<String>,

        /// Photo of the gas receipt
        #[arg(short, long)]
        receipt: Option<PathBuf>,

        /// How the odometer reading is provided (separate_photo, on_receipt_photo, manual)
        #[arg(short = 'm', long)]
        odometer_method: Option<OdometerInputMethod>,

        /// Photo of the odometer (with --odometer-method separate_photo)
        #[arg(long)]
        odometer_photo: Option<PathBuf>,

        /// Odometer reading (with --odometer-method manual)
        #[arg(long)]
        odometer_reading: Option<String>,

        /// Did you fill the tank to full? (yes/no)
        #[arg(long)]
        filled_to_full: Option<String>,

        /// Did you log your last fill-up? (yes/no)
        #[arg(long)]
        filled_last_time: Option<String>,

        /// Name recorded in the notes (overrides config)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List vehicles available to the form
    Vehicles,

    /// Check that the API can reach LubeLogger
    Health,

    /// Show or change the colour theme
    Theme {
        /// New theme; omit to show the current one
        #[arg(value_enum)]
        choice: Option<ThemeArg>,
    },

    /// Show configuration information
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
    Toggle,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load()?;
    let palette = config.ui.theme.palette();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::start_server(config))?;
        }
        Commands::Submit {
            vehicle,
            receipt,
            odometer_method,
            odometer_photo,
            odometer_reading,
            filled_to_full,
            filled_last_time,
            user,
        } => {
            let mut form = GasForm {
                vehicle_id: vehicle.unwrap_or_default(),
                receipt_photo: receipt.as_deref().map(Upload::from_path).transpose()?,
                odometer_photo: odometer_photo.as_deref().map(Upload::from_path).transpose()?,
                odometer_reading: odometer_reading.unwrap_or_default(),
                filled_to_full: parse_answer(filled_to_full.as_deref(), "--filled-to-full")?,
                filled_last_time: parse_answer(filled_last_time.as_deref(), "--filled-last-time")?,
                user_name: user.or_else(|| config.client.user_name.clone()),
                odometer_input_method: odometer_method,
                ..GasForm::default()
            };
            warn_hidden_inputs(&form, &palette);
            if let Some(method) = odometer_method {
                form.select_odometer_method(method);
            }

            let client = BackendClient::new(&config.client)?;
            let rt = tokio::runtime::Runtime::new()?;
            run_submit(&rt, client, form, &palette)?;
        }
        Commands::Vehicles => {
            let client = BackendClient::new(&config.client)?;
            let rt = tokio::runtime::Runtime::new()?;
            let vehicles = rt
                .block_on(client.fetch_vehicles())
                .with_context(|| format!("Failed to fetch vehicles from {}", client.base_url()))?;

            if vehicles.is_empty() {
                println!("{}", palette.muted("No vehicles available."));
            }
            for vehicle in vehicles {
                println!(
                    "{:>6}  {}",
                    palette.accent(&vehicle.id_string()),
                    vehicle.display_name()
                );
            }
        }
        Commands::Health => {
            let client = BackendClient::new(&config.client)?;
            let rt = tokio::runtime::Runtime::new()?;
            match rt.block_on(client.health()) {
                Ok(()) => println!("{} {}", palette.success("OK"), client.base_url()),
                Err(err) => {
                    println!("{} {}", palette.error("Unhealthy:"), err);
                    std::process::exit(1);
                }
            }
        }
        Commands::Theme { choice } => {
            // Write back the file contents only so env secrets are never persisted.
            let mut stored = Config::load_file()?;
            let current = stored.ui.theme;
            let next = match choice {
                None => current,
                Some(ThemeArg::Light) => Theme::Light,
                Some(ThemeArg::Dark) => Theme::Dark,
                Some(ThemeArg::Toggle) => current.toggle(),
            };
            if next != current {
                stored.ui.theme = next;
                stored.save()?;
            }
            let palette = next.palette();
            println!("{} {}", next.icon(), palette.accent(&format!("{next} theme")));
        }
        Commands::Config => show_config_info(&config, &palette)?,
    }

    Ok(())
}

fn parse_answer(value: Option<&str>, flag: &str) -> Result<Option<YesNo>> {
    value
        .map(|v| v.parse::<YesNo>().map_err(|err| anyhow::anyhow!("{flag}: {err}")))
        .transpose()
}

/// Tell the user about flags the chosen odometer method does not use.
fn warn_hidden_inputs(form: &GasForm, palette: &Palette) {
    let method = form
        .odometer_input_method
        .map_or("no odometer method", OdometerInputMethod::label);
    let supplied = [
        (FormField::OdometerPhoto, form.odometer_photo.is_some(), "--odometer-photo"),
        (FormField::OdometerReading, !form.odometer_reading.trim().is_empty(), "--odometer-reading"),
    ];
    for (field, given, flag) in supplied {
        if given && !form.is_visible(field) {
            println!("{}", palette.muted(&format!("Ignoring {flag}: not used with {method}")));
        }
    }
}

fn run_submit(
    rt: &tokio::runtime::Runtime,
    client: BackendClient,
    form: GasForm,
    palette: &Palette,
) -> Result<()> {
    let session = FormSession::new(client, form);

    println!("{}", palette.accent("Submitting fuel-up..."));
    match rt.block_on(session.submit()) {
        Ok(response) => {
            println!("{}", palette.success(&response.message));
            let receipt = &response.receipt_data;
            if let Some(cost) = receipt.total_cost {
                println!("  {} ${cost:.2}", palette.muted("Total:"));
            }
            if let Some(gallons) = receipt.gallons_purchased {
                println!("  {} {gallons:.3}", palette.muted("Gallons:"));
            }
            if let Some(odometer) = receipt.odometer_reading {
                println!("  {} {odometer}", palette.muted("Odometer:"));
            }
            if let Some(date) = receipt.purchase_datetime() {
                println!("  {} {date}", palette.muted("Date:"));
            }
        }
        Err(ClientError::Validation(errors)) => {
            println!(
                "{}",
                palette.error(&format!("The form has {} problem(s):", errors.len()))
            );
            for (field, message) in errors.iter() {
                println!("  {} {}", palette.accent(field.wire_name()), message);
            }
            if errors.contains(FormField::OdometerInputMethod) {
                println!("\n{}", palette.muted("Odometer input methods:"));
                for method in OdometerInputMethod::ALL {
                    println!("  {:<18} {}", method.as_str(), method.label());
                }
            }
            std::process::exit(2);
        }
        Err(err) => {
            let message = match session.status() {
                Some(SubmissionStatus::Error(message)) => message,
                _ => err.to_string(),
            };
            println!("{} {}", palette.error("Error:"), message);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn show_config_info(config: &Config, palette: &Palette) -> Result<()> {
    println!("{}\n", palette.accent("Gas Receipt Logger Configuration"));

    match config::get_config_path() {
        Ok(path) => {
            println!("{} {}", palette.accent("Config file:"), path);
            if std::path::Path::new(&path).exists() {
                println!("  {}", palette.success("Exists"));
            } else {
                println!("  {}", palette.muted("Not created yet (will use defaults)"));
            }
        }
        Err(e) => println!("{} Could not determine config path: {e}", palette.error("Error:")),
    }

    let set_or_missing = |value: Option<&str>| match value {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => palette.muted("(not set)").to_string(),
    };

    println!("\n{}", palette.accent("Server"));
    println!("  listen:       {}:{}", config.server.host, config.server.port);
    println!("  lubelogger:   {}", set_or_missing(config.lubelogger.base_url.as_deref()));
    println!("  vision model: {}", config.extraction.model);
    println!(
        "  vision key:   {}",
        if config.extraction.api_key.is_some() { "set" } else { "(not set)" }
    );
    println!(
        "  auth:         {}",
        if config.auth.is_enabled() {
            config.auth.domain.clone().unwrap_or_default()
        } else {
            "disabled".to_string()
        }
    );

    println!("\n{}", palette.accent("Client"));
    println!("  api:          {}", config.client.backend_url);
    println!("  user:         {}", set_or_missing(config.client.user_name.as_deref()));
    println!(
        "  token:        {}",
        if config.client.access_token.is_some() { "set" } else { "(not set)" }
    );
    println!("  theme:        {} {}", config.ui.theme.icon(), config.ui.theme);

    Ok(())
}
