//! restoretool
//!
//! Restores PostgreSQL and TimescaleDB dumps into a managed database
//! service, driving pg_restore or psql with the right guardrails for the
//! target.

mod api;
mod cli;
mod config;
mod console;
mod errors;
mod restore;
mod secrets;
mod utils;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::cli::Cli;
use crate::config::Settings;
use crate::console::Console;
use crate::errors::RestoreError;
use crate::restore::RestoreOutcome;
use crate::utils::{human_duration, SystemClock};

/// Conventional exit status for a run stopped by SIGINT.
const INTERRUPTED_EXIT: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = Console::new(cli.verbosity());

    match run_app(cli, &console).await {
        Ok(outcome) => {
            match &outcome.summary {
                Some(stats) => console.info(&stats.render(outcome.elapsed)),
                None => console.success(&format!(
                    "Restore finished in {}",
                    human_duration(outcome.elapsed)
                )),
            }
            ExitCode::SUCCESS
        }
        Err(err) => match err.downcast_ref::<RestoreError>() {
            Some(app_err) if app_err.is_cancelled() => {
                eprintln!("Restore cancelled.");
                ExitCode::from(INTERRUPTED_EXIT)
            }
            Some(app_err) => {
                match app_err.phase() {
                    Some(phase) => eprintln!("❌ Error during {phase}: {err:?}"),
                    None => eprintln!("❌ Error: {err:?}"),
                }
                if app_err.is_recoverable() {
                    eprintln!("Rerun with --stop-on-error to abort at the first failed object.");
                }
                ExitCode::FAILURE
            }
            None => {
                eprintln!("❌ Error: {err:?}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_app(cli: Cli, console: &Console) -> Result<RestoreOutcome> {
    let settings = Settings::load(cli.config.as_deref())
        .context("failed to load the restoretool configuration")?;
    let token = settings
        .access_token
        .as_deref()
        .ok_or(RestoreError::AuthenticationRequired)?;
    let api = ApiClient::new(&settings.api_url, token)?;
    let secrets = secrets::open(settings.password_storage);
    let clock = SystemClock;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let request = cli.into_request();
    let outcome =
        restore::run_restore_flow(&request, &api, secrets.as_ref(), &clock, console, &cancel)
            .await?;
    Ok(outcome)
}
