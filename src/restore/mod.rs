pub mod executor;
pub mod format;
pub mod hooks;
pub mod preflight;
pub mod summary;

use std::io::{self, BufRead};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ServiceLookup;
use crate::console::{Console, Verbosity};
use crate::errors::{RestoreError, Result};
use crate::restore::format::{DumpFormat, Strategy};
use crate::restore::preflight::PreflightReport;
use crate::restore::summary::RestoreSummary;
use crate::secrets::SecretStore;
use crate::utils::{human_bytes, service_dsn, Clock};

#[derive(Debug, Clone)]
pub enum DumpSource {
    File(PathBuf),
    Stdin,
}

impl DumpSource {
    pub fn is_stdin(&self) -> bool {
        matches!(self, DumpSource::Stdin)
    }

    pub fn describe(&self) -> String {
        match self {
            DumpSource::File(path) => path.display().to_string(),
            DumpSource::Stdin => "standard input".into(),
        }
    }
}

/// A fully-resolved restore order, as assembled from the command line.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub service_id: String,
    pub database: String,
    pub role: String,
    pub source: DumpSource,
    pub format_override: Option<DumpFormat>,
    pub clean: bool,
    pub stop_on_error: bool,
    pub single_transaction: bool,
    pub jobs: Option<NonZeroU32>,
    pub force_hooks: bool,
    pub skip_hooks: bool,
    pub assume_yes: bool,
    pub require_stored_password: bool,
    pub verbosity: Verbosity,
}

pub struct RestoreOutcome {
    pub elapsed: Duration,
    pub summary: Option<RestoreSummary>,
}

/// Drives one restore end to end: preflight, the destructive-restore gate,
/// the pre-restore hook, the tool itself, the post-restore hook, and the
/// closing summary. Every tool failure aborts in place, warning-grade
/// archive exits included; those carry the recoverable tag so callers can
/// tell them apart from hard failures.
pub async fn run_restore_flow(
    request: &RestoreRequest,
    lookup: &dyn ServiceLookup,
    secrets: &dyn SecretStore,
    clock: &dyn Clock,
    console: &Console,
    cancel: &CancellationToken,
) -> Result<RestoreOutcome> {
    let started = clock.now();

    let (report, secret) = preflight::run_preflight(request, lookup, secrets, console).await?;
    confirm_destructive(request, &report, console)?;

    // Child processes never see the password on their command line; only
    // the in-process probe connections embed it.
    let tool_dsn = service_dsn(&report.service, &request.database, &request.role, None)?;
    let probe_dsn = service_dsn(
        &report.service,
        &request.database,
        &request.role,
        secret.as_deref(),
    )?;

    let hooks_on = hooks::hooks_enabled(
        request.force_hooks,
        request.skip_hooks,
        report.timescaledb_version.is_some(),
    );
    if hooks_on {
        hooks::run_pre_restore(&probe_dsn, console).await?;
    } else {
        console.verbose("TimescaleDB restore hooks are disabled for this run");
    }

    let source_note = report
        .source
        .as_ref()
        .map(|evidence| format!(" ({})", human_bytes(evidence.size_bytes)))
        .unwrap_or_default();
    console.info(&format!(
        "Restoring {}{source_note} into {} on {}",
        request.source.describe(),
        request.database,
        report.service.display_name()
    ));

    let env_password = executor::password_env(secrets.kind(), secret.as_deref());
    executor::run_restore(request, &report, &tool_dsn, env_password, console, cancel).await?;

    if hooks_on {
        hooks::run_post_restore(&probe_dsn, console).await?;
    }

    let elapsed = clock.now().saturating_duration_since(started);

    let summary = if report.strategy == Strategy::Script && !console.is_quiet() {
        match summary::collect(&probe_dsn, report.timescaledb_version.is_some()).await {
            Ok(stats) => Some(stats),
            Err(err) => {
                console.warn(&format!("could not collect the post-restore summary: {err}"));
                None
            }
        }
    } else {
        None
    };

    Ok(RestoreOutcome { elapsed, summary })
}

/// `--clean` hands pg_restore license to drop objects, so it has to be
/// acknowledged: interactively when there is a terminal to ask on, with
/// `--yes` when the dump occupies stdin.
fn confirm_destructive(
    request: &RestoreRequest,
    report: &PreflightReport,
    console: &Console,
) -> Result<()> {
    if report.strategy != Strategy::Archive || !request.clean || request.assume_yes {
        return Ok(());
    }
    if request.source.is_stdin() {
        return Err(RestoreError::Preflight(
            "--clean drops existing objects before restoring; pass --yes to confirm \
             when the dump is read from standard input"
                .into(),
        ));
    }

    console.warn(&format!(
        "--clean will drop matching objects in \"{}\" before restoring",
        request.database
    ));
    eprint!("Continue? [y/N] ");
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    if matches!(answer.trim(), "y" | "Y" | "yes" | "Yes" | "YES") {
        Ok(())
    } else {
        Err(RestoreError::Preflight("restore aborted at the confirmation prompt".into()))
    }
}
