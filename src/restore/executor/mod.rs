pub mod archive;
pub mod script;

use std::ffi::OsString;
use std::num::NonZeroU32;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::console::{Console, Verbosity};
use crate::errors::{RestoreError, Result};
use crate::restore::format::{DumpFormat, Strategy};
use crate::restore::preflight::PreflightReport;
use crate::restore::{DumpSource, RestoreRequest};
use crate::secrets::BackendKind;

/// Everything an argument rule may inspect when deciding what to emit.
pub struct ExecContext<'a> {
    pub dsn: &'a Url,
    pub format: DumpFormat,
    pub clean: bool,
    pub stop_on_error: bool,
    pub single_transaction: bool,
    pub jobs: Option<NonZeroU32>,
    pub verbosity: Verbosity,
    /// Path handed to the tool. `None` means the dump streams in on stdin.
    pub input: Option<&'a Path>,
}

/// One named command-line rule. The tables in `archive` and `script` pin the
/// rules in a fixed order so the rendered argument vector never depends on
/// incidental code layout.
pub struct ArgRule {
    pub name: &'static str,
    pub emit: fn(&ExecContext<'_>, &mut Vec<OsString>),
}

pub fn render_args(rules: &[ArgRule], ctx: &ExecContext<'_>) -> Vec<OsString> {
    let mut args = Vec::new();
    for rule in rules {
        (rule.emit)(ctx, &mut args);
    }
    args
}

/// Names of the rules that emitted at least one argument, for verbose
/// diagnostics.
pub fn applied_rule_names(rules: &[ArgRule], ctx: &ExecContext<'_>) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|rule| {
            let mut scratch = Vec::new();
            (rule.emit)(ctx, &mut scratch);
            !scratch.is_empty()
        })
        .map(|rule| rule.name)
        .collect()
}

/// The password reaches the child process environment only when the secret
/// backend cannot be read by libpq itself.
pub fn password_env<'a>(kind: BackendKind, secret: Option<&'a str>) -> Option<&'a str> {
    if kind.requires_injection() { secret } else { None }
}

/// Dispatches to the strategy picked during preflight, warning about flags
/// the script strategy silently has no use for.
pub async fn run_restore(
    request: &RestoreRequest,
    report: &PreflightReport,
    dsn: &Url,
    env_password: Option<&str>,
    console: &Console,
    cancel: &CancellationToken,
) -> Result<()> {
    if report.strategy == Strategy::Script {
        if request.jobs.is_some() {
            console.warn("--jobs only applies to pg_restore archives; ignoring");
        }
        if request.clean {
            console.warn("--clean only applies to pg_restore archives; ignoring");
        }
    }
    match report.strategy {
        Strategy::Archive => {
            archive::run(request, report, dsn, env_password, console, cancel).await
        }
        Strategy::Script => script::run(request, report, dsn, env_password, console, cancel).await,
    }
}

pub(super) fn source_input<'a>(source: &'a DumpSource) -> Option<&'a Path> {
    match source {
        DumpSource::File(path) => Some(path.as_path()),
        DumpSource::Stdin => None,
    }
}

/// Forwards the tool's stderr to the operator line by line while keeping a
/// copy for exit classification.
pub(super) fn drain_stderr(stderr: ChildStderr, console: Console) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut captured = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            console.tool_line(&line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

/// Waits for the child, killing it if cancellation fires first. `Child::wait`
/// is cancel safe, so losing the race leaves the child reapable by `kill`.
pub(super) async fn wait_with_cancel(
    child: &mut Child,
    cancel: &CancellationToken,
) -> Result<std::process::ExitStatus> {
    tokio::select! {
        result = child.wait() => result.map_err(RestoreError::Io),
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Err(RestoreError::Cancelled)
        }
    }
}

/// pg_restore exit handling. The tool exits non-zero for both hard failures
/// and ignorable per-object errors, so a non-zero exit that produced
/// diagnostics is reported as a recoverable warning carrying the verbatim
/// output, while a silent non-zero exit stays fatal.
pub fn classify_archive_exit(code: Option<i32>, stderr: &str) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(code) => {
            if stderr.trim().is_empty() {
                Err(RestoreError::tool_fatal(format!(
                    "pg_restore exited with status {code} and produced no diagnostics"
                )))
            } else {
                Err(RestoreError::tool_warning(stderr.to_string()))
            }
        }
        None => Err(RestoreError::tool_fatal(
            "pg_restore was terminated by a signal".into(),
        )),
    }
}
