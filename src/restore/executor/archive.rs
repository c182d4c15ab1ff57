// restoretool/src/restore/executor/archive.rs
use std::ffi::OsString;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::console::Console;
use crate::errors::{RestoreError, Result};
use crate::restore::executor::{
    applied_rule_names, classify_archive_exit, drain_stderr, render_args, source_input,
    wait_with_cancel, ArgRule, ExecContext,
};
use crate::restore::preflight::PreflightReport;
use crate::restore::RestoreRequest;

/// pg_restore arguments, in the order they are handed to the tool.
/// Ownership and privilege statements are always stripped: the target role
/// on a managed service cannot reproduce arbitrary owners or grants.
pub const ARCHIVE_RULES: &[ArgRule] = &[
    ArgRule { name: "dbname", emit: emit_dbname },
    ArgRule { name: "format", emit: emit_format },
    ArgRule { name: "clean", emit: emit_clean },
    ArgRule { name: "no-owner", emit: emit_no_owner },
    ArgRule { name: "no-privileges", emit: emit_no_privileges },
    ArgRule { name: "single-transaction", emit: emit_single_transaction },
    ArgRule { name: "jobs", emit: emit_jobs },
    ArgRule { name: "exit-on-error", emit: emit_exit_on_error },
    ArgRule { name: "verbose", emit: emit_verbose },
    ArgRule { name: "source", emit: emit_source },
];

fn emit_dbname(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    args.push(format!("--dbname={}", ctx.dsn).into());
}

fn emit_format(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if let Some(hint) = ctx.format.archive_hint() {
        args.push(format!("--format={hint}").into());
    }
}

fn emit_clean(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.clean {
        args.push("--clean".into());
        args.push("--if-exists".into());
    }
}

fn emit_no_owner(_ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    args.push("--no-owner".into());
}

fn emit_no_privileges(_ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    args.push("--no-privileges".into());
}

fn emit_single_transaction(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.single_transaction {
        args.push("--single-transaction".into());
    }
}

fn emit_jobs(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if let Some(jobs) = ctx.jobs {
        args.push(format!("--jobs={jobs}").into());
    }
}

fn emit_exit_on_error(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.stop_on_error {
        args.push("--exit-on-error".into());
    }
}

fn emit_verbose(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.verbosity.is_verbose() {
        args.push("--verbose".into());
    }
}

fn emit_source(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if let Some(path) = ctx.input {
        args.push(path.into());
    }
}

pub async fn run(
    request: &RestoreRequest,
    report: &PreflightReport,
    dsn: &Url,
    env_password: Option<&str>,
    console: &Console,
    cancel: &CancellationToken,
) -> Result<()> {
    let input = source_input(&request.source);
    let ctx = ExecContext {
        dsn,
        format: report.format,
        clean: request.clean,
        stop_on_error: request.stop_on_error,
        single_transaction: request.single_transaction,
        jobs: request.jobs,
        verbosity: request.verbosity,
        input,
    };
    let args = render_args(ARCHIVE_RULES, &ctx);
    if console.is_verbose() {
        console.verbose(&format!(
            "pg_restore rules applied: {}",
            applied_rule_names(ARCHIVE_RULES, &ctx).join(", ")
        ));
    }

    let mut cmd = Command::new(&report.tool_path);
    cmd.args(&args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .stdin(if input.is_some() {
            Stdio::null()
        } else {
            Stdio::inherit()
        })
        .kill_on_drop(true);
    if let Some(password) = env_password {
        cmd.env("PGPASSWORD", password);
    }

    let mut child = cmd.spawn()?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RestoreError::tool_fatal("failed to capture pg_restore stderr".into()))?;
    let tee = drain_stderr(stderr, *console);

    let status = wait_with_cancel(&mut child, cancel).await;
    let captured = tee.await.unwrap_or_default();
    let status = status?;
    classify_archive_exit(status.code(), &captured)
}
