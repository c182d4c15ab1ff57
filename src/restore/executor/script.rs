// restoretool/src/restore/executor/script.rs
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use flate2::read::MultiGzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::console::Console;
use crate::errors::{RestoreError, Result};
use crate::restore::executor::{
    applied_rule_names, drain_stderr, render_args, wait_with_cancel, ArgRule, ExecContext,
};
use crate::restore::format::DumpFormat;
use crate::restore::preflight::PreflightReport;
use crate::restore::{DumpSource, RestoreRequest};

const NULL_DEVICE: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };
const STAGE_CHUNK: usize = 64 * 1024;

/// First line psql prints for a failed statement, with the dump line number.
static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^psql:.*?:(\d+): (?:ERROR|FATAL)").expect("valid pattern"));

/// psql arguments, in the order they are handed to the tool.
pub const SCRIPT_RULES: &[ArgRule] = &[
    ArgRule { name: "no-psqlrc", emit: emit_no_psqlrc },
    ArgRule { name: "dbname", emit: emit_dbname },
    ArgRule { name: "error-mode", emit: emit_error_mode },
    ArgRule { name: "single-transaction", emit: emit_single_transaction },
    ArgRule { name: "output-volume", emit: emit_output_volume },
    ArgRule { name: "file", emit: emit_file },
];

fn emit_no_psqlrc(_ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    args.push("--no-psqlrc".into());
}

fn emit_dbname(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    args.push(format!("--dbname={}", ctx.dsn).into());
}

/// Stop-at-first-error replays set ON_ERROR_STOP; the default keeps going
/// but rolls back each failed statement so one bad line cannot poison an
/// open transaction.
fn emit_error_mode(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.stop_on_error {
        args.push("--set=ON_ERROR_STOP=1".into());
    } else {
        args.push("--set=ON_ERROR_ROLLBACK=on".into());
    }
}

fn emit_single_transaction(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.single_transaction {
        args.push("--single-transaction".into());
    }
}

fn emit_output_volume(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if ctx.verbosity.is_verbose() {
        args.push("--echo-all".into());
    } else {
        args.push("--quiet".into());
        if ctx.verbosity.is_quiet() {
            args.push(format!("--output={NULL_DEVICE}").into());
        }
    }
}

fn emit_file(ctx: &ExecContext<'_>, args: &mut Vec<OsString>) {
    if let Some(path) = ctx.input {
        let mut arg = OsString::from("--file=");
        arg.push(path);
        args.push(arg);
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
    let (input, _staged) =
        prepare_input(&request.source, report.format, console, cancel).await?;

    let ctx = ExecContext {
        dsn,
        format: report.format,
        clean: request.clean,
        stop_on_error: request.stop_on_error,
        single_transaction: request.single_transaction,
        jobs: request.jobs,
        verbosity: request.verbosity,
        input: input.as_deref(),
    };
    let args = render_args(SCRIPT_RULES, &ctx);
    if console.is_verbose() {
        console.verbose(&format!(
            "psql rules applied: {}",
            applied_rule_names(SCRIPT_RULES, &ctx).join(", ")
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
        .ok_or_else(|| RestoreError::tool_fatal("failed to capture psql stderr".into()))?;
    let tee = drain_stderr(stderr, *console);

    let status = wait_with_cancel(&mut child, cancel).await;
    let captured = tee.await.unwrap_or_default();
    let status = status?;
    classify_script_exit(status.code(), &captured)
}

/// Resolves what psql should read. Compressed dumps are staged to a
/// temporary file first so psql sees ordinary SQL; the staged handle must
/// outlive the child process.
async fn prepare_input(
    source: &DumpSource,
    format: DumpFormat,
    console: &Console,
    cancel: &CancellationToken,
) -> Result<(Option<PathBuf>, Option<NamedTempFile>)> {
    match (source, format) {
        (DumpSource::File(path), DumpFormat::PlainCompressed) => {
            console.info("Decompressing dump before replay");
            let staged = stage_gzip_file(path, cancel).await?;
            Ok((Some(staged.path().to_path_buf()), Some(staged)))
        }
        (DumpSource::Stdin, DumpFormat::PlainCompressed) => {
            console.info("Decompressing dump before replay");
            let staged = stage_gzip_stdin(cancel).await?;
            Ok((Some(staged.path().to_path_buf()), Some(staged)))
        }
        (DumpSource::File(path), _) => Ok((Some(path.clone()), None)),
        (DumpSource::Stdin, _) => Ok((None, None)),
    }
}

async fn stage_gzip_file(path: &Path, cancel: &CancellationToken) -> Result<NamedTempFile> {
    let path = path.to_path_buf();
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
        let input = std::fs::File::open(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => RestoreError::InputNotFound(path.clone()),
            _ => RestoreError::Io(err),
        })?;
        stage_decompressed(MultiGzDecoder::new(std::io::BufReader::new(input)), &cancel)
    })
    .await
    .map_err(|err| RestoreError::Io(std::io::Error::other(err)))?
}

async fn stage_gzip_stdin(cancel: &CancellationToken) -> Result<NamedTempFile> {
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        stage_decompressed(MultiGzDecoder::new(stdin.lock()), &cancel)
    })
    .await
    .map_err(|err| RestoreError::Io(std::io::Error::other(err)))?
}

fn stage_decompressed<R: Read>(mut reader: R, cancel: &CancellationToken) -> Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix("restoretool-")
        .suffix(".sql")
        .tempfile()?;
    let mut buf = [0u8; STAGE_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        staged.write_all(&buf[..read])?;
    }
    staged.flush()?;
    Ok(staged)
}

/// psql failures are never recoverable: each reported statement either ran
/// or was rolled back, so a non-zero exit means the replay did not complete
/// as requested.
pub fn classify_script_exit(code: Option<i32>, stderr: &str) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(code) => {
            let trimmed = stderr.trim();
            let output = (!trimmed.is_empty()).then(|| trimmed.to_string());
            match first_error_line(stderr) {
                Some((line, text)) => Err(RestoreError::script_failed(text, Some(line), output)),
                None => Err(RestoreError::script_failed(
                    format!("psql exited with status {code}"),
                    None,
                    output,
                )),
            }
        }
        None => Err(RestoreError::script_failed(
            "psql was terminated by a signal".into(),
            None,
            None,
        )),
    }
}

fn first_error_line(stderr: &str) -> Option<(u64, String)> {
    for line in stderr.lines() {
        if let Some(caps) = ERROR_LINE.captures(line) {
            if let Ok(number) = caps[1].parse() {
                return Some((number, line.to_string()));
            }
        }
    }
    None
}
