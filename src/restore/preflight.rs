// restoretool/src/restore/preflight.rs
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use sqlx::{Connection, PgConnection};
use url::Url;
use walkdir::WalkDir;
use which::which;

use crate::api::{Service, ServiceLookup};
use crate::console::Console;
use crate::errors::{RestoreError, Result};
use crate::restore::format::{detect_format, DumpFormat, Strategy};
use crate::restore::{DumpSource, RestoreRequest};
use crate::secrets::{SecretKey, SecretStore};
use crate::utils::{human_bytes, redacted, service_dsn};

/// What the source inspection learned. Stdin sources carry no evidence.
#[derive(Debug, Clone)]
pub struct SourceEvidence {
    pub size_bytes: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Produced only when every preflight stage has passed, so downstream code
/// never has to re-check which fields were actually validated.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub source: Option<SourceEvidence>,
    pub format: DumpFormat,
    pub strategy: Strategy,
    pub tool_path: PathBuf,
    pub service: Service,
    pub server_version: String,
    pub timescaledb_version: Option<String>,
}

/// Runs the preflight stages in order, stopping at the first failure:
/// source accessibility, format detection, tool discovery, service
/// resolution (with stored-password lookup), and a server probe.
///
/// On success returns the report together with the stored password, if any,
/// so the executor can reuse it without asking the secret store twice.
pub async fn run_preflight(
    request: &RestoreRequest,
    lookup: &dyn ServiceLookup,
    secrets: &dyn SecretStore,
    console: &Console,
) -> Result<(PreflightReport, Option<String>)> {
    let source = inspect_source(&request.source)?;
    match (&request.source, &source) {
        (DumpSource::File(path), Some(evidence)) => {
            let when = evidence
                .modified
                .map(|ts| format!(", modified {}", ts.format("%Y-%m-%d %H:%M")))
                .unwrap_or_default();
            console.success(&format!(
                "Source: {} ({}{when})",
                path.display(),
                human_bytes(evidence.size_bytes)
            ));
        }
        _ => console.verbose("Reading dump from standard input"),
    }

    let format = detect_format(&request.source, request.format_override)?;
    if matches!(request.source, DumpSource::Stdin) && format == DumpFormat::Directory {
        return Err(RestoreError::Preflight(
            "directory-format dumps cannot be read from standard input".into(),
        ));
    }
    let strategy = format.strategy();
    console.success(&format!("Format: {format} (via {})", format.tool_name()));

    let tool = format.tool_name();
    let tool_path = which(tool).map_err(|_| RestoreError::ToolNotFound(tool))?;
    console.verbose(&format!("Using {tool} at {}", tool_path.display()));

    let service = lookup.lookup_service(&request.service_id).await?;
    console.success(&format!(
        "Service: {} ({}:{})",
        service.display_name(),
        service.host,
        service.port
    ));
    if service.pooler_enabled {
        console.warn(
            "The service endpoint runs through a connection pooler; \
             long restores can hit pooler session limits",
        );
    }

    let key = SecretKey {
        service_id: &request.service_id,
        host: &service.host,
        role: &request.role,
    };
    let secret = secrets.get(&key)?;
    match &secret {
        Some(_) => console.verbose(&format!(
            "Using stored password from the {} backend",
            secrets.kind()
        )),
        None if request.require_stored_password => {
            return Err(RestoreError::Preflight(format!(
                "no stored password found for role {} on service {} in the {} backend",
                request.role,
                request.service_id,
                secrets.kind()
            )));
        }
        None => console.verbose("No stored password found; relying on server-side authentication"),
    }

    let dsn = service_dsn(&service, &request.database, &request.role, secret.as_deref())?;
    let (server_version, timescaledb_version) = probe_server(&dsn, &request.database).await?;

    let report = PreflightReport {
        source,
        format,
        strategy,
        tool_path,
        service,
        server_version,
        timescaledb_version,
    };
    console.success(&format!(
        "Connected: {}",
        short_version(&report.server_version)
    ));
    match &report.timescaledb_version {
        Some(version) => console.success(&format!("TimescaleDB {version} is installed")),
        None => console.verbose("TimescaleDB extension is not installed"),
    }
    Ok((report, secret))
}

/// Checks that the dump can actually be opened and gathers size evidence.
/// Directory dumps must carry `toc.dat`, the table of contents pg_dump
/// writes; anything else is a stray directory, not a dump.
fn inspect_source(source: &DumpSource) -> Result<Option<SourceEvidence>> {
    let path = match source {
        DumpSource::Stdin => return Ok(None),
        DumpSource::File(path) => path,
    };

    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => RestoreError::InputNotFound(path.clone()),
        _ => RestoreError::Io(err),
    })?;

    if metadata.is_dir() {
        if !path.join("toc.dat").is_file() {
            return Err(RestoreError::Preflight(format!(
                "{} is not a directory-format dump (missing toc.dat)",
                path.display()
            )));
        }
        return Ok(Some(SourceEvidence {
            size_bytes: directory_size(path),
            modified: None,
        }));
    }

    // Readability probe; metadata alone does not prove we may open it.
    fs::File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => RestoreError::InputNotFound(path.clone()),
        _ => RestoreError::Io(err),
    })?;

    Ok(Some(SourceEvidence {
        size_bytes: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Local>::from),
    }))
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// `SELECT version()` answers with the full build banner; everything from
/// the first parenthesis on is platform and compiler detail.
fn short_version(full: &str) -> &str {
    match full.find(" (") {
        Some(cut) => &full[..cut],
        None => full,
    }
}

async fn probe_server(dsn: &Url, database: &str) -> Result<(String, Option<String>)> {
    let mut conn = PgConnection::connect(dsn.as_str())
        .await
        .map_err(|err| classify_connect_error(err, dsn, database))?;

    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(&mut conn)
        .await
        .map_err(|err| RestoreError::Connectivity {
            endpoint: redacted(dsn),
            reason: err.to_string(),
        })?;

    let timescaledb: Option<String> =
        sqlx::query_scalar("SELECT extversion FROM pg_extension WHERE extname = 'timescaledb'")
            .fetch_optional(&mut conn)
            .await
            .map_err(|err| RestoreError::Connectivity {
                endpoint: redacted(dsn),
                reason: err.to_string(),
            })?;

    let _ = conn.close().await;
    Ok((version, timescaledb))
}

fn classify_connect_error(err: sqlx::Error, dsn: &Url, database: &str) -> RestoreError {
    // SQLSTATE 3D000: invalid_catalog_name, the database itself is missing.
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("3D000") {
            return RestoreError::Preflight(format!(
                "database \"{database}\" does not exist on the target service"
            ));
        }
    }
    RestoreError::Connectivity {
        endpoint: redacted(dsn),
        reason: err.to_string(),
    }
}
