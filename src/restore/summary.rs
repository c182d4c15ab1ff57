// restoretool/src/restore/summary.rs
use std::time::Duration;

use sqlx::{Connection, PgConnection};
use url::Url;

use crate::errors::{RestoreError, Result};
use crate::utils::{human_duration, redacted};

/// Filter shared by all catalog counts: user schemas only, with the
/// TimescaleDB internal schemas treated as system schemas.
const USER_SCHEMAS: &str = "NOT IN ('pg_catalog', 'information_schema') \
                            AND {col} NOT LIKE '\\_timescaledb%'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub tables: i64,
    pub views: i64,
    pub functions: i64,
    pub sequences: i64,
    pub indexes: i64,
    /// Present only when the TimescaleDB extension is installed.
    pub hypertables: Option<i64>,
    /// Approximate, from the statistics collector.
    pub rows: i64,
}

/// Counts what the restore left behind. Runs on a short-lived connection;
/// any failure here is reported by the caller as a warning, never as a
/// failed restore.
pub async fn collect(dsn: &Url, extension_present: bool) -> Result<RestoreSummary> {
    let mut conn = PgConnection::connect(dsn.as_str())
        .await
        .map_err(|err| summary_error(dsn, err))?;

    let tables = count(&mut conn, dsn, &user_schema_query("pg_tables", "schemaname")).await?;
    let views = count(&mut conn, dsn, &user_schema_query("pg_views", "schemaname")).await?;
    let functions = count(
        &mut conn,
        dsn,
        &format!(
            "SELECT count(*) FROM pg_catalog.pg_proc p \
             JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname {}",
            schema_filter("n.nspname")
        ),
    )
    .await?;
    let sequences = count(&mut conn, dsn, &user_schema_query("pg_sequences", "schemaname")).await?;
    let indexes = count(&mut conn, dsn, &user_schema_query("pg_indexes", "schemaname")).await?;

    let hypertables = if extension_present {
        Some(
            count(
                &mut conn,
                dsn,
                "SELECT count(*) FROM timescaledb_information.hypertables",
            )
            .await?,
        )
    } else {
        None
    };

    let rows = count(
        &mut conn,
        dsn,
        "SELECT COALESCE(SUM(n_live_tup), 0)::bigint FROM pg_stat_user_tables \
         WHERE schemaname NOT LIKE '\\_timescaledb%'",
    )
    .await?;

    let _ = conn.close().await;
    Ok(RestoreSummary {
        tables,
        views,
        functions,
        sequences,
        indexes,
        hypertables,
        rows,
    })
}

impl RestoreSummary {
    pub fn render(&self, elapsed: Duration) -> String {
        let mut lines = vec![format!("Restore complete in {}", human_duration(elapsed))];
        lines.push(format!(
            "  {}, {}, {}",
            count_label(self.tables, "table"),
            count_label(self.views, "view"),
            count_label(self.functions, "function"),
        ));
        lines.push(format!(
            "  {}, {}",
            count_label(self.sequences, "sequence"),
            count_label(self.indexes, "index"),
        ));
        if let Some(hypertables) = self.hypertables {
            lines.push(format!("  {}", count_label(hypertables, "hypertable")));
        }
        lines.push(format!("  ~{} rows", format_count(self.rows.max(0) as u64)));
        lines.join("\n")
    }
}

async fn count(conn: &mut PgConnection, dsn: &Url, sql: &str) -> Result<i64> {
    sqlx::query_scalar(sql)
        .fetch_one(conn)
        .await
        .map_err(|err| summary_error(dsn, err))
}

fn user_schema_query(view: &str, column: &str) -> String {
    format!(
        "SELECT count(*) FROM pg_catalog.{view} WHERE {column} {}",
        schema_filter(column)
    )
}

fn schema_filter(column: &str) -> String {
    USER_SCHEMAS.replace("{col}", column)
}

fn summary_error(dsn: &Url, err: sqlx::Error) -> RestoreError {
    RestoreError::Connectivity {
        endpoint: redacted(dsn),
        reason: err.to_string(),
    }
}

/// "index" is the only irregular plural we list.
fn count_label(count: i64, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else if noun == "index" {
        format!("{count} indexes")
    } else {
        format!("{count} {noun}s")
    }
}

/// Abbreviates large counts: thousands, millions, billions, one decimal.
fn format_count(count: u64) -> String {
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else if count < 1_000_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else {
        format!("{:.1}B", count as f64 / 1_000_000_000.0)
    }
}
