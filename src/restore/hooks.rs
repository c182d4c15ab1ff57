// restoretool/src/restore/hooks.rs
use sqlx::{Connection, PgConnection};
use url::Url;

use crate::console::Console;
use crate::errors::{Phase, RestoreError, Result};

/// Decision table for the TimescaleDB restore hooks. An explicit skip always
/// wins; otherwise hooks run when forced or when the extension was detected
/// during preflight.
pub fn hooks_enabled(force: bool, skip: bool, extension_detected: bool) -> bool {
    !skip && (force || extension_detected)
}

/// Puts the extension into restore mode so pg_restore/psql can rewrite
/// catalog state underneath it.
pub async fn run_pre_restore(dsn: &Url, console: &Console) -> Result<()> {
    run_hook(dsn, "SELECT timescaledb_pre_restore()", Phase::PreHook).await?;
    console.success("Ran timescaledb_pre_restore()");
    Ok(())
}

pub async fn run_post_restore(dsn: &Url, console: &Console) -> Result<()> {
    run_hook(dsn, "SELECT timescaledb_post_restore()", Phase::PostHook).await?;
    console.success("Ran timescaledb_post_restore()");
    Ok(())
}

async fn run_hook(dsn: &Url, statement: &str, phase: Phase) -> Result<()> {
    let mut conn = PgConnection::connect(dsn.as_str())
        .await
        .map_err(|source| RestoreError::Hook { phase, source })?;
    sqlx::query(statement)
        .execute(&mut conn)
        .await
        .map_err(|source| RestoreError::Hook { phase, source })?;
    let _ = conn.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_beats_force_in_the_decision_table() {
        // (force, skip, detected) -> enabled
        let cases = [
            (false, false, false, false),
            (false, false, true, true),
            (true, false, false, true),
            (true, false, true, true),
            (false, true, false, false),
            (false, true, true, false),
            (true, true, false, false),
            (true, true, true, false),
        ];
        for (force, skip, detected, expected) in cases {
            assert_eq!(
                hooks_enabled(force, skip, detected),
                expected,
                "force={force} skip={skip} detected={detected}"
            );
        }
    }
}
