use std::time::{Duration, Instant};

use url::Url;

use crate::api::Service;
use crate::errors::RestoreError;

/// Builds the connection URI for a resolved service. The password is only
/// embedded for our own in-process probes; DSNs handed to child tools omit
/// it and rely on PGPASSWORD or the tool's native discovery.
pub fn service_dsn(
    service: &Service,
    database: &str,
    role: &str,
    password: Option<&str>,
) -> Result<Url, RestoreError> {
    let mut url = Url::parse(&format!("postgres://{}:{}", service.host, service.port))
        .map_err(|e| RestoreError::Preflight(format!("invalid service endpoint: {e}")))?;
    url.set_username(role)
        .map_err(|_| RestoreError::Preflight(format!("invalid role name: {role}")))?;
    url.set_password(password)
        .map_err(|_| RestoreError::Preflight("invalid password for connection URI".into()))?;
    url.set_path(&format!("/{database}"));
    url.query_pairs_mut().append_pair("sslmode", "require");
    Ok(url)
}

/// Connection URI with any password replaced, safe for terminal output.
pub fn redacted(url: &Url) -> String {
    if url.password().is_none() {
        return url.to_string();
    }
    let mut shown = url.clone();
    // set_password only fails for schemes that cannot carry one
    let _ = shown.set_password(Some("redacted"));
    shown.to_string()
}

/// Current-instant capability so timed stages never read a global clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn human_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 120.0 {
        format!("{secs:.1}s")
    } else {
        let whole = elapsed.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Service;

    fn service() -> Service {
        Service {
            id: "svc-123".into(),
            name: Some("orders".into()),
            host: "svc-123.db.example.com".into(),
            port: 5432,
            pooler_enabled: false,
        }
    }

    #[test]
    fn dsn_without_password_has_no_credentials() -> anyhow::Result<()> {
        let dsn = service_dsn(&service(), "defaultdb", "admin", None)?;
        assert_eq!(
            dsn.as_str(),
            "postgres://admin@svc-123.db.example.com:5432/defaultdb?sslmode=require"
        );
        Ok(())
    }

    #[test]
    fn dsn_password_is_percent_encoded() -> anyhow::Result<()> {
        let dsn = service_dsn(&service(), "defaultdb", "admin", Some("p@ss/word"))?;
        assert!(dsn.as_str().contains("p%40ss%2Fword"));
        assert_eq!(dsn.password(), Some("p%40ss%2Fword"));
        Ok(())
    }

    #[test]
    fn redaction_hides_the_password_only() -> anyhow::Result<()> {
        let dsn = service_dsn(&service(), "defaultdb", "admin", Some("hunter2"))?;
        let shown = redacted(&dsn);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("admin:redacted@svc-123.db.example.com"));

        let bare = service_dsn(&service(), "defaultdb", "admin", None)?;
        assert_eq!(redacted(&bare), bare.to_string());
        Ok(())
    }

    #[test]
    fn byte_sizes_humanize() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn frozen_clocks_substitute_for_the_system_clock() {
        struct FrozenClock(Instant);
        impl Clock for FrozenClock {
            fn now(&self) -> Instant {
                self.0
            }
        }

        let epoch = Instant::now();
        let clock: &dyn Clock = &FrozenClock(epoch);
        assert_eq!(clock.now().saturating_duration_since(epoch), Duration::ZERO);
    }

    #[test]
    fn durations_humanize() {
        assert_eq!(human_duration(Duration::from_millis(32_140)), "32.1s");
        assert_eq!(human_duration(Duration::from_secs(192)), "3m 12s");
    }
}
