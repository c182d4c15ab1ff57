// restoretool/src/secrets/netrc.rs
use std::fs;
use std::path::PathBuf;

use super::{BackendKind, SecretKey, SecretStore};
use crate::errors::RestoreError;

/// `~/.netrc`-backed passwords, the conventional place for shared CI
/// credentials. Entries are keyed by the service host; a `default` entry
/// acts as a fallback for any host.
pub(crate) struct NetrcStore {
    path: Option<PathBuf>,
}

impl NetrcStore {
    /// Resolves the netrc location: `NETRC` env override, then `~/.netrc`
    /// (with the `~/_netrc` spelling as a Windows fallback).
    pub(crate) fn from_env() -> Self {
        if let Ok(path) = std::env::var("NETRC") {
            return NetrcStore {
                path: Some(PathBuf::from(path)),
            };
        }
        let path = home::home_dir().map(|home| {
            let dotted = home.join(".netrc");
            if !dotted.exists() && cfg!(windows) {
                home.join("_netrc")
            } else {
                dotted
            }
        });
        NetrcStore { path }
    }

    #[cfg(test)]
    fn with_path(path: PathBuf) -> Self {
        NetrcStore { path: Some(path) }
    }
}

impl SecretStore for NetrcStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Netrc
    }

    fn get(&self, key: &SecretKey<'_>) -> Result<Option<String>, RestoreError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            RestoreError::Secret(format!("could not read {}: {e}", path.display()))
        })?;
        Ok(lookup(&contents, key.host, key.role))
    }
}

#[derive(Debug, Default)]
struct Entry {
    /// None marks the `default` entry.
    machine: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

/// First matching entry wins, scanning in file order. An entry with a login
/// that disagrees with the requested role is skipped so one file can hold
/// several roles for the same host.
fn lookup(contents: &str, host: &str, role: &str) -> Option<String> {
    for entry in parse(contents) {
        let machine_matches = match &entry.machine {
            Some(machine) => machine == host,
            None => true,
        };
        if !machine_matches {
            continue;
        }
        if let Some(login) = &entry.login {
            if login != role {
                continue;
            }
        }
        if entry.password.is_some() {
            return entry.password;
        }
    }
    None
}

fn parse(contents: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut in_macdef = false;

    for line in contents.lines() {
        // a macro definition runs until the first blank line
        if in_macdef {
            if line.trim().is_empty() {
                in_macdef = false;
            }
            continue;
        }
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "machine" => {
                    if let Some(done) = current.take() {
                        entries.push(done);
                    }
                    current = Some(Entry {
                        machine: tokens.next().map(str::to_string),
                        ..Entry::default()
                    });
                }
                "default" => {
                    if let Some(done) = current.take() {
                        entries.push(done);
                    }
                    current = Some(Entry::default());
                }
                "login" => {
                    if let Some(entry) = current.as_mut() {
                        entry.login = tokens.next().map(str::to_string);
                    }
                }
                "password" => {
                    if let Some(entry) = current.as_mut() {
                        entry.password = tokens.next().map(str::to_string);
                    }
                }
                "account" => {
                    let _ = tokens.next();
                }
                "macdef" => {
                    let _ = tokens.next();
                    in_macdef = true;
                    break;
                }
                _ => {}
            }
        }
    }
    if let Some(done) = current.take() {
        entries.push(done);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
machine svc-1.db.example.com login admin password s3cret
machine svc-2.db.example.com
  login reporter
  password r3port
default login admin password fallback
";

    #[test]
    fn finds_host_and_role_matches() {
        assert_eq!(
            lookup(SAMPLE, "svc-1.db.example.com", "admin"),
            Some("s3cret".to_string())
        );
        assert_eq!(
            lookup(SAMPLE, "svc-2.db.example.com", "reporter"),
            Some("r3port".to_string())
        );
    }

    #[test]
    fn login_mismatch_falls_through_to_default() {
        // svc-2 only stores the reporter role; admin lands on the default entry
        assert_eq!(
            lookup(SAMPLE, "svc-2.db.example.com", "admin"),
            Some("fallback".to_string())
        );
    }

    #[test]
    fn unknown_host_uses_default_entry() {
        assert_eq!(
            lookup(SAMPLE, "svc-9.db.example.com", "admin"),
            Some("fallback".to_string())
        );
        assert_eq!(lookup(SAMPLE, "svc-9.db.example.com", "reporter"), None);
    }

    #[test]
    fn macdef_blocks_are_skipped() {
        let contents = "\
machine svc-1.db.example.com login admin password top
macdef init
  touch ~/ran-init
  echo machine bogus login admin password oops

machine svc-3.db.example.com login admin password three
";
        assert_eq!(
            lookup(contents, "svc-1.db.example.com", "admin"),
            Some("top".to_string())
        );
        assert_eq!(
            lookup(contents, "svc-3.db.example.com", "admin"),
            Some("three".to_string())
        );
        assert_eq!(lookup(contents, "bogus", "admin"), None);
    }

    #[test]
    fn store_reads_the_configured_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("netrc");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(SAMPLE.as_bytes())?;

        let store = NetrcStore::with_path(path);
        assert_eq!(store.kind(), BackendKind::Netrc);
        let key = SecretKey {
            service_id: "svc-1",
            host: "svc-1.db.example.com",
            role: "admin",
        };
        assert_eq!(store.get(&key)?, Some("s3cret".to_string()));
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found_rather_than_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = NetrcStore::with_path(dir.path().join("absent"));
        let key = SecretKey {
            service_id: "svc-1",
            host: "svc-1.db.example.com",
            role: "admin",
        };
        assert_eq!(store.get(&key)?, None);
        Ok(())
    }
}
