pub(crate) mod keyring;
pub(crate) mod netrc;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RestoreError;

/// Which secret backend is active. Carried as an explicit tag so callers
/// can branch on capability without inspecting concrete store types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Operator opted out of stored passwords entirely.
    #[serde(alias = "none")]
    Disabled,
    #[default]
    Keyring,
    Netrc,
}

impl BackendKind {
    /// True when the client tools cannot discover this backend's secret on
    /// their own and the orchestrator must inject it via PGPASSWORD.
    pub fn requires_injection(&self) -> bool {
        matches!(self, BackendKind::Keyring)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Disabled => write!(f, "disabled"),
            BackendKind::Keyring => write!(f, "keyring"),
            BackendKind::Netrc => write!(f, "netrc"),
        }
    }
}

/// Lookup key for a stored database password. Backends pick the fields
/// they index by: the keyring is keyed by service id, netrc by host.
#[derive(Debug, Clone, Copy)]
pub struct SecretKey<'a> {
    pub service_id: &'a str,
    pub host: &'a str,
    pub role: &'a str,
}

pub trait SecretStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Ok(None) means "nothing stored", which callers tolerate unless an
    /// embedded secret was explicitly required.
    fn get(&self, key: &SecretKey<'_>) -> Result<Option<String>, RestoreError>;
}

/// The opt-out backend: never holds anything.
struct DisabledStore;

impl SecretStore for DisabledStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Disabled
    }

    fn get(&self, _key: &SecretKey<'_>) -> Result<Option<String>, RestoreError> {
        Ok(None)
    }
}

pub fn open(kind: BackendKind) -> Box<dyn SecretStore> {
    match kind {
        BackendKind::Disabled => Box::new(DisabledStore),
        BackendKind::Keyring => Box::new(keyring::KeyringStore),
        BackendKind::Netrc => Box::new(netrc::NetrcStore::from_env()),
    }
}
