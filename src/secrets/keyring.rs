// restoretool/src/secrets/keyring.rs
use keyring::Entry;

use super::{BackendKind, SecretKey, SecretStore};
use crate::errors::RestoreError;

/// OS credential store backend. Entries are namespaced per service so one
/// machine can hold passwords for many targets.
pub(crate) struct KeyringStore;

fn entry_service(service_id: &str) -> String {
    format!("restoretool:{service_id}")
}

impl SecretStore for KeyringStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyring
    }

    fn get(&self, key: &SecretKey<'_>) -> Result<Option<String>, RestoreError> {
        let entry = Entry::new(&entry_service(key.service_id), key.role)
            .map_err(|e| RestoreError::Secret(e.to_string()))?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(RestoreError::Secret(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_namespaced_by_service() {
        assert_eq!(entry_service("svc-42"), "restoretool:svc-42");
    }
}
