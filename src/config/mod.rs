// restoretool/src/config/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::secrets::BackendKind;

pub const CONFIG_ENV: &str = "RESTORETOOL_CONFIG";
pub const API_URL_ENV: &str = "RESTORETOOL_API_URL";
pub const TOKEN_ENV: &str = "RESTORETOOL_TOKEN";

/// On-disk shape of `~/.config/restoretool/config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawSettings {
    api_url: Option<String>,
    access_token: Option<String>,
    password_storage: Option<BackendKind>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub access_token: Option<String>,
    pub password_storage: BackendKind,
}

/// Environment overrides, gathered by the caller so the merge logic stays
/// testable without touching process state.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        EnvOverrides {
            api_url: std::env::var(API_URL_ENV).ok().filter(|s| !s.is_empty()),
            access_token: std::env::var(TOKEN_ENV).ok().filter(|s| !s.is_empty()),
        }
    }
}

impl Settings {
    pub fn load(explicit_path: Option<&Path>) -> Result<Settings> {
        let path = config_path(explicit_path);
        let raw = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file at {}", path.display()))?;
            Some(serde_json::from_str::<RawSettings>(&contents).with_context(|| {
                format!("failed to parse JSON from config file at {}", path.display())
            })?)
        } else {
            None
        };
        merge(raw, EnvOverrides::from_process(), &path)
    }
}

/// Explicit flag wins over the env override, which wins over the default
/// location under the user's config directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    home::home_dir()
        .map(|home| home.join(".config").join("restoretool").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("restoretool-config.json"))
}

fn merge(raw: Option<RawSettings>, env: EnvOverrides, path: &Path) -> Result<Settings> {
    let raw = raw.unwrap_or_default();
    let api_url = env
        .api_url
        .or(raw.api_url)
        .with_context(|| {
            format!(
                "api_url is not configured; set it in {} or via {API_URL_ENV}",
                path.display()
            )
        })?;
    Ok(Settings {
        api_url,
        access_token: env.access_token.or(raw.access_token),
        password_storage: raw.password_storage.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawSettings {
        serde_json::from_str(json).expect("fixture parses")
    }

    #[test]
    fn file_settings_parse() -> Result<()> {
        let settings = merge(
            Some(raw(
                r#"{
                    "api_url": "https://api.example.test/v1",
                    "access_token": "tok-abc",
                    "password_storage": "netrc"
                }"#,
            )),
            EnvOverrides::default(),
            Path::new("/tmp/config.json"),
        )?;
        assert_eq!(settings.api_url, "https://api.example.test/v1");
        assert_eq!(settings.access_token.as_deref(), Some("tok-abc"));
        assert_eq!(settings.password_storage, BackendKind::Netrc);
        Ok(())
    }

    #[test]
    fn env_overrides_beat_the_file() -> Result<()> {
        let settings = merge(
            Some(raw(
                r#"{"api_url": "https://file.example.test", "access_token": "from-file"}"#,
            )),
            EnvOverrides {
                api_url: Some("https://env.example.test".into()),
                access_token: Some("from-env".into()),
            },
            Path::new("/tmp/config.json"),
        )?;
        assert_eq!(settings.api_url, "https://env.example.test");
        assert_eq!(settings.access_token.as_deref(), Some("from-env"));
        Ok(())
    }

    #[test]
    fn missing_file_works_when_env_is_complete() -> Result<()> {
        let settings = merge(
            None,
            EnvOverrides {
                api_url: Some("https://env.example.test".into()),
                access_token: None,
            },
            Path::new("/tmp/config.json"),
        )?;
        assert_eq!(settings.api_url, "https://env.example.test");
        assert_eq!(settings.access_token, None);
        assert_eq!(settings.password_storage, BackendKind::Keyring);
        Ok(())
    }

    #[test]
    fn missing_api_url_is_a_config_error() {
        let err = merge(None, EnvOverrides::default(), Path::new("/tmp/config.json"))
            .expect_err("api_url is required");
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn storage_defaults_to_keyring_and_accepts_none() -> Result<()> {
        let settings = merge(
            Some(raw(r#"{"api_url": "https://a.test"}"#)),
            EnvOverrides::default(),
            Path::new("/tmp/config.json"),
        )?;
        assert_eq!(settings.password_storage, BackendKind::Keyring);

        let opted_out = merge(
            Some(raw(r#"{"api_url": "https://a.test", "password_storage": "none"}"#)),
            EnvOverrides::default(),
            Path::new("/tmp/config.json"),
        )?;
        assert_eq!(opted_out.password_storage, BackendKind::Disabled);
        Ok(())
    }
}
