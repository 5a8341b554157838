use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

/// Resolves named secrets with the precedence environment variable > file >
/// static map. Read-only after construction.
#[derive(Clone, Debug, Default)]
pub struct SecretProvider {
    files: BTreeMap<String, PathBuf>,
    statics: BTreeMap<String, String>,
}

impl SecretProvider {
    pub fn new(files: BTreeMap<String, PathBuf>, statics: BTreeMap<String, String>) -> Self {
        Self { files, statics }
    }

    pub fn get(&self, name: &str) -> Option<SecretString> {
        if let Ok(value) = env::var(name) {
            if !value.trim().is_empty() {
                return Some(value.into());
            }
        }

        if let Some(path) = self.files.get(name) {
            if let Ok(raw) = fs::read_to_string(path) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string().into());
                }
            }
        }

        self.statics.get(name).map(|value| value.clone().into())
    }
}

/// Builds an `Authorization` header from a spec like `bearer:CRM_TOKEN` or
/// `basic:WMS_CREDS`. Unknown kinds and unresolvable secrets yield no header.
pub fn auth_header_from_spec(
    spec: &str,
    provider: &SecretProvider,
) -> Option<(&'static str, String)> {
    let (kind, key) = spec.split_once(':')?;
    let secret = provider.get(key)?;
    match kind {
        "bearer" => Some(("Authorization", format!("Bearer {}", secret.expose_secret()))),
        "basic" => Some(("Authorization", format!("Basic {}", secret.expose_secret()))),
        _ => None,
    }
}
