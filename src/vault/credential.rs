//! The in-memory vault plaintext data model (`spec.md` §3): credentials
//! keyed by service name, each carrying a per-location usage history.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Schema version of the serialized [`VaultPlaintext`] payload (distinct
/// from the envelope's `metadata.version` — this one versions the JSON
/// shape decrypted *inside* `data`).
pub const PLAINTEXT_SCHEMA_VERSION: u16 = 1;

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// Count of accesses to a single field on a single credential, keyed by
/// field name (`"password"`, `"username"`, ...).
pub type FieldCounts = BTreeMap<String, u64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default)]
    pub field_counts: FieldCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<String>,
    /// Recomputed on every read; never persisted (§3).
    #[serde(skip)]
    pub path_exists: bool,
}

impl UsageRecord {
    fn new(field: Option<&str>, git_repository: Option<String>) -> Self {
        let mut field_counts = FieldCounts::new();
        if let Some(field) = field {
            field_counts.insert(field.to_string(), 1);
        }
        Self {
            last_access: Utc::now(),
            access_count: 1,
            field_counts,
            git_repository,
            path_exists: false,
        }
    }

    fn record_access(&mut self, field: Option<&str>, git_repository: Option<String>) {
        self.last_access = Utc::now();
        self.access_count += 1;
        if let Some(field) = field {
            *self.field_counts.entry(field.to_string()).or_insert(0) += 1;
        }
        if git_repository.is_some() {
            self.git_repository = git_repository;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub service: String,
    pub username: String,
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub usage: BTreeMap<String, UsageRecord>,
}

impl Credential {
    pub fn new(
        service: String,
        username: String,
        password: SecretString,
        url: Option<String>,
        category: Option<String>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            service,
            username,
            password,
            url,
            category,
            notes,
            created_at: now,
            updated_at: now,
            usage: BTreeMap::new(),
        }
    }

    /// Record a usage event at `location` (§4.4 "Usage telemetry"):
    /// increments `access_count`, refreshes `last_access`, tallies
    /// `field_counts`, and best-effort resolves `git_repository`.
    pub fn record_usage(&mut self, location: &str, field: Option<&str>) {
        let git_repository = nearest_git_repository_basename(Path::new(location));
        match self.usage.get_mut(location) {
            Some(record) => record.record_access(field, git_repository),
            None => {
                self.usage
                    .insert(location.to_string(), UsageRecord::new(field, git_repository));
            }
        }
    }

    /// Recompute every usage row's transient `path_exists` flag against the
    /// current filesystem. Called after deserializing a vault, never
    /// persisted.
    pub fn refresh_path_exists(&mut self) {
        for (location, record) in self.usage.iter_mut() {
            record.path_exists = Path::new(location).is_dir();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultPlaintext {
    pub schema_version: u16,
    pub credentials: Vec<Credential>,
}

impl VaultPlaintext {
    pub fn new() -> Self {
        Self {
            schema_version: PLAINTEXT_SCHEMA_VERSION,
            credentials: Vec::new(),
        }
    }

    pub fn find(&self, service: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.service == service)
    }

    pub fn find_mut(&mut self, service: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.service == service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.find(service).is_some()
    }

    pub fn remove(&mut self, service: &str) -> Option<Credential> {
        let idx = self.credentials.iter().position(|c| c.service == service)?;
        Some(self.credentials.remove(idx))
    }

    pub fn refresh_all_path_exists(&mut self) {
        for credential in &mut self.credentials {
            credential.refresh_path_exists();
        }
    }
}

/// Best-effort detection of the nearest enclosing git repository, walking
/// up from `location` and reporting only the basename of the directory
/// that contains a `.git` entry (§4.4, §9 — deliberately not a full remote
/// URL or submodule-aware resolver; see the design ledger's Open Question
/// notes for the scoping rationale).
fn nearest_git_repository_basename(location: &Path) -> Option<String> {
    let mut current = Some(location);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return dir.file_name().map(|n| n.to_string_lossy().into_owned());
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn add_find_remove_roundtrip() {
        let mut plaintext = VaultPlaintext::new();
        plaintext.credentials.push(Credential::new(
            "github".to_string(),
            "octocat".to_string(),
            secret("hunter2"),
            None,
            None,
            None,
        ));

        assert!(plaintext.contains("github"));
        assert!(!plaintext.contains("gitlab"));

        let removed = plaintext.remove("github").unwrap();
        assert_eq!(removed.username, "octocat");
        assert!(!plaintext.contains("github"));
    }

    #[test]
    fn usage_tracks_access_count_and_fields() {
        let mut credential = Credential::new(
            "github".to_string(),
            "octocat".to_string(),
            secret("hunter2"),
            None,
            None,
            None,
        );

        credential.record_usage("/home/user/project", Some("password"));
        credential.record_usage("/home/user/project", Some("username"));

        let record = credential.usage.get("/home/user/project").unwrap();
        assert_eq!(record.access_count, 2);
        assert_eq!(record.field_counts.get("password"), Some(&1));
        assert_eq!(record.field_counts.get("username"), Some(&1));
    }

    #[test]
    fn distinct_locations_are_separate_usage_rows() {
        let mut credential = Credential::new(
            "github".to_string(),
            "octocat".to_string(),
            secret("hunter2"),
            None,
            None,
            None,
        );
        credential.record_usage("/home/user/project-a", None);
        credential.record_usage("/home/user/project-b", None);
        assert_eq!(credential.usage.len(), 2);
    }

    #[test]
    fn serialized_credential_does_not_leak_password_field_name_confusion() {
        let credential = Credential::new(
            "github".to_string(),
            "octocat".to_string(),
            secret("hunter2"),
            None,
            None,
            None,
        );
        let json = serde_json::to_string(&credential).unwrap();
        assert!(json.contains("hunter2"));
        // (This is expected: the credential *is* the secret; §3's I5
        // protects the audit log and side-file, not the vault payload
        // itself, which is always encrypted before it touches disk.)
    }

    #[test]
    fn path_exists_is_not_serialized() {
        let mut credential = Credential::new(
            "github".to_string(),
            "octocat".to_string(),
            secret("hunter2"),
            None,
            None,
            None,
        );
        credential.record_usage("/tmp", None);
        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("path_exists"));
    }
}
