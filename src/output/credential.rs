//! Formatters for credential views, service lists, and the other
//! vault-shaped values the commands print. Grounded on the teacher's
//! `output::vault_item` field-by-field text/JSON rendering, reworked against
//! [`crate::vault::service::CredentialView`] instead of the teacher's
//! `VaultItemV1`.

use secrecy::ExposeSecret;
use serde_json::json;

use crate::vault::{CredentialView, KeychainStatus};

/// `field`, when present, restricts both the JSON and text rendering to just
/// that one field (`get --field password`, §6).
pub fn credential_json(view: &CredentialView, field: Option<&str>) -> serde_json::Value {
    if let Some(field) = field {
        let value = match field {
            "username" => json!(view.username),
            "password" => json!(view.password.expose_secret()),
            "url" => json!(view.url),
            "category" => json!(view.category),
            "notes" => json!(view.notes),
            _ => serde_json::Value::Null,
        };
        return json!({"service": view.service, field: value});
    }

    json!({
        "service": view.service,
        "username": view.username,
        "password": view.password.expose_secret(),
        "url": view.url,
        "category": view.category,
        "notes": view.notes,
    })
}

pub fn credential_text(view: &CredentialView, field: Option<&str>) -> String {
    if let Some(field) = field {
        return match field {
            "username" => view.username.clone(),
            "password" => view.password.expose_secret().to_string(),
            "url" => view.url.clone().unwrap_or_default(),
            "category" => view.category.clone().unwrap_or_default(),
            "notes" => view.notes.clone().unwrap_or_default(),
            _ => String::new(),
        };
    }

    let mut out = String::new();
    out.push_str(&format!("service:\t{}\n", view.service));
    out.push_str(&format!("username:\t{}\n", view.username));
    out.push_str(&format!("password:\t{}\n", view.password.expose_secret()));
    if let Some(url) = &view.url {
        out.push_str(&format!("url:\t{url}\n"));
    }
    if let Some(category) = &view.category {
        out.push_str(&format!("category:\t{category}\n"));
    }
    if let Some(notes) = &view.notes {
        out.push_str(&format!("notes:\t{notes}\n"));
    }
    out.pop();
    out
}

pub fn list_json(services: &[String]) -> serde_json::Value {
    json!({ "services": services })
}

pub fn list_text(services: &[String]) -> String {
    if services.is_empty() {
        return "(no credentials stored)".to_string();
    }
    services.join("\n")
}

pub fn keychain_status_json(status: &KeychainStatus) -> serde_json::Value {
    json!({
        "enabled": status.enabled,
        "keyring_reachable": status.keyring_reachable,
    })
}

pub fn keychain_status_text(status: &KeychainStatus) -> String {
    format!(
        "keychain enabled: {}\nkeyring reachable: {}",
        status.enabled, status.keyring_reachable
    )
}

pub fn audit_report_json(
    report: &crate::vault::audit::VerifyReport,
    mismatches: &[crate::vault::audit::Mismatch],
) -> serde_json::Value {
    json!({
        "total": report.total,
        "valid": report.valid,
        "invalid": report.invalid,
        "mismatches": mismatches.iter().map(|m| m.seq).collect::<Vec<_>>(),
    })
}

pub fn audit_report_text(
    report: &crate::vault::audit::VerifyReport,
    mismatches: &[crate::vault::audit::Mismatch],
) -> String {
    let mut out = format!(
        "total: {}\nvalid: {}\ninvalid: {}",
        report.total, report.valid, report.invalid
    );
    if !mismatches.is_empty() {
        let seqs: Vec<String> = mismatches.iter().map(|m| m.seq.to_string()).collect();
        out.push_str(&format!("\nmismatched seq: {}", seqs.join(", ")));
    }
    out
}

pub fn backup_info_json(backups: &[std::path::PathBuf]) -> serde_json::Value {
    json!({ "backups": backups.iter().map(|p| p.display().to_string()).collect::<Vec<_>>() })
}

pub fn backup_info_text(backups: &[std::path::PathBuf]) -> String {
    if backups.is_empty() {
        return "(no backups found)".to_string();
    }
    backups
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
