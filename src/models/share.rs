use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, Result};
use crate::models::DocumentResponse;
use crate::services::SharePasswordHasher;

/// Share model
#[derive(Debug, Clone, FromRow)]
pub struct Share {
    pub id: String,
    pub token: String,
    pub owner_id: String,
    pub password_hash: Option<String>,
    pub expires_at: Option<String>,
    pub access_count: i64,
    pub created_at: String,
}

impl Share {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// A share is expired once `now` is past its expiry; no expiry means never
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> Result<bool> {
        let Some(expires_at) = &self.expires_at else {
            return Ok(false);
        };
        let expiry = DateTime::parse_from_rfc3339(expires_at).map_err(|e| {
            AppError::Internal(format!("Invalid expiry on share {}: {}", self.id, e))
        })?;
        Ok(now > expiry)
    }
}

/// Share about to be persisted
#[derive(Debug, Clone)]
pub struct NewShare {
    pub owner_id: String,
    pub document_ids: Vec<String>,
    password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewShare {
    /// Non-positive `expires_in_days` means the share never expires
    pub fn new(
        owner_id: &str,
        document_ids: Vec<String>,
        expires_in_days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = expires_in_days
            .filter(|days| *days > 0)
            .map(|days| now + Duration::days(days));

        Self {
            owner_id: owner_id.to_string(),
            document_ids,
            password_hash: None,
            expires_at,
            created_at: now,
        }
    }

    /// Hash and store the plaintext password. Empty input clears it.
    pub fn set_password(&mut self, hasher: &SharePasswordHasher, plaintext: &str) -> Result<()> {
        self.password_hash = if plaintext.is_empty() {
            None
        } else {
            Some(hasher.hash(plaintext)?)
        };
        Ok(())
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }
}

/// Timestamp format used for every stored date
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Request to create a share
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    #[serde(default)]
    pub document_ids: Vec<String>,
    pub password: Option<String>,
    /// Lifetime in days
    pub expires_in: Option<i64>,
}

/// Result of creating a share
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreated {
    pub share_id: String,
    pub share_url: String,
    /// `data:` URI of an SVG QR code for `share_url`
    pub qr_code: String,
    pub document_count: usize,
    pub has_password: bool,
    pub expires_at: Option<String>,
}

/// Request body for the public access endpoint
#[derive(Debug, Default, Deserialize)]
pub struct AccessShareRequest {
    #[serde(default)]
    pub password: Option<String>,
}

/// Documents revealed by a successful access
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGranted {
    pub documents: Vec<DocumentResponse>,
    pub expires_at: Option<String>,
}

/// Outcome of an access attempt that did not fail outright
#[derive(Debug)]
pub enum AccessOutcome {
    Granted(AccessGranted),
    /// The share is password protected and no password was given
    PasswordRequired,
}

/// Share item for the owner's listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareListItem {
    pub share_id: String,
    pub share_url: String,
    pub has_password: bool,
    pub document_ids: Vec<String>,
    pub documents: Vec<DocumentResponse>,
    pub expires_at: Option<String>,
    pub access_count: i64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share_expiring(expires_at: Option<DateTime<Utc>>) -> Share {
        Share {
            id: "s1".to_string(),
            token: "abcdefghij".to_string(),
            owner_id: "owner".to_string(),
            password_hash: None,
            expires_at: expires_at.map(format_timestamp),
            access_count: 0,
            created_at: format_timestamp(Utc::now()),
        }
    }

    #[test]
    fn test_expiry_days() {
        let now = Utc::now();
        let draft = NewShare::new("owner", vec!["d1".into()], Some(7), now);
        assert_eq!(draft.expires_at, Some(now + Duration::days(7)));

        let share = share_expiring(draft.expires_at);
        assert!(!share.is_expired_at(now + Duration::days(6)).unwrap());
        assert!(share.is_expired_at(now + Duration::days(8)).unwrap());
    }

    #[test]
    fn test_non_positive_expiry_never_expires() {
        let now = Utc::now();
        assert!(NewShare::new("owner", vec![], None, now).expires_at.is_none());
        assert!(NewShare::new("owner", vec![], Some(0), now).expires_at.is_none());
        assert!(NewShare::new("owner", vec![], Some(-3), now).expires_at.is_none());

        let share = share_expiring(None);
        assert!(!share.is_expired_at(now + Duration::days(36500)).unwrap());
    }

    #[test]
    fn test_create_request_camel_case() {
        let req: CreateShareRequest = serde_json::from_str(
            r#"{"documentIds": ["a", "b"], "password": "pw", "expiresIn": 3}"#,
        )
        .unwrap();
        assert_eq!(req.document_ids, ["a", "b"]);
        assert_eq!(req.password.as_deref(), Some("pw"));
        assert_eq!(req.expires_in, Some(3));
    }
}
