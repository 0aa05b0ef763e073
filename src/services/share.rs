use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::config::ShareConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    format_timestamp, AccessGranted, AccessOutcome, CreateShareRequest, Document,
    DocumentResponse, NewShare, Share, ShareCreated, ShareListItem,
};
use crate::services::qr::qr_data_uri;
use crate::services::{DocumentService, SharePasswordHasher};
use crate::storage::StorageProvider;

/// URL-safe token alphabet (64 symbols)
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Longest accepted share lifetime (about a century)
const MAX_EXPIRY_DAYS: i64 = 36_500;

/// Random share token of `len` URL-safe characters
pub fn generate_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Row of a share's document list joined with whatever document still exists
#[derive(Debug, FromRow)]
struct ShareDocumentRow {
    share_id: String,
    document_id: String,
    original_name: Option<String>,
    mime_type: Option<String>,
    size: Option<i64>,
    created_at: Option<String>,
}

impl ShareDocumentRow {
    fn into_response(self) -> Option<DocumentResponse> {
        Some(DocumentResponse {
            id: self.document_id,
            original_name: self.original_name?,
            mimetype: self.mime_type?,
            size: self.size?,
            uploaded_at: self.created_at?,
        })
    }
}

/// Share manager
pub struct ShareService;

impl ShareService {
    /// Create a share over documents owned by `owner_id`
    pub async fn create_share(
        db: &Database,
        settings: &ShareConfig,
        hasher: &SharePasswordHasher,
        owner_id: &str,
        req: CreateShareRequest,
    ) -> Result<ShareCreated> {
        Self::create_share_at(db, settings, hasher, owner_id, req, Utc::now()).await
    }

    pub async fn create_share_at(
        db: &Database,
        settings: &ShareConfig,
        hasher: &SharePasswordHasher,
        owner_id: &str,
        req: CreateShareRequest,
        now: DateTime<Utc>,
    ) -> Result<ShareCreated> {
        let token_length = settings.token_length;
        Self::create_share_with(db, settings, hasher, owner_id, req, now, || {
            generate_token(token_length)
        })
        .await
    }

    /// Create with an explicit token source, tried up to `token_attempts` times
    pub(crate) async fn create_share_with(
        db: &Database,
        settings: &ShareConfig,
        hasher: &SharePasswordHasher,
        owner_id: &str,
        req: CreateShareRequest,
        now: DateTime<Utc>,
        mut next_token: impl FnMut() -> String,
    ) -> Result<ShareCreated> {
        // Ordered set: first occurrence wins
        let mut seen = HashSet::new();
        let document_ids: Vec<String> = req
            .document_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if document_ids.is_empty() {
            return Err(AppError::BadRequest("No documents selected".to_string()));
        }

        if req.expires_in.is_some_and(|days| days > MAX_EXPIRY_DAYS) {
            return Err(AppError::BadRequest(format!(
                "expiresIn must be at most {} days",
                MAX_EXPIRY_DAYS
            )));
        }

        let owned = DocumentService::find_owned_documents(db, owner_id, &document_ids).await?;
        if owned.len() != document_ids.len() {
            return Err(AppError::BadRequest("Some documents not found".to_string()));
        }

        let mut draft = NewShare::new(owner_id, document_ids, req.expires_in, now);
        if let Some(password) = req.password.filter(|p| !p.is_empty()) {
            let hasher = hasher.clone();
            draft = tokio::task::spawn_blocking(move || {
                draft.set_password(&hasher, &password)?;
                Ok::<_, AppError>(draft)
            })
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;
        }

        let mut token = None;
        for attempt in 1..=settings.token_attempts {
            let candidate = next_token();
            if Self::insert_share(db, &draft, &candidate).await? {
                token = Some(candidate);
                break;
            }
            tracing::warn!(attempt, "Share token collision, retrying");
        }
        let token = token.ok_or_else(|| {
            tracing::error!(owner_id, attempts = settings.token_attempts, "Share token space exhausted");
            AppError::Conflict("Could not allocate a unique share token".to_string())
        })?;

        let share_url = settings.share_url(&token);
        let qr_code = qr_data_uri(&share_url)?;

        tracing::info!(
            owner_id,
            token = %token,
            documents = draft.document_ids.len(),
            has_password = draft.password_hash().is_some(),
            "Share created"
        );

        Ok(ShareCreated {
            share_id: token,
            share_url,
            qr_code,
            document_count: draft.document_ids.len(),
            has_password: draft.password_hash().is_some(),
            expires_at: draft.expires_at.map(format_timestamp),
        })
    }

    /// Persist a share and its document list in one transaction.
    /// Returns `false` when the token is already taken.
    pub(crate) async fn insert_share(db: &Database, draft: &NewShare, token: &str) -> Result<bool> {
        let share_id = Uuid::new_v4().to_string();
        let mut tx = db.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO shares (id, token, owner_id, password_hash, expires_at, access_count, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&share_id)
        .bind(token)
        .bind(&draft.owner_id)
        .bind(draft.password_hash())
        .bind(draft.expires_at.map(format_timestamp))
        .bind(format_timestamp(draft.created_at))
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            let is_token_conflict = match &e {
                sqlx::Error::Database(db_err) => db_err
                    .message()
                    .contains("UNIQUE constraint failed: shares.token"),
                _ => false,
            };
            if is_token_conflict {
                return Ok(false);
            }
            return Err(e.into());
        }

        for (position, document_id) in draft.document_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO share_documents (share_id, document_id, position) VALUES (?, ?, ?)",
            )
            .bind(&share_id)
            .bind(document_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Find a share by its public token
    pub async fn find_by_token(db: &Database, token: &str) -> Result<Share> {
        sqlx::query_as("SELECT * FROM shares WHERE token = ?")
            .bind(token)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Share not found".to_string()))
    }

    /// Lookup plus expiry check, shared by access and download
    async fn find_active(db: &Database, token: &str, now: DateTime<Utc>) -> Result<Share> {
        let share = Self::find_by_token(db, token).await?;
        if share.is_expired_at(now)? {
            tracing::debug!(token, owner_id = %share.owner_id, "Rejected access to expired share");
            return Err(AppError::Gone("Share has expired".to_string()));
        }
        Ok(share)
    }

    /// List the owner's shares, newest first
    pub async fn list_shares(
        db: &Database,
        settings: &ShareConfig,
        owner_id: &str,
    ) -> Result<Vec<ShareListItem>> {
        let shares: Vec<Share> =
            sqlx::query_as("SELECT * FROM shares WHERE owner_id = ? ORDER BY created_at DESC")
                .bind(owner_id)
                .fetch_all(db.pool())
                .await?;

        let rows: Vec<ShareDocumentRow> = sqlx::query_as(
            r#"
            SELECT
              sd.share_id,
              sd.document_id,
              d.original_name,
              d.mime_type,
              d.size,
              d.created_at
            FROM share_documents sd
            JOIN shares s ON s.id = sd.share_id
            LEFT JOIN documents d ON d.id = sd.document_id
            WHERE s.owner_id = ?
            ORDER BY sd.share_id, sd.position
            "#,
        )
        .bind(owner_id)
        .fetch_all(db.pool())
        .await?;

        let mut by_share: HashMap<String, Vec<ShareDocumentRow>> = HashMap::new();
        for row in rows {
            by_share.entry(row.share_id.clone()).or_default().push(row);
        }

        let items = shares
            .into_iter()
            .map(|share| {
                let rows = by_share.remove(&share.id).unwrap_or_default();
                let document_ids = rows.iter().map(|r| r.document_id.clone()).collect();
                let documents = rows
                    .into_iter()
                    .filter_map(ShareDocumentRow::into_response)
                    .collect();
                ShareListItem {
                    share_url: settings.share_url(&share.token),
                    has_password: share.has_password(),
                    share_id: share.token,
                    document_ids,
                    documents,
                    expires_at: share.expires_at,
                    access_count: share.access_count,
                    created_at: share.created_at,
                }
            })
            .collect();

        Ok(items)
    }

    /// Delete a share owned by `owner_id`. Referenced documents are kept.
    pub async fn delete_share(db: &Database, owner_id: &str, token: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM shares WHERE token = ? AND owner_id = ?")
            .bind(token)
            .bind(owner_id)
            .execute(db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Share not found".to_string()));
        }

        // Not relying on SQLite foreign key enforcement being enabled
        sqlx::query("DELETE FROM share_documents WHERE share_id NOT IN (SELECT id FROM shares)")
            .execute(db.pool())
            .await?;

        tracing::info!(owner_id, token, "Share deleted");
        Ok(())
    }

    /// Public access: checks expiry, then password, then counts the access
    pub async fn access_share(
        db: &Database,
        hasher: &SharePasswordHasher,
        token: &str,
        password: Option<String>,
    ) -> Result<AccessOutcome> {
        Self::access_share_at(db, hasher, token, password, Utc::now()).await
    }

    pub async fn access_share_at(
        db: &Database,
        hasher: &SharePasswordHasher,
        token: &str,
        password: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AccessOutcome> {
        let share = Self::find_active(db, token, now).await?;

        // A supplied password is ignored when the share has none
        if let Some(hash) = share.password_hash.clone() {
            let Some(password) = password.filter(|p| !p.is_empty()) else {
                return Ok(AccessOutcome::PasswordRequired);
            };

            let hasher = hasher.clone();
            let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
                .await
                .map_err(|e| {
                    AppError::Internal(format!("Password verification task failed: {}", e))
                })??;

            if !matches {
                tracing::debug!(token, "Invalid share password");
                return Err(AppError::Unauthorized("Invalid password".to_string()));
            }
        }

        Self::increment_access_count(db, &share.id).await?;

        let documents = Self::shared_documents(db, &share.id)
            .await?
            .into_iter()
            .map(DocumentResponse::from)
            .collect();

        tracing::debug!(token, owner_id = %share.owner_id, "Share accessed");
        Ok(AccessOutcome::Granted(AccessGranted {
            documents,
            expires_at: share.expires_at,
        }))
    }

    async fn increment_access_count(db: &Database, share_id: &str) -> Result<()> {
        sqlx::query("UPDATE shares SET access_count = access_count + 1 WHERE id = ?")
            .bind(share_id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    /// Documents of a share in share order; deleted documents are skipped
    async fn shared_documents(db: &Database, share_id: &str) -> Result<Vec<Document>> {
        let documents = sqlx::query_as(
            r#"
            SELECT d.*
            FROM share_documents sd
            JOIN documents d ON d.id = sd.document_id
            WHERE sd.share_id = ?
            ORDER BY sd.position
            "#,
        )
        .bind(share_id)
        .fetch_all(db.pool())
        .await?;
        Ok(documents)
    }

    /// Public download of one document of a share. Does not ask for the
    /// password again and does not count as an access.
    pub async fn download_document(
        db: &Database,
        storage: &dyn StorageProvider,
        token: &str,
        document_id: &str,
    ) -> Result<(Document, Bytes)> {
        Self::download_document_at(db, storage, token, document_id, Utc::now()).await
    }

    pub async fn download_document_at(
        db: &Database,
        storage: &dyn StorageProvider,
        token: &str,
        document_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Document, Bytes)> {
        let share = Self::find_active(db, token, now).await?;

        let in_share: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM share_documents WHERE share_id = ? AND document_id = ?",
        )
        .bind(&share.id)
        .bind(document_id)
        .fetch_optional(db.pool())
        .await?;
        if in_share.is_none() {
            return Err(AppError::Forbidden("Document not in this share".to_string()));
        }

        let document = DocumentService::get_document(db, document_id).await?;
        let data = DocumentService::read_content(storage, &document).await?;
        Ok((document, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_db;
    use crate::services::document::testing::seed_document;
    use crate::services::password::test_hasher;
    use crate::storage::LocalStorage;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        db: Database,
        storage: LocalStorage,
        settings: ShareConfig,
        hasher: SharePasswordHasher,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let (db, dir) = test_db().await;
        Fixture {
            db,
            storage: LocalStorage::new(dir.path().join("uploads")),
            settings: ShareConfig::default(),
            hasher: test_hasher(),
            _dir: dir,
        }
    }

    fn request(
        ids: &[impl AsRef<str>],
        password: Option<&str>,
        expires_in: Option<i64>,
    ) -> CreateShareRequest {
        CreateShareRequest {
            document_ids: ids.iter().map(|s| s.as_ref().to_string()).collect(),
            password: password.map(str::to_string),
            expires_in,
        }
    }

    impl Fixture {
        async fn create(
            &self,
            owner: &str,
            ids: &[impl AsRef<str>],
            password: Option<&str>,
            expires_in: Option<i64>,
        ) -> Result<ShareCreated> {
            ShareService::create_share(
                &self.db,
                &self.settings,
                &self.hasher,
                owner,
                request(ids, password, expires_in),
            )
            .await
        }

        async fn access(&self, token: &str, password: Option<&str>) -> Result<AccessOutcome> {
            ShareService::access_share(&self.db, &self.hasher, token, password.map(str::to_string))
                .await
        }

        async fn access_count(&self, token: &str) -> i64 {
            ShareService::find_by_token(&self.db, token)
                .await
                .unwrap()
                .access_count
        }
    }

    fn granted(outcome: AccessOutcome) -> AccessGranted {
        match outcome {
            AccessOutcome::Granted(granted) => granted,
            AccessOutcome::PasswordRequired => panic!("expected access to be granted"),
        }
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token(10);
        assert_eq!(token.len(), 10);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        assert_ne!(generate_token(21), generate_token(21));
    }

    #[tokio::test]
    async fn test_end_to_end_password_share() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.pdf", &[1u8; 1024]).await;

        let created = f.create("alice", &[&doc.id], Some("hunter2"), None).await.unwrap();
        assert!(created.has_password);
        assert!(created.expires_at.is_none());
        assert_eq!(created.document_count, 1);
        assert_eq!(created.share_id.len(), 10);
        assert_eq!(
            created.share_url,
            format!("http://localhost:3000/share/{}", created.share_id)
        );
        assert!(created.qr_code.starts_with("data:image/svg+xml;base64,"));

        let token = created.share_id.as_str();
        assert!(matches!(
            f.access(token, None).await.unwrap(),
            AccessOutcome::PasswordRequired
        ));
        assert!(matches!(
            f.access(token, Some("")).await.unwrap(),
            AccessOutcome::PasswordRequired
        ));
        assert!(matches!(
            f.access(token, Some("wrong")).await,
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(f.access_count(token).await, 0);

        let result = granted(f.access(token, Some("hunter2")).await.unwrap());
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].original_name, "a.pdf");
        assert_eq!(result.documents[0].size, 1024);
        assert_eq!(f.access_count(token).await, 1);

        let (document, data) = ShareService::download_document(&f.db, &f.storage, token, &doc.id)
            .await
            .unwrap();
        assert_eq!(document.original_name, "a.pdf");
        assert_eq!(data.len(), 1024);
        assert_eq!(f.access_count(token).await, 1);
    }

    #[tokio::test]
    async fn test_share_without_password_ignores_supplied_password() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"x").await;
        let created = f.create("alice", &[&doc.id], None, None).await.unwrap();
        assert!(!created.has_password);

        let token = created.share_id.as_str();
        granted(f.access(token, None).await.unwrap());
        granted(f.access(token, Some("anything")).await.unwrap());
        assert_eq!(f.access_count(token).await, 2);
    }

    #[tokio::test]
    async fn test_empty_password_means_unprotected() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"x").await;
        let created = f.create("alice", &[&doc.id], Some(""), None).await.unwrap();
        assert!(!created.has_password);

        let share = ShareService::find_by_token(&f.db, &created.share_id).await.unwrap();
        assert!(share.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_password_stored_hashed() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"x").await;
        let created = f.create("alice", &[&doc.id], Some("hunter2"), None).await.unwrap();

        let share = ShareService::find_by_token(&f.db, &created.share_id).await.unwrap();
        let hash = share.password_hash.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_expiry_window() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"x").await;
        let created_at = Utc::now();
        let created = ShareService::create_share_at(
            &f.db,
            &f.settings,
            &f.hasher,
            "alice",
            request(&[&doc.id], Some("pw"), Some(7)),
            created_at,
        )
        .await
        .unwrap();

        let expires_at = DateTime::parse_from_rfc3339(created.expires_at.as_deref().unwrap())
            .unwrap()
            .with_timezone(&Utc);
        let drift = expires_at - (created_at + Duration::days(7));
        assert!(drift.num_seconds().abs() < 1);

        let token = created.share_id.as_str();
        let day6 = created_at + Duration::days(6);
        let day8 = created_at + Duration::days(8);

        granted(
            ShareService::access_share_at(&f.db, &f.hasher, token, Some("pw".into()), day6)
                .await
                .unwrap(),
        );

        // Expiry wins over password checks, correct or not
        for password in [None, Some("pw"), Some("wrong")] {
            let result = ShareService::access_share_at(
                &f.db,
                &f.hasher,
                token,
                password.map(str::to_string),
                day8,
            )
            .await;
            assert!(matches!(result, Err(AppError::Gone(_))));
        }

        assert!(matches!(
            ShareService::download_document_at(&f.db, &f.storage, token, &doc.id, day8).await,
            Err(AppError::Gone(_))
        ));
        assert!(ShareService::download_document_at(&f.db, &f.storage, token, &doc.id, day6)
            .await
            .is_ok());
        assert_eq!(f.access_count(token).await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_or_missing_documents() {
        let f = fixture().await;
        let mine = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let theirs = seed_document(&f.db, &f.storage, "bob", "b.txt", b"b").await;

        for ids in [vec![mine.id.as_str(), theirs.id.as_str()], vec![mine.id.as_str(), "missing"]] {
            assert!(matches!(
                f.create("alice", &ids[..], Some("pw"), None).await,
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(matches!(
            f.create("alice", &[] as &[&str], None, None).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            f.create("alice", &[mine.id.as_str()], None, Some(i64::MAX)).await,
            Err(AppError::BadRequest(_))
        ));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shares")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM share_documents")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(rows.0, 0);
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let f = fixture().await;
        let a = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let b = seed_document(&f.db, &f.storage, "alice", "b.txt", b"b").await;

        let created = f
            .create("alice", &[&b.id, &a.id, &b.id], None, None)
            .await
            .unwrap();
        assert_eq!(created.document_count, 2);

        let result = granted(f.access(&created.share_id, None).await.unwrap());
        let names: Vec<&str> = result
            .documents
            .iter()
            .map(|d| d.original_name.as_str())
            .collect();
        assert_eq!(names, ["b.txt", "a.txt"]);
    }

    #[tokio::test]
    async fn test_download_outside_share_is_forbidden() {
        let f = fixture().await;
        let shared = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let private = seed_document(&f.db, &f.storage, "alice", "secret.txt", b"s").await;
        let created = f.create("alice", &[&shared.id], None, None).await.unwrap();

        for id in [private.id.as_str(), "does-not-exist"] {
            assert!(matches!(
                ShareService::download_document(&f.db, &f.storage, &created.share_id, id).await,
                Err(AppError::Forbidden(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let f = fixture().await;
        assert!(matches!(
            f.access("nope-nope-", None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            ShareService::download_document(&f.db, &f.storage, "nope-nope-", "x").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_document_is_dangling() {
        let f = fixture().await;
        let a = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let b = seed_document(&f.db, &f.storage, "alice", "b.txt", b"b").await;
        let created = f.create("alice", &[&a.id, &b.id], None, None).await.unwrap();

        DocumentService::delete_document(&f.db, &f.storage, "alice", &a.id)
            .await
            .unwrap();

        let result = granted(f.access(&created.share_id, None).await.unwrap());
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].id, b.id);

        assert!(matches!(
            ShareService::download_document(&f.db, &f.storage, &created.share_id, &a.id).await,
            Err(AppError::NotFound(_))
        ));

        let listed = ShareService::list_shares(&f.db, &f.settings, "alice").await.unwrap();
        assert_eq!(listed[0].document_ids, [a.id.clone(), b.id.clone()]);
        assert_eq!(listed[0].documents.len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_delete_are_owner_scoped() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let created = f.create("alice", &[&doc.id], Some("pw"), Some(3)).await.unwrap();

        let listed = ShareService::list_shares(&f.db, &f.settings, "alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].share_id, created.share_id);
        assert_eq!(listed[0].share_url, created.share_url);
        assert!(listed[0].has_password);
        assert_eq!(listed[0].expires_at, created.expires_at);
        assert_eq!(listed[0].access_count, 0);
        assert_eq!(listed[0].documents[0].original_name, "a.txt");

        assert!(ShareService::list_shares(&f.db, &f.settings, "bob")
            .await
            .unwrap()
            .is_empty());

        assert!(matches!(
            ShareService::delete_share(&f.db, "bob", &created.share_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            ShareService::delete_share(&f.db, "alice", "unknown-tok").await,
            Err(AppError::NotFound(_))
        ));

        ShareService::delete_share(&f.db, "alice", &created.share_id)
            .await
            .unwrap();
        assert!(matches!(
            f.access(&created.share_id, Some("pw")).await,
            Err(AppError::NotFound(_))
        ));
        // documents survive share deletion
        DocumentService::get_document(&f.db, &doc.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_token_collision_is_reported() {
        let f = fixture().await;
        let draft = NewShare::new("alice", vec!["d1".to_string()], None, Utc::now());

        assert!(ShareService::insert_share(&f.db, &draft, "fixedtoken").await.unwrap());
        assert!(!ShareService::insert_share(&f.db, &draft, "fixedtoken").await.unwrap());

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM share_documents")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }

    async fn table_count(db: &Database, table: &str) -> i64 {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_create_retries_past_taken_tokens() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let first = ShareService::create_share_with(
            &f.db,
            &f.settings,
            &f.hasher,
            "alice",
            request(&[&doc.id], None, None),
            Utc::now(),
            || "takenToken".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(first.share_id, "takenToken");

        let mut candidates = vec!["freshToken", "takenToken", "takenToken"];
        let mut calls = 0;
        let second = ShareService::create_share_with(
            &f.db,
            &f.settings,
            &f.hasher,
            "alice",
            request(&[&doc.id], None, None),
            Utc::now(),
            || {
                calls += 1;
                candidates.pop().unwrap().to_string()
            },
        )
        .await
        .unwrap();
        assert_eq!(second.share_id, "freshToken");
        assert_eq!(calls, 3);
        let stored = ShareService::find_by_token(&f.db, "freshToken").await.unwrap();
        assert_eq!(stored.owner_id, "alice");
        assert_eq!(table_count(&f.db, "shares").await, 2);
        assert_eq!(table_count(&f.db, "share_documents").await, 2);
    }

    #[tokio::test]
    async fn test_create_gives_up_after_token_attempts() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let created = f.create("alice", &[&doc.id], Some("pw"), None).await.unwrap();

        let mut calls = 0;
        let result = ShareService::create_share_with(
            &f.db,
            &f.settings,
            &f.hasher,
            "alice",
            request(&[&doc.id], Some("pw"), Some(3)),
            Utc::now(),
            || {
                calls += 1;
                created.share_id.clone()
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(calls, f.settings.token_attempts);
        assert_eq!(table_count(&f.db, "shares").await, 1);
        assert_eq!(table_count(&f.db, "share_documents").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_accesses_are_all_counted() {
        let f = fixture().await;
        let doc = seed_document(&f.db, &f.storage, "alice", "a.txt", b"a").await;
        let created = f.create("alice", &[&doc.id], None, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = f.db.clone();
            let hasher = f.hasher.clone();
            let token = created.share_id.clone();
            handles.push(tokio::spawn(async move {
                ShareService::access_share(&db, &hasher, &token, None).await
            }));
        }
        for handle in handles {
            granted(handle.await.unwrap().unwrap());
        }
        assert_eq!(f.access_count(&created.share_id).await, 8);
    }
}
