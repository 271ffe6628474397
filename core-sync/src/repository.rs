//! # Remote File Repository
//!
//! SQLite persistence for [`RemoteFile`] rows.
//!
//! Queries name their columns explicitly so that rows written by a newer
//! schema (extra nullable columns) still read back.

use crate::model::RemoteFile;
use crate::{Result, SyncError};
use async_trait::async_trait;
use core_auth::FSType;
use sqlx::{FromRow, SqlitePool};

const COLUMNS: &str = "id, uid, remote_path, fs_type, authority_key, revision, \
    is_downloaded, is_locally_modified, is_uploaded, last_download_timestamp, \
    last_modification_timestamp, last_remote_modification_timestamp";

#[async_trait]
pub trait RemoteFileRepository: Send + Sync {
    /// Insert a row, or update the existing row for the same
    /// `(uid, authority_key)`. Returns the row id.
    async fn upsert(&self, file: &RemoteFile) -> Result<i64>;

    /// Update the row identified by `file.id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::MissingId`] when the row was never stored and
    /// [`SyncError::RowNotFound`] when it was deleted meanwhile.
    async fn update(&self, file: &RemoteFile) -> Result<()>;

    async fn find_by_uid(&self, uid: &str, authority_key: &str) -> Result<Option<RemoteFile>>;

    async fn find_by_remote_path(
        &self,
        remote_path: &str,
        authority_key: &str,
    ) -> Result<Option<RemoteFile>>;

    async fn find_locally_modified(&self, fs_type: FSType) -> Result<Vec<RemoteFile>>;

    async fn find_all(&self, fs_type: FSType) -> Result<Vec<RemoteFile>>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqliteRemoteFileRepository {
    pool: SqlitePool,
}

impl SqliteRemoteFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RemoteFileRow {
    id: i64,
    uid: String,
    remote_path: String,
    fs_type: String,
    authority_key: String,
    revision: Option<String>,
    is_downloaded: bool,
    is_locally_modified: bool,
    is_uploaded: bool,
    last_download_timestamp: Option<i64>,
    last_modification_timestamp: Option<i64>,
    last_remote_modification_timestamp: Option<i64>,
}

impl TryFrom<RemoteFileRow> for RemoteFile {
    type Error = SyncError;

    fn try_from(row: RemoteFileRow) -> Result<Self> {
        let fs_type = FSType::parse(&row.fs_type).ok_or_else(|| {
            SyncError::Database(sqlx::Error::Decode(
                format!("Invalid fs_type: {}", row.fs_type).into(),
            ))
        })?;

        Ok(RemoteFile {
            id: Some(row.id),
            uid: row.uid,
            remote_path: row.remote_path,
            fs_type,
            authority_key: row.authority_key,
            revision: row.revision,
            is_downloaded: row.is_downloaded,
            is_locally_modified: row.is_locally_modified,
            is_uploaded: row.is_uploaded,
            last_download_timestamp: row.last_download_timestamp,
            last_modification_timestamp: row.last_modification_timestamp,
            last_remote_modification_timestamp: row.last_remote_modification_timestamp,
        })
    }
}

fn convert(rows: Vec<RemoteFileRow>) -> Result<Vec<RemoteFile>> {
    rows.into_iter().map(RemoteFile::try_from).collect()
}

#[async_trait]
impl RemoteFileRepository for SqliteRemoteFileRepository {
    async fn upsert(&self, file: &RemoteFile) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO remote_files (
                uid, remote_path, fs_type, authority_key, revision,
                is_downloaded, is_locally_modified, is_uploaded,
                last_download_timestamp, last_modification_timestamp,
                last_remote_modification_timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (uid, authority_key) DO UPDATE SET
                remote_path = excluded.remote_path,
                revision = excluded.revision,
                is_downloaded = excluded.is_downloaded,
                is_locally_modified = excluded.is_locally_modified,
                is_uploaded = excluded.is_uploaded,
                last_download_timestamp = excluded.last_download_timestamp,
                last_modification_timestamp = excluded.last_modification_timestamp,
                last_remote_modification_timestamp = excluded.last_remote_modification_timestamp
            RETURNING id
            "#,
        )
        .bind(&file.uid)
        .bind(&file.remote_path)
        .bind(file.fs_type.as_str())
        .bind(&file.authority_key)
        .bind(&file.revision)
        .bind(file.is_downloaded)
        .bind(file.is_locally_modified)
        .bind(file.is_uploaded)
        .bind(file.last_download_timestamp)
        .bind(file.last_modification_timestamp)
        .bind(file.last_remote_modification_timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, file: &RemoteFile) -> Result<()> {
        let id = file.id.ok_or(SyncError::MissingId)?;
        let result = sqlx::query(
            r#"
            UPDATE remote_files SET
                remote_path = ?,
                revision = ?,
                is_downloaded = ?,
                is_locally_modified = ?,
                is_uploaded = ?,
                last_download_timestamp = ?,
                last_modification_timestamp = ?,
                last_remote_modification_timestamp = ?
            WHERE id = ?
            "#,
        )
        .bind(&file.remote_path)
        .bind(&file.revision)
        .bind(file.is_downloaded)
        .bind(file.is_locally_modified)
        .bind(file.is_uploaded)
        .bind(file.last_download_timestamp)
        .bind(file.last_modification_timestamp)
        .bind(file.last_remote_modification_timestamp)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RowNotFound(id));
        }
        Ok(())
    }

    async fn find_by_uid(&self, uid: &str, authority_key: &str) -> Result<Option<RemoteFile>> {
        let query = format!(
            "SELECT {} FROM remote_files WHERE uid = ? AND authority_key = ?",
            COLUMNS
        );
        let row = sqlx::query_as::<_, RemoteFileRow>(&query)
            .bind(uid)
            .bind(authority_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RemoteFile::try_from).transpose()
    }

    async fn find_by_remote_path(
        &self,
        remote_path: &str,
        authority_key: &str,
    ) -> Result<Option<RemoteFile>> {
        let query = format!(
            "SELECT {} FROM remote_files WHERE remote_path = ? AND authority_key = ? \
             ORDER BY id LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query_as::<_, RemoteFileRow>(&query)
            .bind(remote_path)
            .bind(authority_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RemoteFile::try_from).transpose()
    }

    async fn find_locally_modified(&self, fs_type: FSType) -> Result<Vec<RemoteFile>> {
        let query = format!(
            "SELECT {} FROM remote_files WHERE fs_type = ? AND is_locally_modified = 1 \
             ORDER BY id",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, RemoteFileRow>(&query)
            .bind(fs_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        convert(rows)
    }

    async fn find_all(&self, fs_type: FSType) -> Result<Vec<RemoteFile>> {
        let query = format!(
            "SELECT {} FROM remote_files WHERE fs_type = ? ORDER BY id",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, RemoteFileRow>(&query)
            .bind(fs_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        convert(rows)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM remote_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::model::authority_key;
    use core_auth::{FSAuthority, ServerCredentials};

    fn authority() -> FSAuthority {
        FSAuthority::webdav(ServerCredentials::basic("https://dav.example.com", "jo", "pw"))
    }

    async fn repository() -> SqliteRemoteFileRepository {
        SqliteRemoteFileRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_uid_and_authority() {
        let repo = repository().await;
        let mut file = RemoteFile::new("/db.kdbx", "/db.kdbx", &authority());
        file.revision = Some("rev1".to_string());

        let first = repo.upsert(&file).await.unwrap();
        file.revision = Some("rev2".to_string());
        let second = repo.upsert(&file).await.unwrap();

        assert_eq!(first, second);
        let stored = repo
            .find_by_uid("/db.kdbx", &authority_key(&authority()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, Some(first));
        assert_eq!(stored.revision.as_deref(), Some("rev2"));
        assert_eq!(repo.find_all(FSType::WebDav).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_queries() {
        let repo = repository().await;
        let key = authority_key(&authority());
        let mut file = RemoteFile::new("uid-1", "/vaults/db.kdbx", &authority());
        file.id = Some(repo.upsert(&file).await.unwrap());

        file.is_locally_modified = true;
        file.last_modification_timestamp = Some(42);
        repo.update(&file).await.unwrap();

        let by_path = repo
            .find_by_remote_path("/vaults/db.kdbx", &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_path, file);

        let modified = repo.find_locally_modified(FSType::WebDav).await.unwrap();
        assert_eq!(modified, vec![file.clone()]);
        assert!(repo
            .find_locally_modified(FSType::Git)
            .await
            .unwrap()
            .is_empty());

        repo.delete(file.id.unwrap()).await.unwrap();
        assert!(repo.find_by_uid("uid-1", &key).await.unwrap().is_none());
        assert!(matches!(
            repo.update(&file).await,
            Err(SyncError::RowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let repo = repository().await;
        let file = RemoteFile::new("uid-1", "/db.kdbx", &authority());
        assert!(matches!(
            repo.update(&file).await,
            Err(SyncError::MissingId)
        ));
    }
}
