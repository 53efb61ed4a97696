//! Read-only repository over the `requested_files` table: resolves a Job's
//! `requestedFileId` to the `.torrent` path or magnet/HTTPS source the
//! Download Stage needs to start. Like `ProfileStore`, this entity is owned
//! by an external collaborator and never written here.

use sqlx::{Pool, Postgres, Row};
use torreclou_core::ids::RequestedFileId;

#[derive(Clone)]
pub struct RequestedFileStore {
    pool: Pool<Postgres>,
}

impl RequestedFileStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn torrent_source(&self, requested_file_id: RequestedFileId) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(r#"SELECT torrent_source FROM requested_files WHERE id = $1"#)
            .bind(requested_file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("torrent_source")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn resolves_seeded_source(pool: Pool<Postgres>) {
        sqlx::query(r#"INSERT INTO requested_files (id, torrent_source) VALUES (1, '/torrents/1.torrent')"#)
            .execute(&pool)
            .await
            .unwrap();

        let store = RequestedFileStore::new(pool);
        assert_eq!(store.torrent_source(1).await.unwrap(), Some("/torrents/1.torrent".to_string()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_id_returns_none(pool: Pool<Postgres>) {
        let store = RequestedFileStore::new(pool);
        assert_eq!(store.torrent_source(999).await.unwrap(), None);
    }
}
