//! Read-only repository over the `storage_profiles` table. The core reads
//! this entity but never writes it: profile management belongs to an
//! external collaborator, so this store offers `load`/`list_by_user` and
//! nothing that mutates a row.

use sqlx::{Pool, Postgres};
use torreclou_core::ids::{StorageProfileId, UserId};
use torreclou_core::provider::StorageProfile;

use crate::rows::profile_from_row;

#[derive(Clone)]
pub struct ProfileStore {
    pool: Pool<Postgres>,
}

impl ProfileStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn load(&self, profile_id: StorageProfileId) -> anyhow::Result<Option<StorageProfile>> {
        let row = sqlx::query(r#"SELECT * FROM storage_profiles WHERE id = $1"#)
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    pub async fn list_by_user(&self, user_id: UserId) -> anyhow::Result<Vec<StorageProfile>> {
        let rows = sqlx::query(r#"SELECT * FROM storage_profiles WHERE user_id = $1 ORDER BY id"#)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn load_missing_profile_returns_none(pool: Pool<Postgres>) {
        let store = ProfileStore::new(pool);
        assert!(store.load(999).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn load_returns_seeded_profile(pool: Pool<Postgres>) {
        sqlx::query(
            r#"INSERT INTO storage_profiles (id, user_id, profile_name, provider_type, credentials_json)
               VALUES (1, 7, 'My Drive', 'GoogleDrive', '{}')"#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = ProfileStore::new(pool);
        let profile = store.load(1).await.unwrap().unwrap();
        assert_eq!(profile.user_id, 7);
        assert_eq!(profile.provider_type, torreclou_core::provider::ProviderType::GoogleDrive);
    }
}
