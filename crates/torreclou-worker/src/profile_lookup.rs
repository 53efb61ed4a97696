//! Adapts `torreclou_store::ProfileStore` to the `StorageProfileLookup`
//! capability contract the Recovery Supervisor depends on, so that crate
//! never has to know a Postgres-backed store exists.

use async_trait::async_trait;
use torreclou_core::provider::StorageProfile;
use torreclou_recovery::StorageProfileLookup;
use torreclou_store::ProfileStore;

pub struct StoreProfileLookup {
    profiles: ProfileStore,
}

impl StoreProfileLookup {
    pub fn new(profiles: ProfileStore) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl StorageProfileLookup for StoreProfileLookup {
    async fn load(&self, profile_id: i64) -> anyhow::Result<Option<StorageProfile>> {
        self.profiles.load(profile_id).await
    }
}
