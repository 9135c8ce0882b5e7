/// Session cache backends
///
/// One record per account id, stored as the JSON session payload with no
/// expiry; logout deletes the entry explicitly. A login for an account
/// overwrites any prior record (single-active-session, last-writer-wins
/// under concurrent logins for the same account).
use crate::{
    error::{GateError, GateResult},
    session::{SessionRecord, SessionStatus},
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage seam for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the record for an account, replacing any prior record
    async fn put(&self, account_id: Uuid, record: &SessionRecord) -> GateResult<()>;

    /// Load the record for an account; `None` on miss or corrupted payload
    async fn get(&self, account_id: Uuid) -> GateResult<Option<SessionRecord>>;

    /// Flip the record status to `updated` so the next validation fails
    /// with the "data changed" reason; no-op when no record exists
    async fn mark_updated(&self, account_id: Uuid) -> GateResult<()>;

    /// Remove the record outright (logout)
    async fn delete(&self, account_id: Uuid) -> GateResult<()>;
}

/// Redis-backed session store
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to Redis and verify the connection is usable
    pub async fn new(redis_url: &str) -> GateResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = Client::open(redis_url)
            .map_err(|e| GateError::Cache(format!("Redis client creation failed: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| GateError::Cache(format!("Redis connection failed: {}", e)))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, account_id: Uuid, record: &SessionRecord) -> GateResult<()> {
        let json = record.to_json()?;

        let mut conn = self.connection.clone();
        let _: () = conn
            .set(account_id.to_string(), json)
            .await
            .map_err(|e| GateError::Cache(format!("Session write failed: {}", e)))?;

        debug!("session record written for {}", account_id);
        Ok(())
    }

    async fn get(&self, account_id: Uuid) -> GateResult<Option<SessionRecord>> {
        let key = account_id.to_string();

        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| GateError::Cache(format!("Session read failed: {}", e)))?;

        let Some(raw) = raw else {
            debug!("session record miss for {}", account_id);
            return Ok(None);
        };

        match SessionRecord::from_json(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("corrupted session record for {}: {}", account_id, e);
                // Drop the corrupted entry so it behaves like a miss
                let _: () = conn
                    .del(&key)
                    .await
                    .map_err(|e| GateError::Cache(format!("Session delete failed: {}", e)))?;
                Ok(None)
            }
        }
    }

    async fn mark_updated(&self, account_id: Uuid) -> GateResult<()> {
        let Some(mut record) = self.get(account_id).await? else {
            debug!("mark_updated: no session record for {}", account_id);
            return Ok(());
        };

        record.status = SessionStatus::Updated;
        self.put(account_id, &record).await
    }

    async fn delete(&self, account_id: Uuid) -> GateResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(account_id.to_string())
            .await
            .map_err(|e| GateError::Cache(format!("Session delete failed: {}", e)))?;

        debug!("session record deleted for {}", account_id);
        Ok(())
    }
}

/// In-process session store
///
/// Used by the test suites and by deployments without a Redis URL. The
/// map holds the serialized JSON payload so reads exercise the same
/// strict parse as the Redis backend.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<Uuid, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, account_id: Uuid, record: &SessionRecord) -> GateResult<()> {
        let json = record.to_json()?;
        self.entries.write().await.insert(account_id, json);
        Ok(())
    }

    async fn get(&self, account_id: Uuid) -> GateResult<Option<SessionRecord>> {
        let raw = match self.entries.read().await.get(&account_id) {
            Some(raw) => raw.clone(),
            None => return Ok(None),
        };

        match SessionRecord::from_json(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("corrupted session record for {}: {}", account_id, e);
                self.entries.write().await.remove(&account_id);
                Ok(None)
            }
        }
    }

    async fn mark_updated(&self, account_id: Uuid) -> GateResult<()> {
        let Some(mut record) = self.get(account_id).await? else {
            debug!("mark_updated: no session record for {}", account_id);
            return Ok(());
        };

        record.status = SessionStatus::Updated;
        self.put(account_id, &record).await
    }

    async fn delete(&self, account_id: Uuid) -> GateResult<()> {
        self.entries.write().await.remove(&account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ModuleGrant;

    fn record() -> SessionRecord {
        SessionRecord::new(
            "jwt-echo".to_string(),
            vec![ModuleGrant {
                module_id: "profile".to_string(),
                module_access: true,
                read_access: true,
                write_access: true,
                delete_access: false,
            }],
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.put(id, &record()).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.token, "jwt-echo");
        assert_eq!(loaded.status, SessionStatus::Created);
        assert_eq!(loaded.module.len(), 1);
    }

    #[tokio::test]
    async fn test_get_miss_is_none() {
        let store = MemorySessionStore::new();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_prior_record() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.put(id, &record()).await.unwrap();

        let second = SessionRecord::new("new-token".to_string(), vec![]);
        store.put(id, &second).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.token, "new-token");
        assert!(loaded.module.is_empty());
    }

    #[tokio::test]
    async fn test_mark_updated_flips_status_only() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.put(id, &record()).await.unwrap();
        store.mark_updated(id).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Updated);
        // Token echo and grants survive the flip
        assert_eq!(loaded.token, "jwt-echo");
        assert_eq!(loaded.module.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_updated_without_record_is_noop() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.mark_updated(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.put(id, &record()).await.unwrap();
        store.delete(id).await.unwrap();

        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_payload_reads_as_miss() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .entries
            .write()
            .await
            .insert(id, "not-json".to_string());

        assert!(store.get(id).await.unwrap().is_none());
        // Corrupted entry was dropped
        assert!(store.entries.read().await.get(&id).is_none());
    }
}
