use crate::error::Result;
use crate::types::{normalize_address, CirculationRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Maximum addresses per IN-clause style lookup.
pub const IN_CLAUSE_MAX_BATCH: usize = 30;
/// Maximum records per merge-write batch.
pub const WRITE_MAX_BATCH: usize = 500;

/// Narrow read/write contract over the persisted circulation records. An
/// address present in the store is permanently treated as tainted; writes are
/// merge-only.
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// Fetch records for the given addresses, chunked internally to the
    /// IN-clause limit. Unknown addresses are simply absent from the result.
    async fn fetch_in_circulations(&self, addresses: &[String]) -> Result<Vec<CirculationRecord>>;

    /// True if any of the given addresses has a record.
    async fn any_address_exists(&self, addresses: &[String]) -> Result<bool>;

    async fn address_exists(&self, address: &str) -> Result<bool>;

    /// Merge-write records, chunked to the write batch limit. Returns the
    /// number of records written.
    async fn upsert_batch(&self, records: &[CirculationRecord]) -> Result<usize>;
}

/// In-memory store with an optional JSON snapshot, used by the batch binary
/// and tests. Keyed by lowercase address.
#[derive(Default)]
pub struct MemoryCirculationStore {
    records: RwLock<HashMap<String, CirculationRecord>>,
}

impl MemoryCirculationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I: IntoIterator<Item = CirculationRecord>>(records: I) -> Self {
        let map = records
            .into_iter()
            .map(|record| (normalize_address(&record.address), record))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    pub async fn load_snapshot(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "no circulation snapshot found, starting empty");
            return Ok(Self::new());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let records: Vec<CirculationRecord> = serde_json::from_str(&raw)?;
        info!(path, count = records.len(), "loaded circulation snapshot");
        Ok(Self::with_records(records))
    }

    pub async fn save_snapshot(&self, path: &str) -> Result<()> {
        let records = self.records.read().await;
        let mut all: Vec<&CirculationRecord> = records.values().collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));

        let raw = serde_json::to_string_pretty(&all)?;
        tokio::fs::write(path, raw).await?;
        debug!(path, count = all.len(), "saved circulation snapshot");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl CirculationStore for MemoryCirculationStore {
    async fn fetch_in_circulations(&self, addresses: &[String]) -> Result<Vec<CirculationRecord>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read().await;
        let mut found = Vec::new();
        for batch in addresses.chunks(IN_CLAUSE_MAX_BATCH) {
            for address in batch {
                if let Some(record) = records.get(&normalize_address(address)) {
                    found.push(record.clone());
                }
            }
        }
        Ok(found)
    }

    async fn any_address_exists(&self, addresses: &[String]) -> Result<bool> {
        if addresses.is_empty() {
            return Ok(false);
        }

        let records = self.records.read().await;
        for batch in addresses.chunks(IN_CLAUSE_MAX_BATCH) {
            if batch
                .iter()
                .any(|address| records.contains_key(&normalize_address(address)))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn address_exists(&self, address: &str) -> Result<bool> {
        Ok(self
            .records
            .read()
            .await
            .contains_key(&normalize_address(address)))
    }

    async fn upsert_batch(&self, records: &[CirculationRecord]) -> Result<usize> {
        let now = Utc::now();
        let mut stored = self.records.write().await;

        for batch in records.chunks(WRITE_MAX_BATCH) {
            for record in batch {
                let key = normalize_address(&record.address);
                let mut merged = record.clone();
                merged.address = key.clone();
                merged.created_at = Some(now);

                match stored.get_mut(&key) {
                    Some(existing) => merge_record(existing, &merged),
                    None => {
                        stored.insert(key, merged);
                    }
                }
            }
        }
        Ok(records.len())
    }
}

/// Merge-write semantics: incoming set fields overwrite, absent fields keep
/// the existing value.
fn merge_record(existing: &mut CirculationRecord, incoming: &CirculationRecord) {
    if incoming.withdraw_block_number.is_some() {
        existing.withdraw_block_number = incoming.withdraw_block_number;
    }
    if incoming.circulation_block_number.is_some() {
        existing.circulation_block_number = incoming.circulation_block_number;
    }
    if incoming.withdraw_confirmed.is_some() {
        existing.withdraw_confirmed = incoming.withdraw_confirmed;
    }
    if incoming.circulation_confirmed.is_some() {
        existing.circulation_confirmed = incoming.circulation_confirmed;
    }
    existing.created_at = incoming.created_at;
}

impl std::fmt::Debug for MemoryCirculationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCirculationStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str) -> CirculationRecord {
        CirculationRecord::confirmed(address)
    }

    #[tokio::test]
    async fn test_upsert_and_exists_is_case_insensitive() {
        let store = MemoryCirculationStore::new();
        store.upsert_batch(&[record("0xABCD")]).await.unwrap();

        assert!(store.address_exists("0xabcd").await.unwrap());
        assert!(store.address_exists("0xAbCd").await.unwrap());
        assert!(!store.address_exists("0xother").await.unwrap());
    }

    #[tokio::test]
    async fn test_any_address_exists_over_large_batches() {
        let store = MemoryCirculationStore::new();
        store.upsert_batch(&[record("0xtarget")]).await.unwrap();

        // Push the target past the first IN-clause chunk.
        let mut addresses: Vec<String> = (0..IN_CLAUSE_MAX_BATCH + 5)
            .map(|i| format!("0xfiller{:02}", i))
            .collect();
        addresses.push("0xtarget".to_string());

        assert!(store.any_address_exists(&addresses).await.unwrap());
        assert!(!store
            .any_address_exists(&["0xmissing".to_string()])
            .await
            .unwrap());
        assert!(!store.any_address_exists(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_in_circulations_returns_only_known() {
        let store =
            MemoryCirculationStore::with_records(vec![record("0xaaa"), record("0xbbb")]);

        let found = store
            .fetch_in_circulations(&["0xaaa".to_string(), "0xccc".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "0xaaa");
    }

    #[tokio::test]
    async fn test_merge_write_keeps_existing_fields() {
        let store = MemoryCirculationStore::new();

        let mut first = record("0xaaa");
        first.withdraw_block_number = Some(100);
        first.circulation_confirmed = None;
        store.upsert_batch(&[first]).await.unwrap();

        let mut second = record("0xaaa");
        second.withdraw_block_number = None;
        second.circulation_confirmed = Some(true);
        store.upsert_batch(&[second]).await.unwrap();

        let found = store
            .fetch_in_circulations(&["0xaaa".to_string()])
            .await
            .unwrap();
        assert_eq!(found[0].withdraw_block_number, Some(100));
        assert_eq!(found[0].circulation_confirmed, Some(true));
    }
}
