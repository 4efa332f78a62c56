// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::Utc;
use sitesub_domain::{EpisodeStats, HistoryKey, HistoryRecord, HistoryStatus};
use sitesub_infrastructure::repositories::{HistoryMap, HistoryRepository};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history record {0} not found")]
    NotFound(HistoryKey),
    #[error("history record {key} is {status}, not pending")]
    NotPending {
        key: HistoryKey,
        status: HistoryStatus,
    },
    #[error("cannot transition history record {0} back to pending")]
    InvalidTarget(HistoryKey),
    #[error("failed to persist history: {0}")]
    Persistence(String),
}

/// Keyed lifecycle records, loaded once and written back in full after
/// every mutation.
///
/// All access goes through one async lock that is held across the write,
/// so a stats update and a confirm on the same key cannot interleave.
/// Operator decisions additionally hold `decisions` for their whole
/// duration, and `clear` waits on it.
pub struct HistoryStore {
    records: Mutex<HistoryMap>,
    decisions: Mutex<()>,
    repository: Arc<dyn HistoryRepository>,
}

impl HistoryStore {
    pub async fn load(repository: Arc<dyn HistoryRepository>) -> anyhow::Result<Self> {
        let records = repository.load_history().await?;
        info!(target: "history", records = records.len(), "history loaded");
        Ok(Self {
            records: Mutex::new(records),
            decisions: Mutex::new(()),
            repository,
        })
    }

    /// Exclusive section for a confirm or ignore, including its collaborator
    /// call. Lock order is decisions before records.
    pub async fn lock_decisions(&self) -> MutexGuard<'_, ()> {
        self.decisions.lock().await
    }

    /// Durable at-most-once gate for a configuration flag.
    ///
    /// Returns `true` exactly once while `requested` stays set, across
    /// restarts. Seeing the flag unset re-arms it. Consumption is recorded
    /// before the caller acts.
    pub async fn claim_one_shot(
        &self,
        name: &str,
        requested: bool,
    ) -> Result<bool, HistoryError> {
        let consumed = self
            .repository
            .flag_consumed(name)
            .await
            .map_err(|err| HistoryError::Persistence(err.to_string()))?;

        if !requested {
            if consumed {
                self.repository
                    .set_flag_consumed(name, false)
                    .await
                    .map_err(|err| HistoryError::Persistence(err.to_string()))?;
                debug!(target: "history", flag = name, "one-shot flag re-armed");
            }
            return Ok(false);
        }
        if consumed {
            warn!(
                target: "history",
                flag = name,
                "one-shot flag already consumed; unset it in the configuration to re-arm"
            );
            return Ok(false);
        }

        self.repository
            .set_flag_consumed(name, true)
            .await
            .map_err(|err| HistoryError::Persistence(err.to_string()))?;
        info!(target: "history", flag = name, "one-shot flag consumed");
        Ok(true)
    }

    pub async fn get(&self, key: &HistoryKey) -> Option<HistoryRecord> {
        self.records.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Inserts the record unless its key is already present. Returns whether
    /// an insert happened.
    pub async fn upsert_pending(&self, record: HistoryRecord) -> Result<bool, HistoryError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.key) {
            return Ok(false);
        }

        let key = record.key.clone();
        records.insert(key.clone(), record);
        if let Err(err) = self.write(&records).await {
            records.remove(&key);
            return Err(err);
        }
        debug!(target: "history", %key, "pending record stored");
        Ok(true)
    }

    /// Writes new stats onto a pending record. Returns `Ok(false)` without
    /// touching storage when nothing changed.
    pub async fn update_stats(
        &self,
        key: &HistoryKey,
        stats: EpisodeStats,
    ) -> Result<bool, HistoryError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| HistoryError::NotFound(key.clone()))?;

        if record.status != HistoryStatus::Pending {
            return Err(HistoryError::NotPending {
                key: key.clone(),
                status: record.status,
            });
        }
        if record.stats() == stats {
            return Ok(false);
        }

        let previous = (record.stats(), record.last_update_time);
        record.total_episodes = stats.total;
        record.latest_episode = stats.latest;
        record.last_update_time = Utc::now();

        if let Err(err) = self.write(&records).await {
            if let Some(record) = records.get_mut(key) {
                record.total_episodes = previous.0.total;
                record.latest_episode = previous.0.latest;
                record.last_update_time = previous.1;
            }
            return Err(err);
        }
        debug!(
            target: "history",
            %key,
            total = ?stats.total,
            latest = ?stats.latest,
            "episode stats updated"
        );
        Ok(true)
    }

    /// Moves a pending record to `confirmed` or `ignored`. Terminal records
    /// are never overwritten.
    pub async fn transition(
        &self,
        key: &HistoryKey,
        status: HistoryStatus,
    ) -> Result<HistoryRecord, HistoryError> {
        if !status.is_terminal() {
            return Err(HistoryError::InvalidTarget(key.clone()));
        }

        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| HistoryError::NotFound(key.clone()))?;

        if record.status != HistoryStatus::Pending {
            return Err(HistoryError::NotPending {
                key: key.clone(),
                status: record.status,
            });
        }

        let previous = (record.status, record.last_update_time);
        record.status = status;
        record.last_update_time = Utc::now();
        let updated = record.clone();

        if let Err(err) = self.write(&records).await {
            if let Some(record) = records.get_mut(key) {
                record.status = previous.0;
                record.last_update_time = previous.1;
            }
            return Err(err);
        }
        info!(target: "history", %key, %status, "history record transitioned");
        Ok(updated)
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        let _decisions = self.decisions.lock().await;
        let mut records = self.records.lock().await;
        let dropped = records.len();
        records.clear();
        self.write(&records).await?;
        info!(target: "history", dropped, "history cleared");
        Ok(())
    }

    /// Pending records, most recently discovered first.
    pub async fn pending(&self) -> Vec<HistoryRecord> {
        let records = self.records.lock().await;
        let mut pending: Vec<HistoryRecord> = records
            .values()
            .filter(|r| r.status == HistoryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }

    pub async fn persist(&self) -> Result<(), HistoryError> {
        let records = self.records.lock().await;
        self.write(&records).await
    }

    async fn write(&self, records: &HistoryMap) -> Result<(), HistoryError> {
        self.repository
            .save_history(records)
            .await
            .map_err(|err| HistoryError::Persistence(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use sitesub_domain::{
        CandidateResource, DiscoveryAction, MediaType, ParsedMeta, RecognizedMedia,
    };
    use sitesub_infrastructure::repositories::InMemoryHistoryRepository;

    fn record(id: u64, season: u32) -> HistoryRecord {
        let media = RecognizedMedia::new("Show", MediaType::Series, id);
        let meta = ParsedMeta {
            begin_season: Some(season),
            ..Default::default()
        };
        HistoryRecord::pending(
            HistoryKey::for_media(&media, Some(season)),
            DiscoveryAction::ManualSubscribe,
            &meta,
            &media,
            &CandidateResource::new("1", "Show"),
            EpisodeStats::new(Some(8), Some(2)),
        )
    }

    async fn store() -> (HistoryStore, Arc<InMemoryHistoryRepository>) {
        let repo = Arc::new(InMemoryHistoryRepository::new());
        let store = HistoryStore::load(repo.clone()).await.unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn upsert_only_inserts_absent_keys() {
        let (store, repo) = store().await;

        assert!(store.upsert_pending(record(1, 1)).await.unwrap());
        let mut duplicate = record(1, 1);
        duplicate.title = "other".to_string();
        assert!(!store.upsert_pending(duplicate).await.unwrap());

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&"1_S01".into()).await.unwrap().title, "Show");
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn update_stats_writes_only_on_change() {
        let (store, repo) = store().await;
        store.upsert_pending(record(1, 1)).await.unwrap();
        let key = HistoryKey::from("1_S01");

        assert!(!store
            .update_stats(&key, EpisodeStats::new(Some(8), Some(2)))
            .await
            .unwrap());
        assert_eq!(repo.save_count(), 1);

        assert!(store
            .update_stats(&key, EpisodeStats::new(Some(8), Some(3)))
            .await
            .unwrap());
        assert_eq!(repo.save_count(), 2);
        assert_eq!(repo.snapshot()[&key].latest_episode, Some(3));
    }

    #[tokio::test]
    async fn terminal_records_are_frozen() {
        let (store, _) = store().await;
        store.upsert_pending(record(1, 1)).await.unwrap();
        let key = HistoryKey::from("1_S01");

        let ignored = store
            .transition(&key, HistoryStatus::Ignored)
            .await
            .unwrap();
        assert_eq!(ignored.status, HistoryStatus::Ignored);

        assert!(matches!(
            store.transition(&key, HistoryStatus::Confirmed).await,
            Err(HistoryError::NotPending {
                status: HistoryStatus::Ignored,
                ..
            })
        ));
        assert!(matches!(
            store.transition(&key, HistoryStatus::Ignored).await,
            Err(HistoryError::NotPending { .. })
        ));
        assert!(matches!(
            store
                .update_stats(&key, EpisodeStats::new(Some(9), Some(9)))
                .await,
            Err(HistoryError::NotPending { .. })
        ));
        assert_eq!(
            store.get(&key).await.unwrap().status,
            HistoryStatus::Ignored
        );
    }

    #[tokio::test]
    async fn missing_key_and_pending_target_are_rejected() {
        let (store, _) = store().await;
        let key = HistoryKey::from("404");

        assert!(matches!(
            store.transition(&key, HistoryStatus::Confirmed).await,
            Err(HistoryError::NotFound(_))
        ));
        assert!(matches!(
            store.transition(&key, HistoryStatus::Pending).await,
            Err(HistoryError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn pending_lists_newest_first_and_clear_empties() {
        let (store, repo) = store().await;
        let mut older = record(1, 1);
        older.created_at -= Duration::hours(1);
        store.upsert_pending(older).await.unwrap();
        store.upsert_pending(record(2, 1)).await.unwrap();
        store.upsert_pending(record(3, 1)).await.unwrap();
        store
            .transition(&"3_S01".into(), HistoryStatus::Confirmed)
            .await
            .unwrap();

        let keys: Vec<String> = store
            .pending()
            .await
            .into_iter()
            .map(|r| r.key.0)
            .collect();
        assert_eq!(keys, vec!["2_S01", "1_S01"]);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
        assert!(repo.snapshot().is_empty());
    }

    struct FailingRepository;

    #[async_trait]
    impl HistoryRepository for FailingRepository {
        async fn load_history(&self) -> anyhow::Result<HistoryMap> {
            Ok(HistoryMap::new())
        }

        async fn save_history(&self, _records: &HistoryMap) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn flag_consumed(&self, _name: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn set_flag_consumed(&self, _name: &str, _consumed: bool) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn failed_write_rolls_back_insert() {
        let store = HistoryStore::load(Arc::new(FailingRepository)).await.unwrap();

        let result = store.upsert_pending(record(1, 1)).await;
        assert!(matches!(result, Err(HistoryError::Persistence(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn one_shot_fires_once_across_reloads() {
        let repo = Arc::new(InMemoryHistoryRepository::new());
        let first = HistoryStore::load(repo.clone()).await.unwrap();
        assert!(first.claim_one_shot("reset_history", true).await.unwrap());
        assert!(!first.claim_one_shot("reset_history", true).await.unwrap());

        let restarted = HistoryStore::load(repo.clone()).await.unwrap();
        assert!(!restarted.claim_one_shot("reset_history", true).await.unwrap());

        assert!(!restarted.claim_one_shot("reset_history", false).await.unwrap());
        assert!(restarted.claim_one_shot("reset_history", true).await.unwrap());
        assert!(restarted.claim_one_shot("run_once", true).await.unwrap());
    }

    #[tokio::test]
    async fn unrecorded_one_shot_does_not_fire() {
        let store = HistoryStore::load(Arc::new(FailingRepository)).await.unwrap();
        assert!(matches!(
            store.claim_one_shot("reset_history", true).await,
            Err(HistoryError::Persistence(_))
        ));
    }
}
