// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::repositories::{HistoryMap, HistoryRepository};

const HISTORY_KEY: &str = "history";
const FLAG_PREFIX: &str = "flag_consumed:";

/// Stores the history as one JSON document in the `plugin_data` table.
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn load_history(&self) -> Result<HistoryMap> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM plugin_data WHERE key = ? LIMIT 1")
                .bind(HISTORY_KEY)
                .fetch_optional(&self.pool)
                .await?;

        let Some(value) = value else {
            debug!(target: "repository", "no stored history");
            return Ok(HistoryMap::new());
        };

        let records: HistoryMap =
            serde_json::from_str(&value).context("stored history is not valid JSON")?;
        debug!(target: "repository", records = records.len(), "history loaded");
        Ok(records)
    }

    async fn save_history(&self, records: &HistoryMap) -> Result<()> {
        let value = serde_json::to_string(records)?;
        debug!(target: "repository", records = records.len(), "saving history");

        sqlx::query(
            r#"
            INSERT INTO plugin_data (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(HISTORY_KEY)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn flag_consumed(&self, name: &str) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT key FROM plugin_data WHERE key = ? LIMIT 1")
                .bind(format!("{FLAG_PREFIX}{name}"))
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn set_flag_consumed(&self, name: &str, consumed: bool) -> Result<()> {
        let key = format!("{FLAG_PREFIX}{name}");
        debug!(target: "repository", %key, consumed, "updating one-shot flag");

        if consumed {
            sqlx::query(
                r#"
                INSERT INTO plugin_data (key, value, updated_at)
                VALUES (?, 'true', ?)
                ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM plugin_data WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesub_domain::{
        CandidateResource, DiscoveryAction, EpisodeStats, HistoryKey, HistoryRecord,
        HistoryStatus, MediaType, ParsedMeta, RecognizedMedia,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");

        sqlx::migrate!("../../migrations").run(&pool).await.expect("migrate");
        pool
    }

    fn record(id: u64) -> HistoryRecord {
        let media = RecognizedMedia::new("Show", MediaType::Series, id);
        let meta = ParsedMeta {
            begin_season: Some(1),
            ..Default::default()
        };
        HistoryRecord::pending(
            HistoryKey::for_media(&media, Some(1)),
            DiscoveryAction::ManualSubscribe,
            &meta,
            &media,
            &CandidateResource::new("1", "Show.S01E01"),
            EpisodeStats::new(Some(8), Some(1)),
        )
    }

    #[tokio::test]
    async fn empty_store_loads_empty_history() {
        let repo = SqliteHistoryRepository::new(setup_pool().await);
        assert!(repo.load_history().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn history_save_and_reload_round_trip() {
        let repo = SqliteHistoryRepository::new(setup_pool().await);

        let mut history = HistoryMap::new();
        let first = record(1);
        history.insert(first.key.clone(), first);
        repo.save_history(&history).await.expect("save");

        let mut second = record(2);
        second.status = HistoryStatus::Ignored;
        history.insert(second.key.clone(), second);
        repo.save_history(&history).await.expect("overwrite");

        let loaded = repo.load_history().await.expect("reload");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&HistoryKey::from("2_S01")].status, HistoryStatus::Ignored);
        assert_eq!(loaded[&HistoryKey::from("1_S01")].latest_episode, Some(1));
    }

    #[tokio::test]
    async fn consumed_flags_survive_a_new_repository() {
        let pool = setup_pool().await;
        let repo = SqliteHistoryRepository::new(pool.clone());
        assert!(!repo.flag_consumed("reset_history").await.expect("read"));

        repo.set_flag_consumed("reset_history", true).await.expect("mark");
        repo.set_flag_consumed("reset_history", true).await.expect("mark again");

        let reopened = SqliteHistoryRepository::new(pool);
        assert!(reopened.flag_consumed("reset_history").await.expect("read"));
        assert!(!reopened.flag_consumed("run_once").await.expect("read"));
        assert!(reopened.load_history().await.expect("load").is_empty());

        reopened.set_flag_consumed("reset_history", false).await.expect("unmark");
        assert!(!repo.flag_consumed("reset_history").await.expect("read"));
    }
}
