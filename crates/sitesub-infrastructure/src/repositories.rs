// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Result};
use sitesub_domain::{HistoryKey, HistoryRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub type HistoryMap = BTreeMap<HistoryKey, HistoryRecord>;

/// Durable storage for the whole discovery history, read once and written back as a unit.
#[async_trait::async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn load_history(&self) -> Result<HistoryMap>;
    async fn save_history(&self, records: &HistoryMap) -> Result<()>;

    /// Whether the one-shot flag `name` has already fired.
    async fn flag_consumed(&self, name: &str) -> Result<bool>;

    async fn set_flag_consumed(&self, name: &str, consumed: bool) -> Result<()>;
}

/// Non-durable repository for tests and dry runs.
#[derive(Default)]
pub struct InMemoryHistoryRepository {
    records: Mutex<HistoryMap>,
    consumed_flags: Mutex<BTreeSet<String>>,
    saves: AtomicUsize,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_history` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HistoryMap {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn load_history(&self) -> Result<HistoryMap> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?;
        Ok(records.clone())
    }

    async fn save_history(&self, records: &HistoryMap) -> Result<()> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?;
        *stored = records.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flag_consumed(&self, name: &str) -> Result<bool> {
        let flags = self
            .consumed_flags
            .lock()
            .map_err(|_| anyhow!("flag lock poisoned"))?;
        Ok(flags.contains(name))
    }

    async fn set_flag_consumed(&self, name: &str, consumed: bool) -> Result<()> {
        let mut flags = self
            .consumed_flags
            .lock()
            .map_err(|_| anyhow!("flag lock poisoned"))?;
        if consumed {
            flags.insert(name.to_string());
        } else {
            flags.remove(name);
        }
        Ok(())
    }
}
