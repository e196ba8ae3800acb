use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use holdem_engine::pot::PotAward;
use holdem_engine::{ActionKind, HandState, Phase, SeatNo, Street};

/// Lifecycle of one table run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

/// One row per table run, upserted as the run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRunRecord {
    pub table_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub hands_requested: u32,
    pub hands_completed: u32,
    pub total_actions: u32,
    pub total_fallbacks: u32,
    pub current_hand_no: u32,
}

/// One row per hand: a stub at start, replaced with the terminal snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand_id: String,
    pub table_id: String,
    pub hand_no: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub final_phase: Phase,
    pub final_state: HandState,
    pub winner_summary: Vec<PotAward>,
}

/// One row per applied action, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: u64,
    pub hand_id: String,
    pub street: Street,
    pub acting_seat: SeatNo,
    pub action: ActionKind,
    pub amount: Option<u32>,
    pub is_fallback: bool,
    pub at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("hand not found: {0}")]
    HandNotFound(String),
    #[error("hand already exists for (table {table_id}, hand {hand_no})")]
    HandAlreadyExists { table_id: String, hand_no: u32 },
    #[error("database failure: {0}")]
    Database(String),
}

/// Narrow persistence port the runner writes through. Implementations must be
/// safe for concurrent callers across tables.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn upsert_table_run(&self, record: &TableRunRecord) -> Result<(), StoreError>;
    async fn create_hand(&self, record: &HandRecord) -> Result<(), StoreError>;
    async fn complete_hand(&self, record: &HandRecord) -> Result<(), StoreError>;
    async fn append_action(
        &self,
        hand_id: &str,
        record: &ActionRecord,
    ) -> Result<u64, StoreError>;
    async fn get_table_run(&self, table_id: &str) -> Result<Option<TableRunRecord>, StoreError>;
    async fn list_hands(&self, table_id: &str) -> Result<Vec<HandRecord>, StoreError>;
    async fn list_actions(&self, hand_id: &str) -> Result<Vec<ActionRecord>, StoreError>;
    async fn get_hand(&self, hand_id: &str) -> Result<HandRecord, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    runs: HashMap<String, TableRunRecord>,
    hands: HashMap<String, HandRecord>,
    actions: HashMap<String, Vec<ActionRecord>>,
    next_action_id: u64,
}

/// In-memory store for tests and the local driver. Every boundary clones, so
/// callers can never alias the stored records.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn upsert_table_run(&self, record: &TableRunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.runs.insert(record.table_id.clone(), record.clone());
        Ok(())
    }

    async fn create_hand(&self, record: &HandRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.hands.contains_key(&record.hand_id) {
            // idempotent on the primary key
            return Ok(());
        }
        let clash = inner
            .hands
            .values()
            .any(|h| h.table_id == record.table_id && h.hand_no == record.hand_no);
        if clash {
            return Err(StoreError::HandAlreadyExists {
                table_id: record.table_id.clone(),
                hand_no: record.hand_no,
            });
        }
        inner.hands.insert(record.hand_id.clone(), record.clone());
        inner.actions.entry(record.hand_id.clone()).or_default();
        Ok(())
    }

    async fn complete_hand(&self, record: &HandRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.hands.contains_key(&record.hand_id) {
            return Err(StoreError::HandNotFound(record.hand_id.clone()));
        }
        inner.hands.insert(record.hand_id.clone(), record.clone());
        Ok(())
    }

    async fn append_action(
        &self,
        hand_id: &str,
        record: &ActionRecord,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.hands.contains_key(hand_id) {
            return Err(StoreError::HandNotFound(hand_id.to_string()));
        }
        inner.next_action_id += 1;
        let id = inner.next_action_id;
        let mut stored = record.clone();
        stored.id = id;
        stored.hand_id = hand_id.to_string();
        inner.actions.entry(hand_id.to_string()).or_default().push(stored);
        Ok(id)
    }

    async fn get_table_run(&self, table_id: &str) -> Result<Option<TableRunRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.runs.get(table_id).cloned())
    }

    async fn list_hands(&self, table_id: &str) -> Result<Vec<HandRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut hands: Vec<HandRecord> = inner
            .hands
            .values()
            .filter(|h| h.table_id == table_id)
            .cloned()
            .collect();
        hands.sort_by_key(|h| h.hand_no);
        Ok(hands)
    }

    async fn list_actions(&self, hand_id: &str) -> Result<Vec<ActionRecord>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.hands.contains_key(hand_id) {
            return Err(StoreError::HandNotFound(hand_id.to_string()));
        }
        Ok(inner.actions.get(hand_id).cloned().unwrap_or_default())
    }

    async fn get_hand(&self, hand_id: &str) -> Result<HandRecord, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .hands
            .get(hand_id)
            .cloned()
            .ok_or_else(|| StoreError::HandNotFound(hand_id.to_string()))
    }
}
