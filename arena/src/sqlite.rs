use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use holdem_engine::{ActionKind, HandState, Phase, SeatNo, Street};

use crate::store::{
    ActionRecord, HandRecord, RunStatus, StoreError, TableRunRecord, TableStore,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS table_runs (
    table_id        TEXT PRIMARY KEY,
    status          TEXT NOT NULL,
    started_at      TEXT NOT NULL,
    ended_at        TEXT,
    error           TEXT,
    hands_requested INTEGER NOT NULL,
    hands_completed INTEGER NOT NULL,
    total_actions   INTEGER NOT NULL,
    total_fallbacks INTEGER NOT NULL,
    current_hand_no INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS hands (
    hand_id        TEXT PRIMARY KEY,
    table_id       TEXT NOT NULL,
    hand_no        INTEGER NOT NULL,
    started_at     TEXT NOT NULL,
    ended_at       TEXT,
    final_phase    TEXT NOT NULL,
    final_state    TEXT NOT NULL,
    winner_summary TEXT NOT NULL,
    UNIQUE (table_id, hand_no)
);

CREATE TABLE IF NOT EXISTS actions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    hand_id     TEXT NOT NULL REFERENCES hands(hand_id) ON DELETE CASCADE,
    street      TEXT NOT NULL,
    acting_seat INTEGER NOT NULL,
    action      TEXT NOT NULL,
    amount      INTEGER,
    is_fallback INTEGER NOT NULL,
    at          TEXT NOT NULL
);
"#;

/// SQL-backed store. Hand snapshots and pot awards are kept as JSON blobs;
/// everything the replay API filters on is a plain column.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`, e.g. `sqlite::memory:` or
    /// `sqlite://arena.db`, and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        Ok(SqliteStore { pool })
    }
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn upsert_table_run(&self, record: &TableRunRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO table_runs (table_id, status, started_at, ended_at, error, \
             hands_requested, hands_completed, total_actions, total_fallbacks, current_hand_no) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(table_id) DO UPDATE SET \
             status = excluded.status, ended_at = excluded.ended_at, error = excluded.error, \
             hands_requested = excluded.hands_requested, hands_completed = excluded.hands_completed, \
             total_actions = excluded.total_actions, total_fallbacks = excluded.total_fallbacks, \
             current_hand_no = excluded.current_hand_no",
        )
        .bind(&record.table_id)
        .bind(status_text(record.status))
        .bind(record.started_at.to_rfc3339())
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(&record.error)
        .bind(record.hands_requested as i64)
        .bind(record.hands_completed as i64)
        .bind(record.total_actions as i64)
        .bind(record.total_fallbacks as i64)
        .bind(record.current_hand_no as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn create_hand(&self, record: &HandRecord) -> Result<(), StoreError> {
        // idempotent on the primary key
        let known: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM hands WHERE hand_id = ?")
            .bind(&record.hand_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if known.is_some() {
            return Ok(());
        }

        let result = sqlx::query(
            "INSERT INTO hands (hand_id, table_id, hand_no, started_at, ended_at, \
             final_phase, final_state, winner_summary) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.hand_id)
        .bind(&record.table_id)
        .bind(record.hand_no as i64)
        .bind(record.started_at.to_rfc3339())
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(record.final_phase.to_string())
        .bind(to_json(&record.final_state)?)
        .bind(to_json(&record.winner_summary)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::HandAlreadyExists {
                table_id: record.table_id.clone(),
                hand_no: record.hand_no,
            }),
            Err(err) => Err(db_err(err)),
        }
    }

    async fn complete_hand(&self, record: &HandRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE hands SET ended_at = ?, final_phase = ?, final_state = ?, \
             winner_summary = ? WHERE hand_id = ?",
        )
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(record.final_phase.to_string())
        .bind(to_json(&record.final_state)?)
        .bind(to_json(&record.winner_summary)?)
        .bind(&record.hand_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::HandNotFound(record.hand_id.clone()));
        }
        Ok(())
    }

    async fn append_action(
        &self,
        hand_id: &str,
        record: &ActionRecord,
    ) -> Result<u64, StoreError> {
        let known: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM hands WHERE hand_id = ?")
            .bind(hand_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if known.is_none() {
            return Err(StoreError::HandNotFound(hand_id.to_string()));
        }

        let result = sqlx::query(
            "INSERT INTO actions (hand_id, street, acting_seat, action, amount, is_fallback, at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hand_id)
        .bind(record.street.to_string())
        .bind(record.acting_seat.get() as i64)
        .bind(record.action.to_string())
        .bind(record.amount.map(|a| a as i64))
        .bind(record.is_fallback)
        .bind(record.at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid() as u64)
    }

    async fn get_table_run(&self, table_id: &str) -> Result<Option<TableRunRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM table_runs WHERE table_id = ?")
            .bind(table_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| run_from_row(&r)).transpose()
    }

    async fn list_hands(&self, table_id: &str) -> Result<Vec<HandRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM hands WHERE table_id = ? ORDER BY hand_no")
            .bind(table_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(hand_from_row).collect()
    }

    async fn list_actions(&self, hand_id: &str) -> Result<Vec<ActionRecord>, StoreError> {
        let known: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM hands WHERE hand_id = ?")
            .bind(hand_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if known.is_none() {
            return Err(StoreError::HandNotFound(hand_id.to_string()));
        }

        let rows = sqlx::query("SELECT * FROM actions WHERE hand_id = ? ORDER BY id")
            .bind(hand_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(action_from_row).collect()
    }

    async fn get_hand(&self, hand_id: &str) -> Result<HandRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM hands WHERE hand_id = ?")
            .bind(hand_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => hand_from_row(&row),
            None => Err(StoreError::HandNotFound(hand_id.to_string())),
        }
    }
}

fn db_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(db_err)
}

fn status_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Stopped => "stopped",
        RunStatus::Failed => "failed",
    }
}

fn status_from_text(text: &str) -> Result<RunStatus, StoreError> {
    match text {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "stopped" => Ok(RunStatus::Stopped),
        "failed" => Ok(RunStatus::Failed),
        other => Err(StoreError::Database(format!("unknown run status: {other}"))),
    }
}

fn phase_from_text(text: &str) -> Result<Phase, StoreError> {
    match text {
        "dealing" => Ok(Phase::Dealing),
        "betting" => Ok(Phase::Betting),
        "showdown" => Ok(Phase::Showdown),
        "complete" => Ok(Phase::Complete),
        other => Err(StoreError::Database(format!("unknown phase: {other}"))),
    }
}

fn street_from_text(text: &str) -> Result<Street, StoreError> {
    match text {
        "preflop" => Ok(Street::Preflop),
        "flop" => Ok(Street::Flop),
        "turn" => Ok(Street::Turn),
        "river" => Ok(Street::River),
        other => Err(StoreError::Database(format!("unknown street: {other}"))),
    }
}

fn action_kind_from_text(text: &str) -> Result<ActionKind, StoreError> {
    match text {
        "fold" => Ok(ActionKind::Fold),
        "check" => Ok(ActionKind::Check),
        "call" => Ok(ActionKind::Call),
        "bet" => Ok(ActionKind::Bet),
        "raise" => Ok(ActionKind::Raise),
        other => Err(StoreError::Database(format!("unknown action: {other}"))),
    }
}

fn timestamp_from_text(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(db_err)
}

fn run_from_row(row: &SqliteRow) -> Result<TableRunRecord, StoreError> {
    let ended_at: Option<String> = row.try_get("ended_at").map_err(db_err)?;
    Ok(TableRunRecord {
        table_id: row.try_get("table_id").map_err(db_err)?,
        status: status_from_text(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        started_at: timestamp_from_text(&row.try_get::<String, _>("started_at").map_err(db_err)?)?,
        ended_at: ended_at.as_deref().map(timestamp_from_text).transpose()?,
        error: row.try_get("error").map_err(db_err)?,
        hands_requested: row.try_get::<i64, _>("hands_requested").map_err(db_err)? as u32,
        hands_completed: row.try_get::<i64, _>("hands_completed").map_err(db_err)? as u32,
        total_actions: row.try_get::<i64, _>("total_actions").map_err(db_err)? as u32,
        total_fallbacks: row.try_get::<i64, _>("total_fallbacks").map_err(db_err)? as u32,
        current_hand_no: row.try_get::<i64, _>("current_hand_no").map_err(db_err)? as u32,
    })
}

fn hand_from_row(row: &SqliteRow) -> Result<HandRecord, StoreError> {
    let ended_at: Option<String> = row.try_get("ended_at").map_err(db_err)?;
    let final_state: HandState =
        serde_json::from_str(&row.try_get::<String, _>("final_state").map_err(db_err)?)
            .map_err(db_err)?;
    let winner_summary =
        serde_json::from_str(&row.try_get::<String, _>("winner_summary").map_err(db_err)?)
            .map_err(db_err)?;
    Ok(HandRecord {
        hand_id: row.try_get("hand_id").map_err(db_err)?,
        table_id: row.try_get("table_id").map_err(db_err)?,
        hand_no: row.try_get::<i64, _>("hand_no").map_err(db_err)? as u32,
        started_at: timestamp_from_text(&row.try_get::<String, _>("started_at").map_err(db_err)?)?,
        ended_at: ended_at.as_deref().map(timestamp_from_text).transpose()?,
        final_phase: phase_from_text(&row.try_get::<String, _>("final_phase").map_err(db_err)?)?,
        final_state,
        winner_summary,
    })
}

fn action_from_row(row: &SqliteRow) -> Result<ActionRecord, StoreError> {
    let seat = row.try_get::<i64, _>("acting_seat").map_err(db_err)? as u8;
    let amount: Option<i64> = row.try_get("amount").map_err(db_err)?;
    Ok(ActionRecord {
        id: row.try_get::<i64, _>("id").map_err(db_err)? as u64,
        hand_id: row.try_get("hand_id").map_err(db_err)?,
        street: street_from_text(&row.try_get::<String, _>("street").map_err(db_err)?)?,
        acting_seat: SeatNo::new(seat).map_err(db_err)?,
        action: action_kind_from_text(&row.try_get::<String, _>("action").map_err(db_err)?)?,
        amount: amount.map(|a| a as u32),
        is_fallback: row.try_get("is_fallback").map_err(db_err)?,
        at: timestamp_from_text(&row.try_get::<String, _>("at").map_err(db_err)?)?,
    })
}
