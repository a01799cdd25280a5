//! Position Store (spec §4.F). Follows the teacher's write-whole-file
//! persistence idiom (serialize the full struct with `serde_json`, write it
//! out) and adds the write-temp-then-rename atomicity spec.md requires on
//! every transition. The active file holds only `Active`/`PendingSell`
//! positions; the history file holds only terminal records — spec §4.F
//! calls this separation load-bearing, so the two are kept as genuinely
//! separate files rather than one file filtered by status.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::position::{Position, PositionStatus, TradeHistoryRecord};

#[derive(Debug, Serialize, Deserialize)]
struct ActiveFile {
  active: HashMap<Uuid, Position>,
  session_stats: SessionStats,
  last_saved: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SessionStats {
  pub duplicates_dropped: u64,
  pub blocked_by_filter: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
  trades: Vec<TradeHistoryRecord>,
  summary: HistorySummary,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistorySummary {
  total_trades: u64,
  total_pnl: i128,
  win_rate: f64,
  last_updated: Option<DateTime<Utc>>,
}

/// In-memory map of active positions plus an on-disk mirror (spec §4.F).
/// All writes funnel through the single `tokio::sync::Mutex` guarding each
/// file, matching spec §5's "all writes flow through a single logical
/// owner; disk persistence is serialized."
pub struct PositionStore {
  active_path: PathBuf,
  history_path: PathBuf,
  max_positions: usize,
  active: Mutex<HashMap<Uuid, Position>>,
  stats: Mutex<SessionStats>,
  history_lock: Mutex<()>,
}

impl PositionStore {
  pub fn new(active_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>, max_positions: usize) -> Self {
    Self {
      active_path: active_path.into(),
      history_path: history_path.into(),
      max_positions,
      active: Mutex::new(HashMap::new()),
      stats: Mutex::new(SessionStats::default()),
      history_lock: Mutex::new(()),
    }
  }

  /// Loads the active file from disk if present; starts empty otherwise.
  /// A missing history file is likewise treated as "no trades yet" rather
  /// than an error, since the first run of a fresh deployment has neither.
  pub async fn load(&self) -> Result<(), EngineError> {
    if let Some(file) = read_json::<ActiveFile>(&self.active_path)? {
      *self.active.lock().await = file.active;
      *self.stats.lock().await = file.session_stats;
    }
    Ok(())
  }

  /// Fails if `token_mint` already has an open position or `max_positions`
  /// is reached (spec §4.F, §8 boundary behavior).
  pub async fn add(&self, position: Position) -> Result<(), EngineError> {
    position.check_invariants()?;
    let mut active = self.active.lock().await;
    if active.values().any(|p| p.token_mint == position.token_mint) {
      return Err(EngineError::PositionRejected {
        reason: format!("token_mint {} already has an open position", position.token_mint),
      });
    }
    if active.len() >= self.max_positions {
      return Err(EngineError::PositionRejected { reason: "max_positions reached".to_string() });
    }
    active.insert(position.id, position);
    drop(active);
    self.persist_active().await
  }

  pub async fn get(&self, id: Uuid) -> Option<Position> {
    self.active.lock().await.get(&id).cloned()
  }

  pub async fn iter_active(&self) -> Vec<Position> {
    self.active.lock().await.values().filter(|p| p.status == PositionStatus::Active).cloned().collect()
  }

  pub async fn iter_pending(&self) -> Vec<Position> {
    self.active.lock().await.values().filter(|p| p.status == PositionStatus::PendingSell).cloned().collect()
  }

  pub async fn find_by_mint(&self, mint: &Pubkey) -> Option<Position> {
    self.active.lock().await.values().find(|p| &p.token_mint == mint).cloned()
  }

  /// Applies `mutator` to produce a replacement position, validates its
  /// invariants, and persists on success. The mutation is rejected (and the
  /// store left unchanged) if the result would violate §3's invariants.
  pub async fn update(
    &self,
    id: Uuid,
    mutator: impl FnOnce(Position) -> Position,
  ) -> Result<Position, EngineError> {
    let mut active = self.active.lock().await;
    let current = active.get(&id).cloned().ok_or_else(|| EngineError::InvariantViolation {
      position_id: id.to_string(),
      message: "update on unknown position id".to_string(),
    })?;
    let updated = mutator(current);
    updated.check_invariants()?;
    active.insert(id, updated.clone());
    drop(active);
    self.persist_active().await?;
    Ok(updated)
  }

  /// Removes from the active map and appends to the history file
  /// atomically (spec §4.F, §3 invariant 6). The two file writes are not a
  /// single atomic unit across files, but each is individually
  /// write-temp-then-rename; a crash between them leaves the position in
  /// the active file still, which is the safe direction to fail in.
  pub async fn terminate(
    &self,
    id: Uuid,
    terminal_status: PositionStatus,
    review_reason: Option<String>,
    recovered_from_chain: bool,
  ) -> Result<TradeHistoryRecord, EngineError> {
    if !terminal_status.is_terminal() {
      return Err(EngineError::InvariantViolation {
        position_id: id.to_string(),
        message: "terminate called with a non-terminal status".to_string(),
      });
    }

    let mut active = self.active.lock().await;
    let mut position = active.remove(&id).ok_or_else(|| EngineError::InvariantViolation {
      position_id: id.to_string(),
      message: "terminate on unknown position id".to_string(),
    })?;
    position.status = terminal_status;
    drop(active);
    self.persist_active().await?;

    let record = TradeHistoryRecord::from_terminated(&position, Utc::now(), review_reason, recovered_from_chain);
    self.append_history(record.clone()).await?;
    Ok(record)
  }

  pub async fn record_duplicate_dropped(&self) {
    self.stats.lock().await.duplicates_dropped += 1;
    let _ = self.persist_active().await;
  }

  pub async fn record_blocked_by_filter(&self) {
    self.stats.lock().await.blocked_by_filter += 1;
    let _ = self.persist_active().await;
  }

  async fn persist_active(&self) -> Result<(), EngineError> {
    let file = ActiveFile {
      active: self.active.lock().await.clone(),
      session_stats: self.stats.lock().await.clone(),
      last_saved: Utc::now(),
    };
    write_json_atomic(&self.active_path, &file)
  }

  async fn append_history(&self, record: TradeHistoryRecord) -> Result<(), EngineError> {
    let _guard = self.history_lock.lock().await;
    let mut file = read_json::<HistoryFile>(&self.history_path)?.unwrap_or(HistoryFile {
      trades: vec![],
      summary: HistorySummary::default(),
    });
    file.trades.push(record);

    let total_trades = file.trades.len() as u64;
    let total_pnl: i128 = file.trades.iter().map(|t| t.total_pnl).sum();
    let wins = file.trades.iter().filter(|t| t.total_pnl > 0).count() as f64;
    file.summary = HistorySummary {
      total_trades,
      total_pnl,
      win_rate: if total_trades > 0 { wins / total_trades as f64 } else { 0.0 },
      last_updated: Some(Utc::now()),
    };

    write_json_atomic(&self.history_path, &file)
  }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, EngineError> {
  if !path.exists() {
    return Ok(None);
  }
  let raw = std::fs::read_to_string(path).map_err(|e| EngineError::InvariantViolation {
    position_id: "store".to_string(),
    message: format!("failed to read {}: {e}", path.display()),
  })?;
  let parsed = serde_json::from_str(&raw).map_err(|e| EngineError::InvariantViolation {
    position_id: "store".to_string(),
    message: format!("failed to parse {}: {e}", path.display()),
  })?;
  Ok(Some(parsed))
}

/// Write-temp-then-rename: serialize to `<path>.tmp` in the same directory,
/// then `rename` over the target so a reader never observes a partially
/// written file (spec §3, §4.F).
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
  let serialized = serde_json::to_string_pretty(value).map_err(|e| EngineError::InvariantViolation {
    position_id: "store".to_string(),
    message: format!("failed to serialize {}: {e}", path.display()),
  })?;

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).ok();
  }
  let tmp_path = path.with_extension("tmp");
  std::fs::write(&tmp_path, serialized).map_err(|e| EngineError::InvariantViolation {
    position_id: "store".to_string(),
    message: format!("failed to write {}: {e}", tmp_path.display()),
  })?;
  std::fs::rename(&tmp_path, path).map_err(|e| EngineError::InvariantViolation {
    position_id: "store".to_string(),
    message: format!("failed to rename {} into place: {e}", tmp_path.display()),
  })?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::math::PriceRatio;

  fn sample_position() -> Position {
    Position::new(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      PriceRatio { num: 1, den: 1_000_000 },
      200_000_000,
      10_000_000,
      "sig".to_string(),
      Utc::now(),
      PriceRatio { num: 1, den: 2_000_000 },
      vec![],
    )
  }

  fn temp_paths(tag: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("sniper-store-test-{tag}-{}", Uuid::new_v4()));
    (dir.join("positions.json"), dir.join("trades_history.json"))
  }

  #[tokio::test]
  async fn add_rejects_duplicate_mint() {
    let (active, history) = temp_paths("dup-mint");
    let store = PositionStore::new(active, history, 10);
    let position = sample_position();
    let mint = position.token_mint;
    store.add(position).await.unwrap();

    let second = Position::new(
      mint,
      Pubkey::new_unique(),
      PriceRatio { num: 1, den: 1_000_000 },
      1,
      1,
      "sig2".to_string(),
      Utc::now(),
      PriceRatio::zero(),
      vec![],
    );
    assert!(store.add(second).await.is_err());
  }

  #[tokio::test]
  async fn add_rejects_beyond_max_positions() {
    let (active, history) = temp_paths("max-positions");
    let store = PositionStore::new(active, history, 1);
    store.add(sample_position()).await.unwrap();
    assert!(store.add(sample_position()).await.is_err());
  }

  #[tokio::test]
  async fn terminate_moves_position_from_active_to_history() {
    let (active, history) = temp_paths("terminate");
    let store = PositionStore::new(active, history, 10);
    let position = sample_position();
    let id = position.id;
    store.add(position).await.unwrap();

    store.terminate(id, PositionStatus::Closed, None, false).await.unwrap();
    assert!(store.get(id).await.is_none());
    assert!(store.iter_active().await.is_empty());
  }

  #[tokio::test]
  async fn update_rejects_invariant_violating_mutation() {
    let (active, history) = temp_paths("update");
    let store = PositionStore::new(active, history, 10);
    let position = sample_position();
    let id = position.id;
    store.add(position).await.unwrap();

    let result = store
      .update(id, |mut p| {
        p.remaining_quantity = p.quantity_total + 1;
        p
      })
      .await;
    assert!(result.is_err());
    // Rejected mutation must not have been applied.
    assert_eq!(store.get(id).await.unwrap().remaining_quantity, 200_000_000);
  }
}
