//! Lifecycle Engine (spec §4.H). New state-machine code; grounded on the
//! teacher's control-flow style (explicit match arms over confirmation
//! outcomes, `log::info!`/`log::warn!` at every transition) as seen in
//! `nexus::trx_builder::TrxBuilder`, rather than on a single teacher file,
//! since the teacher's bots do not manage exit ladders.
//!
//! Submission and reconciliation are abstracted behind [`ChainGateway`] so
//! this module's state-machine logic is testable with an in-memory fake,
//! per spec §8's "in-memory fakes for the RPC client and clock rather than
//! live network calls."

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::events::{EventBus, LifecycleEvent};
use crate::position::store::PositionStore;
use crate::position::{PartialSell, PendingSell, Position, PositionStatus};
use crate::trigger::promote_stop_loss;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Outcome of attempting to submit and confirm a sell (spec §4.E/§4.H).
#[derive(Debug, Clone)]
pub enum SellSubmission {
  Confirmed { tokens_delta: u64, quote_delta: u64, signature: String },
  Unconfirmed,
  Failed(EngineError),
}

/// Outcome of the reconciler (spec §4.I).
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
  StillHeld { balance: u64 },
  RecoveredSell { tokens_sold: u64, quote_received: u64, signature: Option<String> },
  Unrecoverable { reason: String },
}

/// Everything the lifecycle engine needs from the chain, abstracted so
/// production code wires real RPC calls (§4.D/§4.E/§4.I) and tests wire a
/// fake that returns canned outcomes.
pub trait ChainGateway: Send + Sync {
  fn submit_sell(&self, position: Position, fraction_pct: u32) -> BoxFuture<SellSubmission>;
  fn reconcile(&self, position: Position) -> BoxFuture<ReconcileOutcome>;
}

pub struct LifecycleEngine {
  store: Arc<PositionStore>,
  gateway: Arc<dyn ChainGateway>,
  events: Arc<EventBus>,
  max_retries: u32,
}

impl LifecycleEngine {
  pub fn new(store: Arc<PositionStore>, gateway: Arc<dyn ChainGateway>, events: Arc<EventBus>, max_retries: u32) -> Self {
    Self { store, gateway, events, max_retries }
  }

  /// Sell dispatch contract (spec §4.H):
  /// 1. guard `status == Active`
  /// 2. transition to `PendingSell`, persist pending fields
  /// 3. submit via the gateway
  /// 4. on outcome, dispatch to `complete_sell` or the retry/reconcile path
  pub async fn execute_sell(
    &self,
    position_id: Uuid,
    fraction_pct: u32,
    reason: String,
    take_profit_level: Option<u32>,
  ) -> Result<(), EngineError> {
    let position = self.store.get(position_id).await.ok_or_else(|| EngineError::InvariantViolation {
      position_id: position_id.to_string(),
      message: "execute_sell on unknown position".to_string(),
    })?;

    if position.status != PositionStatus::Active {
      return Err(EngineError::InvariantViolation {
        position_id: position_id.to_string(),
        message: format!("execute_sell called while status is {:?}", position.status),
      });
    }

    let token_amount = (position.remaining_quantity as u128 * fraction_pct as u128 / 100) as u64;
    let pending = PendingSell {
      sell_percentage: fraction_pct,
      token_amount,
      reason: reason.clone(),
      started_at: Utc::now(),
      signature: None,
      take_profit_level,
    };

    let pending_snapshot = self
      .store
      .update(position_id, move |mut p| {
        p.status = PositionStatus::PendingSell;
        p.pending = Some(pending.clone());
        p
      })
      .await?;

    log::info!("position {position_id} entering PENDING_SELL: {reason} ({fraction_pct}% of remaining)");

    match self.gateway.submit_sell(pending_snapshot, fraction_pct).await {
      SellSubmission::Confirmed { tokens_delta, quote_delta, signature } => {
        self.complete_sell(position_id, tokens_delta, quote_delta, signature).await
      }
      SellSubmission::Unconfirmed => self.handle_retry_or_reconcile(position_id, None).await,
      SellSubmission::Failed(e) => self.handle_retry_or_reconcile(position_id, Some(e)).await,
    }
  }

  /// Step 5 of spec §4.H: records the realized fill, closes on dust, marks
  /// the ladder rung triggered and promotes the stop when the fill came
  /// from a take-profit level, and clears pending/retry bookkeeping.
  async fn complete_sell(&self, position_id: Uuid, tokens_delta: u64, quote_delta: u64, signature: String) -> Result<(), EngineError> {
    let position = self.store.get(position_id).await.ok_or_else(|| EngineError::InvariantViolation {
      position_id: position_id.to_string(),
      message: "complete_sell on unknown position".to_string(),
    })?;
    let pending = position.pending.clone().ok_or_else(|| EngineError::InvariantViolation {
      position_id: position_id.to_string(),
      message: "complete_sell with no pending fields".to_string(),
    })?;

    let new_remaining = position.remaining_quantity.saturating_sub(tokens_delta);
    let pnl = quote_delta as i128 - cost_basis(&position, tokens_delta);

    if position.is_dust(new_remaining) {
      let updated = self
        .store
        .update(position_id, {
          let pending = pending.clone();
          let signature = signature.clone();
          move |mut p| {
            p.remaining_quantity = 0;
            p.realized_pnl += pnl;
            p.partial_sells.push(PartialSell {
              timestamp: Utc::now(),
              tokens_sold: tokens_delta,
              quote_received: quote_delta,
              pnl,
              reason: pending.reason.clone(),
              signature: signature.clone(),
            });
            p.pending = None;
            p.status = PositionStatus::Active;
            p
          }
        })
        .await?;
      self.store.terminate(position_id, PositionStatus::Closed, None, false).await?;
      self.events.publish(LifecycleEvent::PositionClosed {
        position_id,
        final_status: PositionStatus::Closed,
        realized_pnl: updated.realized_pnl,
      });
      log::info!("position {position_id} closed: remaining below dust threshold after sell");
      return Ok(());
    }

    self
      .store
      .update(position_id, move |mut p| {
        p.remaining_quantity = new_remaining;
        p.realized_pnl += pnl;
        p.retry_count = 0;
        p.partial_sells.push(PartialSell {
          timestamp: Utc::now(),
          tokens_sold: tokens_delta,
          quote_received: quote_delta,
          pnl,
          reason: pending.reason.clone(),
          signature: signature.clone(),
        });
        if let Some(level) = pending.take_profit_level {
          for tp in p.take_profit_levels.iter_mut() {
            if tp.level == level {
              tp.triggered = true;
              tp.triggered_at = Some(Utc::now());
            }
          }
          p.stop_loss_price = promote_stop_loss(p.entry_price, p.stop_loss_price, level);
        }
        p.status = PositionStatus::Active;
        p.pending = None;
        p
      })
      .await?;

    self.events.publish(LifecycleEvent::PartialFilled {
      position_id,
      reason: pending.reason,
      tokens_sold: tokens_delta,
      quote_received: quote_delta,
    });
    log::info!("position {position_id} partial fill recorded, back to ACTIVE");
    Ok(())
  }

  /// Step 6 of spec §4.H, including the insufficient-funds short-circuit:
  /// a submission error indicating insufficient funds after `retry_count ≥
  /// 3` skips further retries and goes directly to reconciliation, because
  /// the likely cause is an earlier submission that actually succeeded
  /// without being observed.
  async fn handle_retry_or_reconcile(&self, position_id: Uuid, error: Option<EngineError>) -> Result<(), EngineError> {
    let position = self.store.get(position_id).await.ok_or_else(|| EngineError::InvariantViolation {
      position_id: position_id.to_string(),
      message: "retry/reconcile on unknown position".to_string(),
    })?;

    let short_circuit = position.retry_count >= 3 && error.as_ref().is_some_and(EngineError::is_insufficient_funds);

    if short_circuit {
      log::warn!("position {position_id} short-circuiting to reconciliation: repeated insufficient-funds failures");
      return self.reconcile(position_id).await;
    }

    let next_retry_count = position.retry_count + 1;
    if next_retry_count < self.max_retries {
      self
        .store
        .update(position_id, move |mut p| {
          p.retry_count = next_retry_count;
          p.status = PositionStatus::Active;
          p.pending = None;
          p
        })
        .await?;
      log::warn!("position {position_id} sell unconfirmed/failed, retry {next_retry_count}/{}", self.max_retries);
      Ok(())
    } else {
      log::warn!("position {position_id} exhausted retries, invoking reconciler");
      self.reconcile(position_id).await
    }
  }

  async fn reconcile(&self, position_id: Uuid) -> Result<(), EngineError> {
    let position = self.store.get(position_id).await.ok_or_else(|| EngineError::InvariantViolation {
      position_id: position_id.to_string(),
      message: "reconcile on unknown position".to_string(),
    })?;

    match self.gateway.reconcile(position.clone()).await {
      ReconcileOutcome::StillHeld { balance } => {
        self
          .store
          .update(position_id, move |mut p| {
            p.remaining_quantity = balance;
            p.status = PositionStatus::Active;
            p.pending = None;
            p.retry_count = 0;
            p
          })
          .await?;
        log::info!("position {position_id} reconciled: sell genuinely failed, balance restored to {balance}");
        Ok(())
      }
      ReconcileOutcome::RecoveredSell { tokens_sold, quote_received, signature } => {
        let pnl = quote_received as i128 - cost_basis(&position, tokens_sold);
        self
          .store
          .update(position_id, {
            let signature = signature.clone().unwrap_or_default();
            move |mut p| {
              p.remaining_quantity = p.remaining_quantity.saturating_sub(tokens_sold);
              p.realized_pnl += pnl;
              p.partial_sells.push(PartialSell {
                timestamp: Utc::now(),
                tokens_sold,
                quote_received,
                pnl,
                reason: "Recovered from chain history".to_string(),
                signature,
              });
              p.pending = None;
              p.status = PositionStatus::Active;
              p
            }
          })
          .await?;
        let record = self.store.terminate(position_id, PositionStatus::Closed, None, true).await?;
        self.events.publish(LifecycleEvent::PositionClosed {
          position_id,
          final_status: PositionStatus::Closed,
          realized_pnl: record.total_pnl,
        });
        log::info!("position {position_id} closed via reconciliation (recovered_from_chain=true)");
        Ok(())
      }
      ReconcileOutcome::Unrecoverable { reason } => {
        self.store.terminate(position_id, PositionStatus::ManualReview, Some(reason.clone()), false).await?;
        self.events.publish(LifecycleEvent::ManualReviewNeeded { position_id, reason });
        Ok(())
      }
    }
  }
}

/// Proportional cost basis of `tokens_sold` against the position's average
/// entry price, used to compute realized PnL per fill (spec §3
/// `realized_pnl`, accumulated rather than recomputed from scratch).
fn cost_basis(position: &Position, tokens_sold: u64) -> i128 {
  if position.quantity_total == 0 {
    return 0;
  }
  (position.invested_quote as u128 * tokens_sold as u128 / position.quantity_total as u128) as i128
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::math::PriceRatio;
  use crate::position::TakeProfitLevel;
  use solana_sdk::pubkey::Pubkey;
  use std::path::PathBuf;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FakeGateway {
    confirm_after: AtomicUsize,
    reconcile_outcome: std::sync::Mutex<Option<ReconcileOutcome>>,
  }

  impl ChainGateway for FakeGateway {
    fn submit_sell(&self, position: Position, fraction_pct: u32) -> BoxFuture<SellSubmission> {
      let attempt = self.confirm_after.fetch_sub(1, Ordering::SeqCst);
      Box::pin(async move {
        if attempt == 0 {
          let tokens_delta = (position.remaining_quantity as u128 * fraction_pct as u128 / 100) as u64;
          SellSubmission::Confirmed { tokens_delta, quote_delta: tokens_delta / 2, signature: "sig".to_string() }
        } else {
          SellSubmission::Unconfirmed
        }
      })
    }

    fn reconcile(&self, _position: Position) -> BoxFuture<ReconcileOutcome> {
      let outcome = self.reconcile_outcome.lock().unwrap().take().unwrap_or(ReconcileOutcome::Unrecoverable { reason: "no fixture set".to_string() });
      Box::pin(async move { outcome })
    }
  }

  fn temp_store(tag: &str, max_positions: usize) -> PositionStore {
    let dir = std::env::temp_dir().join(format!("sniper-lifecycle-test-{tag}-{}", Uuid::new_v4()));
    PositionStore::new(dir.join("positions.json"), dir.join("trades_history.json") as PathBuf, max_positions)
  }

  fn sample_position(levels: Vec<TakeProfitLevel>) -> Position {
    Position::new(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      PriceRatio { num: 1, den: 1_000_000 },
      200_000_000,
      10_000_000,
      "entry-sig".to_string(),
      Utc::now(),
      PriceRatio { num: 1, den: 2_000_000 },
      levels,
    )
  }

  #[tokio::test]
  async fn confirmed_partial_sell_returns_to_active_with_reset_retry_count() {
    let store = Arc::new(temp_store("partial", 10));
    let position = sample_position(vec![]);
    let id = position.id;
    store.add(position).await.unwrap();

    let gateway = Arc::new(FakeGateway { confirm_after: AtomicUsize::new(0), reconcile_outcome: std::sync::Mutex::new(None) });
    let events = Arc::new(EventBus::new());
    let engine = LifecycleEngine::new(store.clone(), gateway, events, 3);

    engine.execute_sell(id, 50, "Take Profit 1 (+100%)".to_string(), Some(1)).await.unwrap();

    let updated = store.get(id).await.unwrap();
    assert_eq!(updated.status, PositionStatus::Active);
    assert_eq!(updated.retry_count, 0);
    assert_eq!(updated.remaining_quantity, 100_000_000);
    assert_eq!(updated.partial_sells.len(), 1);
  }

  #[tokio::test]
  async fn confirmed_full_sell_closes_the_position() {
    let store = Arc::new(temp_store("full", 10));
    let position = sample_position(vec![]);
    let id = position.id;
    store.add(position).await.unwrap();

    let gateway = Arc::new(FakeGateway { confirm_after: AtomicUsize::new(0), reconcile_outcome: std::sync::Mutex::new(None) });
    let events = Arc::new(EventBus::new());
    let engine = LifecycleEngine::new(store.clone(), gateway, events, 3);

    engine.execute_sell(id, 100, "Stop Loss (50%)".to_string(), None).await.unwrap();

    assert!(store.get(id).await.is_none());
    assert!(store.iter_active().await.is_empty());
  }

  #[tokio::test]
  async fn unconfirmed_sell_increments_retry_and_returns_to_active() {
    let store = Arc::new(temp_store("retry", 10));
    let position = sample_position(vec![]);
    let id = position.id;
    store.add(position).await.unwrap();

    // confirm_after=2 means two Unconfirmed outcomes before a confirm; we
    // only exercise a single retry here.
    let gateway = Arc::new(FakeGateway { confirm_after: AtomicUsize::new(5), reconcile_outcome: std::sync::Mutex::new(None) });
    let events = Arc::new(EventBus::new());
    let engine = LifecycleEngine::new(store.clone(), gateway, events, 3);

    engine.execute_sell(id, 100, "Stop Loss (50%)".to_string(), None).await.unwrap();

    let updated = store.get(id).await.unwrap();
    assert_eq!(updated.status, PositionStatus::Active);
    assert_eq!(updated.retry_count, 1);
    assert!(updated.pending.is_none());
  }

  #[tokio::test]
  async fn exhausted_retries_invokes_reconciler() {
    let store = Arc::new(temp_store("exhausted", 10));
    let position = sample_position(vec![]);
    let id = position.id;
    store.add(position).await.unwrap();
    store.update(id, |mut p| { p.retry_count = 2; p }).await.unwrap();

    let gateway = Arc::new(FakeGateway {
      confirm_after: AtomicUsize::new(99),
      reconcile_outcome: std::sync::Mutex::new(Some(ReconcileOutcome::StillHeld { balance: 100_000_000 })),
    });
    let events = Arc::new(EventBus::new());
    let engine = LifecycleEngine::new(store.clone(), gateway, events, 3);

    engine.execute_sell(id, 100, "Stop Loss (50%)".to_string(), None).await.unwrap();

    let updated = store.get(id).await.unwrap();
    assert_eq!(updated.status, PositionStatus::Active);
    assert_eq!(updated.remaining_quantity, 100_000_000);
    assert_eq!(updated.retry_count, 0);
  }
}
