//! Position data model (spec §3). New relative to the teacher — no analog
//! for JSON position bookkeeping exists outside `arbiter_client`'s trader
//! stats, which this supersedes. Fields mirror spec §3 one-for-one; the six
//! invariants are checked centrally by [`Position::check_invariants`] so
//! every mutation path (trigger evaluator, lifecycle engine, reconciler)
//! validates the same way.

pub mod store;

use chrono::{DateTime, Utc};
use common::utils::{deserialize_pubkey, serialize_pubkey};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::constants::DUST_FRACTION_BPS;
use crate::errors::EngineError;
use crate::math::PriceRatio;
use crate::price::PriceSource;

/// One rung of the take-profit ladder (spec §3). `level` is 1-indexed and
/// strictly increasing by `trigger_gain_pct`, enforced at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeProfitLevel {
  pub level: u32,
  pub trigger_gain_pct: u32,
  pub trigger_price: PriceRatio,
  pub sell_fraction_pct: u32,
  pub triggered: bool,
  pub triggered_at: Option<DateTime<Utc>>,
}

/// One completed partial or final sell against a position (spec §3 history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialSell {
  pub timestamp: DateTime<Utc>,
  pub tokens_sold: u64,
  pub quote_received: u64,
  pub pnl: i128,
  pub reason: String,
  pub signature: String,
}

/// Bookkeeping for the at-most-one in-flight tranche (spec §3 invariant 3,
/// 4). Populated exactly when `status == PendingSell`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSell {
  pub sell_percentage: u32,
  pub token_amount: u64,
  pub reason: String,
  pub started_at: DateTime<Utc>,
  pub signature: Option<String>,
  /// Which ladder rung scheduled this sell, if any, so `complete_sell`
  /// (spec §4.H) can mark it `triggered` and run stop-loss promotion
  /// without re-deriving which level fired.
  pub take_profit_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
  Active,
  PendingSell,
  Closed,
  ManualReview,
}

impl PositionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, PositionStatus::Closed | PositionStatus::ManualReview)
  }
}

/// The central entity of spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
  pub id: Uuid,
  #[serde(serialize_with = "serialize_pubkey", deserialize_with = "deserialize_pubkey")]
  pub token_mint: Pubkey,
  #[serde(serialize_with = "serialize_pubkey", deserialize_with = "deserialize_pubkey")]
  pub pool_address: Pubkey,

  pub entry_price: PriceRatio,
  pub quantity_total: u64,
  pub invested_quote: u64,
  pub entry_signature: String,
  pub entry_time: DateTime<Utc>,

  pub stop_loss_price: PriceRatio,
  pub take_profit_levels: Vec<TakeProfitLevel>,

  pub remaining_quantity: u64,
  pub current_price: PriceRatio,
  pub last_price_source: PriceSource,
  pub last_price_at: DateTime<Utc>,
  pub realized_pnl: i128,

  pub pending: Option<PendingSell>,
  pub retry_count: u32,

  pub status: PositionStatus,
  pub partial_sells: Vec<PartialSell>,
}

impl Position {
  /// A newly opened position: full quantity remaining, no pending sell, no
  /// history yet (spec §3 "created on successful entry settlement").
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    token_mint: Pubkey,
    pool_address: Pubkey,
    entry_price: PriceRatio,
    quantity_total: u64,
    invested_quote: u64,
    entry_signature: String,
    entry_time: DateTime<Utc>,
    stop_loss_price: PriceRatio,
    take_profit_levels: Vec<TakeProfitLevel>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      token_mint,
      pool_address,
      entry_price,
      quantity_total,
      invested_quote,
      entry_signature,
      entry_time,
      stop_loss_price,
      take_profit_levels,
      remaining_quantity: quantity_total,
      current_price: entry_price,
      last_price_source: PriceSource::Derived,
      last_price_at: entry_time,
      realized_pnl: 0,
      pending: None,
      retry_count: 0,
      status: PositionStatus::Active,
      partial_sells: vec![],
    }
  }

  fn dust_threshold(&self) -> u64 {
    (self.quantity_total as u128 * DUST_FRACTION_BPS as u128 / 10_000) as u64
  }

  pub fn is_dust(&self, quantity: u64) -> bool {
    quantity <= self.dust_threshold()
  }

  /// Validates the six invariants of spec §3. Called after every mutation;
  /// a violation is an `EngineError::InvariantViolation`, which the
  /// lifecycle engine treats as fatal rather than swallowing (spec §7).
  pub fn check_invariants(&self) -> Result<(), EngineError> {
    let violation = |message: &str| EngineError::InvariantViolation {
      position_id: self.id.to_string(),
      message: message.to_string(),
    };

    if self.remaining_quantity > self.quantity_total {
      return Err(violation("remaining_quantity exceeds quantity_total"));
    }

    let sold: u128 = self.partial_sells.iter().map(|s| s.tokens_sold as u128).sum();
    let dust = self.dust_threshold() as u128;
    let total = sold + self.remaining_quantity as u128;
    let expected = self.quantity_total as u128;
    if total.abs_diff(expected) > dust {
      return Err(violation("sold + remaining does not reconcile with quantity_total within dust"));
    }

    match self.status {
      PositionStatus::PendingSell => {
        if self.pending.is_none() {
          return Err(violation("PendingSell status with no pending fields"));
        }
      }
      PositionStatus::Active => {
        if self.pending.is_some() {
          return Err(violation("Active status with populated pending fields"));
        }
      }
      _ => {}
    }

    for pair in self.take_profit_levels.windows(2) {
      if let (Some(a), Some(b)) = (pair[0].triggered_at, pair[1].triggered_at) {
        if a > b {
          return Err(violation("take-profit levels triggered out of order"));
        }
      }
    }

    Ok(())
  }
}

/// Flattened, read-only snapshot of a terminated position (spec §3, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryRecord {
  pub id: Uuid,
  #[serde(serialize_with = "serialize_pubkey", deserialize_with = "deserialize_pubkey")]
  pub token_mint: Pubkey,
  #[serde(serialize_with = "serialize_pubkey", deserialize_with = "deserialize_pubkey")]
  pub pool_address: Pubkey,
  pub entry_price: PriceRatio,
  pub quantity_total: u64,
  pub invested_quote: u64,
  pub entry_time: DateTime<Utc>,
  pub closed_at: DateTime<Utc>,
  pub total_quote_received: u64,
  pub total_pnl: i128,
  pub status: PositionStatus,
  pub review_reason: Option<String>,
  pub recovered_from_chain: bool,
  pub partial_sells: Vec<PartialSell>,
}

impl TradeHistoryRecord {
  pub fn from_terminated(position: &Position, closed_at: DateTime<Utc>, review_reason: Option<String>, recovered_from_chain: bool) -> Self {
    let total_quote_received = position.partial_sells.iter().map(|s| s.quote_received).sum();
    Self {
      id: position.id,
      token_mint: position.token_mint,
      pool_address: position.pool_address,
      entry_price: position.entry_price,
      quantity_total: position.quantity_total,
      invested_quote: position.invested_quote,
      entry_time: position.entry_time,
      closed_at,
      total_quote_received,
      total_pnl: position.realized_pnl,
      status: position.status,
      review_reason,
      recovered_from_chain,
      partial_sells: position.partial_sells.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

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

  #[test]
  fn fresh_position_satisfies_invariants() {
    assert!(sample_position().check_invariants().is_ok());
  }

  #[test]
  fn remaining_beyond_total_violates_invariant() {
    let mut position = sample_position();
    position.remaining_quantity = position.quantity_total + 1;
    assert!(position.check_invariants().is_err());
  }

  #[test]
  fn pending_sell_without_pending_fields_violates_invariant() {
    let mut position = sample_position();
    position.status = PositionStatus::PendingSell;
    assert!(position.check_invariants().is_err());
  }

  #[test]
  fn dust_threshold_scales_with_position_size() {
    let position = sample_position();
    assert!(position.is_dust(position.quantity_total / 2000));
    assert!(!position.is_dust(position.quantity_total / 10));
  }
}
