//! Trigger Evaluator (spec §4.G). New state-machine logic with no single
//! teacher analog (the teacher's bots do not manage exit ladders); grounded
//! on the teacher's control-flow style instead — explicit match arms,
//! `log::info!` at every transition — as seen throughout
//! `nexus::trx_builder::TrxBuilder`.

use crate::math::PriceRatio;
use crate::position::{Position, PositionStatus, TakeProfitLevel};

/// A scheduled sell produced by evaluating triggers on one price tick.
/// Carries enough to drive §4.H's `execute_sell` without the lifecycle
/// engine re-deriving the fraction or reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSell {
  pub sell_fraction_pct: u32,
  pub reason: String,
  pub take_profit_level: Option<u32>,
}

/// Builds the ladder for a fresh position: `trigger_price = entry_price *
/// (100 + gain_pct) / 100` for each configured level, strictly increasing
/// by `trigger_gain_pct` as spec §3 requires.
pub fn build_take_profit_ladder(entry_price: PriceRatio, levels: &[(u32, u32)]) -> Vec<TakeProfitLevel> {
  levels
    .iter()
    .enumerate()
    .map(|(i, &(gain_pct, sell_fraction_pct))| TakeProfitLevel {
      level: i as u32 + 1,
      trigger_gain_pct: gain_pct,
      trigger_price: PriceRatio::from_ratio(&entry_price.to_ratio().scale_up_pct(gain_pct)),
      sell_fraction_pct,
      triggered: false,
      triggered_at: None,
    })
    .collect()
}

/// Evaluates stop-loss then the take-profit ladder, in that order, stopping
/// at the first action taken (spec §4.G). Never fires while
/// `status == PendingSell` — the caller is expected to skip evaluation
/// entirely in that case, but this function defends the invariant too.
pub fn evaluate(position: &Position) -> Option<ScheduledSell> {
  if position.status != PositionStatus::Active {
    return None;
  }

  if position.current_price.le(&position.stop_loss_price) {
    let loss_pct = stop_loss_pct(position.entry_price, position.stop_loss_price);
    log::info!(
      "position {} stop-loss triggered: price={:?} stop={:?}",
      position.id,
      position.current_price,
      position.stop_loss_price
    );
    return Some(ScheduledSell {
      sell_fraction_pct: 100,
      reason: format!("Stop Loss ({loss_pct}%)"),
      take_profit_level: None,
    });
  }

  for level in &position.take_profit_levels {
    if level.triggered {
      continue;
    }
    if position.current_price.ge(&level.trigger_price) {
      log::info!(
        "position {} take-profit level {} triggered at +{}%",
        position.id,
        level.level,
        level.trigger_gain_pct
      );
      return Some(ScheduledSell {
        sell_fraction_pct: level.sell_fraction_pct,
        reason: format!("Take Profit {} (+{}%)", level.level, level.trigger_gain_pct),
        take_profit_level: Some(level.level),
      });
    }
  }

  None
}

/// Display-only percentage drop from entry to stop, used solely to compose
/// the human-readable sell reason (spec §4.G's `"Stop Loss (<loss_pct>%)"`).
fn stop_loss_pct(entry_price: PriceRatio, stop_loss_price: PriceRatio) -> i64 {
  let entry = entry_price.to_f64();
  if entry <= 0.0 {
    return 0;
  }
  (100.0 * (1.0 - stop_loss_price.to_f64() / entry)).round() as i64
}

/// Stop-loss promotion schedule after a take-profit fill confirms (spec
/// §4.G): TP1 → breakeven, TP2 → 2x entry, TP3 → 6x entry. Promotion is
/// monotonic — the new stop never sits below the old one. Spec §9 leaves
/// the schedule for levels beyond 3 unspecified (recorded as an open
/// question in the project's design notes); this implementation holds the
/// stop at the TP3 rung for any level ≥ 3 rather than guessing a further
/// multiplier.
pub fn promote_stop_loss(entry_price: PriceRatio, current_stop: PriceRatio, filled_level: u32) -> PriceRatio {
  let candidate = match filled_level {
    1 => entry_price,
    2 => PriceRatio::from_ratio(&entry_price.to_ratio().mul_u64(2)),
    _ => PriceRatio::from_ratio(&entry_price.to_ratio().mul_u64(6)),
  };
  current_stop.max(candidate)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use solana_sdk::pubkey::Pubkey;

  fn position_with(current: PriceRatio, stop: PriceRatio, levels: Vec<TakeProfitLevel>) -> Position {
    let mut p = Position::new(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      PriceRatio { num: 1, den: 1_000_000 },
      200_000_000,
      10_000_000,
      "sig".to_string(),
      Utc::now(),
      stop,
      levels,
    );
    p.current_price = current;
    p
  }

  #[test]
  fn stop_loss_fires_before_take_profit_is_checked() {
    let entry = PriceRatio { num: 1, den: 1_000_000 };
    let ladder = build_take_profit_ladder(entry, &[(100, 50)]);
    let position = position_with(PriceRatio { num: 1, den: 4_000_000 }, PriceRatio { num: 1, den: 2_000_000 }, ladder);
    let scheduled = evaluate(&position).unwrap();
    assert_eq!(scheduled.sell_fraction_pct, 100);
    assert!(scheduled.take_profit_level.is_none());
  }

  #[test]
  fn take_profit_fires_in_ascending_order() {
    let entry = PriceRatio { num: 1, den: 1_000_000 };
    let ladder = build_take_profit_ladder(entry, &[(100, 50), (300, 25), (900, 100)]);
    // price at +300% would satisfy both TP1 and TP2; only TP1 fires this tick.
    let position = position_with(PriceRatio { num: 4, den: 1_000_000 }, PriceRatio { num: 1, den: 2_000_000 }, ladder);
    let scheduled = evaluate(&position).unwrap();
    assert_eq!(scheduled.take_profit_level, Some(1));
  }

  #[test]
  fn pending_sell_status_never_fires() {
    let entry = PriceRatio { num: 1, den: 1_000_000 };
    let ladder = build_take_profit_ladder(entry, &[(100, 50)]);
    let mut position = position_with(PriceRatio { num: 4, den: 1_000_000 }, PriceRatio { num: 1, den: 2_000_000 }, ladder);
    position.status = PositionStatus::PendingSell;
    assert!(evaluate(&position).is_none());
  }

  #[test]
  fn promotion_never_decreases_the_stop() {
    let entry = PriceRatio { num: 1, den: 1_000_000 };
    let high_stop = PriceRatio::from_ratio(&entry.to_ratio().mul_u64(3));
    let promoted = promote_stop_loss(entry, high_stop, 1);
    assert!(promoted.ge(&high_stop));
  }

  #[test]
  fn promotion_schedule_matches_ladder() {
    let entry = PriceRatio { num: 1, den: 1_000_000 };
    let stop = PriceRatio::zero();
    let tp1 = promote_stop_loss(entry, stop, 1);
    assert_eq!(tp1.to_f64(), entry.to_f64());
    let tp2 = promote_stop_loss(entry, tp1, 2);
    assert!((tp2.to_f64() - entry.to_f64() * 2.0).abs() < 1e-12);
    let tp3 = promote_stop_loss(entry, tp2, 3);
    assert!((tp3.to_f64() - entry.to_f64() * 6.0).abs() < 1e-12);
  }
}
