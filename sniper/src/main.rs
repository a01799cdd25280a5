//! Thin runnable binary wiring the engine together: reads configuration and
//! the signing key, spawns the alert intake loop and one price-poll task
//! per active position, and drains state to disk on shutdown. Grounded on
//! `Arbiter::new_from_env`/`subscribe()`'s wiring style, reimagined for this
//! domain since the teacher's own `main.rs` was test scaffolding rather than
//! a production loop.

mod gateway;

use std::sync::Arc;
use std::time::Duration;

use engine::alert::{run_intake_loop, ActiveMintSet, AlertEventType, IntakeDecision, TokenAlert};
use engine::events::{EventBus, LifecycleEvent};
use engine::lifecycle::LifecycleEngine;
use engine::math::{spot_price, PriceRatio};
use engine::pool::derive_pool;
use engine::position::store::PositionStore;
use engine::position::{Position, PositionStatus};
use engine::price::PriceOracle;
use engine::rpc::BoundedRpc;
use engine::trigger::{build_take_profit_ladder, evaluate};
use engine::{constants, EngineConfig};
use gateway::EngineGateway;
use solana_sdk::signer::Signer;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  common::init_logger();
  let config = EngineConfig::from_env()?;
  let signer = Arc::new(config.signer_from_env()?);

  log::info!("starting in {:?} mode as {}", config.trading_mode, signer.pubkey());

  let rpc = BoundedRpc::new(&config.rpc_endpoint, Duration::from_secs(15), config.rpc_max_concurrent);
  let price_oracle = Arc::new(
    PriceOracle::new(rpc.clone(), config.native_mint, config.bonding_program_id, config.amm_program_id)
      .with_ttl(config.price_cache_ttl),
  );
  let store = Arc::new(PositionStore::new("positions.json", "trades_history.json", config.max_positions));
  store.load().await?;
  let events = Arc::new(EventBus::new());

  let gateway = Arc::new(EngineGateway {
    rpc: rpc.clone(),
    signer: signer.clone(),
    amm_program_id: config.amm_program_id,
    buy_slippage_bps: config.buy_slippage_bps,
    sell_slippage_bps: config.sell_slippage_bps,
    confirmation_deadline: Duration::from_secs(constants::DEFAULT_CONFIRMATION_DEADLINE_SECS),
    reconcile_signature_scan: config.reconcile_signature_scan,
  });
  let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), gateway.clone(), events.clone(), config.max_retries));

  let active_mints = ActiveMintSet::new();
  for position in store.iter_active().await {
    active_mints.try_claim(position.token_mint).await;
  }

  let (alert_tx, alert_rx) = mpsc::channel::<TokenAlert>(256);
  log::info!("alert intake ready; feed TokenAlert records into the channel from your alert source");

  let intake_task = tokio::spawn(run_alert_intake(
    alert_rx,
    active_mints.clone(),
    store.clone(),
    gateway.clone(),
    events.clone(),
    config.clone(),
  ));

  let poll_task = tokio::spawn(run_price_poll_loop(
    store.clone(),
    price_oracle.clone(),
    lifecycle.clone(),
    active_mints.clone(),
    Duration::from_millis(constants::DEFAULT_PRICE_CACHE_TTL_MS),
  ));

  tokio::select! {
    _ = tokio::signal::ctrl_c() => {
      log::info!("shutdown requested, draining in-flight work to disk");
    }
    _ = intake_task => {
      log::warn!("alert intake loop exited unexpectedly");
    }
    _ = poll_task => {
      log::warn!("price poll loop exited unexpectedly");
    }
  }

  drop(alert_tx);
  Ok(())
}

/// Consumes alerts, applies the duplicate/filter decisions (spec §4.J), and
/// opens a position for each accepted alert.
async fn run_alert_intake(
  alert_rx: mpsc::Receiver<TokenAlert>,
  active_mints: ActiveMintSet,
  store: Arc<PositionStore>,
  gateway: Arc<EngineGateway>,
  events: Arc<EventBus>,
  config: EngineConfig,
) {
  run_intake_loop(alert_rx, active_mints.clone(), None, move |alert, decision| {
    let store = store.clone();
    let gateway = gateway.clone();
    let events = events.clone();
    let active_mints = active_mints.clone();
    let config = config.clone();
    tokio::spawn(async move {
      match decision {
        IntakeDecision::Accepted(mint) => {
          if let Err(e) = open_position(&store, &gateway, &events, &config, mint, alert.migration_pool_hint, alert.event_type).await {
            active_mints.release(mint).await;
            halt_or_warn(&format!("opening position for mint {mint}"), e);
          }
        }
        IntakeDecision::DuplicateDropped(_) => {
          store.record_duplicate_dropped().await;
        }
        IntakeDecision::BlockedByFilter(mint, reason) => {
          store.record_blocked_by_filter().await;
          events.publish(LifecycleEvent::TradeBlocked { symbol: mint.to_string(), reason });
        }
      }
    });
  })
  .await;
}

async fn open_position(
  store: &PositionStore,
  gateway: &EngineGateway,
  events: &EventBus,
  config: &EngineConfig,
  token_mint: solana_sdk::pubkey::Pubkey,
  migration_pool_hint: Option<solana_sdk::pubkey::Pubkey>,
  event_type: AlertEventType,
) -> Result<(), engine::EngineError> {
  let pool_address = match (event_type, migration_pool_hint) {
    (AlertEventType::Migration, Some(hint)) => hint,
    _ => derive_pool(&token_mint, &config.native_mint, &config.bonding_program_id, &config.amm_program_id)?.pool_address,
  };

  let entry = gateway.execute_entry(pool_address, config.initial_investment_quote).await?;

  let entry_price = PriceRatio::from_ratio(&spot_price(
    entry.base_reserve,
    entry.quote_reserve,
    constants::base_precision(),
    constants::quote_precision(),
  ));
  let stop_loss_price = PriceRatio::from_ratio(&entry_price.to_ratio().scale_down_bps(config.stop_loss_pct * 100));
  let levels: Vec<(u32, u32)> = config.take_profit_levels.iter().map(|l| (l.gain_pct, l.sell_fraction_pct)).collect();
  let take_profit_levels = build_take_profit_ladder(entry_price, &levels);

  let position = Position::new(
    token_mint,
    pool_address,
    entry_price,
    entry.quantity_received,
    entry.quote_spent,
    entry.signature.clone(),
    chrono::Utc::now(),
    stop_loss_price,
    take_profit_levels,
  );
  let position_id = position.id;

  store.add(position).await?;
  events.publish(LifecycleEvent::PositionOpened { position_id, symbol: token_mint.to_string() });
  log::info!("opened position {position_id} for mint {token_mint}: {} base units for {} quote", entry.quantity_received, entry.quote_spent);
  Ok(())
}

/// One tick per active position: refresh price, evaluate triggers, dispatch
/// a sell through the lifecycle engine if one fires (spec §4.G, §5). A
/// price update that arrives while a position is `PendingSell` is simply
/// skipped — the trigger evaluator already enforces this, and re-deriving
/// price for a pending position would be wasted RPC traffic.
async fn run_price_poll_loop(
  store: Arc<PositionStore>,
  price_oracle: Arc<PriceOracle>,
  lifecycle: Arc<LifecycleEngine>,
  active_mints: ActiveMintSet,
  tick: Duration,
) {
  let mut interval = tokio::time::interval(tick);
  loop {
    interval.tick().await;
    for position in store.iter_active().await {
      if position.status != PositionStatus::Active {
        continue;
      }
      let price_oracle = price_oracle.clone();
      let store = store.clone();
      let lifecycle = lifecycle.clone();
      let active_mints = active_mints.clone();
      tokio::spawn(async move {
        if let Err(e) = tick_position(&store, &price_oracle, &lifecycle, &active_mints, position.id).await {
          halt_or_warn(&format!("price tick for position {}", position.id), e);
        }
      });
    }
  }
}

/// Store invariant violations are bugs, not routine failures (spec §7:
/// "must halt the process; the on-disk state remains readable for manual
/// recovery"). `std::process::exit` rather than `panic!` since a panic
/// inside a spawned task is caught by its `JoinHandle` and would otherwise
/// leave the rest of the process running on corrupted state.
fn halt_or_warn(context: &str, error: engine::EngineError) {
  if error.is_invariant_violation() {
    log::error!("halting: invariant violation during {context}: {error}");
    std::process::exit(1);
  }
  log::warn!("{context} failed: {error}");
}

async fn tick_position(
  store: &PositionStore,
  price_oracle: &PriceOracle,
  lifecycle: &LifecycleEngine,
  active_mints: &ActiveMintSet,
  position_id: uuid::Uuid,
) -> Result<(), engine::EngineError> {
  let Some(position) = store.get(position_id).await else { return Ok(()) };
  let entry = price_oracle.get_price(&position.token_mint, Some(position.pool_address), false).await?;

  let updated = store
    .update(position_id, move |mut p| {
      p.current_price = PriceRatio::from_ratio(&entry.price);
      p.last_price_source = entry.source;
      p.last_price_at = chrono::Utc::now();
      p
    })
    .await?;

  if let Some(scheduled) = evaluate(&updated) {
    let token_mint = updated.token_mint;
    let was_closing = scheduled.sell_fraction_pct == 100 && scheduled.take_profit_level.is_none();
    lifecycle
      .execute_sell(position_id, scheduled.sell_fraction_pct, scheduled.reason, scheduled.take_profit_level)
      .await?;
    if was_closing || store.get(position_id).await.is_none() {
      active_mints.release(token_mint).await;
    }
  }

  Ok(())
}
