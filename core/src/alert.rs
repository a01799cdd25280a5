//! Alert Intake (spec §4.J, §6). Ambient plumbing the distillation left
//! implicit: spec.md §6 describes the `TokenAlert` wire shape but not the
//! loop that drops duplicates. Modeled as an `mpsc::Receiver<TokenAlert>`
//! the caller feeds (the alert source itself is out of scope per spec §1),
//! paired with a `HashSet` of mints with an open or pending position for
//! Scenario 6's duplicate-drop rule.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, Mutex};

/// `TokenAlert` wire shape from spec §6.
#[derive(Debug, Clone)]
pub struct TokenAlert {
  pub mint_address: Pubkey,
  pub symbol: String,
  pub event_type: AlertEventType,
  pub migration_pool_hint: Option<Pubkey>,
  pub confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEventType {
  Creation,
  Migration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
  High,
  Medium,
  Low,
}

#[derive(Debug, Clone)]
pub struct FilterResult {
  pub safe: bool,
  pub reason: Option<String>,
  pub top_holder_fraction: Option<f64>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Optional pre-trade holder-concentration collaborator (spec §6). Boxed
/// rather than `async fn` in a trait, consistent with the teacher's
/// `Callback` type-alias style in `nexus::types` — the core never depends
/// on a concrete filtering crate.
pub type PreTradeFilter = Arc<dyn Fn(Pubkey) -> BoxFuture<'static, anyhow::Result<FilterResult>> + Send + Sync>;

/// Tracks which mints currently have an open-or-pending position, for the
/// duplicate-drop rule. Shared with the lifecycle engine so a position's
/// termination can release the mint for re-alerting.
#[derive(Clone)]
pub struct ActiveMintSet {
  inner: Arc<Mutex<HashSet<Pubkey>>>,
}

impl Default for ActiveMintSet {
  fn default() -> Self {
    Self { inner: Arc::new(Mutex::new(HashSet::new())) }
  }
}

impl ActiveMintSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` if the mint was newly inserted (i.e. this alert should
  /// proceed); `false` if it was already present (the alert is a
  /// duplicate and must be dropped per spec §6).
  pub async fn try_claim(&self, mint: Pubkey) -> bool {
    self.inner.lock().await.insert(mint)
  }

  pub async fn release(&self, mint: Pubkey) {
    self.inner.lock().await.remove(&mint);
  }
}

/// What the intake loop decided to do with one alert, for callers that want
/// to observe/log/test the decision without re-running the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeDecision {
  Accepted(Pubkey),
  DuplicateDropped(Pubkey),
  BlockedByFilter(Pubkey, String),
}

/// Drains `receiver`, applying the duplicate-drop rule and the optional
/// pre-trade filter, invoking `on_decision` for each alert. Runs until the
/// channel closes; the caller is expected to spawn this as its own task.
pub async fn run_intake_loop(
  mut receiver: mpsc::Receiver<TokenAlert>,
  active_mints: ActiveMintSet,
  filter: Option<PreTradeFilter>,
  mut on_decision: impl FnMut(TokenAlert, IntakeDecision),
) {
  while let Some(alert) = receiver.recv().await {
    let mint = alert.mint_address;
    if !active_mints.try_claim(mint).await {
      log::info!("dropping duplicate alert for mint {mint}");
      on_decision(alert, IntakeDecision::DuplicateDropped(mint));
      continue;
    }

    if let Some(filter) = &filter {
      match filter(mint).await {
        Ok(result) if !result.safe => {
          active_mints.release(mint).await;
          let reason = result.reason.unwrap_or_else(|| "blocked by pre-trade filter".to_string());
          log::warn!("alert for mint {mint} blocked: {reason}");
          on_decision(alert, IntakeDecision::BlockedByFilter(mint, reason));
          continue;
        }
        Err(e) => {
          log::warn!("pre-trade filter failed for mint {mint}, proceeding without it: {e}");
        }
        _ => {}
      }
    }

    on_decision(alert, IntakeDecision::Accepted(mint));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_alert(mint: Pubkey) -> TokenAlert {
    TokenAlert {
      mint_address: mint,
      symbol: "TEST".to_string(),
      event_type: AlertEventType::Creation,
      migration_pool_hint: None,
      confidence: Some(Confidence::High),
    }
  }

  #[tokio::test]
  async fn second_alert_for_same_mint_is_dropped() {
    let (tx, rx) = mpsc::channel(8);
    let mint = Pubkey::new_unique();
    tx.send(sample_alert(mint)).await.unwrap();
    tx.send(sample_alert(mint)).await.unwrap();
    drop(tx);

    let mut decisions = vec![];
    run_intake_loop(rx, ActiveMintSet::new(), None, |_, decision| decisions.push(decision)).await;

    assert_eq!(decisions, vec![IntakeDecision::Accepted(mint), IntakeDecision::DuplicateDropped(mint)]);
  }

  #[tokio::test]
  async fn filter_rejection_releases_the_mint_claim() {
    let (tx, rx) = mpsc::channel(8);
    let mint = Pubkey::new_unique();
    tx.send(sample_alert(mint)).await.unwrap();
    drop(tx);

    let filter: PreTradeFilter = Arc::new(|_mint| {
      Box::pin(async move { Ok(FilterResult { safe: false, reason: Some("concentrated holders".to_string()), top_holder_fraction: Some(0.8) }) })
    });

    let active_mints = ActiveMintSet::new();
    let mut decisions = vec![];
    run_intake_loop(rx, active_mints.clone(), Some(filter), |_, decision| decisions.push(decision)).await;

    assert!(matches!(decisions[0], IntakeDecision::BlockedByFilter(m, _) if m == mint));
    // Released, so a later alert for the same mint is not a duplicate.
    assert!(active_mints.try_claim(mint).await);
  }
}
