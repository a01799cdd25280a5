//! Production wiring of [`engine::lifecycle::ChainGateway`]: the only place
//! in this binary that actually signs and submits transactions. Grounded on
//! the sign-with-latest-blockhash pattern `nexus::trx_builder::TrxBuilder`
//! used before every send.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use engine::confirm::submit_and_confirm;
use engine::errors::EngineError;
use engine::lifecycle::{ChainGateway, ReconcileOutcome, SellSubmission};
use engine::position::Position;
use engine::reconcile::reconcile as reconcile_chain;
use engine::reserves::read_reserves;
use engine::rpc::BoundedRpc;
use engine::swap::{buy_quote_in, sell_base_in, BuyQuote, PoolSnapshot};
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Realized outcome of a buy, returned to the caller that opens a position.
#[derive(Debug, Clone)]
pub struct ConfirmedEntry {
  pub quantity_received: u64,
  pub quote_spent: u64,
  pub signature: String,
  pub pool_address: Pubkey,
  pub base_reserve: u128,
  pub quote_reserve: u128,
  pub base_fee_bps: u32,
  pub protocol_fee_bps: u32,
}

pub struct EngineGateway {
  pub rpc: BoundedRpc,
  pub signer: Arc<Keypair>,
  pub amm_program_id: Pubkey,
  pub buy_slippage_bps: u32,
  pub sell_slippage_bps: u32,
  pub confirmation_deadline: Duration,
  pub reconcile_signature_scan: usize,
}

impl EngineGateway {
  /// Entry path (spec §4.D + §4.E for a buy): quote, sign, submit, confirm.
  /// Not part of `ChainGateway` since the lifecycle engine's contract only
  /// covers sells and reconciliation (spec §4.H) — opening a position is
  /// driven by the alert intake path instead.
  pub async fn execute_entry(&self, pool_address: Pubkey, quote_in: u64) -> Result<ConfirmedEntry, EngineError> {
    let (descriptor, reserves) = read_reserves(&self.rpc, &pool_address).await?;
    let snapshot = PoolSnapshot::from_descriptor(pool_address, &descriptor, &reserves);
    let quote: BuyQuote = buy_quote_in(&snapshot, &self.signer.pubkey(), &self.amm_program_id, quote_in, self.buy_slippage_bps);

    let tx = self.sign_with_latest_blockhash(&quote.instructions).await?;
    let confirmed = submit_and_confirm(&self.rpc, &tx, &self.signer.pubkey(), &descriptor.base_mint, self.confirmation_deadline).await?;

    Ok(ConfirmedEntry {
      quantity_received: confirmed.tokens_delta.max(0) as u64,
      quote_spent: (-confirmed.quote_delta).max(0) as u64,
      signature: confirmed.signature.to_string(),
      pool_address,
      base_reserve: reserves.base_amount_raw,
      quote_reserve: reserves.quote_amount_raw,
      base_fee_bps: descriptor.base_fee_bps as u32,
      protocol_fee_bps: descriptor.protocol_fee_bps as u32,
    })
  }

  async fn sign_with_latest_blockhash(&self, instructions: &[solana_sdk::instruction::Instruction]) -> Result<VersionedTransaction, EngineError> {
    let permit = self.rpc.acquire().await;
    let blockhash = self.rpc.client().get_latest_blockhash().await;
    drop(permit);
    let blockhash = blockhash.map_err(|e| EngineError::submission(e.to_string()))?;

    let message = Message::new_with_blockhash(instructions, Some(&self.signer.pubkey()), &blockhash);
    VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[self.signer.as_ref()])
      .map_err(|e| EngineError::submission(e.to_string()))
  }
}

impl ChainGateway for EngineGateway {
  fn submit_sell(&self, position: Position, fraction_pct: u32) -> BoxFuture<SellSubmission> {
    let _ = fraction_pct; // already baked into pending.token_amount by the lifecycle engine
    let rpc = self.rpc.clone();
    let signer = self.signer.clone();
    let amm_program_id = self.amm_program_id;
    let slippage_bps = self.sell_slippage_bps;
    let deadline = self.confirmation_deadline;

    Box::pin(async move {
      let pending = match position.pending.clone() {
        Some(pending) => pending,
        None => {
          return SellSubmission::Failed(EngineError::InvariantViolation {
            position_id: position.id.to_string(),
            message: "submit_sell called without pending fields".to_string(),
          })
        }
      };

      let (descriptor, reserves) = match read_reserves(&rpc, &position.pool_address).await {
        Ok(v) => v,
        Err(e) => return SellSubmission::Failed(e),
      };
      let snapshot = PoolSnapshot::from_descriptor(position.pool_address, &descriptor, &reserves);
      let quote = sell_base_in(&snapshot, &signer.pubkey(), &amm_program_id, pending.token_amount, slippage_bps);

      let permit = rpc.acquire().await;
      let blockhash = rpc.client().get_latest_blockhash().await;
      drop(permit);
      let blockhash = match blockhash {
        Ok(h) => h,
        Err(e) => return SellSubmission::Failed(EngineError::submission(e.to_string())),
      };
      let message = Message::new_with_blockhash(&quote.instructions, Some(&signer.pubkey()), &blockhash);
      let tx = match VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[signer.as_ref()]) {
        Ok(tx) => tx,
        Err(e) => return SellSubmission::Failed(EngineError::submission(e.to_string())),
      };

      match submit_and_confirm(&rpc, &tx, &signer.pubkey(), &position.token_mint, deadline).await {
        Ok(confirmed) => SellSubmission::Confirmed {
          tokens_delta: (-confirmed.tokens_delta).max(0) as u64,
          quote_delta: confirmed.quote_delta.max(0) as u64,
          signature: confirmed.signature.to_string(),
        },
        Err(EngineError::Unconfirmed { .. }) => SellSubmission::Unconfirmed,
        Err(e) => SellSubmission::Failed(e),
      }
    })
  }

  fn reconcile(&self, position: Position) -> BoxFuture<ReconcileOutcome> {
    let rpc = self.rpc.clone();
    let signer = self.signer.clone();
    let scan_limit = self.reconcile_signature_scan;
    Box::pin(async move { reconcile_chain(&rpc, &signer.pubkey(), &position.token_mint, scan_limit).await })
  }
}
