//! Confirmation Tracker (spec §4.E). Grounded directly on
//! `nexus::trx_builder::TrxBuilder::{send,confirm}`: submit with a small
//! retry count and a confirmed-commitment preflight, then poll signature
//! status on an interval until a terminal commitment or a deadline. This
//! module additionally runs the two realized-amount parsing strategies
//! spec §4.E requires, which the teacher's bots never needed because they
//! read state back out of Drift's own account cache instead.

use std::time::Duration;

use base64::Engine as _;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_rpc_client_api::config::RpcTransactionConfig;
use solana_sdk::clock::Slot;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{
  EncodedTransactionWithStatusMeta, UiTransactionEncoding, UiTransactionStatusMeta,
};

use crate::constants::{MAX_SUPPORTED_TRANSACTION_VERSION, SELL_EVENT_DISCRIMINATOR};
use crate::errors::EngineError;
use crate::rpc::BoundedRpc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserUsed {
  BalanceDiff,
  EventLog,
}

/// Realized amounts extracted from a confirmed swap transaction (spec §4.E).
#[derive(Debug, Clone)]
pub struct ConfirmedSwap {
  pub signature: Signature,
  /// Positive = wallet's base-token balance increased (a buy).
  pub tokens_delta: i128,
  /// Positive = wallet's native-asset balance increased (a sell).
  pub quote_delta: i128,
  pub slot: Slot,
  pub parser_used: ParserUsed,
}

/// Submits the transaction with one retry, then polls for `confirmed` or
/// `finalized` up to `deadline`. Returns `Unconfirmed` past the deadline
/// rather than hanging — spec §5 treats this as a deadline, not a
/// cancelable handle.
pub async fn submit_and_confirm(
  rpc: &BoundedRpc,
  tx: &VersionedTransaction,
  wallet: &Pubkey,
  token_mint: &Pubkey,
  deadline: Duration,
) -> Result<ConfirmedSwap, EngineError> {
  let signature = send_with_preflight(rpc, tx).await?;
  poll_until_confirmed(rpc, &signature, deadline).await?;
  parse_realized_amounts(rpc, &signature, wallet, token_mint).await
}

async fn send_with_preflight(rpc: &BoundedRpc, tx: &VersionedTransaction) -> Result<Signature, EngineError> {
  let permit = rpc.acquire().await;
  let config = RpcSendTransactionConfig { skip_preflight: false, ..Default::default() };
  let result = rpc.client().send_transaction_with_config(tx, config).await;
  drop(permit);
  result.map_err(|e| EngineError::submission(e.to_string()))
}

async fn poll_until_confirmed(
  rpc: &BoundedRpc,
  signature: &Signature,
  deadline: Duration,
) -> Result<(), EngineError> {
  let start = tokio::time::Instant::now();
  let mut interval = tokio::time::interval(Duration::from_millis(500));
  loop {
    interval.tick().await;
    if start.elapsed() >= deadline {
      return Err(EngineError::Unconfirmed {
        signature: signature.to_string(),
        deadline_secs: deadline.as_secs(),
      });
    }

    let permit = rpc.acquire().await;
    let statuses = rpc.client().get_signature_statuses(std::slice::from_ref(signature)).await;
    drop(permit);

    if let Ok(response) = statuses {
      if let Some(Some(status)) = response.value.into_iter().next() {
        let confirmed = status
          .confirmation_status
          .map(|c| matches!(c, solana_transaction_status::TransactionConfirmationStatus::Confirmed
            | solana_transaction_status::TransactionConfirmationStatus::Finalized))
          .unwrap_or(false);
        if confirmed {
          return Ok(());
        }
      }
    }
  }
}

async fn parse_realized_amounts(
  rpc: &BoundedRpc,
  signature: &Signature,
  wallet: &Pubkey,
  token_mint: &Pubkey,
) -> Result<ConfirmedSwap, EngineError> {
  let permit = rpc.acquire().await;
  let config = RpcTransactionConfig {
    encoding: Some(UiTransactionEncoding::Base64),
    commitment: None,
    max_supported_transaction_version: Some(MAX_SUPPORTED_TRANSACTION_VERSION),
  };
  let tx = rpc
    .client()
    .get_transaction_with_config(signature, config)
    .await
    .map_err(|e| EngineError::submission(e.to_string()))?;
  drop(permit);

  let slot = tx.slot;
  let meta = tx
    .transaction
    .meta
    .ok_or_else(|| EngineError::submission("confirmed transaction has no metadata".to_string()))?;

  if let Some((tokens_delta, quote_delta)) = balance_diff(&meta, wallet, token_mint) {
    return Ok(ConfirmedSwap { signature: *signature, tokens_delta, quote_delta, slot, parser_used: ParserUsed::BalanceDiff });
  }

  if let Some((tokens_delta, quote_delta)) = event_log_diff(&meta) {
    return Ok(ConfirmedSwap { signature: *signature, tokens_delta, quote_delta, slot, parser_used: ParserUsed::EventLog });
  }

  Err(EngineError::submission("could not parse realized amounts from either strategy".to_string()))
}

/// `OptionSerializer<T>` (the RPC-response wrapper that serializes missing
/// fields as absent rather than `null`) converts to `Option<&T>` via `From`,
/// but exposes no bare `.ok()` — this is the explicit-match equivalent.
fn opt_field<T>(field: &solana_transaction_status::option_serializer::OptionSerializer<T>) -> Option<&T> {
  Option::from(field.as_ref())
}

fn owner_matches(owner: &solana_transaction_status::option_serializer::OptionSerializer<String>, wallet: &Pubkey) -> bool {
  opt_field(owner).map(|o| o.as_str()) == Some(wallet.to_string().as_str())
}

/// Strategy 1: post- minus pre-balance differencing on the wallet's token
/// and native balances (spec §4.E).
fn balance_diff(meta: &UiTransactionStatusMeta, wallet: &Pubkey, token_mint: &Pubkey) -> Option<(i128, i128)> {
  let pre_token = opt_field(&meta.pre_token_balances)?
    .iter()
    .find(|b| owner_matches(&b.owner, wallet) && b.mint == token_mint.to_string())
    .and_then(|b| b.ui_token_amount.amount.parse::<i128>().ok())
    .unwrap_or(0);
  let post_token = opt_field(&meta.post_token_balances)?
    .iter()
    .find(|b| owner_matches(&b.owner, wallet) && b.mint == token_mint.to_string())
    .and_then(|b| b.ui_token_amount.amount.parse::<i128>().ok())
    .unwrap_or(0);

  let pre_lamports = meta.pre_balances.first().copied().unwrap_or(0) as i128;
  let post_lamports = meta.post_balances.first().copied().unwrap_or(0) as i128;

  Some((post_token - pre_token, post_lamports - pre_lamports))
}

/// Strategy 2: structured event-log parsing via the known sell-event
/// discriminator (spec §4.E, §6).
fn event_log_diff(meta: &UiTransactionStatusMeta) -> Option<(i128, i128)> {
  let logs = opt_field(&meta.log_messages)?;
  for line in logs {
    let Some(encoded) = line.strip_prefix("Program data: ") else { continue };
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else { continue };
    if bytes.len() < 8 + 16 || bytes[..8] != SELL_EVENT_DISCRIMINATOR {
      continue;
    }
    let tokens_sold = u64::from_le_bytes(bytes[8..16].try_into().ok()?) as i128;
    let quote_received = u64::from_le_bytes(bytes[16..24].try_into().ok()?) as i128;
    return Some((-tokens_sold, quote_received));
  }
  None
}

/// Exposed for `EncodedTransactionWithStatusMeta` consumers that already
/// have a fetched transaction and just want the realized amounts without a
/// second RPC round-trip (used by the reconciler).
pub fn diff_from_encoded(
  tx: &EncodedTransactionWithStatusMeta,
  wallet: &Pubkey,
  token_mint: &Pubkey,
) -> Option<(i128, i128, ParserUsed)> {
  let meta = tx.meta.as_ref()?;
  if let Some((t, q)) = balance_diff(meta, wallet, token_mint) {
    return Some((t, q, ParserUsed::BalanceDiff));
  }
  if let Some((t, q)) = event_log_diff(meta) {
    return Some((t, q, ParserUsed::EventLog));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn event_log_diff_extracts_amounts_after_discriminator() {
    let mut bytes = SELL_EVENT_DISCRIMINATOR.to_vec();
    bytes.extend_from_slice(&1_000_000u64.to_le_bytes());
    bytes.extend_from_slice(&500_000_000u64.to_le_bytes());
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let meta = UiTransactionStatusMeta {
      log_messages: solana_transaction_status::option_serializer::OptionSerializer::Some(vec![
        format!("Program data: {encoded}"),
      ]),
      ..blank_meta()
    };
    let (tokens, quote) = event_log_diff(&meta).unwrap();
    assert_eq!(tokens, -1_000_000);
    assert_eq!(quote, 500_000_000);
  }

  fn blank_meta() -> UiTransactionStatusMeta {
    UiTransactionStatusMeta {
      err: None,
      status: Ok(()),
      fee: 0,
      pre_balances: vec![],
      post_balances: vec![],
      inner_instructions: solana_transaction_status::option_serializer::OptionSerializer::None,
      log_messages: solana_transaction_status::option_serializer::OptionSerializer::None,
      pre_token_balances: solana_transaction_status::option_serializer::OptionSerializer::None,
      post_token_balances: solana_transaction_status::option_serializer::OptionSerializer::None,
      rewards: solana_transaction_status::option_serializer::OptionSerializer::None,
      loaded_addresses: None,
      return_data: solana_transaction_status::option_serializer::OptionSerializer::None,
      compute_units_consumed: solana_transaction_status::option_serializer::OptionSerializer::None,
    }
  }
}
