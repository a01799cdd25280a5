//! Reconciler (spec §4.I). New state-recovery logic with no single teacher
//! analog; grounded on the teacher's control-flow style (explicit match
//! arms, `log::info!`/`log::warn!` at every branch) and reuses
//! [`crate::confirm`]'s two realized-amount parsing strategies for the
//! signature-history scan.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use spl_associated_token_account::get_associated_token_address;
use std::str::FromStr;

use crate::confirm::diff_from_encoded;
use crate::lifecycle::ReconcileOutcome;
use crate::rpc::BoundedRpc;

/// Determines whether the wallet still holds the tokens, per spec §4.I's
/// two-step procedure: check the live balance first, and only fall back to
/// scanning signature history when the balance reads zero (or the account
/// doesn't exist), since that is the ambiguous case — a zero balance could
/// mean the sell succeeded and was simply never observed.
pub async fn reconcile(
  rpc: &BoundedRpc,
  wallet: &Pubkey,
  token_mint: &Pubkey,
  signature_scan_limit: usize,
) -> ReconcileOutcome {
  let ata = get_associated_token_address(wallet, token_mint);

  let permit = rpc.acquire().await;
  let balance = rpc.client().get_token_account_balance(&ata).await;
  drop(permit);

  if let Ok(balance) = balance {
    if let Ok(amount) = balance.amount.parse::<u64>() {
      if amount > 0 {
        log::info!("reconcile: wallet still holds {amount} of mint {token_mint}, sell genuinely failed");
        return ReconcileOutcome::StillHeld { balance: amount };
      }
    }
  }

  log::info!("reconcile: balance reads zero for mint {token_mint}, scanning last {signature_scan_limit} signatures");
  scan_signature_history(rpc, wallet, token_mint, signature_scan_limit).await
}

async fn scan_signature_history(
  rpc: &BoundedRpc,
  wallet: &Pubkey,
  token_mint: &Pubkey,
  signature_scan_limit: usize,
) -> ReconcileOutcome {
  let permit = rpc.acquire().await;
  let config = solana_client::rpc_config::GetConfirmedSignaturesForAddress2Config {
    limit: Some(signature_scan_limit),
    ..Default::default()
  };
  let signatures = rpc.client().get_signatures_for_address_with_config(wallet, config).await;
  drop(permit);

  let Ok(signatures) = signatures else {
    return ReconcileOutcome::Unrecoverable { reason: "failed to fetch signature history".to_string() };
  };

  for entry in signatures {
    if entry.err.is_some() {
      continue;
    }
    let Ok(signature) = Signature::from_str(&entry.signature) else { continue };

    let permit = rpc.acquire().await;
    let tx = rpc
      .client()
      .get_transaction(&signature, UiTransactionEncoding::Base64)
      .await;
    drop(permit);

    let Ok(tx) = tx else { continue };
    let Some((tokens_delta, quote_delta, parser)) = diff_from_encoded(&tx.transaction, wallet, token_mint) else {
      continue;
    };

    if tokens_delta < 0 && quote_delta > 0 {
      log::info!("reconcile: recovered sell from signature {} via {:?}", entry.signature, parser);
      return ReconcileOutcome::RecoveredSell {
        tokens_sold: (-tokens_delta) as u64,
        quote_received: quote_delta as u64,
        signature: Some(entry.signature),
      };
    }
  }

  ReconcileOutcome::Unrecoverable {
    reason: format!("no matching sell found in the last {signature_scan_limit} signatures"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn associated_token_address_is_deterministic() {
    let wallet = Pubkey::new_unique();
    let mint = Pubkey::new_unique();
    let a = get_associated_token_address(&wallet, &mint);
    let b = get_associated_token_address(&wallet, &mint);
    assert_eq!(a, b);
  }
}
