//! Reserve Reader (spec §4.B). Grounded on
//! `nexus::drift_client::utils::DriftUtils::{perp_markets,spot_markets}`,
//! which fetches a state account then issues a single batched
//! `get_multiple_accounts` for the accounts it references — the same shape
//! spec §4.B demands ("both reserve fetches issued concurrently; one
//! network round-trip").

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;

use crate::errors::EngineError;
use crate::rpc::BoundedRpc;

/// The subset of the pool descriptor account's fields the reader needs.
/// Anchor-style accounts are laid out as an 8-byte discriminator followed
/// by the borsh-encoded struct body; we skip the discriminator the same way
/// `anchor_lang::AccountDeserialize::try_deserialize` does internally.
#[derive(Debug, Clone, BorshDeserialize)]
pub struct PoolAccountLayout {
  pub base_mint: [u8; 32],
  pub quote_mint: [u8; 32],
  pub base_reserve_account: [u8; 32],
  pub quote_reserve_account: [u8; 32],
  pub base_fee_bps: u16,
  pub protocol_fee_bps: u16,
}

/// Decoded pool descriptor with `Pubkey`-typed fields.
#[derive(Debug, Clone)]
pub struct PoolDescriptor {
  pub base_mint: Pubkey,
  pub quote_mint: Pubkey,
  pub base_reserve_account: Pubkey,
  pub quote_reserve_account: Pubkey,
  pub base_fee_bps: u16,
  pub protocol_fee_bps: u16,
}

/// Raw reserve amounts as read from the two token accounts (spec §4.B).
#[derive(Debug, Clone, Copy)]
pub struct Reserves {
  pub base_amount_raw: u128,
  pub quote_amount_raw: u128,
}

const ANCHOR_DISCRIMINATOR_LEN: usize = 8;

fn decode_pool_account(pool: &Pubkey, data: &[u8]) -> Result<PoolDescriptor, EngineError> {
  let body = data.get(ANCHOR_DISCRIMINATOR_LEN..).ok_or_else(|| EngineError::Decode {
    account: *pool,
    source: anyhow::anyhow!("account data shorter than discriminator"),
  })?;
  let layout = PoolAccountLayout::try_from_slice(body).map_err(|e| EngineError::Decode {
    account: *pool,
    source: anyhow::anyhow!(e),
  })?;
  Ok(PoolDescriptor {
    base_mint: Pubkey::new_from_array(layout.base_mint),
    quote_mint: Pubkey::new_from_array(layout.quote_mint),
    base_reserve_account: Pubkey::new_from_array(layout.base_reserve_account),
    quote_reserve_account: Pubkey::new_from_array(layout.quote_reserve_account),
    base_fee_bps: layout.base_fee_bps,
    protocol_fee_bps: layout.protocol_fee_bps,
  })
}

fn decode_token_amount(account: &Pubkey, data: &[u8]) -> Result<u64, EngineError> {
  let token_account = spl_token::state::Account::unpack(data).map_err(|e| EngineError::Decode {
    account: *account,
    source: anyhow::anyhow!(e),
  })?;
  Ok(token_account.amount)
}

/// Fetches the pool descriptor, then both reserve accounts concurrently via
/// a single `get_multiple_accounts` round-trip, and returns the decoded
/// amounts. Fails with `PoolMissing`, `ReserveMissing`, or `Decode`.
pub async fn read_reserves(rpc: &BoundedRpc, pool: &Pubkey) -> Result<(PoolDescriptor, Reserves), EngineError> {
  let permit = rpc.acquire().await;
  let pool_account = rpc
    .client()
    .get_account(pool)
    .await
    .map_err(|_| EngineError::PoolMissing { pool: *pool })?;
  drop(permit);

  let descriptor = decode_pool_account(pool, &pool_account.data)?;

  let permit = rpc.acquire().await;
  let keys = [descriptor.base_reserve_account, descriptor.quote_reserve_account];
  let accounts = rpc
    .client()
    .get_multiple_accounts(&keys)
    .await
    .map_err(|_| EngineError::ReserveMissing { pool: *pool })?;
  drop(permit);

  let base_account = accounts[0].as_ref().ok_or(EngineError::ReserveMissing { pool: *pool })?;
  let quote_account = accounts[1].as_ref().ok_or(EngineError::ReserveMissing { pool: *pool })?;

  let base_amount_raw = decode_token_amount(&keys[0], &base_account.data)? as u128;
  let quote_amount_raw = decode_token_amount(&keys[1], &quote_account.data)? as u128;

  Ok((descriptor, Reserves { base_amount_raw, quote_amount_raw }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_rejects_truncated_account_data() {
    let pool = Pubkey::new_unique();
    let err = decode_pool_account(&pool, &[0u8; 4]).unwrap_err();
    assert!(matches!(err, EngineError::Decode { .. }));
  }
}
