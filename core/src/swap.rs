//! Swap Builder (spec §4.D). The constant-product math is grounded on
//! `nexus::drift_client::amm::AmmUtils`, which carries Drift's virtual-AMM
//! swap math through `num_bigint::BigInt`; here it is narrowed to a plain
//! two-reserve constant-product pool with pool-reported fee rates. This
//! module is pure given a pool snapshot — it never touches the network and
//! never signs, matching spec §4.D's "it does not sign or submit."

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{base_precision, quote_precision};
use crate::math::{constant_product_out, Ratio};
use crate::reserves::{PoolDescriptor, Reserves};

/// A snapshot of a pool's on-chain state sufficient to quote a swap. Keeps
/// the fee rates alongside the reserves since spec §4.D requires fees be
/// read from pool state, not hardcoded.
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
  pub pool_address: Pubkey,
  pub base_reserve: u128,
  pub quote_reserve: u128,
  pub base_fee_bps: u32,
  pub protocol_fee_bps: u32,
}

impl PoolSnapshot {
  pub fn from_descriptor(pool: Pubkey, descriptor: &PoolDescriptor, reserves: &Reserves) -> Self {
    Self {
      pool_address: pool,
      base_reserve: reserves.base_amount_raw,
      quote_reserve: reserves.quote_amount_raw,
      base_fee_bps: descriptor.base_fee_bps as u32,
      protocol_fee_bps: descriptor.protocol_fee_bps as u32,
    }
  }

  fn total_fee_bps(&self) -> u32 {
    self.base_fee_bps + self.protocol_fee_bps
  }
}

#[derive(Debug, Clone)]
pub struct BuyQuote {
  pub expected_base_out: u64,
  pub max_quote_spent: u64,
  pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct SellQuote {
  pub expected_quote_out: u64,
  pub min_quote_received: u64,
  pub instructions: Vec<Instruction>,
}

const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

/// `expected_base_out` from the constant-product invariant minus pool fees;
/// `max_quote_spent = quote_in * (1 + slippage_bps/10000)`, enforced
/// on-chain (spec §4.D).
pub fn buy_quote_in(
  pool: &PoolSnapshot,
  payer: &Pubkey,
  amm_program_id: &Pubkey,
  quote_in: u64,
  slippage_bps: u32,
) -> BuyQuote {
  let expected_base_out =
    constant_product_out(pool.quote_reserve, pool.base_reserve, quote_in as u128, pool.total_fee_bps()) as u64;

  let max_quote_spent = Ratio::new(quote_in, 1u64).scale_up_bps(slippage_bps).to_u64_floor();

  let instructions = vec![build_swap_instruction(
    BUY_DISCRIMINATOR,
    pool.pool_address,
    *payer,
    *amm_program_id,
    quote_in,
    max_quote_spent,
  )];

  BuyQuote { expected_base_out, max_quote_spent, instructions }
}

/// `expected_quote_out` by the same math in reverse, fees subtracted on the
/// output side; `min_quote_received = expected_quote_out * (1 -
/// slippage_bps/10000)`, enforced on-chain (spec §4.D).
pub fn sell_base_in(
  pool: &PoolSnapshot,
  payer: &Pubkey,
  amm_program_id: &Pubkey,
  base_in: u64,
  slippage_bps: u32,
) -> SellQuote {
  let expected_quote_out =
    constant_product_out(pool.base_reserve, pool.quote_reserve, base_in as u128, pool.total_fee_bps()) as u64;

  let min_quote_received = Ratio::new(expected_quote_out, 1u64).scale_down_bps(slippage_bps).to_u64_floor();

  let instructions = vec![build_swap_instruction(
    SELL_DISCRIMINATOR,
    pool.pool_address,
    *payer,
    *amm_program_id,
    base_in,
    min_quote_received,
  )];

  SellQuote { expected_quote_out, min_quote_received, instructions }
}

fn build_swap_instruction(
  discriminator: [u8; 8],
  pool: Pubkey,
  payer: Pubkey,
  amm_program_id: Pubkey,
  amount_in: u64,
  bound: u64,
) -> Instruction {
  let mut data = Vec::with_capacity(8 + 8 + 8);
  data.extend_from_slice(&discriminator);
  data.extend_from_slice(&amount_in.to_le_bytes());
  data.extend_from_slice(&bound.to_le_bytes());

  Instruction {
    program_id: amm_program_id,
    accounts: vec![
      AccountMeta::new(pool, false),
      AccountMeta::new(payer, true),
      AccountMeta::new_readonly(spl_token::id(), false),
    ],
    data,
  }
}

/// base_precision/quote_precision are exposed for callers converting
/// between raw reserve units and display units; re-exported here so swap
/// callers don't need a separate import from `constants`.
pub fn precisions() -> (u64, u64) {
  (base_precision(), quote_precision())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot(base: u128, quote: u128, fee_bps: u32) -> PoolSnapshot {
    PoolSnapshot {
      pool_address: Pubkey::new_unique(),
      base_reserve: base,
      quote_reserve: quote,
      base_fee_bps: fee_bps,
      protocol_fee_bps: 0,
    }
  }

  #[test]
  fn zero_slippage_makes_expected_equal_bound() {
    let pool = snapshot(1_000_000_000_000, 50_000_000_000, 0);
    let payer = Pubkey::new_unique();
    let amm = Pubkey::new_unique();
    let buy = buy_quote_in(&pool, &payer, &amm, 1_000_000_000, 0);
    assert_eq!(buy.max_quote_spent, 1_000_000_000);

    let sell = sell_base_in(&pool, &payer, &amm, 1_000_000, 0);
    assert_eq!(sell.min_quote_received, sell.expected_quote_out);
  }

  #[test]
  fn buy_then_sell_round_trip_loses_to_fees() {
    let pool = snapshot(1_000_000_000_000, 50_000_000_000, 30);
    let payer = Pubkey::new_unique();
    let amm = Pubkey::new_unique();
    let quote_in = 1_000_000_000u64;
    let buy = buy_quote_in(&pool, &payer, &amm, quote_in, 0);

    let advanced_pool = PoolSnapshot {
      base_reserve: pool.base_reserve - buy.expected_base_out as u128,
      quote_reserve: pool.quote_reserve + quote_in as u128,
      ..pool
    };
    let sell = sell_base_in(&advanced_pool, &payer, &amm, buy.expected_base_out, 0);
    assert!(sell.expected_quote_out <= quote_in);
  }

  #[test]
  fn higher_slippage_tolerance_loosens_sell_bound() {
    let pool = snapshot(1_000_000_000_000, 50_000_000_000, 30);
    let payer = Pubkey::new_unique();
    let amm = Pubkey::new_unique();
    let tight = sell_base_in(&pool, &payer, &amm, 1_000_000, 3000);
    let loose = sell_base_in(&pool, &payer, &amm, 1_000_000, 10000);
    assert!(loose.min_quote_received <= tight.min_quote_received);
  }
}
