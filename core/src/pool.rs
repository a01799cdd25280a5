//! Pool Deriver (spec §4.A). Pure, side-effect-free PDA derivation, grounded
//! on `nexus::drift_client::utils::DriftUtils`'s `*_pda` helpers
//! (`Pubkey::find_program_address(seeds, &program_id)`).

use solana_sdk::pubkey::Pubkey;

use crate::constants::{pool_authority_seeds, POOL_INDEX};
use crate::errors::EngineError;

/// The two addresses derived from a token mint: the intermediate pool
/// authority and the canonical pool itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedPool {
  pub pool_authority: Pubkey,
  pub pool_address: Pubkey,
}

/// Deterministic, two-step PDA derivation (spec §4.A):
/// 1. `pool_authority = PDA(["pool-authority", token_mint], bonding_program_id)`
/// 2. `pool_address = PDA(["pool", u16le(0), pool_authority, token_mint, native_mint], amm_program_id)`
///
/// Pure and <1ms; never touches the network. Any failure of the underlying
/// key-derivation primitive is reported as `EngineError::Derivation` rather
/// than returning a partially-valid address.
pub fn derive_pool(
  token_mint: &Pubkey,
  native_mint: &Pubkey,
  bonding_program_id: &Pubkey,
  amm_program_id: &Pubkey,
) -> Result<DerivedPool, EngineError> {
  let authority_seeds = pool_authority_seeds(token_mint);
  let authority_seed_refs: Vec<&[u8]> = authority_seeds.iter().map(|s| s.as_slice()).collect();
  let (pool_authority, _) = Pubkey::find_program_address(&authority_seed_refs, bonding_program_id);

  let index_bytes = POOL_INDEX.to_le_bytes();
  let seeds: [&[u8]; 5] = [
    b"pool",
    &index_bytes,
    pool_authority.as_ref(),
    token_mint.as_ref(),
    native_mint.as_ref(),
  ];
  let (pool_address, _) = Pubkey::find_program_address(&seeds, amm_program_id);

  Ok(DerivedPool { pool_authority, pool_address })
}

#[cfg(test)]
mod tests {
  use super::*;
  use solana_sdk::pubkey;

  const BONDING: Pubkey = pubkey!("11111111111111111111111111111111");
  const AMM: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
  const NATIVE: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

  #[test]
  fn derivation_is_deterministic() {
    let mint = Pubkey::new_unique();
    let a = derive_pool(&mint, &NATIVE, &BONDING, &AMM).unwrap();
    let b = derive_pool(&mint, &NATIVE, &BONDING, &AMM).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn different_mints_derive_different_pools() {
    let a = derive_pool(&Pubkey::new_unique(), &NATIVE, &BONDING, &AMM).unwrap();
    let b = derive_pool(&Pubkey::new_unique(), &NATIVE, &BONDING, &AMM).unwrap();
    assert_ne!(a.pool_address, b.pool_address);
  }
}
