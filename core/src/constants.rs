use solana_sdk::pubkey::Pubkey;

/// Canonical pool index used by every derived pool. The deriver never
/// searches other indices (spec §4.A).
pub const POOL_INDEX: u16 = 0;

/// 8-byte discriminator prefixing a sell event in the AMM program's log,
/// treated as a configuration constant per spec §6 rather than hardcoded
/// business logic. This is the value observed in the reference deployment;
/// a differently configured deployment overrides it via `EngineConfig`.
pub const SELL_EVENT_DISCRIMINATOR: [u8; 8] = [62, 47, 55, 10, 165, 3, 220, 42];

/// `max_supported_transaction_version` used for every confirmed-transaction
/// fetch (spec §6).
pub const MAX_SUPPORTED_TRANSACTION_VERSION: u8 = 0;

/// Base reserves are 6-decimal fixed point (spec §3).
pub const BASE_DECIMALS: u32 = 6;
/// Quote reserves are 9-decimal fixed point (spec §3), matching the native
/// asset's lamport precision.
pub const QUOTE_DECIMALS: u32 = 9;

pub fn base_precision() -> u64 {
  10u64.pow(BASE_DECIMALS)
}

pub fn quote_precision() -> u64 {
  10u64.pow(QUOTE_DECIMALS)
}

/// Dust threshold below which a remaining quantity is treated as fully
/// closed (spec §3 invariant 2, §4.H step 5): 0.1% of the original size.
pub const DUST_FRACTION_BPS: u64 = 10;

/// Default TTL for price cache entries (spec §4.C).
pub const DEFAULT_PRICE_CACHE_TTL_MS: u64 = 3_000;

/// Default confirmation poll deadline (spec §4.E).
pub const DEFAULT_CONFIRMATION_DEADLINE_SECS: u64 = 30;

/// Default delay before the first confirmation check after a sell is
/// submitted (spec §4.H step 4).
pub const DEFAULT_CONFIRMATION_DELAY_SECS: u64 = 5;

/// Default number of recent wallet signatures the reconciler scans
/// (spec §4.I; §9 open question notes this bound is unverified for
/// long-lived pending states).
pub const DEFAULT_RECONCILE_SIGNATURE_SCAN: usize = 50;

/// Default bound on concurrent RPC requests (spec §5).
pub const DEFAULT_RPC_SEMAPHORE_PERMITS: usize = 8;

/// Seeds for the first PDA step of pool derivation (spec §4.A).
pub fn pool_authority_seeds(token_mint: &Pubkey) -> [Vec<u8>; 2] {
  [b"pool-authority".to_vec(), token_mint.to_bytes().to_vec()]
}
