//! Price Oracle (spec §4.C). The cache shape is narrowed from
//! `nexus::cache::Cache`'s ring-buffer-of-slots design (which keeps several
//! historical versions per key) down to the single-TTL-entry-per-token map
//! spec §4.C actually calls for, guarded by `tokio::sync::RwLock` the way
//! `arbiter::Arbiter::cache` is.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;

use crate::constants::{base_precision, quote_precision, DEFAULT_PRICE_CACHE_TTL_MS};
use crate::errors::EngineError;
use crate::math::{spot_price, Ratio};
use crate::pool::derive_pool;
use crate::reserves::read_reserves;
use crate::rpc::BoundedRpc;

/// Where a cache entry's reserves came from, recorded for observability
/// per spec §4.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PriceSource {
  Hint,
  Derived,
  External,
}

#[derive(Debug, Clone)]
pub struct PriceCacheEntry {
  pub price: Ratio,
  pub base_reserve: u128,
  pub quote_reserve: u128,
  pub fetched_at: Instant,
  pub source: PriceSource,
}

impl PriceCacheEntry {
  fn is_expired(&self, ttl: Duration) -> bool {
    self.fetched_at.elapsed() >= ttl
  }
}

pub struct PriceOracle {
  rpc: BoundedRpc,
  native_mint: Pubkey,
  bonding_program_id: Pubkey,
  amm_program_id: Pubkey,
  ttl: Duration,
  cache: RwLock<HashMap<Pubkey, PriceCacheEntry>>,
}

impl PriceOracle {
  pub fn new(
    rpc: BoundedRpc,
    native_mint: Pubkey,
    bonding_program_id: Pubkey,
    amm_program_id: Pubkey,
  ) -> Self {
    Self {
      rpc,
      native_mint,
      bonding_program_id,
      amm_program_id,
      ttl: Duration::from_millis(DEFAULT_PRICE_CACHE_TTL_MS),
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Resolve the pool address to read: an explicit hint (used during
  /// migration events to skip derivation), or a fresh derivation. Spec §9
  /// leaves the hint-vs-cache precedence on a non-forced read
  /// implementation-defined; this implementation prefers a hint whenever
  /// one is supplied, even against a still-valid cache entry of the
  /// opposite kind, on the grounds that a caller only supplies a hint when
  /// it has fresher information than whatever produced the cached entry.
  pub async fn get_price(
    &self,
    token_mint: &Pubkey,
    hint_pool: Option<Pubkey>,
    force_refresh: bool,
  ) -> Result<PriceCacheEntry, EngineError> {
    if !force_refresh && hint_pool.is_none() {
      if let Some(entry) = self.cached(token_mint).await {
        return Ok(entry);
      }
    }

    let (pool, source) = match hint_pool {
      Some(pool) => (pool, PriceSource::Hint),
      None => {
        let derived = derive_pool(token_mint, &self.native_mint, &self.bonding_program_id, &self.amm_program_id)?;
        (derived.pool_address, PriceSource::Derived)
      }
    };

    let entry = self.fetch_and_cache(token_mint, pool, source).await?;
    Ok(entry)
  }

  async fn cached(&self, token_mint: &Pubkey) -> Option<PriceCacheEntry> {
    let cache = self.cache.read().await;
    let entry = cache.get(token_mint)?;
    if entry.is_expired(self.ttl) {
      None
    } else {
      Some(entry.clone())
    }
  }

  async fn fetch_and_cache(
    &self,
    token_mint: &Pubkey,
    pool: Pubkey,
    source: PriceSource,
  ) -> Result<PriceCacheEntry, EngineError> {
    let (_descriptor, reserves) = read_reserves(&self.rpc, &pool).await?;
    if reserves.base_amount_raw == 0 || reserves.quote_amount_raw == 0 {
      return Err(EngineError::DrainedPool {
        pool,
        base_reserve: reserves.base_amount_raw,
        quote_reserve: reserves.quote_amount_raw,
      });
    }

    let price = spot_price(
      reserves.base_amount_raw,
      reserves.quote_amount_raw,
      base_precision(),
      quote_precision(),
    );

    let entry = PriceCacheEntry {
      price,
      base_reserve: reserves.base_amount_raw,
      quote_reserve: reserves.quote_amount_raw,
      fetched_at: Instant::now(),
      source,
    };

    let mut cache = self.cache.write().await;
    cache.insert(*token_mint, entry.clone());
    Ok(entry)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cache_entry_expires_after_ttl() {
    let entry = PriceCacheEntry {
      price: Ratio::zero(),
      base_reserve: 1,
      quote_reserve: 1,
      fetched_at: Instant::now() - Duration::from_secs(5),
      source: PriceSource::Derived,
    };
    assert!(entry.is_expired(Duration::from_secs(3)));
  }

  #[test]
  fn cache_entry_valid_within_ttl() {
    let entry = PriceCacheEntry {
      price: Ratio::zero(),
      base_reserve: 1,
      quote_reserve: 1,
      fetched_at: Instant::now(),
      source: PriceSource::Derived,
    };
    assert!(!entry.is_expired(Duration::from_secs(3)));
  }
}
