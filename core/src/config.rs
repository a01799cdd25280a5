//! Environment configuration surface (spec §6). Grounded on
//! `Arbiter::new_from_env`, which reads `WALLET`/`RPC_URL`/`API_KEY` via
//! `std::env::var` after `dotenv::dotenv().ok()`; this module generalizes
//! that pattern to the full set of options spec §6 names.

use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

use crate::constants::{
  DEFAULT_CONFIRMATION_DELAY_SECS, DEFAULT_PRICE_CACHE_TTL_MS, DEFAULT_RECONCILE_SIGNATURE_SCAN,
  DEFAULT_RPC_SEMAPHORE_PERMITS,
};
use crate::utils::read_keypair_from_env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
  Paper,
  Live,
}

impl FromStr for TradingMode {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> anyhow::Result<Self> {
    match s.to_lowercase().as_str() {
      "paper" => Ok(TradingMode::Paper),
      "live" => Ok(TradingMode::Live),
      other => Err(anyhow::anyhow!("unknown trading_mode '{other}', expected paper|live")),
    }
  }
}

/// One rung of the take-profit ladder as configured (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct TakeProfitConfig {
  pub gain_pct: u32,
  pub sell_fraction_pct: u32,
}

/// The full environment surface from spec §6, plus the on-chain program
/// identifiers spec §6 requires be configuration rather than hardcoded.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub trading_mode: TradingMode,
  pub initial_investment_quote: u64,
  pub stop_loss_pct: u32,
  pub buy_slippage_bps: u32,
  pub sell_slippage_bps: u32,
  pub take_profit_levels: Vec<TakeProfitConfig>,
  pub rpc_endpoint: String,
  pub max_positions: usize,
  pub confirmation_delay: Duration,
  pub max_retries: u32,
  pub price_cache_ttl: Duration,
  pub reconcile_signature_scan: usize,
  pub rpc_max_concurrent: usize,
  pub bonding_program_id: Pubkey,
  pub amm_program_id: Pubkey,
  pub native_mint: Pubkey,
}

impl EngineConfig {
  /// Mirrors `Arbiter::new_from_env`: `dotenv().ok()` then required vars via
  /// `std::env::var`, with sensible defaults for the tunables spec §6 marks
  /// optional.
  pub fn from_env() -> anyhow::Result<Self> {
    dotenv::dotenv().ok();

    let trading_mode = env_or("TRADING_MODE", "paper".to_string()).parse()?;
    let initial_investment_quote: f64 = env_or("INITIAL_INVESTMENT_QUOTE", "0.01".to_string()).parse()?;
    let initial_investment_quote = (initial_investment_quote * crate::constants::quote_precision() as f64) as u64;

    let stop_loss_pct = env_or("STOP_LOSS_PCT", "50".to_string()).parse()?;
    let buy_slippage_bps = env_or("BUY_SLIPPAGE_BPS", "3000".to_string()).parse()?;
    let sell_slippage_bps = env_or("SELL_SLIPPAGE_BPS", "10000".to_string()).parse()?;
    let take_profit_levels = parse_take_profit_levels(&env_or(
      "TAKE_PROFIT_LEVELS",
      "100:50,300:25,900:100".to_string(),
    ))?;

    let rpc_endpoint = std::env::var("RPC_ENDPOINT").map_err(|_| anyhow::anyhow!("RPC_ENDPOINT not set"))?;
    let max_positions = env_or("MAX_POSITIONS", "10".to_string()).parse()?;
    let confirmation_delay_ms: u64 = env_or(
      "CONFIRMATION_DELAY_MS",
      (DEFAULT_CONFIRMATION_DELAY_SECS * 1000).to_string(),
    )
    .parse()?;
    let max_retries = env_or("MAX_RETRIES", "3".to_string()).parse()?;
    let price_cache_ttl_ms: u64 =
      env_or("PRICE_CACHE_TTL_MS", DEFAULT_PRICE_CACHE_TTL_MS.to_string()).parse()?;
    let reconcile_signature_scan =
      env_or("RECONCILE_SIGNATURE_SCAN", DEFAULT_RECONCILE_SIGNATURE_SCAN.to_string()).parse()?;
    let rpc_max_concurrent =
      env_or("RPC_MAX_CONCURRENT", DEFAULT_RPC_SEMAPHORE_PERMITS.to_string()).parse()?;

    let bonding_program_id = Pubkey::from_str(&std::env::var("BONDING_PROGRAM_ID")?)?;
    let amm_program_id = Pubkey::from_str(&std::env::var("AMM_PROGRAM_ID")?)?;
    let native_mint = Pubkey::from_str(&env_or(
      "NATIVE_MINT",
      "So11111111111111111111111111111111111111112".to_string(),
    ))?;

    Ok(Self {
      trading_mode,
      initial_investment_quote,
      stop_loss_pct,
      buy_slippage_bps,
      sell_slippage_bps,
      take_profit_levels,
      rpc_endpoint,
      max_positions,
      confirmation_delay: Duration::from_millis(confirmation_delay_ms),
      max_retries,
      price_cache_ttl: Duration::from_millis(price_cache_ttl_ms),
      reconcile_signature_scan,
      rpc_max_concurrent,
      bonding_program_id,
      amm_program_id,
      native_mint,
    })
  }

  /// Reads `WALLET` the same way `read_keypair_from_env` always has:
  /// a JSON-ish `[1,2,3,...]` byte array.
  pub fn signer_from_env(&self) -> anyhow::Result<Keypair> {
    read_keypair_from_env("WALLET")
  }
}

fn env_or(key: &str, default: String) -> String {
  std::env::var(key).unwrap_or(default)
}

fn parse_take_profit_levels(raw: &str) -> anyhow::Result<Vec<TakeProfitConfig>> {
  raw
    .split(',')
    .filter(|s| !s.trim().is_empty())
    .map(|pair| {
      let (gain, frac) = pair
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("malformed take-profit level '{pair}', expected gain:fraction"))?;
      Ok(TakeProfitConfig {
        gain_pct: gain.trim().parse()?,
        sell_fraction_pct: frac.trim().parse()?,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_ladder_in_order() {
    let levels = parse_take_profit_levels("100:50,300:25,900:100").unwrap();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0].gain_pct, 100);
    assert_eq!(levels[2].sell_fraction_pct, 100);
  }

  #[test]
  fn trading_mode_rejects_unknown_value() {
    assert!("whoops".parse::<TradingMode>().is_err());
  }
}
