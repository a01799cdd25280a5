//! Scaled-integer price math. Spec §4.C and §9 require reserve math and PnL
//! accumulation to avoid binary float drift; floats are permitted only at
//! display boundaries. Grounded on `nexus::drift_client::amm::AmmUtils`,
//! which already carries the constant-product computation through
//! `num_bigint::BigInt` before narrowing to `f64` for display.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

/// A non-negative rational, numerator over denominator, kept unreduced.
/// Good enough precision for the 12-significant-fractional-digit
/// requirement in spec §4.C without pulling in a dedicated decimal crate
/// the teacher's stack doesn't already use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratio {
  pub num: BigInt,
  pub den: BigInt,
}

impl Ratio {
  pub fn new(num: impl Into<BigInt>, den: impl Into<BigInt>) -> Self {
    Self { num: num.into(), den: den.into() }
  }

  pub fn zero() -> Self {
    Self { num: BigInt::zero(), den: BigInt::from(1) }
  }

  pub fn is_zero(&self) -> bool {
    self.num.is_zero()
  }

  pub fn to_f64(&self) -> f64 {
    if self.den.is_zero() {
      return 0.0;
    }
    // BigInt -> f64 directly would lose precision on huge numerators; since
    // reserve amounts fit comfortably in u128 this round-trip is exact
    // enough for display and trigger comparisons.
    let num = self.num.to_f64().unwrap_or(0.0);
    let den = self.den.to_f64().unwrap_or(1.0);
    if den == 0.0 { 0.0 } else { num / den }
  }

  pub fn mul_u64(&self, rhs: u64) -> Ratio {
    Ratio { num: &self.num * BigInt::from(rhs), den: self.den.clone() }
  }

  /// `self * (1 + bps/10000)`
  pub fn scale_up_bps(&self, bps: u32) -> Ratio {
    Ratio {
      num: &self.num * BigInt::from(10_000u64 + bps as u64),
      den: &self.den * BigInt::from(10_000u64),
    }
  }

  /// `self * (1 - bps/10000)`, clamped at zero.
  pub fn scale_down_bps(&self, bps: u32) -> Ratio {
    let bps = bps.min(10_000);
    Ratio {
      num: &self.num * BigInt::from(10_000u64 - bps as u64),
      den: &self.den * BigInt::from(10_000u64),
    }
  }

  pub fn to_u64_floor(&self) -> u64 {
    if self.den.is_zero() {
      return 0;
    }
    (&self.num / &self.den).to_u64().unwrap_or(0)
  }

  pub fn to_u128_floor(&self) -> u128 {
    if self.den.is_zero() {
      return 0;
    }
    (&self.num / &self.den).to_u128().unwrap_or(0)
  }

  /// Unreduced numerator/denominator, narrowed to `u128` for storage.
  /// Reserve-derived ratios fit comfortably within `u128` without reducing;
  /// only cross-multiplied *comparisons* risk overflow, which is why
  /// [`Ratio::cmp_ratio`] stays in `BigInt`.
  pub fn to_u128_pair(&self) -> (u128, u128) {
    (self.num.to_u128().unwrap_or(0), self.den.to_u128().unwrap_or(1))
  }

  /// `self * (100 + pct) / 100`, used to compute take-profit trigger prices
  /// from an entry price and a gain percentage (spec §4.G).
  pub fn scale_up_pct(&self, pct: u32) -> Ratio {
    Ratio { num: &self.num * BigInt::from(100u64 + pct as u64), den: &self.den * BigInt::from(100u64) }
  }

  /// Cross-multiplied comparison; avoids reducing to a common float and
  /// avoids `u128` overflow on the multiply by working in `BigInt`.
  pub fn cmp_ratio(&self, other: &Ratio) -> std::cmp::Ordering {
    (&self.num * &other.den).cmp(&(&other.num * &self.den))
  }
}

/// A price ratio narrowed to plain `u128` numerator/denominator for
/// persistence in [`crate::position::Position`] (spec §3's `entry_price`,
/// `current_price`, `stop_loss_price`, and each take-profit level's
/// `trigger_price`). `Ratio` itself holds a `BigInt` and has no reason to be
/// serializable; this is the on-disk-safe projection of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PriceRatio {
  pub num: u128,
  pub den: u128,
}

impl PriceRatio {
  pub fn zero() -> Self {
    Self { num: 0, den: 1 }
  }

  pub fn from_ratio(ratio: &Ratio) -> Self {
    let (num, den) = ratio.to_u128_pair();
    Self { num, den }
  }

  pub fn to_ratio(&self) -> Ratio {
    Ratio::new(self.num, self.den)
  }

  pub fn to_f64(&self) -> f64 {
    self.to_ratio().to_f64()
  }

  pub fn le(&self, other: &PriceRatio) -> bool {
    self.to_ratio().cmp_ratio(&other.to_ratio()) != std::cmp::Ordering::Greater
  }

  pub fn ge(&self, other: &PriceRatio) -> bool {
    self.to_ratio().cmp_ratio(&other.to_ratio()) != std::cmp::Ordering::Less
  }

  pub fn max(self, other: PriceRatio) -> PriceRatio {
    if self.ge(&other) {
      self
    } else {
      other
    }
  }
}

/// `quote_amount_raw / quote_precision ÷ base_amount_raw / base_precision`
/// computed in `BigInt` rationals before any float conversion, per spec
/// §4.C's price formula.
pub fn spot_price(
  base_amount_raw: u128,
  quote_amount_raw: u128,
  base_precision: u64,
  quote_precision: u64,
) -> Ratio {
  // price = (quote_raw / quote_precision) / (base_raw / base_precision)
  //       = (quote_raw * base_precision) / (base_raw * quote_precision)
  let num = BigInt::from(quote_amount_raw) * BigInt::from(base_precision);
  let den = BigInt::from(base_amount_raw) * BigInt::from(quote_precision);
  Ratio::new(num, den)
}

/// Constant-product output after fees: `out = reserve_out * in_after_fee /
/// (reserve_in + in_after_fee)`, with `in_after_fee = amount_in * (1 -
/// fee_bps/10000)`. Shared by buy and sell quoting (spec §4.D).
pub fn constant_product_out(
  reserve_in: u128,
  reserve_out: u128,
  amount_in: u128,
  fee_bps: u32,
) -> u128 {
  if reserve_in == 0 || reserve_out == 0 || amount_in == 0 {
    return 0;
  }
  let fee_bps = fee_bps.min(10_000);
  let amount_in_after_fee =
    BigInt::from(amount_in) * BigInt::from(10_000u64 - fee_bps as u64) / BigInt::from(10_000u64);
  let numerator = &amount_in_after_fee * BigInt::from(reserve_out);
  let denominator = BigInt::from(reserve_in) + &amount_in_after_fee;
  if denominator.is_zero() {
    return 0;
  }
  (numerator / denominator).to_u128().unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn price_matches_naive_float_division() {
    let base = 1_000_000_000_000u128; // 1,000,000.000000 base units (6dp)
    let quote = 50_000_000_000u128; // 50.000000000 quote units (9dp)
    let price = spot_price(base, quote, 1_000_000, 1_000_000_000);
    let expected = 50.0 / 1_000_000.0;
    assert!((price.to_f64() - expected).abs() < 1e-12);
  }

  #[test]
  fn constant_product_with_zero_fee_matches_textbook_amm() {
    let out = constant_product_out(1_000_000, 1_000_000, 1_000, 0);
    // x*y=k; (1_000_000+1000)*(1_000_000-out) = 1_000_000*1_000_000
    let expected = 1_000_000u128 - (1_000_000u128 * 1_000_000u128) / 1_001_000u128;
    assert_eq!(out, expected);
  }

  #[test]
  fn fees_strictly_reduce_output() {
    let no_fee = constant_product_out(1_000_000, 1_000_000, 1_000, 0);
    let with_fee = constant_product_out(1_000_000, 1_000_000, 1_000, 100);
    assert!(with_fee < no_fee);
  }

  #[test]
  fn zero_reserve_yields_zero_output() {
    assert_eq!(constant_product_out(0, 1_000_000, 1_000, 30), 0);
    assert_eq!(constant_product_out(1_000_000, 0, 1_000, 30), 0);
  }

  #[test]
  fn price_ratio_comparison_ignores_unreduced_form() {
    let a = PriceRatio { num: 1, den: 2 };
    let b = PriceRatio { num: 2, den: 4 };
    assert!(a.le(&b));
    assert!(a.ge(&b));
  }

  #[test]
  fn scale_up_pct_matches_percentage_gain() {
    let entry = Ratio::new(1u64, 1_000_000u64);
    let tp1 = entry.scale_up_pct(100);
    assert!((tp1.to_f64() - entry.to_f64() * 2.0).abs() < 1e-12);
  }
}
