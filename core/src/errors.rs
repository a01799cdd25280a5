use solana_sdk::pubkey::Pubkey;

/// Error taxonomy from spec §7. Each variant names a source component so
/// callers can apply the propagation policy in the same table without
/// re-deriving it from the variant's shape.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("pool PDA derivation failed for mint {mint}: {source}")]
  Derivation {
    mint: Pubkey,
    #[source]
    source: anyhow::Error,
  },

  #[error("pool account missing for pool {pool}")]
  PoolMissing { pool: Pubkey },

  #[error("reserve account missing for pool {pool}")]
  ReserveMissing { pool: Pubkey },

  #[error("drained pool {pool}: base={base_reserve} quote={quote_reserve}")]
  DrainedPool {
    pool: Pubkey,
    base_reserve: u128,
    quote_reserve: u128,
  },

  #[error("failed to decode account {account}: {source}")]
  Decode {
    account: Pubkey,
    #[source]
    source: anyhow::Error,
  },

  #[error("on-chain instruction rejected due to slippage for pool {pool}")]
  SlippageExceeded { pool: Pubkey },

  #[error("submission failed: insufficient funds ({message})")]
  InsufficientFunds { message: String },

  #[error("submission failed: {message}")]
  Submission { message: String },

  #[error("transaction {signature} unconfirmed after {deadline_secs}s")]
  Unconfirmed { signature: String, deadline_secs: u64 },

  #[error("invariant violated on position {position_id}: {message}")]
  InvariantViolation { position_id: String, message: String },

  /// Ordinary capacity/duplicate rejection from `PositionStore::add`
  /// (already-open mint, `max_positions` reached). Kept distinct from
  /// `InvariantViolation` so the crash-the-process policy below only fires
  /// on genuine data-corruption bugs, not on "new alerts are rejected
  /// without side effect" (spec §8 boundary behavior).
  #[error("position rejected: {reason}")]
  PositionRejected { reason: String },
}

impl EngineError {
  /// A `SubmissionError` whose message indicates insufficient funds is
  /// reclassified per spec §4.H's failure-taxonomy short-circuit.
  pub fn submission(message: impl Into<String>) -> Self {
    let message = message.into();
    if message.to_lowercase().contains("insufficient") {
      EngineError::InsufficientFunds { message }
    } else {
      EngineError::Submission { message }
    }
  }

  pub fn is_insufficient_funds(&self) -> bool {
    matches!(self, EngineError::InsufficientFunds { .. })
  }

  /// Store invariant violations are bugs, never routine rejections (spec
  /// §7): "must halt the process; the on-disk state remains readable for
  /// manual recovery." Callers that sit at a task boundary check this and
  /// exit rather than log-and-continue.
  pub fn is_invariant_violation(&self) -> bool {
    matches!(self, EngineError::InvariantViolation { .. })
  }
}
