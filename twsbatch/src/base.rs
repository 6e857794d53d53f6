// twsbatch/src/base.rs
// Base types and error definitions shared across the crate.

use thiserror::Error;

/// Errors surfaced by the correlation and batch-fetch layer.
///
/// Per-symbol problems inside a batch are *not* represented here; those are
/// recorded as [`crate::data::ErrorRecord`] entries in the outcome's issues
/// map. This enum covers batch-level and request-level failures.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
  #[error("Not connected to gateway")]
  NotConnected,

  #[error("Gateway connection lost: {0}")]
  Disconnected(String),

  #[error("Request timeout: {0}")]
  Timeout(String),

  #[error("Callback thread terminated: {0}")]
  ThreadFatal(String),

  #[error("Message parse error: {0}")]
  ParseError(String),

  #[error("Duplicate request ID: {0}")]
  DuplicateRequestId(i32),

  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("Internal error: {0}")]
  InternalError(String),

  #[error("API error: code={0}, msg={1}")]
  ApiError(i32, String),
}

/// The kind of data an outstanding request was issued for.
///
/// Each kind has its own result queue and its own rate-limit ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RequestKind {
  Price,
  Historical,
  Fundamental,
  Position,
  Order,
  ContractDetail,
}

impl std::fmt::Display for RequestKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      RequestKind::Price => "Price",
      RequestKind::Historical => "Historical",
      RequestKind::Fundamental => "Fundamental",
      RequestKind::Position => "Position",
      RequestKind::Order => "Order",
      RequestKind::ContractDetail => "ContractDetail",
    };
    write!(f, "{}", s)
  }
}
