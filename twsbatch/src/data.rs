// twsbatch/src/data.rs
// Result records produced by the callback thread and the batch outcome shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::base::RequestKind;

/// A single price observation for a contract.
///
/// `live` distinguishes a tick from the primary quote stream from a
/// last-close substitution taken off the backup queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
  pub req_id: i32,
  pub price: f64,
  pub live: bool,
}

/// One daily bar of a historical series. Only the fields downstream
/// consumers use; the gateway sends more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
  pub date: NaiveDate,
  pub close: f64,
}

/// A completed historical-data response: all bars for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBars {
  pub req_id: i32,
  pub bars: Vec<Bar>,
}

/// The raw fundamental-data document for one contract. Opaque here;
/// [`crate::fin_statements`] turns it into typed periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalBlob {
  pub req_id: i32,
  pub xml: String,
}

/// One open position row from the account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
  pub symbol: String,
  pub sec_type: String,
  pub currency: String,
  pub position: f64,
  pub avg_cost: f64,
}

/// One working-order row from the open-orders snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
  pub order_id: i32,
  pub symbol: String,
  pub sec_type: String,
  pub action: String,
  pub quantity: f64,
  pub status: String,
}

/// One matching contract from a contract-details lookup (e.g. the warrant
/// chain for an underlying).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetailRow {
  pub req_id: i32,
  pub symbol: String,
  pub sec_type: String,
  pub strike: Option<f64>,
  pub right: Option<String>,
  pub multiplier: Option<String>,
  pub last_trade_date: Option<NaiveDate>,
}

/// A correlated result produced by the callback thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultRecord {
  Price(PriceTick),
  Historical(HistoricalBars),
  Fundamental(FundamentalBlob),
  Position(PositionRow),
  Order(OrderRow),
  ContractDetail(ContractDetailRow),
}

impl ResultRecord {
  /// The request id this result answers, where the gateway supplies one.
  /// Position and order rows arrive on table-snapshot streams without a
  /// per-row id.
  pub fn req_id(&self) -> Option<i32> {
    match self {
      ResultRecord::Price(t) => Some(t.req_id),
      ResultRecord::Historical(h) => Some(h.req_id),
      ResultRecord::Fundamental(f) => Some(f.req_id),
      ResultRecord::ContractDetail(c) => Some(c.req_id),
      ResultRecord::Position(_) | ResultRecord::Order(_) => None,
    }
  }
}

/// Classification of a gateway error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
  /// Rate limit hit; eligible for one retry within the same batch.
  Pacing,
  /// Invalid or unknown symbol; never retried.
  PermanentSymbol,
  Other,
}

/// An error event from the gateway's error stream.
///
/// `req_id` is `None` for connection-level errors not tied to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
  pub req_id: Option<i32>,
  pub code: i32,
  pub message: String,
  pub category: ErrorCategory,
}

/// TWS error code for historical/fundamental pacing violations.
const PACING_ERROR_CODE: i32 = 162;
/// TWS error code for "No security definition has been found".
const NO_SECURITY_DEF_CODE: i32 = 200;

impl ErrorRecord {
  pub fn new(req_id: Option<i32>, code: i32, message: &str) -> Self {
    ErrorRecord {
      req_id,
      code,
      message: message.to_string(),
      category: categorize(code, message),
    }
  }

  pub fn is_pacing(&self) -> bool {
    self.category == ErrorCategory::Pacing
  }
}

/// Maps a gateway error to its retry class.
///
/// The pacing signature is matched on both the dedicated code and the
/// message text, since fundamental-data pacing errors have been observed
/// arriving under a generic code.
pub fn categorize(code: i32, message: &str) -> ErrorCategory {
  let lower = message.to_lowercase();
  if code == PACING_ERROR_CODE || lower.contains("pacing violation") {
    ErrorCategory::Pacing
  } else if code == NO_SECURITY_DEF_CODE || lower.contains("no security definition") {
    ErrorCategory::PermanentSymbol
  } else {
    ErrorCategory::Other
  }
}

/// The result of a batch fetch: every submitted symbol lands in exactly one
/// of the two maps by the time the fetch returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchOutcome {
  pub data: HashMap<String, ResultRecord>,
  pub issues: HashMap<String, ErrorRecord>,
}

impl FetchOutcome {
  /// Number of symbols accounted for so far.
  pub fn settled(&self) -> usize {
    self.data.len() + self.issues.len()
  }

  /// Records a result for a symbol. Data wins races: a previously recorded
  /// issue for the same symbol is discarded.
  pub fn record_data(&mut self, symbol: &str, record: ResultRecord) {
    self.issues.remove(symbol);
    self.data.insert(symbol.to_string(), record);
  }

  /// Records an issue for a symbol unless data already arrived for it.
  /// Late informational errors after successful delivery are dropped.
  pub fn record_issue(&mut self, symbol: &str, error: ErrorRecord) {
    if !self.data.contains_key(symbol) {
      self.issues.insert(symbol.to_string(), error);
    }
  }

  pub fn has_symbol(&self, symbol: &str) -> bool {
    self.data.contains_key(symbol) || self.issues.contains_key(symbol)
  }

  /// Symbols whose only recorded issue is a pacing violation.
  pub fn pacing_only_symbols(&self) -> Vec<String> {
    self
      .issues
      .iter()
      .filter(|(_, e)| e.is_pacing())
      .map(|(s, _)| s.clone())
      .collect()
  }

  /// Folds a retry outcome into this one: fresh data replaces the old
  /// issue; a changed error message replaces the retry-preserved one.
  pub fn absorb_retry(&mut self, retry: FetchOutcome) {
    for (symbol, record) in retry.data {
      self.record_data(&symbol, record);
    }
    for (symbol, error) in retry.issues {
      match self.issues.get(&symbol) {
        Some(existing) if existing.message == error.message => {}
        _ => self.record_issue(&symbol, error),
      }
    }
  }
}

/// Bookkeeping record for one outstanding request, owned by the registry
/// from allocation until its result or error is consumed.
#[derive(Debug, Clone)]
pub struct PendingRequest {
  pub req_id: i32,
  pub symbol: String,
  pub kind: RequestKind,
  pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_categorize_pacing() {
    assert_eq!(categorize(162, "Historical Market Data Service error message"), ErrorCategory::Pacing);
    assert_eq!(categorize(366, "Fundamentals: pacing violation detected"), ErrorCategory::Pacing);
  }

  #[test]
  fn test_categorize_bad_symbol() {
    assert_eq!(
      categorize(200, "No security definition has been found for the request"),
      ErrorCategory::PermanentSymbol
    );
  }

  #[test]
  fn test_categorize_other() {
    assert_eq!(categorize(2104, "Market data farm connection is OK"), ErrorCategory::Other);
  }

  #[test]
  fn test_outcome_data_wins_race() {
    let mut outcome = FetchOutcome::default();
    outcome.record_issue("AAA", ErrorRecord::new(Some(1), 162, "pacing violation"));
    outcome.record_data("AAA", ResultRecord::Price(PriceTick { req_id: 1, price: 10.0, live: true }));
    assert_eq!(outcome.settled(), 1);
    assert!(outcome.data.contains_key("AAA"));
    assert!(outcome.issues.is_empty());

    // Late error after data delivery is dropped.
    outcome.record_issue("AAA", ErrorRecord::new(Some(1), 2106, "late warning"));
    assert!(outcome.issues.is_empty());
  }

  #[test]
  fn test_absorb_retry_replaces_issue_with_data() {
    let mut outcome = FetchOutcome::default();
    outcome.record_issue("BBB", ErrorRecord::new(Some(2), 162, "pacing violation"));

    let mut retry = FetchOutcome::default();
    retry.record_data("BBB", ResultRecord::Price(PriceTick { req_id: 9, price: 5.0, live: true }));
    outcome.absorb_retry(retry);

    assert!(outcome.data.contains_key("BBB"));
    assert!(outcome.issues.is_empty());
  }

  #[test]
  fn test_outcome_serde_round_trip() {
    let mut outcome = FetchOutcome::default();
    outcome.record_data("AAA", ResultRecord::Price(PriceTick { req_id: 1, price: 101.5, live: false }));
    outcome.record_issue("ZZZ", ErrorRecord::new(Some(2), 200, "No security definition"));
    let json = serde_json::to_string(&outcome).unwrap();
    let back: FetchOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back.data.get("AAA"), outcome.data.get("AAA"));
    assert_eq!(back.issues.get("ZZZ"), outcome.issues.get("ZZZ"));
  }
}
