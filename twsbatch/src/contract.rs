// twsbatch/src/contract.rs
// Minimal instrument description dispatched with gateway requests.

use serde::{Deserialize, Serialize};

/// Security type of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
  Stock,
  Option,
  Warrant,
  Future,
}

impl SecType {
  pub fn as_str(&self) -> &'static str {
    match self {
      SecType::Stock => "STK",
      SecType::Option => "OPT",
      SecType::Warrant => "WAR",
      SecType::Future => "FUT",
    }
  }
}

/// Instrument routed to the gateway with each data or order request.
///
/// Only the fields the correlation layer needs to address an instrument;
/// the wire-level contract encoding lives in the external gateway library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
  pub symbol: String,
  pub sec_type: SecType,
  pub currency: String,
  pub exchange: String,
  /// Routing hint for ambiguous smart-routed symbols.
  pub primary_exchange: Option<String>,
}

impl Contract {
  /// A US stock routed through smart routing.
  pub fn stock(symbol: &str) -> Self {
    Contract {
      symbol: symbol.to_string(),
      sec_type: SecType::Stock,
      currency: "USD".to_string(),
      exchange: "SMART".to_string(),
      primary_exchange: None,
    }
  }

  /// A stock in an explicit currency (foreign listings).
  pub fn stock_in_currency(symbol: &str, currency: &str) -> Self {
    Contract {
      currency: currency.to_string(),
      ..Contract::stock(symbol)
    }
  }

  /// Builds a stock contract from a raw ticker-list entry.
  ///
  /// Class shares are listed as `BRK.B` or `BRK-B` but the gateway expects
  /// `BRK B`. A `$` suffix selects the listing currency, e.g. `RY$CAD`.
  pub fn from_ticker(ticker: &str) -> Self {
    let (symbol, currency) = match ticker.split_once('$') {
      Some((sym, cur)) => (sym.to_string(), Some(cur.to_string())),
      None => (ticker.to_string(), None),
    };
    let symbol = symbol.replace(['.', '-'], " ");
    match currency {
      Some(cur) => Contract::stock_in_currency(&symbol, &cur),
      None => Contract::stock(&symbol),
    }
  }

  pub fn with_primary_exchange(mut self, primary: &str) -> Self {
    self.primary_exchange = Some(primary.to_string());
    self
  }
}

impl std::fmt::Display for Contract {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({}/{}/{})", self.symbol, self.sec_type.as_str(), self.currency, self.exchange)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_ticker_class_shares() {
    let c = Contract::from_ticker("BRK.B");
    assert_eq!(c.symbol, "BRK B");
    assert_eq!(c.currency, "USD");
    let c = Contract::from_ticker("BF-B");
    assert_eq!(c.symbol, "BF B");
  }

  #[test]
  fn test_from_ticker_foreign_currency() {
    let c = Contract::from_ticker("RY$CAD");
    assert_eq!(c.symbol, "RY");
    assert_eq!(c.currency, "CAD");
    assert_eq!(c.exchange, "SMART");
  }

  #[test]
  fn test_plain_ticker() {
    let c = Contract::from_ticker("AAPL");
    assert_eq!(c.symbol, "AAPL");
    assert_eq!(c.sec_type, SecType::Stock);
  }
}
