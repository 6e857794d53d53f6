// twsbatch/src/gateway.rs
// Boundary to the external broker-gateway client library.

use crate::base::GatewayError;
use crate::contract::Contract;
use crate::sink::EventSink;

/// A request as handed to the gateway. The wire encoding is the gateway
/// implementation's concern.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
  /// Snapshot market data for one contract.
  MarketPrice { contract: Contract },
  /// Daily bars covering `duration`, e.g. "1 Y" or "6 M".
  HistoricalBars { contract: Contract, duration: String },
  /// Fundamental-data document, e.g. report type "ReportsFinStatements".
  Fundamentals { contract: Contract, report_type: String },
  /// Account position table. Rows stream back, then an end marker.
  Positions,
  /// Open-order table for this client id. Rows stream back, then an end marker.
  OpenOrders,
  /// All contracts matching a partial description (warrant chains etc.).
  ContractDetails { contract: Contract },
}

/// Interface the external gateway client library must provide.
///
/// All requests are fire-and-forget; results and errors come back through
/// the [`EventSink`] handed to `start`, invoked from a single background
/// event-loop thread owned by the implementation.
pub trait Gateway: Send + Sync {
  /// Hands the implementation its callback sink and starts the event loop.
  /// Must be called exactly once before any dispatch.
  fn start(&self, sink: EventSink) -> Result<(), GatewayError>;

  /// Issues a request under a caller-allocated request id.
  fn dispatch(&self, req_id: i32, request: &GatewayRequest) -> Result<(), GatewayError>;

  fn is_connected(&self) -> bool;

  fn disconnect(&self) -> Result<(), GatewayError>;
}
