// twsbatch/src/client.rs
// Top-level handle wiring a gateway to the batch-fetch machinery.

use log::info;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::base::{GatewayError, RequestKind};
use crate::batch::{BatchFetcher, FetchConfig};
use crate::contract::Contract;
use crate::data::{ContractDetailRow, FetchOutcome, OrderRow, PositionRow};
use crate::gateway::Gateway;
use crate::pacing::PacingGuard;
use crate::queues::channels;
use crate::registry::SymbolRegistry;
use crate::sink::EventSink;
use crate::wait::SessionFlags;

/// First request id handed out when the gateway does not dictate one.
const DEFAULT_FIRST_REQ_ID: i32 = 1;

/// Owns the full request-correlation stack for one gateway session: the
/// id registry, the typed result queues, the pacing guard, and the batch
/// fetcher draped over them.
///
/// The sink handed to the gateway at construction is the only way events
/// enter; the client's methods are the only way results leave.
pub struct BatchClient {
  gateway: Arc<dyn Gateway>,
  fetcher: BatchFetcher,
  registry: Arc<SymbolRegistry>,
  flags: SessionFlags,
}

impl BatchClient {
  /// Wires the queues, registry, and pacing guard to `gateway`, hands it
  /// the event sink, and starts its event loop.
  pub fn connect(gateway: Arc<dyn Gateway>, config: FetchConfig) -> Result<Self, GatewayError> {
    Self::connect_from(gateway, config, DEFAULT_FIRST_REQ_ID)
  }

  /// As [`BatchClient::connect`], seeding the request-id space at
  /// `first_req_id` (gateways that announce a next-valid id on connect).
  pub fn connect_from(
    gateway: Arc<dyn Gateway>,
    config: FetchConfig,
    first_req_id: i32,
  ) -> Result<Self, GatewayError> {
    let (senders, receivers) = channels();
    let registry = Arc::new(SymbolRegistry::new(first_req_id));
    let pacing = Arc::new(PacingGuard::new(config.pacing_cooldown));
    let flags = SessionFlags::new(
      Arc::new(AtomicBool::new(false)),
      receivers.thread_fatal.clone(),
    );

    let sink = EventSink::new(senders, pacing.clone(), flags.clone());
    gateway.start(sink)?;
    info!("Batch client connected, first ReqID={}", first_req_id);

    let fetcher = BatchFetcher::new(
      gateway.clone(),
      registry.clone(),
      receivers,
      pacing,
      flags.clone(),
      config,
    );
    Ok(BatchClient { gateway, fetcher, registry, flags })
  }

  pub fn fetch(
    &self,
    symbols: &[String],
    kind: RequestKind,
    timeout_per_chunk: Duration,
  ) -> Result<FetchOutcome, GatewayError> {
    self.fetcher.fetch(symbols, kind, timeout_per_chunk)
  }

  pub fn fetch_prices(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetcher.fetch_prices(symbols, timeout_per_chunk)
  }

  pub fn fetch_fundamentals(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetcher.fetch_fundamentals(symbols, timeout_per_chunk)
  }

  pub fn fetch_historical(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetcher.fetch_historical(symbols, timeout_per_chunk)
  }

  pub fn positions(&self, timeout: Duration) -> Result<Vec<PositionRow>, GatewayError> {
    self.fetcher.positions(timeout)
  }

  pub fn open_orders(&self, timeout: Duration) -> Result<Vec<OrderRow>, GatewayError> {
    self.fetcher.open_orders(timeout)
  }

  pub fn contract_details(
    &self,
    contract: &Contract,
    timeout: Duration,
  ) -> Result<Vec<ContractDetailRow>, GatewayError> {
    self.fetcher.contract_details(contract, timeout)
  }

  /// Requests still awaiting resolution, mostly useful in diagnostics.
  pub fn outstanding_requests(&self) -> usize {
    self.registry.outstanding()
  }

  pub fn is_connected(&self) -> bool {
    self.gateway.is_connected() && !self.flags.is_disconnected()
  }

  pub fn disconnect(&self) -> Result<(), GatewayError> {
    info!("Batch client disconnecting");
    self.flags.mark_disconnected();
    self.gateway.disconnect()
  }
}
