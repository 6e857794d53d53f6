// twsbatch/src/sink.rs
// Callback surface handed to the gateway's background event thread.

use chrono::NaiveDate;
use log::{debug, info, trace, warn};
use std::sync::Arc;

use crate::data::{
  Bar, ContractDetailRow, ErrorRecord, FundamentalBlob, HistoricalBars, OrderRow, PositionRow,
  PriceTick,
};
use crate::pacing::PacingGuard;
use crate::queues::{QueueSenders, StreamEvent};
use crate::wait::SessionFlags;

/// Gateway error codes that indicate the transport itself dropped rather
/// than a problem with one request.
const CONNECTIVITY_LOST_CODES: [i32; 2] = [1100, 1300];

/// The only object the callback thread touches.
///
/// Every handler is a pure producer: a push onto the matching typed queue,
/// plus the pacing-flag and disconnect-flag updates. No orchestrator state
/// is mutated from here.
#[derive(Clone)]
pub struct EventSink {
  queues: QueueSenders,
  pacing: Arc<PacingGuard>,
  flags: SessionFlags,
}

impl EventSink {
  pub fn new(queues: QueueSenders, pacing: Arc<PacingGuard>, flags: SessionFlags) -> Self {
    EventSink { queues, pacing, flags }
  }

  /// A live tick from the primary quote stream.
  pub fn on_price_tick(&self, req_id: i32, price: f64) {
    trace!("Tick: ReqID={}, price={}", req_id, price);
    let _ = self.queues.price.send(PriceTick { req_id, price, live: true });
  }

  /// A last-close price, delivered when no shares have traded today.
  /// Routed to the backup queue; substitution there is a normal outcome.
  pub fn on_close_price(&self, req_id: i32, price: f64) {
    trace!("Close price: ReqID={}, price={}", req_id, price);
    let _ = self.queues.close_price.send(PriceTick { req_id, price, live: false });
  }

  /// The completed bar series for a historical request.
  pub fn on_historical_data(&self, req_id: i32, bars: Vec<(NaiveDate, f64)>) {
    debug!("Historical data: ReqID={}, {} bars", req_id, bars.len());
    let bars = bars.into_iter().map(|(date, close)| Bar { date, close }).collect();
    let _ = self.queues.historical.send(HistoricalBars { req_id, bars });
  }

  /// The raw fundamental-data document for a request.
  pub fn on_fundamental_data(&self, req_id: i32, xml: &str) {
    debug!("Fundamental data: ReqID={}, {} bytes", req_id, xml.len());
    let _ = self.queues.fundamental.send(FundamentalBlob { req_id, xml: xml.to_string() });
  }

  pub fn on_position(&self, row: PositionRow) {
    trace!("Position row: {} {}", row.symbol, row.position);
    let _ = self.queues.position.send(StreamEvent::Row(row));
  }

  pub fn on_position_end(&self) {
    debug!("Position snapshot complete");
    let _ = self.queues.position.send(StreamEvent::End);
  }

  pub fn on_open_order(&self, row: OrderRow) {
    trace!("Order row: {} {} {}", row.order_id, row.symbol, row.status);
    let _ = self.queues.order.send(StreamEvent::Row(row));
  }

  pub fn on_open_order_end(&self) {
    debug!("Open-order snapshot complete");
    let _ = self.queues.order.send(StreamEvent::End);
  }

  pub fn on_contract_detail(&self, row: ContractDetailRow) {
    trace!("Contract detail: ReqID={}, {}", row.req_id, row.symbol);
    let _ = self.queues.contract_detail.send(StreamEvent::Row(row));
  }

  pub fn on_contract_detail_end(&self, req_id: i32) {
    debug!("Contract details complete: ReqID={}", req_id);
    let _ = self.queues.contract_detail.send(StreamEvent::End);
  }

  /// An error event. Pacing violations arm the slowdown flag; connectivity
  /// codes mark the session disconnected; everything lands on the error
  /// queue for the orchestrator to attribute.
  pub fn on_error(&self, req_id: Option<i32>, code: i32, message: &str) {
    // TWS emits periodic "farm connection is OK" notices on the error
    // stream; they are not errors.
    if message.contains("farm connection is OK") {
      trace!("Gateway notice (code {}): {}", code, message);
      return;
    }
    let record = ErrorRecord::new(req_id, code, message);
    info!("Gateway error: ReqID={:?}, code={}, category={:?}: {}", req_id, code, record.category, message);
    self.pacing.observe(&record);
    if CONNECTIVITY_LOST_CODES.contains(&code) {
      warn!("Error code {} indicates lost connectivity", code);
      self.flags.mark_disconnected();
    }
    let _ = self.queues.error.send(record);
  }

  /// The transport dropped.
  pub fn on_disconnect(&self) {
    warn!("Gateway reported disconnect");
    self.flags.mark_disconnected();
  }

  /// The event-loop thread is terminating abnormally. Must be the thread's
  /// last call; waiters re-raise this instead of timing out blind.
  pub fn on_thread_fatal(&self, message: &str) {
    let _ = self.queues.thread_fatal.send(message.to_string());
    self.flags.mark_disconnected();
  }
}
