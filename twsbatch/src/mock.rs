// twsbatch/src/mock.rs
// Scripted in-memory gateway for tests and offline development.

use chrono::NaiveDate;
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::base::GatewayError;
use crate::contract::Contract;
use crate::data::{ContractDetailRow, OrderRow, PositionRow};
use crate::gateway::{Gateway, GatewayRequest};
use crate::sink::EventSink;

/// One scripted response for a symbol. Replies for a symbol are consumed
/// front-to-back across dispatches, so a script can make the first attempt
/// fail and a retry succeed.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
  LiveTick(f64),
  /// Delivered on the backup close-price path, as the gateway does for
  /// symbols with no trade today.
  ClosePrice(f64),
  HistoricalSeries(Vec<(NaiveDate, f64)>),
  FundamentalXml(String),
  Error { code: i32, message: String },
  /// No reply at all; the request times out.
  Silence,
}

/// A [`Gateway`] that replays scripted replies instead of talking to a
/// broker. Replies are emitted synchronously from `dispatch` through the
/// same [`EventSink`] a real event thread would use, which keeps tests
/// deterministic while exercising the full queue-and-drain path.
#[derive(Default)]
pub struct ScriptedGateway {
  scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
  positions: Mutex<Vec<PositionRow>>,
  orders: Mutex<Vec<OrderRow>>,
  contract_details: Mutex<HashMap<String, Vec<ContractDetailRow>>>,
  sink: Mutex<Option<EventSink>>,
  connected: AtomicBool,
  dispatched: Mutex<Vec<(i32, GatewayRequest)>>,
}

impl ScriptedGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends replies to a symbol's script.
  pub fn script(&self, symbol: &str, replies: Vec<ScriptedReply>) {
    self
      .scripts
      .lock()
      .entry(symbol.to_string())
      .or_default()
      .extend(replies);
  }

  pub fn set_positions(&self, rows: Vec<PositionRow>) {
    *self.positions.lock() = rows;
  }

  pub fn set_orders(&self, rows: Vec<OrderRow>) {
    *self.orders.lock() = rows;
  }

  pub fn set_contract_details(&self, symbol: &str, rows: Vec<ContractDetailRow>) {
    self.contract_details.lock().insert(symbol.to_string(), rows);
  }

  /// Every dispatch seen so far, in order.
  pub fn dispatched(&self) -> Vec<(i32, GatewayRequest)> {
    self.dispatched.lock().clone()
  }

  pub fn dispatch_count(&self) -> usize {
    self.dispatched.lock().len()
  }

  /// Simulates the transport dropping out from under the client.
  pub fn drop_connection(&self) {
    self.connected.store(false, Ordering::SeqCst);
    if let Some(sink) = self.sink.lock().as_ref() {
      sink.on_disconnect();
    }
  }

  /// Simulates the event-loop thread dying with an error.
  pub fn kill_event_thread(&self, message: &str) {
    if let Some(sink) = self.sink.lock().as_ref() {
      sink.on_thread_fatal(message);
    }
  }

  fn reply_for(&self, contract: &Contract) -> Option<ScriptedReply> {
    self
      .scripts
      .lock()
      .get_mut(&contract.symbol)
      .and_then(|queue| queue.pop_front())
  }

  fn emit(&self, sink: &EventSink, req_id: i32, contract: &Contract) {
    match self.reply_for(contract) {
      Some(ScriptedReply::LiveTick(price)) => sink.on_price_tick(req_id, price),
      Some(ScriptedReply::ClosePrice(price)) => sink.on_close_price(req_id, price),
      Some(ScriptedReply::HistoricalSeries(bars)) => sink.on_historical_data(req_id, bars),
      Some(ScriptedReply::FundamentalXml(xml)) => sink.on_fundamental_data(req_id, &xml),
      Some(ScriptedReply::Error { code, message }) => sink.on_error(Some(req_id), code, &message),
      Some(ScriptedReply::Silence) => {
        trace!("Scripted silence for {} (ReqID={})", contract.symbol, req_id)
      }
      // Unscripted symbols behave like unknown tickers.
      None => sink.on_error(
        Some(req_id),
        200,
        "No security definition has been found for the request",
      ),
    }
  }
}

impl Gateway for ScriptedGateway {
  fn start(&self, sink: EventSink) -> Result<(), GatewayError> {
    *self.sink.lock() = Some(sink);
    self.connected.store(true, Ordering::SeqCst);
    debug!("ScriptedGateway started");
    Ok(())
  }

  fn dispatch(&self, req_id: i32, request: &GatewayRequest) -> Result<(), GatewayError> {
    if !self.connected.load(Ordering::SeqCst) {
      return Err(GatewayError::NotConnected);
    }
    self.dispatched.lock().push((req_id, request.clone()));
    let sink_guard = self.sink.lock();
    let sink = sink_guard
      .as_ref()
      .ok_or_else(|| GatewayError::InternalError("dispatch before start".to_string()))?;

    match request {
      GatewayRequest::MarketPrice { contract }
      | GatewayRequest::HistoricalBars { contract, .. }
      | GatewayRequest::Fundamentals { contract, .. } => self.emit(sink, req_id, contract),
      GatewayRequest::Positions => {
        for row in self.positions.lock().iter() {
          sink.on_position(row.clone());
        }
        sink.on_position_end();
      }
      GatewayRequest::OpenOrders => {
        for row in self.orders.lock().iter() {
          sink.on_open_order(row.clone());
        }
        sink.on_open_order_end();
      }
      GatewayRequest::ContractDetails { contract } => {
        let details = self.contract_details.lock();
        for row in details.get(&contract.symbol).into_iter().flatten() {
          sink.on_contract_detail(row.clone());
        }
        sink.on_contract_detail_end(req_id);
      }
    }
    Ok(())
  }

  fn is_connected(&self) -> bool {
    self.connected.load(Ordering::SeqCst)
  }

  fn disconnect(&self) -> Result<(), GatewayError> {
    self.connected.store(false, Ordering::SeqCst);
    debug!("ScriptedGateway disconnected");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pacing::PacingGuard;
  use crate::queues::channels;
  use crate::wait::SessionFlags;
  use std::sync::Arc;

  fn started() -> (ScriptedGateway, crate::queues::ResponseQueues) {
    let gateway = ScriptedGateway::new();
    let (tx, rx) = channels();
    let flags = SessionFlags::new(Arc::new(AtomicBool::new(false)), rx.thread_fatal.clone());
    let sink = EventSink::new(tx, Arc::new(PacingGuard::default()), flags);
    gateway.start(sink).unwrap();
    (gateway, rx)
  }

  #[test]
  fn test_script_consumed_in_order() {
    let (gateway, rx) = started();
    gateway.script(
      "ACME",
      vec![
        ScriptedReply::Error { code: 162, message: "pacing violation".into() },
        ScriptedReply::LiveTick(42.0),
      ],
    );
    let request = GatewayRequest::MarketPrice { contract: Contract::stock("ACME") };
    gateway.dispatch(1, &request).unwrap();
    gateway.dispatch(2, &request).unwrap();
    assert_eq!(rx.error.try_recv().unwrap().code, 162);
    assert_eq!(rx.price.try_recv().unwrap().price, 42.0);
  }

  #[test]
  fn test_unscripted_symbol_gets_no_security_def() {
    let (gateway, rx) = started();
    let request = GatewayRequest::MarketPrice { contract: Contract::stock("NOPE") };
    gateway.dispatch(9, &request).unwrap();
    let err = rx.error.try_recv().unwrap();
    assert_eq!(err.code, 200);
    assert_eq!(err.req_id, Some(9));
  }

  #[test]
  fn test_dispatch_refused_when_disconnected() {
    let (gateway, _rx) = started();
    gateway.disconnect().unwrap();
    let request = GatewayRequest::Positions;
    assert!(matches!(gateway.dispatch(1, &request), Err(GatewayError::NotConnected)));
  }
}
