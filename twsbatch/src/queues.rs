// twsbatch/src/queues.rs
// Typed FIFO queues between the callback thread and consumers.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::{
  ContractDetailRow, ErrorRecord, FundamentalBlob, HistoricalBars, OrderRow, PositionRow, PriceTick,
};

/// An element of a table-snapshot stream (positions, open orders,
/// contract details): rows followed by an end marker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
  Row(T),
  End,
}

/// Producer ends of every result queue. Owned by the [`crate::sink::EventSink`]
/// handed to the callback thread; nothing else sends.
#[derive(Clone)]
pub struct QueueSenders {
  pub price: Sender<PriceTick>,
  /// Backup channel: last-close prices for symbols with no trade today.
  pub close_price: Sender<PriceTick>,
  pub historical: Sender<HistoricalBars>,
  pub fundamental: Sender<FundamentalBlob>,
  pub position: Sender<StreamEvent<PositionRow>>,
  pub order: Sender<StreamEvent<OrderRow>>,
  pub contract_detail: Sender<StreamEvent<ContractDetailRow>>,
  pub error: Sender<ErrorRecord>,
  /// Side channel for panics/exits of the callback thread itself.
  pub thread_fatal: Sender<String>,
}

/// Consumer ends, owned by the orchestrator side.
pub struct ResponseQueues {
  pub price: Receiver<PriceTick>,
  pub close_price: Receiver<PriceTick>,
  pub historical: Receiver<HistoricalBars>,
  pub fundamental: Receiver<FundamentalBlob>,
  pub position: Receiver<StreamEvent<PositionRow>>,
  pub order: Receiver<StreamEvent<OrderRow>>,
  pub contract_detail: Receiver<StreamEvent<ContractDetailRow>>,
  pub error: Receiver<ErrorRecord>,
  pub thread_fatal: Receiver<String>,
}

/// Builds the full queue set. Unbounded: the producer is a single event
/// thread that must never block on a slow consumer.
pub fn channels() -> (QueueSenders, ResponseQueues) {
  let (price_tx, price_rx) = unbounded();
  let (close_tx, close_rx) = unbounded();
  let (hist_tx, hist_rx) = unbounded();
  let (fund_tx, fund_rx) = unbounded();
  let (pos_tx, pos_rx) = unbounded();
  let (order_tx, order_rx) = unbounded();
  let (detail_tx, detail_rx) = unbounded();
  let (err_tx, err_rx) = unbounded();
  let (fatal_tx, fatal_rx) = unbounded();

  let senders = QueueSenders {
    price: price_tx,
    close_price: close_tx,
    historical: hist_tx,
    fundamental: fund_tx,
    position: pos_tx,
    order: order_tx,
    contract_detail: detail_tx,
    error: err_tx,
    thread_fatal: fatal_tx,
  };
  let receivers = ResponseQueues {
    price: price_rx,
    close_price: close_rx,
    historical: hist_rx,
    fundamental: fund_rx,
    position: pos_rx,
    order: order_rx,
    contract_detail: detail_rx,
    error: err_rx,
    thread_fatal: fatal_rx,
  };
  (senders, receivers)
}
