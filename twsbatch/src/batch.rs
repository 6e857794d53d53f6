// twsbatch/src/batch.rs
// Batch-fetch orchestration: chunked dispatch, queue drain, pacing retry.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::base::{GatewayError, RequestKind};
use crate::contract::Contract;
use crate::data::{ContractDetailRow, ErrorRecord, FetchOutcome, OrderRow, PositionRow, ResultRecord};
use crate::gateway::{Gateway, GatewayRequest};
use crate::pacing::PacingGuard;
use crate::queues::{ResponseQueues, StreamEvent};
use crate::registry::SymbolRegistry;
use crate::wait::{block_on_every, SessionFlags};

/// Tuning knobs for batch fetching. The chunk ceilings come from the
/// gateway's published request-rate limits; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct FetchConfig {
  /// Max market-data snapshot requests per second.
  pub price_chunk: usize,
  /// Max fundamental-data requests per second. The gateway paces these
  /// aggressively, hence the tiny ceiling.
  pub fundamental_chunk: usize,
  /// Max historical-data requests per second.
  pub historical_chunk: usize,
  /// Wall-clock pause between chunk dispatches.
  pub inter_chunk_delay: Duration,
  /// Sleep served before the next chunk once a pacing violation is seen.
  pub pacing_cooldown: Duration,
  /// Poll interval while draining result queues.
  pub drain_poll: Duration,
  /// Bar span requested for historical fetches.
  pub historical_duration: String,
  /// Report type requested for fundamental fetches.
  pub fundamental_report_type: String,
}

impl Default for FetchConfig {
  fn default() -> Self {
    FetchConfig {
      price_chunk: 100,
      fundamental_chunk: 2,
      historical_chunk: 40,
      inter_chunk_delay: Duration::from_secs(1),
      pacing_cooldown: crate::pacing::DEFAULT_COOLDOWN,
      drain_poll: Duration::from_millis(10),
      historical_duration: "1 Y".to_string(),
      fundamental_report_type: "ReportsFinStatements".to_string(),
    }
  }
}

impl FetchConfig {
  /// Rate-limit-safe chunk size for a batchable request kind.
  fn chunk_size(&self, kind: RequestKind) -> Result<usize, GatewayError> {
    match kind {
      RequestKind::Price => Ok(self.price_chunk),
      RequestKind::Fundamental => Ok(self.fundamental_chunk),
      RequestKind::Historical => Ok(self.historical_chunk),
      other => Err(GatewayError::InvalidParameter(format!(
        "{} requests are not batchable by symbol",
        other
      ))),
    }
  }
}

/// Splits a symbol list into rate-limit-safe chunks, preserving order.
pub(crate) fn make_chunks(symbols: &[String], size: usize) -> Vec<Vec<String>> {
  symbols.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

/// Dedupes a symbol list preserving first-seen order. Duplicate input
/// symbols are idempotent: one request, one outcome entry.
fn dedupe(symbols: &[String]) -> Vec<String> {
  let mut seen = HashSet::new();
  symbols
    .iter()
    .filter(|s| seen.insert(s.as_str()))
    .cloned()
    .collect()
}

/// Turns asynchronous, error-prone, rate-limited callback traffic into
/// blocking batch operations with quantified partial-failure reporting.
pub struct BatchFetcher {
  gateway: Arc<dyn Gateway>,
  registry: Arc<SymbolRegistry>,
  queues: ResponseQueues,
  pacing: Arc<PacingGuard>,
  flags: SessionFlags,
  config: FetchConfig,
}

impl BatchFetcher {
  pub fn new(
    gateway: Arc<dyn Gateway>,
    registry: Arc<SymbolRegistry>,
    queues: ResponseQueues,
    pacing: Arc<PacingGuard>,
    flags: SessionFlags,
    config: FetchConfig,
  ) -> Self {
    BatchFetcher { gateway, registry, queues, pacing, flags, config }
  }

  pub fn config(&self) -> &FetchConfig {
    &self.config
  }

  /// Fetches one kind of data for a symbol list.
  ///
  /// Every submitted symbol lands in exactly one of the outcome's two maps:
  /// data, or issues with the reason. Pacing-only failures are retried once
  /// as a second, smaller pass before the outcome is final. Disconnects and
  /// callback-thread death abort the whole batch with an error instead.
  pub fn fetch(
    &self,
    symbols: &[String],
    kind: RequestKind,
    timeout_per_chunk: Duration,
  ) -> Result<FetchOutcome, GatewayError> {
    if symbols.is_empty() {
      return Ok(FetchOutcome::default());
    }
    if !self.gateway.is_connected() {
      return Err(GatewayError::NotConnected);
    }
    let unique = dedupe(symbols);
    info!("Batch fetch: {} unique symbols, kind={}", unique.len(), kind);

    let mut outcome = self.run_pass(&unique, kind, timeout_per_chunk)?;

    // One follow-up pass for symbols whose only issue was a pacing
    // violation. Issues that persist keep their retry-preserved message.
    let try_agains = outcome.pacing_only_symbols();
    if !try_agains.is_empty() {
      info!("Retrying {} symbols after pacing violations", try_agains.len());
      let retry = self.run_pass(&try_agains, kind, timeout_per_chunk)?;
      outcome.absorb_retry(retry);
    }

    debug_assert_eq!(outcome.settled(), unique.len());
    info!(
      "Batch fetch complete: {} ok, {} issues",
      outcome.data.len(),
      outcome.issues.len()
    );
    Ok(outcome)
  }

  /// Typed convenience wrappers over [`BatchFetcher::fetch`].
  pub fn fetch_prices(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetch(symbols, RequestKind::Price, timeout_per_chunk)
  }

  pub fn fetch_fundamentals(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetch(symbols, RequestKind::Fundamental, timeout_per_chunk)
  }

  pub fn fetch_historical(&self, symbols: &[String], timeout_per_chunk: Duration) -> Result<FetchOutcome, GatewayError> {
    self.fetch(symbols, RequestKind::Historical, timeout_per_chunk)
  }

  // --- Single-pass dispatch + drain ---

  fn run_pass(
    &self,
    symbols: &[String],
    kind: RequestKind,
    timeout_per_chunk: Duration,
  ) -> Result<FetchOutcome, GatewayError> {
    let chunk_size = self.config.chunk_size(kind)?;
    let chunks = make_chunks(symbols, chunk_size);
    let n_chunks = chunks.len();
    let mut req_ids = Vec::with_capacity(symbols.len());

    for (i, chunk) in chunks.iter().enumerate() {
      // Consume the slowdown flag before each chunk: exactly one cooldown
      // sleep per observed pacing burst.
      if let Some(cooldown) = self.pacing.take_cooldown() {
        std::thread::sleep(cooldown);
      }
      self.flags.check()?;
      debug!("Dispatching chunk {}/{} ({} symbols)", i + 1, n_chunks, chunk.len());
      for symbol in chunk {
        let request = self.request_for(kind, symbol)?;
        let req_id = self.registry.allocate(symbol, kind);
        self.gateway.dispatch(req_id, &request)?;
        req_ids.push(req_id);
      }
      // Rate-limit by elapsed wall time, not request count alone.
      std::thread::sleep(self.config.inter_chunk_delay);
    }

    let deadline = timeout_per_chunk * (n_chunks.max(1) as u32);
    let result = self.drain(symbols, kind, deadline);

    // Whatever is still outstanding is abandoned: late arrivals become
    // orphan resolves rather than leaking registry entries.
    self.registry.forget(&req_ids);
    result
  }

  fn request_for(&self, kind: RequestKind, symbol: &str) -> Result<GatewayRequest, GatewayError> {
    let contract = Contract::from_ticker(symbol);
    match kind {
      RequestKind::Price => Ok(GatewayRequest::MarketPrice { contract }),
      RequestKind::Historical => Ok(GatewayRequest::HistoricalBars {
        contract,
        duration: self.config.historical_duration.clone(),
      }),
      RequestKind::Fundamental => Ok(GatewayRequest::Fundamentals {
        contract,
        report_type: self.config.fundamental_report_type.clone(),
      }),
      other => Err(GatewayError::InvalidParameter(format!(
        "{} requests are not batchable by symbol",
        other
      ))),
    }
  }

  /// Drains result and error queues until every symbol is settled or the
  /// deadline passes.
  ///
  /// Completion is judged by settled count, never by queue emptiness: an
  /// empty queue can be a transient race with the producer thread. Symbols
  /// the gateway silently drops are settled as timeout issues at the
  /// deadline.
  fn drain(
    &self,
    symbols: &[String],
    kind: RequestKind,
    deadline: Duration,
  ) -> Result<FetchOutcome, GatewayError> {
    let mut outcome = FetchOutcome::default();
    let start = Instant::now();

    loop {
      self.flags.check()?;

      // Error queue first so a data/error race for the same symbol is
      // decided by record_data's data-wins rule, not arrival order.
      while let Ok(err) = self.queues.error.try_recv() {
        self.attribute_error(&mut outcome, err);
      }

      let drained_any = self.drain_results(&mut outcome, kind);

      if outcome.settled() >= symbols.len() {
        break;
      }

      // Primary queue exhausted but symbols remain: consult the backup
      // queue. A last-close price for a symbol with no trade today is a
      // normal outcome, not an error.
      if !drained_any && kind == RequestKind::Price {
        while let Ok(tick) = self.queues.close_price.try_recv() {
          if let Some(symbol) = self.registry.peek_symbol(tick.req_id) {
            if !outcome.has_symbol(&symbol) {
              info!("Using backup close price for {}", symbol);
              outcome.record_data(&symbol, ResultRecord::Price(tick));
            }
          }
        }
        if outcome.settled() >= symbols.len() {
          break;
        }
      }

      if start.elapsed() >= deadline {
        warn!(
          "Batch drain deadline ({:?}) reached with {}/{} symbols settled",
          deadline,
          outcome.settled(),
          symbols.len()
        );
        break;
      }
      std::thread::sleep(self.config.drain_poll);
    }

    // Symbols that produced no queue entry at all must still be resolved
    // before returning.
    for symbol in symbols {
      if !outcome.has_symbol(symbol) {
        outcome.record_issue(
          symbol,
          ErrorRecord::new(None, 0, "no response from gateway before deadline"),
        );
      }
    }
    Ok(outcome)
  }

  /// Non-blocking sweep of the primary result queue for `kind`. Returns
  /// whether anything was drained.
  fn drain_results(&self, outcome: &mut FetchOutcome, kind: RequestKind) -> bool {
    let mut drained = false;
    match kind {
      RequestKind::Price => {
        while let Ok(tick) = self.queues.price.try_recv() {
          drained = true;
          if let Some(pending) = self.registry.resolve(tick.req_id) {
            outcome.record_data(&pending.symbol, ResultRecord::Price(tick));
          }
        }
      }
      RequestKind::Historical => {
        while let Ok(series) = self.queues.historical.try_recv() {
          drained = true;
          if let Some(pending) = self.registry.resolve(series.req_id) {
            outcome.record_data(&pending.symbol, ResultRecord::Historical(series));
          }
        }
      }
      RequestKind::Fundamental => {
        while let Ok(blob) = self.queues.fundamental.try_recv() {
          drained = true;
          if let Some(pending) = self.registry.resolve(blob.req_id) {
            outcome.record_data(&pending.symbol, ResultRecord::Fundamental(blob));
          }
        }
      }
      _ => {}
    }
    drained
  }

  /// Attributes an error record to its symbol via the registry.
  ///
  /// The registry entry is peeked, not consumed: data for the same request
  /// may still arrive and wins the race if it does. Entries left behind are
  /// swept by `forget` when the pass ends.
  fn attribute_error(&self, outcome: &mut FetchOutcome, err: ErrorRecord) {
    match err.req_id {
      Some(req_id) => {
        if let Some(symbol) = self.registry.peek_symbol(req_id) {
          debug!("Issue for {}: {} ({:?})", symbol, err.message, err.category);
          outcome.record_issue(&symbol, err);
        } else {
          debug!("Error for unknown/settled ReqID {}: {}", req_id, err.message);
        }
      }
      None => {
        // Connection-level errors are not per-symbol issues; the flags
        // check surfaces disconnects as batch aborts.
        debug!("Connection-level error (code {}): {}", err.code, err.message);
      }
    }
  }

  // --- Table-snapshot fetches (positions, open orders) ---

  /// Fetches the account position table. Rows stream from the callback
  /// thread until the end marker; bounded by `timeout`.
  pub fn positions(&self, timeout: Duration) -> Result<Vec<PositionRow>, GatewayError> {
    let req_id = self.registry.allocate("", RequestKind::Position);
    self.gateway.dispatch(req_id, &GatewayRequest::Positions)?;

    let mut rows = Vec::new();
    let result = block_on_every(
      || {
        while let Ok(event) = self.queues.position.try_recv() {
          match event {
            StreamEvent::Row(row) => rows.push(row),
            StreamEvent::End => return Some(()),
          }
        }
        None
      },
      timeout,
      self.config.drain_poll,
      &self.flags,
    );
    self.registry.forget(&[req_id]);
    result?;
    info!("Position snapshot: {} rows", rows.len());
    Ok(rows)
  }

  /// Fetches this client's open-order table.
  pub fn open_orders(&self, timeout: Duration) -> Result<Vec<OrderRow>, GatewayError> {
    let req_id = self.registry.allocate("", RequestKind::Order);
    self.gateway.dispatch(req_id, &GatewayRequest::OpenOrders)?;

    let mut rows = Vec::new();
    let result = block_on_every(
      || {
        while let Ok(event) = self.queues.order.try_recv() {
          match event {
            StreamEvent::Row(row) => rows.push(row),
            StreamEvent::End => return Some(()),
          }
        }
        None
      },
      timeout,
      self.config.drain_poll,
      &self.flags,
    );
    self.registry.forget(&[req_id]);
    result?;
    info!("Open-order snapshot: {} rows", rows.len());
    Ok(rows)
  }

  /// Looks up all contracts matching a partial description, e.g. the
  /// warrant chain for an underlying symbol.
  pub fn contract_details(
    &self,
    contract: &Contract,
    timeout: Duration,
  ) -> Result<Vec<ContractDetailRow>, GatewayError> {
    let req_id = self.registry.allocate(&contract.symbol, RequestKind::ContractDetail);
    self
      .gateway
      .dispatch(req_id, &GatewayRequest::ContractDetails { contract: contract.clone() })?;

    let mut rows = Vec::new();
    let result = block_on_every(
      || {
        while let Ok(event) = self.queues.contract_detail.try_recv() {
          match event {
            StreamEvent::Row(row) => rows.push(row),
            StreamEvent::End => return Some(()),
          }
        }
        None
      },
      timeout,
      self.config.drain_poll,
      &self.flags,
    );
    self.registry.forget(&[req_id]);
    result?;
    info!("Contract details for {}: {} matches", contract.symbol, rows.len());
    Ok(rows)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::ErrorCategory;
  use crate::mock::{ScriptedGateway, ScriptedReply};
  use crate::queues::channels;
  use crate::sink::EventSink;
  use std::sync::atomic::AtomicBool;

  fn syms(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SYM{}", i)).collect()
  }

  fn quick_config() -> FetchConfig {
    FetchConfig {
      inter_chunk_delay: Duration::from_millis(1),
      pacing_cooldown: Duration::from_millis(1),
      drain_poll: Duration::from_millis(1),
      ..FetchConfig::default()
    }
  }

  fn harness(gateway: Arc<ScriptedGateway>, config: FetchConfig) -> BatchFetcher {
    let _ = env_logger::builder().is_test(true).try_init();
    let (senders, receivers) = channels();
    let registry = Arc::new(SymbolRegistry::new(1));
    let pacing = Arc::new(PacingGuard::new(config.pacing_cooldown));
    let flags = SessionFlags::new(
      Arc::new(AtomicBool::new(false)),
      receivers.thread_fatal.clone(),
    );
    let sink = EventSink::new(senders, pacing.clone(), flags.clone());
    gateway.start(sink).unwrap();
    BatchFetcher::new(gateway, registry, receivers, pacing, flags, config)
  }

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_live_tick_plus_backup_close() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.script("AAA", vec![ScriptedReply::LiveTick(50.0)]);
    // BBB had no trade today; only a stale close arrives, on the backup queue.
    gateway.script("BBB", vec![ScriptedReply::ClosePrice(12.5)]);
    let fetcher = harness(gateway, quick_config());

    let outcome = fetcher.fetch_prices(&names(&["AAA", "BBB"]), Duration::from_secs(1)).unwrap();
    assert!(outcome.issues.is_empty());
    match outcome.data.get("AAA") {
      Some(ResultRecord::Price(tick)) => assert!(tick.live),
      other => panic!("expected live price for AAA, got {:?}", other),
    }
    match outcome.data.get("BBB") {
      Some(ResultRecord::Price(tick)) => {
        assert!(!tick.live);
        assert_eq!(tick.price, 12.5);
      }
      other => panic!("expected backup close for BBB, got {:?}", other),
    }
  }

  #[test]
  fn test_invalid_symbol_lands_in_issues() {
    let gateway = Arc::new(ScriptedGateway::new());
    let fetcher = harness(gateway, quick_config());

    let outcome = fetcher.fetch_prices(&names(&["ZZZ"]), Duration::from_secs(1)).unwrap();
    assert!(outcome.data.is_empty());
    let issue = outcome.issues.get("ZZZ").expect("ZZZ should be an issue");
    assert_eq!(issue.category, ErrorCategory::PermanentSymbol);
    assert_eq!(issue.code, 200);
  }

  #[test]
  fn test_pacing_violation_retried_once() {
    let gateway = Arc::new(ScriptedGateway::new());
    for symbol in ["AAA", "BBB"] {
      gateway.script(
        symbol,
        vec![
          ScriptedReply::Error { code: 162, message: "Fundamentals pacing violation".into() },
          ScriptedReply::FundamentalXml("<ReportFinancialStatements/>".into()),
        ],
      );
    }
    let fetcher = harness(gateway.clone(), quick_config());

    let outcome = fetcher
      .fetch_fundamentals(&names(&["AAA", "BBB"]), Duration::from_secs(1))
      .unwrap();
    assert!(outcome.issues.is_empty());
    assert!(outcome.has_symbol("AAA") && outcome.has_symbol("BBB"));
    // One dispatch per symbol per pass, exactly two passes.
    assert_eq!(gateway.dispatch_count(), 4);
  }

  #[test]
  fn test_pacing_burst_costs_one_cooldown() {
    let gateway = Arc::new(ScriptedGateway::new());
    let symbols = syms(5);
    for symbol in &symbols {
      gateway.script(
        symbol,
        vec![
          ScriptedReply::Error { code: 162, message: "Fundamentals pacing violation".into() },
          ScriptedReply::FundamentalXml("<x/>".into()),
        ],
      );
    }
    let mut config = quick_config();
    config.fundamental_chunk = 2;
    let fetcher = harness(gateway.clone(), config);

    let outcome = fetcher.fetch_fundamentals(&symbols, Duration::from_secs(1)).unwrap();
    // Five violations collapse into one retry pass that settles everything.
    assert_eq!(outcome.data.len(), 5);
    assert!(outcome.issues.is_empty());
    assert_eq!(gateway.dispatch_count(), 10);
    // The slowdown flag was consumed by the retry pass, not left armed.
    assert!(!fetcher.pacing.is_slowed());
  }

  #[test]
  fn test_persistent_pacing_failure_keeps_issue() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.script(
      "AAA",
      vec![
        ScriptedReply::Error { code: 162, message: "pacing violation".into() },
        ScriptedReply::Error { code: 162, message: "pacing violation".into() },
      ],
    );
    let fetcher = harness(gateway.clone(), quick_config());

    let outcome = fetcher.fetch_prices(&names(&["AAA"]), Duration::from_secs(1)).unwrap();
    assert!(outcome.data.is_empty());
    assert!(outcome.issues.get("AAA").unwrap().is_pacing());
    // Retried once, not forever.
    assert_eq!(gateway.dispatch_count(), 2);
  }

  #[test]
  fn test_every_symbol_settles_exactly_once() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.script("GOOD", vec![ScriptedReply::LiveTick(10.0)]);
    gateway.script("MUTE", vec![ScriptedReply::Silence]);
    let fetcher = harness(gateway, quick_config());

    let outcome = fetcher
      .fetch_prices(&names(&["GOOD", "MUTE", "BAD"]), Duration::from_millis(80))
      .unwrap();
    assert_eq!(outcome.settled(), 3);
    assert!(outcome.data.contains_key("GOOD"));
    assert!(outcome.issues.contains_key("BAD"));
    // The silent symbol settles as a timeout issue at the deadline.
    assert!(outcome.issues.get("MUTE").unwrap().message.contains("deadline"));
  }

  #[test]
  fn test_duplicate_symbols_collapse() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.script("AAA", vec![ScriptedReply::LiveTick(5.0)]);
    let fetcher = harness(gateway.clone(), quick_config());

    let outcome = fetcher.fetch_prices(&names(&["AAA", "AAA", "AAA"]), Duration::from_secs(1)).unwrap();
    assert_eq!(outcome.settled(), 1);
    assert_eq!(gateway.dispatch_count(), 1);
  }

  #[test]
  fn test_large_fundamental_batch_dispatches_all() {
    let gateway = Arc::new(ScriptedGateway::new());
    let symbols = syms(250);
    for symbol in &symbols {
      gateway.script(symbol, vec![ScriptedReply::FundamentalXml("<x/>".into())]);
    }
    let mut config = quick_config();
    config.fundamental_chunk = 2;
    let fetcher = harness(gateway.clone(), config);

    let outcome = fetcher.fetch_fundamentals(&symbols, Duration::from_secs(1)).unwrap();
    assert_eq!(outcome.data.len(), 250);
    assert!(outcome.issues.is_empty());

    // Dispatch order follows submission order, ids strictly increase, and
    // every request carries the fundamental report type.
    let dispatched = gateway.dispatched();
    assert_eq!(dispatched.len(), 250);
    for (i, (req_id, request)) in dispatched.iter().enumerate() {
      match request {
        GatewayRequest::Fundamentals { contract, report_type } => {
          assert_eq!(contract.symbol, symbols[i]);
          assert_eq!(report_type, "ReportsFinStatements");
        }
        other => panic!("expected fundamental request, got {:?}", other),
      }
      if i > 0 {
        assert!(*req_id > dispatched[i - 1].0);
      }
    }
  }

  #[test]
  fn test_disconnect_mid_drain_aborts_batch() {
    let gateway = Arc::new(ScriptedGateway::new());
    // AAA never answers, so the fetch is parked in the drain loop when the
    // transport drops.
    gateway.script("AAA", vec![ScriptedReply::Silence]);
    let fetcher = harness(gateway.clone(), quick_config());

    let dropper = std::thread::spawn({
      let gateway = gateway.clone();
      move || {
        std::thread::sleep(Duration::from_millis(30));
        gateway.drop_connection();
      }
    });

    let result = fetcher.fetch_prices(&names(&["AAA"]), Duration::from_secs(5));
    dropper.join().unwrap();
    // A batch-level abort, not a per-symbol issue.
    assert!(matches!(result, Err(GatewayError::Disconnected(_))));
  }

  #[test]
  fn test_thread_fatal_aborts_batch() {
    let gateway = Arc::new(ScriptedGateway::new());
    let fetcher = harness(gateway.clone(), quick_config());
    gateway.kill_event_thread("event loop panicked");

    let result = fetcher.fetch_prices(&names(&["AAA"]), Duration::from_secs(1));
    match result {
      Err(GatewayError::ThreadFatal(msg)) => assert!(msg.contains("panicked")),
      other => panic!("expected ThreadFatal, got {:?}", other),
    }
  }

  #[test]
  fn test_historical_series_resolves() {
    use chrono::NaiveDate;
    let gateway = Arc::new(ScriptedGateway::new());
    let bars = vec![
      (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 100.0),
      (NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 101.5),
    ];
    gateway.script("AAA", vec![ScriptedReply::HistoricalSeries(bars)]);
    let fetcher = harness(gateway, quick_config());

    let outcome = fetcher.fetch_historical(&names(&["AAA"]), Duration::from_secs(1)).unwrap();
    match outcome.data.get("AAA") {
      Some(ResultRecord::Historical(series)) => assert_eq!(series.bars.len(), 2),
      other => panic!("expected bars for AAA, got {:?}", other),
    }
  }

  #[test]
  fn test_positions_snapshot() {
    use crate::data::PositionRow;
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.set_positions(vec![PositionRow {
      symbol: "AAA".into(),
      sec_type: "STK".into(),
      currency: "USD".into(),
      position: 100.0,
      avg_cost: 12.0,
    }]);
    let fetcher = harness(gateway, quick_config());

    let rows = fetcher.positions(Duration::from_secs(1)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "AAA");
  }

  #[test]
  fn test_open_orders_snapshot() {
    use crate::data::OrderRow;
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.set_orders(vec![
      OrderRow {
        order_id: 7,
        symbol: "AAA".into(),
        sec_type: "STK".into(),
        action: "BUY".into(),
        quantity: 100.0,
        status: "Submitted".into(),
      },
      OrderRow {
        order_id: 8,
        symbol: "BBB".into(),
        sec_type: "STK".into(),
        action: "SELL".into(),
        quantity: 50.0,
        status: "PreSubmitted".into(),
      },
    ]);
    let fetcher = harness(gateway, quick_config());

    let rows = fetcher.open_orders(Duration::from_secs(1)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].order_id, 7);
    assert_eq!(rows[1].status, "PreSubmitted");
  }

  #[test]
  fn test_contract_details_snapshot() {
    use crate::data::ContractDetailRow;
    use chrono::NaiveDate;
    let gateway = Arc::new(ScriptedGateway::new());
    // A warrant chain for the underlying.
    gateway.set_contract_details(
      "ACME",
      vec![ContractDetailRow {
        req_id: 0,
        symbol: "ACME WS".into(),
        sec_type: "WAR".into(),
        strike: Some(11.5),
        right: Some("C".into()),
        multiplier: Some("1".into()),
        last_trade_date: NaiveDate::from_ymd_opt(2027, 6, 30),
      }],
    );
    let fetcher = harness(gateway, quick_config());

    let contract = Contract::stock("ACME");
    let rows = fetcher.contract_details(&contract, Duration::from_secs(1)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sec_type, "WAR");
    assert_eq!(rows[0].strike, Some(11.5));
  }

  #[test]
  fn test_unmatched_underlying_yields_empty_chain() {
    let gateway = Arc::new(ScriptedGateway::new());
    let fetcher = harness(gateway, quick_config());

    let contract = Contract::stock("NOPE");
    let rows = fetcher.contract_details(&contract, Duration::from_secs(1)).unwrap();
    assert!(rows.is_empty());
  }

  #[test]
  fn test_chunks_respect_ceiling() {
    for (len, size) in [(250, 2), (10, 100), (101, 100), (0, 40)] {
      let chunks = make_chunks(&syms(len), size);
      assert!(chunks.iter().all(|c| c.len() <= size));
      let total: usize = chunks.iter().map(|c| c.len()).sum();
      assert_eq!(total, len);
    }
  }

  #[test]
  fn test_250_fundamentals_make_125_chunks() {
    let chunks = make_chunks(&syms(250), 2);
    assert_eq!(chunks.len(), 125);
    assert!(chunks.iter().all(|c| c.len() == 2));
  }

  #[test]
  fn test_dedupe_preserves_order() {
    let input: Vec<String> = ["B", "A", "B", "C", "A"].iter().map(|s| s.to_string()).collect();
    assert_eq!(dedupe(&input), vec!["B".to_string(), "A".to_string(), "C".to_string()]);
  }

  #[test]
  fn test_chunk_size_rejects_table_kinds() {
    let config = FetchConfig::default();
    assert_eq!(config.chunk_size(RequestKind::Price).unwrap(), 100);
    assert_eq!(config.chunk_size(RequestKind::Fundamental).unwrap(), 2);
    assert_eq!(config.chunk_size(RequestKind::Historical).unwrap(), 40);
    assert!(config.chunk_size(RequestKind::Position).is_err());
    assert!(config.chunk_size(RequestKind::Order).is_err());
  }
}
