// twsbatch/src/wait.rs
// Bounded blocking wait shared by every "poll until this value exists" site.

use crossbeam_channel::Receiver;
use log::{error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::base::GatewayError;

/// Poll interval for blocking waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Session-level liveness observed by every blocking wait: the transport
/// disconnect flag and the callback-thread fatal side channel.
#[derive(Clone)]
pub struct SessionFlags {
  disconnected: Arc<AtomicBool>,
  thread_fatal: Receiver<String>,
}

impl SessionFlags {
  pub fn new(disconnected: Arc<AtomicBool>, thread_fatal: Receiver<String>) -> Self {
    SessionFlags { disconnected, thread_fatal }
  }

  pub fn mark_disconnected(&self) {
    self.disconnected.store(true, Ordering::SeqCst);
  }

  pub fn is_disconnected(&self) -> bool {
    self.disconnected.load(Ordering::SeqCst)
  }

  /// Errors out if the session died. A thread-fatal report takes priority
  /// over a plain disconnect since it carries the cause.
  pub fn check(&self) -> Result<(), GatewayError> {
    if let Ok(msg) = self.thread_fatal.try_recv() {
      error!("Callback thread reported fatal error: {}", msg);
      return Err(GatewayError::ThreadFatal(msg));
    }
    if self.is_disconnected() {
      return Err(GatewayError::Disconnected("transport dropped".to_string()));
    }
    Ok(())
  }
}

/// Polls `probe` until it yields a value, bounded by `timeout`.
///
/// Returns `Timeout` if the probe never yields, `Disconnected` if the
/// transport drops mid-wait, `ThreadFatal` if the callback thread died.
/// This is the single generalized form of the per-kind wait loops; callers
/// choose a timeout appropriate to the request kind (fundamental fetches
/// need far longer than quotes).
pub fn block_on<T, F>(probe: F, timeout: Duration, flags: &SessionFlags) -> Result<T, GatewayError>
where
  F: FnMut() -> Option<T>,
{
  block_on_every(probe, timeout, POLL_INTERVAL, flags)
}

/// As [`block_on`], with an explicit poll interval. Callers with their own
/// cadence knob (the batch fetcher's drain poll) thread it through here.
pub fn block_on_every<T, F>(
  mut probe: F,
  timeout: Duration,
  poll: Duration,
  flags: &SessionFlags,
) -> Result<T, GatewayError>
where
  F: FnMut() -> Option<T>,
{
  let start = Instant::now();
  loop {
    if let Some(value) = probe() {
      return Ok(value);
    }
    flags.check()?;
    if start.elapsed() >= timeout {
      warn!("Blocking wait timed out after {:?}", timeout);
      return Err(GatewayError::Timeout(format!("no value within {:?}", timeout)));
    }
    std::thread::sleep(poll);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossbeam_channel::unbounded;

  fn flags() -> (SessionFlags, crossbeam_channel::Sender<String>, Arc<AtomicBool>) {
    let disconnected = Arc::new(AtomicBool::new(false));
    let (fatal_tx, fatal_rx) = unbounded();
    (SessionFlags::new(disconnected.clone(), fatal_rx), fatal_tx, disconnected)
  }

  #[test]
  fn test_returns_value_immediately() {
    let (flags, _tx, _d) = flags();
    let result = block_on(|| Some(42), Duration::from_secs(1), &flags);
    assert_eq!(result.unwrap(), 42);
  }

  #[test]
  fn test_times_out_within_bound() {
    let (flags, _tx, _d) = flags();
    let timeout = Duration::from_millis(60);
    let start = Instant::now();
    let result: Result<(), _> = block_on(|| None, timeout, &flags);
    assert!(matches!(result, Err(GatewayError::Timeout(_))));
    // timeout + one poll interval of slack
    assert!(start.elapsed() < timeout + POLL_INTERVAL * 5);
  }

  #[test]
  fn test_detects_disconnect() {
    let (flags, _tx, disconnected) = flags();
    disconnected.store(true, Ordering::SeqCst);
    let result: Result<(), _> = block_on(|| None, Duration::from_secs(5), &flags);
    assert!(matches!(result, Err(GatewayError::Disconnected(_))));
  }

  #[test]
  fn test_detects_thread_fatal() {
    let (flags, fatal_tx, _d) = flags();
    fatal_tx.send("worker panicked".to_string()).unwrap();
    let result: Result<(), _> = block_on(|| None, Duration::from_secs(5), &flags);
    match result {
      Err(GatewayError::ThreadFatal(msg)) => assert!(msg.contains("panicked")),
      other => panic!("expected ThreadFatal, got {:?}", other),
    }
  }

  #[test]
  fn test_explicit_poll_interval_bounds_timeout() {
    let (flags, _tx, _d) = flags();
    let timeout = Duration::from_millis(20);
    let start = Instant::now();
    let result: Result<(), _> = block_on_every(|| None, timeout, Duration::from_millis(1), &flags);
    assert!(matches!(result, Err(GatewayError::Timeout(_))));
    // A 1ms cadence must not stretch the wait toward the default interval.
    assert!(start.elapsed() < timeout + Duration::from_millis(10));
  }

  #[test]
  fn test_value_yielded_mid_wait() {
    let (flags, _tx, _d) = flags();
    let mut polls = 0;
    let result = block_on(
      || {
        polls += 1;
        if polls >= 3 { Some("ready") } else { None }
      },
      Duration::from_secs(1),
      &flags,
    );
    assert_eq!(result.unwrap(), "ready");
  }
}
