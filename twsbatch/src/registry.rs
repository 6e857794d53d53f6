// twsbatch/src/registry.rs
// Request-id allocation and the id -> symbol correlation map.

use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::base::RequestKind;
use crate::data::PendingRequest;

/// Sole issuer of request ids, and the map from an outstanding id back to
/// the symbol it was issued for.
///
/// Ids increase monotonically and are never reused, so a stale callback can
/// never be confused with a live request. An entry exists exactly while its
/// request is outstanding: `allocate` creates it, `resolve` consumes it.
pub struct SymbolRegistry {
  next_id: AtomicI32,
  entries: Mutex<HashMap<i32, PendingRequest>>,
}

impl SymbolRegistry {
  pub fn new(first_id: i32) -> Self {
    SymbolRegistry {
      next_id: AtomicI32::new(first_id),
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Reserves the next request id and records the id -> symbol mapping.
  pub fn allocate(&self, symbol: &str, kind: RequestKind) -> i32 {
    let req_id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let pending = PendingRequest {
      req_id,
      symbol: symbol.to_string(),
      kind,
      issued_at: Utc::now(),
    };
    self.entries.lock().insert(req_id, pending);
    debug!("Allocated ReqID {} for {} ({})", req_id, symbol, kind);
    req_id
  }

  /// Looks up and removes the mapping for a request id.
  ///
  /// `None` is the orphan case: a callback arrived for a request that was
  /// never registered or was already resolved (e.g. the caller timed out
  /// and stopped waiting). Reported, never fatal.
  pub fn resolve(&self, req_id: i32) -> Option<PendingRequest> {
    let resolved = self.entries.lock().remove(&req_id);
    if resolved.is_none() {
      warn!("Orphan resolve for ReqID {}: unknown or already consumed", req_id);
    }
    resolved
  }

  /// Peeks at the symbol for an id without consuming the entry. Used by
  /// error handling, where a symbol may still owe a data arrival.
  pub fn peek_symbol(&self, req_id: i32) -> Option<String> {
    self.entries.lock().get(&req_id).map(|p| p.symbol.clone())
  }

  /// Number of requests still outstanding.
  pub fn outstanding(&self) -> usize {
    self.entries.lock().len()
  }

  /// Drops any still-outstanding entries for the given ids. Called after a
  /// batch returns so that late arrivals for abandoned requests resolve as
  /// orphans instead of leaking map entries.
  pub fn forget(&self, req_ids: &[i32]) {
    let mut entries = self.entries.lock();
    for id in req_ids {
      if entries.remove(id).is_some() {
        debug!("Forgot abandoned ReqID {}", id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_allocate_resolve_cycle() {
    let reg = SymbolRegistry::new(100);
    let id = reg.allocate("AAPL", RequestKind::Price);
    assert_eq!(id, 100);
    assert_eq!(reg.outstanding(), 1);

    let pending = reg.resolve(id).unwrap();
    assert_eq!(pending.symbol, "AAPL");
    assert_eq!(pending.kind, RequestKind::Price);
    assert_eq!(reg.outstanding(), 0);
  }

  #[test]
  fn test_ids_are_monotonic() {
    let reg = SymbolRegistry::new(1);
    let a = reg.allocate("A", RequestKind::Fundamental);
    let b = reg.allocate("B", RequestKind::Fundamental);
    let c = reg.allocate("C", RequestKind::Historical);
    assert!(a < b && b < c);
  }

  #[test]
  fn test_orphan_resolve_is_none() {
    let reg = SymbolRegistry::new(1);
    assert!(reg.resolve(9999).is_none());

    // Double consumption is also an orphan, not a panic.
    let id = reg.allocate("MSFT", RequestKind::Price);
    assert!(reg.resolve(id).is_some());
    assert!(reg.resolve(id).is_none());
  }

  #[test]
  fn test_forget_abandoned() {
    let reg = SymbolRegistry::new(1);
    let a = reg.allocate("A", RequestKind::Price);
    let b = reg.allocate("B", RequestKind::Price);
    reg.forget(&[a, b]);
    assert_eq!(reg.outstanding(), 0);
    assert!(reg.resolve(a).is_none());
  }
}
