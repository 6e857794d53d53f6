// twsbatch/src/pacing.rs
// Rate-limit backoff control driven by gateway pacing-violation errors.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::data::ErrorRecord;

/// Default cooldown after the gateway signals a pacing violation.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Observes the error stream for pacing violations and exposes a one-shot
/// slowdown flag.
///
/// The gateway's observed rate-limit behavior is a single burst: one fixed
/// cooldown clears it, so the backoff is flat rather than exponential. The
/// flag, once set, is consumed by exactly one cooldown sleep before further
/// dispatch in that batch.
pub struct PacingGuard {
  slowdown: AtomicBool,
  cooldown: Duration,
}

impl PacingGuard {
  pub fn new(cooldown: Duration) -> Self {
    PacingGuard {
      slowdown: AtomicBool::new(false),
      cooldown,
    }
  }

  /// Inspects an error record; a pacing violation arms the slowdown flag.
  pub fn observe(&self, error: &ErrorRecord) {
    if error.is_pacing() && !self.slowdown.swap(true, Ordering::SeqCst) {
      warn!(
        "Pacing violation observed (code {}): slowing down dispatch",
        error.code
      );
    }
  }

  /// Consumes the slowdown flag. Returns the cooldown to sleep if one is
  /// owed, `None` otherwise.
  pub fn take_cooldown(&self) -> Option<Duration> {
    if self.slowdown.swap(false, Ordering::SeqCst) {
      info!("Pacing cooldown: sleeping {:?} before next chunk", self.cooldown);
      Some(self.cooldown)
    } else {
      None
    }
  }

  pub fn is_slowed(&self) -> bool {
    self.slowdown.load(Ordering::SeqCst)
  }
}

impl Default for PacingGuard {
  fn default() -> Self {
    PacingGuard::new(DEFAULT_COOLDOWN)
  }
}
