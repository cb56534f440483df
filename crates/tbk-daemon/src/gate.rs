//! Single-flight gate for ingestion runs.
//!
//! The watermark read-modify-write makes two concurrent ingestion runs
//! unsafe: both would fetch from the same window start and race the final
//! advance. Every run MUST hold a [`RunPermit`] for its whole duration;
//! a second trigger while one is held is refused (HTTP 409), not queued.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one ingestion run; dropping it releases the
/// gate.
pub type RunPermit = OwnedMutexGuard<()>;

/// Try-acquire mutual exclusion around "one ingestion run at a time".
///
/// Clones share the same underlying gate, so every handler sees the same
/// exclusion domain.
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    inner: Arc<Mutex<()>>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate without waiting. `None` means a run is already in
    /// flight.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.inner.clone().try_lock_owned().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_refused_while_permit_held() {
        let gate = RunGate::new();
        let permit = gate.try_acquire();
        assert!(permit.is_some());
        assert!(gate.try_acquire().is_none());
        drop(permit);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn clones_share_the_exclusion_domain() {
        let gate = RunGate::new();
        let clone = gate.clone();
        let _permit = gate.try_acquire().unwrap();
        assert!(clone.try_acquire().is_none());
    }

    #[test]
    fn independent_gates_do_not_interfere() {
        let a = RunGate::new();
        let b = RunGate::new();
        let _pa = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_some());
    }
}
