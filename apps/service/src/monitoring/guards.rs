use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Per-monitor in-flight guards
///
/// Holding a monitor's guard means a probe for it is running. Scheduled
/// probes skip a tick when the guard is taken; out-of-band checks wait for it.
#[derive(Clone, Default)]
pub struct ProbeGuards {
    guards: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl ProbeGuards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self, monitor_id: i64) -> Arc<AsyncMutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guards.entry(monitor_id).or_default().clone()
    }

    /// Drop the guard of a removed monitor; a probe still holding it finishes normally.
    pub fn forget(&self, monitor_id: i64) {
        let mut guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guards.remove(&monitor_id);
    }

    pub fn is_in_flight(&self, monitor_id: i64) -> bool {
        let guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guards.get(&monitor_id).is_some_and(|guard| guard.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_is_shared_per_monitor() {
        let guards = ProbeGuards::new();
        let held = guards.guard(1).try_lock_owned().unwrap();

        assert!(guards.is_in_flight(1));
        assert!(guards.guard(1).try_lock_owned().is_err());
        assert!(!guards.is_in_flight(2));
        assert!(guards.guard(2).try_lock_owned().is_ok());

        drop(held);
        assert!(!guards.is_in_flight(1));
    }
}
