use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::debug;

use super::checker::Checker;
use super::types::ProbeResult;
use crate::clock::Clock;

/// Probe executor - runs one bounded check and reports it as data
///
/// Network errors, timeouts and non-2xx answers all come back as a failed
/// [`ProbeResult`]; nothing escapes as an error.
pub struct ProbeExecutor {
    checker: Arc<dyn Checker>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ProbeExecutor {
    pub fn new(checker: Arc<dyn Checker>, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { checker, timeout, clock }
    }

    pub async fn execute(&self, monitor_id: i64, target: &str) -> ProbeResult {
        let start = Instant::now();
        let outcome = timeout(self.timeout, self.checker.check(target)).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let at = self.clock.now();

        let result = match outcome {
            Ok(Ok(code)) if (200..300).contains(&code) => {
                ProbeResult::success(monitor_id, code, latency_ms, at)
            }
            Ok(Ok(code)) => {
                ProbeResult::failure(monitor_id, Some(code), latency_ms, format!("HTTP {code}"), at)
            }
            Ok(Err(e)) => ProbeResult::failure(monitor_id, None, latency_ms, e.to_string(), at),
            Err(_) => ProbeResult::failure(
                monitor_id,
                None,
                latency_ms,
                format!("Timeout after {}ms", self.timeout.as_millis()),
                at,
            ),
        };

        debug!(
            monitor_id,
            success = result.success,
            status_code = ?result.status_code,
            latency_ms,
            "Probe finished"
        );
        result
    }
}
