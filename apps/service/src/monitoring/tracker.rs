use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{ProbeResult, Transition};
use crate::database::{Database, ProbeApplied};
use crate::error::Result;

/// Status tracker - folds probe results into monitor status
///
/// Verdict changes are pushed onto the bounded transition queue after the
/// probe has been committed, so the incident side never sees a transition
/// the database doesn't.
#[derive(Clone)]
pub struct StatusTracker {
    database: Arc<dyn Database>,
    transitions: mpsc::Sender<Transition>,
}

impl StatusTracker {
    pub fn new(database: Arc<dyn Database>, transitions: mpsc::Sender<Transition>) -> Self {
        Self { database, transitions }
    }

    /// Record a probe result, returning the transition it caused, if any.
    pub async fn record(&self, result: &ProbeResult) -> Result<Option<Transition>> {
        let ProbeApplied { monitor, previous, .. } =
            self.database.apply_probe_result(result).await?;

        let Some(kind) = Transition::between(previous, monitor.last_status) else {
            return Ok(None);
        };

        if monitor.is_deleted() {
            debug!(monitor_id = monitor.id, ?kind, "Monitor deleted, transition dropped");
            return Ok(None);
        }

        info!(
            monitor_id = monitor.id,
            from = %previous,
            to = %monitor.last_status,
            "Monitor status changed"
        );

        let transition = Transition {
            monitor_id: monitor.id,
            kind,
            at: result.checked_at,
            reason: result.error_message.clone(),
        };

        // Blocks while the queue is full.
        if self.transitions.send(transition.clone()).await.is_err() {
            warn!(monitor_id = monitor.id, "Transition queue closed, incident side will not see this change");
        }

        Ok(Some(transition))
    }
}
