use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::database::Database;
use crate::database::models::{Incident, IncidentFilter, NewIncident};
use crate::error::Result;
use crate::incidents::state::IncidentAction;
use crate::monitoring::types::{MonitorStatus, Transition, TransitionKind};
use crate::validation::validate_new_incident;

/// State machine over incidents, shared by the automatic and manual paths
///
/// Both paths go through the same guarded writes, so a manual resolve racing
/// an automatic one leaves exactly one of them successful.
#[derive(Clone)]
pub struct IncidentManager {
    database: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

impl IncidentManager {
    pub fn new(database: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }

    /// React to a monitor verdict change.
    ///
    /// Returns the incident that was opened or resolved, or `None` when the
    /// transition required no change (duplicate outage, recovery without an
    /// active incident).
    pub async fn handle_transition(&self, transition: &Transition) -> Result<Option<Incident>> {
        match transition.kind {
            TransitionKind::WentDown => {
                let opened = self
                    .database
                    .open_automatic_incident(
                        transition.monitor_id,
                        transition.reason.as_deref(),
                        transition.at,
                    )
                    .await?;
                if let Some(incident) = &opened {
                    info!(
                        incident_id = incident.id,
                        monitor_id = transition.monitor_id,
                        "Opened incident: {}",
                        incident.title
                    );
                }
                Ok(opened)
            }
            TransitionKind::Recovered => {
                let resolved = self
                    .database
                    .resolve_active_for_monitor(transition.monitor_id, transition.at)
                    .await?;
                match &resolved {
                    Some(incident) => info!(
                        incident_id = incident.id,
                        monitor_id = transition.monitor_id,
                        "Resolved incident after recovery"
                    ),
                    None => debug!(
                        monitor_id = transition.monitor_id,
                        "Recovery with no active incident"
                    ),
                }
                Ok(resolved)
            }
        }
    }

    /// Open the incidents a lost down-transition never created.
    ///
    /// A live monitor stored as `down` without an active incident gets one,
    /// titled from its latest probe. Runs before the incident worker starts.
    pub async fn reconcile_outages(&self) -> Result<Vec<Incident>> {
        let mut opened = Vec::new();

        for monitor in self.database.list_monitors(None).await? {
            if monitor.last_status != MonitorStatus::Down {
                continue;
            }

            let reason = self
                .database
                .probe_history(monitor.id, 1)
                .await?
                .into_iter()
                .next()
                .and_then(|probe| probe.error_message);
            let at = monitor.last_check.unwrap_or_else(|| self.clock.now());

            if let Some(incident) = self
                .database
                .open_automatic_incident(monitor.id, reason.as_deref(), at)
                .await?
            {
                warn!(
                    incident_id = incident.id,
                    monitor_id = monitor.id,
                    "Opened missing incident for monitor stored as down"
                );
                opened.push(incident);
            }
        }

        Ok(opened)
    }

    pub async fn create(&self, incident: NewIncident) -> Result<Incident> {
        validate_new_incident(&incident)?;
        let created = self.database.insert_manual_incident(&incident, self.clock.now()).await?;
        info!(incident_id = created.id, severity = %created.severity, "Created manual incident");
        Ok(created)
    }

    pub async fn acknowledge(&self, id: i64) -> Result<Incident> {
        self.apply(id, IncidentAction::Acknowledge).await
    }

    pub async fn resolve(&self, id: i64) -> Result<Incident> {
        self.apply(id, IncidentAction::Resolve).await
    }

    async fn apply(&self, id: i64, action: IncidentAction) -> Result<Incident> {
        let incident = self.database.transition_incident(id, action, self.clock.now()).await?;
        info!(incident_id = id, status = %incident.status(), "Incident {}", action);
        Ok(incident)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Incident>> {
        self.database.get_incident(id).await
    }

    pub async fn list(&self, filter: IncidentFilter) -> Result<Vec<Incident>> {
        self.database.list_incidents(filter).await
    }
}

/// Consumer end of the transition queue
pub struct IncidentWorker {
    manager: IncidentManager,
    transitions: mpsc::Receiver<Transition>,
}

impl IncidentWorker {
    pub fn new(manager: IncidentManager, transitions: mpsc::Receiver<Transition>) -> Self {
        Self { manager, transitions }
    }

    /// Handle every transition already queued without waiting for more.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(transition) = self.transitions.try_recv() {
            self.apply(&transition).await;
            handled += 1;
        }
        handled
    }

    async fn apply(&self, transition: &Transition) {
        if let Err(e) = self.manager.handle_transition(transition).await {
            error!(
                monitor_id = transition.monitor_id,
                kind = ?transition.kind,
                "Failed to apply transition to incidents: {}",
                e
            );
        }
    }

    /// Handle transitions until `stop` fires, then close the queue and
    /// handle everything still in it before returning.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;

                transition = self.transitions.recv() => match transition {
                    Some(transition) => self.apply(&transition).await,
                    None => {
                        debug!("Transition queue closed, incident worker stopping");
                        return;
                    }
                },
                _ = &mut stop => break,
            }
        }

        self.transitions.close();
        let mut handled = 0;
        while let Some(transition) = self.transitions.recv().await {
            self.apply(&transition).await;
            handled += 1;
        }
        debug!(handled, "Incident worker drained its queue and stopped");
    }

    pub fn spawn(self, stop: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }
}
