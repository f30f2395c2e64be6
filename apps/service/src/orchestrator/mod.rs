/// Orchestrator module - wires the engine together and owns its tasks
///
/// On start it runs migrations, builds the probe pipeline and incident
/// manager, loads every live monitor into the scheduler, opens incidents for
/// monitors left down without one and spawns the scheduler and incident
/// worker tasks.


use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dashboard::Aggregator;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::incidents::{IncidentManager, IncidentWorker};
use crate::monitoring::{
    Checker, HttpChecker, MonitoringScheduler, ProbeExecutor, ProbeGuards, ProbeRunner,
    ScheduledMonitor, SchedulerConfig, SchedulerHandle, StatusTracker,
};
use crate::pool::LibsqlPool;
use crate::service::VigilService;

/// Engine parts, built but not yet running
pub struct Engine {
    pub service: VigilService,
    pub scheduler: MonitoringScheduler,
    pub scheduler_handle: SchedulerHandle,
    pub incidents: IncidentManager,
    pub worker: IncidentWorker,
}

/// Build every component over an already-migrated database.
pub fn build_engine(
    config: &Config,
    database: Arc<dyn Database>,
    checker: Arc<dyn Checker>,
    clock: Arc<dyn Clock>,
) -> Engine {
    let monitoring = &config.monitoring;
    let (transition_tx, transition_rx) = mpsc::channel(monitoring.transition_queue_capacity.max(1));

    let guards = ProbeGuards::new();
    let executor = ProbeExecutor::new(
        checker,
        Duration::from_secs(monitoring.probe_timeout_seconds),
        clock.clone(),
    );
    let tracker = StatusTracker::new(database.clone(), transition_tx);
    let runner = Arc::new(ProbeRunner::new(executor, tracker, guards.clone()));

    let (scheduler, scheduler_handle) = MonitoringScheduler::new(
        runner.clone(),
        guards,
        SchedulerConfig {
            max_concurrent_probes: monitoring.max_concurrent_probes,
            startup_jitter: Duration::from_millis(monitoring.startup_jitter_ms),
        },
    );

    let incidents = IncidentManager::new(database.clone(), clock.clone());
    let worker = IncidentWorker::new(incidents.clone(), transition_rx);
    let aggregator = Aggregator::new(
        database.clone(),
        clock.clone(),
        chrono::Duration::hours(config.dashboard.window_hours),
        chrono::Duration::hours(config.dashboard.sla_window_hours),
        config.sla.clone(),
    );

    let service = VigilService::new(
        database,
        scheduler_handle.clone(),
        runner,
        incidents.clone(),
        aggregator,
        clock,
        monitoring.default_severity,
    );

    Engine { service, scheduler, scheduler_handle, incidents, worker }
}

/// Main orchestrator for the Vigil service
pub struct Orchestrator {
    service: VigilService,
    scheduler: SchedulerHandle,
    scheduler_task: tokio::task::JoinHandle<()>,
    worker_stop: oneshot::Sender<()>,
    worker_task: tokio::task::JoinHandle<()>,
}

impl Orchestrator {
    /// Start with real HTTP probing and the system clock
    pub async fn start(config: &Config, pool: LibsqlPool) -> Result<Self> {
        let checker = Arc::new(HttpChecker::new(Duration::from_secs(
            config.monitoring.probe_timeout_seconds,
        ))?);
        Self::start_with(config, pool, checker, Arc::new(SystemClock)).await
    }

    pub async fn start_with(
        config: &Config,
        pool: LibsqlPool,
        checker: Arc<dyn Checker>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        {
            let conn = pool.get().await?;
            info!("Initializing database schema...");
            initialize_database(&conn).await?;
        }

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let engine = build_engine(config, database.clone(), checker, clock);

        info!("Loading monitors from database...");
        let monitors = database.list_monitors(None).await?;
        info!("Found {} monitors", monitors.len());
        for monitor in &monitors {
            engine.scheduler_handle.schedule(ScheduledMonitor::from(monitor));
        }

        let reconciled = engine.incidents.reconcile_outages().await?;
        if !reconciled.is_empty() {
            info!("Opened {} incidents for monitors already down", reconciled.len());
        }

        let (worker_stop, stop) = oneshot::channel();
        let scheduler_task = engine.scheduler.spawn();
        let worker_task = engine.worker.spawn(stop);
        info!("Orchestrator started");

        Ok(Self {
            service: engine.service,
            scheduler: engine.scheduler_handle,
            scheduler_task,
            worker_stop,
            worker_task,
        })
    }

    pub fn service(&self) -> VigilService {
        self.service.clone()
    }

    /// Stop scheduling new probes, wait for the ones in flight, then let the
    /// incident worker apply every queued transition before it stops.
    pub async fn shutdown(self) {
        info!("Shutting down orchestrator...");
        self.scheduler.shutdown();
        if let Err(e) = self.scheduler_task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }

        let _ = self.worker_stop.send(());
        if let Err(e) = self.worker_task.await {
            error!("Incident worker ended abnormally: {}", e);
        }
    }
}
