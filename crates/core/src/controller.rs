//! The process-wide orchestration controller.
//!
//! One instance owns the four simulation workers and the controller-level
//! registries (regions, vehicles, configuration, path model). The GUI
//! constructs it once with a logger sink, calls `initialize` with the truck
//! engine path, and drives everything through this surface.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use crate::config::ConfigStore;
use crate::error::{CoreError, CoreResult};
use crate::events::EventChannel;
use crate::logger::{ClientKind, LoggerSink};
use crate::path::PathComparisonModel;
use crate::region::RegionRegistry;
use crate::simulation::{
    ClientContext, ClientEvent, ClientHandle, ClientState, ShipSimulationClient, SimulationJob,
    SimulationKind, SimulatorClient, TerminalSimulationClient, TrainSimulationClient,
    TruckSimulationClient, TruckSimulationManager,
};
use crate::vehicle::{ShipRegistry, TrainRegistry};

/// Name the initial truck client is registered under with the manager.
pub const MAIN_TRUCK_NETWORK: &str = "MainTruckNetwork";

/// Grace granted to each worker context during shutdown.
const QUIT_GRACE: Duration = Duration::from_secs(3);

static INSTANCE: Lazy<RwLock<Option<SimulationOrchestrator>>> = Lazy::new(|| RwLock::new(None));

/// Events the orchestrator reports to its subscribers.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A worker of this kind was constructed and wired.
    ClientInitialized(SimulationKind),
    /// All four workers are constructed and wired.
    AllClientsInitialized,
    /// A worker context started running.
    ClientStarted(SimulationKind),
    /// A client established its engine connection.
    ClientReady(SimulationKind),
    /// Every client reported ready.
    AllClientsReady,
    /// A job completed; its outcome was merged into the path model.
    JobCompleted(crate::simulation::JobOutcome),
    /// A job failed; sibling jobs continue.
    JobFailed {
        /// Reporting client.
        kind: SimulationKind,
        /// The failing job.
        job_id: String,
        /// Failure description.
        error: String,
    },
    /// A synchronous run on one worker finished.
    SyncFinished {
        /// Reporting client.
        kind: SimulationKind,
        /// Failure description, when the run failed.
        error: Option<String>,
    },
    /// A client honored `end_simulator`.
    ClientEnded(SimulationKind),
    /// A client failed outside a specific job.
    ClientFailed {
        /// Reporting client.
        kind: SimulationKind,
        /// Failure description.
        error: String,
    },
}

/// Engine binaries for the three non-truck modes. The truck engine path is
/// the `initialize` argument; these default to `$PATH` lookups and can be
/// overridden before `initialize`.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    /// Sea-freight engine binary.
    pub ship: PathBuf,
    /// Rail-freight engine binary.
    pub train: PathBuf,
    /// Intermodal-terminal engine binary.
    pub terminal: PathBuf,
}

impl Default for EnginePaths {
    fn default() -> Self {
        Self {
            ship: PathBuf::from("shipSim"),
            train: PathBuf::from("trainSim"),
            terminal: PathBuf::from("terminalSim"),
        }
    }
}

struct ModeWorker<C: SimulatorClient> {
    pending: Option<ClientContext<C>>,
    handle: ClientHandle,
}

struct Inner {
    logger: LoggerSink,
    config: ConfigStore,
    regions: RegionRegistry,
    ships: ShipRegistry,
    trains: TrainRegistry,
    paths: PathComparisonModel,
    engine_paths: EnginePaths,

    truck: Option<ModeWorker<TruckSimulationManager>>,
    ship: Option<ModeWorker<ShipSimulationClient>>,
    train: Option<ModeWorker<TrainSimulationClient>>,
    terminal: Option<ModeWorker<TerminalSimulationClient>>,

    initialized: HashSet<SimulationKind>,
    ready: HashSet<SimulationKind>,
    client_events_tx: UnboundedSender<ClientEvent>,
    client_events_rx: Option<UnboundedReceiver<ClientEvent>>,
    events: EventChannel<ControllerEvent>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn mark_initialized(&mut self, kind: SimulationKind) {
        self.initialized.insert(kind);
        self.events.emit(ControllerEvent::ClientInitialized(kind));
        if self.initialized.len() == SimulationKind::ALL.len() {
            self.events.emit(ControllerEvent::AllClientsInitialized);
        }
    }
}

fn start_worker<C: SimulatorClient>(worker: &mut Option<ModeWorker<C>>) {
    if let Some(worker) = worker {
        if let Some(context) = worker.pending.take() {
            worker.handle.attach(tokio::spawn(context.run()));
        }
    }
}

fn end_worker<C: SimulatorClient>(worker: &Option<ModeWorker<C>>) {
    if let Some(worker) = worker {
        worker.handle.end_simulator("*");
    }
}

fn quit_worker<C: SimulatorClient>(
    worker: &mut Option<ModeWorker<C>>,
) -> Option<(SimulationKind, JoinHandle<()>)> {
    let worker = worker.as_mut()?;
    // A context that was never spawned is simply dropped.
    worker.pending = None;
    worker.handle.quit();
    let kind = worker.handle.kind();
    worker.handle.take_join().map(|join| (kind, join))
}

/// Clonable handle over the orchestrator state.
///
/// The process-wide singleton slot is managed through
/// [`create`](SimulationOrchestrator::create) /
/// [`instance`](SimulationOrchestrator::instance) /
/// [`destroy`](SimulationOrchestrator::destroy); `new` builds a free-standing
/// instance for tests and embedding.
#[derive(Clone)]
pub struct SimulationOrchestrator {
    inner: Arc<RwLock<Inner>>,
}

impl SimulationOrchestrator {
    /// Build a free-standing orchestrator with empty registries. No worker
    /// exists yet.
    pub fn new(logger: LoggerSink, config_path: impl Into<PathBuf>) -> CoreResult<Self> {
        let config = ConfigStore::open(config_path)?;
        let (client_events_tx, client_events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            inner: Arc::new(RwLock::new(Inner {
                logger,
                config,
                regions: RegionRegistry::new(),
                ships: ShipRegistry::new(),
                trains: TrainRegistry::new(),
                paths: PathComparisonModel::new(),
                engine_paths: EnginePaths::default(),
                truck: None,
                ship: None,
                train: None,
                terminal: None,
                initialized: HashSet::new(),
                ready: HashSet::new(),
                client_events_tx,
                client_events_rx: Some(client_events_rx),
                events: EventChannel::new(),
                pump: None,
            })),
        })
    }

    /// Create the singleton. Fails when one already exists.
    pub fn create(logger: LoggerSink, config_path: impl Into<PathBuf>) -> CoreResult<Self> {
        let mut slot = INSTANCE.write();
        if slot.is_some() {
            return Err(CoreError::CriticalState(
                "orchestration controller already created".to_string(),
            ));
        }
        let orchestrator = Self::new(logger, config_path)?;
        *slot = Some(orchestrator.clone());
        Ok(orchestrator)
    }

    /// The singleton, if created.
    pub fn instance() -> Option<Self> {
        INSTANCE.read().clone()
    }

    /// Tear the singleton down: stop every client, then grant each context
    /// the quit grace before releasing it.
    pub async fn destroy() {
        let taken = INSTANCE.write().take();
        if let Some(orchestrator) = taken {
            orchestrator.shutdown().await;
        }
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> UnboundedReceiver<ControllerEvent> {
        self.inner.write().events.subscribe()
    }

    /// Override the non-truck engine binaries. Only effective before
    /// [`initialize`](Self::initialize).
    pub fn set_engine_paths(&self, paths: EnginePaths) {
        self.inner.write().engine_paths = paths;
    }

    /// Construct the four workers: the truck manager (with its initial
    /// client registered under [`MAIN_TRUCK_NETWORK`]), then ship, train
    /// and terminal, in that order. Emits one `ClientInitialized` per
    /// worker and `AllClientsInitialized` after the fourth. No worker task
    /// runs until [`start_all`](Self::start_all).
    pub fn initialize(&self, truck_exe: impl Into<PathBuf>) -> bool {
        let mut inner = self.inner.write();
        if inner.truck.is_some() {
            inner.logger.warning(
                ClientKind::General,
                "orchestration controller initialized twice",
            );
            return false;
        }
        let truck_exe = truck_exe.into();
        let events = inner.client_events_tx.clone();
        let logger = inner.logger.clone();

        let mut manager = TruckSimulationManager::new();
        manager.register_client(
            MAIN_TRUCK_NETWORK,
            TruckSimulationClient::new(MAIN_TRUCK_NETWORK, &truck_exe),
        );
        let (context, handle) = ClientContext::new(manager, events.clone(), logger.clone());
        inner.truck = Some(ModeWorker {
            pending: Some(context),
            handle,
        });
        inner.mark_initialized(SimulationKind::Truck);

        let ship = ShipSimulationClient::new(&inner.engine_paths.ship);
        let (context, handle) = ClientContext::new(ship, events.clone(), logger.clone());
        inner.ship = Some(ModeWorker {
            pending: Some(context),
            handle,
        });
        inner.mark_initialized(SimulationKind::Ship);

        let train = TrainSimulationClient::new(&inner.engine_paths.train);
        let (context, handle) = ClientContext::new(train, events.clone(), logger.clone());
        inner.train = Some(ModeWorker {
            pending: Some(context),
            handle,
        });
        inner.mark_initialized(SimulationKind::Train);

        let terminal = TerminalSimulationClient::new(&inner.engine_paths.terminal);
        let (context, handle) = ClientContext::new(terminal, events, logger);
        inner.terminal = Some(ModeWorker {
            pending: Some(context),
            handle,
        });
        inner.mark_initialized(SimulationKind::Terminal);
        true
    }

    /// Spawn every worker context that is not already running, and the
    /// event pump on first use. Idempotent per context.
    pub fn start_all(&self) {
        let mut inner = self.inner.write();
        start_worker(&mut inner.truck);
        start_worker(&mut inner.ship);
        start_worker(&mut inner.train);
        start_worker(&mut inner.terminal);

        if inner.pump.is_none() {
            if let Some(rx) = inner.client_events_rx.take() {
                let this = self.clone();
                inner.pump = Some(tokio::spawn(this.pump_events(rx)));
            }
        }
    }

    /// Broadcast `end_simulator("*")` to every existing client. Returns
    /// after the broadcast; acknowledgement arrives through the state
    /// machines.
    pub fn stop_all(&self) -> bool {
        let inner = self.inner.read();
        end_worker(&inner.truck);
        end_worker(&inner.ship);
        end_worker(&inner.train);
        end_worker(&inner.terminal);
        true
    }

    /// Stop every client, then ask each context to quit and wait up to the
    /// grace period before releasing it.
    pub async fn shutdown(&self) {
        self.stop_all();

        let joins = {
            let mut inner = self.inner.write();
            let mut joins = Vec::new();
            joins.extend(quit_worker(&mut inner.truck));
            joins.extend(quit_worker(&mut inner.ship));
            joins.extend(quit_worker(&mut inner.train));
            joins.extend(quit_worker(&mut inner.terminal));
            joins
        };
        for (kind, mut join) in joins {
            if timeout(QUIT_GRACE, &mut join).await.is_err() {
                warn!("{} context ignored quit, aborting it", kind.name());
                join.abort();
            }
        }

        let pump = self.inner.write().pump.take();
        if let Some(pump) = pump {
            pump.abort();
        }
    }

    /// Current state of one client, when its worker exists.
    pub fn client_state(&self, kind: SimulationKind) -> Option<ClientState> {
        let inner = self.inner.read();
        match kind {
            SimulationKind::Truck => inner.truck.as_ref().map(|worker| worker.handle.state()),
            SimulationKind::Ship => inner.ship.as_ref().map(|worker| worker.handle.state()),
            SimulationKind::Train => inner.train.as_ref().map(|worker| worker.handle.state()),
            SimulationKind::Terminal => {
                inner.terminal.as_ref().map(|worker| worker.handle.state())
            }
        }
    }

    /// Number of workers constructed so far.
    pub fn initialized_count(&self) -> usize {
        self.inner.read().initialized.len()
    }

    /// Queue a batch of jobs on one mode's worker. Returns `false` when
    /// the worker does not exist or its context is gone.
    pub fn dispatch_jobs(&self, kind: SimulationKind, jobs: Vec<SimulationJob>) -> bool {
        let inner = self.inner.read();
        let handle = match kind {
            SimulationKind::Truck => inner.truck.as_ref().map(|worker| &worker.handle),
            SimulationKind::Ship => inner.ship.as_ref().map(|worker| &worker.handle),
            SimulationKind::Train => inner.train.as_ref().map(|worker| &worker.handle),
            SimulationKind::Terminal => inner.terminal.as_ref().map(|worker| &worker.handle),
        };
        let Some(handle) = handle else {
            return false;
        };
        jobs.into_iter().all(|job| handle.submit_job(job))
    }

    /// Queue a synchronous run over the selected truck networks
    /// (`"*"` selects every instance). The run blocks only the truck
    /// worker; completion arrives as a `SyncFinished` event. Returns
    /// `false` when the truck worker does not exist or its context is
    /// gone.
    pub fn run_truck_simulation_sync(&self, networks: Vec<String>) -> bool {
        let inner = self.inner.read();
        inner
            .truck
            .as_ref()
            .is_some_and(|worker| worker.handle.run_sync(networks))
    }

    // Registry access -------------------------------------------------------

    /// Read access to the region registry.
    pub fn regions(&self) -> MappedRwLockReadGuard<'_, RegionRegistry> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.regions)
    }

    /// Write access to the region registry (GUI context only).
    pub fn regions_mut(&self) -> MappedRwLockWriteGuard<'_, RegionRegistry> {
        RwLockWriteGuard::map(self.inner.write(), |inner| &mut inner.regions)
    }

    /// Read access to the ship registry.
    pub fn ships(&self) -> MappedRwLockReadGuard<'_, ShipRegistry> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.ships)
    }

    /// Write access to the ship registry (GUI context only).
    pub fn ships_mut(&self) -> MappedRwLockWriteGuard<'_, ShipRegistry> {
        RwLockWriteGuard::map(self.inner.write(), |inner| &mut inner.ships)
    }

    /// Read access to the train registry.
    pub fn trains(&self) -> MappedRwLockReadGuard<'_, TrainRegistry> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.trains)
    }

    /// Write access to the train registry (GUI context only).
    pub fn trains_mut(&self) -> MappedRwLockWriteGuard<'_, TrainRegistry> {
        RwLockWriteGuard::map(self.inner.write(), |inner| &mut inner.trains)
    }

    /// Read access to the configuration store.
    pub fn config(&self) -> MappedRwLockReadGuard<'_, ConfigStore> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.config)
    }

    /// Write access to the configuration store (GUI context only).
    pub fn config_mut(&self) -> MappedRwLockWriteGuard<'_, ConfigStore> {
        RwLockWriteGuard::map(self.inner.write(), |inner| &mut inner.config)
    }

    /// Read access to the path comparison model.
    pub fn paths(&self) -> MappedRwLockReadGuard<'_, PathComparisonModel> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.paths)
    }

    /// Write access to the path comparison model (GUI context only).
    pub fn paths_mut(&self) -> MappedRwLockWriteGuard<'_, PathComparisonModel> {
        RwLockWriteGuard::map(self.inner.write(), |inner| &mut inner.paths)
    }

    // Event pump ------------------------------------------------------------

    async fn pump_events(self, mut rx: UnboundedReceiver<ClientEvent>) {
        while let Some(event) = rx.recv().await {
            let mut inner = self.inner.write();
            match event {
                ClientEvent::Started(kind) => {
                    inner.events.emit(ControllerEvent::ClientStarted(kind));
                }
                ClientEvent::Ready(kind) => {
                    inner.ready.insert(kind);
                    inner.events.emit(ControllerEvent::ClientReady(kind));
                    if inner.ready.len() == SimulationKind::ALL.len() {
                        inner.events.emit(ControllerEvent::AllClientsReady);
                    }
                }
                ClientEvent::JobCompleted(outcome) => {
                    inner.paths.record_segment_result(
                        outcome.path_id,
                        outcome.segment_index,
                        outcome.metrics,
                        outcome.terminal_cost,
                    );
                    inner.events.emit(ControllerEvent::JobCompleted(outcome));
                }
                ClientEvent::JobFailed {
                    kind,
                    job_id,
                    error,
                } => {
                    inner.events.emit(ControllerEvent::JobFailed {
                        kind,
                        job_id,
                        error,
                    });
                }
                ClientEvent::SyncFinished { kind, error } => {
                    inner
                        .events
                        .emit(ControllerEvent::SyncFinished { kind, error });
                }
                ClientEvent::Ended(kind) => {
                    inner.ready.remove(&kind);
                    inner.events.emit(ControllerEvent::ClientEnded(kind));
                }
                ClientEvent::Failed { kind, error } => {
                    inner.ready.remove(&kind);
                    inner.events.emit(ControllerEvent::ClientFailed { kind, error });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn orchestrator(dir: &tempfile::TempDir) -> SimulationOrchestrator {
        let (logger, _stream) = LoggerSink::channel();
        SimulationOrchestrator::new(logger, dir.path().join("config.xml")).expect("orchestrator")
    }

    #[tokio::test]
    async fn initialize_emits_the_bring_up_sequence() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let mut events = orchestrator.subscribe();

        assert!(orchestrator.initialize("/bin/truckSim"));
        assert_eq!(orchestrator.initialized_count(), 4);

        for expected in SimulationKind::ALL {
            match events.try_recv() {
                Ok(ControllerEvent::ClientInitialized(kind)) => assert_eq!(kind, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(matches!(
            events.try_recv(),
            Ok(ControllerEvent::AllClientsInitialized)
        ));
        assert!(events.try_recv().is_err());

        // Workers exist but no context runs yet.
        assert_eq!(
            orchestrator.client_state(SimulationKind::Ship),
            Some(ClientState::Threaded)
        );

        // Second initialize is refused.
        assert!(!orchestrator.initialize("/bin/truckSim"));
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn missing_engines_fail_initialization_and_never_report_all_ready() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let mut events = orchestrator.subscribe();
        orchestrator.initialize(dir.path().join("no-such-truckSim"));
        orchestrator.start_all();

        // Every client fails its engine connect; wait for the four reports.
        let mut failures = HashSet::new();
        while failures.len() < 4 {
            match events.recv().await {
                Some(ControllerEvent::ClientFailed { kind, .. }) => {
                    failures.insert(kind);
                }
                Some(ControllerEvent::AllClientsReady) => {
                    panic!("all-ready must not fire when initialization fails")
                }
                Some(_) => {}
                None => panic!("event channel closed early"),
            }
        }
        assert_eq!(failures.len(), 4);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn stop_all_ends_every_client_within_the_grace() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        orchestrator.initialize(dir.path().join("no-such-truckSim"));
        orchestrator.start_all();
        assert!(orchestrator.stop_all());

        let start = std::time::Instant::now();
        orchestrator.shutdown().await;
        assert!(start.elapsed() < QUIT_GRACE + Duration::from_secs(1));

        for kind in SimulationKind::ALL {
            let state = orchestrator.client_state(kind).expect("worker exists");
            assert!(state.is_terminal(), "{} still in {state:?}", kind.name());
        }
    }

    #[tokio::test]
    async fn dispatch_without_workers_reports_failure() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        assert!(!orchestrator.dispatch_jobs(SimulationKind::Ship, Vec::new()));
        assert!(!orchestrator.run_truck_simulation_sync(vec!["*".to_string()]));
        orchestrator.initialize("/bin/truckSim");
        // An empty batch against an existing worker trivially succeeds.
        assert!(orchestrator.dispatch_jobs(SimulationKind::Ship, Vec::new()));
        // A sync run queues once the truck worker exists.
        assert!(orchestrator.run_truck_simulation_sync(vec!["*".to_string()]));
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn registries_are_reachable_through_the_controller() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(&dir);

        orchestrator.regions_mut().add_region("R");
        assert_eq!(orchestrator.regions().region_names(), vec!["R"]);
        assert_eq!(
            orchestrator
                .config()
                .simulation()
                .get("time_step")
                .and_then(|value| value.as_int()),
            Some(15)
        );
        assert!(orchestrator.paths().is_empty());
    }
}
