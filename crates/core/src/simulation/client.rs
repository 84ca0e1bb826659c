//! The worker context every simulation client runs on.
//!
//! A [`ClientContext`] owns its client and an inbox of requests; the paired
//! [`ClientHandle`] stays with the orchestrator. Requests are served
//! strictly in submission order, and the client's state is published
//! through a `watch` channel.

use std::future::Future;

use anyhow::{bail, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::logger::{ClientKind, LoggerSink};

use super::job::{JobOutcome, SimulationJob};

/// Which external engine a client speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationKind {
    /// Road freight engine, driven through the truck manager.
    Truck,
    /// Sea freight engine.
    Ship,
    /// Rail freight engine.
    Train,
    /// Intermodal terminal engine.
    Terminal,
}

impl SimulationKind {
    /// Lowercase name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            SimulationKind::Truck => "truck",
            SimulationKind::Ship => "ship",
            SimulationKind::Train => "train",
            SimulationKind::Terminal => "terminal",
        }
    }

    /// All kinds, in the order the orchestrator brings them up.
    pub const ALL: [SimulationKind; 4] = [
        SimulationKind::Truck,
        SimulationKind::Ship,
        SimulationKind::Train,
        SimulationKind::Terminal,
    ];
}

/// Lifecycle state of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Client object exists, no worker context yet.
    Constructed,
    /// Paired with a worker context that has not started.
    Threaded,
    /// Worker started, about to initialize the client.
    Initialized,
    /// Engine connection established; accepting jobs.
    Ready,
    /// A job is in flight.
    Running,
    /// `end_simulator` completed; no further jobs accepted.
    Ended,
    /// Initialization or an unrecoverable operation failed. Treated the
    /// same as `Ended` for shutdown.
    Failed,
}

impl ClientState {
    /// Whether the client will accept no further jobs.
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientState::Ended | ClientState::Failed)
    }
}

/// Requests served by a worker context, in submission order.
#[derive(Debug)]
pub enum ClientRequest {
    /// Simulate one job.
    RunJob(SimulationJob),
    /// Drive a full synchronous run over the selected networks
    /// (`"*"` = all).
    RunSync(Vec<String>),
    /// Terminate engine instances matching the filter (`"*"` = all).
    EndSimulator(String),
    /// Leave the request loop; the cooperative part of shutdown.
    Quit,
}

/// Events a worker context reports back to the orchestrator.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The worker context started.
    Started(SimulationKind),
    /// The engine connection is established.
    Ready(SimulationKind),
    /// A job finished successfully.
    JobCompleted(JobOutcome),
    /// A job failed; sibling jobs continue.
    JobFailed {
        /// Reporting client.
        kind: SimulationKind,
        /// The failing job.
        job_id: String,
        /// Failure description.
        error: String,
    },
    /// A synchronous run finished.
    SyncFinished {
        /// Reporting client.
        kind: SimulationKind,
        /// Failure description, when the run failed.
        error: Option<String>,
    },
    /// The client honored `end_simulator`.
    Ended(SimulationKind),
    /// The client failed outside a specific job.
    Failed {
        /// Reporting client.
        kind: SimulationKind,
        /// Failure description.
        error: String,
    },
}

/// Adapter to one external simulation engine.
///
/// Implementations run exclusively on their worker context; every method
/// may suspend on engine I/O. Generic dispatch only: the four workers are
/// statically typed fields of the orchestrator.
pub trait SimulatorClient: Send + 'static {
    /// Which engine this client speaks to.
    fn kind(&self) -> SimulationKind;

    /// Establish the engine connection. Called once, on the worker context,
    /// right after it starts.
    fn initialize(&mut self, logger: &LoggerSink) -> impl Future<Output = Result<()>> + Send;

    /// Simulate one job to completion.
    fn run_job(
        &mut self,
        job: SimulationJob,
        logger: &LoggerSink,
    ) -> impl Future<Output = Result<JobOutcome>> + Send;

    /// Drive a full synchronous run over the selected networks
    /// (`"*"` = all). Only the truck manager supports this; every other
    /// client reports an error.
    fn run_sync(
        &mut self,
        _networks: Vec<String>,
        _logger: &LoggerSink,
    ) -> impl Future<Output = Result<()>> + Send {
        let kind = self.kind();
        async move {
            bail!(
                "{} client does not run simulations synchronously",
                kind.name()
            )
        }
    }

    /// Terminate engine instances matching `filter` (`"*"` = all). The
    /// cooperative cancellation primitive; must abort in-flight work.
    fn end_simulator(
        &mut self,
        filter: &str,
        logger: &LoggerSink,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The worker side: client + inbox + state publisher.
pub struct ClientContext<C: SimulatorClient> {
    client: C,
    inbox: UnboundedReceiver<ClientRequest>,
    events: UnboundedSender<ClientEvent>,
    state: watch::Sender<ClientState>,
    logger: LoggerSink,
}

/// The orchestrator side: request sender + state observer.
#[derive(Debug)]
pub struct ClientHandle {
    kind: SimulationKind,
    requests: UnboundedSender<ClientRequest>,
    state: watch::Receiver<ClientState>,
    join: Option<JoinHandle<()>>,
}

impl<C: SimulatorClient> ClientContext<C> {
    /// Pair `client` with a fresh worker context. The client is Threaded
    /// from here on; the context does nothing until [`run`](Self::run) is
    /// spawned.
    pub fn new(
        client: C,
        events: UnboundedSender<ClientEvent>,
        logger: LoggerSink,
    ) -> (Self, ClientHandle) {
        let kind = client.kind();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Threaded);
        (
            Self {
                client,
                inbox: request_rx,
                events,
                state: state_tx,
                logger,
            },
            ClientHandle {
                kind,
                requests: request_tx,
                state: state_rx,
                join: None,
            },
        )
    }

    /// The worker loop: initialize the client, then serve requests in
    /// submission order until `Quit` arrives or every handle is gone.
    pub async fn run(mut self) {
        let kind = self.client.kind();
        self.set_state(ClientState::Initialized);
        let _ = self.events.send(ClientEvent::Started(kind));
        self.logger
            .info(ClientKind::Simulation, format!("{} client starting", kind.name()));

        let mut current = match self.client.initialize(&self.logger).await {
            Ok(()) => {
                self.set_state(ClientState::Ready);
                let _ = self.events.send(ClientEvent::Ready(kind));
                ClientState::Ready
            }
            Err(err) => {
                self.logger.error(
                    ClientKind::Simulation,
                    format!("{} client failed to initialize: {err:#}", kind.name()),
                );
                self.set_state(ClientState::Failed);
                let _ = self.events.send(ClientEvent::Failed {
                    kind,
                    error: format!("{err:#}"),
                });
                ClientState::Failed
            }
        };

        while let Some(request) = self.inbox.recv().await {
            match request {
                ClientRequest::RunJob(job) => {
                    if current != ClientState::Ready {
                        self.logger.warning(
                            ClientKind::Simulation,
                            format!(
                                "{} client dropped job {} in state {current:?}",
                                kind.name(),
                                job.job_id
                            ),
                        );
                        let _ = self.events.send(ClientEvent::JobFailed {
                            kind,
                            job_id: job.job_id,
                            error: format!("client not ready ({current:?})"),
                        });
                        continue;
                    }
                    self.set_state(ClientState::Running);
                    let job_id = job.job_id.clone();
                    match self.client.run_job(job, &self.logger).await {
                        Ok(outcome) => {
                            let _ = self.events.send(ClientEvent::JobCompleted(outcome));
                        }
                        Err(err) => {
                            self.logger.error(
                                ClientKind::Simulation,
                                format!("{} job {job_id} failed: {err:#}", kind.name()),
                            );
                            let _ = self.events.send(ClientEvent::JobFailed {
                                kind,
                                job_id,
                                error: format!("{err:#}"),
                            });
                        }
                    }
                    self.set_state(ClientState::Ready);
                    current = ClientState::Ready;
                }
                ClientRequest::RunSync(networks) => {
                    if current != ClientState::Ready {
                        self.logger.warning(
                            ClientKind::Simulation,
                            format!(
                                "{} client dropped a synchronous run in state {current:?}",
                                kind.name()
                            ),
                        );
                        let _ = self.events.send(ClientEvent::SyncFinished {
                            kind,
                            error: Some(format!("client not ready ({current:?})")),
                        });
                        continue;
                    }
                    self.set_state(ClientState::Running);
                    let error = match self.client.run_sync(networks, &self.logger).await {
                        Ok(()) => None,
                        Err(err) => {
                            self.logger.error(
                                ClientKind::Simulation,
                                format!("{} synchronous run failed: {err:#}", kind.name()),
                            );
                            Some(format!("{err:#}"))
                        }
                    };
                    let _ = self.events.send(ClientEvent::SyncFinished { kind, error });
                    self.set_state(ClientState::Ready);
                    current = ClientState::Ready;
                }
                ClientRequest::EndSimulator(filter) => {
                    if let Err(err) = self.client.end_simulator(&filter, &self.logger).await {
                        self.logger.warning(
                            ClientKind::Simulation,
                            format!("{} end_simulator('{filter}') failed: {err:#}", kind.name()),
                        );
                    }
                    self.set_state(ClientState::Ended);
                    let _ = self.events.send(ClientEvent::Ended(kind));
                    current = ClientState::Ended;
                }
                ClientRequest::Quit => break,
            }
        }
    }

    fn set_state(&self, state: ClientState) {
        let _ = self.state.send(state);
    }
}

impl ClientHandle {
    /// Which engine this handle controls.
    pub fn kind(&self) -> SimulationKind {
        self.kind
    }

    /// Current published state.
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Whether the worker task has been spawned.
    pub fn is_spawned(&self) -> bool {
        self.join.is_some()
    }

    pub(crate) fn attach(&mut self, join: JoinHandle<()>) {
        self.join = Some(join);
    }

    pub(crate) fn take_join(&mut self) -> Option<JoinHandle<()>> {
        self.join.take()
    }

    /// Queue one job. Returns `false` when the context is gone.
    pub fn submit_job(&self, job: SimulationJob) -> bool {
        self.requests.send(ClientRequest::RunJob(job)).is_ok()
    }

    /// Queue a synchronous run over the selected networks (`"*"` = all).
    pub fn run_sync(&self, networks: Vec<String>) -> bool {
        self.requests.send(ClientRequest::RunSync(networks)).is_ok()
    }

    /// Queue a termination request (`"*"` = all instances).
    pub fn end_simulator(&self, filter: &str) -> bool {
        self.requests
            .send(ClientRequest::EndSimulator(filter.to_string()))
            .is_ok()
    }

    /// Ask the context to leave its request loop.
    pub fn quit(&self) -> bool {
        self.requests.send(ClientRequest::Quit).is_ok()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(&mut self, predicate: impl Fn(ClientState) -> bool) -> ClientState {
        loop {
            let current = *self.state.borrow();
            if predicate(current) {
                return current;
            }
            if self.state.changed().await.is_err() {
                return current;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;

    /// Scripted in-process client used instead of a real engine.
    struct StubClient {
        kind: SimulationKind,
        fail_init: bool,
        fail_job_ids: Vec<String>,
        ended_filters: Vec<String>,
    }

    impl StubClient {
        fn new(kind: SimulationKind) -> Self {
            Self {
                kind,
                fail_init: false,
                fail_job_ids: Vec::new(),
                ended_filters: Vec::new(),
            }
        }
    }

    impl SimulatorClient for StubClient {
        fn kind(&self) -> SimulationKind {
            self.kind
        }

        async fn initialize(&mut self, _logger: &LoggerSink) -> Result<()> {
            if self.fail_init {
                bail!("engine refused the handshake");
            }
            Ok(())
        }

        async fn run_job(
            &mut self,
            job: SimulationJob,
            _logger: &LoggerSink,
        ) -> Result<JobOutcome> {
            if self.fail_job_ids.contains(&job.job_id) {
                bail!("engine rejected the job");
            }
            Ok(JobOutcome {
                job_id: job.job_id,
                path_id: job.path_id,
                segment_index: job.segment_index,
                metrics: crate::path::CostMetrics {
                    cost: 80.0,
                    ..Default::default()
                },
                terminal_cost: None,
            })
        }

        async fn end_simulator(&mut self, filter: &str, _logger: &LoggerSink) -> Result<()> {
            self.ended_filters.push(filter.to_string());
            Ok(())
        }
    }

    fn job(id: &str) -> SimulationJob {
        SimulationJob {
            job_id: id.to_string(),
            network: "N".to_string(),
            path_id: 1,
            segment_index: 0,
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_ready_and_serves_jobs() {
        let (logger, _stream) = LoggerSink::channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (context, mut handle) =
            ClientContext::new(StubClient::new(SimulationKind::Ship), event_tx, logger);
        assert_eq!(handle.state(), ClientState::Threaded);

        handle.attach(tokio::spawn(context.run()));
        handle.wait_for(|state| state == ClientState::Ready).await;

        assert!(handle.submit_job(job("j-1")));
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Started(SimulationKind::Ship))
        ));
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Ready(SimulationKind::Ship))
        ));
        match events.recv().await {
            Some(ClientEvent::JobCompleted(outcome)) => {
                assert_eq!(outcome.job_id, "j-1");
                assert_eq!(outcome.metrics.cost, 80.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(handle.state(), ClientState::Ready);

        handle.quit();
        handle.take_join().unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn failed_initialization_parks_the_client_in_failed() {
        let (logger, _stream) = LoggerSink::channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut stub = StubClient::new(SimulationKind::Train);
        stub.fail_init = true;
        let (context, mut handle) = ClientContext::new(stub, event_tx, logger);

        handle.attach(tokio::spawn(context.run()));
        let state = handle.wait_for(ClientState::is_terminal).await;
        assert_eq!(state, ClientState::Failed);

        assert!(matches!(events.recv().await, Some(ClientEvent::Started(_))));
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Failed { kind: SimulationKind::Train, .. })
        ));

        // Jobs queued against a failed client are refused, not run.
        handle.submit_job(job("late"));
        match events.recv().await {
            Some(ClientEvent::JobFailed { job_id, .. }) => assert_eq!(job_id, "late"),
            other => panic!("unexpected event {other:?}"),
        }
        handle.quit();
    }

    #[tokio::test]
    async fn a_failing_job_does_not_abort_its_siblings() {
        let (logger, _stream) = LoggerSink::channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut stub = StubClient::new(SimulationKind::Ship);
        stub.fail_job_ids = vec!["bad".to_string()];
        let (context, mut handle) = ClientContext::new(stub, event_tx, logger);
        handle.attach(tokio::spawn(context.run()));
        handle.wait_for(|state| state == ClientState::Ready).await;

        handle.submit_job(job("bad"));
        handle.submit_job(job("good"));

        let mut failed = None;
        let mut completed = None;
        while failed.is_none() || completed.is_none() {
            match events.recv().await {
                Some(ClientEvent::JobFailed { job_id, .. }) => failed = Some(job_id),
                Some(ClientEvent::JobCompleted(outcome)) => completed = Some(outcome.job_id),
                Some(_) => {}
                None => panic!("event channel closed early"),
            }
        }
        assert_eq!(failed.as_deref(), Some("bad"));
        assert_eq!(completed.as_deref(), Some("good"));
        handle.quit();
    }

    #[tokio::test]
    async fn synchronous_runs_report_completion_through_events() {
        let (logger, _stream) = LoggerSink::channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (context, mut handle) =
            ClientContext::new(StubClient::new(SimulationKind::Ship), event_tx, logger);
        handle.attach(tokio::spawn(context.run()));
        handle.wait_for(|state| state == ClientState::Ready).await;

        assert!(handle.run_sync(vec!["*".to_string()]));
        loop {
            match events.recv().await {
                Some(ClientEvent::SyncFinished { kind, error }) => {
                    assert_eq!(kind, SimulationKind::Ship);
                    // Only the truck manager supports synchronous runs.
                    assert!(error.expect("refusal").contains("synchronously"));
                    break;
                }
                Some(_) => {}
                None => panic!("event channel closed early"),
            }
        }
        // A refused run leaves the client serving jobs.
        assert_eq!(
            handle.wait_for(|state| state == ClientState::Ready).await,
            ClientState::Ready
        );
        handle.quit();
    }

    #[tokio::test]
    async fn end_simulator_transitions_to_ended() {
        let (logger, _stream) = LoggerSink::channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (context, mut handle) =
            ClientContext::new(StubClient::new(SimulationKind::Terminal), event_tx, logger);
        handle.attach(tokio::spawn(context.run()));
        handle.wait_for(|state| state == ClientState::Ready).await;

        assert!(handle.end_simulator("*"));
        let state = handle.wait_for(ClientState::is_terminal).await;
        assert_eq!(state, ClientState::Ended);

        loop {
            match events.recv().await {
                Some(ClientEvent::Ended(SimulationKind::Terminal)) => break,
                Some(_) => {}
                None => panic!("event channel closed before Ended"),
            }
        }
        handle.quit();
        handle.take_join().unwrap().await.unwrap();
    }
}
