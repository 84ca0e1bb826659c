//! The road-freight engine: per-network clients behind one manager.
//!
//! Truck simulation differs from the other modes: each logical network gets
//! its own engine instance, and a [`TruckSimulationManager`] owns all of
//! them. The manager is what lives on the truck worker context;
//! [`run_simulation_sync`] deliberately blocks that context until every
//! selected instance finishes, so it must never run on the GUI context.
//!
//! [`run_simulation_sync`]: TruckSimulationManager::run_simulation_sync

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::logger::{ClientKind, LoggerSink};

use super::client::{SimulationKind, SimulatorClient};
use super::job::{outcome_from_reply, JobOutcome, SimulationJob};
use super::process::{connect_with_retry, ensure_ok, SimulatorProcess};

const CONNECT_ATTEMPTS: usize = 3;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Engine instance for one logical truck network.
pub struct TruckSimulationClient {
    network: String,
    exe: PathBuf,
    config_file: Option<PathBuf>,
    process: Option<SimulatorProcess>,
}

impl TruckSimulationClient {
    /// Client for `network`, backed by the engine binary at `exe`.
    pub fn new(network: impl Into<String>, exe: impl Into<PathBuf>) -> Self {
        Self {
            network: network.into(),
            exe: exe.into(),
            config_file: None,
            process: None,
        }
    }

    /// Master configuration document loaded during connect.
    pub fn set_config_file(&mut self, file: impl Into<PathBuf>) {
        self.config_file = Some(file.into());
    }

    /// Logical network this instance serves.
    pub fn network(&self) -> &str {
        &self.network
    }

    async fn connect(&mut self, logger: &LoggerSink) -> Result<()> {
        let mut process =
            connect_with_retry(&self.exe, "truck", logger, CONNECT_ATTEMPTS).await?;
        if let Some(file) = &self.config_file {
            let reply = process
                .request(&json!({
                    "command": "load_config",
                    "file": file.display().to_string(),
                }))
                .await?;
            ensure_ok(&reply, &format!("truck network '{}'", self.network))?;
        }
        self.process = Some(process);
        logger.info(
            ClientKind::Simulation,
            format!("truck simulator for '{}' connected", self.network),
        );
        Ok(())
    }

    async fn run_job(&mut self, job: SimulationJob, logger: &LoggerSink) -> Result<JobOutcome> {
        let process = self.process.as_mut().with_context(|| {
            format!("truck simulator for '{}' is not connected", self.network)
        })?;
        logger.progress(ClientKind::Simulation, &job.job_id, 0.0);
        let reply = process
            .request(&json!({
                "command": "simulate",
                "jobId": job.job_id,
                "network": job.network,
                "payload": job.payload,
            }))
            .await?;
        let outcome = outcome_from_reply(&job, &reply)?;
        logger.progress(ClientKind::Simulation, &job.job_id, 100.0);
        Ok(outcome)
    }

    /// Run this instance's full simulation to completion, blocking the
    /// caller until the engine reports done.
    async fn run_sync(&mut self, logger: &LoggerSink) -> Result<()> {
        let process = self.process.as_mut().with_context(|| {
            format!("truck simulator for '{}' is not connected", self.network)
        })?;
        let reply = process
            .request(&json!({"command": "run", "network": self.network}))
            .await?;
        ensure_ok(&reply, &format!("the run on '{}'", self.network))?;
        logger.info(
            ClientKind::Simulation,
            format!("truck simulation on '{}' completed", self.network),
        );
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(process) = self.process.take() {
            process.shutdown(SHUTDOWN_GRACE).await?;
        }
        Ok(())
    }
}

/// Owns every per-network truck client; this is the truck worker's client.
#[derive(Default)]
pub struct TruckSimulationManager {
    clients: BTreeMap<String, TruckSimulationClient>,
}

impl TruckSimulationManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `client`, keyed by `name`. Returns `false` when
    /// the name is taken (the client is dropped in that case).
    pub fn register_client(&mut self, name: impl Into<String>, client: TruckSimulationClient) -> bool {
        let name = name.into();
        if self.clients.contains_key(&name) {
            return false;
        }
        self.clients.insert(name, client);
        true
    }

    /// Registered logical network names, sorted.
    pub fn client_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    /// Drive the selected instances to completion, one after another, on
    /// the calling (worker) context. `"*"` anywhere in `networks` selects
    /// every instance. Never invoke from the GUI context.
    pub async fn run_simulation_sync(
        &mut self,
        networks: &[String],
        logger: &LoggerSink,
    ) -> Result<()> {
        let all = networks.iter().any(|network| network == "*");
        for (name, client) in self.clients.iter_mut() {
            if all || networks.contains(name) {
                client.run_sync(logger).await?;
            }
        }
        Ok(())
    }
}

impl SimulatorClient for TruckSimulationManager {
    fn kind(&self) -> SimulationKind {
        SimulationKind::Truck
    }

    async fn initialize(&mut self, logger: &LoggerSink) -> Result<()> {
        for (name, client) in self.clients.iter_mut() {
            client
                .connect(logger)
                .await
                .with_context(|| format!("truck network '{name}' failed to connect"))?;
        }
        Ok(())
    }

    async fn run_job(&mut self, job: SimulationJob, logger: &LoggerSink) -> Result<JobOutcome> {
        let Some(client) = self.clients.get_mut(&job.network) else {
            bail!(
                "job {} targets unknown truck network '{}'",
                job.job_id,
                job.network
            );
        };
        client.run_job(job, logger).await
    }

    async fn run_sync(&mut self, networks: Vec<String>, logger: &LoggerSink) -> Result<()> {
        self.run_simulation_sync(&networks, logger).await
    }

    /// Terminate the instances matching `filter` (`"*"` = all). This only
    /// ever terminates; running a simulation is `run_simulation_sync`'s
    /// job. Per-instance failures are logged and do not stop the sweep.
    async fn end_simulator(&mut self, filter: &str, logger: &LoggerSink) -> Result<()> {
        for (name, client) in self.clients.iter_mut() {
            if filter != "*" && name != filter {
                continue;
            }
            if let Err(err) = client.terminate().await {
                logger.error(
                    ClientKind::Simulation,
                    format!("truck simulator for '{name}' failed to end: {err:#}"),
                );
            } else {
                logger.info(
                    ClientKind::Simulation,
                    format!("truck simulator for '{name}' ended"),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_client_refuses_duplicate_names() {
        let mut manager = TruckSimulationManager::new();
        assert!(manager.register_client(
            "MainTruckNetwork",
            TruckSimulationClient::new("MainTruckNetwork", "/bin/truckSim"),
        ));
        assert!(!manager.register_client(
            "MainTruckNetwork",
            TruckSimulationClient::new("MainTruckNetwork", "/bin/truckSim"),
        ));
        assert_eq!(manager.client_names(), ["MainTruckNetwork"]);
    }

    #[tokio::test]
    async fn routing_an_unknown_network_fails_without_side_effects() {
        let (logger, _stream) = LoggerSink::channel();
        let mut manager = TruckSimulationManager::new();
        let job = SimulationJob {
            job_id: "j-1".to_string(),
            network: "nowhere".to_string(),
            path_id: 1,
            segment_index: 0,
            payload: json!({}),
        };
        let err = manager.run_job(job, &logger).await.unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn sync_run_selection_skips_unselected_instances() {
        let (logger, _stream) = LoggerSink::channel();
        let mut manager = TruckSimulationManager::new();
        manager.register_client(
            "MainTruckNetwork",
            TruckSimulationClient::new("MainTruckNetwork", "/bin/truckSim"),
        );

        // Nothing selected, nothing runs.
        manager
            .run_simulation_sync(&[], &logger)
            .await
            .expect("empty selection");
        manager
            .run_simulation_sync(&["other".to_string()], &logger)
            .await
            .expect("unmatched selection");

        // "*" selects the registered instance, which has no engine yet.
        let err = manager
            .run_simulation_sync(&["*".to_string()], &logger)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }

    #[tokio::test]
    async fn ending_with_no_connected_instances_is_a_no_op() {
        let (logger, _stream) = LoggerSink::channel();
        let mut manager = TruckSimulationManager::new();
        manager.register_client(
            "MainTruckNetwork",
            TruckSimulationClient::new("MainTruckNetwork", "/bin/truckSim"),
        );
        manager.end_simulator("*", &logger).await.expect("end");
    }
}
