//! Client for the sea-freight engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::logger::{ClientKind, LoggerSink};

use super::client::{SimulationKind, SimulatorClient};
use super::job::{outcome_from_reply, JobOutcome, SimulationJob};
use super::process::{connect_with_retry, ensure_ok, SimulatorProcess};

const CONNECT_ATTEMPTS: usize = 3;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Speaks to one ship simulator instance over its stdio link.
pub struct ShipSimulationClient {
    exe: PathBuf,
    network_file: Option<PathBuf>,
    process: Option<SimulatorProcess>,
}

impl ShipSimulationClient {
    /// Client for the engine binary at `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            network_file: None,
            process: None,
        }
    }

    /// Sea-route network descriptor loaded during initialization.
    pub fn set_network_file(&mut self, file: impl Into<PathBuf>) {
        self.network_file = Some(file.into());
    }
}

impl SimulatorClient for ShipSimulationClient {
    fn kind(&self) -> SimulationKind {
        SimulationKind::Ship
    }

    async fn initialize(&mut self, logger: &LoggerSink) -> Result<()> {
        let mut process =
            connect_with_retry(&self.exe, "ship", logger, CONNECT_ATTEMPTS).await?;
        if let Some(file) = &self.network_file {
            let reply = process
                .request(&json!({
                    "command": "load_network",
                    "file": file.display().to_string(),
                }))
                .await?;
            ensure_ok(&reply, "the sea-route network")?;
        }
        self.process = Some(process);
        logger.info(ClientKind::Simulation, "ship simulator connected");
        Ok(())
    }

    async fn run_job(&mut self, job: SimulationJob, logger: &LoggerSink) -> Result<JobOutcome> {
        let process = self
            .process
            .as_mut()
            .context("ship simulator is not connected")?;
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

    async fn end_simulator(&mut self, filter: &str, logger: &LoggerSink) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        if filter == "*" {
            process.shutdown(SHUTDOWN_GRACE).await?;
            logger.info(ClientKind::Simulation, "ship simulator ended");
        } else {
            let reply = process
                .request(&json!({"command": "end", "filter": filter}))
                .await?;
            ensure_ok(&reply, "the end request")?;
            // A selective end keeps the engine itself alive.
            self.process = Some(process);
            logger.info(
                ClientKind::Simulation,
                format!("ship simulator ended instances matching '{filter}'"),
            );
        }
        Ok(())
    }
}
