//! Client for the rail-freight engine.

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

/// One rail network the engine should load: name plus node and link files.
#[derive(Debug, Clone)]
struct NetworkFiles {
    name: String,
    node_file: PathBuf,
    link_file: PathBuf,
}

/// Speaks to one train simulator instance over its stdio link.
pub struct TrainSimulationClient {
    exe: PathBuf,
    networks: Vec<NetworkFiles>,
    process: Option<SimulatorProcess>,
}

impl TrainSimulationClient {
    /// Client for the engine binary at `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            networks: Vec::new(),
            process: None,
        }
    }

    /// Queue a rail network (node file + link file) for loading during
    /// initialization.
    pub fn add_network(
        &mut self,
        name: impl Into<String>,
        node_file: impl Into<PathBuf>,
        link_file: impl Into<PathBuf>,
    ) {
        self.networks.push(NetworkFiles {
            name: name.into(),
            node_file: node_file.into(),
            link_file: link_file.into(),
        });
    }

    /// Names of the networks queued for loading.
    pub fn network_names(&self) -> Vec<&str> {
        self.networks
            .iter()
            .map(|network| network.name.as_str())
            .collect()
    }
}

impl SimulatorClient for TrainSimulationClient {
    fn kind(&self) -> SimulationKind {
        SimulationKind::Train
    }

    async fn initialize(&mut self, logger: &LoggerSink) -> Result<()> {
        let mut process =
            connect_with_retry(&self.exe, "train", logger, CONNECT_ATTEMPTS).await?;
        for network in &self.networks {
            let reply = process
                .request(&json!({
                    "command": "load_network",
                    "name": network.name,
                    "nodes": network.node_file.display().to_string(),
                    "links": network.link_file.display().to_string(),
                }))
                .await?;
            ensure_ok(&reply, &format!("rail network '{}'", network.name))?;
        }
        self.process = Some(process);
        logger.info(
            ClientKind::Simulation,
            format!("train simulator connected with {} networks", self.networks.len()),
        );
        Ok(())
    }

    async fn run_job(&mut self, job: SimulationJob, logger: &LoggerSink) -> Result<JobOutcome> {
        let process = self
            .process
            .as_mut()
            .context("train simulator is not connected")?;
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
            logger.info(ClientKind::Simulation, "train simulator ended");
        } else {
            let reply = process
                .request(&json!({"command": "end", "filter": filter}))
                .await?;
            ensure_ok(&reply, "the end request")?;
            self.process = Some(process);
            logger.info(
                ClientKind::Simulation,
                format!("train simulator ended instances matching '{filter}'"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_networks_are_reported_in_order() {
        let mut client = TrainSimulationClient::new("/bin/trainSim");
        client.add_network("east", "/tmp/e-nodes.dat", "/tmp/e-links.dat");
        client.add_network("west", "/tmp/w-nodes.dat", "/tmp/w-links.dat");
        assert_eq!(client.network_names(), ["east", "west"]);
    }
}
