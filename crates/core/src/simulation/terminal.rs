//! Client for the intermodal-terminal engine.

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

/// Speaks to one intermodal-terminal simulator over its stdio link.
///
/// Terminal jobs simulate container handling at the terminals joining two
/// path segments; their outcomes carry the terminal-cost component of a
/// path.
pub struct TerminalSimulationClient {
    exe: PathBuf,
    terminal_file: Option<PathBuf>,
    process: Option<SimulatorProcess>,
}

impl TerminalSimulationClient {
    /// Client for the engine binary at `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            terminal_file: None,
            process: None,
        }
    }

    /// Terminal descriptor file loaded during initialization.
    pub fn set_terminal_file(&mut self, file: impl Into<PathBuf>) {
        self.terminal_file = Some(file.into());
    }
}

impl SimulatorClient for TerminalSimulationClient {
    fn kind(&self) -> SimulationKind {
        SimulationKind::Terminal
    }

    async fn initialize(&mut self, logger: &LoggerSink) -> Result<()> {
        let mut process =
            connect_with_retry(&self.exe, "terminal", logger, CONNECT_ATTEMPTS).await?;
        if let Some(file) = &self.terminal_file {
            let reply = process
                .request(&json!({
                    "command": "load_terminals",
                    "file": file.display().to_string(),
                }))
                .await?;
            ensure_ok(&reply, "the terminal descriptors")?;
        }
        self.process = Some(process);
        logger.info(ClientKind::Simulation, "terminal simulator connected");
        Ok(())
    }

    async fn run_job(&mut self, job: SimulationJob, logger: &LoggerSink) -> Result<JobOutcome> {
        let process = self
            .process
            .as_mut()
            .context("terminal simulator is not connected")?;
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
            logger.info(ClientKind::Simulation, "terminal simulator ended");
        } else {
            let reply = process
                .request(&json!({"command": "end", "filter": filter}))
                .await?;
            ensure_ok(&reply, "the end request")?;
            self.process = Some(process);
            logger.info(
                ClientKind::Simulation,
                format!("terminal simulator ended instances matching '{filter}'"),
            );
        }
        Ok(())
    }
}
