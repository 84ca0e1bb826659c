//! Child-process link to an external simulation engine.
//!
//! Engines are spawned with piped stdio and spoken to in JSON lines: one
//! request object per line out, one reply object per line back.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::info;

/// One running engine process.
#[derive(Debug)]
pub struct SimulatorProcess {
    exe: PathBuf,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl SimulatorProcess {
    /// Spawn the engine binary at `exe`.
    pub async fn spawn(exe: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn simulator {}", exe.display()))?;

        let stdin = child
            .stdin
            .take()
            .context("simulator child has no stdin pipe")?;
        let stdout = BufReader::new(
            child
                .stdout
                .take()
                .context("simulator child has no stdout pipe")?,
        )
        .lines();

        info!("spawned simulator {}", exe.display());
        Ok(Self {
            exe: exe.to_path_buf(),
            child,
            stdin,
            stdout,
        })
    }

    /// Spawn and perform the hello handshake in one step.
    pub async fn connect(exe: &Path, mode: &str) -> Result<Self> {
        let mut process = Self::spawn(exe, &[]).await?;
        let reply = process
            .request(&json!({"command": "hello", "mode": mode}))
            .await
            .context("simulator handshake failed")?;
        if reply.get("status").and_then(Value::as_str) != Some("ok") {
            bail!(
                "simulator {} rejected the handshake: {reply}",
                process.exe.display()
            );
        }
        Ok(process)
    }

    /// Send one request and wait for its reply line.
    pub async fn request(&mut self, payload: &Value) -> Result<Value> {
        let mut line = serde_json::to_string(payload)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write to simulator {}", self.exe.display()))?;
        self.stdin.flush().await?;

        let reply = self
            .stdout
            .next_line()
            .await
            .with_context(|| format!("failed to read from simulator {}", self.exe.display()))?
            .with_context(|| format!("simulator {} closed its stdout", self.exe.display()))?;
        serde_json::from_str(&reply)
            .with_context(|| format!("malformed reply from simulator {}", self.exe.display()))
    }

    /// Ask the engine to exit, killing it when it overstays `grace`.
    pub async fn shutdown(mut self, grace: Duration) -> Result<()> {
        // The engine may already be gone; a failed write is not an error
        // worth surfacing during shutdown.
        let _ = self.request(&json!({"command": "shutdown"})).await;
        match timeout(grace, self.child.wait()).await {
            Ok(status) => {
                status.with_context(|| {
                    format!("failed waiting for simulator {}", self.exe.display())
                })?;
            }
            Err(_) => {
                self.child
                    .kill()
                    .await
                    .with_context(|| format!("failed to kill simulator {}", self.exe.display()))?;
            }
        }
        info!("simulator {} shut down", self.exe.display());
        Ok(())
    }
}

/// Fail unless a control-command reply carries `"status": "ok"`.
pub(crate) fn ensure_ok(reply: &Value, what: &str) -> Result<()> {
    if reply.get("status").and_then(Value::as_str) == Some("ok") {
        Ok(())
    } else {
        bail!("simulator refused {what}: {reply}")
    }
}

/// Connect with bounded retries. Transient spawn/handshake failures are
/// logged and retried; the last failure is surfaced.
pub(crate) async fn connect_with_retry(
    exe: &Path,
    mode: &str,
    logger: &crate::logger::LoggerSink,
    attempts: usize,
) -> Result<SimulatorProcess> {
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match SimulatorProcess::connect(exe, mode).await {
            Ok(process) => return Ok(process),
            Err(err) => {
                logger.warning(
                    crate::logger::ClientKind::Simulation,
                    format!("{mode} simulator connect attempt {attempt} failed: {err:#}"),
                );
                last_err = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawning_a_missing_binary_fails_with_context() {
        let err = SimulatorProcess::spawn(Path::new("/nonexistent/simulator"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/simulator"));
    }
}
