//! Job batches dispatched to the engines and their outcomes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::CostMetrics;

/// One unit of work for a simulation engine: one path segment simulated on
/// one named network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationJob {
    /// Identifier reported back in progress and error events.
    pub job_id: String,
    /// Logical network the job runs on.
    pub network: String,
    /// Path this job's segment belongs to.
    pub path_id: i64,
    /// Index of the segment within the path.
    pub segment_index: usize,
    /// Engine-specific request body, opaque to the core.
    pub payload: Value,
}

/// Result of one successfully simulated job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// The job this outcome answers.
    pub job_id: String,
    /// Path the segment belongs to.
    pub path_id: i64,
    /// Segment index within the path.
    pub segment_index: usize,
    /// Actual per-attribute values reported by the engine.
    pub metrics: CostMetrics,
    /// Terminal handling cost attributed to this segment, if the engine
    /// reports one.
    pub terminal_cost: Option<f64>,
}

/// Decode an engine reply into an outcome for `job`.
///
/// Replies carry `{"status": "ok", "results": {...}}` on success and
/// `{"status": "error", "error": "..."}` on failure; a reported failure is
/// surfaced as an error, never as a partial outcome.
pub(crate) fn outcome_from_reply(job: &SimulationJob, reply: &Value) -> Result<JobOutcome> {
    match reply.get("status").and_then(Value::as_str) {
        Some("ok") => {}
        Some("error") => {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified simulator error");
            bail!("job {} failed: {message}", job.job_id);
        }
        other => bail!(
            "job {} got a reply with status {:?}",
            job.job_id,
            other.unwrap_or("missing")
        ),
    }

    let results = reply
        .get("results")
        .cloned()
        .with_context(|| format!("job {} reply carries no results", job.job_id))?;
    let metrics: CostMetrics = serde_json::from_value(results)
        .with_context(|| format!("job {} reply has malformed results", job.job_id))?;

    Ok(JobOutcome {
        job_id: job.job_id.clone(),
        path_id: job.path_id,
        segment_index: job.segment_index,
        metrics,
        terminal_cost: reply.get("terminalCost").and_then(Value::as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> SimulationJob {
        SimulationJob {
            job_id: "j-1".to_string(),
            network: "N".to_string(),
            path_id: 7,
            segment_index: 0,
            payload: json!({}),
        }
    }

    #[test]
    fn ok_reply_decodes_metrics_and_terminal_cost() {
        let reply = json!({
            "status": "ok",
            "results": {
                "carbonEmissions": 1.5,
                "cost": 80.0,
                "distance": 120.0,
                "energyConsumption": 300.0,
                "risk": 0.002,
                "travelTime": 2.5
            },
            "terminalCost": 30.0
        });
        let outcome = outcome_from_reply(&job(), &reply).expect("decode");
        assert_eq!(outcome.path_id, 7);
        assert_eq!(outcome.metrics.cost, 80.0);
        assert_eq!(outcome.metrics.travel_time, 2.5);
        assert_eq!(outcome.terminal_cost, Some(30.0));
    }

    #[test]
    fn error_reply_surfaces_the_engine_message() {
        let reply = json!({"status": "error", "error": "no route"});
        let err = outcome_from_reply(&job(), &reply).unwrap_err();
        assert!(err.to_string().contains("no route"));
    }

    #[test]
    fn missing_results_are_not_a_partial_success() {
        let reply = json!({"status": "ok"});
        assert!(outcome_from_reply(&job(), &reply).is_err());
    }
}
