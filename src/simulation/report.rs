//! Simulation outcome reporting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The decision made for one simulated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Worker that issued the request
    pub worker: usize,
    /// Position of the request within its worker's sequence
    pub index: usize,
    /// Whether the limiter admitted the request
    pub admitted: bool,
    /// Milliseconds since the simulation started
    pub offset_ms: u64,
}

/// Aggregated results of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Algorithm that made the decisions
    pub algorithm: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Every decision, in the order it was recorded
    pub outcomes: Vec<Outcome>,
    /// Number of admitted requests
    pub admitted: usize,
    /// Number of rejected requests
    pub blocked: usize,
    /// Whether a shutdown signal cut the run short
    pub interrupted: bool,
}

impl SimulationReport {
    /// Create an empty report.
    pub fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            admitted: 0,
            blocked: 0,
            interrupted: false,
        }
    }

    /// Record one decision.
    pub fn record(&mut self, outcome: Outcome) {
        if outcome.admitted {
            self.admitted += 1;
        } else {
            self.blocked += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Total number of decisions recorded.
    pub fn total(&self) -> usize {
        self.admitted + self.blocked
    }

    /// Serialize the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.algorithm)?;
        for outcome in &self.outcomes {
            let verdict = if outcome.admitted { "ALLOWED" } else { "BLOCKED" };
            writeln!(
                f,
                "[worker {}] Request {}: {} (+{}ms)",
                outcome.worker, outcome.index, verdict, outcome.offset_ms
            )?;
        }
        write!(
            f,
            "{} admitted, {} blocked of {} requests",
            self.admitted,
            self.blocked,
            self.total()
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, admitted: bool) -> Outcome {
        Outcome {
            worker: 0,
            index,
            admitted,
            offset_ms: index as u64 * 10,
        }
    }

    #[test]
    fn test_record_counts() {
        let mut report = SimulationReport::new("token_bucket");
        report.record(outcome(0, true));
        report.record(outcome(1, true));
        report.record(outcome(2, false));

        assert_eq!(report.admitted, 2);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.outcomes.len(), 3);
    }

    #[test]
    fn test_display_summary() {
        let mut report = SimulationReport::new("sliding_window_log");
        report.record(outcome(0, true));
        report.record(outcome(1, false));

        let rendered = report.to_string();
        assert!(rendered.starts_with("=== sliding_window_log ==="));
        assert!(rendered.contains("Request 0: ALLOWED"));
        assert!(rendered.contains("Request 1: BLOCKED"));
        assert!(rendered.ends_with("1 admitted, 1 blocked of 2 requests"));
    }

    #[test]
    fn test_to_json() {
        let mut report = SimulationReport::new("token_bucket");
        report.record(outcome(0, true));

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["algorithm"], "token_bucket");
        assert_eq!(value["admitted"], 1);
        assert_eq!(value["outcomes"][0]["admitted"], true);
        assert_eq!(value["interrupted"], false);
    }
}
