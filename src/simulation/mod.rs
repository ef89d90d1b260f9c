//! Simulated traffic driving a limiter.
//!
//! The simulation plays the role of a request handler: it asks the limiter
//! for a decision once per request and records what happened. Sequential
//! runs pace requests with a fixed interval plus optional jitter; concurrent
//! runs fan out several workers that fire without pausing.

mod report;

pub use report::{Outcome, SimulationReport};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::ratelimit::Admission;

/// Drives a limiter with simulated requests.
pub struct Simulation {
    /// The limiter under test
    limiter: Arc<dyn Admission>,
    /// Traffic shape
    config: SimulationConfig,
}

impl Simulation {
    /// Create a simulation for the given limiter.
    pub fn new(limiter: Arc<dyn Admission>, config: SimulationConfig) -> Self {
        Self { limiter, config }
    }

    /// Run sequential requests to completion.
    pub async fn run(&self) -> SimulationReport {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run sequential requests, stopping early when `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> SimulationReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut report = SimulationReport::new(self.limiter.algorithm());
        let started = Instant::now();

        info!(
            algorithm = self.limiter.algorithm(),
            requests = self.config.requests,
            interval_ms = self.config.interval_ms,
            "Starting sequential simulation"
        );

        for index in 0..self.config.requests {
            let admitted = self.limiter.admit();
            log_decision(0, index, admitted);
            report.record(Outcome {
                worker: 0,
                index,
                admitted,
                offset_ms: elapsed_ms(started),
            });

            if index + 1 == self.config.requests {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.next_pause()) => {}
                _ = &mut shutdown => {
                    info!(completed = index + 1, "Simulation interrupted");
                    report.interrupted = true;
                    break;
                }
            }
        }

        report
    }

    /// Run `workers` concurrent callers, each issuing `requests` back to back.
    pub async fn run_concurrent(&self) -> SimulationReport {
        let mut report = SimulationReport::new(self.limiter.algorithm());
        let started = Instant::now();
        let requests = self.config.requests;

        info!(
            algorithm = self.limiter.algorithm(),
            workers = self.config.workers,
            requests,
            "Starting concurrent simulation"
        );

        let mut tasks = JoinSet::new();
        for worker in 0..self.config.workers {
            let limiter = Arc::clone(&self.limiter);
            tasks.spawn(async move {
                (0..requests)
                    .map(|index| {
                        let admitted = limiter.admit();
                        log_decision(worker, index, admitted);
                        Outcome {
                            worker,
                            index,
                            admitted,
                            offset_ms: elapsed_ms(started),
                        }
                    })
                    .collect::<Vec<_>>()
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcomes) => outcomes.into_iter().for_each(|o| report.record(o)),
                Err(e) => warn!(error = %e, "Simulation worker failed"),
            }
        }

        report
            .outcomes
            .sort_by_key(|o| (o.offset_ms, o.worker, o.index));
        report
    }

    /// Pause before the next sequential request.
    fn next_pause(&self) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.interval_ms.saturating_add(jitter))
    }
}

fn log_decision(worker: usize, index: usize, admitted: bool) {
    if admitted {
        debug!(worker, request = index, "Request {}: ALLOWED", index);
    } else {
        debug!(worker, request = index, "Request {}: BLOCKED", index);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
