//! Parallel batch driver.
//!
//! Identifiers flow through a bounded work queue to a fixed pool of worker
//! threads. Each unit is isolated: a panic, a resolution failure or an
//! overrun of the unit budget becomes an `error` warning for that identifier
//! and the batch carries on. Only the calling thread touches the
//! [`RunSummary`].

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::aggregate::{AggregationEngine, RunSummary};
use crate::config::{QcConfig, SchedulerConfig};
use crate::dispatch::QcEngine;
use crate::model::UnitReport;
use crate::resolve::ArtifactSource;
use crate::QcError;

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// One report per identifier, in submission order.
    pub reports: Vec<UnitReport>,
    /// Aggregated counts.
    pub summary: RunSummary,
}

/// Fans identifiers out over worker threads.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    engine: QcEngine,
    config: SchedulerConfig,
}

impl BatchScheduler {
    /// Scheduler using the configuration's own scheduler settings.
    pub fn new(config: QcConfig) -> Self {
        let scheduler = config.scheduler.clone();
        Self::with_engine(QcEngine::new(config), scheduler)
    }

    /// Scheduler around an existing engine.
    pub fn with_engine(engine: QcEngine, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Engine that processes each unit.
    pub fn engine(&self) -> &QcEngine {
        &self.engine
    }

    /// Process every identifier and aggregate the results.
    pub fn run(
        &self,
        source: Arc<dyn ArtifactSource>,
        identifiers: impl IntoIterator<Item = String>,
    ) -> BatchOutcome {
        let identifiers: Vec<String> = identifiers.into_iter().collect();
        let started = Instant::now();
        info!(
            units = identifiers.len(),
            workers = self.config.workers,
            "starting batch"
        );

        let outcome = if self.config.workers == 0 || identifiers.len() <= 1 {
            self.run_serial(&source, identifiers)
        } else {
            self.run_parallel(&source, identifiers)
        };

        info!(
            processed = outcome.summary.processed,
            with_warnings = outcome.summary.with_warnings,
            no_qc = outcome.summary.no_qc,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        outcome
    }

    fn run_serial(&self, source: &Arc<dyn ArtifactSource>, identifiers: Vec<String>) -> BatchOutcome {
        let mut aggregation = AggregationEngine::new();
        let reports: Vec<UnitReport> = identifiers
            .iter()
            .map(|identifier| {
                let report = self.run_unit(source, identifier);
                aggregation.absorb(&report);
                report
            })
            .collect();
        BatchOutcome {
            reports,
            summary: aggregation.into_summary(),
        }
    }

    fn run_parallel(&self, source: &Arc<dyn ArtifactSource>, identifiers: Vec<String>) -> BatchOutcome {
        let total = identifiers.len();
        let workers = self.config.workers.min(total);
        let (job_tx, job_rx) = bounded::<(usize, String)>(self.config.capacity());
        let (result_tx, result_rx) = bounded::<(usize, UnitReport)>(self.config.capacity());

        let mut aggregation = AggregationEngine::new();
        let mut slots: Vec<Option<UnitReport>> = vec![None; total];

        thread::scope(|scope| {
            scope.spawn(move || {
                for job in identifiers.into_iter().enumerate() {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    debug!(worker, "worker started");
                    for (index, identifier) in job_rx.iter() {
                        let report = self.run_unit(source, &identifier);
                        if result_tx.send((index, report)).is_err() {
                            break;
                        }
                    }
                    debug!(worker, "worker finished");
                });
            }
            drop(result_tx);

            for (index, report) in result_rx.iter() {
                aggregation.absorb(&report);
                slots[index] = Some(report);
            }
        });

        BatchOutcome {
            reports: slots.into_iter().flatten().collect(),
            summary: aggregation.into_summary(),
        }
    }

    fn run_unit(&self, source: &Arc<dyn ArtifactSource>, identifier: &str) -> UnitReport {
        let Some(limit) = self.config.unit_timeout else {
            return self.engine.process(source.as_ref(), identifier);
        };

        let (tx, rx) = bounded(1);
        let engine = self.engine.clone();
        let unit_source = Arc::clone(source);
        let unit_identifier = identifier.to_string();
        let spawned = thread::Builder::new()
            .name(format!("qc-unit-{identifier}"))
            .spawn(move || {
                let report = engine.process(unit_source.as_ref(), &unit_identifier);
                // the receiver is gone when the unit already timed out
                let _ = tx.send(report);
            });
        if let Err(err) = spawned {
            return UnitReport::failed(identifier, &QcError::Worker(format!("unable to spawn unit thread: {err}")));
        }

        match rx.recv_timeout(limit) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout) => {
                warn!(identifier, limit_ms = limit.as_millis() as u64, "unit timed out");
                UnitReport::failed(identifier, &QcError::Timeout(limit))
            }
            Err(RecvTimeoutError::Disconnected) => UnitReport::failed(
                identifier,
                &QcError::Worker("unit thread exited without a report".to_string()),
            ),
        }
    }
}
