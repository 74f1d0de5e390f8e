//! Parallel diagnosis of many call trees
//!
//! Each tree is diagnosed by its own session; sessions share nothing but the
//! engine's read-only plan. Jobs are fed to a fixed set of scoped worker
//! threads through a channel, and reports come back in job order.
//!
//! ```text
//! jobs ──► channel ──► worker 1..N (DiagnosisEngine::diagnose) ──► channel ──► reports
//! ```
//!
//! A failing job only fails its own report.

use crate::config::DiagnosisConfig;
use crate::diagnosis::{DiagnosisEngine, DiagnosisError, Result};
use crate::engine::SessionVariables;
use crate::invocation::{InvocationTree, NodeId};
use crate::results::ProblemOccurrence;
use crossbeam::channel;

/// One tree to diagnose
#[derive(Debug, Clone)]
pub struct DiagnosisJob {
    /// Caller-chosen name, e.g. the trace file path
    pub label: String,
    pub tree: InvocationTree,
    pub root: NodeId,
}

impl DiagnosisJob {
    pub fn new(label: impl Into<String>, tree: InvocationTree, root: NodeId) -> Self {
        Self {
            label: label.into(),
            tree,
            root,
        }
    }
}

/// Outcome of one job
#[derive(Debug)]
pub struct DiagnosisReport {
    pub label: String,
    pub outcome: Result<Vec<ProblemOccurrence>>,
}

impl DiagnosisReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Diagnoses batches of trees on a bounded worker pool
#[derive(Debug, Clone)]
pub struct DiagnosisService {
    engine: DiagnosisEngine,
    variables: SessionVariables,
    workers: usize,
}

impl DiagnosisService {
    pub fn new(config: &DiagnosisConfig) -> Result<Self> {
        Ok(Self::from_engine(
            DiagnosisEngine::new(config)?,
            config.session_variables(),
            config.workers,
        ))
    }

    pub fn from_engine(
        engine: DiagnosisEngine,
        variables: SessionVariables,
        workers: usize,
    ) -> Self {
        Self {
            engine,
            variables,
            workers: workers.max(1),
        }
    }

    pub fn engine(&self) -> &DiagnosisEngine {
        &self.engine
    }

    pub fn diagnose_one(&self, job: &DiagnosisJob) -> DiagnosisReport {
        let mut occurrences = Vec::new();
        let outcome = self
            .engine
            .diagnose(&job.tree, job.root, &self.variables, &mut occurrences)
            .map(|_| occurrences);

        if let Err(err) = &outcome {
            tracing::warn!(job = %job.label, error = %err, "diagnosis failed");
        }

        DiagnosisReport {
            label: job.label.clone(),
            outcome,
        }
    }

    /// Diagnose every job; reports are returned in job order
    pub fn diagnose_all(&self, jobs: Vec<DiagnosisJob>) -> Vec<DiagnosisReport> {
        let labels: Vec<String> = jobs.iter().map(|job| job.label.clone()).collect();
        let workers = self.workers.min(jobs.len()).max(1);
        tracing::debug!(jobs = jobs.len(), workers, "diagnosing batch");

        let (job_tx, job_rx) = channel::unbounded::<(usize, DiagnosisJob)>();
        let (report_tx, report_rx) = channel::unbounded::<(usize, DiagnosisReport)>();
        for entry in jobs.into_iter().enumerate() {
            // the receiver is alive until the scope below ends
            let _ = job_tx.send(entry);
        }
        drop(job_tx);

        let scoped = crossbeam::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let report_tx = report_tx.clone();
                scope.spawn(move |_| {
                    for (index, job) in job_rx.iter() {
                        let report = self.diagnose_one(&job);
                        if report_tx.send((index, report)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(report_tx);
        if scoped.is_err() {
            tracing::warn!("a diagnosis worker panicked");
        }

        let mut slots: Vec<Option<DiagnosisReport>> = labels.iter().map(|_| None).collect();
        for (index, report) in report_rx.iter() {
            slots[index] = Some(report);
        }

        slots
            .into_iter()
            .zip(labels)
            .map(|(slot, label)| {
                slot.unwrap_or(DiagnosisReport {
                    label,
                    outcome: Err(DiagnosisError::WorkerLost),
                })
            })
            .collect()
    }
}
