use crate::errors::Result;
use crate::model::QuestionStatus;
use crate::storage::{QualityAggregates, Store};
use tracing::{debug, info};

const RUN_NAME: &str = "bank_snapshot";

#[derive(Debug, Clone)]
pub struct BankSnapshot {
    pub questions: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub needs_review: usize,
    pub quality: QualityAggregates,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Collected(BankSnapshot),
    /// Skipped because the previous run is newer than the interval.
    RateLimited { last_run_unix: i64 },
}

/// Aggregate reporting over the bank and its quality-metric history. Runs are
/// stamped in `metrics_runs` so repeated invocations inside the interval are
/// no-ops.
pub struct MetricsCollector {
    store: Store,
}

impl MetricsCollector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Result<BankSnapshot> {
        let questions = self.store.list_questions(false)?;
        let mut snap = BankSnapshot {
            questions: questions.len(),
            approved: 0,
            pending: 0,
            rejected: 0,
            needs_review: 0,
            quality: self.store.quality_aggregates()?,
        };
        for q in &questions {
            match q.status {
                QuestionStatus::Approved => snap.approved += 1,
                QuestionStatus::Pending | QuestionStatus::Draft => snap.pending += 1,
                QuestionStatus::Rejected => snap.rejected += 1,
            }
            if q.needs_review {
                snap.needs_review += 1;
            }
        }
        Ok(snap)
    }

    /// Collect a snapshot unless one was stamped within `min_interval_secs`.
    pub fn run(&self, min_interval_secs: i64) -> Result<RunOutcome> {
        let now = chrono::Utc::now().timestamp();
        if let Some(last) = self.store.metrics_last_run(RUN_NAME)? {
            if now - last < min_interval_secs {
                debug!(last_run_unix = last, "metrics run skipped");
                return Ok(RunOutcome::RateLimited { last_run_unix: last });
            }
        }
        let snap = self.snapshot()?;
        self.store.metrics_stamp(RUN_NAME, now)?;
        info!(
            questions = snap.questions,
            approved = snap.approved,
            needs_review = snap.needs_review,
            "metrics collected"
        );
        Ok(RunOutcome::Collected(snap))
    }
}
