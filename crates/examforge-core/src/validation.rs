use crate::errors::{Error, Result};
use crate::model::{
    Classification, QuestionStatus, RequestStatus, ReviewType, UserContext, ValidationRecord,
    ValidationRequest,
};
use crate::storage::Store;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ValidationStats {
    pub pending_requests: usize,
    pub approved: usize,
    pub rejected: usize,
    pub needs_review: usize,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: ValidationRecord,
    /// Refreshed open-request list for the caller.
    pub pending: Vec<ValidationRequest>,
    pub stats: ValidationStats,
}

/// Human-in-the-loop review queue. No locking: if two reviewers submit for
/// the same question concurrently, the last writer wins.
pub struct ValidationService {
    store: Store,
}

impl ValidationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn request_validation(
        &self,
        ctx: &UserContext,
        question_id: &str,
        review_type: ReviewType,
        assignee: Option<&str>,
    ) -> Result<i64> {
        ctx.authorize_write()?;
        let q = self.store.get_question(question_id)?;
        if q.deleted {
            return Err(Error::not_found("question", question_id));
        }
        let id = self
            .store
            .insert_validation_request(question_id, review_type, assignee)?;
        info!(
            question = question_id,
            request = id,
            review_type = review_type.as_str(),
            "validation requested"
        );
        Ok(id)
    }

    pub fn start_review(&self, ctx: &UserContext, request_id: i64) -> Result<()> {
        ctx.authorize_write()?;
        self.store
            .set_request_status(request_id, RequestStatus::InProgress)
    }

    pub fn cancel_request(&self, ctx: &UserContext, request_id: i64) -> Result<()> {
        ctx.authorize_write()?;
        self.store
            .set_request_status(request_id, RequestStatus::Cancelled)
    }

    /// Records the question's current classification as "original", writes
    /// the immutable before/after record, updates the question in place,
    /// and completes any open request for it.
    pub fn submit_validation(
        &self,
        ctx: &UserContext,
        question_id: &str,
        validated: Classification,
        notes: &str,
    ) -> Result<SubmitOutcome> {
        ctx.authorize_write()?;
        let q = self.store.get_question(question_id)?;
        let original = q.classification.clone();

        let record = self.store.insert_validation_record(
            question_id,
            original.as_ref(),
            Some(&validated),
            &ctx.user_id,
            notes,
        )?;

        self.store.update_classification(question_id, &validated)?;
        self.store
            .set_question_status(question_id, QuestionStatus::Approved)?;
        self.store.set_needs_review(question_id, validated.needs_review)?;
        let completed = self.store.complete_open_requests(question_id)?;

        info!(
            question = question_id,
            validator = ctx.user_id.as_str(),
            requests_completed = completed,
            "validation submitted"
        );

        Ok(SubmitOutcome {
            record,
            pending: self.store.pending_requests(Some(&ctx.user_id))?,
            stats: self.stats()?,
        })
    }

    /// Marks the question rejected and flags it for mandatory re-review.
    /// Idempotent on the question's end state; every call logs a record with
    /// empty classification payloads and the reason in notes.
    pub fn reject_validation(
        &self,
        ctx: &UserContext,
        question_id: &str,
        reason: &str,
    ) -> Result<ValidationRecord> {
        ctx.authorize_write()?;
        // existence check first so the record never references a ghost id
        let _ = self.store.get_question(question_id)?;

        let record =
            self.store
                .insert_validation_record(question_id, None, None, &ctx.user_id, reason)?;
        self.store
            .set_question_status(question_id, QuestionStatus::Rejected)?;
        self.store.set_needs_review(question_id, true)?;
        let completed = self.store.complete_open_requests(question_id)?;

        info!(
            question = question_id,
            validator = ctx.user_id.as_str(),
            requests_completed = completed,
            "validation rejected"
        );
        Ok(record)
    }

    pub fn pending_requests(&self, assignee: Option<&str>) -> Result<Vec<ValidationRequest>> {
        self.store.pending_requests(assignee)
    }

    pub fn history(&self, question_id: &str) -> Result<Vec<ValidationRecord>> {
        self.store.validation_history(question_id)
    }

    pub fn stats(&self) -> Result<ValidationStats> {
        let questions = self.store.list_questions(false)?;
        let pending = self.store.pending_requests(None)?;
        let mut stats = ValidationStats {
            pending_requests: pending.len(),
            ..Default::default()
        };
        for q in &questions {
            match q.status {
                QuestionStatus::Approved => stats.approved += 1,
                QuestionStatus::Rejected => stats.rejected += 1,
                _ => {}
            }
            if q.needs_review {
                stats.needs_review += 1;
            }
        }
        Ok(stats)
    }
}
