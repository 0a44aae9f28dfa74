//! Batch orchestrator.
//!
//! Applies approval processing to a teacher-selected set of prompts
//! without one failure blocking the rest. The caller gets an immediate
//! answer (accepted/skipped counts); generation runs in a spawned task
//! with its own error boundary, observable through the status handle.

pub mod status;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::broadcast::{BatchPromptDetail, Event};
use crate::db::prompt_repo::{self, PromptRow};
use crate::db::user_repo;
use crate::db::now_rfc3339;
use crate::error::ReviewError;
use crate::review::status::PromptStatus;
use crate::review::ReviewService;

pub use status::{BatchStatusHandle, BatchStatusSnapshot};

/// Immediate response to a batch request. Processing continues in the
/// background; poll [`BatchRunner::status`] for progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub accepted: usize,
    pub skipped: Vec<SkippedPrompt>,
}

/// A prompt excluded during reservation, with the reason.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPrompt {
    pub prompt_id: String,
    pub reason: String,
}

/// Drives batch approvals over the review service. One batch at a time;
/// the handle is owned here and injected wherever polling happens.
#[derive(Clone)]
pub struct BatchRunner {
    service: ReviewService,
    status: BatchStatusHandle,
}

impl BatchRunner {
    pub fn new(service: ReviewService) -> Self {
        Self {
            service,
            status: BatchStatusHandle::new(),
        }
    }

    /// The shared status handle (for wiring into a polling route).
    pub fn status_handle(&self) -> BatchStatusHandle {
        self.status.clone()
    }

    /// Current progress snapshot.
    pub fn status(&self) -> BatchStatusSnapshot {
        self.status.snapshot()
    }

    /// Starts a batch approval over the given prompts.
    ///
    /// Everything that can refuse the batch happens before any mutation:
    /// authorization, the aggregate credit pre-check, and the
    /// one-active-batch guard. Reservation then marks each prompt
    /// `processing` (failures are excluded and reported), the full cost is
    /// debited once, and the caller gets the accepted count while a
    /// spawned task works through the prompts sequentially.
    pub async fn run(
        &self,
        teacher_id: &str,
        prompt_ids: &[String],
    ) -> Result<BatchAccepted, ReviewError> {
        let teacher = self.service.resolve_reviewer(teacher_id)?;
        let db = self.service.db().clone();

        let candidates = prompt_repo::find_many(&db, prompt_ids)?;
        let scope = self.service.review_scope(&teacher)?;

        let eligible: Vec<PromptRow> = candidates
            .into_iter()
            .filter(|p| p.status == PromptStatus::Pending)
            .filter(|p| match &scope {
                Some(student_ids) => student_ids.contains(&p.student_id),
                None => true,
            })
            .collect();

        if eligible.is_empty() {
            return Err(ReviewError::NotFound(
                "no pending prompts to process".to_string(),
            ));
        }

        // Aggregate pre-check: the whole batch is refused before anything
        // is touched when credits cannot cover it.
        let required = eligible.len() as i64;
        let available = user_repo::balance(&db, &teacher.id)?.unwrap_or(0);
        if available < required {
            return Err(ReviewError::InsufficientCredits {
                required,
                available,
            });
        }

        if !self.status.try_start() {
            return Err(ReviewError::Conflict(
                "a batch is already running".to_string(),
            ));
        }

        // Reserve: the interim `processing` marker keeps these prompts out
        // of reach of concurrent single-item review.
        let mut accepted: Vec<PromptRow> = Vec::with_capacity(eligible.len());
        let mut skipped: Vec<SkippedPrompt> = Vec::new();
        for prompt in eligible {
            match prompt_repo::update_status(&db, &prompt.id, PromptStatus::Processing) {
                Ok(()) => accepted.push(prompt),
                Err(e) => {
                    warn!(prompt_id = %prompt.id, error = %e, "Prompt excluded from batch");
                    skipped.push(SkippedPrompt {
                        prompt_id: prompt.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if accepted.is_empty() {
            self.status.finish();
            return Err(ReviewError::NotFound(
                "no pending prompts could be reserved".to_string(),
            ));
        }

        // One debit for the whole batch, one ledger entry.
        let cost = accepted.len() as i64;
        let reason = format!("Batch approval: {} prompts", accepted.len());
        if user_repo::debit(&db, &teacher.id, cost, &reason, None)?.is_none() {
            // Lost a credit race since the pre-check: release the
            // reservations and refuse.
            for prompt in &accepted {
                if let Err(e) = prompt_repo::update_status(&db, &prompt.id, PromptStatus::Pending)
                {
                    error!(prompt_id = %prompt.id, error = %e, "Failed to release batch reservation");
                }
            }
            self.status.finish();
            let available = user_repo::balance(&db, &teacher.id)?.unwrap_or(0);
            return Err(ReviewError::InsufficientCredits {
                required: cost,
                available,
            });
        }

        self.status.set_total(accepted.len());
        info!(
            teacher = %teacher.username,
            accepted = accepted.len(),
            skipped = skipped.len(),
            "Batch processing started"
        );

        let service = self.service.clone();
        let status = self.status.clone();
        let teacher_id = teacher.id.clone();
        let count = accepted.len();
        tokio::spawn(async move {
            run_batch_jobs(service, status, teacher_id, accepted).await;
        });

        Ok(BatchAccepted {
            accepted: count,
            skipped,
        })
    }
}

/// The background loop: strictly sequential, one error boundary per
/// prompt, status updated after every outcome, one aggregate event at the
/// end.
async fn run_batch_jobs(
    service: ReviewService,
    status: BatchStatusHandle,
    teacher_id: String,
    prompts: Vec<PromptRow>,
) {
    let mut details: Vec<BatchPromptDetail> = Vec::with_capacity(prompts.len());
    let mut success_count = 0usize;
    let mut error_count = 0usize;

    for prompt in &prompts {
        match process_one(&service, &teacher_id, prompt).await {
            Ok(image_id) => {
                success_count += 1;
                status.record_success();
                details.push(BatchPromptDetail {
                    prompt_id: prompt.id.clone(),
                    student_id: prompt.student_id.clone(),
                    success: true,
                    image_id: Some(image_id),
                    error: None,
                });
            }
            Err(e) => {
                error!(prompt_id = %prompt.id, error = %e, "Batch prompt failed");
                error_count += 1;
                status.record_failure();
                // The prompt terminates without an image; the batch debit
                // stays as it is.
                service.fail_generation(&prompt.id, &prompt.student_id, false);
                details.push(BatchPromptDetail {
                    prompt_id: prompt.id.clone(),
                    student_id: prompt.student_id.clone(),
                    success: false,
                    image_id: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    status.finish();
    info!(
        teacher_id = %teacher_id,
        success_count,
        error_count,
        "Batch processing completed"
    );

    service.hub().broadcast(Event::BatchProcessingCompleted {
        teacher_id,
        total_processed: prompts.len(),
        success_count,
        error_count,
        details,
    });
}

/// One prompt through review bookkeeping and the generation pipeline.
/// The prompt enters holding its `processing` reservation.
async fn process_one(
    service: &ReviewService,
    teacher_id: &str,
    prompt: &PromptRow,
) -> Result<String, ReviewError> {
    let db = service.db();

    // Record the review outcome the reservation stood in for. The status
    // stays `processing`; reviewer and timestamp are what's missing.
    prompt_repo::update_review(
        db,
        &prompt.id,
        PromptStatus::Processing,
        teacher_id,
        &now_rfc3339(),
        None,
    )?;
    service.hub().to_student(
        &prompt.student_id,
        Event::PromptApproved {
            prompt_id: prompt.id.clone(),
            student_id: prompt.student_id.clone(),
        },
    );

    let reserved = prompt_repo::find_by_id(db, &prompt.id)?
        .ok_or_else(|| ReviewError::NotFound(format!("prompt {} not found", prompt.id)))?;
    let image = service.process_generation(&reserved, true).await?;
    Ok(image.id)
}
