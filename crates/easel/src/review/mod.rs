//! The approval state machine.
//!
//! Authoritative logic for prompt and image transitions, plus the credit
//! transaction tying an approval to an image generation. Route handlers
//! call in; state changes flow out through the notification hub.

pub mod status;

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::broadcast::{Event, NotificationHub, PromptRef, StudentRef};
use crate::db::image_repo::{self, ImageRow};
use crate::db::prompt_repo::{self, PromptRow};
use crate::db::user_repo::{self, Role, UserRow};
use crate::db::{now_rfc3339, Database, DatabaseError};
use crate::error::ReviewError;
use crate::generate::{GenerationQueue, SafetyClassifier};

use status::{ImageStatus, PromptStatus, ReviewDecision};

/// Characters of prompt content shown in notifications and ledger reasons.
const PREVIEW_LEN: usize = 30;

/// Result of a prompt review. On approval, `image` is the generated image
/// unless the pipeline hit the defensive failure path, and
/// `remaining_credits` reflects the debit.
#[derive(Debug)]
pub struct PromptReviewOutcome {
    pub prompt: PromptRow,
    pub image: Option<ImageRow>,
    pub remaining_credits: Option<i64>,
}

/// A student's view of their own pipeline state.
#[derive(Debug)]
pub struct StudentStatus {
    pub pending_prompts: Vec<PromptRow>,
    pub approved_images: Vec<ImageRow>,
}

/// The approval pipeline service. Cheap to clone; all fields are shared
/// handles.
#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    hub: NotificationHub,
    queue: Arc<GenerationQueue>,
    classifier: Arc<dyn SafetyClassifier>,
}

impl ReviewService {
    pub fn new(
        db: Database,
        hub: NotificationHub,
        queue: Arc<GenerationQueue>,
        classifier: Arc<dyn SafetyClassifier>,
    ) -> Self {
        Self {
            db,
            hub,
            queue,
            classifier,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Accepts a new prompt from a student.
    ///
    /// Fails with `Validation` on empty content and `Conflict` when the
    /// student already has a pending prompt. The student's teacher is
    /// notified, or every teacher when the student has none assigned.
    pub fn submit_prompt(
        &self,
        student_id: &str,
        content: &str,
    ) -> Result<PromptRow, ReviewError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ReviewError::Validation(
                "prompt content is required".to_string(),
            ));
        }

        let student = user_repo::find_by_id(&self.db, student_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("student {} not found", student_id)))?;

        if prompt_repo::pending_for_student(&self.db, &student.id)?.is_some() {
            return Err(ReviewError::Conflict(
                "student already has a pending prompt".to_string(),
            ));
        }

        let prompt = PromptRow {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            student_id: student.id.clone(),
            status: PromptStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            generated_image_id: None,
            created_at: now_rfc3339(),
        };

        if let Err(e) = prompt_repo::insert(&self.db, &prompt) {
            // The partial unique index catches the race two concurrent
            // submissions can win past the pre-check.
            return Err(match e {
                DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ReviewError::Conflict("student already has a pending prompt".to_string())
                }
                other => ReviewError::Database(other),
            });
        }

        info!(prompt_id = %prompt.id, student = %student.username, "Prompt submitted");

        let event = Event::NewPromptSubmitted {
            prompt_id: prompt.id.clone(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            content_preview: preview(content),
        };
        match student.teacher_id.as_deref() {
            Some(teacher_id) => self.hub.to_teacher(teacher_id, event),
            None => self.hub.broadcast(event),
        }

        Ok(prompt)
    }

    /// Reviews a pending prompt.
    ///
    /// Approval debits one credit (guarded pre-check first: with no credits
    /// the prompt stays pending and can be retried after a top-up), then
    /// runs the generation pipeline to completion before returning.
    pub async fn review_prompt(
        &self,
        prompt_id: &str,
        teacher_id: &str,
        decision: ReviewDecision,
        rejection_reason: Option<&str>,
    ) -> Result<PromptReviewOutcome, ReviewError> {
        let teacher = self.resolve_reviewer(teacher_id)?;

        let prompt = prompt_repo::find_by_id(&self.db, prompt_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("prompt {} not found", prompt_id)))?;

        let next = prompt.status.review(decision).ok_or_else(|| {
            ReviewError::Conflict("prompt has already been reviewed".to_string())
        })?;

        if decision == ReviewDecision::Rejected {
            prompt_repo::update_review(
                &self.db,
                &prompt.id,
                next,
                &teacher.id,
                &now_rfc3339(),
                rejection_reason,
            )?;
            info!(prompt_id = %prompt.id, teacher = %teacher.username, "Prompt rejected");

            self.hub.to_student(
                &prompt.student_id,
                Event::PromptRejected {
                    prompt_id: prompt.id.clone(),
                    student_id: prompt.student_id.clone(),
                    rejection_reason: rejection_reason.map(str::to_string),
                },
            );

            let prompt = self.refetch_prompt(&prompt.id)?;
            return Ok(PromptReviewOutcome {
                prompt,
                image: None,
                remaining_credits: None,
            });
        }

        // Guarded pre-check: refuse before touching the prompt, so a
        // topped-up teacher can simply retry.
        let available = user_repo::balance(&self.db, &teacher.id)?.unwrap_or(0);
        if available < 1 {
            return Err(ReviewError::InsufficientCredits {
                required: 1,
                available,
            });
        }

        let reason = format!("Image generation: {}", preview(&prompt.content));
        let remaining = match user_repo::debit(&self.db, &teacher.id, 1, &reason, None)? {
            Some(balance) => balance,
            // Lost a race against a concurrent approval since the
            // pre-check; the prompt is still untouched.
            None => {
                let available = user_repo::balance(&self.db, &teacher.id)?.unwrap_or(0);
                return Err(ReviewError::InsufficientCredits {
                    required: 1,
                    available,
                });
            }
        };

        prompt_repo::update_review(&self.db, &prompt.id, next, &teacher.id, &now_rfc3339(), None)?;
        info!(
            prompt_id = %prompt.id,
            teacher = %teacher.username,
            remaining_credits = remaining,
            "Prompt approved, credit debited"
        );

        let mut approved = self.refetch_prompt(&prompt.id)?;
        let image = match self.process_generation(&approved, false).await {
            Ok(image) => Some(image),
            Err(e) => {
                // The queue guarantees a result, so this is persistence
                // trouble. The prompt terminates without an image and the
                // debited credit stays spent.
                error!(prompt_id = %prompt.id, error = %e, "Generation pipeline failed");
                self.fail_generation(&approved.id, &approved.student_id, true);
                None
            }
        };

        approved = self.refetch_prompt(&prompt.id)?;
        Ok(PromptReviewOutcome {
            prompt: approved,
            image,
            remaining_credits: Some(remaining),
        })
    }

    /// Reviews a pending generated image and settles the owning prompt.
    pub fn review_image(
        &self,
        image_id: &str,
        teacher_id: &str,
        decision: ReviewDecision,
        rejection_reason: Option<&str>,
    ) -> Result<ImageRow, ReviewError> {
        let teacher = self.resolve_reviewer(teacher_id)?;

        let image = image_repo::find_by_id(&self.db, image_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("image {} not found", image_id)))?;

        let next = image.status.review(decision).ok_or_else(|| {
            ReviewError::Conflict("image has already been reviewed".to_string())
        })?;

        image_repo::update_review(
            &self.db,
            &image.id,
            next,
            &teacher.id,
            &now_rfc3339(),
            rejection_reason,
        )?;
        info!(
            image_id = %image.id,
            teacher = %teacher.username,
            decision = ?decision,
            "Image reviewed"
        );

        // Settle the owning prompt if generation left it mid-flight.
        if let Some(prompt) = prompt_repo::find_by_id(&self.db, &image.prompt_id)? {
            if prompt.status != PromptStatus::Processed {
                prompt_repo::update_status(&self.db, &prompt.id, PromptStatus::Processed)?;
            }
        }

        let reviewed = image_repo::find_by_id(&self.db, &image.id)?
            .ok_or_else(|| ReviewError::NotFound(format!("image {} not found", image.id)))?;

        match next {
            ImageStatus::Approved => self.hub.to_student(
                &reviewed.student_id,
                Event::ImageApproved {
                    image_id: reviewed.id.clone(),
                    student_id: reviewed.student_id.clone(),
                    image_url: reviewed.display_url(),
                    prompt_id: reviewed.prompt_id.clone(),
                },
            ),
            ImageStatus::Rejected => self.hub.to_student(
                &reviewed.student_id,
                Event::ImageRejected {
                    image_id: reviewed.id.clone(),
                    student_id: reviewed.student_id.clone(),
                    rejection_reason: rejection_reason.map(str::to_string),
                },
            ),
            ImageStatus::Pending => {}
        }

        Ok(reviewed)
    }

    /// Pending prompts for the teacher's students, oldest first. Admins
    /// see every pending prompt.
    pub fn pending_prompts(&self, teacher_id: &str) -> Result<Vec<PromptRow>, ReviewError> {
        let teacher = self.resolve_reviewer(teacher_id)?;
        match self.review_scope(&teacher)? {
            Some(student_ids) => Ok(prompt_repo::list_pending(&self.db, Some(&student_ids))?),
            None => Ok(prompt_repo::list_pending(&self.db, None)?),
        }
    }

    /// Pending images for the teacher's students, oldest first. Admins
    /// see every pending image.
    pub fn pending_images(&self, teacher_id: &str) -> Result<Vec<ImageRow>, ReviewError> {
        let teacher = self.resolve_reviewer(teacher_id)?;
        match self.review_scope(&teacher)? {
            Some(student_ids) => Ok(image_repo::list_pending(&self.db, Some(&student_ids))?),
            None => Ok(image_repo::list_pending(&self.db, None)?),
        }
    }

    /// A student's pending prompts and approved images.
    pub fn student_status(&self, student_id: &str) -> Result<StudentStatus, ReviewError> {
        let student = user_repo::find_by_id(&self.db, student_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("student {} not found", student_id)))?;

        let pending_prompts = match prompt_repo::pending_for_student(&self.db, &student.id)? {
            Some(prompt) => vec![prompt],
            None => Vec::new(),
        };

        Ok(StudentStatus {
            pending_prompts,
            approved_images: image_repo::approved_for_student(&self.db, &student.id)?,
        })
    }

    /// Admin credit allocation.
    pub fn grant_credits(
        &self,
        admin_id: &str,
        teacher_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<i64, ReviewError> {
        let admin = self.resolve_admin(admin_id)?;
        let teacher = self.resolve_teacher(teacher_id)?;
        if amount <= 0 {
            return Err(ReviewError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }

        let balance = user_repo::grant(&self.db, &teacher.id, amount, reason, Some(&admin.id))?
            .ok_or_else(|| ReviewError::NotFound(format!("teacher {} not found", teacher_id)))?;
        info!(teacher = %teacher.username, amount, balance, "Credits granted");
        Ok(balance)
    }

    /// Admin credit deduction (e.g. correcting a mistaken grant).
    pub fn revoke_credits(
        &self,
        admin_id: &str,
        teacher_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<i64, ReviewError> {
        let admin = self.resolve_admin(admin_id)?;
        let teacher = self.resolve_teacher(teacher_id)?;
        if amount <= 0 {
            return Err(ReviewError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }

        match user_repo::debit(&self.db, &teacher.id, amount, reason, Some(&admin.id))? {
            Some(balance) => {
                info!(teacher = %teacher.username, amount, balance, "Credits revoked");
                Ok(balance)
            }
            None => {
                let available = user_repo::balance(&self.db, &teacher.id)?.unwrap_or(0);
                Err(ReviewError::InsufficientCredits {
                    required: amount,
                    available,
                })
            }
        }
    }

    /// Runs generation for a reviewed prompt: queue, safety label, image
    /// row, prompt linkage. The single-review path enters with an
    /// `Approved` prompt; the batch path enters with its `Processing`
    /// reservation already in place.
    pub(crate) async fn process_generation(
        &self,
        prompt: &PromptRow,
        is_batch: bool,
    ) -> Result<ImageRow, ReviewError> {
        if let Some(next) = prompt.status.begin_generation() {
            prompt_repo::update_status(&self.db, &prompt.id, next)?;
        }

        let url = self.queue.generate(&prompt.content, is_batch).await;
        let safety_level = self.classifier.classify(&url);

        let image = ImageRow {
            id: Uuid::new_v4().to_string(),
            path: url.clone(),
            is_external_url: is_external(&url),
            prompt_id: prompt.id.clone(),
            student_id: prompt.student_id.clone(),
            status: ImageStatus::Pending,
            safety_level,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            created_at: now_rfc3339(),
        };
        image_repo::insert(&self.db, &image)?;
        prompt_repo::link_generated_image(&self.db, &prompt.id, &image.id)?;
        prompt_repo::update_status(&self.db, &prompt.id, PromptStatus::Processed)?;

        info!(
            prompt_id = %prompt.id,
            image_id = %image.id,
            safety_level = %safety_level,
            "Image generated"
        );

        let student = user_repo::find_by_id(&self.db, &prompt.student_id)?;
        self.hub.to_teachers(Event::ImageGenerated {
            image_id: image.id.clone(),
            path: image.path.clone(),
            is_external_url: image.is_external_url,
            prompt: PromptRef {
                id: prompt.id.clone(),
                content: prompt.content.clone(),
            },
            student: student
                .map(|s| StudentRef {
                    id: s.id,
                    name: s.name,
                    username: s.username,
                })
                .unwrap_or_else(|| StudentRef {
                    id: prompt.student_id.clone(),
                    name: String::new(),
                    username: String::new(),
                }),
            safety_level,
            created_at: image.created_at.clone(),
        });

        Ok(image)
    }

    /// Terminates a prompt whose generation pipeline failed: `processed`,
    /// no image, credit kept. Best-effort — this is already the error
    /// path.
    pub(crate) fn fail_generation(&self, prompt_id: &str, student_id: &str, notify: bool) {
        if let Err(e) = prompt_repo::update_status(&self.db, prompt_id, PromptStatus::Processed) {
            error!(prompt_id = %prompt_id, error = %e, "Failed to settle prompt after generation error");
        }
        if notify {
            self.hub.to_student(
                student_id,
                Event::PromptProcessed {
                    prompt_id: prompt_id.to_string(),
                    student_id: student_id.to_string(),
                    status: PromptStatus::Processed,
                    message: "An error occurred while generating the image".to_string(),
                },
            );
        }
    }

    /// The students whose work this reviewer may act on: `None` means
    /// unrestricted (admin).
    pub(crate) fn review_scope(
        &self,
        reviewer: &UserRow,
    ) -> Result<Option<Vec<String>>, ReviewError> {
        if reviewer.role == Role::Admin {
            return Ok(None);
        }
        let students = user_repo::students_of_teacher(&self.db, &reviewer.id)?;
        Ok(Some(students.into_iter().map(|s| s.id).collect()))
    }

    pub(crate) fn resolve_reviewer(&self, teacher_id: &str) -> Result<UserRow, ReviewError> {
        let user = user_repo::find_by_id(&self.db, teacher_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("teacher {} not found", teacher_id)))?;
        if !user.role.can_review() {
            return Err(ReviewError::Validation(
                "a teacher or admin account is required".to_string(),
            ));
        }
        Ok(user)
    }

    fn resolve_admin(&self, admin_id: &str) -> Result<UserRow, ReviewError> {
        let user = user_repo::find_by_id(&self.db, admin_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("admin {} not found", admin_id)))?;
        if user.role != Role::Admin {
            return Err(ReviewError::Validation(
                "an admin account is required".to_string(),
            ));
        }
        Ok(user)
    }

    fn resolve_teacher(&self, teacher_id: &str) -> Result<UserRow, ReviewError> {
        let user = user_repo::find_by_id(&self.db, teacher_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("teacher {} not found", teacher_id)))?;
        if user.role != Role::Teacher {
            return Err(ReviewError::Validation(format!(
                "{} is not a teacher account",
                user.username
            )));
        }
        Ok(user)
    }

    fn refetch_prompt(&self, prompt_id: &str) -> Result<PromptRow, ReviewError> {
        prompt_repo::find_by_id(&self.db, prompt_id)?
            .ok_or_else(|| ReviewError::NotFound(format!("prompt {} not found", prompt_id)))
    }
}

/// Truncated content for notifications and ledger reasons.
fn preview(content: &str) -> String {
    let truncated: String = content.chars().take(PREVIEW_LEN).collect();
    if content.chars().count() > PREVIEW_LEN {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// URLs (including data URLs) are stored verbatim; anything else is a
/// storage-relative path under the uploads mount.
fn is_external(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_content() {
        assert_eq!(preview("a red bicycle"), "a red bicycle");
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "a very long and quite detailed description of a bicycle";
        let p = preview(long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_LEN + 3);
    }

    #[test]
    fn test_preview_is_char_boundary_safe() {
        let korean = "자전거를 타고 있는 귀여운 고양이 그림을 그려주세요 부탁합니다";
        let p = preview(korean);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com/a.png"));
        assert!(is_external("http://example.com/a.png"));
        assert!(is_external("data:image/svg+xml;base64,abc"));
        assert!(!is_external("abc123.png"));
        assert!(!is_external("/abc123.png"));
    }
}
