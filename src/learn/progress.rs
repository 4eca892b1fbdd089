//! Lesson watch events and the enrollment aggregates derived from them.

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::badges::BadgeAwarder;
use super::certificates::CertificateIssuer;
use super::error::LearnError;
use super::store::LearnStore;
use super::types::*;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio_percentage(part: i32, whole: i32) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    if part >= whole {
        return 100.0;
    }
    // Rounding must never report 100 for a partial ratio.
    round2((f64::from(part) / f64::from(whole) * 100.0).clamp(0.0, 100.0)).min(99.99)
}

pub fn lesson_completion_percentage(watch_time_seconds: i32, total_duration_seconds: i32) -> f64 {
    ratio_percentage(watch_time_seconds, total_duration_seconds)
}

pub fn enrollment_progress_percentage(completed_lessons: i32, total_lessons: i32) -> f64 {
    ratio_percentage(completed_lessons, total_lessons)
}

/// Applies one watch event to a progress row. Returns true only when the row
/// flips from incomplete to complete.
pub fn apply_watch(progress: &mut LessonProgress, watch: &LessonWatch) -> bool {
    let was_completed = progress.is_completed;

    progress.watch_time_seconds = watch.watch_time_seconds;
    progress.total_duration_seconds = watch.total_duration_seconds;
    progress.last_accessed_at = watch.at;

    if watch.mark_completed || was_completed {
        progress.is_completed = true;
        progress.completion_percentage = 100.0;
        if !was_completed {
            progress.completed_at = Some(watch.at);
        }
    } else {
        progress.completion_percentage =
            lesson_completion_percentage(watch.watch_time_seconds, watch.total_duration_seconds);
    }

    !was_completed && progress.is_completed
}

pub struct ProgressTracker<S> {
    store: Arc<S>,
    certificates: CertificateIssuer<S>,
    badges: BadgeAwarder<S>,
}

impl<S> Clone for ProgressTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            certificates: self.certificates.clone(),
            badges: self.badges.clone(),
        }
    }
}

impl<S: LearnStore> ProgressTracker<S> {
    pub fn new(store: Arc<S>, certificates: CertificateIssuer<S>, badges: BadgeAwarder<S>) -> Self {
        Self {
            store,
            certificates,
            badges,
        }
    }

    pub async fn record_lesson_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        req: LessonProgressRequest,
    ) -> Result<LessonProgressReport, LearnError> {
        if req.watch_time_seconds < 0 {
            return Err(LearnError::Validation(
                "watch_time_seconds must not be negative".to_string(),
            ));
        }

        let lesson = self
            .store
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| LearnError::not_found("lesson", lesson_id))?;

        let enrollment = self
            .store
            .find_enrollment(user_id, lesson.course_id)
            .await?
            .ok_or(LearnError::NotEnrolled)?;
        if matches!(
            enrollment.status,
            EnrollmentStatus::Cancelled | EnrollmentStatus::Expired
        ) {
            return Err(LearnError::EnrollmentClosed(enrollment.status));
        }

        let now = Utc::now();
        let outcome = self
            .store
            .record_lesson_watch(LessonWatch {
                user_id,
                course_id: lesson.course_id,
                lesson_id,
                watch_time_seconds: req.watch_time_seconds,
                total_duration_seconds: lesson.duration_seconds,
                mark_completed: req.is_completed,
                at: now,
            })
            .await?;

        let mut enrollment = if outcome.newly_completed && enrollment.is_active() {
            let bumped = self
                .store
                .increment_completed_lessons(enrollment.id, now)
                .await?;
            let percentage =
                enrollment_progress_percentage(bumped.completed_lessons, bumped.total_lessons);
            self.store
                .raise_enrollment_progress(bumped.id, percentage, now)
                .await?
        } else {
            self.store.touch_enrollment(enrollment.id, now).await?
        };

        let mut course_newly_completed = false;
        if enrollment.is_active() && enrollment.progress_percentage >= 100.0 {
            if let Some(completed) = self
                .store
                .transition_enrollment(
                    enrollment.id,
                    EnrollmentStatus::Active,
                    EnrollmentStatus::Completed,
                    now,
                )
                .await?
            {
                info!(
                    "User {} completed course {}",
                    completed.user_id, completed.course_id
                );
                enrollment = completed;
                course_newly_completed = true;
                self.on_course_completed(&enrollment).await;
            }
        }

        Ok(LessonProgressReport {
            lesson_progress: outcome.progress,
            enrollment,
            lesson_newly_completed: outcome.newly_completed,
            course_newly_completed,
        })
    }

    async fn on_course_completed(&self, enrollment: &Enrollment) {
        if let Err(e) = self.certificates.issue(enrollment).await {
            warn!(
                "Failed to issue certificate for enrollment {}: {e}",
                enrollment.id
            );
        }

        let hours = match self.store.get_course(enrollment.course_id).await {
            Ok(Some(course)) => course.duration_minutes / 60,
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to load course {}: {e}", enrollment.course_id);
                0
            }
        };

        match self
            .store
            .record_profile_completion(enrollment.user_id, hours, Utc::now())
            .await
        {
            Ok(profile) => {
                if let Err(e) = self
                    .badges
                    .award_for_completion(enrollment.user_id, &profile)
                    .await
                {
                    warn!("Failed to award badges to {}: {e}", enrollment.user_id);
                }
            }
            Err(e) => warn!(
                "Failed to update learning profile of {}: {e}",
                enrollment.user_id
            ),
        }
    }

    pub async fn course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<CourseProgress, LearnError> {
        let enrollment = self
            .store
            .find_enrollment(user_id, course_id)
            .await?
            .ok_or(LearnError::NotEnrolled)?;
        let lessons = self.store.list_lesson_progress(user_id, course_id).await?;
        Ok(CourseProgress {
            enrollment,
            lessons,
        })
    }
}
