use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::store::LearnStore;
use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Required,
    Completed { reference: String, amount: BigDecimal },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &PaymentRequest) -> Result<PaymentOutcome, LearnError>;
}

/// Takes no payment; every paid enrollment is answered with `Required`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredPaymentGateway;

#[async_trait]
impl PaymentGateway for DeferredPaymentGateway {
    async fn charge(&self, _request: &PaymentRequest) -> Result<PaymentOutcome, LearnError> {
        Ok(PaymentOutcome::Required)
    }
}

pub struct EnrollmentEngine<S> {
    store: Arc<S>,
    payments: Arc<dyn PaymentGateway>,
    validity_days: Option<i64>,
}

impl<S> Clone for EnrollmentEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            payments: Arc::clone(&self.payments),
            validity_days: self.validity_days,
        }
    }
}

impl<S: LearnStore> EnrollmentEngine<S> {
    pub fn new(store: Arc<S>, payments: Arc<dyn PaymentGateway>, validity_days: Option<i64>) -> Self {
        Self {
            store,
            payments,
            validity_days,
        }
    }

    pub fn with_payment_gateway(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = payments;
        self
    }

    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, LearnError> {
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| LearnError::not_found("course", course_id))?;

        if self.store.find_enrollment(user_id, course_id).await?.is_some() {
            return Err(LearnError::AlreadyEnrolled);
        }

        let price_paid = if course.requires_payment() {
            let request = PaymentRequest {
                user_id,
                course_id,
                amount: course.price.clone(),
            };
            match self.payments.charge(&request).await? {
                PaymentOutcome::Required => {
                    return Err(LearnError::PaymentRequired {
                        course_id,
                        price: course.price,
                    });
                }
                PaymentOutcome::Completed { reference, amount } => {
                    info!("Payment {reference} accepted for course {course_id} by user {user_id}");
                    amount
                }
            }
        } else {
            BigDecimal::from(0)
        };

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            price_paid,
            status: EnrollmentStatus::Active,
            progress_percentage: 0.0,
            completed_lessons: 0,
            total_lessons: course.total_lessons,
            started_at: now,
            completed_at: None,
            expires_at: self.validity_days.map(|days| now + Duration::days(days)),
            last_accessed_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let enrollment = match self.store.insert_enrollment(enrollment).await {
            Ok(enrollment) => enrollment,
            Err(e) if e.is_unique_violation() => return Err(LearnError::AlreadyEnrolled),
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.store.increment_course_students(course_id).await {
            warn!("Failed to increment student count for course {course_id}: {e}");
        }

        info!("User {user_id} enrolled in course {course_id}");
        Ok(enrollment)
    }

    pub async fn cancel(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, LearnError> {
        let enrollment = self
            .store
            .find_enrollment(user_id, course_id)
            .await?
            .ok_or_else(|| LearnError::not_found("enrollment for course", course_id))?;

        if !enrollment.status.can_transition_to(EnrollmentStatus::Cancelled) {
            return Err(LearnError::transition(
                enrollment.status,
                EnrollmentStatus::Cancelled,
            ));
        }

        match self
            .store
            .transition_enrollment(
                enrollment.id,
                EnrollmentStatus::Active,
                EnrollmentStatus::Cancelled,
                Utc::now(),
            )
            .await?
        {
            Some(cancelled) => Ok(cancelled),
            None => {
                // Lost the race against completion or expiry.
                let current = self
                    .store
                    .find_enrollment(user_id, course_id)
                    .await?
                    .map_or(EnrollmentStatus::Cancelled, |e| e.status);
                Err(LearnError::transition(current, EnrollmentStatus::Cancelled))
            }
        }
    }

    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, LearnError> {
        let due = self.store.list_due_enrollments(now).await?;
        let mut expired = 0;
        for enrollment in due {
            if self
                .store
                .transition_enrollment(
                    enrollment.id,
                    EnrollmentStatus::Active,
                    EnrollmentStatus::Expired,
                    now,
                )
                .await?
                .is_some()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            info!("Expired {expired} enrollment(s)");
        }
        Ok(expired)
    }

    pub async fn enrollment_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, LearnError> {
        Ok(self.store.find_enrollment(user_id, course_id).await?)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, LearnError> {
        Ok(self.store.list_user_enrollments(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{complete, enrollment_fixture, ApprovingPaymentGateway, TestPlatform};

    #[tokio::test]
    async fn test_double_enroll_fails() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(3).await;

        platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();
        let err = platform
            .learn
            .enrollments
            .enroll(student.id, course.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::AlreadyEnrolled));

        let enrollments = platform.learn.enrollments.list_for_user(student.id).await.unwrap();
        assert_eq!(enrollments.len(), 1);
    }

    /// Approves after yielding once, so concurrent enrollments both pass the
    /// existing-enrollment check before either inserts.
    struct YieldingPaymentGateway;

    #[async_trait]
    impl PaymentGateway for YieldingPaymentGateway {
        async fn charge(&self, request: &PaymentRequest) -> Result<PaymentOutcome, LearnError> {
            tokio::task::yield_now().await;
            Ok(PaymentOutcome::Completed {
                reference: format!("yield-{}", request.user_id.simple()),
                amount: request.amount.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_enroll_creates_one_enrollment() {
        let platform = TestPlatform::with_payments(Arc::new(YieldingPaymentGateway));
        let student = platform.student().await;
        let (course, _) = platform.paid_course("25.00", 1).await;

        let enrollments = &platform.learn.enrollments;
        let (first, second) = tokio::join!(
            enrollments.enroll(student.id, course.id),
            enrollments.enroll(student.id, course.id),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LearnError::AlreadyEnrolled)))
                .count(),
            1
        );

        assert_eq!(enrollments.list_for_user(student.id).await.unwrap().len(), 1);
        let course = platform.store.get_course(course.id).await.unwrap().unwrap();
        assert_eq!(course.total_students, 1);
    }

    #[tokio::test]
    async fn test_free_enroll_counts_one_student() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(4).await;
        let before = course.total_students;

        let enrollment = platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert_eq!(enrollment.total_lessons, 4);
        assert_eq!(enrollment.price_paid, BigDecimal::from(0));
        assert!(enrollment.expires_at.is_none());

        let course = platform.store.get_course(course.id).await.unwrap().unwrap();
        assert_eq!(course.total_students, before + 1);
    }

    #[tokio::test]
    async fn test_paid_course_requires_payment() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.paid_course("49.90", 2).await;

        let err = platform
            .learn
            .enrollments
            .enroll(student.id, course.id)
            .await
            .unwrap_err();
        match err {
            LearnError::PaymentRequired { course_id, price } => {
                assert_eq!(course_id, course.id);
                assert_eq!(price, course.price);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(platform
            .store
            .find_enrollment(student.id, course.id)
            .await
            .unwrap()
            .is_none());
        let course = platform.store.get_course(course.id).await.unwrap().unwrap();
        assert_eq!(course.total_students, 0);
    }

    #[tokio::test]
    async fn test_approved_payment_enrolls() {
        let platform = TestPlatform::with_payments(Arc::new(ApprovingPaymentGateway));
        let student = platform.student().await;
        let (course, _) = platform.paid_course("49.90", 2).await;

        let enrollment = platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();
        assert_eq!(enrollment.price_paid, course.price);
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
    }

    #[tokio::test]
    async fn test_enroll_unknown_course() {
        let platform = TestPlatform::new();
        let err = platform
            .learn
            .enrollments
            .enroll(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();

        let cancelled = platform.learn.enrollments.cancel(student.id, course.id).await.unwrap();
        assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);

        let err = platform
            .learn
            .enrollments
            .enroll(student.id, course.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::AlreadyEnrolled));

        let err = platform
            .learn
            .enrollments
            .cancel(student.id, course.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cannot_cancel_completed_enrollment() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, lessons) = platform.free_course(1).await;
        platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();
        complete(&platform, student.id, lessons[0].id).await;

        let err = platform
            .learn
            .enrollments
            .cancel(student.id, course.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_expire_due_only_touches_active_past_due() {
        let platform = TestPlatform::new();
        let now = Utc::now();
        let course_id = Uuid::new_v4();

        let mut due = enrollment_fixture(Uuid::new_v4(), course_id, 5);
        due.expires_at = Some(now - Duration::hours(1));
        let mut future = enrollment_fixture(Uuid::new_v4(), course_id, 5);
        future.expires_at = Some(now + Duration::days(3));
        let mut done = enrollment_fixture(Uuid::new_v4(), course_id, 5);
        done.status = EnrollmentStatus::Completed;
        done.expires_at = Some(now - Duration::hours(1));

        for enrollment in [due.clone(), future.clone(), done.clone()] {
            platform.store.insert_enrollment(enrollment).await.unwrap();
        }

        assert_eq!(platform.learn.enrollments.expire_due(now).await.unwrap(), 1);
        assert_eq!(platform.learn.enrollments.expire_due(now).await.unwrap(), 0);

        let status = |e: Option<Enrollment>| e.map(|e| e.status);
        assert_eq!(
            status(platform.store.find_enrollment(due.user_id, course_id).await.unwrap()),
            Some(EnrollmentStatus::Expired)
        );
        assert_eq!(
            status(platform.store.find_enrollment(future.user_id, course_id).await.unwrap()),
            Some(EnrollmentStatus::Active)
        );
        assert_eq!(
            status(platform.store.find_enrollment(done.user_id, course_id).await.unwrap()),
            Some(EnrollmentStatus::Completed)
        );
    }
}
