use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::store::{LearnStore, CERTIFICATE_UNIQUE};
use super::types::*;

/// `<prefix>-YYYYMMDD-XXXXXXXX`
pub fn certificate_number(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{prefix}-{}-{}",
        at.format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

pub struct CertificateIssuer<S> {
    store: Arc<S>,
    prefix: String,
    base_url: String,
}

impl<S> Clone for CertificateIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<S: LearnStore> CertificateIssuer<S> {
    pub fn new(store: Arc<S>, prefix: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            base_url: base_url.into(),
        }
    }

    pub fn verification_url(&self, number: &str) -> String {
        format!(
            "{}/api/learn/certificates/{number}/verify",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Issues the certificate for a completed enrollment, or returns the one
    /// already issued for that user and course.
    pub async fn issue(&self, enrollment: &Enrollment) -> Result<Certificate, LearnError> {
        if enrollment.status != EnrollmentStatus::Completed {
            return Err(LearnError::transition(
                enrollment.status,
                EnrollmentStatus::Completed,
            ));
        }

        if let Some(existing) = self
            .store
            .find_certificate(enrollment.user_id, enrollment.course_id)
            .await?
        {
            return Ok(existing);
        }

        let student = self
            .store
            .get_user(enrollment.user_id)
            .await?
            .ok_or_else(|| LearnError::not_found("user", enrollment.user_id))?;
        let course = self
            .store
            .get_course(enrollment.course_id)
            .await?
            .ok_or_else(|| LearnError::not_found("course", enrollment.course_id))?;
        let instructor_name = self
            .store
            .get_user(course.instructor_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_default();

        let now = Utc::now();
        let number = certificate_number(&self.prefix, now);
        let certificate = Certificate {
            id: Uuid::new_v4(),
            verification_url: self.verification_url(&number),
            certificate_number: number,
            user_id: student.id,
            course_id: course.id,
            student_name: student.name,
            course_title: course.title,
            instructor_name,
            completion_date: enrollment.completed_at.unwrap_or(now),
            issued_date: now,
            metadata: serde_json::json!({
                "level": course.level,
                "duration_minutes": course.duration_minutes,
                "total_lessons": enrollment.total_lessons,
            }),
        };

        match self.store.insert_certificate(certificate).await {
            Ok(certificate) => {
                info!(
                    "Issued certificate {} to {} for course {}",
                    certificate.certificate_number, certificate.user_id, certificate.course_id
                );
                Ok(certificate)
            }
            Err(e) if e.violates(CERTIFICATE_UNIQUE) => self
                .store
                .find_certificate(enrollment.user_id, enrollment.course_id)
                .await?
                .ok_or_else(|| LearnError::not_found("certificate for course", enrollment.course_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn verify(&self, number: &str) -> Result<Certificate, LearnError> {
        self.store
            .find_certificate_by_number(number)
            .await?
            .ok_or_else(|| LearnError::not_found("certificate", number))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, LearnError> {
        Ok(self.store.list_user_certificates(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{complete, enrollment_fixture, TestPlatform};
    use regex::Regex;

    #[test]
    fn test_certificate_number_format() {
        let at = "2024-03-09T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let number = certificate_number("CERT", at);
        let pattern = Regex::new(r"^CERT-20240309-[0-9A-F]{8}$").unwrap();
        assert!(pattern.is_match(&number), "{number}");
    }

    #[tokio::test]
    async fn test_issue_requires_completion() {
        let platform = TestPlatform::new();
        let enrollment = enrollment_fixture(Uuid::new_v4(), Uuid::new_v4(), 3);
        let err = platform
            .learn
            .certificates
            .issue(&enrollment)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_issue_is_idempotent_and_verifiable() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, lessons) = platform.free_course(1).await;
        platform.learn.enrollments.enroll(student.id, course.id).await.unwrap();
        let report = complete(&platform, student.id, lessons[0].id).await;

        let issued = platform
            .learn
            .certificates
            .issue(&report.enrollment)
            .await
            .unwrap();
        let again = platform
            .learn
            .certificates
            .issue(&report.enrollment)
            .await
            .unwrap();
        assert_eq!(issued.id, again.id);
        assert_eq!(issued.student_name, student.name);
        assert!(issued
            .verification_url
            .ends_with(&format!("/api/learn/certificates/{}/verify", issued.certificate_number)));

        let verified = platform
            .learn
            .certificates
            .verify(&issued.certificate_number)
            .await
            .unwrap();
        assert_eq!(verified.id, issued.id);

        let err = platform
            .learn
            .certificates
            .verify("CERT-00000000-DEADBEEF")
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::NotFound(_)));
    }
}
