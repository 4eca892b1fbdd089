//! Persistence seam of the learning platform.
//!
//! Engines only talk to [`LearnStore`]. Both implementations enforce the same
//! uniqueness constraints (reported as [`StoreError::UniqueViolation`]) and
//! apply counter changes as single atomic increments.

mod memory;
mod postgres;

pub use memory::InMemoryLearnStore;
pub use postgres::PgLearnStore;

use chrono::{DateTime, Utc};
use std::future::Future;
use uuid::Uuid;

use super::types::*;

pub const ENROLLMENT_UNIQUE: &str = "learn_enrollments_user_course_key";
pub const LESSON_PROGRESS_UNIQUE: &str = "learn_lesson_progress_user_lesson_key";
pub const RATING_UNIQUE: &str = "learn_course_ratings_user_course_key";
pub const CERTIFICATE_UNIQUE: &str = "learn_certificates_user_course_key";
pub const USER_BADGE_UNIQUE: &str = "learn_user_badges_user_badge_key";
pub const USER_EMAIL_UNIQUE: &str = "learn_users_email_key";
pub const CATEGORY_SLUG_UNIQUE: &str = "learn_categories_slug_key";
pub const COURSE_SLUG_UNIQUE: &str = "learn_courses_slug_key";
pub const LESSON_SLUG_UNIQUE: &str = "learn_lessons_course_id_slug_key";
pub const BADGE_SLUG_UNIQUE: &str = "learn_badges_slug_key";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Record not found")]
    NotFound,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    pub fn violates(&self, constraint: &str) -> bool {
        matches!(self, Self::UniqueViolation(name) if name == constraint)
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => Self::NotFound,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => Self::UniqueViolation(
                info.constraint_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| info.message().to_string()),
            ),
            Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                Self::Connection(info.message().to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait LearnStore: Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = StoreResult<()>> + Send;

    // ----- Users & profiles -----

    fn insert_user(&self, user: User) -> impl Future<Output = StoreResult<User>> + Send;
    fn get_user(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<User>>> + Send;
    fn count_users_by_role(&self, role: Role) -> impl Future<Output = StoreResult<i64>> + Send;
    fn ensure_profile(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<UserProfile>> + Send;
    fn get_profile(&self, user_id: Uuid)
        -> impl Future<Output = StoreResult<Option<UserProfile>>> + Send;
    /// Adds one completed course and `hours` learned, creating the profile if needed.
    fn record_profile_completion(
        &self,
        user_id: Uuid,
        hours: i32,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<UserProfile>> + Send;
    fn add_profile_points(
        &self,
        user_id: Uuid,
        points: i32,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<UserProfile>> + Send;

    // ----- Categories -----

    fn insert_category(&self, category: Category)
        -> impl Future<Output = StoreResult<Category>> + Send;
    fn get_category(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Category>>> + Send;
    fn list_active_categories(&self) -> impl Future<Output = StoreResult<Vec<Category>>> + Send;
    fn count_published_by_category(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<(Uuid, i64)>>> + Send;

    // ----- Courses -----

    fn insert_course(&self, course: Course) -> impl Future<Output = StoreResult<Course>> + Send;
    fn get_course(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Course>>> + Send;
    /// Rewrites the editable columns; counters and workflow columns are untouched.
    fn update_course_details(&self, course: Course)
        -> impl Future<Output = StoreResult<Course>> + Send;
    fn set_course_status(
        &self,
        id: Uuid,
        status: CourseStatus,
        published_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Course>> + Send;
    fn set_course_featured(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Course>> + Send;
    /// Removes the course with everything it owns.
    fn delete_course(&self, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;
    fn list_published_courses(
        &self,
        listing: CourseListing,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<(Vec<Course>, i64)>> + Send;
    fn published_catalog_totals(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<CatalogTotals>> + Send;
    fn increment_course_students(&self, id: Uuid) -> impl Future<Output = StoreResult<()>> + Send;
    /// Recomputes `average_rating` from the published ratings in the same
    /// write that bumps `total_ratings` (when `count_new` is set).
    fn refresh_rating_aggregate(
        &self,
        course_id: Uuid,
        count_new: bool,
    ) -> impl Future<Output = StoreResult<Course>> + Send;
    /// Recomputes `total_lessons` and `duration_minutes` from the lessons table.
    fn refresh_course_totals(
        &self,
        course_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Course>> + Send;

    // ----- Sections & lessons -----

    fn insert_section(&self, section: CourseSection)
        -> impl Future<Output = StoreResult<CourseSection>> + Send;
    fn get_section(&self, id: Uuid)
        -> impl Future<Output = StoreResult<Option<CourseSection>>> + Send;
    fn list_sections(&self, course_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<CourseSection>>> + Send;
    fn next_lesson_sort_order(&self, section_id: Uuid)
        -> impl Future<Output = StoreResult<i32>> + Send;
    fn insert_lesson(&self, lesson: Lesson) -> impl Future<Output = StoreResult<Lesson>> + Send;
    fn get_lesson(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Lesson>>> + Send;
    fn list_lessons(&self, course_id: Uuid) -> impl Future<Output = StoreResult<Vec<Lesson>>> + Send;
    fn delete_lesson(&self, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;

    // ----- Enrollments -----

    fn insert_enrollment(&self, enrollment: Enrollment)
        -> impl Future<Output = StoreResult<Enrollment>> + Send;
    fn find_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Enrollment>>> + Send;
    fn list_user_enrollments(&self, user_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<Enrollment>>> + Send;
    /// Compare-and-set on status. `None` when the stored status is not `from`.
    fn transition_enrollment(
        &self,
        id: Uuid,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Enrollment>>> + Send;
    fn list_due_enrollments(&self, now: DateTime<Utc>)
        -> impl Future<Output = StoreResult<Vec<Enrollment>>> + Send;
    /// `completed_lessons += 1`, never past `total_lessons`.
    fn increment_completed_lessons(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Enrollment>> + Send;
    /// Raises `progress_percentage` to `percentage`; lower values are ignored.
    fn raise_enrollment_progress(
        &self,
        id: Uuid,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Enrollment>> + Send;
    fn touch_enrollment(&self, id: Uuid, at: DateTime<Utc>)
        -> impl Future<Output = StoreResult<Enrollment>> + Send;

    // ----- Lesson progress -----

    /// Upserts the (user, lesson) row and applies the watch event atomically.
    fn record_lesson_watch(&self, watch: LessonWatch)
        -> impl Future<Output = StoreResult<LessonWatchOutcome>> + Send;
    fn list_lesson_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<LessonProgress>>> + Send;

    // ----- Ratings -----

    fn insert_rating(&self, rating: CourseRating)
        -> impl Future<Output = StoreResult<CourseRating>> + Send;
    fn get_rating(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<CourseRating>>> + Send;
    fn set_rating_published(
        &self,
        id: Uuid,
        published: bool,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<CourseRating>> + Send;
    fn list_published_ratings(
        &self,
        course_id: Uuid,
        limit: i64,
    ) -> impl Future<Output = StoreResult<Vec<CourseRating>>> + Send;

    // ----- Discussions -----

    fn insert_discussion(&self, discussion: Discussion)
        -> impl Future<Output = StoreResult<Discussion>> + Send;
    fn get_discussion(&self, id: Uuid)
        -> impl Future<Output = StoreResult<Option<Discussion>>> + Send;
    fn list_discussions(&self, course_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<Discussion>>> + Send;
    fn insert_reply(&self, reply: DiscussionReply)
        -> impl Future<Output = StoreResult<DiscussionReply>> + Send;
    fn get_reply(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<DiscussionReply>>> + Send;
    fn list_replies(&self, discussion_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<DiscussionReply>>> + Send;
    /// `replies_count += 1` and `last_activity_at = at`.
    fn bump_discussion_activity(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Discussion>> + Send;
    fn mark_solution(
        &self,
        discussion_id: Uuid,
        reply_id: Uuid,
    ) -> impl Future<Output = StoreResult<Discussion>> + Send;

    // ----- Certificates -----

    fn insert_certificate(&self, certificate: Certificate)
        -> impl Future<Output = StoreResult<Certificate>> + Send;
    fn find_certificate(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;
    fn find_certificate_by_number(&self, number: &str)
        -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;
    fn list_user_certificates(&self, user_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<Certificate>>> + Send;

    // ----- Badges -----

    fn insert_badge(&self, badge: Badge) -> impl Future<Output = StoreResult<Badge>> + Send;
    fn list_active_badges(&self, badge_type: BadgeType)
        -> impl Future<Output = StoreResult<Vec<Badge>>> + Send;
    fn insert_user_badge(&self, user_badge: UserBadge)
        -> impl Future<Output = StoreResult<UserBadge>> + Send;
    fn list_user_badges(&self, user_id: Uuid)
        -> impl Future<Output = StoreResult<Vec<UserBadge>>> + Send;
}
