use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, max, sum};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use uuid::Uuid;

use super::*;
use crate::core::shared::schema::learn::*;
use crate::core::shared::utils::DbPool;
use crate::learn::progress::apply_watch;
use crate::learn::ratings::average_rating;

// ============================================================================
// ROW MODELS
// ============================================================================

fn parse_text<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(StoreError::Corrupt)
}

fn string_list(value: serde_json::Value, column: &str) -> StoreResult<Vec<String>> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_users)]
#[diesel(check_for_backend(Pg))]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            role: parse_text(&row.role)?,
            created_at: row.created_at,
        })
    }
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_user_profiles)]
#[diesel(check_for_backend(Pg))]
struct ProfileRow {
    user_id: Uuid,
    bio: Option<String>,
    points: i32,
    total_courses_completed: i32,
    total_hours_learned: i32,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            bio: row.bio,
            points: row.points,
            total_courses_completed: row.total_courses_completed,
            total_hours_learned: row.total_hours_learned,
            updated_at: row.updated_at,
        }
    }
}

impl From<&UserProfile> for ProfileRow {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            bio: profile.bio.clone(),
            points: profile.points,
            total_courses_completed: profile.total_courses_completed,
            total_hours_learned: profile.total_hours_learned,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_categories)]
#[diesel(check_for_backend(Pg))]
struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    icon: Option<String>,
    color: Option<String>,
    parent_id: Option<Uuid>,
    sort_order: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            icon: row.icon,
            color: row.color,
            parent_id: row.parent_id,
            sort_order: row.sort_order,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl From<&Category> for CategoryRow {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
            icon: category.icon.clone(),
            color: category.color.clone(),
            parent_id: category.parent_id,
            sort_order: category.sort_order,
            is_active: category.is_active,
            created_at: category.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_courses)]
#[diesel(check_for_backend(Pg))]
struct CourseRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    short_description: String,
    thumbnail_url: Option<String>,
    preview_video_url: Option<String>,
    instructor_id: Uuid,
    category_id: Uuid,
    level: String,
    status: String,
    is_free: bool,
    price: BigDecimal,
    requirements: serde_json::Value,
    what_you_will_learn: serde_json::Value,
    tags: serde_json::Value,
    language: String,
    duration_minutes: i32,
    total_lessons: i32,
    total_students: i32,
    average_rating: f64,
    total_ratings: i32,
    published_at: Option<DateTime<Utc>>,
    featured_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StoreError;

    fn try_from(row: CourseRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            short_description: row.short_description,
            thumbnail_url: row.thumbnail_url,
            preview_video_url: row.preview_video_url,
            instructor_id: row.instructor_id,
            category_id: row.category_id,
            level: parse_text(&row.level)?,
            status: parse_text(&row.status)?,
            is_free: row.is_free,
            price: row.price,
            requirements: string_list(row.requirements, "requirements")?,
            what_you_will_learn: string_list(row.what_you_will_learn, "what_you_will_learn")?,
            tags: string_list(row.tags, "tags")?,
            language: row.language,
            duration_minutes: row.duration_minutes,
            total_lessons: row.total_lessons,
            total_students: row.total_students,
            average_rating: row.average_rating,
            total_ratings: row.total_ratings,
            published_at: row.published_at,
            featured_until: row.featured_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Course> for CourseRow {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            slug: course.slug.clone(),
            description: course.description.clone(),
            short_description: course.short_description.clone(),
            thumbnail_url: course.thumbnail_url.clone(),
            preview_video_url: course.preview_video_url.clone(),
            instructor_id: course.instructor_id,
            category_id: course.category_id,
            level: course.level.as_str().to_string(),
            status: course.status.as_str().to_string(),
            is_free: course.is_free,
            price: course.price.clone(),
            requirements: serde_json::json!(course.requirements),
            what_you_will_learn: serde_json::json!(course.what_you_will_learn),
            tags: serde_json::json!(course.tags),
            language: course.language.clone(),
            duration_minutes: course.duration_minutes,
            total_lessons: course.total_lessons,
            total_students: course.total_students,
            average_rating: course.average_rating,
            total_ratings: course.total_ratings,
            published_at: course.published_at,
            featured_until: course.featured_until,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = learn_courses)]
#[diesel(treat_none_as_null = true)]
struct CourseDetailsChangeset {
    title: String,
    slug: String,
    description: String,
    short_description: String,
    thumbnail_url: Option<String>,
    preview_video_url: Option<String>,
    category_id: Uuid,
    level: String,
    is_free: bool,
    price: BigDecimal,
    requirements: serde_json::Value,
    what_you_will_learn: serde_json::Value,
    tags: serde_json::Value,
    language: String,
    updated_at: DateTime<Utc>,
}

impl From<Course> for CourseDetailsChangeset {
    fn from(course: Course) -> Self {
        Self {
            title: course.title,
            slug: course.slug,
            description: course.description,
            short_description: course.short_description,
            thumbnail_url: course.thumbnail_url,
            preview_video_url: course.preview_video_url,
            category_id: course.category_id,
            level: course.level.as_str().to_string(),
            is_free: course.is_free,
            price: course.price,
            requirements: serde_json::json!(course.requirements),
            what_you_will_learn: serde_json::json!(course.what_you_will_learn),
            tags: serde_json::json!(course.tags),
            language: course.language,
            updated_at: course.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_course_sections)]
#[diesel(check_for_backend(Pg))]
struct SectionRow {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: Option<String>,
    sort_order: i32,
    created_at: DateTime<Utc>,
}

impl From<SectionRow> for CourseSection {
    fn from(row: SectionRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            description: row.description,
            sort_order: row.sort_order,
            created_at: row.created_at,
        }
    }
}

impl From<&CourseSection> for SectionRow {
    fn from(section: &CourseSection) -> Self {
        Self {
            id: section.id,
            course_id: section.course_id,
            title: section.title.clone(),
            description: section.description.clone(),
            sort_order: section.sort_order,
            created_at: section.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_lessons)]
#[diesel(check_for_backend(Pg))]
struct LessonRow {
    id: Uuid,
    course_id: Uuid,
    section_id: Uuid,
    title: String,
    slug: String,
    description: Option<String>,
    lesson_type: String,
    content: Option<String>,
    video_url: Option<String>,
    duration_seconds: i32,
    sort_order: i32,
    is_published: bool,
    is_free: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LessonRow> for Lesson {
    type Error = StoreError;

    fn try_from(row: LessonRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            course_id: row.course_id,
            section_id: row.section_id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            lesson_type: parse_text(&row.lesson_type)?,
            content: row.content,
            video_url: row.video_url,
            duration_seconds: row.duration_seconds,
            sort_order: row.sort_order,
            is_published: row.is_published,
            is_free: row.is_free,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Lesson> for LessonRow {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id,
            course_id: lesson.course_id,
            section_id: lesson.section_id,
            title: lesson.title.clone(),
            slug: lesson.slug.clone(),
            description: lesson.description.clone(),
            lesson_type: lesson.lesson_type.as_str().to_string(),
            content: lesson.content.clone(),
            video_url: lesson.video_url.clone(),
            duration_seconds: lesson.duration_seconds,
            sort_order: lesson.sort_order,
            is_published: lesson.is_published,
            is_free: lesson.is_free,
            created_at: lesson.created_at,
            updated_at: lesson.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_enrollments)]
#[diesel(check_for_backend(Pg))]
struct EnrollmentRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    price_paid: BigDecimal,
    status: String,
    progress_percentage: f64,
    completed_lessons: i32,
    total_lessons: i32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    last_accessed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = StoreError;

    fn try_from(row: EnrollmentRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            price_paid: row.price_paid,
            status: parse_text(&row.status)?,
            progress_percentage: row.progress_percentage,
            completed_lessons: row.completed_lessons,
            total_lessons: row.total_lessons,
            started_at: row.started_at,
            completed_at: row.completed_at,
            expires_at: row.expires_at,
            last_accessed_at: row.last_accessed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Enrollment> for EnrollmentRow {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            id: enrollment.id,
            user_id: enrollment.user_id,
            course_id: enrollment.course_id,
            price_paid: enrollment.price_paid.clone(),
            status: enrollment.status.as_str().to_string(),
            progress_percentage: enrollment.progress_percentage,
            completed_lessons: enrollment.completed_lessons,
            total_lessons: enrollment.total_lessons,
            started_at: enrollment.started_at,
            completed_at: enrollment.completed_at,
            expires_at: enrollment.expires_at,
            last_accessed_at: enrollment.last_accessed_at,
            created_at: enrollment.created_at,
            updated_at: enrollment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_lesson_progress)]
#[diesel(check_for_backend(Pg))]
struct LessonProgressRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    lesson_id: Uuid,
    is_completed: bool,
    watch_time_seconds: i32,
    total_duration_seconds: i32,
    completion_percentage: f64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_accessed_at: DateTime<Utc>,
}

impl From<LessonProgressRow> for LessonProgress {
    fn from(row: LessonProgressRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            lesson_id: row.lesson_id,
            is_completed: row.is_completed,
            watch_time_seconds: row.watch_time_seconds,
            total_duration_seconds: row.total_duration_seconds,
            completion_percentage: row.completion_percentage,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_accessed_at: row.last_accessed_at,
        }
    }
}

impl From<&LessonProgress> for LessonProgressRow {
    fn from(progress: &LessonProgress) -> Self {
        Self {
            id: progress.id,
            user_id: progress.user_id,
            course_id: progress.course_id,
            lesson_id: progress.lesson_id,
            is_completed: progress.is_completed,
            watch_time_seconds: progress.watch_time_seconds,
            total_duration_seconds: progress.total_duration_seconds,
            completion_percentage: progress.completion_percentage,
            started_at: progress.started_at,
            completed_at: progress.completed_at,
            last_accessed_at: progress.last_accessed_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_course_ratings)]
#[diesel(check_for_backend(Pg))]
struct RatingRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    rating: i32,
    review: Option<String>,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RatingRow> for CourseRating {
    fn from(row: RatingRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            rating: row.rating,
            review: row.review,
            is_published: row.is_published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&CourseRating> for RatingRow {
    fn from(rating: &CourseRating) -> Self {
        Self {
            id: rating.id,
            user_id: rating.user_id,
            course_id: rating.course_id,
            rating: rating.rating,
            review: rating.review.clone(),
            is_published: rating.is_published,
            created_at: rating.created_at,
            updated_at: rating.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_discussions)]
#[diesel(check_for_backend(Pg))]
struct DiscussionRow {
    id: Uuid,
    course_id: Uuid,
    lesson_id: Option<Uuid>,
    user_id: Uuid,
    title: String,
    content: String,
    is_pinned: bool,
    is_resolved: bool,
    replies_count: i32,
    likes_count: i32,
    last_activity_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<DiscussionRow> for Discussion {
    fn from(row: DiscussionRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            lesson_id: row.lesson_id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            is_pinned: row.is_pinned,
            is_resolved: row.is_resolved,
            replies_count: row.replies_count,
            likes_count: row.likes_count,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        }
    }
}

impl From<&Discussion> for DiscussionRow {
    fn from(discussion: &Discussion) -> Self {
        Self {
            id: discussion.id,
            course_id: discussion.course_id,
            lesson_id: discussion.lesson_id,
            user_id: discussion.user_id,
            title: discussion.title.clone(),
            content: discussion.content.clone(),
            is_pinned: discussion.is_pinned,
            is_resolved: discussion.is_resolved,
            replies_count: discussion.replies_count,
            likes_count: discussion.likes_count,
            last_activity_at: discussion.last_activity_at,
            created_at: discussion.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_discussion_replies)]
#[diesel(check_for_backend(Pg))]
struct ReplyRow {
    id: Uuid,
    discussion_id: Uuid,
    user_id: Uuid,
    parent_id: Option<Uuid>,
    depth: i32,
    content: String,
    likes_count: i32,
    is_solution: bool,
    created_at: DateTime<Utc>,
}

impl From<ReplyRow> for DiscussionReply {
    fn from(row: ReplyRow) -> Self {
        Self {
            id: row.id,
            discussion_id: row.discussion_id,
            user_id: row.user_id,
            parent_id: row.parent_id,
            depth: row.depth,
            content: row.content,
            likes_count: row.likes_count,
            is_solution: row.is_solution,
            created_at: row.created_at,
        }
    }
}

impl From<&DiscussionReply> for ReplyRow {
    fn from(reply: &DiscussionReply) -> Self {
        Self {
            id: reply.id,
            discussion_id: reply.discussion_id,
            user_id: reply.user_id,
            parent_id: reply.parent_id,
            depth: reply.depth,
            content: reply.content.clone(),
            likes_count: reply.likes_count,
            is_solution: reply.is_solution,
            created_at: reply.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_certificates)]
#[diesel(check_for_backend(Pg))]
struct CertificateRow {
    id: Uuid,
    certificate_number: String,
    user_id: Uuid,
    course_id: Uuid,
    student_name: String,
    course_title: String,
    instructor_name: String,
    completion_date: DateTime<Utc>,
    issued_date: DateTime<Utc>,
    verification_url: String,
    metadata: serde_json::Value,
}

impl From<CertificateRow> for Certificate {
    fn from(row: CertificateRow) -> Self {
        Self {
            id: row.id,
            certificate_number: row.certificate_number,
            user_id: row.user_id,
            course_id: row.course_id,
            student_name: row.student_name,
            course_title: row.course_title,
            instructor_name: row.instructor_name,
            completion_date: row.completion_date,
            issued_date: row.issued_date,
            verification_url: row.verification_url,
            metadata: row.metadata,
        }
    }
}

impl From<&Certificate> for CertificateRow {
    fn from(certificate: &Certificate) -> Self {
        Self {
            id: certificate.id,
            certificate_number: certificate.certificate_number.clone(),
            user_id: certificate.user_id,
            course_id: certificate.course_id,
            student_name: certificate.student_name.clone(),
            course_title: certificate.course_title.clone(),
            instructor_name: certificate.instructor_name.clone(),
            completion_date: certificate.completion_date,
            issued_date: certificate.issued_date,
            verification_url: certificate.verification_url.clone(),
            metadata: certificate.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_badges)]
#[diesel(check_for_backend(Pg))]
struct BadgeRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    icon: Option<String>,
    color: Option<String>,
    badge_type: String,
    criteria: serde_json::Value,
    points_reward: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BadgeRow> for Badge {
    type Error = StoreError;

    fn try_from(row: BadgeRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            icon: row.icon,
            color: row.color,
            badge_type: parse_text(&row.badge_type)?,
            criteria: row.criteria,
            points_reward: row.points_reward,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

impl From<&Badge> for BadgeRow {
    fn from(badge: &Badge) -> Self {
        Self {
            id: badge.id,
            name: badge.name.clone(),
            slug: badge.slug.clone(),
            description: badge.description.clone(),
            icon: badge.icon.clone(),
            color: badge.color.clone(),
            badge_type: badge.badge_type.as_str().to_string(),
            criteria: badge.criteria.clone(),
            points_reward: badge.points_reward,
            is_active: badge.is_active,
            created_at: badge.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = learn_user_badges)]
#[diesel(check_for_backend(Pg))]
struct UserBadgeRow {
    id: Uuid,
    user_id: Uuid,
    badge_id: Uuid,
    earned_at: DateTime<Utc>,
    reason: Option<String>,
}

impl From<UserBadgeRow> for UserBadge {
    fn from(row: UserBadgeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            badge_id: row.badge_id,
            earned_at: row.earned_at,
            reason: row.reason,
        }
    }
}

impl From<&UserBadge> for UserBadgeRow {
    fn from(badge: &UserBadge) -> Self {
        Self {
            id: badge.id,
            user_id: badge.user_id,
            badge_id: badge.badge_id,
            earned_at: badge.earned_at,
            reason: badge.reason.clone(),
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn published_courses(listing: &CourseListing, now: DateTime<Utc>) -> learn_courses::BoxedQuery<'static, Pg> {
    let mut query = learn_courses::table
        .filter(learn_courses::status.eq(CourseStatus::Approved.as_str()))
        .filter(learn_courses::published_at.le(now))
        .into_boxed();

    if let Some(term) = listing.search.as_deref() {
        let pattern = format!("%{term}%");
        query = query.filter(
            learn_courses::title
                .ilike(pattern.clone())
                .or(learn_courses::description.ilike(pattern.clone()))
                .or(learn_courses::short_description.ilike(pattern)),
        );
    }
    if let Some(category_id) = listing.category_id {
        query = query.filter(learn_courses::category_id.eq(category_id));
    }
    if let Some(level) = listing.level {
        query = query.filter(learn_courses::level.eq(level.as_str()));
    }
    match listing.price_type {
        Some(PriceType::Free) => query = query.filter(learn_courses::is_free.eq(true)),
        Some(PriceType::Paid) => query = query.filter(learn_courses::is_free.eq(false)),
        None => {}
    }
    if listing.featured_only {
        query = query.filter(learn_courses::featured_until.gt(now));
    }
    if let Some(excluded) = listing.exclude_course {
        query = query.filter(learn_courses::id.ne(excluded));
    }
    query
}

// ============================================================================
// STORE
// ============================================================================

/// Diesel-backed store. Every call checks a connection out of the r2d2 pool
/// on the blocking thread pool.
#[derive(Clone)]
pub struct PgLearnStore {
    pool: DbPool,
}

impl PgLearnStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            op(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Connection(format!("Blocking task failed: {e}")))?;

        if let Err(
            e @ (StoreError::Connection(_) | StoreError::Query(_) | StoreError::Corrupt(_)),
        ) = &result
        {
            error!("Learn store operation failed: {e}");
        }
        result
    }
}

fn load_enrollment(conn: &mut PgConnection, id: Uuid) -> StoreResult<Enrollment> {
    learn_enrollments::table
        .find(id)
        .select(EnrollmentRow::as_select())
        .first(conn)?
        .try_into()
}

impl LearnStore for PgLearnStore {
    async fn ping(&self) -> StoreResult<()> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let row = UserRow::from(&user);
        self.run(move |conn| {
            diesel::insert_into(learn_users::table)
                .values(&row)
                .execute(conn)?;
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.run(move |conn| {
            learn_users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()?
                .map(User::try_from)
                .transpose()
        })
        .await
    }

    async fn count_users_by_role(&self, role: Role) -> StoreResult<i64> {
        self.run(move |conn| {
            Ok(learn_users::table
                .filter(learn_users::role.eq(role.as_str()))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    async fn ensure_profile(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<UserProfile> {
        let row = ProfileRow::from(&UserProfile::empty(user_id, at));
        self.run(move |conn| {
            diesel::insert_into(learn_user_profiles::table)
                .values(&row)
                .on_conflict(learn_user_profiles::user_id)
                .do_nothing()
                .execute(conn)?;
            Ok(learn_user_profiles::table
                .find(user_id)
                .select(ProfileRow::as_select())
                .first(conn)?
                .into())
        })
        .await
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        self.run(move |conn| {
            Ok(learn_user_profiles::table
                .find(user_id)
                .select(ProfileRow::as_select())
                .first(conn)
                .optional()?
                .map(UserProfile::from))
        })
        .await
    }

    async fn record_profile_completion(
        &self,
        user_id: Uuid,
        hours: i32,
        at: DateTime<Utc>,
    ) -> StoreResult<UserProfile> {
        let row = ProfileRow::from(&UserProfile::empty(user_id, at));
        self.run(move |conn| {
            diesel::insert_into(learn_user_profiles::table)
                .values(&row)
                .on_conflict(learn_user_profiles::user_id)
                .do_nothing()
                .execute(conn)?;
            Ok(diesel::update(learn_user_profiles::table.find(user_id))
                .set((
                    learn_user_profiles::total_courses_completed
                        .eq(learn_user_profiles::total_courses_completed + 1),
                    learn_user_profiles::total_hours_learned
                        .eq(learn_user_profiles::total_hours_learned + hours),
                    learn_user_profiles::updated_at.eq(at),
                ))
                .returning(ProfileRow::as_returning())
                .get_result(conn)?
                .into())
        })
        .await
    }

    async fn add_profile_points(
        &self,
        user_id: Uuid,
        points: i32,
        at: DateTime<Utc>,
    ) -> StoreResult<UserProfile> {
        let row = ProfileRow::from(&UserProfile::empty(user_id, at));
        self.run(move |conn| {
            diesel::insert_into(learn_user_profiles::table)
                .values(&row)
                .on_conflict(learn_user_profiles::user_id)
                .do_nothing()
                .execute(conn)?;
            Ok(diesel::update(learn_user_profiles::table.find(user_id))
                .set((
                    learn_user_profiles::points.eq(learn_user_profiles::points + points),
                    learn_user_profiles::updated_at.eq(at),
                ))
                .returning(ProfileRow::as_returning())
                .get_result(conn)?
                .into())
        })
        .await
    }

    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        let row = CategoryRow::from(&category);
        self.run(move |conn| {
            diesel::insert_into(learn_categories::table)
                .values(&row)
                .execute(conn)?;
            Ok(category)
        })
        .await
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        self.run(move |conn| {
            Ok(learn_categories::table
                .find(id)
                .select(CategoryRow::as_select())
                .first(conn)
                .optional()?
                .map(Category::from))
        })
        .await
    }

    async fn list_active_categories(&self) -> StoreResult<Vec<Category>> {
        self.run(|conn| {
            let rows = learn_categories::table
                .filter(learn_categories::is_active.eq(true))
                .order((learn_categories::sort_order.asc(), learn_categories::name.asc()))
                .select(CategoryRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Category::from).collect())
        })
        .await
    }

    async fn count_published_by_category(&self, now: DateTime<Utc>) -> StoreResult<Vec<(Uuid, i64)>> {
        self.run(move |conn| {
            Ok(learn_courses::table
                .filter(learn_courses::status.eq(CourseStatus::Approved.as_str()))
                .filter(learn_courses::published_at.le(now))
                .group_by(learn_courses::category_id)
                .select((learn_courses::category_id, count_star()))
                .load::<(Uuid, i64)>(conn)?)
        })
        .await
    }

    async fn insert_course(&self, course: Course) -> StoreResult<Course> {
        let row = CourseRow::from(&course);
        self.run(move |conn| {
            diesel::insert_into(learn_courses::table)
                .values(&row)
                .execute(conn)?;
            Ok(course)
        })
        .await
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        self.run(move |conn| {
            learn_courses::table
                .find(id)
                .select(CourseRow::as_select())
                .first(conn)
                .optional()?
                .map(Course::try_from)
                .transpose()
        })
        .await
    }

    async fn update_course_details(&self, course: Course) -> StoreResult<Course> {
        let id = course.id;
        let changes = CourseDetailsChangeset::from(course);
        self.run(move |conn| {
            diesel::update(learn_courses::table.find(id))
                .set(&changes)
                .returning(CourseRow::as_returning())
                .get_result(conn)?
                .try_into()
        })
        .await
    }

    async fn set_course_status(
        &self,
        id: Uuid,
        status: CourseStatus,
        published_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<Course> {
        self.run(move |conn| {
            diesel::update(learn_courses::table.find(id))
                .set((
                    learn_courses::status.eq(status.as_str()),
                    learn_courses::published_at.eq(published_at),
                    learn_courses::updated_at.eq(at),
                ))
                .returning(CourseRow::as_returning())
                .get_result(conn)?
                .try_into()
        })
        .await
    }

    async fn set_course_featured(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<Course> {
        self.run(move |conn| {
            diesel::update(learn_courses::table.find(id))
                .set((
                    learn_courses::featured_until.eq(until),
                    learn_courses::updated_at.eq(at),
                ))
                .returning(CourseRow::as_returning())
                .get_result(conn)?
                .try_into()
        })
        .await
    }

    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(learn_courses::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_published_courses(
        &self,
        listing: CourseListing,
        now: DateTime<Utc>,
    ) -> StoreResult<(Vec<Course>, i64)> {
        self.run(move |conn| {
            let total: i64 = published_courses(&listing, now).count().get_result(conn)?;

            let query = published_courses(&listing, now);
            let query = match listing.sort {
                CourseSort::Popular => query.order((
                    learn_courses::total_students.desc(),
                    learn_courses::average_rating.desc(),
                )),
                CourseSort::Newest => query.order(learn_courses::published_at.desc()),
                CourseSort::Rating => query.order((
                    learn_courses::average_rating.desc(),
                    learn_courses::total_ratings.desc(),
                )),
                CourseSort::PriceLow => query.order(learn_courses::price.asc()),
                CourseSort::PriceHigh => query.order(learn_courses::price.desc()),
            };
            let rows = query
                .then_order_by(learn_courses::id.asc())
                .limit(listing.limit)
                .offset(listing.offset)
                .select(CourseRow::as_select())
                .load::<CourseRow>(conn)?;
            Ok((convert_all(rows)?, total))
        })
        .await
    }

    async fn published_catalog_totals(&self, now: DateTime<Utc>) -> StoreResult<CatalogTotals> {
        self.run(move |conn| {
            let published = learn_courses::table
                .filter(learn_courses::status.eq(CourseStatus::Approved.as_str()))
                .filter(learn_courses::published_at.le(now));
            let published_courses: i64 = published.count().get_result(conn)?;
            let published_minutes: Option<i64> = published
                .select(sum(learn_courses::duration_minutes))
                .first(conn)?;
            Ok(CatalogTotals {
                published_courses,
                published_minutes: published_minutes.unwrap_or(0),
            })
        })
        .await
    }

    async fn increment_course_students(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let updated = diesel::update(learn_courses::table.find(id))
                .set(learn_courses::total_students.eq(learn_courses::total_students + 1))
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn refresh_rating_aggregate(&self, course_id: Uuid, count_new: bool) -> StoreResult<Course> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                // The course row lock serializes concurrent recomputations, so
                // the last writer always sees every committed rating.
                learn_courses::table
                    .find(course_id)
                    .select(learn_courses::id)
                    .for_update()
                    .first::<Uuid>(conn)?;

                let values: Vec<i32> = learn_course_ratings::table
                    .filter(learn_course_ratings::course_id.eq(course_id))
                    .filter(learn_course_ratings::is_published.eq(true))
                    .select(learn_course_ratings::rating)
                    .load(conn)?;
                let average = average_rating(&values);

                let target = learn_courses::table.find(course_id);
                let row = if count_new {
                    diesel::update(target)
                        .set((
                            learn_courses::average_rating.eq(average),
                            learn_courses::total_ratings.eq(learn_courses::total_ratings + 1),
                        ))
                        .returning(CourseRow::as_returning())
                        .get_result(conn)?
                } else {
                    diesel::update(target)
                        .set(learn_courses::average_rating.eq(average))
                        .returning(CourseRow::as_returning())
                        .get_result(conn)?
                };
                row.try_into()
            })
        })
        .await
    }

    async fn refresh_course_totals(&self, course_id: Uuid, at: DateTime<Utc>) -> StoreResult<Course> {
        self.run(move |conn| {
            let (lessons, seconds): (i64, Option<i64>) = learn_lessons::table
                .filter(learn_lessons::course_id.eq(course_id))
                .select((count_star(), sum(learn_lessons::duration_seconds)))
                .first(conn)?;
            diesel::update(learn_courses::table.find(course_id))
                .set((
                    learn_courses::total_lessons.eq(lessons as i32),
                    learn_courses::duration_minutes.eq((seconds.unwrap_or(0) / 60) as i32),
                    learn_courses::updated_at.eq(at),
                ))
                .returning(CourseRow::as_returning())
                .get_result(conn)?
                .try_into()
        })
        .await
    }

    async fn insert_section(&self, section: CourseSection) -> StoreResult<CourseSection> {
        let row = SectionRow::from(&section);
        self.run(move |conn| {
            diesel::insert_into(learn_course_sections::table)
                .values(&row)
                .execute(conn)?;
            Ok(section)
        })
        .await
    }

    async fn get_section(&self, id: Uuid) -> StoreResult<Option<CourseSection>> {
        self.run(move |conn| {
            Ok(learn_course_sections::table
                .find(id)
                .select(SectionRow::as_select())
                .first(conn)
                .optional()?
                .map(CourseSection::from))
        })
        .await
    }

    async fn list_sections(&self, course_id: Uuid) -> StoreResult<Vec<CourseSection>> {
        self.run(move |conn| {
            let rows = learn_course_sections::table
                .filter(learn_course_sections::course_id.eq(course_id))
                .order((
                    learn_course_sections::sort_order.asc(),
                    learn_course_sections::created_at.asc(),
                ))
                .select(SectionRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(CourseSection::from).collect())
        })
        .await
    }

    async fn next_lesson_sort_order(&self, section_id: Uuid) -> StoreResult<i32> {
        self.run(move |conn| {
            let current: Option<i32> = learn_lessons::table
                .filter(learn_lessons::section_id.eq(section_id))
                .select(max(learn_lessons::sort_order))
                .first(conn)?;
            Ok(current.map_or(1, |order| order + 1))
        })
        .await
    }

    async fn insert_lesson(&self, lesson: Lesson) -> StoreResult<Lesson> {
        let row = LessonRow::from(&lesson);
        self.run(move |conn| {
            diesel::insert_into(learn_lessons::table)
                .values(&row)
                .execute(conn)?;
            Ok(lesson)
        })
        .await
    }

    async fn get_lesson(&self, id: Uuid) -> StoreResult<Option<Lesson>> {
        self.run(move |conn| {
            learn_lessons::table
                .find(id)
                .select(LessonRow::as_select())
                .first(conn)
                .optional()?
                .map(Lesson::try_from)
                .transpose()
        })
        .await
    }

    async fn list_lessons(&self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        self.run(move |conn| {
            let rows = learn_lessons::table
                .filter(learn_lessons::course_id.eq(course_id))
                .order((learn_lessons::sort_order.asc(), learn_lessons::created_at.asc()))
                .select(LessonRow::as_select())
                .load(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn delete_lesson(&self, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(learn_lessons::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_enrollment(&self, enrollment: Enrollment) -> StoreResult<Enrollment> {
        let row = EnrollmentRow::from(&enrollment);
        self.run(move |conn| {
            diesel::insert_into(learn_enrollments::table)
                .values(&row)
                .execute(conn)?;
            Ok(enrollment)
        })
        .await
    }

    async fn find_enrollment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrollment>> {
        self.run(move |conn| {
            learn_enrollments::table
                .filter(learn_enrollments::user_id.eq(user_id))
                .filter(learn_enrollments::course_id.eq(course_id))
                .select(EnrollmentRow::as_select())
                .first(conn)
                .optional()?
                .map(Enrollment::try_from)
                .transpose()
        })
        .await
    }

    async fn list_user_enrollments(&self, user_id: Uuid) -> StoreResult<Vec<Enrollment>> {
        self.run(move |conn| {
            let rows = learn_enrollments::table
                .filter(learn_enrollments::user_id.eq(user_id))
                .order(learn_enrollments::created_at.desc())
                .select(EnrollmentRow::as_select())
                .load(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn transition_enrollment(
        &self,
        id: Uuid,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Enrollment>> {
        self.run(move |conn| {
            let target = learn_enrollments::table
                .filter(learn_enrollments::id.eq(id))
                .filter(learn_enrollments::status.eq(from.as_str()));
            let row = if to == EnrollmentStatus::Completed {
                diesel::update(target)
                    .set((
                        learn_enrollments::status.eq(to.as_str()),
                        learn_enrollments::completed_at.eq(Some(at)),
                        learn_enrollments::updated_at.eq(at),
                    ))
                    .returning(EnrollmentRow::as_returning())
                    .get_result(conn)
                    .optional()?
            } else {
                diesel::update(target)
                    .set((
                        learn_enrollments::status.eq(to.as_str()),
                        learn_enrollments::updated_at.eq(at),
                    ))
                    .returning(EnrollmentRow::as_returning())
                    .get_result(conn)
                    .optional()?
            };

            match row {
                Some(row) => Ok(Some(row.try_into()?)),
                None => {
                    // Distinguish "lost the race" from "no such enrollment".
                    load_enrollment(conn, id)?;
                    Ok(None)
                }
            }
        })
        .await
    }

    async fn list_due_enrollments(&self, now: DateTime<Utc>) -> StoreResult<Vec<Enrollment>> {
        self.run(move |conn| {
            let rows = learn_enrollments::table
                .filter(learn_enrollments::status.eq(EnrollmentStatus::Active.as_str()))
                .filter(learn_enrollments::expires_at.le(now))
                .select(EnrollmentRow::as_select())
                .load(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn increment_completed_lessons(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Enrollment> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::update(
                    learn_enrollments::table
                        .filter(learn_enrollments::id.eq(id))
                        .filter(learn_enrollments::completed_lessons.lt(learn_enrollments::total_lessons)),
                )
                .set(learn_enrollments::completed_lessons.eq(learn_enrollments::completed_lessons + 1))
                .execute(conn)?;

                diesel::update(learn_enrollments::table.find(id))
                    .set((
                        learn_enrollments::last_accessed_at.eq(Some(at)),
                        learn_enrollments::updated_at.eq(at),
                    ))
                    .returning(EnrollmentRow::as_returning())
                    .get_result(conn)?
                    .try_into()
            })
        })
        .await
    }

    async fn raise_enrollment_progress(
        &self,
        id: Uuid,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        self.run(move |conn| {
            diesel::update(
                learn_enrollments::table
                    .filter(learn_enrollments::id.eq(id))
                    .filter(learn_enrollments::progress_percentage.lt(percentage)),
            )
            .set((
                learn_enrollments::progress_percentage.eq(percentage),
                learn_enrollments::updated_at.eq(at),
            ))
            .execute(conn)?;
            load_enrollment(conn, id)
        })
        .await
    }

    async fn touch_enrollment(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Enrollment> {
        self.run(move |conn| {
            diesel::update(learn_enrollments::table.find(id))
                .set(learn_enrollments::last_accessed_at.eq(Some(at)))
                .returning(EnrollmentRow::as_returning())
                .get_result(conn)?
                .try_into()
        })
        .await
    }

    async fn record_lesson_watch(&self, watch: LessonWatch) -> StoreResult<LessonWatchOutcome> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let fresh = LessonProgressRow::from(&LessonProgress::started(&watch));
                diesel::insert_into(learn_lesson_progress::table)
                    .values(&fresh)
                    .on_conflict((
                        learn_lesson_progress::user_id,
                        learn_lesson_progress::lesson_id,
                    ))
                    .do_nothing()
                    .execute(conn)?;

                let row = learn_lesson_progress::table
                    .filter(learn_lesson_progress::user_id.eq(watch.user_id))
                    .filter(learn_lesson_progress::lesson_id.eq(watch.lesson_id))
                    .select(LessonProgressRow::as_select())
                    .for_update()
                    .first(conn)?;

                let mut progress = LessonProgress::from(row);
                let newly_completed = apply_watch(&mut progress, &watch);

                diesel::update(learn_lesson_progress::table.find(progress.id))
                    .set((
                        learn_lesson_progress::is_completed.eq(progress.is_completed),
                        learn_lesson_progress::watch_time_seconds.eq(progress.watch_time_seconds),
                        learn_lesson_progress::total_duration_seconds
                            .eq(progress.total_duration_seconds),
                        learn_lesson_progress::completion_percentage
                            .eq(progress.completion_percentage),
                        learn_lesson_progress::completed_at.eq(progress.completed_at),
                        learn_lesson_progress::last_accessed_at.eq(progress.last_accessed_at),
                    ))
                    .execute(conn)?;

                Ok(LessonWatchOutcome {
                    progress,
                    newly_completed,
                })
            })
        })
        .await
    }

    async fn list_lesson_progress(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Vec<LessonProgress>> {
        self.run(move |conn| {
            let rows = learn_lesson_progress::table
                .filter(learn_lesson_progress::user_id.eq(user_id))
                .filter(learn_lesson_progress::course_id.eq(course_id))
                .order(learn_lesson_progress::started_at.asc())
                .select(LessonProgressRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(LessonProgress::from).collect())
        })
        .await
    }

    async fn insert_rating(&self, rating: CourseRating) -> StoreResult<CourseRating> {
        let row = RatingRow::from(&rating);
        self.run(move |conn| {
            diesel::insert_into(learn_course_ratings::table)
                .values(&row)
                .execute(conn)?;
            Ok(rating)
        })
        .await
    }

    async fn get_rating(&self, id: Uuid) -> StoreResult<Option<CourseRating>> {
        self.run(move |conn| {
            Ok(learn_course_ratings::table
                .find(id)
                .select(RatingRow::as_select())
                .first(conn)
                .optional()?
                .map(CourseRating::from))
        })
        .await
    }

    async fn set_rating_published(
        &self,
        id: Uuid,
        published: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<CourseRating> {
        self.run(move |conn| {
            Ok(diesel::update(learn_course_ratings::table.find(id))
                .set((
                    learn_course_ratings::is_published.eq(published),
                    learn_course_ratings::updated_at.eq(at),
                ))
                .returning(RatingRow::as_returning())
                .get_result(conn)?
                .into())
        })
        .await
    }

    async fn list_published_ratings(&self, course_id: Uuid, limit: i64) -> StoreResult<Vec<CourseRating>> {
        self.run(move |conn| {
            let rows = learn_course_ratings::table
                .filter(learn_course_ratings::course_id.eq(course_id))
                .filter(learn_course_ratings::is_published.eq(true))
                .order(learn_course_ratings::created_at.desc())
                .limit(limit)
                .select(RatingRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(CourseRating::from).collect())
        })
        .await
    }

    async fn insert_discussion(&self, discussion: Discussion) -> StoreResult<Discussion> {
        let row = DiscussionRow::from(&discussion);
        self.run(move |conn| {
            diesel::insert_into(learn_discussions::table)
                .values(&row)
                .execute(conn)?;
            Ok(discussion)
        })
        .await
    }

    async fn get_discussion(&self, id: Uuid) -> StoreResult<Option<Discussion>> {
        self.run(move |conn| {
            Ok(learn_discussions::table
                .find(id)
                .select(DiscussionRow::as_select())
                .first(conn)
                .optional()?
                .map(Discussion::from))
        })
        .await
    }

    async fn list_discussions(&self, course_id: Uuid) -> StoreResult<Vec<Discussion>> {
        self.run(move |conn| {
            let rows = learn_discussions::table
                .filter(learn_discussions::course_id.eq(course_id))
                .order((
                    learn_discussions::is_pinned.desc(),
                    learn_discussions::last_activity_at.desc(),
                ))
                .select(DiscussionRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Discussion::from).collect())
        })
        .await
    }

    async fn insert_reply(&self, reply: DiscussionReply) -> StoreResult<DiscussionReply> {
        let row = ReplyRow::from(&reply);
        self.run(move |conn| {
            diesel::insert_into(learn_discussion_replies::table)
                .values(&row)
                .execute(conn)?;
            Ok(reply)
        })
        .await
    }

    async fn get_reply(&self, id: Uuid) -> StoreResult<Option<DiscussionReply>> {
        self.run(move |conn| {
            Ok(learn_discussion_replies::table
                .find(id)
                .select(ReplyRow::as_select())
                .first(conn)
                .optional()?
                .map(DiscussionReply::from))
        })
        .await
    }

    async fn list_replies(&self, discussion_id: Uuid) -> StoreResult<Vec<DiscussionReply>> {
        self.run(move |conn| {
            let rows = learn_discussion_replies::table
                .filter(learn_discussion_replies::discussion_id.eq(discussion_id))
                .order(learn_discussion_replies::created_at.asc())
                .select(ReplyRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(DiscussionReply::from).collect())
        })
        .await
    }

    async fn bump_discussion_activity(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Discussion> {
        self.run(move |conn| {
            Ok(diesel::update(learn_discussions::table.find(id))
                .set((
                    learn_discussions::replies_count.eq(learn_discussions::replies_count + 1),
                    learn_discussions::last_activity_at.eq(at),
                ))
                .returning(DiscussionRow::as_returning())
                .get_result(conn)?
                .into())
        })
        .await
    }

    async fn mark_solution(&self, discussion_id: Uuid, reply_id: Uuid) -> StoreResult<Discussion> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let updated = diesel::update(learn_discussion_replies::table.find(reply_id))
                    .set(learn_discussion_replies::is_solution.eq(true))
                    .execute(conn)?;
                if updated == 0 {
                    return Err(StoreError::NotFound);
                }
                Ok(diesel::update(learn_discussions::table.find(discussion_id))
                    .set(learn_discussions::is_resolved.eq(true))
                    .returning(DiscussionRow::as_returning())
                    .get_result(conn)?
                    .into())
            })
        })
        .await
    }

    async fn insert_certificate(&self, certificate: Certificate) -> StoreResult<Certificate> {
        let row = CertificateRow::from(&certificate);
        self.run(move |conn| {
            diesel::insert_into(learn_certificates::table)
                .values(&row)
                .execute(conn)?;
            Ok(certificate)
        })
        .await
    }

    async fn find_certificate(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Certificate>> {
        self.run(move |conn| {
            Ok(learn_certificates::table
                .filter(learn_certificates::user_id.eq(user_id))
                .filter(learn_certificates::course_id.eq(course_id))
                .select(CertificateRow::as_select())
                .first(conn)
                .optional()?
                .map(Certificate::from))
        })
        .await
    }

    async fn find_certificate_by_number(&self, number: &str) -> StoreResult<Option<Certificate>> {
        let number = number.to_string();
        self.run(move |conn| {
            Ok(learn_certificates::table
                .filter(learn_certificates::certificate_number.eq(number))
                .select(CertificateRow::as_select())
                .first(conn)
                .optional()?
                .map(Certificate::from))
        })
        .await
    }

    async fn list_user_certificates(&self, user_id: Uuid) -> StoreResult<Vec<Certificate>> {
        self.run(move |conn| {
            let rows = learn_certificates::table
                .filter(learn_certificates::user_id.eq(user_id))
                .order(learn_certificates::issued_date.desc())
                .select(CertificateRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Certificate::from).collect())
        })
        .await
    }

    async fn insert_badge(&self, badge: Badge) -> StoreResult<Badge> {
        let row = BadgeRow::from(&badge);
        self.run(move |conn| {
            diesel::insert_into(learn_badges::table)
                .values(&row)
                .execute(conn)?;
            Ok(badge)
        })
        .await
    }

    async fn list_active_badges(&self, badge_type: BadgeType) -> StoreResult<Vec<Badge>> {
        self.run(move |conn| {
            let rows = learn_badges::table
                .filter(learn_badges::is_active.eq(true))
                .filter(learn_badges::badge_type.eq(badge_type.as_str()))
                .order(learn_badges::created_at.asc())
                .select(BadgeRow::as_select())
                .load(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn insert_user_badge(&self, user_badge: UserBadge) -> StoreResult<UserBadge> {
        let row = UserBadgeRow::from(&user_badge);
        self.run(move |conn| {
            diesel::insert_into(learn_user_badges::table)
                .values(&row)
                .execute(conn)?;
            Ok(user_badge)
        })
        .await
    }

    async fn list_user_badges(&self, user_id: Uuid) -> StoreResult<Vec<UserBadge>> {
        self.run(move |conn| {
            let rows = learn_user_badges::table
                .filter(learn_user_badges::user_id.eq(user_id))
                .order(learn_user_badges::earned_at.asc())
                .select(UserBadgeRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(UserBadge::from).collect())
        })
        .await
    }
}
