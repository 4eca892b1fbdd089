use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

text_enum!(Role {
    Student => "student",
    Instructor => "instructor",
    Admin => "admin",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

text_enum!(CourseLevel {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Archived,
}

text_enum!(CourseStatus {
    Draft => "draft",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Archived => "archived",
});

impl CourseStatus {
    /// Review workflow: draft/rejected go to review, review ends in
    /// approval or rejection, and anything not yet archived can be archived.
    pub fn can_transition_to(self, next: CourseStatus) -> bool {
        use CourseStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Rejected, Pending)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Draft, Archived)
                | (Pending, Archived)
                | (Approved, Archived)
                | (Rejected, Archived)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    Video,
    Text,
    Quiz,
    Assignment,
    Download,
}

text_enum!(LessonType {
    Video => "video",
    Text => "text",
    Quiz => "quiz",
    Assignment => "assignment",
    Download => "download",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

text_enum!(EnrollmentStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
    Expired => "expired",
});

impl EnrollmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EnrollmentStatus::Active)
    }

    /// Only `active` has outgoing edges.
    pub fn can_transition_to(self, next: EnrollmentStatus) -> bool {
        self == EnrollmentStatus::Active && next.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    CourseCompletion,
    Streak,
    Points,
    Special,
    Achievement,
}

text_enum!(BadgeType {
    CourseCompletion => "course_completion",
    Streak => "streak",
    Points => "points",
    Special => "special",
    Achievement => "achievement",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Free,
    Paid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseSort {
    #[default]
    Popular,
    Newest,
    Rating,
    PriceLow,
    PriceHigh,
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub points: i32,
    pub total_courses_completed: i32,
    pub total_hours_learned: i32,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty(user_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            bio: None,
            points: 0,
            total_courses_completed: 0,
            total_hours_learned: 0,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub short_description: String,
    pub thumbnail_url: Option<String>,
    pub preview_video_url: Option<String>,
    pub instructor_id: Uuid,
    pub category_id: Uuid,
    pub level: CourseLevel,
    pub status: CourseStatus,
    pub is_free: bool,
    pub price: BigDecimal,
    pub requirements: Vec<String>,
    pub what_you_will_learn: Vec<String>,
    pub tags: Vec<String>,
    pub language: String,
    pub duration_minutes: i32,
    pub total_lessons: i32,
    pub total_students: i32,
    pub average_rating: f64,
    pub total_ratings: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub featured_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.status == CourseStatus::Approved && self.published_at.is_some_and(|at| at <= now)
    }

    pub fn is_featured(&self, now: DateTime<Utc>) -> bool {
        self.featured_until.is_some_and(|until| until > now)
    }

    pub fn requires_payment(&self) -> bool {
        !self.is_free && self.price > BigDecimal::from(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSection {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub lesson_type: LessonType,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_seconds: i32,
    pub sort_order: i32,
    pub is_published: bool,
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub price_paid: BigDecimal,
    pub status: EnrollmentStatus,
    pub progress_percentage: f64,
    pub completed_lessons: i32,
    pub total_lessons: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    pub is_completed: bool,
    pub watch_time_seconds: i32,
    pub total_duration_seconds: i32,
    pub completion_percentage: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

impl LessonProgress {
    pub fn started(watch: &LessonWatch) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: watch.user_id,
            course_id: watch.course_id,
            lesson_id: watch.lesson_id,
            is_completed: false,
            watch_time_seconds: 0,
            total_duration_seconds: watch.total_duration_seconds,
            completion_percentage: 0.0,
            started_at: watch.at,
            completed_at: None,
            last_accessed_at: watch.at,
        }
    }
}

/// One watch event as handed to the store's lesson-progress upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonWatch {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    pub watch_time_seconds: i32,
    pub total_duration_seconds: i32,
    pub mark_completed: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonWatchOutcome {
    pub progress: LessonProgress,
    pub newly_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRating {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub rating: i32,
    pub review: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub is_pinned: bool,
    pub is_resolved: bool,
    pub replies_count: i32,
    pub likes_count: i32,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionReply {
    pub id: Uuid,
    pub discussion_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub depth: i32,
    pub content: String,
    pub likes_count: i32,
    pub is_solution: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub certificate_number: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub student_name: String,
    pub course_title: String,
    pub instructor_name: String,
    pub completion_date: DateTime<Utc>,
    pub issued_date: DateTime<Utc>,
    pub verification_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub badge_type: BadgeType,
    pub criteria: serde_json::Value,
    pub points_reward: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Badge {
    /// Number of completed courses a course-completion badge asks for.
    pub fn courses_completed_threshold(&self) -> Option<i64> {
        self.criteria
            .get("courses_completed")
            .and_then(serde_json::Value::as_i64)
            .filter(|n| *n >= 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBadge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_id: Uuid,
    pub earned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

// ============================================================================
// QUERIES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseQuery {
    pub search: Option<String>,
    pub category: Option<Uuid>,
    pub level: Option<CourseLevel>,
    pub price_type: Option<PriceType>,
    pub sort: Option<CourseSort>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A resolved listing over published courses, as handed to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseListing {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub level: Option<CourseLevel>,
    pub price_type: Option<PriceType>,
    pub featured_only: bool,
    pub exclude_course: Option<Uuid>,
    pub sort: CourseSort,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogTotals {
    pub published_courses: i64,
    pub published_minutes: i64,
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Student
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub category_id: Uuid,
    pub level: CourseLevel,
    #[serde(default)]
    pub is_free: bool,
    pub price: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub preview_video_url: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub what_you_will_learn: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category_id: Option<Uuid>,
    pub level: Option<CourseLevel>,
    pub is_free: Option<bool>,
    pub price: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub preview_video_url: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub what_you_will_learn: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSectionRequest {
    pub title: String,
    pub description: Option<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLessonRequest {
    pub section_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub lesson_type: LessonType,
    pub content: Option<String>,
    pub video_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: i32,
    pub is_published: Option<bool>,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCourseRequest {
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgressRequest {
    pub watch_time_seconds: i32,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRatingRequest {
    pub rating: i32,
    pub review: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRatingRequest {
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDiscussionRequest {
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReplyRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBadgeRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub badge_type: BadgeType,
    #[serde(default)]
    pub criteria: serde_json::Value,
    #[serde(default)]
    pub points_reward: i32,
}

// ============================================================================
// READ MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CoursePage {
    pub items: Vec<Course>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionWithLessons {
    pub section: CourseSection,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub sections: Vec<SectionWithLessons>,
    pub ratings: Vec<CourseRating>,
    pub enrollment: Option<Enrollment>,
    pub similar: Vec<Course>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub published_courses: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonProgressReport {
    pub lesson_progress: LessonProgress,
    pub enrollment: Enrollment,
    pub lesson_newly_completed: bool,
    pub course_newly_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseProgress {
    pub enrollment: Enrollment,
    pub lessons: Vec<LessonProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyPosted {
    pub reply: DiscussionReply,
    pub discussion: Discussion,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub profile: UserProfile,
    pub badges: Vec<UserBadge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_courses: i64,
    pub total_students: i64,
    pub total_instructors: i64,
    pub total_hours: i64,
}
