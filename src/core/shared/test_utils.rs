use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::learn::enrollment::{PaymentGateway, PaymentOutcome, PaymentRequest};
use crate::learn::store::{InMemoryLearnStore, LearnStore};
use crate::learn::types::*;
use crate::learn::{LearnError, LearnPlatform};

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn user_fixture(role: Role) -> User {
    let tag = short_id();
    User {
        id: Uuid::new_v4(),
        name: format!("{role} {tag}"),
        email: format!("{role}-{tag}@example.com"),
        role,
        created_at: Utc::now(),
    }
}

/// A free draft course with no lessons.
pub fn course_fixture(instructor_id: Uuid, category_id: Uuid) -> Course {
    let now = Utc::now();
    let title = format!("Course {}", short_id());
    Course {
        id: Uuid::new_v4(),
        slug: crate::core::shared::utils::slugify(&title),
        title,
        description: "Fixture course".to_string(),
        short_description: "Fixture".to_string(),
        thumbnail_url: None,
        preview_video_url: None,
        instructor_id,
        category_id,
        level: CourseLevel::Beginner,
        status: CourseStatus::Draft,
        is_free: true,
        price: BigDecimal::from(0),
        requirements: vec![],
        what_you_will_learn: vec![],
        tags: vec![],
        language: "en".to_string(),
        duration_minutes: 0,
        total_lessons: 0,
        total_students: 0,
        average_rating: 0.0,
        total_ratings: 0,
        published_at: None,
        featured_until: None,
        created_at: now,
        updated_at: now,
    }
}

/// An active enrollment with no progress.
pub fn enrollment_fixture(user_id: Uuid, course_id: Uuid, total_lessons: i32) -> Enrollment {
    let now = Utc::now();
    Enrollment {
        id: Uuid::new_v4(),
        user_id,
        course_id,
        price_paid: BigDecimal::from(0),
        status: EnrollmentStatus::Active,
        progress_percentage: 0.0,
        completed_lessons: 0,
        total_lessons,
        started_at: now,
        completed_at: None,
        expires_at: None,
        last_accessed_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn badge_fixture(courses_completed: i64) -> Badge {
    let tag = short_id();
    Badge {
        id: Uuid::new_v4(),
        name: format!("Finisher {tag}"),
        slug: format!("finisher-{tag}"),
        description: None,
        icon: None,
        color: None,
        badge_type: BadgeType::CourseCompletion,
        criteria: serde_json::json!({ "courses_completed": courses_completed }),
        points_reward: 0,
        is_active: true,
        created_at: Utc::now(),
    }
}

/// Accepts every charge for the full course price.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApprovingPaymentGateway;

#[async_trait]
impl PaymentGateway for ApprovingPaymentGateway {
    async fn charge(&self, request: &PaymentRequest) -> Result<PaymentOutcome, LearnError> {
        Ok(PaymentOutcome::Completed {
            reference: format!("test-{}", short_id()),
            amount: request.amount.clone(),
        })
    }
}

/// In-memory platform with seeding helpers.
pub struct TestPlatform {
    pub config: AppConfig,
    pub store: Arc<InMemoryLearnStore>,
    pub learn: LearnPlatform<InMemoryLearnStore>,
    catalog_owner: OnceCell<(User, Category)>,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryLearnStore::new());
        let learn = LearnPlatform::new(Arc::clone(&store), &config);
        Self {
            config,
            store,
            learn,
            catalog_owner: OnceCell::new(),
        }
    }

    pub fn with_payments(gateway: Arc<dyn PaymentGateway>) -> Self {
        let mut platform = Self::new();
        platform.learn = platform.learn.with_payment_gateway(gateway);
        platform
    }

    pub fn app_state(&self) -> Arc<AppState<InMemoryLearnStore>> {
        Arc::new(AppState::new(self.config.clone(), self.learn.clone()))
    }

    pub async fn user(&self, role: Role) -> User {
        let user = self
            .store
            .insert_user(user_fixture(role))
            .await
            .expect("insert user");
        self.store
            .ensure_profile(user.id, user.created_at)
            .await
            .expect("create profile");
        user
    }

    pub async fn student(&self) -> User {
        self.user(Role::Student).await
    }

    pub async fn instructor(&self) -> User {
        self.user(Role::Instructor).await
    }

    pub async fn admin(&self) -> User {
        self.user(Role::Admin).await
    }

    pub async fn category(&self, name: &str) -> Category {
        self.store
            .insert_category(Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: crate::core::shared::utils::slugify(name),
                description: None,
                icon: None,
                color: None,
                parent_id: None,
                sort_order: 0,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .expect("insert category")
    }

    async fn catalog_owner(&self) -> &(User, Category) {
        self.catalog_owner
            .get_or_init(|| async {
                let instructor = self.instructor().await;
                let category = self.category("General").await;
                (instructor, category)
            })
            .await
    }

    /// Published course with `lessons` ten-minute lessons in one section.
    pub async fn published_course(&self, price: Option<&str>, lessons: usize) -> (Course, Vec<Lesson>) {
        let (instructor, category) = self.catalog_owner().await;
        let now = Utc::now();

        let mut course = course_fixture(instructor.id, category.id);
        course.status = CourseStatus::Approved;
        course.published_at = Some(now - Duration::hours(1));
        if let Some(price) = price {
            course.is_free = false;
            course.price = price.parse().expect("price");
        }
        let course = self.store.insert_course(course).await.expect("insert course");

        let section = self
            .store
            .insert_section(CourseSection {
                id: Uuid::new_v4(),
                course_id: course.id,
                title: "Section 1".to_string(),
                description: None,
                sort_order: 1,
                created_at: now,
            })
            .await
            .expect("insert section");

        let mut created = Vec::with_capacity(lessons);
        for n in 1..=lessons {
            let lesson = self
                .store
                .insert_lesson(Lesson {
                    id: Uuid::new_v4(),
                    course_id: course.id,
                    section_id: section.id,
                    title: format!("Lesson {n}"),
                    slug: format!("lesson-{n}"),
                    description: None,
                    lesson_type: LessonType::Video,
                    content: None,
                    video_url: None,
                    duration_seconds: 600,
                    sort_order: n as i32,
                    is_published: true,
                    is_free: false,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("insert lesson");
            created.push(lesson);
        }

        let course = self
            .store
            .refresh_course_totals(course.id, now)
            .await
            .expect("refresh totals");
        (course, created)
    }

    pub async fn free_course(&self, lessons: usize) -> (Course, Vec<Lesson>) {
        self.published_course(None, lessons).await
    }

    pub async fn paid_course(&self, price: &str, lessons: usize) -> (Course, Vec<Lesson>) {
        self.published_course(Some(price), lessons).await
    }

    pub async fn completion_badge(&self, courses_completed: i64, points: i32) -> Badge {
        let mut badge = badge_fixture(courses_completed);
        badge.points_reward = points;
        self.store.insert_badge(badge).await.expect("insert badge")
    }
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a lesson fully watched and completed.
pub async fn complete(platform: &TestPlatform, user_id: Uuid, lesson_id: Uuid) -> LessonProgressReport {
    platform
        .learn
        .progress
        .record_lesson_progress(
            user_id,
            lesson_id,
            LessonProgressRequest {
                watch_time_seconds: 600,
                is_completed: true,
            },
        )
        .await
        .expect("record lesson progress")
}
