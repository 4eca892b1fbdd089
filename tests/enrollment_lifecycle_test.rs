use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use coursehub::core::config::AppConfig;
use coursehub::learn::enrollment::{PaymentGateway, PaymentOutcome, PaymentRequest};
use coursehub::learn::store::{InMemoryLearnStore, LearnStore};
use coursehub::learn::types::*;
use coursehub::learn::{LearnError, LearnPlatform};

struct Fixture {
    learn: LearnPlatform<InMemoryLearnStore>,
    admin: User,
    instructor: User,
    category: Category,
}

struct CardGateway;

#[async_trait]
impl PaymentGateway for CardGateway {
    async fn charge(&self, request: &PaymentRequest) -> Result<PaymentOutcome, LearnError> {
        Ok(PaymentOutcome::Completed {
            reference: format!("card-{}", request.user_id),
            amount: request.amount.clone(),
        })
    }
}

async fn register(learn: &LearnPlatform<InMemoryLearnStore>, name: &str, role: Role) -> User {
    learn
        .users
        .register(RegisterUserRequest {
            name: name.to_string(),
            email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
            role,
        })
        .await
        .expect("register user")
}

async fn setup_with(learn: LearnPlatform<InMemoryLearnStore>) -> Fixture {
    let admin = register(&learn, "Admin", Role::Admin).await;
    let instructor = register(&learn, "Grace", Role::Instructor).await;
    let category = learn
        .catalog
        .create_category(
            &admin,
            CreateCategoryRequest {
                name: "Programming".to_string(),
                description: None,
                icon: None,
                color: None,
                parent_id: None,
                sort_order: None,
            },
        )
        .await
        .expect("create category");
    Fixture {
        learn,
        admin,
        instructor,
        category,
    }
}

async fn setup() -> Fixture {
    let learn = LearnPlatform::new(Arc::new(InMemoryLearnStore::new()), &AppConfig::default());
    setup_with(learn).await
}

async fn publish(fx: &Fixture, title: &str, price: Option<f64>, lessons: usize) -> (Course, Vec<Lesson>) {
    let catalog = &fx.learn.catalog;
    let course = catalog
        .create_course(
            &fx.instructor,
            CreateCourseRequest {
                title: title.to_string(),
                description: "Everything you need to get started.".to_string(),
                short_description: "Start here".to_string(),
                category_id: fx.category.id,
                level: CourseLevel::Beginner,
                is_free: price.is_none(),
                price,
                thumbnail_url: None,
                preview_video_url: None,
                requirements: vec![],
                what_you_will_learn: vec!["Ownership".to_string()],
                tags: vec!["rust".to_string()],
                language: None,
            },
        )
        .await
        .expect("create course");

    let section = catalog
        .add_section(
            &fx.instructor,
            course.id,
            CreateSectionRequest {
                title: "Basics".to_string(),
                description: None,
                sort_order: None,
            },
        )
        .await
        .expect("add section");

    let mut created = Vec::new();
    for n in 1..=lessons {
        let lesson = catalog
            .add_lesson(
                &fx.instructor,
                course.id,
                CreateLessonRequest {
                    section_id: section.id,
                    title: format!("Lesson {n}"),
                    description: None,
                    lesson_type: LessonType::Video,
                    content: None,
                    video_url: None,
                    duration_seconds: 600,
                    is_published: None,
                    is_free: false,
                },
            )
            .await
            .expect("add lesson");
        created.push(lesson);
    }

    catalog
        .submit_for_review(&fx.instructor, course.id)
        .await
        .expect("submit");
    let course = catalog.approve(&fx.admin, course.id).await.expect("approve");
    (course, created)
}

fn watched(seconds: i32, completed: bool) -> LessonProgressRequest {
    LessonProgressRequest {
        watch_time_seconds: seconds,
        is_completed: completed,
    }
}

#[tokio::test]
async fn test_full_course_completion_issues_certificate_and_badge() {
    let fx = setup().await;
    fx.learn
        .badges
        .create_badge(
            &fx.admin,
            CreateBadgeRequest {
                name: "First Course".to_string(),
                description: None,
                icon: None,
                color: None,
                badge_type: BadgeType::CourseCompletion,
                criteria: serde_json::json!({ "courses_completed": 1 }),
                points_reward: 25,
            },
        )
        .await
        .unwrap();

    let (course, lessons) = publish(&fx, "Rust From Scratch", None, 10).await;
    assert_eq!(course.total_lessons, 10);
    assert_eq!(course.duration_minutes, 100);

    let student = register(&fx.learn, "Ada", Role::Student).await;
    let enrollment = fx.learn.enrollments.enroll(student.id, course.id).await.unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::Active);
    assert_eq!(enrollment.total_lessons, 10);

    let course = fx.learn.store().get_course(course.id).await.unwrap().unwrap();
    assert_eq!(course.total_students, 1);

    let mut last = None;
    for (n, lesson) in lessons.iter().enumerate() {
        let report = fx
            .learn
            .progress
            .record_lesson_progress(student.id, lesson.id, watched(600, true))
            .await
            .unwrap();
        assert!(report.lesson_newly_completed);
        assert_eq!(report.enrollment.completed_lessons, n as i32 + 1);
        assert_eq!(report.enrollment.progress_percentage, (n as f64 + 1.0) * 10.0);
        last = Some(report);
    }

    let last = last.unwrap();
    assert!(last.course_newly_completed);
    assert_eq!(last.enrollment.status, EnrollmentStatus::Completed);
    assert!(last.enrollment.completed_at.is_some());

    // Replaying a completed lesson changes nothing.
    let replay = fx
        .learn
        .progress
        .record_lesson_progress(student.id, lessons[0].id, watched(600, true))
        .await
        .unwrap();
    assert!(!replay.lesson_newly_completed);
    assert!(!replay.course_newly_completed);
    assert_eq!(replay.enrollment.completed_lessons, 10);

    let certificates = fx.learn.certificates.list_for_user(student.id).await.unwrap();
    assert_eq!(certificates.len(), 1);
    assert_eq!(certificates[0].course_title, "Rust From Scratch");
    assert_eq!(certificates[0].instructor_name, "Grace");
    let verified = fx
        .learn
        .certificates
        .verify(&certificates[0].certificate_number)
        .await
        .unwrap();
    assert_eq!(verified.user_id, student.id);

    let summary = fx.learn.badges.profile(student.id).await.unwrap();
    assert_eq!(summary.profile.total_courses_completed, 1);
    assert_eq!(summary.profile.points, 25);
    assert_eq!(summary.badges.len(), 1);
}

#[tokio::test]
async fn test_partial_watch_tracks_percentage_without_completing() {
    let fx = setup().await;
    let (course, lessons) = publish(&fx, "Async Rust", None, 4).await;
    let student = register(&fx.learn, "Linus", Role::Student).await;
    fx.learn.enrollments.enroll(student.id, course.id).await.unwrap();

    let report = fx
        .learn
        .progress
        .record_lesson_progress(student.id, lessons[0].id, watched(200, false))
        .await
        .unwrap();
    assert_eq!(report.lesson_progress.completion_percentage, 33.33);
    assert!(!report.lesson_progress.is_completed);
    assert_eq!(report.enrollment.completed_lessons, 0);
    assert_eq!(report.enrollment.progress_percentage, 0.0);

    let progress = fx
        .learn
        .progress
        .course_progress(student.id, course.id)
        .await
        .unwrap();
    assert_eq!(progress.lessons.len(), 1);
    assert_eq!(progress.enrollment.status, EnrollmentStatus::Active);
}

#[tokio::test]
async fn test_enrollment_errors() {
    let fx = setup().await;
    let (free, lessons) = publish(&fx, "Free Course", None, 2).await;
    let (paid, _) = publish(&fx, "Paid Course", Some(49.9), 2).await;
    let student = register(&fx.learn, "Ken", Role::Student).await;

    fx.learn.enrollments.enroll(student.id, free.id).await.unwrap();
    let err = fx.learn.enrollments.enroll(student.id, free.id).await.unwrap_err();
    assert!(matches!(err, LearnError::AlreadyEnrolled));

    let err = fx.learn.enrollments.enroll(student.id, paid.id).await.unwrap_err();
    match err {
        LearnError::PaymentRequired { course_id, price } => {
            assert_eq!(course_id, paid.id);
            assert_eq!(price.to_string(), "49.90");
        }
        other => panic!("expected PaymentRequired, got {other:?}"),
    }
    let paid_now = fx.learn.store().get_course(paid.id).await.unwrap().unwrap();
    assert_eq!(paid_now.total_students, 0);

    let err = fx
        .learn
        .enrollments
        .enroll(student.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LearnError::NotFound(_)));

    let cancelled = fx.learn.enrollments.cancel(student.id, free.id).await.unwrap();
    assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
    let err = fx
        .learn
        .progress
        .record_lesson_progress(student.id, lessons[0].id, watched(600, true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LearnError::EnrollmentClosed(EnrollmentStatus::Cancelled)
    ));
    let err = fx.learn.enrollments.cancel(student.id, free.id).await.unwrap_err();
    assert!(matches!(err, LearnError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_paid_enrollment_with_gateway() {
    let learn = LearnPlatform::new(Arc::new(InMemoryLearnStore::new()), &AppConfig::default())
        .with_payment_gateway(Arc::new(CardGateway));
    let fx = setup_with(learn).await;
    let (paid, _) = publish(&fx, "Systems Design", Some(120.0), 1).await;
    let student = register(&fx.learn, "Barbara", Role::Student).await;

    let enrollment = fx.learn.enrollments.enroll(student.id, paid.id).await.unwrap();
    assert_eq!(enrollment.price_paid.to_string(), "120.00");
    let course = fx.learn.store().get_course(paid.id).await.unwrap().unwrap();
    assert_eq!(course.total_students, 1);
}

#[tokio::test]
async fn test_ratings_and_discussions() {
    let fx = setup().await;
    let (course, _) = publish(&fx, "Parsing", None, 1).await;
    let alice = register(&fx.learn, "Alice", Role::Student).await;
    let bob = register(&fx.learn, "Bob", Role::Student).await;

    for (user, stars) in [(&alice, 5), (&bob, 4)] {
        fx.learn
            .ratings
            .submit_rating(
                user.id,
                course.id,
                SubmitRatingRequest {
                    rating: stars,
                    review: None,
                },
            )
            .await
            .unwrap();
    }
    let rated = fx.learn.store().get_course(course.id).await.unwrap().unwrap();
    assert_eq!(rated.average_rating, 4.5);
    assert_eq!(rated.total_ratings, 2);

    let err = fx
        .learn
        .ratings
        .submit_rating(
            alice.id,
            course.id,
            SubmitRatingRequest {
                rating: 1,
                review: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LearnError::DuplicateRating));

    let discussion = fx
        .learn
        .discussions
        .start_discussion(
            alice.id,
            course.id,
            StartDiscussionRequest {
                lesson_id: None,
                title: "Lifetimes".to_string(),
                content: "Why does this borrow fail?".to_string(),
            },
        )
        .await
        .unwrap();

    let first = fx
        .learn
        .discussions
        .post_reply(
            discussion.id,
            bob.id,
            PostReplyRequest {
                content: "Show the code".to_string(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.discussion.replies_count, 1);
    assert!(first.discussion.last_activity_at >= discussion.last_activity_at);

    let nested = fx
        .learn
        .discussions
        .post_reply(
            discussion.id,
            alice.id,
            PostReplyRequest {
                content: "Here it is".to_string(),
                parent_id: Some(first.reply.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(nested.reply.depth, 1);
    assert_eq!(nested.discussion.replies_count, 2);

    let err = fx
        .learn
        .discussions
        .post_reply(
            discussion.id,
            bob.id,
            PostReplyRequest {
                content: "Orphan".to_string(),
                parent_id: Some(Uuid::new_v4()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LearnError::InvalidParent(_)));

    let solved = fx
        .learn
        .discussions
        .mark_solution(&alice, discussion.id, first.reply.id)
        .await
        .unwrap();
    assert!(solved.is_resolved);
}
