use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use coursehub::core::config::AppConfig;
use coursehub::core::shared::state::AppState;
use coursehub::learn::handlers::USER_HEADER;
use coursehub::learn::store::InMemoryLearnStore;
use coursehub::learn::LearnPlatform;
use coursehub::main_module::build_router;

struct Harness {
    app: Router,
    learn: LearnPlatform<InMemoryLearnStore>,
}

impl Harness {
    fn new() -> Self {
        let config = AppConfig::default();
        let learn = LearnPlatform::new(Arc::new(InMemoryLearnStore::new()), &config);
        let state = Arc::new(AppState::new(config, learn.clone()));
        Self {
            app: build_router(state),
            learn,
        }
    }

    async fn send(&self, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(&self, name: &str, role: &str) -> Uuid {
        let (status, body) = self
            .send(
                "POST",
                "/api/learn/users",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Approved course with `lessons` ten-minute lessons, created over HTTP.
    async fn published_course(&self, title: &str, price: Option<f64>, lessons: usize) -> (Uuid, Vec<Uuid>) {
        let admin = self.register("Admin", "admin").await;
        let instructor = self.register("Mentor", "instructor").await;

        let (_, category) = self
            .send(
                "POST",
                "/api/learn/categories",
                Some(admin),
                Some(serde_json::json!({ "name": format!("Category {title}") })),
            )
            .await;
        let category_id = category["data"]["id"].as_str().unwrap();

        let (status, course) = self
            .send(
                "POST",
                "/api/learn/courses",
                Some(instructor),
                Some(serde_json::json!({
                    "title": title,
                    "description": "A complete walkthrough",
                    "short_description": "Walkthrough",
                    "category_id": category_id,
                    "level": "beginner",
                    "is_free": price.is_none(),
                    "price": price,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{course}");
        let course_id: Uuid = course["data"]["id"].as_str().unwrap().parse().unwrap();

        let (_, section) = self
            .send(
                "POST",
                &format!("/api/learn/courses/{course_id}/sections"),
                Some(instructor),
                Some(serde_json::json!({ "title": "Part 1" })),
            )
            .await;
        let section_id = section["data"]["id"].as_str().unwrap().to_string();

        let mut lesson_ids = Vec::new();
        for n in 1..=lessons {
            let (status, lesson) = self
                .send(
                    "POST",
                    &format!("/api/learn/courses/{course_id}/lessons"),
                    Some(instructor),
                    Some(serde_json::json!({
                        "section_id": section_id,
                        "title": format!("Lesson {n}"),
                        "lesson_type": "video",
                        "duration_seconds": 600,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{lesson}");
            lesson_ids.push(lesson["data"]["id"].as_str().unwrap().parse().unwrap());
        }

        let (status, _) = self
            .send("POST", &format!("/api/learn/courses/{course_id}/submit"), Some(instructor), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, approved) = self
            .send("POST", &format!("/api/learn/courses/{course_id}/approve"), Some(admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["data"]["status"], "approved");

        (course_id, lesson_ids)
    }
}

#[tokio::test]
async fn test_health_reports_storage() {
    let harness = Harness::new();
    for path in ["/health", "/api/health"] {
        let (status, body) = harness.send("GET", path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "coursehub");
        assert_eq!(body["database"], true);
    }
}

#[tokio::test]
async fn test_enroll_over_http() {
    let harness = Harness::new();
    let (course_id, _) = harness.published_course("HTTP Basics", None, 2).await;
    let student = harness.register("Student", "student").await;
    let enroll_uri = format!("/api/learn/courses/{course_id}/enroll");

    let (status, body) = harness.send("POST", &enroll_uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");

    let (status, body) = harness.send("POST", &enroll_uri, Some(student), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = harness.send("POST", &enroll_uri, Some(student), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_enrolled");

    let (_, detail) = harness
        .send("GET", &format!("/api/learn/courses/{course_id}"), Some(student), None)
        .await;
    assert_eq!(detail["data"]["course"]["total_students"], 1);
    assert_eq!(detail["data"]["enrollment"]["status"], "active");
}

#[tokio::test]
async fn test_paid_course_requires_payment() {
    let harness = Harness::new();
    let (course_id, _) = harness.published_course("Premium", Some(49.9), 1).await;
    let student = harness.register("Buyer", "student").await;

    let (status, body) = harness
        .send("POST", &format!("/api/learn/courses/{course_id}/enroll"), Some(student), None)
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "payment_required");
    assert_eq!(body["price"], "49.90");
}

#[tokio::test]
async fn test_progress_and_certificate_over_http() {
    let harness = Harness::new();
    let (course_id, lessons) = harness.published_course("Quick Win", None, 2).await;
    let student = harness.register("Finisher", "student").await;
    harness
        .send("POST", &format!("/api/learn/courses/{course_id}/enroll"), Some(student), None)
        .await;

    let mut last = Value::Null;
    for lesson_id in &lessons {
        let (status, body) = harness
            .send(
                "POST",
                &format!("/api/learn/lessons/{lesson_id}/progress"),
                Some(student),
                Some(serde_json::json!({ "watch_time_seconds": 600, "is_completed": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        last = body;
    }
    assert_eq!(last["data"]["enrollment"]["status"], "completed");
    assert_eq!(last["data"]["enrollment"]["progress_percentage"], 100.0);

    let (_, certificates) = harness
        .send("GET", "/api/learn/certificates", Some(student), None)
        .await;
    let number = certificates["data"][0]["certificate_number"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, verified) = harness
        .send("GET", &format!("/api/learn/certificates/{number}/verify"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["data"]["valid"], true);

    let (status, _) = harness
        .send("GET", "/api/learn/certificates/CERT-19700101-00000000/verify", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let profile = harness.learn.badges.profile(student).await.unwrap();
    assert_eq!(profile.profile.total_courses_completed, 1);
}

#[tokio::test]
async fn test_published_listing_hides_drafts() {
    let harness = Harness::new();
    let (published, _) = harness.published_course("Visible", None, 1).await;

    let instructor = harness.register("Drafter", "instructor").await;
    let admin = harness.register("Root", "admin").await;
    let (_, category) = harness
        .send(
            "POST",
            "/api/learn/categories",
            Some(admin),
            Some(serde_json::json!({ "name": "Drafts" })),
        )
        .await;
    let (_, draft) = harness
        .send(
            "POST",
            "/api/learn/courses",
            Some(instructor),
            Some(serde_json::json!({
                "title": "Hidden",
                "description": "Not ready",
                "short_description": "WIP",
                "category_id": category["data"]["id"],
                "level": "advanced",
                "is_free": true,
            })),
        )
        .await;
    let draft_id = draft["data"]["id"].as_str().unwrap();

    let (status, page) = harness.send("GET", "/api/learn/courses", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = page["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert_eq!(ids, vec![published.to_string().as_str()]);
    assert_eq!(page["data"]["total"], 1);

    let (status, _) = harness
        .send("GET", &format!("/api/learn/courses/{draft_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = harness
        .send("GET", &format!("/api/learn/courses/{draft_id}"), Some(instructor), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = harness.send("GET", "/api/learn/stats", None, None).await;
    assert_eq!(stats["data"]["total_courses"], 1);
}

#[tokio::test]
async fn test_student_cannot_create_courses() {
    let harness = Harness::new();
    let student = harness.register("Curious", "student").await;
    let (status, body) = harness
        .send(
            "POST",
            "/api/learn/courses",
            Some(student),
            Some(serde_json::json!({
                "title": "Nope",
                "description": "Nope",
                "short_description": "Nope",
                "category_id": Uuid::new_v4(),
                "level": "beginner",
                "is_free": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_out_of_range_page_is_bad_request() {
    let harness = Harness::new();
    harness.published_course("Paging", None, 1).await;

    let (status, body) = harness
        .send("GET", &format!("/api/learn/courses?page={}", i64::MAX), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = harness
        .send("GET", "/api/learn/courses?page=1000&per_page=12", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}
