use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::store::LearnStore;
use super::types::*;
use crate::core::shared::state::AppState;

/// Header carrying the id of the calling user.
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_SHOWCASE_LIMIT: i64 = 6;
const DEFAULT_RATINGS_LIMIT: i64 = 10;

type LearnState<S> = State<Arc<AppState<S>>>;
type HandlerResult = Result<Response, LearnError>;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn resolve(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 50)
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(serde_json::json!({
        "success": true,
        "data": data
    }))
    .into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": data
        })),
    )
        .into_response()
}

fn caller_id(headers: &HeaderMap) -> Result<Option<Uuid>, LearnError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| LearnError::Unauthorized(format!("malformed {USER_HEADER} header")))
}

async fn caller<S: LearnStore>(state: &AppState<S>, headers: &HeaderMap) -> Result<User, LearnError> {
    state.learn.users.authenticate(caller_id(headers)?).await
}

async fn viewer<S: LearnStore>(state: &AppState<S>, headers: &HeaderMap) -> Result<Option<User>, LearnError> {
    match caller_id(headers)? {
        Some(id) => state.learn.users.authenticate(Some(id)).await.map(Some),
        None => Ok(None),
    }
}

// ============================================================================
// USERS
// ============================================================================

pub async fn register_user<S: LearnStore>(
    State(state): LearnState<S>,
    Json(req): Json<RegisterUserRequest>,
) -> HandlerResult {
    Ok(created(state.learn.users.register(req).await?))
}

pub async fn my_profile<S: LearnStore>(State(state): LearnState<S>, headers: HeaderMap) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.badges.profile(user.id).await?))
}

pub async fn create_badge<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Json(req): Json<CreateBadgeRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.badges.create_badge(&user, req).await?))
}

// ============================================================================
// CATALOG
// ============================================================================

pub async fn list_categories<S: LearnStore>(State(state): LearnState<S>) -> HandlerResult {
    Ok(ok(state.learn.catalog.list_categories(Utc::now()).await?))
}

pub async fn create_category<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Json(req): Json<CreateCategoryRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.catalog.create_category(&user, req).await?))
}

/// List published courses with optional filters
pub async fn list_courses<S: LearnStore>(
    State(state): LearnState<S>,
    Query(query): Query<CourseQuery>,
) -> HandlerResult {
    Ok(ok(state.learn.catalog.list_published(query, Utc::now()).await?))
}

pub async fn featured_courses<S: LearnStore>(
    State(state): LearnState<S>,
    Query(query): Query<LimitQuery>,
) -> HandlerResult {
    let limit = query.resolve(DEFAULT_SHOWCASE_LIMIT);
    Ok(ok(state.learn.catalog.featured(Utc::now(), limit).await?))
}

pub async fn popular_courses<S: LearnStore>(
    State(state): LearnState<S>,
    Query(query): Query<LimitQuery>,
) -> HandlerResult {
    let limit = query.resolve(DEFAULT_SHOWCASE_LIMIT);
    Ok(ok(state.learn.catalog.popular(Utc::now(), limit).await?))
}

pub async fn create_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Json(req): Json<CreateCourseRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.catalog.create_course(&user, req).await?))
}

/// Course with sections, recent ratings and the caller's enrollment
pub async fn get_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let viewer = viewer(&state, &headers).await?;
    Ok(ok(state
        .learn
        .catalog
        .course_detail(course_id, viewer.as_ref(), Utc::now())
        .await?))
}

pub async fn update_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<UpdateCourseRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.catalog.update_course(&user, course_id, req).await?))
}

pub async fn delete_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    state.learn.catalog.delete_course(&user, course_id).await?;
    Ok(ok(serde_json::json!({ "deleted": course_id })))
}

pub async fn submit_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.catalog.submit_for_review(&user, course_id).await?))
}

pub async fn approve_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.catalog.approve(&user, course_id).await?))
}

pub async fn reject_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.catalog.reject(&user, course_id).await?))
}

pub async fn archive_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.catalog.archive(&user, course_id).await?))
}

pub async fn feature_course<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<FeatureCourseRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state
        .learn
        .catalog
        .set_featured(&user, course_id, req.until)
        .await?))
}

pub async fn add_section<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateSectionRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.catalog.add_section(&user, course_id, req).await?))
}

pub async fn add_lesson<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLessonRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.catalog.add_lesson(&user, course_id, req).await?))
}

pub async fn delete_lesson<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(lesson_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    state.learn.catalog.delete_lesson(&user, lesson_id).await?;
    Ok(ok(serde_json::json!({ "deleted": lesson_id })))
}

pub async fn platform_stats<S: LearnStore>(State(state): LearnState<S>) -> HandlerResult {
    Ok(ok(state.learn.catalog.platform_stats(Utc::now()).await?))
}

// ============================================================================
// ENROLLMENT & PROGRESS
// ============================================================================

pub async fn enroll<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.enrollments.enroll(user.id, course_id).await?))
}

pub async fn cancel_enrollment<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.enrollments.cancel(user.id, course_id).await?))
}

pub async fn my_enrollments<S: LearnStore>(State(state): LearnState<S>, headers: HeaderMap) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.enrollments.list_for_user(user.id).await?))
}

pub async fn course_progress<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.progress.course_progress(user.id, course_id).await?))
}

pub async fn record_lesson_progress<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<LessonProgressRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state
        .learn
        .progress
        .record_lesson_progress(user.id, lesson_id, req)
        .await?))
}

// ============================================================================
// RATINGS & DISCUSSIONS
// ============================================================================

pub async fn recent_ratings<S: LearnStore>(
    State(state): LearnState<S>,
    Path(course_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> HandlerResult {
    let limit = query.resolve(DEFAULT_RATINGS_LIMIT);
    Ok(ok(state.learn.ratings.recent_ratings(course_id, limit).await?))
}

pub async fn submit_rating<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<SubmitRatingRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state.learn.ratings.submit_rating(user.id, course_id, req).await?))
}

pub async fn publish_rating<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(rating_id): Path<Uuid>,
    Json(req): Json<PublishRatingRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state
        .learn
        .ratings
        .set_published(&user, rating_id, req.published)
        .await?))
}

pub async fn list_discussions<S: LearnStore>(
    State(state): LearnState<S>,
    Path(course_id): Path<Uuid>,
) -> HandlerResult {
    Ok(ok(state.learn.discussions.list_discussions(course_id).await?))
}

pub async fn start_discussion<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    Json(req): Json<StartDiscussionRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state
        .learn
        .discussions
        .start_discussion(user.id, course_id, req)
        .await?))
}

pub async fn list_replies<S: LearnStore>(
    State(state): LearnState<S>,
    Path(discussion_id): Path<Uuid>,
) -> HandlerResult {
    Ok(ok(state.learn.discussions.list_replies(discussion_id).await?))
}

pub async fn post_reply<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path(discussion_id): Path<Uuid>,
    Json(req): Json<PostReplyRequest>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(created(state
        .learn
        .discussions
        .post_reply(discussion_id, user.id, req)
        .await?))
}

pub async fn mark_solution<S: LearnStore>(
    State(state): LearnState<S>,
    headers: HeaderMap,
    Path((discussion_id, reply_id)): Path<(Uuid, Uuid)>,
) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state
        .learn
        .discussions
        .mark_solution(&user, discussion_id, reply_id)
        .await?))
}

// ============================================================================
// CERTIFICATES
// ============================================================================

pub async fn my_certificates<S: LearnStore>(State(state): LearnState<S>, headers: HeaderMap) -> HandlerResult {
    let user = caller(&state, &headers).await?;
    Ok(ok(state.learn.certificates.list_for_user(user.id).await?))
}

pub async fn verify_certificate<S: LearnStore>(
    State(state): LearnState<S>,
    Path(number): Path<String>,
) -> HandlerResult {
    let certificate = state.learn.certificates.verify(&number).await?;
    Ok(ok(serde_json::json!({
        "valid": true,
        "certificate": certificate
    })))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure all Learn module routes
pub fn configure_learn_routes<S: LearnStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        // Users & badges
        .route("/api/learn/users", post(register_user::<S>))
        .route("/api/learn/users/me/profile", get(my_profile::<S>))
        .route("/api/learn/badges", post(create_badge::<S>))
        // Catalog
        .route(
            "/api/learn/categories",
            get(list_categories::<S>).post(create_category::<S>),
        )
        .route(
            "/api/learn/courses",
            get(list_courses::<S>).post(create_course::<S>),
        )
        .route("/api/learn/courses/featured", get(featured_courses::<S>))
        .route("/api/learn/courses/popular", get(popular_courses::<S>))
        .route(
            "/api/learn/courses/:id",
            get(get_course::<S>)
                .put(update_course::<S>)
                .delete(delete_course::<S>),
        )
        .route("/api/learn/courses/:id/submit", post(submit_course::<S>))
        .route("/api/learn/courses/:id/approve", post(approve_course::<S>))
        .route("/api/learn/courses/:id/reject", post(reject_course::<S>))
        .route("/api/learn/courses/:id/archive", post(archive_course::<S>))
        .route("/api/learn/courses/:id/feature", post(feature_course::<S>))
        .route("/api/learn/courses/:id/sections", post(add_section::<S>))
        .route("/api/learn/courses/:id/lessons", post(add_lesson::<S>))
        .route("/api/learn/lessons/:id", delete(delete_lesson::<S>))
        // Enrollment & progress
        .route("/api/learn/courses/:id/enroll", post(enroll::<S>))
        .route("/api/learn/courses/:id/cancel", post(cancel_enrollment::<S>))
        .route("/api/learn/courses/:id/progress", get(course_progress::<S>))
        .route(
            "/api/learn/lessons/:id/progress",
            post(record_lesson_progress::<S>),
        )
        .route("/api/learn/enrollments", get(my_enrollments::<S>))
        // Ratings
        .route(
            "/api/learn/courses/:id/ratings",
            get(recent_ratings::<S>).post(submit_rating::<S>),
        )
        .route("/api/learn/ratings/:id/publish", post(publish_rating::<S>))
        // Discussions
        .route(
            "/api/learn/courses/:id/discussions",
            get(list_discussions::<S>).post(start_discussion::<S>),
        )
        .route(
            "/api/learn/discussions/:id/replies",
            get(list_replies::<S>).post(post_reply::<S>),
        )
        .route(
            "/api/learn/discussions/:id/solution/:reply_id",
            post(mark_solution::<S>),
        )
        // Certificates
        .route("/api/learn/certificates", get(my_certificates::<S>))
        .route(
            "/api/learn/certificates/:number/verify",
            get(verify_certificate::<S>),
        )
        // Statistics
        .route("/api/learn/stats", get(platform_stats::<S>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_id_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_id(&headers).unwrap(), None);

        let id = Uuid::new_v4();
        headers.insert(USER_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(caller_id(&headers).unwrap(), Some(id));

        headers.insert(USER_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            caller_id(&headers).unwrap_err(),
            LearnError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_limit_query_is_clamped() {
        assert_eq!(LimitQuery::default().resolve(6), 6);
        assert_eq!(LimitQuery { limit: Some(0) }.resolve(6), 1);
        assert_eq!(LimitQuery { limit: Some(500) }.resolve(6), 50);
    }
}
