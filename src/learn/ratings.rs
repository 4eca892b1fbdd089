use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::progress::round2;
use super::roles::{require, Capability};
use super::store::LearnStore;
use super::types::*;

/// Mean of `ratings`, rounded to two decimals. Zero when there are none.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    round2(sum as f64 / ratings.len() as f64)
}

pub struct RatingAggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for RatingAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LearnStore> RatingAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn submit_rating(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        req: SubmitRatingRequest,
    ) -> Result<CourseRating, LearnError> {
        if !(1..=5).contains(&req.rating) {
            return Err(LearnError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        if self.store.get_course(course_id).await?.is_none() {
            return Err(LearnError::not_found("course", course_id));
        }

        let now = Utc::now();
        let rating = CourseRating {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            rating: req.rating,
            review: req.review.filter(|r| !r.trim().is_empty()),
            is_published: true,
            created_at: now,
            updated_at: now,
        };

        let rating = match self.store.insert_rating(rating).await {
            Ok(rating) => rating,
            Err(e) if e.is_unique_violation() => return Err(LearnError::DuplicateRating),
            Err(e) => return Err(e.into()),
        };

        let course = self.store.refresh_rating_aggregate(course_id, true).await?;
        info!(
            "Course {course_id} rated {} by {user_id}; average now {:.2}",
            rating.rating, course.average_rating
        );

        Ok(rating)
    }

    /// Moderation. Visibility changes move the average but never the count.
    pub async fn set_published(
        &self,
        actor: &User,
        rating_id: Uuid,
        published: bool,
    ) -> Result<CourseRating, LearnError> {
        require(actor, Capability::ApproveCourses)?;

        let existing = self
            .store
            .get_rating(rating_id)
            .await?
            .ok_or_else(|| LearnError::not_found("rating", rating_id))?;

        let rating = self
            .store
            .set_rating_published(rating_id, published, Utc::now())
            .await?;
        if existing.is_published != published {
            self.store
                .refresh_rating_aggregate(rating.course_id, false)
                .await?;
        }
        Ok(rating)
    }

    pub async fn recent_ratings(&self, course_id: Uuid, limit: i64) -> Result<Vec<CourseRating>, LearnError> {
        Ok(self.store.list_published_ratings(course_id, limit).await?)
    }
}
