use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::roles::{require, Capability};
use super::store::{LearnStore, BADGE_SLUG_UNIQUE};
use super::types::*;
use crate::core::shared::utils::slugify;

pub struct BadgeAwarder<S> {
    store: Arc<S>,
}

impl<S> Clone for BadgeAwarder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LearnStore> BadgeAwarder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_badge(&self, actor: &User, req: CreateBadgeRequest) -> Result<Badge, LearnError> {
        require(actor, Capability::ManageUsers)?;

        let name = req.name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(LearnError::Validation("badge name is required".to_string()));
        }
        if req.points_reward < 0 {
            return Err(LearnError::Validation(
                "points_reward must not be negative".to_string(),
            ));
        }

        let criteria = if req.criteria.is_null() {
            serde_json::json!({})
        } else {
            req.criteria
        };
        if !criteria.is_object() {
            return Err(LearnError::Validation("criteria must be an object".to_string()));
        }

        let badge = Badge {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug,
            description: req.description,
            icon: req.icon,
            color: req.color,
            badge_type: req.badge_type,
            criteria,
            points_reward: req.points_reward,
            is_active: true,
            created_at: Utc::now(),
        };
        if badge.badge_type == BadgeType::CourseCompletion && badge.courses_completed_threshold().is_none() {
            return Err(LearnError::Validation(
                "course completion badges need a courses_completed criterion of at least 1".to_string(),
            ));
        }

        match self.store.insert_badge(badge).await {
            Ok(badge) => Ok(badge),
            Err(e) if e.violates(BADGE_SLUG_UNIQUE) => Err(
                LearnError::Validation("a badge with this name already exists".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Awards every active course-completion badge the profile now qualifies
    /// for. Already-earned badges are skipped.
    pub async fn award_for_completion(
        &self,
        user_id: Uuid,
        profile: &UserProfile,
    ) -> Result<Vec<UserBadge>, LearnError> {
        let completed = i64::from(profile.total_courses_completed);
        let mut awarded = Vec::new();

        for badge in self.store.list_active_badges(BadgeType::CourseCompletion).await? {
            let Some(threshold) = badge.courses_completed_threshold() else {
                continue;
            };
            if completed < threshold {
                continue;
            }

            let now = Utc::now();
            let earned = UserBadge {
                id: Uuid::new_v4(),
                user_id,
                badge_id: badge.id,
                earned_at: now,
                reason: Some(format!("Completed {threshold} course(s)")),
            };
            match self.store.insert_user_badge(earned).await {
                Ok(earned) => {
                    if badge.points_reward > 0 {
                        if let Err(e) = self
                            .store
                            .add_profile_points(user_id, badge.points_reward, now)
                            .await
                        {
                            warn!("Failed to add badge points for {user_id}: {e}");
                        }
                    }
                    info!("User {user_id} earned badge {}", badge.slug);
                    awarded.push(earned);
                }
                Err(e) if e.is_unique_violation() => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(awarded)
    }

    pub async fn list_user_badges(&self, user_id: Uuid) -> Result<Vec<UserBadge>, LearnError> {
        Ok(self.store.list_user_badges(user_id).await?)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<ProfileSummary, LearnError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(LearnError::not_found("user", user_id));
        }
        let profile = self.store.ensure_profile(user_id, Utc::now()).await?;
        let badges = self.store.list_user_badges(user_id).await?;
        Ok(ProfileSummary { profile, badges })
    }
}
