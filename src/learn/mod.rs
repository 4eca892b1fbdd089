//! # Learn Module - Course marketplace
//!
//! Catalog, enrollment and learning-progress engine:
//! - Course catalog with review workflow and published listings
//! - Enrollment lifecycle (free and paid) with expiry
//! - Per-lesson progress tracking rolled up into enrollments
//! - Ratings, threaded discussions, certificates and badges
//!
//! ## Architecture
//!
//! Every service is generic over a [`store::LearnStore`]. The Postgres
//! store runs Diesel on the blocking pool; the in-memory store backs tests
//! and the `memory` storage backend. Handlers live in [`handlers`] and are
//! mounted by [`configure_learn_routes`].

pub mod badges;
pub mod catalog;
pub mod certificates;
pub mod discussions;
pub mod enrollment;
pub mod error;
pub mod handlers;
pub mod progress;
pub mod ratings;
pub mod roles;
pub mod store;
pub mod types;
pub mod users;

use std::sync::Arc;

use crate::core::config::AppConfig;

pub use error::LearnError;
pub use handlers::configure_learn_routes;

use badges::BadgeAwarder;
use catalog::Catalog;
use certificates::CertificateIssuer;
use discussions::DiscussionBoard;
use enrollment::{DeferredPaymentGateway, EnrollmentEngine, PaymentGateway};
use progress::ProgressTracker;
use ratings::RatingAggregator;
use store::LearnStore;
use users::UserDirectory;

/// All learning services wired to one store.
pub struct LearnPlatform<S> {
    store: Arc<S>,
    pub users: UserDirectory<S>,
    pub catalog: Catalog<S>,
    pub enrollments: EnrollmentEngine<S>,
    pub progress: ProgressTracker<S>,
    pub ratings: RatingAggregator<S>,
    pub discussions: DiscussionBoard<S>,
    pub certificates: CertificateIssuer<S>,
    pub badges: BadgeAwarder<S>,
}

impl<S> Clone for LearnPlatform<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            users: self.users.clone(),
            catalog: self.catalog.clone(),
            enrollments: self.enrollments.clone(),
            progress: self.progress.clone(),
            ratings: self.ratings.clone(),
            discussions: self.discussions.clone(),
            certificates: self.certificates.clone(),
            badges: self.badges.clone(),
        }
    }
}

impl<S: LearnStore> LearnPlatform<S> {
    pub fn new(store: Arc<S>, config: &AppConfig) -> Self {
        let learn = &config.learn;
        let certificates = CertificateIssuer::new(
            Arc::clone(&store),
            learn.certificate_prefix.clone(),
            config.server.base_url.clone(),
        );
        let badges = BadgeAwarder::new(Arc::clone(&store));

        Self {
            users: UserDirectory::new(Arc::clone(&store)),
            catalog: Catalog::new(Arc::clone(&store), learn.courses_per_page),
            enrollments: EnrollmentEngine::new(
                Arc::clone(&store),
                Arc::new(DeferredPaymentGateway),
                learn.enrollment_validity_days,
            ),
            progress: ProgressTracker::new(Arc::clone(&store), certificates.clone(), badges.clone()),
            ratings: RatingAggregator::new(Arc::clone(&store)),
            discussions: DiscussionBoard::new(Arc::clone(&store), learn.max_reply_depth),
            certificates,
            badges,
            store,
        }
    }

    /// Swaps the gateway used for paid enrollments.
    pub fn with_payment_gateway(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.enrollments = self.enrollments.with_payment_gateway(payments);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
