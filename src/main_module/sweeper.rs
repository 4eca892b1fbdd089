use chrono::Utc;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::learn::enrollment::EnrollmentEngine;
use crate::learn::store::LearnStore;

/// Periodically moves active enrollments past `expires_at` to `expired`.
pub struct ExpirySweeper<S> {
    enrollments: EnrollmentEngine<S>,
    every: Duration,
}

impl<S: LearnStore> ExpirySweeper<S> {
    pub fn new(enrollments: EnrollmentEngine<S>, every: Duration) -> Self {
        Self { enrollments, every }
    }

    pub async fn sweep_once(&self) -> usize {
        match self.enrollments.expire_due(Utc::now()).await {
            Ok(0) => {
                debug!("No enrollments due for expiry");
                0
            }
            Ok(expired) => expired,
            Err(e) => {
                error!("Enrollment expiry sweep failed: {e}");
                0
            }
        }
    }

    /// Spawns the sweeper every `interval_secs`; `None` when the interval is 0.
    pub fn start(enrollments: EnrollmentEngine<S>, interval_secs: u64) -> Option<tokio::task::JoinHandle<()>> {
        if interval_secs == 0 {
            info!("Enrollment expiry sweeper disabled");
            return None;
        }
        Some(Arc::new(Self::new(enrollments, Duration::from_secs(interval_secs))).spawn())
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Enrollment expiry sweeper started, every {:?}", self.every);
            let mut tick = interval(self.every);
            loop {
                tick.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
