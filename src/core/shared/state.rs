use crate::core::config::AppConfig;
use crate::learn::LearnPlatform;

/// Shared state handed to every HTTP handler.
pub struct AppState<S> {
    pub config: AppConfig,
    pub learn: LearnPlatform<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            learn: self.learn.clone(),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(config: AppConfig, learn: LearnPlatform<S>) -> Self {
        Self { config, learn }
    }
}
