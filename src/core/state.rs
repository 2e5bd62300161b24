use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::ai_questions::AiQuestionService;
use crate::services::oauth::OAuthService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    ai: AiQuestionService,
    oauth: OAuthService,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        ai: AiQuestionService,
        oauth: OAuthService,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, ai, oauth }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn ai(&self) -> &AiQuestionService {
        &self.inner.ai
    }

    pub(crate) fn oauth(&self) -> &OAuthService {
        &self.inner.oauth
    }
}
