use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::captcha::CaptchaEngine;
use crate::auth::session::SessionManager;
use crate::config::Config;
use crate::db::SqliteStore;
use crate::reactions::ReactionLedger;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: SessionManager,
    pub captcha: CaptchaEngine,
    pub reactions: ReactionLedger,
}

impl AppState {
    /// Wire the core components over a single SQLite store.
    pub fn new(db: DbPool, config: Config) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        let sessions = SessionManager::new(store.clone(), config.auth.session_ttl());
        let captcha = CaptchaEngine::new(config.captcha.ttl());
        let reactions = ReactionLedger::new(store);

        Self {
            db,
            config,
            sessions,
            captcha,
            reactions,
        }
    }
}
