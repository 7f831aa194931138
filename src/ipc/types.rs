use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::cache::LruCache;
use crate::config::Config;
use crate::english::EnglishStatus;
use crate::error::SchoolError;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// English status per student id; cleared on every successful write.
    pub english_cache: LruCache<String, EnglishStatus>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let english_cache = LruCache::new(config.cache_capacity);
        Self {
            config,
            workspace: None,
            db: None,
            english_cache,
        }
    }

    pub fn conn(&self) -> Result<&Connection, SchoolError> {
        self.db.as_ref().ok_or(SchoolError::NoWorkspace)
    }

    pub fn today(&self) -> NaiveDate {
        self.config.today()
    }
}
