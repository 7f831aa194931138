use chrono::NaiveDate;
use std::path::PathBuf;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub cache_capacity: usize,
    pub today_override: Option<NaiveDate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: "info".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            today_override: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Bad values fall back
    /// to defaults; they are reported once logging is up (see `warnings`).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(ws) = lookup("SCHOOLD_WORKSPACE").filter(|s| !s.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws.trim()));
        }
        if let Some(filter) = lookup("SCHOOLD_LOG").or_else(|| lookup("RUST_LOG")) {
            if !filter.trim().is_empty() {
                cfg.log_filter = filter.trim().to_string();
            }
        }
        if let Some(cap) = lookup("SCHOOLD_CACHE_CAPACITY") {
            if let Ok(n) = cap.trim().parse::<usize>() {
                if n >= 1 {
                    cfg.cache_capacity = n;
                }
            }
        }
        if let Some(today) = lookup("SCHOOLD_TODAY") {
            cfg.today_override = NaiveDate::parse_from_str(today.trim(), "%Y-%m-%d").ok();
        }
        cfg
    }

    pub fn warnings<F>(lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Vec::new();
        if let Some(cap) = lookup("SCHOOLD_CACHE_CAPACITY") {
            if !matches!(cap.trim().parse::<usize>(), Ok(n) if n >= 1) {
                out.push(format!(
                    "SCHOOLD_CACHE_CAPACITY={:?} is not a positive integer; using {}",
                    cap, DEFAULT_CACHE_CAPACITY
                ));
            }
        }
        if let Some(today) = lookup("SCHOOLD_TODAY") {
            if NaiveDate::parse_from_str(today.trim(), "%Y-%m-%d").is_err() {
                out.push(format!("SCHOOLD_TODAY={:?} is not YYYY-MM-DD; ignoring", today));
            }
        }
        out
    }

    pub fn today(&self) -> NaiveDate {
        self.today_override
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}
