use thiserror::Error;

/// Failure of a school operation. Every variant carries a stable wire code
/// (see [`SchoolError::code`]) that the IPC layer sends back to the caller.
#[derive(Debug, Error)]
pub enum SchoolError {
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    BadParams(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Conflict(String),
    /// A business rule refused the operation.
    #[error("{message}")]
    Rule { code: &'static str, message: String },
    #[error("cannot move activity from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SchoolError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn rule(code: &'static str, message: impl Into<String>) -> Self {
        Self::Rule {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWorkspace => "no_workspace",
            Self::BadParams(_) => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::Conflict(_) => "conflict",
            Self::Rule { code, .. } => code,
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Db(_) => "db_query_failed",
            Self::Json(_) => "bad_json",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchoolError>;
