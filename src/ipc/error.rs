use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SchoolError;

/// `error` member of a failed response. `details` is omitted unless the
/// failure carries structured context (such as a rejected transition).
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let body = ErrorBody {
        code,
        message: message.into(),
        details,
    };
    json!({ "id": id, "ok": false, "error": body })
}

pub fn school_err(id: &str, e: &SchoolError) -> Value {
    err(id, e.code(), e.to_string(), e.details())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_carry_details() {
        let e = SchoolError::InvalidTransition {
            from: "pending_payment".into(),
            to: "approved".into(),
        };
        let v = school_err("7", &e);
        assert_eq!(v["id"], "7");
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "invalid_transition");
        assert_eq!(v["error"]["details"]["from"], "pending_payment");
    }

    #[test]
    fn plain_errors_omit_details() {
        let v = school_err("1", &SchoolError::NoWorkspace);
        assert_eq!(v["error"]["code"], "no_workspace");
        assert!(v["error"].get("details").is_none());
    }
}
