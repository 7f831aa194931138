use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SchoolError};
use crate::ipc::error::{ok, school_err};
use crate::ipc::types::Request;

pub fn respond(req: &Request, result: Result<Value>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(id = %req.id, method = %req.method, code = e.code(), error = %e, "request failed");
            school_err(&req.id, &e)
        }
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| SchoolError::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| SchoolError::bad_params(format!("{} must be a number", key)))
}

pub fn optional_i64(params: &Value, key: &str) -> Result<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| SchoolError::bad_params(format!("{} must be an integer", key))),
    }
}

/// Deserializes the whole params object into a typed payload. Unknown keys
/// (such as the id of the record being patched) are ignored.
pub fn payload<T: DeserializeOwned>(params: &Value) -> Result<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| SchoolError::bad_params(e.to_string()))
}
