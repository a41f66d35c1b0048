use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::server::response::ApiError;

/// Query string accepted by list endpoints: `?ids=a,b&archived=true`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub ids: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl ListParams {
    #[must_use]
    pub fn ids(&self) -> Option<Vec<String>> {
        self.ids.as_ref().map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchivedParam {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub id: String,
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reads a batch delete body: an array of ids, or of objects carrying `id`.
pub fn ids_from_body(body: &Value) -> Result<Vec<String>, ApiError> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(id) => Ok(id.clone()),
            Value::Object(obj) => obj
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("each item must carry a string id")),
            _ => Err(ApiError::bad_request("expected an id or an object with an id")),
        })
        .collect()
}

/// Forces the path id onto a single-resource update body.
pub fn with_path_id(mut body: Value, id: &str) -> Result<Value, ApiError> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| ApiError::bad_request("update must be an object"))?;
    match obj.get("id") {
        Some(Value::String(existing)) if existing != id => {
            return Err(ApiError::bad_request(format!(
                "body id {existing} does not match path id {id}"
            )));
        }
        _ => {}
    }
    obj.insert("id".to_string(), Value::String(id.to_string()));
    Ok(body)
}
