//! Query envelope sent as call text.
//!
//! The wallet UI addresses backend endpoints REST-style: a method, an
//! endpoint path, and a JSON-encoded body (empty for `GET`).

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

/// One backend request, serialized as the `query` of a call frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    pub method: Method,
    pub endpoint: String,
    #[serde(default)]
    pub body: String,
}

impl Query {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            body: String::new(),
        }
    }

    /// Build a `POST` with `body` encoded as JSON text.
    pub fn post<B: Serialize + ?Sized>(endpoint: impl Into<String>, body: &B) -> Result<Self> {
        let body = serde_json::to_string(body)
            .map_err(|e| BridgeError::BadRequest(format!("query body encode failed: {e}")))?;
        Ok(Self {
            method: Method::Post,
            endpoint: endpoint.into(),
            body,
        })
    }

    /// Call text for this query.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| BridgeError::Internal(format!("query encode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_body_is_json_text() {
        let q = Query::post("account/btc-0/rates", &serde_json::json!({"fiat": "EUR"}));
        let text = q.and_then(|q| q.to_text()).unwrap_or_default();
        assert_eq!(
            text,
            r#"{"method":"POST","endpoint":"account/btc-0/rates","body":"{\"fiat\":\"EUR\"}"}"#
        );
    }

    #[test]
    fn get_has_empty_body() {
        let text = Query::get("version").to_text().unwrap_or_default();
        assert_eq!(text, r#"{"method":"GET","endpoint":"version","body":""}"#);
    }
}
