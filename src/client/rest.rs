//! REST implementation of [`Backend`].
//!
//! Reads go through reqwest-middleware with transient-failure retries.
//! Mutations use a client without the retry layer so a slow POST is never
//! submitted twice.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::{Backend, MutationReceipt, Payload};
use crate::config::Config;
use crate::errors::{BackofficeError, Result};
use crate::models::{EntityKind, Outcome, Record, RecordId};

pub struct RestBackend {
    base: Url,
    api_token: Option<String>,
    reads: ClientWithMiddleware,
    writes: ClientWithMiddleware,
}

impl RestBackend {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid API base URL {}: {}", base_url, e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("mineops/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let reads = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let writes = ClientBuilder::new(http).build();

        Ok(Self {
            base,
            api_token,
            reads,
            writes,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.api_url,
            cfg.api_token.clone(),
            Duration::from_secs(cfg.timeout_secs),
            cfg.max_retries,
        )
    }

    /// `{base}/{collection}` followed by percent-encoded segments.
    fn url(&self, kind: EntityKind, segments: &[&str]) -> Result<Url> {
        let mut path = kind.descriptor().path.to_string();
        for seg in segments {
            path.push('/');
            path.push_str(&urlencoding::encode(seg));
        }
        self.base
            .join(&path)
            .map_err(|e| anyhow::anyhow!("cannot build URL for {}: {}", path, e).into())
    }

    fn request(&self, method: Method, url: Url, request_id: &str) -> RequestBuilder {
        let client = if method == Method::GET {
            &self.reads
        } else {
            &self.writes
        };
        let mut req = client
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Request-Id", request_id);
        if let Some(token) = &self.api_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    /// Send one request. Every request carries a fresh X-Request-Id so a
    /// failure can be matched with the backend's logs.
    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(request_id = %request_id, method = %method, url = %url, "sending request");
        let req = self.request(method, url, &request_id);
        let req = match body {
            Some(b) => req
                .header("Content-Type", "application/json")
                .body(serde_json::to_vec(b)?),
            None => req,
        };

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(BackofficeError::NotFound(text));
        }
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            // business-rule rejections carry a message worth showing verbatim
            if let Some(msg) = rejection_message(&text) {
                return Err(BackofficeError::Mutation(msg));
            }
        }
        if !status.is_success() {
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                "backend returned an error status"
            );
            return Err(BackofficeError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn mutate(&self, method: Method, url: Url, body: Option<&Value>) -> Result<MutationReceipt> {
        let value = self.send(method, url, body).await?;
        Ok(MutationReceipt::from_body(&value))
    }
}

fn rejection_message(text: &str) -> Option<String> {
    let body: Value = serde_json::from_str(text).ok()?;
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Lists arrive either bare or wrapped as `{"data": [...]}`.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// A detail body is only an envelope when it has no id of its own and its
/// `data` is an object; otherwise `data` is an ordinary record field.
fn unwrap_detail(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if !map.contains_key("id")
                && !map.contains_key("_id")
                && map.get("data").map(Value::is_object).unwrap_or(false) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let url = self.url(kind, &[])?;
        tracing::debug!(kind = %kind, url = %url, "fetching list");
        let value = unwrap_data(self.send(Method::GET, url, None).await?);
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_detail(&self, kind: EntityKind, id: &RecordId) -> Result<Record> {
        let url = self.url(kind, &[id.as_str()])?;
        tracing::debug!(kind = %kind, id = %id, "fetching detail");
        let value = unwrap_detail(self.send(Method::GET, url, None).await?);
        if value.is_null() {
            return Err(BackofficeError::NotFound(id.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn create(&self, kind: EntityKind, payload: &Payload) -> Result<MutationReceipt> {
        let url = self.url(kind, &[])?;
        tracing::info!(kind = %kind, fields = payload.len(), "creating record");
        self.mutate(Method::POST, url, Some(&Value::Object(payload.clone())))
            .await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &RecordId,
        payload: &Payload,
    ) -> Result<MutationReceipt> {
        let url = self.url(kind, &[id.as_str()])?;
        tracing::info!(kind = %kind, id = %id, "updating record");
        self.mutate(Method::PUT, url, Some(&Value::Object(payload.clone())))
            .await
    }

    async fn transition_status(
        &self,
        kind: EntityKind,
        id: &RecordId,
        outcome: Outcome,
        reason: Option<&str>,
    ) -> Result<MutationReceipt> {
        let url = self.url(kind, &[id.as_str(), outcome.route_segment()])?;
        tracing::info!(kind = %kind, id = %id, outcome = %outcome, "submitting decision");
        let body = reason.map(|r| json!({ "reason": r }));
        self.mutate(Method::POST, url, body.as_ref()).await
    }

    async fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<MutationReceipt> {
        if !kind.descriptor().deletable {
            return Err(BackofficeError::Unsupported {
                kind,
                operation: "Delete",
            });
        }
        let url = self.url(kind, &[id.as_str()])?;
        tracing::info!(kind = %kind, id = %id, "deleting record");
        self.mutate(Method::DELETE, url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> RestBackend {
        RestBackend::new(base, None, Duration::from_secs(5), 0).unwrap()
    }

    #[test]
    fn test_url_keeps_base_path() {
        let b = backend("https://api.example.com/api/v1");
        let url = b.url(EntityKind::OreReceival, &["42", "push-back"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v1/ore-receivals/42/push-back");
    }

    #[test]
    fn test_url_encodes_ids() {
        let b = backend("http://localhost:8080/");
        let url = b.url(EntityKind::Vehicle, &["ABC 123/4"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/vehicles/ABC%20123%2F4");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(RestBackend::new("not a url", None, Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn test_unwrap_data() {
        assert_eq!(unwrap_data(serde_json::json!({"data": [1]})), serde_json::json!([1]));
        assert_eq!(unwrap_data(serde_json::json!([2])), serde_json::json!([2]));
    }

    #[test]
    fn test_unwrap_detail_keeps_data_field() {
        let own = serde_json::json!({"id": 5, "data": "notes"});
        assert_eq!(unwrap_detail(own.clone()), own);
        assert_eq!(
            unwrap_detail(serde_json::json!({"data": {"id": 5}})),
            serde_json::json!({"id": 5})
        );
        let scalar = serde_json::json!({"success": true, "data": "x"});
        assert_eq!(unwrap_detail(scalar.clone()), scalar);
    }
}
