//! # Relying Party Transport
//!
//! The two HTTP exchanges of every ceremony: a form-encoded option request and
//! a JSON result submission, both answered with JSON.
//!
//! Anything that stops us from getting a JSON answer (network failure, non-2xx,
//! unparseable body) is a [`TransportError`]. A well-formed answer that says
//! `status: "error"` is not a transport problem and is handled by the caller.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The relying party as the ceremony flow sees it
#[async_trait]
pub trait RelyingParty: Send + Sync {
    /// `POST path` with an `application/x-www-form-urlencoded` body
    async fn post_form<F>(&self, path: &str, form: &F) -> Result<Value, TransportError>
    where
        F: Serialize + Sync;

    /// `POST path` with a JSON body
    async fn post_json<B>(&self, path: &str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + Sync;
}

#[async_trait]
impl<T: RelyingParty> RelyingParty for Arc<T> {
    async fn post_form<F>(&self, path: &str, form: &F) -> Result<Value, TransportError>
    where
        F: Serialize + Sync,
    {
        self.as_ref().post_form(path, form).await
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + Sync,
    {
        self.as_ref().post_json(path, body).await
    }
}

/// [`RelyingParty`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpRelyingParty {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpRelyingParty {
    /// Each request gives up after `request_timeout`
    pub fn new(base_url: Url, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `path` is appended to the base URL, keeping any path prefix it has
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn read_json(path: &str, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(path, status = status.as_u16(), "relying party returned an error status");
            return Err(TransportError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| TransportError::Request {
                path: path.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(path, "relying party returned malformed JSON: {}", e);
            TransportError::MalformedJson {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn request_failed(path: &str, source: reqwest::Error) -> TransportError {
        tracing::warn!(path, "request to relying party failed: {}", source);
        TransportError::Request {
            path: path.to_string(),
            source,
        }
    }
}

#[async_trait]
impl RelyingParty for HttpRelyingParty {
    async fn post_form<F>(&self, path: &str, form: &F) -> Result<Value, TransportError>
    where
        F: Serialize + Sync,
    {
        let url = self.endpoint(path);
        tracing::debug!(%url, "requesting ceremony options");
        let response = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| Self::request_failed(path, e))?;
        Self::read_json(path, response).await
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + Sync,
    {
        let url = self.endpoint(path);
        tracing::debug!(%url, "submitting ceremony result");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::request_failed(path, e))?;
        Self::read_json(path, response).await
    }
}
