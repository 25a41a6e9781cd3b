//! reqwest client for the sorter REST API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::Backend;
use crate::config::SyncConfig;
use crate::error::BackendError;
use crate::model::{ConsultationRecord, FeedbackEvent, Keyword, Partition, Principal};

pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// `base_url` should be like `http://localhost:8000` (no trailing slash).
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, BackendError> {
        Self::with_timeouts(
            base_url,
            token,
            Duration::from_secs(4),
            Duration::from_secs(10),
        )
    }

    pub fn with_timeouts(
        base_url: &str,
        token: Option<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("opportunity-sync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self, BackendError> {
        Self::with_timeouts(
            &cfg.base_url,
            cfg.token.clone(),
            Duration::from_secs(cfg.connect_timeout_secs),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn check(resp: Response) -> Result<Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Server {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        debug!(target: "backend", url = %url, "GET");
        let resp = self.authed(self.client.get(&url)).send().await?;
        let resp = Self::check(resp).await?;
        // Read as text first so decode errors are reported as Json, not Http.
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

pub(crate) fn partition_path(partition: Partition) -> &'static str {
    match partition {
        Partition::Filtered => "/sorter/api/filtered_data/",
        Partition::Rejected => "/sorter/api/rejected_data/",
    }
}

const KEYWORDS_PATH: &str = "/sorter/api/keywords/";
const FEEDBACK_PATH: &str = "/sorter/api/feedback/";
const REFILTER_PATH: &str = "/sorter/api/refilter/";
const USER_PATH: &str = "/api/user/";

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn fetch_partition(
        &self,
        partition: Partition,
    ) -> Result<Vec<ConsultationRecord>, BackendError> {
        // Partition reads are public; no bearer header.
        let url = self.url(partition_path(partition));
        debug!(target: "backend", url = %url, "GET");
        let resp = Self::check(self.client.get(&url).send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn list_keywords(&self) -> Result<Vec<Keyword>, BackendError> {
        self.get_json(KEYWORDS_PATH).await
    }

    async fn add_keyword(&self, text: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "keyword_fr": text });
        let req = self.authed(self.client.post(self.url(KEYWORDS_PATH)).json(&body));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn delete_keyword(&self, id: i64) -> Result<(), BackendError> {
        let url = self.url(&format!("{KEYWORDS_PATH}{id}/"));
        Self::check(self.authed(self.client.delete(url)).send().await?).await?;
        Ok(())
    }

    async fn submit_feedback(&self, event: &FeedbackEvent) -> Result<(), BackendError> {
        let req = self.authed(self.client.post(self.url(FEEDBACK_PATH)).json(event));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn refilter(&self) -> Result<(), BackendError> {
        // 200 and 202 both mean the pass was accepted.
        let req = self.authed(self.client.post(self.url(REFILTER_PATH)));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn current_principal(&self) -> Result<Principal, BackendError> {
        self.get_json(USER_PATH).await
    }

    fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed_and_paths_join() {
        let b = HttpBackend::new("http://localhost:8000/", None).unwrap();
        assert_eq!(
            b.url(partition_path(Partition::Filtered)),
            "http://localhost:8000/sorter/api/filtered_data/"
        );
        assert_eq!(
            b.url(partition_path(Partition::Rejected)),
            "http://localhost:8000/sorter/api/rejected_data/"
        );
        assert!(!b.has_credentials());
    }

    #[test]
    fn blank_token_counts_as_no_credentials() {
        let b = HttpBackend::new("http://x", Some("   ".into())).unwrap();
        assert!(!b.has_credentials());
        let b = HttpBackend::new("http://x", Some("abc".into())).unwrap();
        assert!(b.has_credentials());
    }
}
