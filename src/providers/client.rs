use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::utils::http::send_checked_json;

pub(crate) fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() || base.ends_with(&format!("/{endpoint}")) {
        base.to_string()
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Base URL, bearer credential and per-call deadline shared by the adapters.
#[derive(Clone)]
pub(crate) struct ProviderClient {
    pub(crate) http: reqwest::Client,
    label: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("label", &self.label)
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderClient {
    pub(crate) fn new(
        http: reqwest::Client,
        label: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key.into();
        Self {
            http,
            label: label.into(),
            base_url: base_url.into(),
            api_key: (!api_key.trim().is_empty()).then_some(api_key),
            timeout,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        join_endpoint(&self.base_url, path)
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = self.endpoint(path);
        tracing::debug!(provider = %self.label, url = %url, "sending upstream request");
        let req = self.http.post(url).timeout(self.timeout);
        match self.api_key.as_deref() {
            Some(api_key) => req.bearer_auth(api_key),
            None => req,
        }
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        send_checked_json(&self.label, self.post(path).json(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_endpoint_handles_slashes_and_duplicates() {
        assert_eq!(
            join_endpoint("https://api.svg.io/", "/v1/generate"),
            "https://api.svg.io/v1/generate"
        );
        assert_eq!(
            join_endpoint("https://api.openai.com/v1/chat/completions", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_endpoint("https://translate.local/v1/chat/completions", ""),
            "https://translate.local/v1/chat/completions"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = ProviderClient::new(
            reqwest::Client::new(),
            "svgio",
            "https://api.svg.io",
            "sk-secret",
            Duration::from_secs(1),
        );
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
