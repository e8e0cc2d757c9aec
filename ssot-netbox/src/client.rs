use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use ssot_core::config::NetboxConfig;
use ssot_core::{EntityKind, ObjectId};
use ssot_sync::{FieldDiff, RemoteClient, RemoteError};

const USER_AGENT: &str = concat!("ssot/", env!("CARGO_PKG_VERSION"));

/// First retry delay; doubles on each further attempt up to `RETRY_MAX`.
const RETRY_BASE: Duration = Duration::from_millis(250);

const RETRY_MAX: Duration = Duration::from_secs(30);

/// Error bodies are cut to this many characters in reports.
const MAX_BODY: usize = 512;

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// NetBox REST client. Cheap to clone.
#[derive(Clone)]
pub struct NetboxClient {
    inner: Arc<Inner>,
}

struct Inner {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    max_retries: u32,
    page_size: u32,
}

impl NetboxClient {
    /// Build a client for `config`. Fails only when certificate checking is
    /// off and the TLS backend cannot be set up that way.
    pub fn new(config: &NetboxConfig) -> Result<Self, RemoteError> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT);
        if !config.validate_cert {
            tracing::warn!(url = %config.url, "TLS certificate validation is disabled");
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|err| RemoteError::Transport(format!("TLS setup failed: {err}")))?;
            builder = builder.tls_connector(Arc::new(connector));
        }
        let agent = builder.build();
        Ok(Self {
            inner: Arc::new(Inner {
                agent,
                base_url: config.url.trim_end_matches('/').to_string(),
                token: config.token.clone(),
                max_retries: config.max_retries,
                page_size: config.page_size.max(1),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&Inner) -> Result<T, RemoteError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&inner))
            .await
            .map_err(|err| RemoteError::Transport(format!("request task join error: {err}")))?
    }
}

impl Inner {
    fn collection(&self, kind: EntityKind) -> String {
        format!("{}{}", self.base_url, kind.descriptor().api_path)
    }

    fn detail(&self, kind: EntityKind, id: ObjectId) -> String {
        format!("{}{id}/", self.collection(kind))
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let request = self
            .agent
            .request(method, url)
            .set("Accept", "application/json");
        if self.token.is_empty() {
            request
        } else {
            request.set("Authorization", &format!("Token {}", self.token))
        }
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
        let mut url = format!("{}?limit={}", self.collection(kind), self.page_size);
        let mut objects = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.get_page(&url)?;
            pages += 1;
            objects.extend(page.results);
            match page.next {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }
        tracing::debug!(kind = %kind, pages, count = objects.len(), "list complete");
        Ok(objects)
    }

    /// GET with retries on transport errors, 429 and 5xx.
    fn get_page(&self, url: &str) -> Result<Page, RemoteError> {
        let mut attempt = 0u32;
        loop {
            match self.request("GET", url).call() {
                Ok(response) => {
                    return response
                        .into_json::<Page>()
                        .map_err(|err| RemoteError::Decode(err.to_string()));
                }
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    tracing::warn!(url, attempt, error = %err, "list request failed, retrying");
                    thread::sleep(delay);
                }
                Err(err) => return Err(into_remote(err)),
            }
        }
    }

    fn create(&self, kind: EntityKind, body: &Value) -> Result<Value, RemoteError> {
        let response = self
            .request("POST", &self.collection(kind))
            .send_json(body)
            .map_err(into_remote)?;
        response
            .into_json()
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }

    fn patch(&self, kind: EntityKind, id: ObjectId, diff: &FieldDiff) -> Result<Value, RemoteError> {
        let response = self
            .request("PATCH", &self.detail(kind, id))
            .send_json(diff)
            .map_err(|err| not_found_or(kind, id, err))?;
        response
            .into_json()
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }

    fn delete(&self, kind: EntityKind, id: ObjectId) -> Result<(), RemoteError> {
        self.request("DELETE", &self.detail(kind, id))
            .call()
            .map(|_| ())
            .map_err(|err| not_found_or(kind, id, err))
    }
}

#[async_trait]
impl RemoteClient for NetboxClient {
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
        self.blocking(move |inner| inner.list(kind)).await
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<Value, RemoteError> {
        let body = body.clone();
        self.blocking(move |inner| inner.create(kind, &body)).await
    }

    async fn patch(
        &self,
        kind: EntityKind,
        id: ObjectId,
        diff: &FieldDiff,
    ) -> Result<Value, RemoteError> {
        let diff = diff.clone();
        self.blocking(move |inner| inner.patch(kind, id, &diff)).await
    }

    async fn delete(&self, kind: EntityKind, id: ObjectId) -> Result<(), RemoteError> {
        self.blocking(move |inner| inner.delete(kind, id)).await
    }
}

fn is_transient(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(status, _) => *status == 429 || *status >= 500,
    }
}

fn into_remote(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, response) => {
            let mut body = response.into_string().unwrap_or_default();
            if body.len() > MAX_BODY {
                let cut = (0..=MAX_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            RemoteError::Status { status, body }
        }
        ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
    }
}

fn not_found_or(kind: EntityKind, id: ObjectId, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(404, _) => RemoteError::NotFound { kind, id },
        other => into_remote(other),
    }
}

/// Wait before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    RETRY_BASE
        .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .map_or(RETRY_MAX, |delay| delay.min(RETRY_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> NetboxConfig {
        NetboxConfig {
            url: url.to_string(),
            token: String::new(),
            timeout_secs: 5,
            max_retries: 0,
            page_size: 0,
            validate_cert: true,
        }
    }

    #[test]
    fn urls_join_without_double_slash() {
        let client = NetboxClient::new(&config("https://netbox.example.com/")).unwrap();
        assert_eq!(client.base_url(), "https://netbox.example.com");
        assert_eq!(
            client.inner.detail(EntityKind::Site, ObjectId(7)),
            "https://netbox.example.com/api/dcim/sites/7/"
        );
    }

    #[test]
    fn page_size_is_at_least_one() {
        let client = NetboxClient::new(&config("http://localhost")).unwrap();
        assert_eq!(client.inner.page_size, 1);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(4), Duration::from_secs(2));
        assert_eq!(backoff(20), RETRY_MAX);
        assert_eq!(backoff(u32::MAX), RETRY_MAX);
    }

    #[test]
    fn certificate_checking_can_be_disabled() {
        let mut insecure = config("https://netbox.local");
        insecure.validate_cert = false;
        let client = NetboxClient::new(&insecure).unwrap();
        assert_eq!(client.base_url(), "https://netbox.local");
    }
}
