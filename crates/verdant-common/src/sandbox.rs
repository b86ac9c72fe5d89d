use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::VerdantError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP client that only talks to approved hosts and gives up after a
/// fixed timeout. Every outbound call the pipeline makes goes through one.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Client with the default allowlist and a 30 second timeout.
    pub fn new() -> Result<Self, VerdantError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, VerdantError> {
        Self::build(timeout, None)
    }

    /// Same as [`with_timeout`](Self::with_timeout) but sends `user_agent`
    /// on every request (CrossRef's polite pool keys on it).
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, VerdantError> {
        Self::build(timeout, Some(user_agent))
    }

    fn build(timeout: Duration, user_agent: Option<&str>) -> Result<Self, VerdantError> {
        let allowlist = [
            "api.crossref.org",    // bibliographic search
            "api.anthropic.com",   // Anthropic Messages
            "api.openai.com",      // OpenAI
            "openrouter.ai",       // OpenAI-compatible gateway
            "localhost",           // local model servers
            "127.0.0.1",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut builder = ClientBuilder::new().timeout(timeout);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        let client = builder
            .build()
            .map_err(|e| VerdantError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, allowlist })
    }

    /// Allows the host of `url`, if it has one. Used when a base URL comes
    /// from configuration.
    pub fn allow_url_host(&mut self, url: &str) {
        if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(String::from)) {
            self.allowlist.insert(host);
        }
    }

    /// Validates if a URL is permitted under the current policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, VerdantError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, VerdantError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<(), VerdantError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(VerdantError::Security(format!("domain not in allowlist for URL {url}")))
        }
    }
}
