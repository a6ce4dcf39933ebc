use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocking text fetch used by adapters that enrich package details from a
/// public registry. Runs on the blocking pool together with the adapter.
pub trait DetailsFetcher: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, CoreError>;
}

pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("unipkg/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DetailsFetcher for UreqFetcher {
    fn get_text(&self, url: &str) -> Result<String, CoreError> {
        let response = self.agent.get(url).call().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Network,
                format!("request to {url} failed: {error}"),
            )
        })?;
        response.into_string().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Network,
                format!("reading response from {url} failed: {error}"),
            )
        })
    }
}

/// Fetcher for tests and offline use: every request fails.
pub struct OfflineFetcher;

impl DetailsFetcher for OfflineFetcher {
    fn get_text(&self, url: &str) -> Result<String, CoreError> {
        Err(CoreError::new(
            CoreErrorKind::Network,
            format!("network access disabled ({url})"),
        ))
    }
}

/// Lowercase, percent-encoded path segment for registry URLs.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' => {
                encoded.push(byte as char)
            }
            b'/' => encoded.push_str("%2F"),
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}
