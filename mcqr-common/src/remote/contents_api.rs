//! Hosted repository contents API client
//!
//! Speaks the GitHub-style contents endpoint:
//! - `GET {api}/repos/{owner}/{repo}/contents/{path}?ref={branch}` returns
//!   `{sha, content}` with base64 content
//! - `PUT` on the same URL with `{message, content, sha, branch}` commits only
//!   when `sha` still names the current blob
//!
//! Every request carries the bearer credential and a bounded timeout.

use super::{RemoteContent, RemoteRepository, VersionToken};
use crate::config::{Credential, RemoteConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Remote resource reached through a contents API
pub struct ContentsApiRemote {
    http_client: Client,
    url: String,
    branch: String,
    credential: Credential,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

/// Which half of the handshake a transport error interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetch,
    Put,
}

impl ContentsApiRemote {
    /// Build a client for `resource_path` of the configured repository
    pub fn new(config: &RemoteConfig, resource_path: &str, credential: Credential) -> Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("mcqr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))?;

        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            config.api_base.trim_end_matches('/'),
            config.owner,
            config.repo,
            resource_path.trim_start_matches('/')
        );

        Ok(Self {
            http_client,
            url,
            branch: config.branch.clone(),
            credential,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn decode_content(&self, body: ContentsResponse) -> Result<Vec<u8>> {
        // Large blobs come back without inline content
        if body.encoding.as_deref() == Some("none") || (body.content.is_empty() && body.download_url.is_some()) {
            if let Some(download_url) = body.download_url {
                let response = self
                    .http_client
                    .get(&download_url)
                    .bearer_auth(self.credential.expose())
                    .send()
                    .await
                    .map_err(|e| transport_error(e, Phase::Fetch, &download_url))?;
                if !response.status().is_success() {
                    return Err(status_error(response.status(), &download_url, String::new()));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| transport_error(e, Phase::Fetch, &download_url))?;
                return Ok(bytes.to_vec());
            }
        }

        let compact: String = body.content.split_whitespace().collect();
        STANDARD.decode(compact.as_bytes()).map_err(|e| Error::RemoteRejected {
            status: 200,
            message: format!("content is not valid base64: {}", e),
        })
    }
}

#[async_trait]
impl RemoteRepository for ContentsApiRemote {
    fn describe(&self) -> String {
        format!("{}@{}", self.url, self.branch)
    }

    async fn fetch(&self) -> Result<RemoteContent> {
        debug!("Fetching {}", self.describe());

        let response = self
            .http_client
            .get(&self.url)
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(self.credential.expose())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| transport_error(e, Phase::Fetch, &self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.url, body));
        }

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, Phase::Fetch, &self.url))?;
        let token = VersionToken::new(body.sha.clone());
        let bytes = self.decode_content(body).await?;

        Ok(RemoteContent { bytes, token })
    }

    async fn put_conditional(
        &self,
        bytes: Vec<u8>,
        expected: VersionToken,
        message: &str,
    ) -> Result<()> {
        let payload = json!({
            "message": message,
            "content": STANDARD.encode(&bytes),
            "sha": expected.into_inner(),
            "branch": self.branch,
        });

        let response = self
            .http_client
            .put(&self.url)
            .bearer_auth(self.credential.expose())
            .header("Accept", "application/vnd.github+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, Phase::Put, &self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = status_error(status, &self.url, body);
            if matches!(err, Error::VersionConflict(_)) {
                warn!("Conditional write to {} refused: {}", self.url, err);
            }
            return Err(err);
        }

        // The write is committed at this point; the body only reports the new sha
        match response.json::<PutResponse>().await {
            Ok(PutResponse { content: Some(content) }) => {
                debug!("{} now at {}", self.url, content.sha);
            }
            Ok(_) => debug!("{} accepted write", self.url),
            Err(e) => debug!("{} accepted write, unreadable body: {}", self.url, e),
        }
        Ok(())
    }
}

/// Map a failed request to the error taxonomy
///
/// During the write phase only a connect failure proves the request never
/// left; anything later may have reached the remote.
fn transport_error(err: reqwest::Error, phase: Phase, url: &str) -> Error {
    let detail = format!("{}: {}", url, err);
    match phase {
        Phase::Fetch if err.is_timeout() => Error::RemoteTimeout(detail),
        Phase::Fetch if err.is_decode() => Error::RemoteRejected {
            status: 200,
            message: detail,
        },
        Phase::Fetch => Error::RemoteUnreachable(detail),
        Phase::Put if err.is_connect() => Error::RemoteUnreachable(detail),
        Phase::Put => Error::PushUnconfirmed(detail),
    }
}

fn status_error(status: StatusCode, url: &str, body: String) -> Error {
    let detail = if body.is_empty() {
        format!("{} ({})", url, status)
    } else {
        format!("{} ({}): {}", url, status, body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::RemoteAuthFailure(detail),
        StatusCode::NOT_FOUND => Error::RemoteResourceMissing(detail),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Error::VersionConflict(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::RemoteTimeout(detail),
        other => Error::RemoteRejected {
            status: other.as_u16(),
            message: detail,
        },
    }
}
