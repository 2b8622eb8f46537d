use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use studio_types::api::{AuthResponse, ErrorBody, GenerationRecord, LoginRequest, SignupRequest};

use crate::controller::{GenerationRequest, GenerationTransport};
use crate::error::{AttemptError, ClientError};

const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request timeout, covering the server's simulated latency.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Reads `STUDIO_API_URL`, falling back to the local dev server.
    pub fn from_env() -> Self {
        let base_url = std::env::var("STUDIO_API_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());
        Self {
            base_url,
            ..Self::default()
        }
    }
}

/// Bearer credential passed explicitly into every authenticated call.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl From<&AuthResponse> for Session {
    fn from(auth: &AuthResponse) -> Self {
        Self::new(auth.token.clone())
    }
}

/// HTTP client for the studio API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StudioClient {
    http: Client,
    base_url: String,
}

impl StudioClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/signup"))
            .json(&SignupRequest {
                email: email.into(),
                password: password.into(),
            })
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.into(),
                password: password.into(),
            })
            .send()
            .await?;
        read_json(resp).await
    }

    /// The caller's `limit` most recent generations, newest first.
    pub async fn recent_generations(
        &self,
        session: &Session,
        limit: u32,
    ) -> Result<Vec<GenerationRecord>, ClientError> {
        let resp = self
            .http
            .get(self.url("/generations"))
            .bearer_auth(session.token())
            .query(&[("limit", limit)])
            .send()
            .await?;
        read_json(resp).await
    }
}

impl GenerationTransport for StudioClient {
    async fn create_generation(
        &self,
        session: &Session,
        request: &GenerationRequest,
    ) -> Result<GenerationRecord, AttemptError> {
        let image = Part::bytes(request.image.to_vec())
            .file_name(request.file_name.clone())
            .mime_str(request.mime.content_type())
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let form = Form::new()
            .part("image", image)
            .text("prompt", request.prompt.clone())
            .text("style", request.style.as_str());

        let resp = self
            .http
            .post(self.url("/generations"))
            .bearer_auth(session.token())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = resp.status();
        debug!("POST /generations -> {}", status);

        if status.is_success() {
            return resp
                .json::<GenerationRecord>()
                .await
                .map_err(|e| AttemptError::Transport(format!("invalid response body: {}", e)));
        }

        let body = resp.bytes().await.ok();
        let body = body.and_then(|b| serde_json::from_slice::<ErrorBody>(&b).ok());
        Err(AttemptError::rejected(status.as_u16(), body))
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let bytes = resp.bytes().await?;
    let message = serde_json::from_slice::<ErrorBody>(&bytes)
        .map(|b| b.error.to_message())
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
