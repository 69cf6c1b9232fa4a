//! ISAPI PTZ preset client.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use uuid::Uuid;

use crate::core::{CameraControl, VerifierError};
use crate::infra::camera::DigestChallenge;
use crate::util::PresetId;

/// Moves the camera with `PUT /ISAPI/PTZCtrl/channels/{channel}/presets/{preset}/goto`
/// using HTTP digest authentication.
#[derive(Debug)]
pub struct IsapiCamera {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    channel: u32,
    nonce_count: AtomicU32,
}

impl IsapiCamera {
    /// Create a client for the camera at `address` (`host[:port]` or a full base URL).
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::Config` if the HTTP client cannot be built.
    pub fn new(
        address: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VerifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Config(format!("http client: {e}")))?;
        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        Ok(Self {
            client,
            base_url,
            user: user.into(),
            password: password.into(),
            channel: 1,
            nonce_count: AtomicU32::new(0),
        })
    }

    /// Use a PTZ channel other than 1.
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    /// Request path for `preset`.
    pub fn preset_path(&self, preset: PresetId) -> String {
        format!("/ISAPI/PTZCtrl/channels/{}/presets/{preset}/goto", self.channel)
    }

    async fn put(
        &self,
        url: &str,
        authorization: Option<String>,
    ) -> Result<Response, VerifierError> {
        let mut request = self.client.put(url);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection refused"
            } else {
                "request error"
            };
            VerifierError::RepositionFailed(format!("{kind}: {e}"))
        })
    }
}

#[async_trait]
impl CameraControl for IsapiCamera {
    async fn move_to_preset(&self, preset: PresetId) -> Result<(), VerifierError> {
        let path = self.preset_path(preset);
        let url = format!("{}{path}", self.base_url);

        let mut response = self.put(&url, None).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(DigestChallenge::parse)
                .ok_or_else(|| {
                    VerifierError::RepositionFailed("401 without a digest challenge".into())
                })?;
            let nc = self.nonce_count.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            let cnonce = Uuid::new_v4().simple().to_string();
            let header = challenge.authorization(
                &self.user,
                &self.password,
                "PUT",
                &path,
                nc,
                &cnonce[..16],
            );
            response = self.put(&url, Some(header)).await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(preset, %status, "camera rejected credentials");
            return Err(VerifierError::RepositionFailed(format!(
                "authentication rejected ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifierError::RepositionFailed(format!("http {status}: {}", body.trim())));
        }
        tracing::debug!(preset, "camera moved to preset");
        Ok(())
    }
}
