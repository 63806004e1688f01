//! Telegram user-session access through an MTProto HTTP gateway.
//!
//! The gateway hosts the pre-authorized session and answers in Telegram's
//! JSON envelope: `{"ok": true, "result": ...}` on success and
//! `{"ok": false, "error_code": ..., "description": ..., "parameters": {"retry_after": ...}}`
//! on failure. Media downloads answer with the raw file bytes.

use crate::config::TelegramConfig;
use crate::error::{MessagingError, Result};
use crate::messaging::traits::{MessagingResult, MessagingSession, SessionConnector};
use crate::messaging::{AccountInfo, ChatDetails, HistoryMessage};

use anyhow::Context as _;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Connector that opens a gateway session per call to [`SessionConnector::connect`].
pub struct TelegramGateway {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .with_context(|| "failed to build messaging HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[derive(Deserialize)]
struct ConnectResult {
    session_id: String,
}

impl SessionConnector for TelegramGateway {
    type Session = TelegramSession;

    async fn connect(&self) -> MessagingResult<TelegramSession> {
        let base_url = self.config.gateway_url.trim_end_matches('/').to_string();
        let body = serde_json::json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "session_string": self.config.session_string,
        });

        let response = self
            .http_client
            .post(format!("{base_url}/connect"))
            .json(&body)
            .send()
            .await
            .map_err(|error| MessagingError::Connect(error.to_string()))?;

        let connected: ConnectResult = read_envelope(response).await.map_err(|error| match error {
            MessagingError::RateLimited { .. } => error,
            other => MessagingError::Connect(other.to_string()),
        })?;

        tracing::debug!(session_id = %connected.session_id, "messaging session connected");

        Ok(TelegramSession {
            http_client: self.http_client.clone(),
            session_url: format!("{base_url}/sessions/{}", connected.session_id),
        })
    }
}

/// A connected gateway session.
pub struct TelegramSession {
    http_client: reqwest::Client,
    session_url: String,
}

impl TelegramSession {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> MessagingResult<T> {
        let response = self.send(method, params).await?;
        read_envelope(response).await
    }

    async fn send(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> MessagingResult<reqwest::Response> {
        self.http_client
            .post(format!("{}/{method}", self.session_url))
            .json(&params)
            .send()
            .await
            .map_err(|error| MessagingError::Request(error.to_string()))
    }

    /// Fetch raw bytes. `Ok(None)` when the gateway reports nothing to download.
    async fn download(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> MessagingResult<Option<Vec<u8>>> {
        let response = self.send(method, params).await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|error| MessagingError::Request(error.to_string()))?;
            return Err(error_from_body(status.as_u16(), &body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| MessagingError::Request(error.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

impl MessagingSession for TelegramSession {
    async fn get_me(&self) -> MessagingResult<AccountInfo> {
        self.call("getMe", serde_json::json!({})).await
    }

    async fn get_history(
        &self,
        chat_id: &str,
        offset_id: i64,
        limit: usize,
    ) -> MessagingResult<Vec<HistoryMessage>> {
        self.call(
            "getChatHistory",
            serde_json::json!({
                "chat_id": chat_id,
                "offset_id": offset_id,
                "limit": limit,
            }),
        )
        .await
        .map_err(|error| with_chat(error, chat_id))
    }

    async fn get_chat(&self, chat_id: &str) -> MessagingResult<ChatDetails> {
        self.call("getChat", serde_json::json!({ "chat_id": chat_id }))
            .await
            .map_err(|error| with_chat(error, chat_id))
    }

    async fn download_media(
        &self,
        chat_id: &str,
        message_id: i64,
        dir: &Path,
    ) -> MessagingResult<PathBuf> {
        let bytes = self
            .download(
                "downloadMedia",
                serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?
            .ok_or_else(|| {
                MessagingError::Request(format!("message {message_id} has no downloadable media"))
            })?;

        let path = dir.join(format!("message_{message_id}"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| MessagingError::Request(format!("failed to store media: {error}")))?;
        Ok(path)
    }

    async fn download_chat_photo(
        &self,
        chat_id: &str,
        dir: &Path,
    ) -> MessagingResult<Option<PathBuf>> {
        let Some(bytes) = self
            .download("downloadChatPhoto", serde_json::json!({ "chat_id": chat_id }))
            .await?
        else {
            return Ok(None);
        };

        let path = dir.join("chat_photo");
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| MessagingError::Request(format!("failed to store photo: {error}")))?;
        Ok(Some(path))
    }

    async fn disconnect(&self) {
        match self.send("disconnect", serde_json::json!({})).await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("messaging session disconnected");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "gateway refused disconnect");
            }
            Err(error) => {
                tracing::warn!(%error, "failed to disconnect messaging session");
            }
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> MessagingResult<T> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|error| MessagingError::Request(format!("failed to read response: {error}")))?;
    parse_envelope(status, &body)
}

fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> MessagingResult<T> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|error| {
        if (200..300).contains(&status) {
            MessagingError::Request(format!("malformed gateway response: {error}"))
        } else {
            error_from_body(status, body)
        }
    })?;

    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| MessagingError::Request("gateway response has no result".into()));
    }

    let code = envelope.error_code.unwrap_or(status as i64);
    let description = envelope.description.unwrap_or_default();
    let retry_after = envelope.parameters.and_then(|parameters| parameters.retry_after);
    Err(classify_error(code, description, retry_after))
}

/// Map a non-envelope error body.
fn error_from_body(status: u16, body: &str) -> MessagingError {
    #[derive(Deserialize)]
    struct Partial {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parameters: Option<ResponseParameters>,
    }

    match serde_json::from_str::<Partial>(body) {
        Ok(partial) => classify_error(
            status as i64,
            partial.description.unwrap_or_default(),
            partial.parameters.and_then(|parameters| parameters.retry_after),
        ),
        Err(_) => classify_error(status as i64, body.trim().to_string(), None),
    }
}

fn classify_error(code: i64, description: String, retry_after: Option<u64>) -> MessagingError {
    let flood_wait = flood_wait_seconds(&description);
    if code == 429 || flood_wait.is_some() {
        return MessagingError::RateLimited {
            retry_after: retry_after.or(flood_wait).unwrap_or(1),
        };
    }

    let upper = description.to_ascii_uppercase();
    let not_found = [
        "CHAT_NOT_FOUND",
        "CHANNEL_INVALID",
        "USERNAME_NOT_OCCUPIED",
        "USERNAME_INVALID",
    ]
    .iter()
    .any(|marker| upper.contains(marker));
    if not_found {
        return MessagingError::ChatNotFound {
            chat_id: description,
        };
    }

    MessagingError::Api { code, description }
}

/// Attach the requested chat to a not-found error.
fn with_chat(error: MessagingError, chat_id: &str) -> MessagingError {
    match error {
        MessagingError::ChatNotFound { .. } => MessagingError::ChatNotFound {
            chat_id: chat_id.to_string(),
        },
        other => other,
    }
}

/// Seconds from an MTProto `FLOOD_WAIT_<n>` error, however it is embedded.
fn flood_wait_seconds(description: &str) -> Option<u64> {
    let start = description.find("FLOOD_WAIT_")? + "FLOOD_WAIT_".len();
    let digits: String = description[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
