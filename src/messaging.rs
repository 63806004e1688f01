//! Messaging network access (Telegram via an MTProto gateway).

pub mod telegram;
pub mod traits;

pub use telegram::TelegramGateway;
pub use traits::{
    MessagingResult, MessagingSession, MessagingSessionDyn, SessionConnector, SessionConnectorDyn,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message from a chat's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Media kind label (`photo`, `video`, `document`, ...).
    #[serde(default)]
    pub media: Option<String>,
}

impl HistoryMessage {
    /// Message text, falling back to the media caption.
    pub fn content(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|text| !text.is_empty())
            .or(self.caption.as_deref())
    }

    pub fn has_photo(&self) -> bool {
        self.media.as_deref() == Some("photo")
    }
}

/// The account a session is authorized as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "id")]
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Chat metadata as reported by the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDetails {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub members_count: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invite_link: Option<String>,
    #[serde(default)]
    pub has_photo: bool,
}
