//! Channel actions: connectivity, last-message probe, channel metadata and
//! tip collection.

use super::state::ApiState;
use crate::collector::{ChannelFailure, ChannelTarget};
use crate::error::Result;
use crate::messaging::{ChatDetails, HistoryMessage, MessagingSessionDyn};
use crate::tips::CollectedTip;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default per-channel limit for the `chat_ids` request form.
const DEFAULT_CHAT_IDS_LIMIT: usize = 10;
/// Default per-channel limit for the `channels` request form.
const DEFAULT_CHANNELS_LIMIT: usize = 100;

#[derive(Serialize)]
pub(super) struct Failure {
    success: bool,
    error: String,
}

fn failure(error: impl std::fmt::Display) -> serde_json::Value {
    serde_json::to_value(Failure {
        success: false,
        error: error.to_string(),
    })
    .unwrap_or_default()
}

fn success<T: Serialize>(body: T) -> serde_json::Value {
    serde_json::to_value(body).unwrap_or_else(failure)
}

#[derive(Debug, Deserialize)]
pub(super) struct ChannelRequest {
    #[serde(deserialize_with = "deserialize_chat_id")]
    chat_id: String,
}

#[derive(Serialize)]
struct ConnectionResponse {
    success: bool,
    username: Option<String>,
    user_id: i64,
}

#[derive(Serialize)]
struct LastMessageResponse {
    success: bool,
    chat_id: String,
    message_id: i64,
    text: Option<String>,
    media_type: Option<String>,
    date: String,
}

/// Read-only snapshot of a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub chat_id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub members: Option<i64>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub invite_link: Option<String>,
}

impl ChannelInfo {
    fn from_details(details: ChatDetails, photo_url: Option<String>) -> Self {
        Self {
            chat_id: details.id,
            title: details.title,
            username: details.username,
            kind: details.kind,
            members: details.members_count,
            description: details.description,
            photo_url,
            invite_link: details.invite_link,
        }
    }
}

#[derive(Serialize)]
struct ChannelInfoResponse {
    success: bool,
    info: ChannelInfo,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChannelEntry {
    #[serde(deserialize_with = "deserialize_chat_id")]
    chat_id: String,
    #[serde(default, deserialize_with = "deserialize_since")]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Both request shapes callers send to `/collect-tips`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum CollectTipsRequest {
    Channels {
        channels: Vec<ChannelEntry>,
        #[serde(default)]
        limit: Option<usize>,
    },
    ChatIds {
        chat_ids: Vec<ChatIdValue>,
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// A chat id given either as a string (`"@name"`, `"-100123"`) or a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ChatIdValue {
    Text(String),
    Number(i64),
}

impl ChatIdValue {
    fn into_string(self) -> String {
        match self {
            ChatIdValue::Text(text) => text,
            ChatIdValue::Number(number) => number.to_string(),
        }
    }
}

impl CollectTipsRequest {
    /// Resolve to per-channel targets with limits capped at `max_messages`.
    fn into_targets(self, max_messages: usize) -> Vec<ChannelTarget> {
        match self {
            CollectTipsRequest::Channels { channels, limit } => channels
                .into_iter()
                .map(|entry| ChannelTarget {
                    chat_id: entry.chat_id,
                    since: entry.since,
                    limit: entry
                        .limit
                        .or(limit)
                        .unwrap_or(DEFAULT_CHANNELS_LIMIT)
                        .min(max_messages),
                })
                .collect(),
            CollectTipsRequest::ChatIds { chat_ids, limit } => {
                let limit = limit.unwrap_or(DEFAULT_CHAT_IDS_LIMIT).min(max_messages);
                chat_ids
                    .into_iter()
                    .map(|chat_id| ChannelTarget {
                        chat_id: chat_id.into_string(),
                        since: None,
                        limit,
                    })
                    .collect()
            }
        }
    }
}

#[derive(Serialize)]
struct CollectTipsResponse {
    success: bool,
    tips: Vec<CollectedTip>,
    failed_channels: Vec<ChannelFailure>,
}

/// Check that the session is authorized and report who it belongs to.
pub(super) async fn test_connection(
    State(state): State<Arc<ApiState>>,
) -> Json<serde_json::Value> {
    let outcome: Result<_> = async {
        let session = state.connector.connect().await?;
        let me = session.get_me().await;
        session.disconnect().await;
        Ok(me?)
    }
    .await;

    Json(match outcome {
        Ok(me) => success(ConnectionResponse {
            success: true,
            username: me.username,
            user_id: me.user_id,
        }),
        Err(error) => {
            tracing::warn!(%error, "connection check failed");
            failure(error)
        }
    })
}

/// Fetch the newest message of a channel.
pub(super) async fn test_channel_message(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChannelRequest>,
) -> Json<serde_json::Value> {
    let outcome: Result<Option<HistoryMessage>> = async {
        let session = state.connector.connect().await?;
        let history = session.get_history(&request.chat_id, 0, 1).await;
        session.disconnect().await;
        Ok(history?.into_iter().next())
    }
    .await;

    Json(match outcome {
        Ok(Some(message)) => success(LastMessageResponse {
            success: true,
            chat_id: request.chat_id,
            message_id: message.id,
            text: message.content().map(str::to_string),
            media_type: message.media,
            date: message.date.to_rfc3339(),
        }),
        Ok(None) => failure("No messages found."),
        Err(error) => {
            tracing::warn!(%error, chat_id = %request.chat_id, "last message probe failed");
            failure(error)
        }
    })
}

/// Channel metadata, with the avatar uploaded to the media store.
pub(super) async fn channel_info(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChannelRequest>,
) -> Json<serde_json::Value> {
    let outcome: Result<ChannelInfo> = async {
        let session = state.connector.connect().await?;
        let info = load_channel_info(&state, session.as_ref(), &request.chat_id).await;
        session.disconnect().await;
        info
    }
    .await;

    Json(match outcome {
        Ok(info) => success(ChannelInfoResponse {
            success: true,
            info,
        }),
        Err(error) => {
            tracing::warn!(%error, chat_id = %request.chat_id, "channel info failed");
            failure(error)
        }
    })
}

async fn load_channel_info(
    state: &ApiState,
    session: &dyn MessagingSessionDyn,
    chat_id: &str,
) -> Result<ChannelInfo> {
    let details = session.get_chat(chat_id).await?;

    let mut photo_url = None;
    if details.has_photo {
        let scratch = tempfile::tempdir()?;
        match session.download_chat_photo(chat_id, scratch.path()).await {
            Ok(Some(path)) => {
                let identifier = format!("avatar_{}", details.id);
                photo_url = state.media_store.upload_image(&path, &identifier).await;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, chat_id, "failed to download channel photo");
            }
        }
    }

    Ok(ChannelInfo::from_details(details, photo_url))
}

/// Collect and classify recent messages across channels.
pub(super) async fn collect_tips(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CollectTipsRequest>,
) -> Json<serde_json::Value> {
    let targets = request.into_targets(state.limits.max_messages);
    if targets.is_empty() {
        return Json(success(CollectTipsResponse {
            success: true,
            tips: Vec::new(),
            failed_channels: Vec::new(),
        }));
    }

    let session = match state.connector.connect().await {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(%error, "failed to open messaging session");
            return Json(failure(error));
        }
    };
    let report = state.collector.collect(session.as_ref(), &targets).await;
    session.disconnect().await;

    tracing::info!(
        channels = targets.len(),
        tips = report.tips.len(),
        failed = report.failed_channels.len(),
        "tip collection finished"
    );

    Json(success(CollectTipsResponse {
        success: true,
        tips: report.tips,
        failed_channels: report.failed_channels,
    }))
}

fn deserialize_chat_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let chat_id = ChatIdValue::deserialize(deserializer)?.into_string();
    if chat_id.trim().is_empty() {
        return Err(de::Error::custom("chat_id must not be empty"));
    }
    Ok(chat_id)
}

/// Accept RFC 3339 timestamps, plain dates (midnight UTC) and unix seconds.
fn deserialize_since<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(number)) => number
            .as_i64()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {number}"))),
        Some(serde_json::Value::String(raw)) => {
            let raw = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Ok(Some(parsed.with_timezone(&Utc)));
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Some(naive.and_utc()))
                .ok_or_else(|| de::Error::custom(format!("invalid since: {raw}")))
        }
        Some(other) => Err(de::Error::custom(format!("invalid since: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;
    use crate::messaging::ChatDetails;
    use crate::testing::{
        FakeClassifier, FakeNetwork, FakeStore, at_minute, photo_message, text_message,
    };
    use std::sync::atomic::Ordering;

    fn state_with(network: FakeNetwork, store: FakeStore) -> (Arc<ApiState>, Arc<FakeNetwork>) {
        let (connector, network) = network.connector();
        let state = ApiState::new(
            "secret",
            Arc::new(connector),
            Arc::new(FakeClassifier::default()),
            Arc::new(store),
            CollectorConfig {
                batch_size: 3,
                max_messages: 5,
            },
        );
        (Arc::new(state), network)
    }

    fn channel_details(has_photo: bool) -> ChatDetails {
        ChatDetails {
            id: -100123,
            title: Some("Daily Tips".into()),
            username: Some("dailytips".into()),
            kind: "channel".into(),
            members_count: Some(1520),
            description: Some("Football tips".into()),
            invite_link: Some("https://t.me/+abc".into()),
            has_photo,
        }
    }

    #[tokio::test]
    async fn connection_reports_account() {
        let (state, network) = state_with(FakeNetwork::default(), FakeStore::reachable());
        let Json(body) = test_connection(State(state)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["username"], "scout");
        assert_eq!(body["user_id"], 7);
        assert_eq!(network.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_failure_is_reported_not_raised() {
        let network = FakeNetwork {
            connect_fails: true,
            ..Default::default()
        };
        let (state, _) = state_with(network, FakeStore::reachable());
        let Json(body) = test_connection(State(state)).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("AUTH_KEY_UNREGISTERED"));
    }

    #[tokio::test]
    async fn last_message_probe_returns_newest() {
        let network = FakeNetwork::default().with_chat(
            "@tips",
            vec![photo_message(9, 9), text_message(8, 8, "older")],
        );
        let (state, network) = state_with(network, FakeStore::reachable());

        let Json(body) = test_channel_message(
            State(state),
            Json(ChannelRequest {
                chat_id: "@tips".into(),
            }),
        )
        .await;

        assert_eq!(body["success"], true);
        assert_eq!(body["message_id"], 9);
        assert_eq!(body["text"], "slip");
        assert_eq!(body["media_type"], "photo");
        assert_eq!(body["date"], at_minute(9).to_rfc3339());
        assert_eq!(network.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn last_message_probe_on_empty_channel() {
        let network = FakeNetwork::default().with_chat("@quiet", vec![]);
        let (state, _) = state_with(network, FakeStore::reachable());
        let Json(body) = test_channel_message(
            State(state),
            Json(ChannelRequest {
                chat_id: "@quiet".into(),
            }),
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No messages found.");
    }

    #[tokio::test]
    async fn session_is_released_when_the_probe_fails() {
        let (state, network) = state_with(FakeNetwork::default(), FakeStore::reachable());
        let Json(body) = test_channel_message(
            State(state),
            Json(ChannelRequest {
                chat_id: "@missing".into(),
            }),
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!(network.connects.load(Ordering::SeqCst), 1);
        assert_eq!(network.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_info_is_stable_apart_from_photo_url() {
        let mut network = FakeNetwork::default();
        network.details.insert("@daily".into(), channel_details(true));
        let (state, _) = state_with(network, FakeStore::reachable());

        let request = || {
            Json(ChannelRequest {
                chat_id: "@daily".into(),
            })
        };
        let Json(first) = channel_info(State(state.clone()), request()).await;
        let Json(second) = channel_info(State(state), request()).await;

        assert_eq!(first["success"], true);
        assert_eq!(first["info"]["title"], "Daily Tips");
        assert_eq!(first["info"]["type"], "channel");
        assert_eq!(first["info"]["members"], 1520);
        assert!(first["info"]["photo_url"].as_str().unwrap().contains("avatar_-100123"));

        let mut first_info = first["info"].clone();
        let mut second_info = second["info"].clone();
        first_info["photo_url"] = serde_json::Value::Null;
        second_info["photo_url"] = serde_json::Value::Null;
        assert_eq!(first_info, second_info);
    }

    #[tokio::test]
    async fn channel_info_survives_failed_avatar_upload() {
        let mut network = FakeNetwork::default();
        network.details.insert("@daily".into(), channel_details(true));
        let (state, _) = state_with(network, FakeStore::unreachable());

        let Json(body) = channel_info(
            State(state),
            Json(ChannelRequest {
                chat_id: "@daily".into(),
            }),
        )
        .await;

        assert_eq!(body["success"], true);
        assert!(body["info"]["photo_url"].is_null());
    }

    #[tokio::test]
    async fn collect_tips_keeps_going_past_a_failing_channel() {
        let mut network = FakeNetwork::default()
            .with_chat(
                "@good",
                vec![
                    text_message(2, 2, "Barcelona -1.5 @1.85, stake 2u"),
                    text_message(1, 1, "gm"),
                ],
            )
            .with_chat("@bad", vec![text_message(5, 5, "Inter @2.10")]);
        network.failing.insert("@bad".into());
        let (state, network) = state_with(network, FakeStore::reachable());

        let request: CollectTipsRequest = serde_json::from_value(serde_json::json!({
            "chat_ids": ["@bad", "@good"],
            "limit": 10
        }))
        .unwrap();
        let Json(body) = collect_tips(State(state), Json(request)).await;

        assert_eq!(body["success"], true);
        let tips = body["tips"].as_array().unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0]["chat_id"], "@good");
        assert_eq!(tips[0]["is_tip"], true);
        assert_eq!(tips[0]["bets"][0]["odd"], 1.85);
        assert_eq!(body["failed_channels"][0]["chat_id"], "@bad");
        assert_eq!(network.connects.load(Ordering::SeqCst), 1);
        assert_eq!(network.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn collect_tips_respects_since_per_channel() {
        let network = FakeNetwork::default().with_chat(
            "@c",
            vec![
                text_message(3, 30, "A @1.5"),
                text_message(2, 20, "B @1.6"),
                text_message(1, 10, "C @1.7"),
            ],
        );
        let (state, _) = state_with(network, FakeStore::reachable());

        let request: CollectTipsRequest = serde_json::from_value(serde_json::json!({
            "channels": [{"chat_id": "@c", "since": at_minute(20).to_rfc3339()}]
        }))
        .unwrap();
        let Json(body) = collect_tips(State(state), Json(request)).await;

        let ids: Vec<i64> = body["tips"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tip| tip["message_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn empty_collection_does_not_connect() {
        let (state, network) = state_with(FakeNetwork::default(), FakeStore::reachable());
        let request: CollectTipsRequest =
            serde_json::from_value(serde_json::json!({"chat_ids": [], "limit": 5})).unwrap();
        let Json(body) = collect_tips(State(state), Json(request)).await;
        assert_eq!(body["success"], true);
        assert_eq!(network.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn request_forms_resolve_to_capped_targets() {
        let request: CollectTipsRequest = serde_json::from_value(serde_json::json!({
            "chat_ids": ["@a", -100555]
        }))
        .unwrap();
        let targets = request.into_targets(500);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].chat_id, "-100555");
        assert!(targets.iter().all(|target| target.limit == DEFAULT_CHAT_IDS_LIMIT));

        let request: CollectTipsRequest = serde_json::from_value(serde_json::json!({
            "channels": [
                {"chat_id": "@a", "since": "2026-01-01"},
                {"chat_id": "@b", "limit": 10000},
                {"chat_id": "@c", "since": 1767225600}
            ]
        }))
        .unwrap();
        let targets = request.into_targets(500);
        assert_eq!(targets[0].since, Some(at_minute(0)));
        assert_eq!(targets[0].limit, DEFAULT_CHANNELS_LIMIT);
        assert_eq!(targets[1].limit, 500);
        assert_eq!(targets[2].since, Some(at_minute(0)));
    }

    #[test]
    fn blank_chat_id_is_rejected() {
        let parse = |value| serde_json::from_value::<ChannelRequest>(value);
        assert!(parse(serde_json::json!({"chat_id": " "})).is_err());
        assert!(parse(serde_json::json!({"chat_id": 42})).is_ok());
    }
}
