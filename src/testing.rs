//! Shared test fixtures: throwaway upstream servers, sample images, and fake
//! collaborators for the messaging network, classifier and media store.

use crate::error::MessagingError;
use crate::llm::TipClassifier;
use crate::messaging::{
    AccountInfo, ChatDetails, HistoryMessage, MessagingResult, MessagingSession,
    SessionConnector,
};
use crate::storage::MediaStore;
use crate::tips::{Classification, ParsedTip, TipLeg};

use axum::Router;
use chrono::{DateTime, TimeZone as _, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let address = listener.local_addr().expect("missing local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{address}")
}

/// Base URL nothing listens on.
pub(crate) fn unreachable_url() -> String {
    "http://127.0.0.1:9".into()
}

/// Write a small RGBA PNG into `dir` and return its path.
pub(crate) fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let image = image::RgbaImage::from_fn(4, 3, |x, y| {
        image::Rgba([(x * 60) as u8, (y * 80) as u8, 10, 200])
    });
    image.save(&path).expect("failed to write png fixture");
    path
}

/// Fixed point in time; message `n` minutes after it.
pub(crate) fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

pub(crate) fn text_message(id: i64, minute: i64, text: &str) -> HistoryMessage {
    HistoryMessage {
        id,
        date: at_minute(minute),
        text: Some(text.to_string()),
        caption: None,
        media: None,
    }
}

pub(crate) fn photo_message(id: i64, minute: i64) -> HistoryMessage {
    HistoryMessage {
        id,
        date: at_minute(minute),
        text: None,
        caption: Some("slip".into()),
        media: Some("photo".into()),
    }
}

/// In-memory messaging network. Chat histories are stored newest first.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    pub chats: HashMap<String, Vec<HistoryMessage>>,
    pub details: HashMap<String, ChatDetails>,
    pub failing: HashSet<String>,
    pub connect_fails: bool,
    /// Upcoming history fetches that answer with a rate-limit error.
    pub rate_limited_fetches: AtomicUsize,
    /// `retry_after` seconds reported by rate-limited fetches.
    pub rate_limit_wait: u64,
    /// History fetches from this zero-based call index on fail with an API error.
    pub failing_from_fetch: Option<usize>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub requested_limits: std::sync::Mutex<Vec<usize>>,
}

impl FakeNetwork {
    pub fn with_chat(mut self, chat_id: &str, messages: Vec<HistoryMessage>) -> Self {
        self.chats.insert(chat_id.to_string(), messages);
        self
    }

    pub fn connector(self) -> (FakeConnector, Arc<FakeNetwork>) {
        let network = Arc::new(self);
        (
            FakeConnector {
                network: network.clone(),
            },
            network,
        )
    }

    pub fn session(self) -> (FakeSession, Arc<FakeNetwork>) {
        let network = Arc::new(self);
        (
            FakeSession {
                network: network.clone(),
            },
            network,
        )
    }
}

pub(crate) struct FakeConnector {
    network: Arc<FakeNetwork>,
}

impl SessionConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> MessagingResult<FakeSession> {
        if self.network.connect_fails {
            return Err(MessagingError::Connect("AUTH_KEY_UNREGISTERED".into()));
        }
        self.network.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            network: self.network.clone(),
        })
    }
}

pub(crate) struct FakeSession {
    network: Arc<FakeNetwork>,
}

impl MessagingSession for FakeSession {
    async fn get_me(&self) -> MessagingResult<AccountInfo> {
        Ok(AccountInfo {
            user_id: 7,
            username: Some("scout".into()),
        })
    }

    async fn get_history(
        &self,
        chat_id: &str,
        offset_id: i64,
        limit: usize,
    ) -> MessagingResult<Vec<HistoryMessage>> {
        let call = self.network.history_calls.fetch_add(1, Ordering::SeqCst);
        self.network.requested_limits.lock().unwrap().push(limit);

        let pending = self.network.rate_limited_fetches.load(Ordering::SeqCst);
        if pending > 0 {
            self.network
                .rate_limited_fetches
                .store(pending - 1, Ordering::SeqCst);
            return Err(MessagingError::RateLimited {
                retry_after: self.network.rate_limit_wait,
            });
        }

        let failing_now = self
            .network
            .failing_from_fetch
            .is_some_and(|from| call >= from);
        if failing_now || self.network.failing.contains(chat_id) {
            return Err(MessagingError::Api {
                code: 500,
                description: "INTERNAL".into(),
            });
        }

        let messages = self
            .network
            .chats
            .get(chat_id)
            .ok_or_else(|| MessagingError::ChatNotFound {
                chat_id: chat_id.to_string(),
            })?;

        Ok(messages
            .iter()
            .filter(|message| offset_id == 0 || message.id < offset_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_chat(&self, chat_id: &str) -> MessagingResult<ChatDetails> {
        self.network
            .details
            .get(chat_id)
            .cloned()
            .ok_or_else(|| MessagingError::ChatNotFound {
                chat_id: chat_id.to_string(),
            })
    }

    async fn download_media(
        &self,
        _chat_id: &str,
        message_id: i64,
        dir: &Path,
    ) -> MessagingResult<PathBuf> {
        Ok(write_png(dir, &format!("message_{message_id}.png")))
    }

    async fn download_chat_photo(
        &self,
        chat_id: &str,
        dir: &Path,
    ) -> MessagingResult<Option<PathBuf>> {
        let has_photo = self
            .network
            .details
            .get(chat_id)
            .is_some_and(|details| details.has_photo);
        Ok(has_photo.then(|| write_png(dir, "chat_photo.png")))
    }

    async fn disconnect(&self) {
        self.network.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Treats any text containing `@<odd>` as a single tip and every image as a
/// tip at 2.0.
#[derive(Default)]
pub(crate) struct FakeClassifier {
    pub calls: AtomicUsize,
}

impl FakeClassifier {
    fn tip(label: &str, odd: f64) -> Classification {
        let leg = TipLeg {
            match_label: label.to_string(),
            tournament: None,
            kickoff: None,
            market: "1x2".into(),
            selection: label.to_string(),
            odd,
        };
        Classification::Tip(ParsedTip::from_legs(Some(odd), vec![leg]).unwrap())
    }
}

#[async_trait::async_trait]
impl TipClassifier for FakeClassifier {
    async fn classify_text(&self, text: Option<&str>) -> Classification {
        let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
            return Classification::negative();
        };
        self.calls.fetch_add(1, Ordering::SeqCst);
        let odd = text
            .split_once('@')
            .and_then(|(_, rest)| rest.split([',', ' ']).next())
            .and_then(|raw| raw.parse::<f64>().ok());
        match odd {
            Some(odd) => Self::tip(text, odd),
            None => Classification::negative(),
        }
    }

    async fn classify_image(&self, source: Option<&str>) -> Classification {
        let Some(source) = source.filter(|source| !source.is_empty()) else {
            return Classification::negative();
        };
        self.calls.fetch_add(1, Ordering::SeqCst);
        Self::tip(source, 2.0)
    }
}

/// Media store that either hands out predictable URLs or always fails.
pub(crate) struct FakeStore {
    pub reachable: bool,
    pub uploads: AtomicUsize,
}

impl FakeStore {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            uploads: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            uploads: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl MediaStore for FakeStore {
    async fn upload_image(&self, path: &Path, identifier: &str) -> Option<String> {
        if !self.reachable || !path.exists() {
            return None;
        }
        let count = self.uploads.fetch_add(1, Ordering::SeqCst);
        Some(format!("https://store.test/media/{identifier}_{count}.jpg"))
    }
}
