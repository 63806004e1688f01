//! History collection: walk a channel's messages and keep the tips.
//!
//! History is walked newest first. A cursor holds the id of the oldest message
//! seen so far and asks for the next batch below it, so every fetch is anchored
//! to an explicit position rather than to iteration order.

use crate::error::{MessagingError, Result};
use crate::llm::TipClassifier;
use crate::messaging::{HistoryMessage, MessagingResult, MessagingSessionDyn};
use crate::storage::MediaStore;
use crate::tips::{Classification, CollectedTip, TipCandidate};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

/// One channel to collect from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTarget {
    pub chat_id: String,
    /// Messages older than this stop collection.
    pub since: Option<DateTime<Utc>>,
    /// Maximum messages inspected.
    pub limit: usize,
}

/// Lazy, finite sequence of a channel's messages, newest first.
pub struct HistoryCursor<'a> {
    session: &'a dyn MessagingSessionDyn,
    chat_id: &'a str,
    cutoff: Option<DateTime<Utc>>,
    batch_size: usize,
    remaining: usize,
    offset_id: i64,
    buffer: VecDeque<HistoryMessage>,
    finished: bool,
}

impl<'a> HistoryCursor<'a> {
    pub fn new(
        session: &'a dyn MessagingSessionDyn,
        chat_id: &'a str,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            session,
            chat_id,
            cutoff,
            batch_size: batch_size.max(1),
            remaining: limit,
            offset_id: 0,
            buffer: VecDeque::new(),
            finished: limit == 0,
        }
    }

    /// Next eligible message, or `None` once the limit, the cutoff, or the
    /// start of the history is reached.
    pub async fn next(&mut self) -> MessagingResult<Option<HistoryMessage>> {
        if self.finished {
            return Ok(None);
        }

        if self.buffer.is_empty() {
            let batch = self.fetch_batch().await?;
            if batch.is_empty() {
                self.finished = true;
                return Ok(None);
            }

            let oldest = batch.iter().map(|message| message.id).min().unwrap_or(0);
            // A gateway that ignores offset_id would otherwise loop forever.
            if self.offset_id != 0 && oldest >= self.offset_id {
                self.finished = true;
                return Ok(None);
            }
            self.offset_id = oldest;
            self.buffer.extend(batch);
        }

        let Some(message) = self.buffer.pop_front() else {
            self.finished = true;
            return Ok(None);
        };

        if self.cutoff.is_some_and(|cutoff| message.date < cutoff) {
            self.finished = true;
            self.buffer.clear();
            return Ok(None);
        }

        self.remaining -= 1;
        if self.remaining == 0 {
            self.finished = true;
        }
        Ok(Some(message))
    }

    /// One history fetch, retried once after a rate-limit wait.
    async fn fetch_batch(&self) -> MessagingResult<Vec<HistoryMessage>> {
        let limit = self.batch_size.min(self.remaining);
        tracing::debug!(
            chat_id = self.chat_id,
            offset_id = self.offset_id,
            limit,
            "fetching history batch"
        );

        match self
            .session
            .get_history(self.chat_id, self.offset_id, limit)
            .await
        {
            Err(MessagingError::RateLimited { retry_after }) => {
                tracing::warn!(
                    chat_id = self.chat_id,
                    retry_after,
                    "rate limited, waiting before retry"
                );
                tokio::time::sleep(std::time::Duration::from_secs(retry_after)).await;
                self.session
                    .get_history(self.chat_id, self.offset_id, limit)
                    .await
            }
            other => other,
        }
    }
}

/// Tips found in one channel.
#[derive(Debug, Default)]
pub struct ChannelReport {
    pub tips: Vec<CollectedTip>,
    /// Messages taken from the history and dispatched for classification.
    pub inspected: usize,
    /// History fetch that ended the walk early. Tips found before it are kept.
    pub error: Option<MessagingError>,
}

/// A channel whose collection aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFailure {
    pub chat_id: String,
    pub error: String,
}

/// Aggregated result of a multi-channel collection.
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub tips: Vec<CollectedTip>,
    pub failed_channels: Vec<ChannelFailure>,
}

/// Walks channel histories and classifies each message.
#[derive(Clone)]
pub struct HistoryCollector {
    classifier: Arc<dyn TipClassifier>,
    media_store: Arc<dyn MediaStore>,
    batch_size: usize,
}

impl HistoryCollector {
    pub fn new(
        classifier: Arc<dyn TipClassifier>,
        media_store: Arc<dyn MediaStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            classifier,
            media_store,
            batch_size,
        }
    }

    /// Collect from each target in order. A failing channel is recorded and
    /// the remaining channels still run.
    pub async fn collect(
        &self,
        session: &dyn MessagingSessionDyn,
        targets: &[ChannelTarget],
    ) -> CollectionReport {
        let mut report = CollectionReport::default();

        for target in targets {
            match self.collect_channel(session, target).await {
                Ok(channel) => {
                    tracing::info!(
                        chat_id = %target.chat_id,
                        inspected = channel.inspected,
                        tips = channel.tips.len(),
                        "channel collected"
                    );
                    report.tips.extend(channel.tips);
                    if let Some(error) = channel.error {
                        tracing::warn!(
                            %error,
                            chat_id = %target.chat_id,
                            "channel collection cut short"
                        );
                        report.failed_channels.push(ChannelFailure {
                            chat_id: target.chat_id.clone(),
                            error: error.to_string(),
                        });
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        chat_id = %target.chat_id,
                        "channel collection failed"
                    );
                    report.failed_channels.push(ChannelFailure {
                        chat_id: target.chat_id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Collect tips from one channel. A failed history fetch ends the walk and
    /// is returned in [`ChannelReport::error`] alongside the tips found so far.
    pub async fn collect_channel(
        &self,
        session: &dyn MessagingSessionDyn,
        target: &ChannelTarget,
    ) -> Result<ChannelReport> {
        let scratch = tempfile::tempdir()?;
        let mut cursor = HistoryCursor::new(
            session,
            &target.chat_id,
            target.since,
            target.limit,
            self.batch_size,
        );
        let mut report = ChannelReport::default();

        loop {
            let message = match cursor.next().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(error) => {
                    report.error = Some(error);
                    break;
                }
            };

            report.inspected += 1;
            if let Some(tip) = self
                .inspect(session, &target.chat_id, &message, scratch.path())
                .await
            {
                report.tips.push(tip);
            }
        }

        Ok(report)
    }

    /// Classify one message. `None` for negatives and per-message failures.
    async fn inspect(
        &self,
        session: &dyn MessagingSessionDyn,
        chat_id: &str,
        message: &HistoryMessage,
        scratch: &Path,
    ) -> Option<CollectedTip> {
        let mut candidate = TipCandidate {
            chat_id: chat_id.to_string(),
            message_id: message.id,
            text: message.content().map(str::to_string),
            image_url: None,
            date: message.date,
        };

        let classification = if message.has_photo() {
            let path = match session.download_media(chat_id, message.id, scratch).await {
                Ok(path) => path,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        chat_id,
                        message_id = message.id,
                        "failed to download photo"
                    );
                    return None;
                }
            };

            let identifier = format!("{}_{}", chat_id.trim_start_matches('@'), message.id);
            let uploaded = self.media_store.upload_image(&path, &identifier).await;
            if let Err(error) = tokio::fs::remove_file(&path).await {
                tracing::debug!(
                    %error,
                    path = %path.display(),
                    "failed to remove downloaded photo"
                );
            }

            let Some(url) = uploaded else {
                tracing::warn!(
                    chat_id,
                    message_id = message.id,
                    "skipping photo that failed to upload"
                );
                return None;
            };

            let classification = self.classifier.classify_image(Some(&url)).await;
            candidate.image_url = Some(url);
            classification
        } else {
            self.classifier.classify_text(message.content()).await
        };

        match classification {
            Classification::Tip(tip) => Some(CollectedTip { candidate, tip }),
            Classification::NotTip { error: Some(error) } => {
                tracing::warn!(%error, chat_id, message_id = message.id, "classification failed");
                None
            }
            Classification::NotTip { error: None } => None,
        }
    }
}
