//! Messaging session traits and dynamic dispatch companions.

use crate::error::MessagingError;
use crate::messaging::{AccountInfo, ChatDetails, HistoryMessage};

use futures::future::BoxFuture;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Result type for messaging calls.
pub type MessagingResult<T> = std::result::Result<T, MessagingError>;

/// Opens sessions against the messaging network.
/// Use this for type-safe implementations.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: MessagingSession;

    /// Connect and authorize a fresh session.
    fn connect(&self) -> impl Future<Output = MessagingResult<Self::Session>> + Send;
}

/// One connected, authorized session. Every caller that connects must call
/// [`MessagingSession::disconnect`] on every exit path.
pub trait MessagingSession: Send + Sync + 'static {
    /// The account the session is authorized as.
    fn get_me(&self) -> impl Future<Output = MessagingResult<AccountInfo>> + Send;

    /// Up to `limit` messages older than `offset_id`, newest first.
    /// `offset_id == 0` starts at the newest message.
    fn get_history(
        &self,
        chat_id: &str,
        offset_id: i64,
        limit: usize,
    ) -> impl Future<Output = MessagingResult<Vec<HistoryMessage>>> + Send;

    /// Channel metadata.
    fn get_chat(&self, chat_id: &str)
    -> impl Future<Output = MessagingResult<ChatDetails>> + Send;

    /// Download a message's media into `dir`, returning the written file.
    fn download_media(
        &self,
        chat_id: &str,
        message_id: i64,
        dir: &Path,
    ) -> impl Future<Output = MessagingResult<PathBuf>> + Send;

    /// Download the chat's avatar into `dir`. `None` when the chat has none.
    fn download_chat_photo(
        &self,
        chat_id: &str,
        dir: &Path,
    ) -> impl Future<Output = MessagingResult<Option<PathBuf>>> + Send;

    /// Release the session. Failures are logged, not returned.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn SessionConnectorDyn>` in shared state.
pub trait SessionConnectorDyn: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, MessagingResult<Box<dyn MessagingSessionDyn>>>;
}

/// Dynamic companion of [`MessagingSession`].
pub trait MessagingSessionDyn: Send + Sync + 'static {
    fn get_me(&self) -> BoxFuture<'_, MessagingResult<AccountInfo>>;

    fn get_history<'a>(
        &'a self,
        chat_id: &'a str,
        offset_id: i64,
        limit: usize,
    ) -> BoxFuture<'a, MessagingResult<Vec<HistoryMessage>>>;

    fn get_chat<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, MessagingResult<ChatDetails>>;

    fn download_media<'a>(
        &'a self,
        chat_id: &'a str,
        message_id: i64,
        dir: &'a Path,
    ) -> BoxFuture<'a, MessagingResult<PathBuf>>;

    fn download_chat_photo<'a>(
        &'a self,
        chat_id: &'a str,
        dir: &'a Path,
    ) -> BoxFuture<'a, MessagingResult<Option<PathBuf>>>;

    fn disconnect(&self) -> BoxFuture<'_, ()>;
}

/// Blanket implementation: any type implementing SessionConnector automatically implements SessionConnectorDyn.
impl<T: SessionConnector> SessionConnectorDyn for T {
    fn connect(&self) -> BoxFuture<'_, MessagingResult<Box<dyn MessagingSessionDyn>>> {
        Box::pin(async move {
            let session = SessionConnector::connect(self).await?;
            Ok(Box::new(session) as Box<dyn MessagingSessionDyn>)
        })
    }
}

/// Blanket implementation: any type implementing MessagingSession automatically implements MessagingSessionDyn.
impl<T: MessagingSession> MessagingSessionDyn for T {
    fn get_me(&self) -> BoxFuture<'_, MessagingResult<AccountInfo>> {
        Box::pin(MessagingSession::get_me(self))
    }

    fn get_history<'a>(
        &'a self,
        chat_id: &'a str,
        offset_id: i64,
        limit: usize,
    ) -> BoxFuture<'a, MessagingResult<Vec<HistoryMessage>>> {
        Box::pin(MessagingSession::get_history(self, chat_id, offset_id, limit))
    }

    fn get_chat<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, MessagingResult<ChatDetails>> {
        Box::pin(MessagingSession::get_chat(self, chat_id))
    }

    fn download_media<'a>(
        &'a self,
        chat_id: &'a str,
        message_id: i64,
        dir: &'a Path,
    ) -> BoxFuture<'a, MessagingResult<PathBuf>> {
        Box::pin(MessagingSession::download_media(self, chat_id, message_id, dir))
    }

    fn download_chat_photo<'a>(
        &'a self,
        chat_id: &'a str,
        dir: &'a Path,
    ) -> BoxFuture<'a, MessagingResult<Option<PathBuf>>> {
        Box::pin(MessagingSession::download_chat_photo(self, chat_id, dir))
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(MessagingSession::disconnect(self))
    }
}
