//! Tipscout: collects betting tips from Telegram channels and classifies them
//! with a language model.

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod storage;
pub mod tips;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
