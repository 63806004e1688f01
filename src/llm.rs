//! LLM access and tip classification.

pub mod classifier;
pub mod manager;

pub use classifier::{LlmClassifier, TipClassifier};
pub use manager::LlmManager;
