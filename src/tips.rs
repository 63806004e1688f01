//! Tip schema and derived strategy summaries.

pub mod strategy;
pub mod types;

pub use strategy::{StrategySummary, summarize};
pub use types::{BetType, Classification, CollectedTip, ParsedTip, TipCandidate, TipLeg};
