use crate::tips::{Classification, StrategySummary, summarize};

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(super) struct StrategyRequest {
    #[serde(default)]
    tips: Vec<Classification>,
}

#[derive(Serialize)]
pub(super) struct StrategyResponse {
    success: bool,
    result: StrategySummary,
}

/// Summarize a batch of previously collected tips. Entries that are not tips
/// are ignored.
pub(super) async fn strategy_summary(
    Json(request): Json<StrategyRequest>,
) -> Json<StrategyResponse> {
    let tips: Vec<_> = request
        .tips
        .into_iter()
        .filter_map(Classification::into_tip)
        .collect();

    tracing::info!(tips = tips.len(), "summarizing strategy");

    Json(StrategyResponse {
        success: true,
        result: summarize(&tips),
    })
}
