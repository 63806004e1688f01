//! Tip classification of message text and images through the LLM.

use crate::error::LlmError;
use crate::llm::LlmManager;
use crate::tips::Classification;

use base64::Engine as _;
use std::sync::Arc;

/// Fixed instruction sent with every classification request.
pub const TIP_EXTRACTION_PROMPT: &str = r#"You read posts from sports betting channels and decide whether a post is a betting tip.

A tip names at least one concrete selection with odds. Promotions, results, match reports, memes and general chat are not tips.

Answer with exactly one JSON object and nothing else.

If the post is not a tip:
{"is_tip": false}

If the post is a tip:
{
  "is_tip": true,
  "type": "single" | "multiple",
  "odd": <total decimal odd>,
  "bets": [
    {
      "match": "<home team> vs <away team>",
      "tournament": "<competition or null>",
      "kickoff": "<ISO-8601 kickoff time or null>",
      "market": "<market, e.g. 1X2, handicap, over/under>",
      "selection": "<the pick as written>",
      "odd": <decimal odd of this selection>
    }
  ]
}

A single has exactly one entry in "bets" and its odd equals the total odd. Convert fractional or American odds to decimal. Do not invent matches or odds that are not in the post."#;

/// Classifies message content into tips.
#[async_trait::async_trait]
pub trait TipClassifier: Send + Sync {
    /// Classify message text. Absent or blank text is a negative without a
    /// network call.
    async fn classify_text(&self, text: Option<&str>) -> Classification;

    /// Classify an image given as an `http(s)` URL or a local path.
    async fn classify_image(&self, source: Option<&str>) -> Classification;
}

/// [`TipClassifier`] backed by an OpenAI-compatible chat completion API.
pub struct LlmClassifier {
    llm_manager: Arc<LlmManager>,
}

impl LlmClassifier {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }

    async fn run(&self, user_content: serde_json::Value) -> Classification {
        let messages = vec![
            serde_json::json!({ "role": "system", "content": TIP_EXTRACTION_PROMPT }),
            serde_json::json!({ "role": "user", "content": user_content }),
        ];

        let outcome = match self.llm_manager.complete_json(messages).await {
            Ok(content) => parse_model_output(&content),
            Err(error) => Err(error),
        };

        outcome.unwrap_or_else(|error| {
            tracing::warn!(%error, "tip classification failed");
            Classification::failed(error)
        })
    }

    async fn load_image(&self, source: &str) -> Result<(Vec<u8>, String), LlmError> {
        let fetch_error = |reason: String| LlmError::ImageFetch {
            source_ref: source.to_string(),
            reason,
        };

        if source.starts_with("http://") || source.starts_with("https://") {
            let response = self
                .llm_manager
                .http_client()
                .get(source)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|error| fetch_error(error.to_string()))?;

            let mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .filter(|value| value.starts_with("image/"))
                .map(str::to_string)
                .unwrap_or_else(|| guess_image_mime(source));

            let bytes = response
                .bytes()
                .await
                .map_err(|error| fetch_error(error.to_string()))?;
            Ok((bytes.to_vec(), mime))
        } else {
            let bytes = tokio::fs::read(source)
                .await
                .map_err(|error| fetch_error(error.to_string()))?;
            Ok((bytes, guess_image_mime(source)))
        }
    }
}

#[async_trait::async_trait]
impl TipClassifier for LlmClassifier {
    async fn classify_text(&self, text: Option<&str>) -> Classification {
        let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
            return Classification::negative();
        };

        self.run(serde_json::Value::String(text.to_string())).await
    }

    async fn classify_image(&self, source: Option<&str>) -> Classification {
        let Some(source) = source.map(str::trim).filter(|source| !source.is_empty()) else {
            return Classification::negative();
        };

        let (bytes, mime) = match self.load_image(source).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::warn!(%error, "failed to load image for classification");
                return Classification::failed(error);
            }
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let content = serde_json::json!([
            { "type": "text", "text": "Classify the betting content of this image." },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{mime};base64,{encoded}") }
            }
        ]);

        self.run(content).await
    }
}

fn guess_image_mime(source: &str) -> String {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

/// Strip optional code fences around a JSON object.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse the model's answer into a classification.
pub fn parse_model_output(raw: &str) -> Result<Classification, LlmError> {
    let unfenced = strip_code_fences(raw);

    // Tolerate prose around the object.
    let candidate = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    };

    serde_json::from_str::<Classification>(candidate).map_err(|error| LlmError::Parse {
        reason: error.to_string(),
        raw: raw.to_string(),
    })
}
