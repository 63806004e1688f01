//! Tip schema: what the classifier produces and the collector returns.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Whether a tip is a single selection or an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Single,
    Multiple,
}

impl BetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Single => "single",
            BetType::Multiple => "multiple",
        }
    }
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selection within a tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipLeg {
    #[serde(rename = "match", alias = "match_label", alias = "event", default)]
    pub match_label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<String>,

    /// Kickoff as reported by the model, ideally ISO-8601.
    #[serde(
        default,
        alias = "date",
        alias = "start_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub kickoff: Option<String>,

    #[serde(default)]
    pub market: String,

    #[serde(default, alias = "tip", alias = "pick")]
    pub selection: String,

    #[serde(default, deserialize_with = "deserialize_odd")]
    pub odd: f64,
}

impl TipLeg {
    /// Parse the kickoff as an ISO-8601 timestamp, if present and well formed.
    pub fn kickoff_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.kickoff.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// A positive classification.
///
/// Construction goes through [`ParsedTip::from_legs`], which keeps a single tip
/// at exactly one leg whose odd equals the aggregate odd.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTip {
    bet_type: BetType,
    odd: f64,
    bets: Vec<TipLeg>,
}

impl ParsedTip {
    /// Build a tip from its legs. Returns `None` when there are no legs.
    ///
    /// The bet type follows the leg count. For a single, the leg's odd wins
    /// over the declared aggregate; when the leg carries no odd it inherits the
    /// aggregate. For a multiple without a usable declared odd, the aggregate
    /// is the product of the leg odds.
    pub fn from_legs(declared_odd: Option<f64>, mut bets: Vec<TipLeg>) -> Option<Self> {
        let declared_odd = declared_odd.filter(|odd| odd.is_finite() && *odd > 0.0);

        match bets.len() {
            0 => None,
            1 => {
                let leg = &mut bets[0];
                if !leg.odd.is_finite() || leg.odd <= 0.0 {
                    leg.odd = declared_odd.unwrap_or(0.0);
                }
                let odd = leg.odd;
                Some(Self {
                    bet_type: BetType::Single,
                    odd,
                    bets,
                })
            }
            _ => {
                let odd = declared_odd.unwrap_or_else(|| {
                    bets.iter()
                        .filter(|leg| leg.odd.is_finite() && leg.odd > 0.0)
                        .map(|leg| leg.odd)
                        .product()
                });
                Some(Self {
                    bet_type: BetType::Multiple,
                    odd,
                    bets,
                })
            }
        }
    }

    pub fn bet_type(&self) -> BetType {
        self.bet_type
    }

    pub fn odd(&self) -> f64 {
        self.odd
    }

    pub fn legs(&self) -> &[TipLeg] {
        &self.bets
    }
}

impl Serialize for ParsedTip {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ParsedTip", 4)?;
        state.serialize_field("is_tip", &true)?;
        state.serialize_field("type", &self.bet_type)?;
        state.serialize_field("odd", &self.odd)?;
        state.serialize_field("bets", &self.bets)?;
        state.end()
    }
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Tip(ParsedTip),
    NotTip {
        /// Why classification failed, when it did. `None` for a clean negative.
        error: Option<String>,
    },
}

impl Classification {
    pub fn negative() -> Self {
        Classification::NotTip { error: None }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Classification::NotTip {
            error: Some(error.to_string()),
        }
    }

    pub fn is_tip(&self) -> bool {
        matches!(self, Classification::Tip(_))
    }

    pub fn into_tip(self) -> Option<ParsedTip> {
        match self {
            Classification::Tip(tip) => Some(tip),
            Classification::NotTip { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Classification::Tip(_) => None,
            Classification::NotTip { error } => error.as_deref(),
        }
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Classification::Tip(tip) => tip.serialize(serializer),
            Classification::NotTip { error } => {
                let fields = if error.is_some() { 2 } else { 1 };
                let mut state = serializer.serialize_struct("Classification", fields)?;
                state.serialize_field("is_tip", &false)?;
                if let Some(error) = error {
                    state.serialize_field("error", error)?;
                }
                state.end()
            }
        }
    }
}

/// Wire shape of a classification. `tip_entries` is an accepted alias for the
/// canonical `bets` key.
#[derive(Deserialize)]
struct ClassificationWire {
    #[serde(default)]
    is_tip: bool,
    #[serde(default, deserialize_with = "deserialize_optional_odd")]
    odd: Option<f64>,
    #[serde(default, alias = "tip_entries")]
    bets: Vec<TipLeg>,
    #[serde(default)]
    error: Option<String>,
}

impl<'de> Deserialize<'de> for Classification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ClassificationWire::deserialize(deserializer)?;
        if !wire.is_tip {
            return Ok(Classification::NotTip { error: wire.error });
        }
        Ok(match ParsedTip::from_legs(wire.odd, wire.bets) {
            Some(tip) => Classification::Tip(tip),
            None => Classification::failed("tip reported without any bets"),
        })
    }
}

/// The message a tip was extracted from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipCandidate {
    pub chat_id: String,
    pub message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub date: DateTime<Utc>,
}

/// A positive classification annotated with its source message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedTip {
    #[serde(flatten)]
    pub candidate: TipCandidate,
    #[serde(flatten)]
    pub tip: ParsedTip,
}

fn parse_odd(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(raw) => {
            let cleaned = raw.trim().trim_start_matches('@').replace(',', ".");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Finite odds only; "NaN" and "inf" count as absent.
fn odd_from_value(value: &serde_json::Value) -> Option<f64> {
    parse_odd(value).filter(|odd| odd.is_finite())
}

/// Odds come back as numbers, numeric strings, or "@1,85"-style strings.
fn deserialize_odd<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(0.0),
        other => match parse_odd(&other) {
            Some(odd) if odd.is_finite() => Ok(odd),
            // treated like a missing odd
            Some(_) => Ok(0.0),
            None => Err(de::Error::custom(format!("invalid odd: {other}"))),
        },
    }
}

fn deserialize_optional_odd<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(odd_from_value))
}
