//! Strategy summaries derived from a tipster's past tips.

use super::types::{BetType, ParsedTip};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Below this odd a tip counts as low-odds.
const LOW_ODD_CEILING: f64 = 1.5;
/// At or above this odd a tip counts as high-odds.
const HIGH_ODD_FLOOR: f64 = 2.5;

/// Natural-language plus tag-based description of a betting pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub description: String,
    pub tags: BTreeMap<String, BTreeSet<String>>,
}

/// Summarize a set of parsed tips. Deterministic for a given input order.
pub fn summarize<'a>(tips: impl IntoIterator<Item = &'a ParsedTip>) -> StrategySummary {
    let tips: Vec<&ParsedTip> = tips.into_iter().collect();
    if tips.is_empty() {
        return StrategySummary {
            description: "No tips to summarize.".into(),
            tags: BTreeMap::new(),
        };
    }

    let mut tags: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut market_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut tournament_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut singles = 0usize;
    let mut odd_total = 0.0;

    for tip in &tips {
        if tip.bet_type() == BetType::Single {
            singles += 1;
        }
        odd_total += tip.odd();

        insert_tag(&mut tags, "bet_types", tip.bet_type().as_str());
        insert_tag(&mut tags, "odds_profile", odds_bucket(tip.odd()));

        for leg in tip.legs() {
            if let Some(market) = normalize_tag(&leg.market) {
                *market_counts.entry(market.clone()).or_default() += 1;
                insert_tag(&mut tags, "markets", &market);
            }
            if let Some(tournament) = leg.tournament.as_deref().and_then(normalize_tag) {
                *tournament_counts.entry(tournament.clone()).or_default() += 1;
                insert_tag(&mut tags, "tournaments", &tournament);
            }
        }
    }

    let count = tips.len();
    let singles_share = singles as f64 / count as f64;
    insert_tag(&mut tags, "volume", volume_label(singles_share));

    let singles_pct = (singles_share * 100.0).round() as u32;
    let average_odd = odd_total / count as f64;

    let mut description = format!(
        "{count} tip{} analysed: {singles_pct}% singles, {}% multiples, average odd {average_odd:.2}.",
        if count == 1 { "" } else { "s" },
        100 - singles_pct,
    );
    if let Some(market) = most_frequent(&market_counts) {
        description.push_str(&format!(" Most frequent market: {market}."));
    }
    if let Some(tournament) = most_frequent(&tournament_counts) {
        description.push_str(&format!(" Most frequent tournament: {tournament}."));
    }

    StrategySummary { description, tags }
}

fn insert_tag(tags: &mut BTreeMap<String, BTreeSet<String>>, group: &str, tag: &str) {
    tags.entry(group.to_string())
        .or_default()
        .insert(tag.to_string());
}

fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn odds_bucket(odd: f64) -> &'static str {
    if odd < LOW_ODD_CEILING {
        "low"
    } else if odd < HIGH_ODD_FLOOR {
        "medium"
    } else {
        "high"
    }
}

fn volume_label(singles_share: f64) -> &'static str {
    if singles_share >= 0.7 {
        "single-focused"
    } else if singles_share <= 0.3 {
        "multiple-focused"
    } else {
        "mixed"
    }
}

/// Highest count wins; ties go to the alphabetically first key.
fn most_frequent(counts: &BTreeMap<String, usize>) -> Option<&str> {
    let mut best: Option<(&str, usize)> = None;
    for (key, count) in counts {
        match best {
            Some((_, best_count)) if *count <= best_count => {}
            _ => best = Some((key.as_str(), *count)),
        }
    }
    best.map(|(key, _)| key)
}
