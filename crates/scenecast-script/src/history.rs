//! Inference of historical variables from a project's context string.

use std::sync::LazyLock;

use regex::Regex;
use scenecast_models::HistoricalContext;

use crate::text::normalize;

static CENTURY_ES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsiglo\s+([ivxlc]+)\b").unwrap());
static CENTURY_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\s+century\b").unwrap());
static YEAR_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3,4})\s*[-–]\s*(\d{3,4})\b").unwrap());
static SINGLE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:año|year|en)\s+(\d{3,4})\b").unwrap());

const ERAS: &[(&str, &str)] = &[
    ("imperio romano", "Roman Empire"),
    ("roman empire", "Roman Empire"),
    ("renacimiento", "Renaissance"),
    ("renaissance", "Renaissance"),
    ("edad media", "Middle Ages"),
    ("medieval", "Middle Ages"),
    ("middle ages", "Middle Ages"),
    ("barroco", "Baroque period"),
    ("baroque", "Baroque period"),
    ("antiguedad", "Classical Antiquity"),
    ("antiquity", "Classical Antiquity"),
];

const LOCATIONS: &[(&str, &str)] = &[
    ("espana", "Spain"),
    ("spain", "Spain"),
    ("italia", "Italy"),
    ("italy", "Italy"),
    ("francia", "France"),
    ("france", "France"),
    ("roma", "Rome"),
    ("rome", "Rome"),
    ("armenia", "Armenia"),
    ("asia menor", "Asia Minor"),
    ("asia minor", "Asia Minor"),
    ("mediterraneo", "the Mediterranean"),
    ("mediterranean", "the Mediterranean"),
    ("egipto", "Egypt"),
    ("egypt", "Egypt"),
    ("grecia", "Greece"),
    ("greece", "Greece"),
    ("jerusalen", "Jerusalem"),
    ("jerusalem", "Jerusalem"),
];

const CULTURES: &[(&[&str], &str)] = &[
    (
        &[
            "santo", "santa", "san", "obispo", "iglesia", "cristiano", "cristianos", "martir",
            "saint", "bishop", "church", "christian",
        ],
        "religious life and devotional customs of the period",
    ),
    (
        &["guerra", "batalla", "ejercito", "soldado", "war", "battle", "army", "soldier"],
        "military life, armour and equipment of the period",
    ),
    (
        &["rey", "reina", "corte", "palacio", "king", "queen", "court", "palace"],
        "royal court life and aristocratic dress of the period",
    ),
];

fn roman_to_int(roman: &str) -> Option<u32> {
    let mut total = 0u32;
    let mut previous = 0u32;
    for c in roman.chars().rev() {
        let value = match c.to_ascii_uppercase() {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix} century")
}

/// Whole-phrase search in already-normalized text.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack
        .match_indices(phrase)
        .any(|(start, matched)| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + matched.len()..].chars().next();
            before.map_or(true, |c| c == ' ') && after.map_or(true, |c| c == ' ')
        })
}

/// Infer period, location and cultural context from free text.
///
/// Fields with no evidence stay `None` so explicit settings and named
/// variable sets can fill them.
pub fn infer_historical_context(context: &str) -> HistoricalContext {
    let normalized = normalize(context);

    let mut period_parts: Vec<String> = Vec::new();
    if let Some(caps) = CENTURY_ES.captures(context) {
        if let Some(n) = caps.get(1).and_then(|m| roman_to_int(m.as_str())) {
            period_parts.push(ordinal(n));
        }
    } else if let Some(caps) = CENTURY_EN.captures(context) {
        if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            period_parts.push(ordinal(n));
        }
    }
    if let Some(caps) = YEAR_RANGE.captures(context) {
        period_parts.push(format!("{}-{}", &caps[1], &caps[2]));
    } else if period_parts.is_empty() {
        if let Some(caps) = SINGLE_YEAR.captures(context) {
            period_parts.push(format!("around {} AD", &caps[1]));
        }
    }
    if let Some((_, era)) = ERAS.iter().find(|(k, _)| contains_phrase(&normalized, k)) {
        period_parts.push((*era).to_string());
    }

    let mut locations: Vec<&str> = Vec::new();
    for (keyword, name) in LOCATIONS {
        if contains_phrase(&normalized, keyword) && !locations.contains(name) {
            locations.push(name);
        }
    }
    locations.truncate(2);

    let cultural_context = CULTURES
        .iter()
        .find(|(words, _)| words.iter().any(|w| contains_phrase(&normalized, w)))
        .map(|(_, description)| description.to_string());

    HistoricalContext {
        period: (!period_parts.is_empty()).then(|| period_parts.join(", ")),
        location: (!locations.is_empty()).then(|| locations.join(", ")),
        cultural_context,
        theme: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roman_centuries() {
        assert_eq!(roman_to_int("IV"), Some(4));
        assert_eq!(roman_to_int("xvi"), Some(16));
        assert_eq!(roman_to_int("Q"), None);
        assert_eq!(ordinal(21), "21st century");
        assert_eq!(ordinal(12), "12th century");
    }

    #[test]
    fn test_infers_period_location_and_culture() {
        let ctx = infer_historical_context(
            "San Blas, obispo de Sebaste en Armenia, siglo IV, bajo el Imperio Romano",
        );
        assert_eq!(ctx.period.as_deref(), Some("4th century, Roman Empire"));
        assert_eq!(ctx.location.as_deref(), Some("Armenia"));
        assert!(ctx.cultural_context.unwrap().starts_with("religious life"));
    }

    #[test]
    fn test_year_range_and_two_locations() {
        let ctx =
            infer_historical_context("Teresa de Ávila (1515-1582), España e Italia, Renacimiento");
        assert_eq!(ctx.period.as_deref(), Some("1515-1582, Renaissance"));
        assert_eq!(ctx.location.as_deref(), Some("Spain, Italy"));
    }

    #[test]
    fn test_no_evidence_leaves_fields_empty() {
        let ctx = infer_historical_context("Una historia sobre la amistad");
        assert_eq!(ctx, HistoricalContext::default());
    }

    #[test]
    fn test_roma_does_not_match_inside_words() {
        let ctx = infer_historical_context("aroma de romero");
        assert!(ctx.location.is_none());
    }
}
