//! Character dossier: canonical per-life-stage descriptions of the subject.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Mutually exclusive age bands covering every age.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    /// 0-12 years
    Childhood,
    /// 13-25 years
    Youth,
    /// 26-50 years
    Adulthood,
    /// older than 50
    Elder,
}

impl LifeStage {
    pub const ALL: [LifeStage; 4] = [
        LifeStage::Childhood,
        LifeStage::Youth,
        LifeStage::Adulthood,
        LifeStage::Elder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifeStage::Childhood => "childhood",
            LifeStage::Youth => "youth",
            LifeStage::Adulthood => "adulthood",
            LifeStage::Elder => "elder",
        }
    }

    /// Upper-case section header used in dossier responses.
    pub fn label(&self) -> &'static str {
        match self {
            LifeStage::Childhood => "CHILDHOOD",
            LifeStage::Youth => "YOUTH",
            LifeStage::Adulthood => "ADULTHOOD",
            LifeStage::Elder => "ELDER",
        }
    }

    /// Inclusive age range; `None` upper bound means open-ended.
    pub fn age_range(&self) -> (u32, Option<u32>) {
        match self {
            LifeStage::Childhood => (0, Some(12)),
            LifeStage::Youth => (13, Some(25)),
            LifeStage::Adulthood => (26, Some(50)),
            LifeStage::Elder => (51, None),
        }
    }

    pub fn for_age(age: u32) -> Self {
        match age {
            0..=12 => LifeStage::Childhood,
            13..=25 => LifeStage::Youth,
            26..=50 => LifeStage::Adulthood,
            _ => LifeStage::Elder,
        }
    }

    /// Generic description used when a section could not be generated.
    pub fn placeholder_text(&self) -> &'static str {
        match self {
            LifeStage::Childhood => {
                "The principal subject as a child of about eight years old, small build, \
                 simple period-appropriate clothing, curious expression."
            }
            LifeStage::Youth => {
                "The principal subject as a young person of about twenty, slender build, \
                 period-appropriate attire, earnest and determined expression."
            }
            LifeStage::Adulthood => {
                "The principal subject as an adult of about forty, mature features, \
                 period-appropriate attire reflecting their role, composed and serious expression."
            }
            LifeStage::Elder => {
                "The principal subject in old age, around seventy, grey hair, lined face, \
                 period-appropriate attire, calm and wise expression."
            }
        }
    }
}

impl std::fmt::Display for LifeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage's description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DossierSection {
    pub text: String,
    /// True when the text is a generic placeholder rather than generated
    #[serde(default)]
    pub placeholder: bool,
}

/// Canonical multi-life-stage description of the principal subject.
///
/// Always holds exactly one section per [`LifeStage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CharacterDossier {
    pub sections: BTreeMap<LifeStage, DossierSection>,
    /// True when the builder gave up and fell back to placeholders
    #[serde(default)]
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl CharacterDossier {
    /// Build from parsed sections, filling any missing stage with its placeholder.
    pub fn from_sections(mut parsed: BTreeMap<LifeStage, String>) -> Self {
        let sections = LifeStage::ALL
            .iter()
            .map(|stage| {
                let section = match parsed.remove(stage) {
                    Some(text) if !text.trim().is_empty() => DossierSection {
                        text: text.trim().to_string(),
                        placeholder: false,
                    },
                    _ => DossierSection {
                        text: stage.placeholder_text().to_string(),
                        placeholder: true,
                    },
                };
                (*stage, section)
            })
            .collect();

        Self {
            sections,
            degraded: false,
            created_at: Utc::now(),
        }
    }

    /// All-placeholder dossier used in degraded mode.
    pub fn placeholder() -> Self {
        let mut dossier = Self::from_sections(BTreeMap::new());
        dossier.degraded = true;
        dossier
    }

    /// Text for the given stage.
    pub fn excerpt(&self, stage: LifeStage) -> &str {
        self.sections
            .get(&stage)
            .map(|s| s.text.as_str())
            .unwrap_or_else(|| stage.placeholder_text())
    }

    pub fn is_placeholder(&self, stage: LifeStage) -> bool {
        self.sections.get(&stage).map_or(true, |s| s.placeholder)
    }

    /// Usable when at least the adulthood section was generated.
    pub fn is_usable(&self) -> bool {
        !self.is_placeholder(LifeStage::Adulthood)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_life_stage_ranges_are_exhaustive_and_exclusive() {
        for age in 0..120 {
            let matching: Vec<_> = LifeStage::ALL
                .iter()
                .filter(|s| {
                    let (lo, hi) = s.age_range();
                    age >= lo && hi.map_or(true, |h| age <= h)
                })
                .collect();
            assert_eq!(matching.len(), 1, "age {age}");
            assert_eq!(*matching[0], LifeStage::for_age(age));
        }
    }

    #[test]
    fn test_from_sections_fills_missing_with_placeholders() {
        let mut parsed = BTreeMap::new();
        parsed.insert(LifeStage::Adulthood, "Tall bishop with dark beard".to_string());
        parsed.insert(LifeStage::Youth, "   ".to_string());

        let dossier = CharacterDossier::from_sections(parsed);
        assert_eq!(dossier.sections.len(), 4);
        assert!(dossier.is_usable());
        assert!(dossier.is_placeholder(LifeStage::Youth));
        assert_eq!(dossier.excerpt(LifeStage::Adulthood), "Tall bishop with dark beard");
        assert!(!dossier.is_degraded());
    }

    #[test]
    fn test_placeholder_dossier_is_degraded() {
        let dossier = CharacterDossier::placeholder();
        assert!(dossier.is_degraded());
        assert!(!dossier.is_usable());
        assert_eq!(
            dossier.excerpt(LifeStage::Elder),
            LifeStage::Elder.placeholder_text()
        );
    }

    #[test]
    fn test_dossier_serializes_stage_keys() {
        let dossier = CharacterDossier::placeholder();
        let json = serde_json::to_value(&dossier).unwrap();
        assert!(json["sections"]["adulthood"]["placeholder"].as_bool().unwrap());
    }
}
