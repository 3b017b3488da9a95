//! Rule-based life-stage classifier.
//!
//! Scores each stage by summing the weights of keywords found in the
//! normalized scene text. Role tokens (titles such as "obispo" or
//! "capitán") outweigh generic age words such as "joven". The highest score
//! wins; ties and scenes without evidence resolve to adulthood.

use scenecast_models::LifeStage;
use serde::{Deserialize, Serialize};

use crate::text::normalize;

/// Built-in keyword vocabulary to start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeywordDomain {
    #[default]
    General,
    Religious,
    Military,
}

/// An extra keyword supplied through configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOverride {
    pub phrase: String,
    pub stage: LifeStage,
    /// Weighted as a role token rather than a generic age word
    #[serde(default)]
    pub role: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDetectionSettings {
    pub domain: KeywordDomain,
    pub role_weight: f64,
    pub generic_weight: f64,
    pub keywords: Vec<KeywordOverride>,
}

impl Default for StageDetectionSettings {
    fn default() -> Self {
        Self {
            domain: KeywordDomain::General,
            role_weight: 3.0,
            generic_weight: 1.0,
            keywords: Vec::new(),
        }
    }
}

/// One normalized keyword phrase and the score it contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordEntry {
    tokens: Vec<String>,
    pub stage: LifeStage,
    pub weight: f64,
}

impl KeywordEntry {
    pub fn new(phrase: &str, stage: LifeStage, weight: f64) -> Self {
        Self {
            tokens: normalize(phrase)
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            stage,
            weight,
        }
    }

    fn occurrences(&self, words: &[&str]) -> usize {
        if self.tokens.is_empty() || self.tokens.len() > words.len() {
            return 0;
        }
        words
            .windows(self.tokens.len())
            .filter(|window| window.iter().zip(&self.tokens).all(|(w, t)| *w == t))
            .count()
    }
}

const GENERIC: &[(&str, LifeStage)] = &[
    ("niño", LifeStage::Childhood),
    ("niña", LifeStage::Childhood),
    ("niñez", LifeStage::Childhood),
    ("infancia", LifeStage::Childhood),
    ("bebé", LifeStage::Childhood),
    ("pequeño", LifeStage::Childhood),
    ("child", LifeStage::Childhood),
    ("childhood", LifeStage::Childhood),
    ("boy", LifeStage::Childhood),
    ("girl", LifeStage::Childhood),
    ("infant", LifeStage::Childhood),
    ("joven", LifeStage::Youth),
    ("jóvenes", LifeStage::Youth),
    ("juventud", LifeStage::Youth),
    ("adolescente", LifeStage::Youth),
    ("muchacho", LifeStage::Youth),
    ("muchacha", LifeStage::Youth),
    ("young", LifeStage::Youth),
    ("youth", LifeStage::Youth),
    ("teenager", LifeStage::Youth),
    ("adulto", LifeStage::Adulthood),
    ("madurez", LifeStage::Adulthood),
    ("edad adulta", LifeStage::Adulthood),
    ("adult", LifeStage::Adulthood),
    ("adulthood", LifeStage::Adulthood),
    ("anciano", LifeStage::Elder),
    ("anciana", LifeStage::Elder),
    ("vejez", LifeStage::Elder),
    ("viejo", LifeStage::Elder),
    ("vieja", LifeStage::Elder),
    ("últimos años", LifeStage::Elder),
    ("elderly", LifeStage::Elder),
    ("old age", LifeStage::Elder),
    ("old man", LifeStage::Elder),
    ("old woman", LifeStage::Elder),
];

const GENERAL_ROLES: &[(&str, LifeStage)] = &[
    ("recién nacido", LifeStage::Childhood),
    ("newborn", LifeStage::Childhood),
    ("estudiante", LifeStage::Youth),
    ("aprendiz", LifeStage::Youth),
    ("student", LifeStage::Youth),
    ("apprentice", LifeStage::Youth),
    ("rey", LifeStage::Adulthood),
    ("reina", LifeStage::Adulthood),
    ("médico", LifeStage::Adulthood),
    ("maestro", LifeStage::Adulthood),
    ("obispo", LifeStage::Adulthood),
    ("sacerdote", LifeStage::Adulthood),
    ("capitán", LifeStage::Adulthood),
    ("king", LifeStage::Adulthood),
    ("queen", LifeStage::Adulthood),
    ("physician", LifeStage::Adulthood),
    ("bishop", LifeStage::Adulthood),
    ("priest", LifeStage::Adulthood),
    ("captain", LifeStage::Adulthood),
    ("patriarca", LifeStage::Elder),
    ("patriarch", LifeStage::Elder),
];

const RELIGIOUS_ROLES: &[(&str, LifeStage)] = &[
    ("monaguillo", LifeStage::Childhood),
    ("novicio", LifeStage::Youth),
    ("novicia", LifeStage::Youth),
    ("seminarista", LifeStage::Youth),
    ("novice", LifeStage::Youth),
    ("abad", LifeStage::Adulthood),
    ("abadesa", LifeStage::Adulthood),
    ("presbítero", LifeStage::Adulthood),
    ("cardenal", LifeStage::Adulthood),
    ("predicador", LifeStage::Adulthood),
    ("abbot", LifeStage::Adulthood),
    ("cardinal", LifeStage::Adulthood),
    ("preacher", LifeStage::Adulthood),
    ("ermitaño anciano", LifeStage::Elder),
    ("obispo emérito", LifeStage::Elder),
    ("emérito", LifeStage::Elder),
];

const MILITARY_ROLES: &[(&str, LifeStage)] = &[
    ("paje", LifeStage::Childhood),
    ("page boy", LifeStage::Childhood),
    ("escudero", LifeStage::Youth),
    ("recluta", LifeStage::Youth),
    ("cadete", LifeStage::Youth),
    ("squire", LifeStage::Youth),
    ("recruit", LifeStage::Youth),
    ("cadet", LifeStage::Youth),
    ("coronel", LifeStage::Adulthood),
    ("comandante", LifeStage::Adulthood),
    ("caballero", LifeStage::Adulthood),
    ("colonel", LifeStage::Adulthood),
    ("commander", LifeStage::Adulthood),
    ("knight", LifeStage::Adulthood),
    ("veterano", LifeStage::Elder),
    ("veteran", LifeStage::Elder),
];

/// Weighted keyword table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        Self { entries }
    }

    /// Built-in table for a domain: generic age words plus role titles.
    pub fn builtin(domain: KeywordDomain, role_weight: f64, generic_weight: f64) -> Self {
        let mut entries: Vec<KeywordEntry> = GENERIC
            .iter()
            .map(|(p, s)| KeywordEntry::new(p, *s, generic_weight))
            .collect();
        let roles: &[&[(&str, LifeStage)]] = match domain {
            KeywordDomain::General => &[GENERAL_ROLES],
            KeywordDomain::Religious => &[GENERAL_ROLES, RELIGIOUS_ROLES],
            KeywordDomain::Military => &[GENERAL_ROLES, MILITARY_ROLES],
        };
        entries.extend(
            roles
                .iter()
                .flat_map(|table| table.iter())
                .map(|(p, s)| KeywordEntry::new(p, *s, role_weight)),
        );
        Self { entries }
    }

    pub fn from_settings(settings: &StageDetectionSettings) -> Self {
        let mut table =
            Self::builtin(settings.domain, settings.role_weight, settings.generic_weight);
        for extra in &settings.keywords {
            let weight = if extra.role {
                settings.role_weight
            } else {
                settings.generic_weight
            };
            table.push(KeywordEntry::new(&extra.phrase, extra.stage, weight));
        }
        table
    }

    pub fn push(&mut self, entry: KeywordEntry) {
        self.entries.push(entry);
    }
}

#[derive(Debug, Clone)]
pub struct StageDetector {
    table: KeywordTable,
}

impl StageDetector {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn from_settings(settings: &StageDetectionSettings) -> Self {
        Self::new(KeywordTable::from_settings(settings))
    }

    /// Cumulative score per stage, in [`LifeStage::ALL`] order.
    pub fn scores(&self, text: &str) -> [(LifeStage, f64); 4] {
        let normalized = normalize(text);
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let mut scores = LifeStage::ALL.map(|s| (s, 0.0_f64));
        for entry in &self.table.entries {
            let hits = entry.occurrences(&words);
            if hits > 0 {
                if let Some(slot) = scores.iter_mut().find(|(s, _)| *s == entry.stage) {
                    slot.1 += entry.weight * hits as f64;
                }
            }
        }
        scores
    }

    /// Exactly one stage for any text.
    pub fn detect(&self, text: &str) -> LifeStage {
        let scores = self.scores(text);
        let best = scores.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        if best <= 0.0 {
            return LifeStage::Adulthood;
        }
        let mut leaders = scores.iter().filter(|(_, v)| (*v - best).abs() < 1e-9);
        match (leaders.next(), leaders.next()) {
            (Some((stage, _)), None) => *stage,
            _ => LifeStage::Adulthood,
        }
    }
}

impl Default for StageDetector {
    fn default() -> Self {
        Self::from_settings(&StageDetectionSettings::default())
    }
}
