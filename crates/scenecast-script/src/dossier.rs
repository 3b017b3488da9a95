//! Parsing of dossier responses into life-stage sections.

use std::collections::BTreeMap;

use scenecast_models::LifeStage;

use crate::text::normalize;

const ALIASES: &[(&str, LifeStage)] = &[
    ("childhood", LifeStage::Childhood),
    ("infancia", LifeStage::Childhood),
    ("ninez", LifeStage::Childhood),
    ("youth", LifeStage::Youth),
    ("juventud", LifeStage::Youth),
    ("adulthood", LifeStage::Adulthood),
    ("adultez", LifeStage::Adulthood),
    ("edad adulta", LifeStage::Adulthood),
    ("madurez", LifeStage::Adulthood),
    ("elder", LifeStage::Elder),
    ("old age", LifeStage::Elder),
    ("vejez", LifeStage::Elder),
    ("ancianidad", LifeStage::Elder),
];

/// Recognise a section header line; returns the stage and any inline text.
fn parse_header(line: &str) -> Option<(LifeStage, String)> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| {
            matches!(c, '#' | '*' | '-' | '.') || c.is_ascii_digit() || c.is_whitespace()
        });

    let (head, rest) = match stripped.find(':') {
        Some(pos) => (&stripped[..pos], &stripped[pos + 1..]),
        None => (stripped, ""),
    };
    let head = normalize(head);
    // Headers may carry an age hint, e.g. "ADULTHOOD (26-50)".
    let head = head
        .split(|c: char| c.is_ascii_digit())
        .next()
        .unwrap_or("")
        .trim();

    // Without a colon only a bare header line counts.
    let has_colon = stripped.contains(':');
    ALIASES.iter().find_map(|(alias, stage)| {
        let matches = head == *alias
            || (has_colon && head.starts_with(alias) && head.len() <= alias.len() + 12);
        matches.then(|| {
            let inline = rest
                .trim()
                .trim_start_matches(|c: char| c == '*' || c.is_whitespace())
                .to_string();
            (*stage, inline)
        })
    })
}

fn flush(current: Option<(LifeStage, Vec<String>)>, sections: &mut BTreeMap<LifeStage, String>) {
    if let Some((stage, lines)) = current {
        let body = lines.join(" ").trim().to_string();
        if !body.is_empty() {
            sections.entry(stage).or_insert(body);
        }
    }
}

/// Split a dossier response into sections keyed by life stage.
///
/// Unknown or missing sections are simply absent; the first occurrence of a
/// repeated header wins.
pub fn parse_dossier_sections(text: &str) -> BTreeMap<LifeStage, String> {
    let mut sections: BTreeMap<LifeStage, String> = BTreeMap::new();
    let mut current: Option<(LifeStage, Vec<String>)> = None;

    for line in text.lines() {
        if let Some((stage, inline)) = parse_header(line) {
            flush(current.take(), &mut sections);
            let mut lines = Vec::new();
            if !inline.is_empty() {
                lines.push(inline);
            }
            current = Some((stage, lines));
        } else if let Some((_, lines)) = current.as_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }
    flush(current.take(), &mut sections);
    sections
}
