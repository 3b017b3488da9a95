//! Prompt compiler: fills a template's placeholders and enforces its constraints.

use std::collections::BTreeMap;

use scenecast_models::{
    Capability, GenerationRequest, HistoricalContext, LifeStage, PromptTemplate,
    TemplateConstraints,
};
use tracing::warn;

use crate::error::TemplateError;
use crate::text::{collapse_whitespace, normalize};

/// Output of a compilation, with every degradation that occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPrompt {
    pub request: GenerationRequest,
    pub errors: Vec<TemplateError>,
}

impl CompiledPrompt {
    pub fn prompt(&self) -> &str {
        &self.request.prompt
    }

    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Never fails: unbound placeholders become empty and a malformed template
/// degrades to the bare scene text, both reported in [`CompiledPrompt::errors`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptCompiler;

impl PromptCompiler {
    pub fn compile(
        template: &PromptTemplate,
        bindings: &BTreeMap<String, String>,
        capability: Capability,
    ) -> CompiledPrompt {
        let mut errors = Vec::new();
        let mut unbound = Vec::new();

        let body = match template.placeholders() {
            Some(names) => {
                for name in &names {
                    if !bindings.contains_key(name) {
                        warn!(
                            template = %template.name,
                            placeholder = %name,
                            "Unbound placeholder"
                        );
                        errors.push(TemplateError::UnboundPlaceholder(name.clone()));
                        unbound.push(name.clone());
                    }
                }
                substitute(&template.user_template, bindings)
            }
            None => {
                warn!(template = %template.name, "Malformed template, using scene text");
                errors.push(TemplateError::MalformedPlaceholder(template.name.clone()));
                bindings.get("scene_text").cloned().unwrap_or_default()
            }
        };

        let prompt = apply_constraints(&collapse_whitespace(&body), &template.constraints);

        CompiledPrompt {
            request: GenerationRequest {
                template: template.name.clone(),
                bindings: bindings.clone(),
                capability,
                attempt: 0,
                system_prompt: template.full_system_prompt(),
                prompt,
                unbound,
            },
            errors,
        }
    }
}

/// Replace every `{name}` with its binding, or nothing when unbound.
fn substitute(template: &str, bindings: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = after[..close].trim();
                if let Some(value) = bindings.get(name) {
                    out.push_str(value);
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Truncate to `max_words` and inject the mandatory prefix and suffix.
///
/// Prefix and suffix count toward the word budget and are never truncated.
pub fn apply_constraints(text: &str, constraints: &TemplateConstraints) -> String {
    let prefix = constraints.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let suffix = constraints.suffix.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let mut body = text.trim();
    if let Some(p) = prefix {
        let present = body.get(..p.len()).map_or(false, |head| head.eq_ignore_ascii_case(p));
        if present {
            body = body[p.len()..].trim_start();
        }
    }
    if let Some(s) = suffix {
        let cut = body.len().saturating_sub(s.len());
        let present = body.len() >= s.len()
            && body.get(cut..).map_or(false, |tail| tail.eq_ignore_ascii_case(s));
        if present {
            body = body[..cut].trim_end();
        }
    }

    let mut body_words: Vec<&str> = body.split_whitespace().collect();
    if let Some(max) = constraints.max_words {
        let reserved = prefix.map_or(0, |p| p.split_whitespace().count())
            + suffix.map_or(0, |s| s.split_whitespace().count());
        let budget = max.saturating_sub(reserved);
        if body_words.len() > budget {
            body_words.truncate(budget);
            if let Some(last) = body_words.last_mut() {
                *last = last.trim_end_matches([',', ';', ':']);
            }
        }
    }

    let mut parts: Vec<&str> = Vec::new();
    if let Some(p) = prefix {
        parts.push(p);
    }
    let body = body_words.join(" ");
    if !body.is_empty() {
        parts.push(&body);
    }
    if let Some(s) = suffix {
        parts.push(s);
    }
    parts.join(" ")
}

/// Builder for the standard scene bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneBindings {
    values: BTreeMap<String, String>,
}

impl SceneBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Scene text plus the derived focus and shot hints.
    pub fn scene(self, text: &str) -> Self {
        let (focus, shot) = scene_focus(text);
        self.set("scene_text", text.trim())
            .set("scene_focus", focus)
            .set("shot_type", shot)
    }

    pub fn character(self, stage: LifeStage, excerpt: &str) -> Self {
        self.set("life_stage", stage.as_str())
            .set("character_description", excerpt.trim())
    }

    pub fn project(self, title: &str, context: &str) -> Self {
        self.set("title", title).set("context", context)
    }

    pub fn theme(self, theme: Option<&str>) -> Self {
        match theme {
            Some(theme) => self.set("theme", theme),
            None => self,
        }
    }

    /// Bind period, location and cultural context, with neutral defaults.
    pub fn historical(self, ctx: &HistoricalContext) -> Self {
        self.set(
            "period",
            ctx.period.clone().unwrap_or_else(|| "a historically appropriate period".into()),
        )
        .set(
            "location",
            ctx.location.clone().unwrap_or_else(|| "a historically appropriate setting".into()),
        )
        .set(
            "cultural_context",
            ctx.cultural_context
                .clone()
                .unwrap_or_else(|| "period-accurate clothing, architecture and customs".into()),
        )
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.values
    }
}

const GROUP_WORDS: &[&str] = &[
    "multitud", "pueblo", "gente", "fieles", "enfermos", "soldados", "ejercito", "discipulos",
    "crowd", "people", "soldiers", "army", "followers",
];
const ENVIRONMENT_WORDS: &[&str] = &[
    "ciudad", "paisaje", "montana", "montanas", "cueva", "bosque", "iglesia", "templo", "mar",
    "city", "landscape", "mountain", "cave", "forest", "church", "temple", "sea",
];
const ACTION_WORDS: &[&str] = &[
    "camina", "caminaba", "viaja", "viajaba", "lucha", "luchaba", "huye", "huyo", "cura",
    "curaba", "predica", "predicaba", "construye", "walks", "travels", "fights", "flees",
    "heals", "preaches",
];

/// Pick the visual focus and shot type suggested by the scene text.
pub fn scene_focus(text: &str) -> (&'static str, &'static str) {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let has = |list: &[&str]| words.iter().any(|w| list.contains(w));

    if has(GROUP_WORDS) {
        ("the group of people and their interaction", "medium wide shot")
    } else if has(ENVIRONMENT_WORDS) {
        ("the setting and its atmosphere", "wide establishing shot")
    } else if has(ACTION_WORDS) {
        ("the action being performed", "medium shot")
    } else {
        ("the main character", "close-up portrait")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_compile_substitutes_bindings() {
        let template =
            PromptTemplate::new("t", "{scene_text}. Character: {character_description}.");
        let compiled = PromptCompiler::compile(
            &template,
            &bindings(&[
                ("scene_text", "A bishop heals"),
                ("character_description", "tall, bearded"),
            ]),
            Capability::Image,
        );
        assert_eq!(compiled.prompt(), "A bishop heals. Character: tall, bearded.");
        assert!(!compiled.is_degraded());
        assert_eq!(compiled.request.template, "t");
    }

    #[test]
    fn test_unbound_placeholder_degrades_to_empty() {
        let template = PromptTemplate::new("t", "{scene_text} in {period}, {location}.");
        let compiled = PromptCompiler::compile(
            &template,
            &bindings(&[("scene_text", "Scene")]),
            Capability::Image,
        );
        assert_eq!(compiled.prompt(), "Scene in,.");
        assert_eq!(
            compiled.errors,
            vec![
                TemplateError::UnboundPlaceholder("period".into()),
                TemplateError::UnboundPlaceholder("location".into()),
            ]
        );
        assert_eq!(compiled.request.unbound, vec!["period", "location"]);
    }

    #[test]
    fn test_malformed_template_falls_back_to_scene_text() {
        let template = PromptTemplate::new("broken", "{scene_text} and {oops");
        let compiled = PromptCompiler::compile(
            &template,
            &bindings(&[("scene_text", "Blas prays")]),
            Capability::Image,
        );
        assert_eq!(compiled.prompt(), "Blas prays");
        assert!(matches!(compiled.errors[0], TemplateError::MalformedPlaceholder(_)));
    }

    #[test]
    fn test_constraints_apply_after_substitution() {
        let template =
            PromptTemplate::new("t", "{scene_text}").with_constraints(TemplateConstraints {
                max_words: Some(6),
                prefix: Some("Photorealistic,".into()),
                suffix: Some("no text.".into()),
            });
        let compiled = PromptCompiler::compile(
            &template,
            &bindings(&[("scene_text", "one two three four five six seven")]),
            Capability::Image,
        );
        // 6 words total: 1 prefix + 3 body + 2 suffix
        assert_eq!(compiled.prompt(), "Photorealistic, one two three no text.");
        assert_eq!(compiled.prompt().split_whitespace().count(), 6);
    }

    #[test]
    fn test_prefix_not_duplicated() {
        let constraints = TemplateConstraints {
            max_words: None,
            prefix: Some("Cinematic still:".into()),
            suffix: None,
        };
        assert_eq!(
            apply_constraints("Cinematic still: a monk writing", &constraints),
            "Cinematic still: a monk writing"
        );
    }

    #[test]
    fn test_scene_focus_hints() {
        assert_eq!(scene_focus("La multitud lo seguía").1, "medium wide shot");
        assert_eq!(scene_focus("Se refugió en una cueva del monte").1, "wide establishing shot");
        assert_eq!(scene_focus("Blas curaba con paciencia").1, "medium shot");
        assert_eq!(scene_focus("Blas sonrió").1, "close-up portrait");
    }

    #[test]
    fn test_scene_bindings_builder() {
        let map = SceneBindings::new()
            .scene("  Blas predicaba  ")
            .character(LifeStage::Adulthood, "bearded bishop")
            .project("San Blas", "Armenia, siglo IV")
            .historical(&HistoricalContext::default())
            .into_map();
        assert_eq!(map["scene_text"], "Blas predicaba");
        assert_eq!(map["life_stage"], "adulthood");
        assert!(map["period"].contains("historically appropriate"));
        assert!(!map.contains_key("theme"));
    }
}
