//! Built-in prompt templates.

use std::collections::HashMap;

use scenecast_models::{PromptTemplate, StyleFamily, TemplateConstraints};

use crate::error::TemplateError;

const IMAGE_SYSTEM: &str = "You write prompts for a text-to-image model. \
Describe one concrete, visually coherent moment. Keep the principal character's \
appearance consistent with the description provided.";

const AVOID: &str = "Avoid modern elements, anachronisms, text, watermarks.";

const DOSSIER_SYSTEM: &str = "You are a visual development artist creating a character bible \
for an illustrated documentary. Describe physical appearance only: build, face, hair, \
clothing and distinctive accessories, consistent across every life stage.";

const DOSSIER_USER: &str = "Create the visual dossier of {subject}, the principal subject of \
\"{title}\". Context: {context}.\n\n\
Answer with exactly four sections, each starting on its own line with its header:\n\
CHILDHOOD: (0-12 years)\n\
YOUTH: (13-25 years)\n\
ADULTHOOD: (26-50 years)\n\
ELDER: (over 50 years)\n\
Each section is one paragraph of 40 to 80 words.";

const REFINE_SYSTEM: &str = "You are an expert prompt engineer for image generation models. \
Rewrite the prompt you receive into a single vivid, concrete description in English. \
Preserve every character detail and historical constraint. Reply with the prompt only.";

fn photorealistic() -> PromptTemplate {
    PromptTemplate::new(
        "photorealistic",
        "{scene_text}. Main character ({life_stage}): {character_description}. \
         Focus on {scene_focus}, {shot_type}. Context: {context}.",
    )
    .with_system(IMAGE_SYSTEM)
    .with_constraints(TemplateConstraints {
        max_words: Some(300),
        prefix: Some("Photorealistic, cinematic lighting, highly detailed.".into()),
        suffix: Some(AVOID.into()),
    })
}

fn stylized() -> PromptTemplate {
    PromptTemplate::new(
        "stylized",
        "Painterly illustration of {scene_text}. Character: {character_description}. \
         {shot_type}, focus on {scene_focus}.",
    )
    .with_system(IMAGE_SYSTEM)
    .with_constraints(TemplateConstraints {
        max_words: Some(200),
        prefix: Some("Digital painting, rich colors, soft brushwork.".into()),
        suffix: None,
    })
}

fn historically_precise() -> PromptTemplate {
    let mut template = PromptTemplate::new(
        "historically_precise",
        "Historically accurate scene set in {period}, {location}. {cultural_context}. \
         {scene_text}. Main character ({life_stage}): {character_description}. \
         {shot_type}, focus on {scene_focus}.",
    )
    .with_system(IMAGE_SYSTEM)
    .with_constraints(TemplateConstraints {
        max_words: Some(300),
        prefix: Some("Photorealistic, cinematic lighting, historically accurate.".into()),
        suffix: Some(AVOID.into()),
    });
    template.variables = [
        "scene_text",
        "period",
        "location",
        "cultural_context",
        "life_stage",
        "character_description",
        "shot_type",
        "scene_focus",
    ]
    .iter()
    .map(|v| v.to_string())
    .collect();
    template
}

fn cinematic() -> PromptTemplate {
    PromptTemplate::new(
        "cinematic",
        "Film still: {scene_text}. {character_description}. {shot_type}, \
         shallow depth of field, focus on {scene_focus}.",
    )
    .with_system(IMAGE_SYSTEM)
    .with_constraints(TemplateConstraints {
        max_words: Some(250),
        prefix: Some("Cinematic, anamorphic lens, dramatic lighting.".into()),
        suffix: Some(AVOID.into()),
    })
}

fn documentary() -> PromptTemplate {
    PromptTemplate::new(
        "documentary",
        "Documentary reconstruction of {scene_text}. {character_description}. \
         Natural light, {shot_type}.",
    )
    .with_system(IMAGE_SYSTEM)
    .with_constraints(TemplateConstraints {
        max_words: Some(250),
        prefix: Some("Documentary photograph, natural colors.".into()),
        suffix: Some(AVOID.into()),
    })
}

/// Templates by style family, plus the dossier and refinement templates.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    styles: HashMap<StyleFamily, PromptTemplate>,
    dossier: PromptTemplate,
    refinement: PromptTemplate,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateLibrary {
    pub fn builtin() -> Self {
        let styles = [
            (StyleFamily::Photorealistic, photorealistic()),
            (StyleFamily::Stylized, stylized()),
            (StyleFamily::HistoricallyPrecise, historically_precise()),
            (StyleFamily::Cinematic, cinematic()),
            (StyleFamily::Documentary, documentary()),
        ]
        .into_iter()
        .collect();

        Self {
            styles,
            dossier: PromptTemplate::new("dossier", DOSSIER_USER).with_system(DOSSIER_SYSTEM),
            refinement: PromptTemplate::new("refinement", "{prompt}").with_system(REFINE_SYSTEM),
        }
    }

    /// Replace the template used for a style.
    pub fn with_style(mut self, style: StyleFamily, template: PromptTemplate) -> Self {
        self.styles.insert(style, template);
        self
    }

    pub fn for_style(&self, style: StyleFamily) -> Result<&PromptTemplate, TemplateError> {
        self.styles
            .get(&style)
            .ok_or_else(|| TemplateError::UnknownTemplate(style.as_str().to_string()))
    }

    pub fn dossier(&self) -> &PromptTemplate {
        &self.dossier
    }

    pub fn refinement(&self) -> &PromptTemplate {
        &self.refinement
    }
}
