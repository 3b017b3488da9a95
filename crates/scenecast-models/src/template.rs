//! Prompt template data records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hard constraints applied to the compiled text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TemplateConstraints {
    /// Maximum words in the final prompt, prefix and suffix included
    pub max_words: Option<usize>,
    /// Mandatory leading text
    pub prefix: Option<String>,
    /// Mandatory trailing text
    pub suffix: Option<String>,
}

/// A named prompt template with `{placeholder}` slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default)]
    pub system_instructions: String,
    pub user_template: String,
    /// Declared variables (informational; placeholders are read from the template)
    #[serde(default)]
    pub variables: Vec<String>,
    /// Optional worked examples appended to the system instructions
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub constraints: TemplateConstraints,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, user_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_instructions: String::new(),
            user_template: user_template.into(),
            variables: Vec::new(),
            examples: Vec::new(),
            constraints: TemplateConstraints::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instructions = system.into();
        self
    }

    pub fn with_constraints(mut self, constraints: TemplateConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// System instructions with any worked examples appended.
    pub fn full_system_prompt(&self) -> String {
        if self.examples.is_empty() {
            return self.system_instructions.clone();
        }
        let mut out = self.system_instructions.clone();
        out.push_str("\n\nExamples:");
        for example in &self.examples {
            out.push_str("\n- ");
            out.push_str(example);
        }
        out
    }

    /// Placeholder names referenced by the user template, in order of first use.
    ///
    /// Returns `None` when a `{` is never closed.
    pub fn placeholders(&self) -> Option<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        let mut rest = self.user_template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let close = after.find('}')?;
            let name = after[..close].trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
            rest = &after[close + 1..];
        }
        Some(names)
    }
}
