//! System prompt template with `{name}` placeholders.

use std::path::Path;

use crate::TutorError;

/// Built-in tutoring prompt.
pub const DEFAULT_TEMPLATE: &str = "\
You are a patient math tutor helping a student with {topic}.
Explain the steps needed to reach the solution, one step at a time, and use
simple language suited to a beginner. Base your explanation on the textbook
excerpts you are given when they are relevant. If the student asks about
something other than {topic}, gently steer them back to {topic}.
Never just state the final answer without showing how to get there.";

/// A text template rendered once per request.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Load a template file; a blank file is rejected.
    pub fn from_file(path: &Path) -> Result<Self, TutorError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| TutorError::Prompt(format!("cannot read {}: {e}", path.display())))?;
        if source.trim().is_empty() {
            return Err(TutorError::Prompt(format!("{} is empty", path.display())));
        }
        Ok(Self::new(source))
    }

    /// The configured template file, else the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self, TutorError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Replace every `{name}` with its value. Unknown placeholders are left as-is.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        vars.iter().fold(self.source.clone(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
    }

    /// Render with the active topic.
    pub fn render_topic(&self, topic: &str) -> String {
        self.render(&[("topic", topic)])
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}
