//! Topic table: topic name → textbook scope set.
//!
//! Built once at startup, either from the built-in table or from the
//! `[[topics]]` section of the config. Lookups are case-insensitive on the
//! trimmed name. Unknown topics resolve to the empty scope set, which means
//! unrestricted retrieval.

use mathtutor_config::TopicConfig;
use mathtutor_core::retrieval::DocumentScope;
use serde::Serialize;
use std::collections::HashMap;

const FUNDAMENTALS: &str = "fundamentals-of-mathematics.pdf";
const ALGEBRA: &str = "Beginning_and_Intermediate_Algebra.pdf";

/// One registered topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topic {
    pub name: String,
    pub definition: String,
    pub scopes: Vec<DocumentScope>,
}

impl Topic {
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        scopes: Vec<DocumentScope>,
    ) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            scopes,
        }
    }
}

impl From<&TopicConfig> for Topic {
    fn from(t: &TopicConfig) -> Self {
        Topic::new(
            t.name.trim(),
            t.definition.clone(),
            t.scopes.iter().map(DocumentScope::from).collect(),
        )
    }
}

/// Immutable registry of topics, kept in registration order.
#[derive(Debug, Clone)]
pub struct TopicFilterRegistry {
    topics: Vec<Topic>,
    index: HashMap<String, usize>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl TopicFilterRegistry {
    /// Build a registry. Later duplicates of a name are ignored.
    pub fn new(topics: Vec<Topic>) -> Self {
        let mut index = HashMap::with_capacity(topics.len());
        let mut kept = Vec::with_capacity(topics.len());
        for topic in topics {
            let key = normalize(&topic.name);
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key, kept.len());
            kept.push(topic);
        }
        Self { topics: kept, index }
    }

    /// The textbook topic table.
    pub fn builtin() -> Self {
        Self::new(vec![
            Topic::new(
                "linear equations",
                "Math statements with an equal sign that graph as straight lines.",
                vec![
                    DocumentScope::new(FUNDAMENTALS, 1249, 1357),
                    DocumentScope::new(ALGEBRA, 28, 79),
                ],
            ),
            Topic::new(
                "fractions",
                "A way to show parts of a whole, written with a top and bottom number.",
                vec![
                    DocumentScope::new(FUNDAMENTALS, 400, 645),
                    DocumentScope::new(ALGEBRA, 12, 17),
                ],
            ),
            Topic::new(
                "integers",
                "Numbers without fractions or decimals, like -3, 0, or 7.",
                vec![
                    DocumentScope::new(FUNDAMENTALS, 15, 268),
                    DocumentScope::new(ALGEBRA, 7, 9),
                ],
            ),
            Topic::new(
                "real numbers",
                "All numbers that can be found on the number line, including fractions, decimals, and whole numbers.",
                vec![DocumentScope::new(FUNDAMENTALS, 1130, 1144)],
            ),
            Topic::new(
                "signed numbers",
                "Numbers that include a plus (+) or minus (−) sign to show direction or value.",
                vec![DocumentScope::new(FUNDAMENTALS, 1145, 1220)],
            ),
            Topic::new(
                "decimals",
                "Numbers with a dot that show values smaller than one, like 0.5.",
                vec![DocumentScope::new(FUNDAMENTALS, 663, 881)],
            ),
            Topic::new(
                "percents",
                "A way to express parts out of 100, like 25% means 25 out of 100.",
                vec![DocumentScope::new(FUNDAMENTALS, 848, 920)],
            ),
            Topic::new(
                "polynomials",
                "Expressions made up of numbers, variables, and exponents added or subtracted.",
                vec![DocumentScope::new(ALGEBRA, 177, 205)],
            ),
            Topic::new(
                "factoring",
                "Rewriting a number or expression as a product of its smaller parts or factors.",
                vec![DocumentScope::new(ALGEBRA, 212, 237)],
            ),
        ])
    }

    /// Use the configured table, or the built-in one when none is configured.
    pub fn from_config(topics: &[TopicConfig]) -> Self {
        if topics.is_empty() {
            Self::builtin()
        } else {
            Self::new(topics.iter().map(Topic::from).collect())
        }
    }

    /// Scope set for a topic; empty for unknown topics.
    pub fn resolve(&self, topic: &str) -> &[DocumentScope] {
        self.get(topic).map(|t| t.scopes.as_slice()).unwrap_or(&[])
    }

    pub fn get(&self, topic: &str) -> Option<&Topic> {
        self.index.get(&normalize(topic)).map(|&i| &self.topics[i])
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.index.contains_key(&normalize(topic))
    }

    /// Topic names in registry order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.name.as_str())
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for TopicFilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
