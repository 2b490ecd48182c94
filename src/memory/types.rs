use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type FactId = String;
pub type CategoryName = String;

/// One atomic, timestamped statement about the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    /// Single natural-language sentence.
    #[serde(rename = "fact", alias = "text")]
    pub text: String,
    /// One entry per creation or update event, newest last. Append-only.
    #[serde(default)]
    pub timestamps: Vec<String>,
}

impl Fact {
    pub fn new(id: impl Into<FactId>, text: impl Into<String>, created_at: &str) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            timestamps: vec![created_at.to_string()],
        }
    }

    /// Replace the text and record the event. The id never changes.
    pub fn revise(&mut self, text: &str, at: &str) {
        self.text = text.to_string();
        self.timestamps.push(at.to_string());
    }
}

/// Named grouping of related facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "Description", alias = "description", default)]
    pub description: String,
    /// Insertion order, oldest first.
    #[serde(rename = "Facts", alias = "facts", default)]
    pub facts: Vec<Fact>,
    /// Keys this engine does not interpret (Credentials, Relationships, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("Credentials".to_string(), Value::Object(Map::new()));
        Self {
            description: format!("User's {} information", name.to_lowercase()),
            facts: Vec::new(),
            extra,
        }
    }
}

/// Root aggregate: category name -> category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactStore {
    pub categories: BTreeMap<CategoryName, Category>,
}

/// Position of a fact inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactLocation {
    pub category: CategoryName,
    pub index: usize,
}

/// A fact together with the category it is filed under. Used as the corpus
/// handed to the reconciler and the fact ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedFact {
    pub category: CategoryName,
    pub fact: Fact,
}

/// Reported after every successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSummary {
    pub facts: usize,
    pub categories: usize,
}

/// A broken store-wide invariant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Violation {
    DuplicateId(FactId),
    MisfiledFact { id: FactId, filed_under: CategoryName, expected: CategoryName },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::DuplicateId(id) => write!(f, "duplicate fact id '{}'", id),
            Violation::MisfiledFact { id, filed_under, expected } => write!(
                f,
                "fact '{}' filed under '{}' but its prefix maps to '{}'",
                id, filed_under, expected
            ),
        }
    }
}
