//! In-memory document and query records

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Statement text with HTML removed
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Text indexed by the lexical scorer: the statement followed by the
    /// requested metadata fields, in order, when present.
    pub fn lexical_text(&self, extra_fields: &[String]) -> String {
        let mut out = self.text.clone();
        for field in extra_fields {
            if let Some(value) = self.metadata.get(field) {
                if !value.trim().is_empty() {
                    out.push(' ');
                    out.push_str(value);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
    pub intent: Option<String>,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Intent text, treating blank values as absent
    pub fn intent_text(&self) -> Option<&str> {
        self.intent
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Loaded documents, in file order, with id lookup
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    by_id: HashMap<String, usize>,
}

impl Corpus {
    /// Build a corpus. Later duplicates of an id are dropped and returned.
    pub fn new(documents: Vec<Document>) -> (Self, Vec<Document>) {
        let mut kept = Vec::with_capacity(documents.len());
        let mut by_id = HashMap::with_capacity(documents.len());
        let mut duplicates = Vec::new();

        for doc in documents {
            if by_id.contains_key(&doc.id) {
                duplicates.push(doc);
                continue;
            }
            by_id.insert(doc.id.clone(), kept.len());
            kept.push(doc);
        }

        (
            Self {
                documents: kept,
                by_id,
            },
            duplicates,
        )
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self::new(documents).0
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.by_id.get(id).map(|&idx| &self.documents[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// One graded relevance judgement from `qrel.csv`
#[derive(Debug, Clone, PartialEq)]
pub struct Qrel {
    pub query_id: String,
    pub doc_id: String,
    pub score: i32,
    pub rank: Option<u32>,
}
