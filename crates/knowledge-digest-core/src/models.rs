//! Core data models used throughout Knowledge Digest.
//!
//! These types represent the messages, topics, and knowledge-base entries
//! that flow through the digest pipeline:
//!
//! ```text
//! chat export ─▶ RawMessage ─┐
//!                            ├─▶ ParsedTopic ─▶ TopicOutcome
//! Markdown upload ───────────┘
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of content a chat message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Link,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Link => "link",
            MessageType::File => "file",
        }
    }
}

/// One attributed message from a chat export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMessage {
    pub id: String,
    pub group_name: String,
    pub sender_name: String,
    pub sender_id: Option<String>,
    pub content: String,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

/// A topic extracted from a chat digest or a Markdown upload.
///
/// A topic's identity for merge purposes is its normalized title plus its
/// category, never its `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTopic {
    pub id: String,
    pub title: String,
    pub content: String,
    pub raw_category_hint: String,
    pub suggested_category_slug: String,
    pub suggested_category_name: String,
    /// Advisory classification confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// 1–5, higher means more worth keeping. Uploads default to 3.
    pub importance: u8,
    pub tags: Vec<String>,
    pub source_message_ids: Vec<String>,
}

impl ParsedTopic {
    /// Deterministic id derived from title and content.
    pub fn make_id(title: &str, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("topic-{}", &hash[..12])
    }

    pub fn is_classified(&self) -> bool {
        !self.suggested_category_slug.is_empty()
    }
}

/// One entry of the static category taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One existing knowledge document, as seen by the similarity matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeIndexEntry {
    pub title: String,
    pub url: String,
    pub file_path: String,
}

/// A scored association between a topic and an existing document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidate {
    pub title: String,
    pub url: String,
    pub file_path: String,
    pub score: f64,
}

/// What happened to one topic during a processing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TopicOutcome {
    Created {
        path: String,
        url: String,
    },
    Merged {
        path: String,
        url: String,
        score: f64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl TopicOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TopicOutcome::Created { .. } => "created",
            TopicOutcome::Merged { .. } => "merged",
            TopicOutcome::Skipped { .. } => "skipped",
            TopicOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-topic result row in a [`RunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct TopicResult {
    pub title: String,
    pub category: String,
    #[serde(flatten)]
    pub outcome: TopicOutcome,
}

/// Summary of one processing run: one report or one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub results: Vec<TopicResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl RunReport {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            results: Vec::new(),
            summary: None,
        }
    }

    pub fn push(&mut self, topic: &ParsedTopic, outcome: TopicOutcome) {
        self.results.push(TopicResult {
            title: topic.title.clone(),
            category: topic.suggested_category_slug.clone(),
            outcome,
        });
    }

    fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn created(&self) -> usize {
        self.count("created")
    }

    pub fn merged(&self) -> usize {
        self.count("merged")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}
