use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::LookupWarning;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "e" => Some(Difficulty::Easy),
            "medium" | "m" => Some(Difficulty::Medium),
            "hard" | "h" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    // Levels without an explicit difficulty get one from their depth
    pub fn for_level(level: u32) -> Self {
        match level {
            0 | 1 => Difficulty::Easy,
            2 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Text,
    Code,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "Text",
            ContentType::Code => "Code",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(ContentType::Text),
            "code" => Some(ContentType::Code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Video,
    Article,
    Code,
    Tool,
    Docs,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Article => "article",
            ResourceKind::Code => "code",
            ResourceKind::Tool => "tool",
            ResourceKind::Docs => "docs",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "video" => Some(ResourceKind::Video),
            "article" => Some(ResourceKind::Article),
            "code" => Some(ResourceKind::Code),
            "tool" => Some(ResourceKind::Tool),
            "docs" | "doc" | "documentation" => Some(ResourceKind::Docs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub url: String,
    pub title: String,
}

/// A unit of progressive knowledge, practised through its levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: i64,
    pub topic_id: i64,
    pub name: String,
    pub tags: BTreeSet<String>,
    pub estimated_minutes: Option<u32>,
    /// Names of other concepts. Resolved by lookup, may dangle.
    pub related: Vec<String>,
    pub resources: Vec<Resource>,
}

/// The practised unit. Flat questions and concept levels share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub topic_id: i64,
    pub concept_id: Option<i64>,
    pub level: u32,
    pub title: String,
    pub difficulty: Difficulty,
    pub content_type: ContentType,
    pub prompt: String,
    pub answer: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportFormat {
    Flat,
    Progressive,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Flat => "flat",
            ImportFormat::Progressive => "progressive",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptGraph {
    pub topics: Vec<Topic>,
    pub concepts: Vec<Concept>,
    pub questions: Vec<Question>,
}

impl ConceptGraph {
    pub fn topic(&self, id: i64) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn concept(&self, id: i64) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }

    pub fn question(&self, id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn topic_by_name(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Case-insensitive lookup across every topic.
    pub fn concept_by_name(&self, name: &str) -> Option<&Concept> {
        let wanted = name.trim().to_lowercase();
        self.concepts
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
    }

    pub fn questions_in_topic(&self, topic_id: i64) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.topic_id == topic_id)
    }

    pub fn concepts_in_topic(&self, topic_id: i64) -> impl Iterator<Item = &Concept> {
        self.concepts.iter().filter(move |c| c.topic_id == topic_id)
    }

    /// Levels of a concept in ascending level order.
    pub fn levels(&self, concept_id: i64) -> Vec<&Question> {
        let mut levels: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| q.concept_id == Some(concept_id))
            .collect();
        levels.sort_by_key(|q| q.level);
        levels
    }

    pub fn parent(&self, question: &Question) -> Option<&Question> {
        question.parent_id.and_then(|id| self.question(id))
    }

    pub fn children(&self, question: &Question) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| q.parent_id == Some(question.id))
            .collect()
    }

    /// Related concepts that resolve, plus a warning for each that doesn't.
    pub fn related_concepts(&self, concept: &Concept) -> (Vec<&Concept>, Vec<LookupWarning>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for name in &concept.related {
            match self.concept_by_name(name) {
                Some(c) => found.push(c),
                None => missing.push(LookupWarning::UnknownRelatedConcept {
                    concept: concept.name.clone(),
                    target: name.clone(),
                }),
            }
        }
        (found, missing)
    }

    /// Every soft reference in the graph that does not resolve.
    pub fn dangling_references(&self) -> Vec<LookupWarning> {
        let mut warnings = Vec::new();
        for concept in &self.concepts {
            warnings.extend(self.related_concepts(concept).1);
        }
        for q in &self.questions {
            if let Some(parent_id) = q.parent_id {
                if self.question(parent_id).is_none() {
                    warnings.push(LookupWarning::UnknownParent {
                        question_id: q.id,
                        parent_id,
                    });
                }
            }
        }
        warnings
    }
}

/// Scheduling state of one question for the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub last_answered: DateTime<Utc>,
    pub review_count: u32,
    /// Consecutive answers with confidence of 3 or more.
    pub streak: u32,
    pub interval_days: u32,
    pub ease: f64,
    pub last_confidence: u8,
    pub next_review: NaiveDate,
}

impl ReviewState {
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review <= today
    }
}

/// One answer event, kept for analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub question_id: i64,
    pub session_id: Option<i64>,
    pub confidence: u8,
    pub answered_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
    pub user_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSession {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub questions_count: i64,
    pub duration_minutes: Option<f64>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: Topic,
    pub question_count: i64,
    pub concept_count: i64,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
