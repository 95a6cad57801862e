use lazy_regex::regex_captures;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

use super::tokenizer::{tokenize, Block, MetaKey, Token};
use crate::error::{LookupWarning, ParseError, ParseWarning};
use crate::models::{
    Concept, ConceptGraph, ContentType, Difficulty, ImportFormat, Question, Resource,
    ResourceKind, Topic,
};

/// A successfully parsed document and everything worth telling the user about it.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub graph: ConceptGraph,
    pub format: ImportFormat,
    pub warnings: Vec<ParseWarning>,
}

/// Parse an import document in either the flat or the progressive format.
///
/// Fails on a document without a topic, or on any question or level that lacks
/// an answer. Everything else degrades to defaults plus a warning.
pub fn parse(text: &str) -> Result<ParseOutcome, ParseError> {
    tokenize(text)
        .into_iter()
        .try_fold(ParseState::default(), |state, token| state.apply(token))?
        .finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    Idle,
    TopicPreamble,
    ConceptHead,
    Prompt,
    Answer,
    Resources,
    ConceptTail,
    /// Content whose owner was rejected; ignored up to the next header.
    Skip,
}

struct OpenConcept {
    concept: Concept,
    line: usize,
    last_level: Option<u32>,
    last_question: Option<i64>,
    accepted_levels: usize,
}

struct PendingUnit {
    title: String,
    line: usize,
    level: u32,
    in_concept: bool,
    keep: bool,
    difficulty: Option<Difficulty>,
    content_type: ContentType,
    prompt: Vec<String>,
    answer: Option<Vec<String>>,
}

impl PendingUnit {
    fn new(title: String, line: usize, level: u32, in_concept: bool) -> Self {
        Self {
            title,
            line,
            level,
            in_concept,
            keep: true,
            difficulty: None,
            content_type: ContentType::Text,
            prompt: Vec::new(),
            answer: None,
        }
    }
}

#[derive(Default)]
struct ParseState {
    graph: ConceptGraph,
    format: Option<ImportFormat>,
    warnings: Vec<ParseWarning>,
    topic: Option<i64>,
    concept: Option<OpenConcept>,
    unit: Option<PendingUnit>,
    section: Section,
}

impl ParseState {
    fn apply(mut self, token: Token<'_>) -> Result<Self, ParseError> {
        let line = token.line;
        let is_header = matches!(
            token.block,
            Block::TopicHeader(_)
                | Block::ConceptHeader(_)
                | Block::QuestionHeader(_)
                | Block::LevelHeader { .. }
        );
        if self.section == Section::Skip && !is_header {
            return Ok(self);
        }

        match token.block {
            Block::TopicHeader(name) => {
                self.close_concept()?;
                self.close_unit()?;
                self.open_topic(name);
            }
            Block::ConceptHeader(name) => {
                if self.format == Some(ImportFormat::Flat) {
                    self.foreign_header(line, format!("## Concept: {}", name));
                    return Ok(self);
                }
                self.format = Some(ImportFormat::Progressive);
                self.close_concept()?;
                match self.topic {
                    Some(topic_id) => self.open_concept(topic_id, name, line),
                    None => self.stray(line, "concept before any topic", Section::Skip),
                }
            }
            Block::QuestionHeader(title) => {
                if self.format == Some(ImportFormat::Progressive) {
                    self.foreign_header(line, format!("## Question: {}", title));
                    return Ok(self);
                }
                self.format = Some(ImportFormat::Flat);
                self.close_unit()?;
                if self.topic.is_none() {
                    self.stray(line, "question before any topic", Section::Skip);
                    return Ok(self);
                }
                self.unit = Some(PendingUnit::new(title.to_string(), line, 1, false));
                self.section = Section::Prompt;
            }
            Block::LevelHeader { number, title } => {
                if self.format == Some(ImportFormat::Flat) {
                    self.foreign_header(line, format!("### Level {}: {}", number, title));
                    return Ok(self);
                }
                self.close_unit()?;
                self.open_level(number, title, line);
            }
            Block::Metadata { key, value } => self.apply_metadata(key, value, line),
            Block::AnswerMarker(inline) => {
                match self.unit.as_ref().map(|u| u.answer.is_some()) {
                    Some(false) => {
                        if let Some(unit) = self.unit.as_mut() {
                            unit.answer = Some(if inline.is_empty() {
                                Vec::new()
                            } else {
                                vec![inline.to_string()]
                            });
                        }
                        self.section = Section::Answer;
                    }
                    Some(true) => self.stray(line, "repeated answer marker", Section::Answer),
                    None => self.stray(line, "answer marker", Section::Idle),
                }
            }
            Block::ResourcesMarker => {
                if self.concept.is_some() {
                    self.close_unit()?;
                    self.section = Section::Resources;
                } else {
                    self.stray(line, "resources block", Section::Idle);
                }
            }
            Block::ResourceLine(text) => {
                if self.section != Section::Resources || self.concept.is_none() {
                    self.stray(line, "resource line", self.section);
                } else if let Some(resource) = parse_resource(text) {
                    if let Some(open) = self.concept.as_mut() {
                        open.concept.resources.push(resource);
                    }
                } else {
                    self.warnings.push(ParseWarning::MalformedResource {
                        line,
                        text: text.to_string(),
                    });
                }
            }
            Block::RelatedConcepts(value) => {
                if self.concept.is_some() {
                    self.close_unit()?;
                    if let Some(open) = self.concept.as_mut() {
                        for name in split_list(value) {
                            if !open.concept.related.contains(&name) {
                                open.concept.related.push(name);
                            }
                        }
                    }
                    self.section = Section::ConceptTail;
                } else {
                    self.stray(line, "related concepts line", Section::Idle);
                }
            }
            Block::Rule => {
                self.close_unit()?;
                self.section = Section::Idle;
            }
            Block::Body(text) => self.apply_body(text),
        }

        Ok(self)
    }

    fn apply_body(&mut self, text: String) {
        match (self.section, self.unit.as_mut()) {
            (Section::Prompt, Some(unit)) => unit.prompt.push(text),
            (Section::Answer, Some(unit)) => {
                if let Some(answer) = unit.answer.as_mut() {
                    answer.push(text);
                }
            }
            (Section::TopicPreamble, _) => {
                if let Some(topic) = self
                    .topic
                    .and_then(|id| self.graph.topics.iter_mut().find(|t| t.id == id))
                {
                    topic.description = Some(match topic.description.take() {
                        Some(existing) => format!("{}\n{}", existing, text),
                        None => text,
                    });
                }
            }
            (section, _) => debug!("ignoring body text in {:?}", section),
        }
    }

    fn apply_metadata(&mut self, key: MetaKey, value: &str, line: usize) {
        match key {
            MetaKey::Difficulty | MetaKey::Type => {
                let Some(unit) = self.unit.as_mut() else {
                    let what = format!("{} metadata", key.as_str());
                    self.stray(line, &what, self.section);
                    return;
                };
                let recognised = match key {
                    MetaKey::Difficulty => Difficulty::from_str(value)
                        .map(|d| unit.difficulty = Some(d))
                        .is_some(),
                    _ => ContentType::from_str(value)
                        .map(|t| unit.content_type = t)
                        .is_some(),
                };
                if !recognised {
                    self.unknown_metadata(key, value, line);
                }
            }
            MetaKey::Tags | MetaKey::EstimatedTime => {
                let Some(open) = self.concept.as_mut() else {
                    let what = format!("{} metadata", key.as_str());
                    self.stray(line, &what, self.section);
                    return;
                };
                if key == MetaKey::Tags {
                    open.concept.tags.extend(split_list(value));
                } else {
                    match parse_minutes(value) {
                        Some(minutes) => open.concept.estimated_minutes = Some(minutes),
                        None => self.unknown_metadata(key, value, line),
                    }
                }
            }
        }
    }

    fn open_topic(&mut self, name: &str) {
        let id = match self.graph.topic_by_name(name) {
            Some(existing) => existing.id,
            None => {
                let id = self.graph.topics.len() as i64 + 1;
                self.graph.topics.push(Topic {
                    id,
                    name: name.to_string(),
                    description: None,
                });
                id
            }
        };
        self.topic = Some(id);
        self.section = Section::TopicPreamble;
    }

    fn open_concept(&mut self, topic_id: i64, name: &str, line: usize) {
        self.concept = Some(OpenConcept {
            concept: Concept {
                id: self.graph.concepts.len() as i64 + 1,
                topic_id,
                name: name.to_string(),
                tags: BTreeSet::new(),
                estimated_minutes: None,
                related: Vec::new(),
                resources: Vec::new(),
            },
            line,
            last_level: None,
            last_question: None,
            accepted_levels: 0,
        });
        self.section = Section::ConceptHead;
    }

    fn open_level(&mut self, number: u32, title: &str, line: usize) {
        let Some(open) = self.concept.as_ref() else {
            self.stray(line, "level outside of a concept", Section::Skip);
            return;
        };

        let concept_name = open.concept.name.clone();
        let expected = open.last_level.map_or(1, |l| l + 1);
        let mut keep = true;
        if number == 0 || open.last_level.is_some_and(|last| number <= last) {
            self.warnings.push(ParseWarning::LevelOutOfOrder {
                concept: concept_name.clone(),
                line,
                found: number,
            });
            keep = false;
        } else if number != expected {
            self.warnings.push(ParseWarning::LevelGap {
                concept: concept_name.clone(),
                line,
                expected,
                found: number,
            });
        }

        let title = if title.is_empty() {
            format!("{} - Level {}", concept_name, number)
        } else {
            format!("{} - {}", concept_name, title)
        };
        let mut unit = PendingUnit::new(title, line, number, true);
        unit.keep = keep;
        self.unit = Some(unit);
        self.section = Section::Prompt;
    }

    fn close_unit(&mut self) -> Result<(), ParseError> {
        let Some(unit) = self.unit.take() else {
            return Ok(());
        };
        if !unit.keep {
            debug!("dropping out-of-order level '{}'", unit.title);
            return Ok(());
        }

        let answer = unit
            .answer
            .map(|parts| parts.join("\n").trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ParseError::MissingAnswer {
                title: unit.title.clone(),
                line: unit.line,
            })?;

        let Some(topic_id) = self.topic else {
            return Ok(());
        };
        let id = self.graph.questions.len() as i64 + 1;
        let open = if unit.in_concept {
            self.concept.as_mut()
        } else {
            None
        };

        let difficulty = unit.difficulty.unwrap_or(if open.is_some() {
            Difficulty::for_level(unit.level)
        } else {
            Difficulty::Medium
        });
        let (concept_id, parent_id) = match open {
            Some(open) => {
                let parent = open.last_question;
                open.last_level = Some(unit.level);
                open.last_question = Some(id);
                open.accepted_levels += 1;
                (Some(open.concept.id), parent)
            }
            None => (None, None),
        };

        debug!("parsed question {} '{}' (level {})", id, unit.title, unit.level);
        self.graph.questions.push(Question {
            id,
            topic_id,
            concept_id,
            level: unit.level,
            title: unit.title,
            difficulty,
            content_type: unit.content_type,
            prompt: unit.prompt.join("\n").trim().to_string(),
            answer,
            parent_id,
        });
        Ok(())
    }

    fn close_concept(&mut self) -> Result<(), ParseError> {
        self.close_unit()?;
        let Some(open) = self.concept.take() else {
            return Ok(());
        };
        if open.accepted_levels == 0 {
            return Err(ParseError::MissingAnswer {
                title: open.concept.name,
                line: open.line,
            });
        }
        self.graph.concepts.push(open.concept);
        Ok(())
    }

    fn stray(&mut self, line: usize, what: &str, next: Section) {
        self.warnings.push(ParseWarning::StrayContent {
            line,
            what: what.to_string(),
        });
        self.section = next;
    }

    fn foreign_header(&mut self, line: usize, header: String) {
        self.warnings.push(ParseWarning::ForeignHeader {
            line,
            header: header.clone(),
        });
        self.apply_body(header);
    }

    fn unknown_metadata(&mut self, key: MetaKey, value: &str, line: usize) {
        self.warnings.push(ParseWarning::UnknownMetadata {
            line,
            key: key.as_str().to_string(),
            value: value.to_string(),
        });
    }

    fn finish(mut self) -> Result<ParseOutcome, ParseError> {
        self.close_concept()?;
        self.close_unit()?;
        if self.graph.topics.is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        for warning in self.graph.dangling_references() {
            if let LookupWarning::UnknownRelatedConcept { concept, target } = warning {
                self.warnings
                    .push(ParseWarning::DanglingRelatedConcept { concept, target });
            }
        }

        debug!(
            "parsed {} topics, {} concepts, {} questions with {} warnings",
            self.graph.topics.len(),
            self.graph.concepts.len(),
            self.graph.questions.len(),
            self.warnings.len()
        );
        Ok(ParseOutcome {
            graph: self.graph,
            format: self.format.unwrap_or(ImportFormat::Flat),
            warnings: self.warnings,
        })
    }
}

// - [Kind] URL - Title
fn parse_resource(text: &str) -> Option<Resource> {
    let (_, kind, url, title) = regex_captures!(r"^\[(\w+)\]\s+(\S+)\s+-\s+(.+?)\s*$", text)?;
    Some(Resource {
        kind: ResourceKind::from_str(kind)?,
        url: url.to_string(),
        title: title.to_string(),
    })
}

fn parse_minutes(value: &str) -> Option<u32> {
    let (_, amount, unit) = regex_captures!(
        r"(?i)^(\d+)\s*(minutes?|mins?|m|hours?|hrs?|h)?\.?$",
        value.trim()
    )?;
    let amount: u32 = amount.parse().ok()?;
    match unit.to_lowercase().chars().next() {
        Some('h') => amount.checked_mul(60),
        _ => Some(amount),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRESSIVE: &str = r#"# Topic: Solidity Advanced

## Concept: Reentrancy Attacks
**Tags**: a, b
**Estimated Time**: 10 minutes

### Level 1: What is reentrancy?
Explain what a reentrancy attack is.

**Answer**:
An external contract calls back into the function before the first call finishes.

### Level 2: How does CEI help?
How does Checks-Effects-Interactions protect against it?

**Answer**:
State changes happen before external calls.

### Level 3: Cross-contract reentrancy
Explain cross-contract reentrancy.

**Answer**:
Shared state across contracts; protect with global locks.

**Resources**:
- [Video] https://youtube.com/watch?v=abc - Smart Contract Programmer Tutorial

**Related Concepts**: CEI Pattern
"#;

    const FLAT: &str = r#"# Topic: Go Basics

## Question: What is a goroutine?
**Difficulty**: Easy
**Type**: Text

Describe goroutines.

**Answer**:
A lightweight thread managed by the Go runtime.

---

## Question: Write a channel fan-in
**Type**: Code

Merge two channels.

**Answer**:
```go
// select over both inputs
func merge(a, b <-chan int) <-chan int { return nil }
```
"#;

    mod progressive_tests {
        use super::*;

        #[test]
        fn full_concept_round_trip() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let graph = &outcome.graph;

            assert_eq!(outcome.format, ImportFormat::Progressive);
            assert_eq!(graph.topics.len(), 1);
            assert_eq!(graph.concepts.len(), 1);

            let concept = &graph.concepts[0];
            assert_eq!(concept.tags.len(), 2);
            assert!(concept.tags.contains("a") && concept.tags.contains("b"));
            assert_eq!(concept.estimated_minutes, Some(10));
            assert_eq!(concept.resources.len(), 1);
            assert_eq!(concept.related, vec!["CEI Pattern".to_string()]);

            let levels: Vec<u32> = graph.questions.iter().map(|q| q.level).collect();
            assert_eq!(levels, vec![1, 2, 3]);
            assert!(graph
                .questions
                .iter()
                .all(|q| q.concept_id == Some(concept.id)));
        }

        #[test]
        fn resource_fields_are_split() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let resource = &outcome.graph.concepts[0].resources[0];
            assert_eq!(resource.kind, ResourceKind::Video);
            assert_eq!(resource.url, "https://youtube.com/watch?v=abc");
            assert_eq!(resource.title, "Smart Contract Programmer Tutorial");
        }

        #[test]
        fn prompt_and_answer_are_separated() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let first = &outcome.graph.questions[0];
            assert_eq!(first.title, "Reentrancy Attacks - What is reentrancy?");
            assert_eq!(first.prompt, "Explain what a reentrancy attack is.");
            assert!(first.answer.starts_with("An external contract"));
        }

        #[test]
        fn last_answer_stops_at_resources() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let last = &outcome.graph.questions[2];
            assert_eq!(last.answer, "Shared state across contracts; protect with global locks.");
        }

        #[test]
        fn levels_chain_to_their_parent() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let q = &outcome.graph.questions;
            assert_eq!(q[0].parent_id, None);
            assert_eq!(q[1].parent_id, Some(q[0].id));
            assert_eq!(q[2].parent_id, Some(q[1].id));
        }

        #[test]
        fn difficulty_derives_from_level() {
            let outcome = parse(PROGRESSIVE).unwrap();
            let difficulties: Vec<Difficulty> =
                outcome.graph.questions.iter().map(|q| q.difficulty).collect();
            assert_eq!(
                difficulties,
                vec![Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
            );
        }

        #[test]
        fn unresolved_related_concept_is_a_warning() {
            let outcome = parse(PROGRESSIVE).unwrap();
            assert_eq!(
                outcome.warnings,
                vec![ParseWarning::DanglingRelatedConcept {
                    concept: "Reentrancy Attacks".to_string(),
                    target: "CEI Pattern".to_string(),
                }]
            );
        }

        #[test]
        fn related_concept_in_same_document_resolves() {
            let text = "# T\n## Concept: A\n### Level 1: a\nq\nAnswer: x\nRelated Concepts: B\n## Concept: B\n### Level 1: b\nq\nAnswer: y\n";
            let outcome = parse(text).unwrap();
            assert!(outcome.warnings.is_empty());
            assert_eq!(outcome.graph.concepts.len(), 2);
        }

        #[test]
        fn explicit_difficulty_overrides_level() {
            let text = "# T\n## Concept: A\n### Level 1: a\nDifficulty: Hard\nq\nAnswer: x\n";
            let outcome = parse(text).unwrap();
            assert_eq!(outcome.graph.questions[0].difficulty, Difficulty::Hard);
        }
    }

    mod flat_tests {
        use super::*;

        #[test]
        fn questions_with_metadata() {
            let outcome = parse(FLAT).unwrap();
            assert_eq!(outcome.format, ImportFormat::Flat);
            assert!(outcome.warnings.is_empty());

            let q = &outcome.graph.questions;
            assert_eq!(q.len(), 2);
            assert_eq!(q[0].title, "What is a goroutine?");
            assert_eq!(q[0].difficulty, Difficulty::Easy);
            assert_eq!(q[0].content_type, ContentType::Text);
            assert_eq!(q[0].prompt, "Describe goroutines.");
            assert_eq!(q[0].level, 1);
            assert!(q[0].concept_id.is_none());
        }

        #[test]
        fn missing_difficulty_defaults_to_medium() {
            let outcome = parse(FLAT).unwrap();
            let second = &outcome.graph.questions[1];
            assert_eq!(second.difficulty, Difficulty::Medium);
            assert_eq!(second.content_type, ContentType::Code);
        }

        #[test]
        fn code_answer_keeps_comment_lines() {
            let outcome = parse(FLAT).unwrap();
            let second = &outcome.graph.questions[1];
            assert!(second.answer.starts_with("```go"));
            assert!(second.answer.contains("// select over both inputs"));
            assert_eq!(outcome.graph.topics.len(), 1);
        }

        #[test]
        fn inline_answer_text() {
            let outcome = parse("# T\n## Question: Q\nprompt\nAnswer: short answer").unwrap();
            assert_eq!(outcome.graph.questions[0].answer, "short answer");
        }

        #[test]
        fn unknown_difficulty_falls_back_with_warning() {
            let outcome =
                parse("# T\n## Question: Q\nDifficulty: Brutal\nprompt\nAnswer: a").unwrap();
            assert_eq!(outcome.graph.questions[0].difficulty, Difficulty::Medium);
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::UnknownMetadata { line: 3, .. }
            ));
        }

        #[test]
        fn topic_preamble_becomes_description() {
            let outcome =
                parse("# Topic: Go\nConcurrency primitives.\n## Question: Q\np\nAnswer: a")
                    .unwrap();
            assert_eq!(
                outcome.graph.topics[0].description.as_deref(),
                Some("Concurrency primitives.")
            );
        }

        #[test]
        fn repeated_topic_header_reuses_topic() {
            let text = "# Topic: A\n## Question: 1\nAnswer: x\n# Topic: B\n## Question: 2\nAnswer: y\n# Topic: A\n## Question: 3\nAnswer: z";
            let outcome = parse(text).unwrap();
            assert_eq!(outcome.graph.topics.len(), 2);
            assert_eq!(outcome.graph.questions_in_topic(1).count(), 2);
            assert_eq!(outcome.graph.questions_in_topic(2).count(), 1);
        }

        #[test]
        fn heading_inside_an_answer_stays_in_the_answer() {
            let text = "# Topic: Rust\n## Question: Markdown headings\n**Answer**:\nStart a line with a hash:\n# Heading\nthat is all.\n\n## Question: Second\nAnswer: b";
            let outcome = parse(text).unwrap();
            let q = &outcome.graph.questions;
            assert_eq!(outcome.graph.topics.len(), 1);
            assert_eq!(q[0].answer, "Start a line with a hash:\n# Heading\nthat is all.");
            assert_eq!(q[1].topic_id, 1);
            assert!(outcome.warnings.is_empty());
        }

        #[test]
        fn bare_heading_only_names_the_topic_up_front() {
            let text = "# Notes\n## Question: Q\nprompt\n**Answer**:\nfirst\n# Later heading\nsecond";
            let outcome = parse(text).unwrap();
            assert_eq!(outcome.graph.topics.len(), 1);
            assert_eq!(outcome.graph.topics[0].name, "Notes");
            assert_eq!(outcome.graph.questions[0].answer, "first\n# Later heading\nsecond");
        }

        #[test]
        fn metadata_shaped_answer_lines_are_kept() {
            let text = "# T\n## Question: Struct fields\nWhat does each part mean?\n**Answer**:\nName: the identifier\nType: the field's type\nTags: optional struct tags";
            let outcome = parse(text).unwrap();
            let q = &outcome.graph.questions[0];
            assert_eq!(
                q.answer,
                "Name: the identifier\nType: the field's type\nTags: optional struct tags"
            );
            assert_eq!(q.content_type, ContentType::Text);
            assert!(outcome.warnings.is_empty());
        }

        #[test]
        fn answer_made_of_a_metadata_line() {
            let outcome = parse("# T\n## Question: Q\nprompt\nAnswer:\nType: Code").unwrap();
            let q = &outcome.graph.questions[0];
            assert_eq!(q.answer, "Type: Code");
            assert_eq!(q.content_type, ContentType::Text);
        }

        #[test]
        fn metadata_after_prompt_text_is_prompt() {
            let text = "# T\n## Question: Q\nDifficulty: Easy\nFill in the blank.\nDifficulty: ____\nAnswer: a";
            let outcome = parse(text).unwrap();
            let q = &outcome.graph.questions[0];
            assert_eq!(q.difficulty, Difficulty::Easy);
            assert_eq!(q.prompt, "Fill in the blank.\nDifficulty: ____");
            assert!(outcome.warnings.is_empty());
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn empty_document() {
            assert_eq!(parse("").unwrap_err(), ParseError::EmptyDocument);
            assert_eq!(
                parse("just some text\nwithout headers").unwrap_err(),
                ParseError::EmptyDocument
            );
        }

        #[test]
        fn level_without_answer_is_fatal() {
            let text = "# T\n## Concept: C\n### Level 1: first\nA prompt with no answer.\n### Level 2: second\np\nAnswer: a";
            assert_eq!(
                parse(text).unwrap_err(),
                ParseError::MissingAnswer {
                    title: "C - first".to_string(),
                    line: 3,
                }
            );
        }

        #[test]
        fn final_question_without_answer_is_fatal() {
            let err = parse("# T\n## Question: Q\nprompt only").unwrap_err();
            assert!(matches!(err, ParseError::MissingAnswer { line: 2, .. }));
        }

        #[test]
        fn empty_answer_counts_as_missing() {
            let err = parse("# T\n## Question: Q\nprompt\n**Answer**:\n\n---").unwrap_err();
            assert!(matches!(err, ParseError::MissingAnswer { .. }));
        }

        #[test]
        fn concept_without_levels_is_fatal() {
            let err = parse("# T\n## Concept: Hollow\nTags: x").unwrap_err();
            assert_eq!(
                err,
                ParseError::MissingAnswer {
                    title: "Hollow".to_string(),
                    line: 2,
                }
            );
        }

        #[test]
        fn units_before_a_topic_are_skipped() {
            let outcome = parse("## Question: Early\nno answer here\n# Topic: T\n## Question: Q\nAnswer: a").unwrap();
            assert_eq!(outcome.graph.questions.len(), 1);
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::StrayContent { line: 1, .. }
            ));
        }
    }

    mod warning_tests {
        use super::*;

        #[test]
        fn malformed_resource_is_skipped() {
            let text = "# T\n## Concept: C\n### Level 1: a\nq\nAnswer: x\nResources:\n- Video https://x.io - missing brackets\n- [Podcast] https://p.io - Unknown kind\n- [Docs] https://d.io - Good";
            let outcome = parse(text).unwrap();
            let resources = &outcome.graph.concepts[0].resources;
            assert_eq!(resources.len(), 1);
            assert_eq!(resources[0].kind, ResourceKind::Docs);
            let malformed = outcome
                .warnings
                .iter()
                .filter(|w| matches!(w, ParseWarning::MalformedResource { .. }))
                .count();
            assert_eq!(malformed, 2);
        }

        #[test]
        fn level_gap_is_tolerated() {
            let text = "# T\n## Concept: C\n### Level 1: a\nq\nAnswer: x\n### Level 3: c\nq\nAnswer: z";
            let outcome = parse(text).unwrap();
            let levels: Vec<u32> = outcome.graph.questions.iter().map(|q| q.level).collect();
            assert_eq!(levels, vec![1, 3]);
            assert_eq!(
                outcome.warnings,
                vec![ParseWarning::LevelGap {
                    concept: "C".to_string(),
                    line: 6,
                    expected: 2,
                    found: 3,
                }]
            );
        }

        #[test]
        fn first_level_other_than_one_is_a_gap() {
            let text = "# T\n## Concept: C\n### Level 2: b\nq\nAnswer: x";
            let outcome = parse(text).unwrap();
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::LevelGap { expected: 1, found: 2, .. }
            ));
        }

        #[test]
        fn repeated_level_is_dropped() {
            let text = "# T\n## Concept: C\n### Level 1: a\nq\nAnswer: x\n### Level 1: again\nq\nAnswer: y\n### Level 2: b\nq\nAnswer: z";
            let outcome = parse(text).unwrap();
            let q = &outcome.graph.questions;
            assert_eq!(q.len(), 2);
            assert_eq!(q[1].level, 2);
            assert_eq!(q[1].parent_id, Some(q[0].id));
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::LevelOutOfOrder { found: 1, .. }
            ));
        }

        #[test]
        fn level_zero_is_skipped() {
            let text = "# T\n## Concept: C\n### Level 0: zero\nq\nAnswer: x\n### Level 1: a\nq\nAnswer: y";
            let outcome = parse(text).unwrap();
            let q = &outcome.graph.questions;
            assert_eq!(q.len(), 1);
            assert_eq!(q[0].level, 1);
            assert_eq!(q[0].parent_id, None);
            assert_eq!(
                outcome.warnings,
                vec![ParseWarning::LevelOutOfOrder {
                    concept: "C".to_string(),
                    line: 3,
                    found: 0,
                }]
            );
        }

        #[test]
        fn question_header_in_progressive_document_is_text() {
            let text = "# T\n## Concept: C\n### Level 1: a\nq\n## Question: sneaky\nAnswer: x";
            let outcome = parse(text).unwrap();
            assert_eq!(outcome.graph.questions.len(), 1);
            assert_eq!(outcome.graph.questions[0].prompt, "q\n## Question: sneaky");
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::ForeignHeader { line: 5, .. }
            ));
        }

        #[test]
        fn tags_in_flat_document_are_stray() {
            let outcome = parse("# T\n## Question: Q\nTags: x\nAnswer: a").unwrap();
            assert!(matches!(
                outcome.warnings[0],
                ParseWarning::StrayContent { line: 3, .. }
            ));
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn minutes_in_several_spellings() {
            assert_eq!(parse_minutes("20 minutes"), Some(20));
            assert_eq!(parse_minutes("15 min"), Some(15));
            assert_eq!(parse_minutes("5"), Some(5));
            assert_eq!(parse_minutes("2 hours"), Some(120));
            assert_eq!(parse_minutes("a while"), None);
        }

        #[test]
        fn list_splitting_drops_blanks() {
            assert_eq!(split_list(" a, b ,, c "), vec!["a", "b", "c"]);
        }
    }
}
