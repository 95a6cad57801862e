//! Line-anchored splitting of an import document into typed blocks.
//!
//! Nothing here interprets what a block means; the parser does that.

use lazy_regex::{regex_captures, regex_is_match};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    Difficulty,
    Type,
    Tags,
    EstimatedTime,
}

impl MetaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Difficulty => "Difficulty",
            MetaKey::Type => "Type",
            MetaKey::Tags => "Tags",
            MetaKey::EstimatedTime => "Estimated Time",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    TopicHeader(&'a str),
    ConceptHeader(&'a str),
    QuestionHeader(&'a str),
    LevelHeader { number: u32, title: &'a str },
    Metadata { key: MetaKey, value: &'a str },
    /// Carries any text written on the marker line itself.
    AnswerMarker(&'a str),
    ResourcesMarker,
    ResourceLine(&'a str),
    RelatedConcepts(&'a str),
    Rule,
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// 1-based line the block starts on.
    pub line: usize,
    pub block: Block<'a>,
}

/// Position relative to the current question or level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Outline,
    /// After a question or level header, before its first line of text.
    UnitHead,
    Prompt,
    Answer,
}

impl Zone {
    fn after(self, block: &Block<'_>) -> Zone {
        match block {
            Block::QuestionHeader(_) | Block::LevelHeader { .. } => Zone::UnitHead,
            Block::AnswerMarker(_) => Zone::Answer,
            Block::Metadata { .. } => self,
            _ => Zone::Outline,
        }
    }

    fn after_text(self) -> Zone {
        match self {
            Zone::UnitHead => Zone::Prompt,
            other => other,
        }
    }

    fn takes_metadata(self) -> bool {
        matches!(self, Zone::Outline | Zone::UnitHead)
    }
}

struct BodySpan<'a> {
    start: usize,
    lines: Vec<&'a str>,
}

impl<'a> BodySpan<'a> {
    fn flush_into(&mut self, tokens: &mut Vec<Token<'a>>) {
        let lines = std::mem::take(&mut self.lines);
        let first = lines.iter().position(|l| !l.trim().is_empty());
        let last = lines.iter().rposition(|l| !l.trim().is_empty());
        if let (Some(first), Some(last)) = (first, last) {
            tokens.push(Token {
                line: self.start + first,
                block: Block::Body(lines[first..=last].join("\n")),
            });
        }
    }

    fn push(&mut self, line_no: usize, line: &'a str) {
        if self.lines.is_empty() {
            self.start = line_no;
        }
        self.lines.push(line);
    }
}

pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut body = BodySpan {
        start: 1,
        lines: Vec::new(),
    };
    let mut fence: Option<&str> = None;
    let mut in_resources = false;
    let mut zone = Zone::Outline;
    // A bare `# X` names the topic only in documents without `# Topic:` lines,
    // and only before the first concept or question.
    let mut bare_topics = !declares_topic(text);

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(open) = fence {
            body.push(line_no, line);
            if line.trim_start().starts_with(open) {
                fence = None;
            }
            continue;
        }

        if let Some(open) = fence_marker(line) {
            in_resources = false;
            fence = Some(open);
            zone = zone.after_text();
            body.push(line_no, line);
            continue;
        }

        if in_resources {
            if line.trim().is_empty() {
                continue;
            }
            if let Some((_, item)) = regex_captures!(r"^\s*[-*+]\s+(.*?)\s*$", line) {
                body.flush_into(&mut tokens);
                tokens.push(Token {
                    line: line_no,
                    block: Block::ResourceLine(item),
                });
                continue;
            }
            in_resources = false;
        }

        match classify(line, zone, bare_topics) {
            Some(block) => {
                body.flush_into(&mut tokens);
                in_resources = matches!(block, Block::ResourcesMarker);
                if matches!(
                    block,
                    Block::ConceptHeader(_) | Block::QuestionHeader(_) | Block::LevelHeader { .. }
                ) {
                    bare_topics = false;
                }
                zone = zone.after(&block);
                tokens.push(Token {
                    line: line_no,
                    block,
                });
            }
            None => {
                if !line.trim().is_empty() {
                    zone = zone.after_text();
                }
                body.push(line_no, line);
            }
        }
    }

    body.flush_into(&mut tokens);
    tokens
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn declares_topic(text: &str) -> bool {
    let mut fence: Option<&str> = None;
    text.lines().any(|line| {
        if let Some(open) = fence {
            if line.trim_start().starts_with(open) {
                fence = None;
            }
            return false;
        }
        fence = fence_marker(line);
        fence.is_none() && regex_is_match!(r"(?i)^#\s+topic\s*:", line)
    })
}

fn classify(line: &str, zone: Zone, bare_topics: bool) -> Option<Block<'_>> {
    if let Some((_, name)) = regex_captures!(r"(?i)^##\s+concept\s*:\s*(.+?)\s*$", line) {
        return Some(Block::ConceptHeader(name));
    }
    if let Some((_, title)) = regex_captures!(r"(?i)^##\s+question\s*:\s*(.+?)\s*$", line) {
        return Some(Block::QuestionHeader(title));
    }
    if let Some((_, number, title)) =
        regex_captures!(r"(?i)^###\s+level\s+(\d+)\s*:?\s*(.*?)\s*$", line)
    {
        if let Ok(number) = number.parse() {
            return Some(Block::LevelHeader { number, title });
        }
    }
    if let Some((_, name)) = regex_captures!(r"(?i)^#\s+topic\s*:\s*(.+?)\s*$", line) {
        return Some(Block::TopicHeader(name));
    }
    if bare_topics {
        if let Some((_, name)) = regex_captures!(r"^#\s+(.+?)\s*$", line) {
            return Some(Block::TopicHeader(name));
        }
    }
    if regex_captures!(r"^\s*-{3,}\s*$", line).is_some() {
        return Some(Block::Rule);
    }

    let (_, key, value) = regex_captures!(
        r"(?i)^\s*(?:\*\*)?(difficulty|type|tags|estimated time|answer|resources|related concepts)(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*?)\s*$",
        line
    )?;
    let block = match key.to_lowercase().as_str() {
        "difficulty" => Block::Metadata {
            key: MetaKey::Difficulty,
            value,
        },
        "type" => Block::Metadata {
            key: MetaKey::Type,
            value,
        },
        "tags" => Block::Metadata {
            key: MetaKey::Tags,
            value,
        },
        "estimated time" => Block::Metadata {
            key: MetaKey::EstimatedTime,
            value,
        },
        "answer" => Block::AnswerMarker(value),
        "resources" => Block::ResourcesMarker,
        _ => Block::RelatedConcepts(value),
    };
    let structural = match block {
        Block::Metadata { .. } => zone.takes_metadata(),
        Block::AnswerMarker(_) => zone != Zone::Answer,
        _ => true,
    };
    structural.then_some(block)
}
