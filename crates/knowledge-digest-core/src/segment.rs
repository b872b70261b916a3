//! Markdown topic segmentation.
//!
//! A document is split into topics using the first applicable of three
//! formats; documents are never treated as mixed-format.
//!
//! | Format | Applicable when | Section title |
//! |--------|-----------------|---------------|
//! | [`SegmentFormat::HorizontalRule`] | blank-separated `---` lines yield ≥ 2 sections | first line of the section |
//! | [`SegmentFormat::Headings`] | at least one `## ` line | the `## ` line |
//! | [`SegmentFormat::Paragraphs`] | always | a title-like first line of a paragraph |
//!
//! Every emitted section is emoji-stripped, title-normalized, and
//! classified with `(hint, title, content)` as scoring input.

use regex::Regex;
use std::sync::OnceLock;

use crate::classify::Classifier;
use crate::markdown::split_frontmatter;
use crate::models::ParsedTopic;
use crate::title::{normalize_title_with, strip_emoji, truncate_chars, SHORT_TITLE_MAX_CHARS};

/// Sections with less content than this (characters) are dropped.
const MIN_SECTION_CONTENT_CHARS: usize = 10;
/// Paragraph-format topics are emitted only once they reach this size.
const MIN_PARAGRAPH_TOPIC_CHARS: usize = 50;
/// A colon prefix shorter than this becomes the category hint.
const MAX_HINT_PREFIX_CHARS: usize = 20;
/// Title-like lines containing a colon must be shorter than this.
const MAX_COLON_TITLE_CHARS: usize = 80;
const SHORT_TITLE_RANGE: std::ops::RangeInclusive<usize> = 5..=30;

/// Default importance for topics that come from uploads.
pub const DEFAULT_IMPORTANCE: u8 = 3;

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^【([^】]+)】\s*(.*)$").expect("valid bracket regex"))
}

/// Which strategy split the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFormat {
    HorizontalRule,
    Headings,
    Paragraphs,
}

/// A section before emoji stripping, normalization, and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub hint: String,
    pub title: String,
    pub content: String,
}

/// Splits documents into classified [`ParsedTopic`]s.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter<'a> {
    classifier: Classifier<'a>,
    title_max_chars: usize,
}

impl<'a> Segmenter<'a> {
    pub fn new(classifier: Classifier<'a>, title_max_chars: usize) -> Self {
        Self {
            classifier,
            title_max_chars,
        }
    }

    /// Split without classifying. Frontmatter is ignored.
    pub fn split(&self, document: &str) -> (SegmentFormat, Vec<RawSection>) {
        let (_, body) = split_frontmatter(document);
        let body = body.replace("\r\n", "\n");

        if let Some(sections) = split_horizontal_rules(&body) {
            return (SegmentFormat::HorizontalRule, sections);
        }
        if let Some(sections) = split_headings(&body) {
            return (SegmentFormat::Headings, sections);
        }
        (
            SegmentFormat::Paragraphs,
            split_paragraphs(&body, |prefix| {
                self.classifier.resolve_manual(prefix).is_some()
            }),
        )
    }

    /// Split, normalize, and classify.
    pub fn segment(&self, document: &str) -> Vec<ParsedTopic> {
        let (format, sections) = self.split(document);
        tracing::debug!(?format, sections = sections.len(), "segmented document");
        sections
            .into_iter()
            .filter_map(|s| self.to_topic(s))
            .collect()
    }

    fn to_topic(&self, section: RawSection) -> Option<ParsedTopic> {
        let content = section.content.trim().to_string();
        if content.is_empty() {
            return None;
        }
        let hint = strip_emoji(&section.hint);

        let mut title = normalize_title_with(&strip_emoji(&section.title), self.title_max_chars);
        if title.is_empty() {
            let first_line = content.lines().next().unwrap_or_default();
            title = normalize_title_with(&strip_emoji(first_line), SHORT_TITLE_MAX_CHARS);
        }
        if title.is_empty() {
            title = truncate_chars(&content, SHORT_TITLE_MAX_CHARS);
        }

        let mut topic = ParsedTopic {
            id: ParsedTopic::make_id(&title, &content),
            title,
            content,
            raw_category_hint: hint,
            suggested_category_slug: String::new(),
            suggested_category_name: String::new(),
            confidence: 0.0,
            importance: DEFAULT_IMPORTANCE,
            tags: Vec::new(),
            source_message_ids: Vec::new(),
        };
        self.classifier
            .classify_topic(&topic.raw_category_hint, &topic.title, &topic.content)
            .apply_to(&mut topic);
        Some(topic)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_blank(line: Option<&&str>) -> bool {
    line.map_or(true, |l| l.trim().is_empty())
}

/// A standalone `---` with a blank line (or the document edge) on both sides.
fn is_rule_line(lines: &[&str], idx: usize) -> bool {
    lines[idx].trim() == "---"
        && (idx == 0 || is_blank(lines.get(idx - 1)))
        && is_blank(lines.get(idx + 1))
}

/// Split `hint：title` when the prefix is short enough.
fn split_colon_hint(title: &str) -> Option<(String, String)> {
    let idx = title.find([':', '：'])?;
    let colon_len = title[idx..].chars().next().map_or(1, char::len_utf8);
    let prefix = title[..idx].trim();
    let rest = title[idx + colon_len..].trim();
    if prefix.is_empty() || rest.is_empty() || rest.starts_with('/') {
        return None;
    }
    if char_len(prefix) >= MAX_HINT_PREFIX_CHARS {
        return None;
    }
    Some((prefix.to_string(), rest.to_string()))
}

fn strip_heading_marks(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim()
}

fn split_horizontal_rules(body: &str) -> Option<Vec<RawSection>> {
    let lines: Vec<&str> = body.lines().collect();
    let mut chunks: Vec<Vec<&str>> = vec![Vec::new()];
    for (idx, &line) in lines.iter().enumerate() {
        if is_rule_line(&lines, idx) {
            chunks.push(Vec::new());
        } else if let Some(current) = chunks.last_mut() {
            current.push(line);
        }
    }
    let chunks: Vec<Vec<&str>> = chunks
        .into_iter()
        .filter(|c| c.iter().any(|l| !l.trim().is_empty()))
        .collect();
    if chunks.len() < 2 {
        return None;
    }

    let sections = chunks
        .into_iter()
        .filter_map(|lines| {
            let mut iter = lines.into_iter().skip_while(|l| l.trim().is_empty());
            let title_line = strip_heading_marks(iter.next()?).to_string();
            let content = iter.collect::<Vec<_>>().join("\n").trim().to_string();
            if char_len(&content) < MIN_SECTION_CONTENT_CHARS {
                return None;
            }
            let title = strip_emoji(&title_line);
            let (hint, title) = split_colon_hint(&title).unwrap_or((String::new(), title));
            Some(RawSection {
                hint,
                title,
                content,
            })
        })
        .collect();
    Some(sections)
}

/// Parse a `## ` header into `(hint, title)`.
fn parse_heading(header: &str) -> (String, String) {
    let header = strip_emoji(header);
    if let Some((hint, title)) = header.split_once(['|', '｜']) {
        let (hint, title) = (hint.trim(), title.trim());
        if !hint.is_empty() && !title.is_empty() {
            return (hint.to_string(), title.to_string());
        }
    }
    if let Some(caps) = bracket_regex().captures(&header) {
        let title = caps[2].trim();
        if !title.is_empty() {
            return (caps[1].trim().to_string(), title.to_string());
        }
    }
    (String::new(), header.trim().to_string())
}

fn flush_heading(current: Option<(String, Vec<&str>)>, sections: &mut Vec<RawSection>) {
    let Some((header, lines)) = current else {
        return;
    };
    let content = lines.join("\n").trim().to_string();
    if char_len(&content) >= MIN_SECTION_CONTENT_CHARS {
        let (hint, title) = parse_heading(&header);
        sections.push(RawSection {
            hint,
            title,
            content,
        });
    }
}

fn split_headings(body: &str) -> Option<Vec<RawSection>> {
    if !body.lines().any(|l| l.starts_with("## ")) {
        return None;
    }

    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in body.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            flush_heading(current.take(), &mut sections);
            current = Some((header.to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    flush_heading(current.take(), &mut sections);

    Some(sections)
}

/// Whether a paragraph's first line reads like a topic title.
pub fn is_title_like(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    let len = char_len(line);
    let has_colon = line.contains([':', '：']);
    if has_colon && len < MAX_COLON_TITLE_CHARS {
        return true;
    }
    SHORT_TITLE_RANGE.contains(&len) && !line.contains(['。', '.'])
}

#[derive(Debug)]
enum ParagraphState {
    Preamble,
    InTopic { section: RawSection },
}

fn split_paragraphs(body: &str, is_category: impl Fn(&str) -> bool) -> Vec<RawSection> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let emit = |state: ParagraphState, out: &mut Vec<RawSection>| {
        if let ParagraphState::InTopic { mut section } = state {
            section.content = section.content.trim().to_string();
            if char_len(&section.content) >= MIN_PARAGRAPH_TOPIC_CHARS {
                out.push(section);
            }
        }
    };

    let mut sections = Vec::new();
    let mut state = ParagraphState::Preamble;
    for para in paragraphs {
        let first = strip_heading_marks(para[0]);
        if is_title_like(first) {
            emit(state, &mut sections);
            let title = strip_emoji(first);
            let (hint, title) = match split_colon_hint(&title) {
                Some((prefix, rest)) if is_category(&prefix) => (prefix, rest),
                _ => (String::new(), title),
            };
            state = ParagraphState::InTopic {
                section: RawSection {
                    hint,
                    title,
                    content: para[1..].join("\n"),
                },
            };
            continue;
        }
        state = match state {
            ParagraphState::Preamble => ParagraphState::Preamble,
            ParagraphState::InTopic { mut section } => {
                if !section.content.is_empty() {
                    section.content.push_str("\n\n");
                }
                section.content.push_str(&para.join("\n"));
                ParagraphState::InTopic { section }
            }
        };
    }
    emit(state, &mut sections);

    sections
}
