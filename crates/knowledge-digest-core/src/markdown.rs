//! Small Markdown helpers: frontmatter, headings, slugs, and body cleanup.

use sha2::{Digest, Sha256};

/// Maximum slug length in characters.
const MAX_SLUG_CHARS: usize = 60;

/// Ordered `key: value` frontmatter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    entries: Vec<(String, String)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing an existing value in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `---\nkey: value\n---\n`.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (k, v) in &self.entries {
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&quote_value(v));
            out.push('\n');
        }
        out.push_str("---\n");
        out
    }
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains([':', '"', '#', '\''])
        || value.trim() != value
        || value.starts_with(['-', '[', '{', '>', '|', '*', '&', '!', '%', '@', '`']);
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn unquote_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\");
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].replace("''", "'");
    }
    raw.to_string()
}

fn is_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split a leading frontmatter block from the body.
///
/// The block is only recognized when every non-empty line inside it looks
/// like `key: value`; otherwise a leading `---` is treated as content.
pub fn split_frontmatter(doc: &str) -> (Option<Frontmatter>, &str) {
    let mut lines = doc.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (None, doc),
    }

    let mut offset = doc.find('\n').map_or(doc.len(), |i| i + 1);
    let mut fm = Frontmatter::new();
    for line in lines {
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed == "---" {
            return (Some(fm), &doc[offset..]);
        }
        if trimmed.trim().is_empty() {
            continue;
        }
        match trimmed.split_once(':') {
            Some((k, v)) if is_key(k.trim()) => fm.set(k.trim(), unquote_value(v)),
            _ => return (None, doc),
        }
    }
    (None, doc)
}

/// Text of the first `# ` heading, if any.
pub fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// URL-safe slug that keeps Unicode letters and digits.
///
/// Falls back to `topic-<hash>` when nothing usable remains.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("topic-{}", &hash[..8])
    } else {
        slug
    }
}

/// Clean a topic body for embedding into a knowledge document.
///
/// Trims, drops a leading heading that repeats `title`, pushes headings of
/// level 1–3 down to level 4 so they cannot collide with merge markers,
/// and collapses runs of blank lines. Fenced code blocks are left alone.
pub fn normalize_body(content: &str, title: &str) -> String {
    let mut lines: Vec<&str> = content.trim().lines().collect();
    if let Some(first) = lines.first() {
        let heading_text = first.trim_start_matches('#').trim();
        if first.starts_with('#') && heading_text == title.trim() {
            lines.remove(0);
        }
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_fence = false;
    let mut blank_run = 0;
    for line in lines {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push(String::new());
            continue;
        }
        blank_run = 0;
        if !in_fence {
            let level = line.chars().take_while(|c| *c == '#').count();
            if (1..=3).contains(&level) && line[level..].starts_with(' ') {
                out.push(format!("####{}", &line[level..]));
                continue;
            }
        }
        out.push(line.trim_end().to_string());
    }

    out.join("\n").trim().to_string()
}
