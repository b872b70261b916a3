//! Knowledge merge engine.
//!
//! For each topic the engine decides between merging into an existing
//! knowledge document and creating a new one:
//!
//! 1. an explicit target supplied by the caller, else
//! 2. the best-scoring [`KnowledgeIndexEntry`] whose Jaccard similarity
//!    (topic title + content prefix vs. entry title) exceeds the threshold,
//!    else
//! 3. a new document at `<category>/<slug>.md`.
//!
//! Any failure to merge falls back to creation.
//!
//! # Merge markers
//!
//! Every merged section starts with
//!
//! ```text
//! ## 来自 2024-11-01 日报
//!
//! ### <normalized title>
//! ```
//!
//! The presence of that pair for a `(date, title)` makes the merge a no-op,
//! so re-running a report never duplicates content. Newly created documents
//! carry the marker for their originating date as well.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::{DigestError, StoreError};
use crate::markdown::{first_heading, normalize_body, slugify, split_frontmatter, Frontmatter};
use crate::models::{KnowledgeIndexEntry, MergeCandidate, ParsedTopic, RunReport, TopicOutcome};
use crate::store::{normalize_path, DocumentStore};
use crate::taxonomy::Taxonomy;
use crate::title::{normalize_title_with, truncate_chars, DEFAULT_TITLE_MAX_CHARS};
use crate::tokenize::{similarity, tokenize};

/// Auto-merge threshold for Markdown uploads.
pub const UPLOAD_MERGE_THRESHOLD: f64 = 0.4;
/// Auto-merge threshold for chat digests.
pub const DIGEST_MERGE_THRESHOLD: f64 = 0.55;
/// How much topic content joins the title when matching.
pub const CONTENT_PREFIX_CHARS: usize = 400;
pub const DEFAULT_MANIFEST_NAME: &str = "meta.json";
/// Directory for topics without a category.
pub const FALLBACK_CATEGORY_SLUG: &str = "misc";

const DESCRIPTION_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeSettings {
    /// A candidate must score strictly above this to be merged into.
    pub threshold: f64,
    pub content_prefix_chars: usize,
    pub title_max_chars: usize,
    pub url_prefix: String,
    pub manifest_name: String,
    pub fallback_category: String,
}

impl MergeSettings {
    pub fn upload() -> Self {
        Self {
            threshold: UPLOAD_MERGE_THRESHOLD,
            content_prefix_chars: CONTENT_PREFIX_CHARS,
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            url_prefix: "/docs".to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            fallback_category: FALLBACK_CATEGORY_SLUG.to_string(),
        }
    }

    pub fn digest() -> Self {
        Self {
            threshold: DIGEST_MERGE_THRESHOLD,
            ..Self::upload()
        }
    }
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self::upload()
    }
}

/// Result of appending a topic to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeWrite {
    Appended,
    AlreadyPresent,
}

/// What merging a topic into a path would do, without writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePreview {
    Missing,
    Append,
    AlreadyPresent,
}

fn date_heading(date: NaiveDate) -> String {
    format!("## 来自 {} 日报", date.format("%Y-%m-%d"))
}

/// The marker pair recording that `title` was merged from `date`'s report.
pub fn merge_marker(date: NaiveDate, title: &str) -> String {
    format!("{}\n\n### {}", date_heading(date), title)
}

/// Whether `doc` already holds `### title` inside the `date` section.
pub fn contains_marker(doc: &str, date: NaiveDate, title: &str) -> bool {
    let date_line = date_heading(date);
    let title_line = format!("### {title}");
    let mut in_section = false;
    for line in doc.lines() {
        let line = line.trim_end();
        if line.starts_with("## ") {
            in_section = line == date_line;
        } else if in_section && line == title_line {
            return true;
        }
    }
    false
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    strip_document_ext(name)
}

fn strip_document_ext(path: &str) -> &str {
    path.strip_suffix(".mdx")
        .or_else(|| path.strip_suffix(".md"))
        .unwrap_or(path)
}

/// `<url_prefix>/<path without extension>`.
pub fn document_url(url_prefix: &str, path: &str) -> String {
    format!(
        "{}/{}",
        url_prefix.trim_end_matches('/'),
        strip_document_ext(path)
    )
}

/// Index entry for one document: frontmatter title, else first `# `
/// heading, else file stem.
pub fn index_entry(path: &str, content: &str, url_prefix: &str) -> KnowledgeIndexEntry {
    let (frontmatter, body) = split_frontmatter(content);
    let title = frontmatter
        .as_ref()
        .and_then(|fm| fm.get("title"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| first_heading(body))
        .unwrap_or_else(|| file_stem(path).to_string());
    KnowledgeIndexEntry {
        title,
        url: document_url(url_prefix, path),
        file_path: path.to_string(),
    }
}

/// Creates and merges knowledge documents through a [`DocumentStore`].
pub struct MergeEngine<'a> {
    store: &'a dyn DocumentStore,
    taxonomy: &'a Taxonomy,
    settings: MergeSettings,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a dyn DocumentStore, taxonomy: &'a Taxonomy, settings: MergeSettings) -> Self {
        Self {
            store,
            taxonomy,
            settings,
        }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Scan every document in the store. Unreadable files are skipped.
    pub async fn build_index(&self) -> Result<Vec<KnowledgeIndexEntry>, DigestError> {
        let paths = self.store.list("").await?;
        let mut index = Vec::with_capacity(paths.len());
        for path in paths {
            match self.store.read(&path).await {
                Ok(content) => index.push(index_entry(&path, &content, &self.settings.url_prefix)),
                Err(e) => tracing::warn!(path = %path, error = %e, "skipping unreadable document"),
            }
        }
        tracing::debug!(documents = index.len(), "built knowledge index");
        Ok(index)
    }

    fn normalized_title(&self, topic: &ParsedTopic) -> String {
        normalize_title_with(&topic.title, self.settings.title_max_chars)
    }

    /// All entries with a positive score, best first.
    pub fn find_candidates(
        &self,
        topic: &ParsedTopic,
        index: &[KnowledgeIndexEntry],
    ) -> Vec<MergeCandidate> {
        let text = format!(
            "{} {}",
            topic.title,
            truncate_chars(&topic.content, self.settings.content_prefix_chars)
        );
        let topic_tokens = tokenize(&text);

        let mut candidates: Vec<MergeCandidate> = index
            .iter()
            .filter_map(|entry| {
                let score = similarity(&topic_tokens, &tokenize(&entry.title));
                (score > 0.0).then(|| MergeCandidate {
                    title: entry.title.clone(),
                    url: entry.url.clone(),
                    file_path: entry.file_path.clone(),
                    score,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// The top candidate, if it clears the threshold.
    pub fn best_match(
        &self,
        topic: &ParsedTopic,
        index: &[KnowledgeIndexEntry],
    ) -> Option<MergeCandidate> {
        let best = self.find_candidates(topic, index).into_iter().next()?;
        tracing::debug!(
            title = %topic.title,
            candidate = %best.file_path,
            score = best.score,
            threshold = self.settings.threshold,
            "best merge candidate"
        );
        (best.score > self.settings.threshold).then_some(best)
    }

    /// Append `topic` to the document at `path` unless its marker is there.
    pub async fn merge_into(
        &self,
        path: &str,
        topic: &ParsedTopic,
        date: NaiveDate,
    ) -> Result<MergeWrite, DigestError> {
        let path = normalize_path(path)?;
        let existing = self.store.read(&path).await?;
        let title = self.normalized_title(topic);

        if contains_marker(&existing, date, &title) {
            tracing::debug!(path = %path, title = %title, "marker present, merge is a no-op");
            return Ok(MergeWrite::AlreadyPresent);
        }

        let mut updated = existing.trim_end().to_string();
        if !updated.is_empty() {
            updated.push_str("\n\n");
        }
        updated.push_str(&self.render_section(topic, &title, date));
        self.store.write(&path, &updated).await?;
        Ok(MergeWrite::Appended)
    }

    /// Read-only counterpart of [`merge_into`](Self::merge_into).
    pub async fn preview_merge(
        &self,
        path: &str,
        topic: &ParsedTopic,
        date: NaiveDate,
    ) -> Result<MergePreview, DigestError> {
        let path = normalize_path(path)?;
        if !self.store.exists(&path).await? {
            return Ok(MergePreview::Missing);
        }
        let existing = self.store.read(&path).await?;
        if contains_marker(&existing, date, &self.normalized_title(topic)) {
            Ok(MergePreview::AlreadyPresent)
        } else {
            Ok(MergePreview::Append)
        }
    }

    fn render_section(&self, topic: &ParsedTopic, title: &str, date: NaiveDate) -> String {
        let mut attribution = format!("> 来源：{} 日报", date.format("%Y-%m-%d"));
        if !topic.suggested_category_name.is_empty() {
            attribution.push_str(" · ");
            attribution.push_str(&topic.suggested_category_name);
        }
        let body = normalize_body(&topic.content, title);

        let mut section = format!("{}\n\n{}\n", merge_marker(date, title), attribution);
        if !body.is_empty() {
            section.push('\n');
            section.push_str(&body);
            section.push('\n');
        }
        section
    }

    fn category_dir(&self, topic: &ParsedTopic) -> String {
        self.taxonomy
            .find_by_slug(&topic.suggested_category_slug)
            .map(|c| c.slug.clone())
            .unwrap_or_else(|| self.settings.fallback_category.clone())
    }

    /// Store path a new document for `topic` would be created at.
    pub fn document_path(&self, topic: &ParsedTopic) -> String {
        format!(
            "{}/{}.md",
            self.category_dir(topic),
            slugify(&self.normalized_title(topic))
        )
    }

    /// Write a new document for `topic` and register it in the category
    /// manifest. An existing file at the target path is merged into
    /// instead.
    pub async fn create_document(
        &self,
        topic: &ParsedTopic,
        date: NaiveDate,
    ) -> Result<TopicOutcome, DigestError> {
        let category = self.category_dir(topic);
        let title = self.normalized_title(topic);
        let slug = slugify(&title);
        let path = self.document_path(topic);
        let url = document_url(&self.settings.url_prefix, &path);

        if self.store.exists(&path).await? {
            tracing::debug!(path = %path, "document already exists, merging instead");
            return self.merge_outcome(&path, url, 1.0, topic, date).await;
        }

        let manifest = self.prepare_manifest(&category, &slug).await?;
        let document = self.render_document(topic, &title, &category, date);
        self.store.write(&path, &document).await?;
        if let Some((manifest_path, manifest)) = manifest {
            self.store.write(&manifest_path, &manifest).await?;
        }

        Ok(TopicOutcome::Created { path, url })
    }

    fn render_document(
        &self,
        topic: &ParsedTopic,
        title: &str,
        category: &str,
        date: NaiveDate,
    ) -> String {
        let description = topic
            .content
            .lines()
            .map(|l| l.trim().trim_start_matches(['#', '>']).trim())
            .find(|l| !l.is_empty())
            .map(|l| normalize_title_with(l, DESCRIPTION_MAX_CHARS))
            .unwrap_or_default();

        let mut frontmatter = Frontmatter::new();
        frontmatter.set("title", title);
        frontmatter.set("description", description);
        frontmatter.set("category", category);
        frontmatter.set("date", date.format("%Y-%m-%d").to_string());
        if !topic.tags.is_empty() {
            frontmatter.set("tags", topic.tags.join(", "));
        }

        format!(
            "{}\n{}\n\n{}\n\n> 首次收录于 {} 日报\n",
            frontmatter.render(),
            normalize_body(&topic.content, title),
            merge_marker(date, title),
            date.format("%Y-%m-%d")
        )
    }

    /// Compute the updated manifest for `category`, or `None` when `page`
    /// is already listed. Unknown keys and key order are preserved.
    async fn prepare_manifest(
        &self,
        category: &str,
        page: &str,
    ) -> Result<Option<(String, String)>, DigestError> {
        let path = format!("{category}/{}", self.settings.manifest_name);
        let manifest_error = |reason: String| DigestError::Manifest {
            path: path.clone(),
            reason,
        };

        let mut manifest = match self.store.read(&path).await {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(manifest_error("not a JSON object".to_string())),
                Err(e) => return Err(manifest_error(e.to_string())),
            },
            Err(StoreError::NotFound(_)) => self.new_manifest(category),
            Err(e) => return Err(e.into()),
        };

        let pages = manifest
            .entry("pages")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(pages) = pages else {
            return Err(manifest_error("`pages` is not an array".to_string()));
        };
        if pages.iter().any(|p| p.as_str() == Some(page)) {
            return Ok(None);
        }
        pages.push(Value::String(page.to_string()));

        let mut rendered = serde_json::to_string_pretty(&Value::Object(manifest))
            .map_err(|e| manifest_error(e.to_string()))?;
        rendered.push('\n');
        Ok(Some((path, rendered)))
    }

    fn new_manifest(&self, category: &str) -> Map<String, Value> {
        let mut map = Map::new();
        match self.taxonomy.find_by_slug(category) {
            Some(cat) => {
                map.insert("title".to_string(), Value::String(cat.name.clone()));
                if !cat.description.is_empty() {
                    map.insert(
                        "description".to_string(),
                        Value::String(cat.description.clone()),
                    );
                }
                if !cat.icon.is_empty() {
                    map.insert("icon".to_string(), Value::String(cat.icon.clone()));
                }
            }
            None => {
                map.insert("title".to_string(), Value::String(category.to_string()));
            }
        }
        map
    }

    async fn merge_outcome(
        &self,
        path: &str,
        url: String,
        score: f64,
        topic: &ParsedTopic,
        date: NaiveDate,
    ) -> Result<TopicOutcome, DigestError> {
        let outcome = match self.merge_into(path, topic, date).await? {
            MergeWrite::Appended => TopicOutcome::Merged {
                path: path.to_string(),
                url,
                score,
            },
            MergeWrite::AlreadyPresent => TopicOutcome::Skipped {
                reason: format!("already merged into {path}"),
            },
        };
        Ok(outcome)
    }

    /// Decide and apply merge-or-create for one topic. Never fails: errors
    /// become [`TopicOutcome::Failed`].
    pub async fn process_topic(
        &self,
        topic: &ParsedTopic,
        date: NaiveDate,
        explicit_target: Option<&str>,
        index: &[KnowledgeIndexEntry],
    ) -> TopicOutcome {
        if topic.content.trim().is_empty() {
            return TopicOutcome::Skipped {
                reason: "empty content".to_string(),
            };
        }

        let target = match explicit_target {
            Some(path) => Some((
                path.to_string(),
                document_url(&self.settings.url_prefix, path),
                1.0,
            )),
            None => self
                .best_match(topic, index)
                .map(|c| (c.file_path, c.url, c.score)),
        };

        if let Some((path, url, score)) = target {
            match self.merge_outcome(&path, url, score, topic, date).await {
                Ok(outcome) => return outcome,
                Err(e) => tracing::warn!(
                    target = %path,
                    error = %e,
                    "merge failed, creating a new document"
                ),
            }
        }

        match self.create_document(topic, date).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(title = %topic.title, error = %e, "topic failed");
                TopicOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Process topics in order against a freshly built index. Documents
    /// created earlier in the run are merge candidates for later topics.
    pub async fn process_topics(
        &self,
        topics: &[ParsedTopic],
        date: NaiveDate,
        explicit_target: Option<&str>,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<RunReport, DigestError> {
        let mut index = self.build_index().await?;
        let mut report = RunReport::new(date);

        for (i, topic) in topics.iter().enumerate() {
            let outcome = self.process_topic(topic, date, explicit_target, &index).await;
            if let TopicOutcome::Created { path, url } = &outcome {
                index.push(KnowledgeIndexEntry {
                    title: self.normalized_title(topic),
                    url: url.clone(),
                    file_path: path.clone(),
                });
            }
            tracing::debug!(title = %topic.title, status = outcome.label(), "processed topic");
            report.push(topic, outcome);
            on_progress(i + 1, topics.len());
        }

        tracing::info!(
            created = report.created(),
            merged = report.merged(),
            skipped = report.skipped(),
            failed = report.failed(),
            "knowledge merge complete"
        );
        Ok(report)
    }
}
