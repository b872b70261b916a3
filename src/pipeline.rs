//! Pipeline orchestration.
//!
//! Coordinates the two end-to-end flows:
//!
//! ```text
//! digest: chat export → parse → noise filter → merge consecutive
//!         → screening → clustering → importance gate → merge engine
//!         → daily report
//! upload: Markdown → segmenter → merge engine
//! ```
//!
//! Each flow is split into a library function that returns what happened
//! ([`digest`], [`upload`]) and a `run_*` wrapper that prints it. A
//! dry run plans every topic against the current knowledge index without
//! writing anything.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::Instrument;
use uuid::Uuid;

use knowledge_digest_core::classify::Classifier;
use knowledge_digest_core::completer::{DisabledCompleter, TextCompleter};
use knowledge_digest_core::markdown::Frontmatter;
use knowledge_digest_core::merge::{MergeEngine, MergePreview};
use knowledge_digest_core::message::{filter_noise, merge_consecutive, MessageParser};
use knowledge_digest_core::models::{KnowledgeIndexEntry, ParsedTopic, RunReport, TopicOutcome};
use knowledge_digest_core::segment::Segmenter;
use knowledge_digest_core::taxonomy::Taxonomy;

use crate::ai_filter::{AiFilter, FilterSettings};
use crate::config::{Config, MergeStage};
use crate::fs_store::FsDocumentStore;
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub path: PathBuf,
    pub group: String,
    /// Report date; defaults to the date of the first message.
    pub date: Option<NaiveDate>,
    pub dry_run: bool,
    pub no_ai: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub path: PathBuf,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
    /// Merge every topic into this store path instead of matching.
    pub target: Option<String>,
    pub dry_run: bool,
}

/// What a dry run would do with one topic.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Merge { path: String, score: f64 },
    Create { path: String },
    Skip { reason: String },
}

#[derive(Debug, Clone)]
pub struct PlannedTopic {
    pub title: String,
    pub category: String,
    pub action: PlannedAction,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Applied(RunReport),
    Planned(Vec<PlannedTopic>),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Applied(report) => Some(report),
            RunOutcome::Planned(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DigestRun {
    pub date: NaiveDate,
    /// Messages after noise filtering and merging.
    pub messages: usize,
    pub survivors: usize,
    pub heuristic: bool,
    pub topics: Vec<ParsedTopic>,
    /// Topics that passed the importance gate.
    pub kb_topics: usize,
    pub summary: String,
    pub report_path: Option<PathBuf>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone)]
pub struct UploadRun {
    pub date: NaiveDate,
    pub topics: Vec<ParsedTopic>,
    pub outcome: RunOutcome,
}

async fn read_input(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    Ok(content.replace("\r\n", "\n"))
}

/// Chat digest without printing.
pub async fn digest(
    config: &Config,
    options: &DigestOptions,
    completer: &dyn TextCompleter,
    progress: &dyn ProgressReporter,
) -> Result<DigestRun> {
    let export = read_input(&options.path).await?;
    progress.report(ProgressEvent::Parsing {
        source: options.path.display().to_string(),
    });

    let parsed = MessageParser::new(options.group.clone()).parse(&export);
    let parsed_count = parsed.len();
    let filtered = filter_noise(parsed);
    let filtered_count = filtered.len();
    let messages = merge_consecutive(
        filtered,
        chrono::Duration::seconds(config.pipeline.merge_window_secs),
    );
    tracing::info!(
        parsed = parsed_count,
        kept = filtered_count,
        merged = messages.len(),
        "parsed chat export"
    );

    let date = options
        .date
        .or_else(|| messages.first().map(|m| m.timestamp.date()))
        .unwrap_or_else(|| Local::now().date_naive());
    let message_count = messages.len();

    let taxonomy = config.load_taxonomy()?;
    let disabled = DisabledCompleter;
    let completer: &dyn TextCompleter = if options.no_ai { &disabled } else { completer };
    let filter = AiFilter::new(
        completer,
        Classifier::new(&taxonomy),
        FilterSettings::from_config(&config.ai, config.merge.title_max_chars),
    );

    let filtered = filter.run(messages, progress).await;
    let summary = filter.summarize(&filtered.topics).await;

    let kb_topics: Vec<ParsedTopic> = filtered
        .topics
        .iter()
        .filter(|t| t.importance >= config.pipeline.kb_min_importance)
        .cloned()
        .collect();
    tracing::info!(
        topics = filtered.topics.len(),
        kb_topics = kb_topics.len(),
        min_importance = config.pipeline.kb_min_importance,
        "importance gate applied"
    );

    let store = FsDocumentStore::new(&config.knowledge)?;
    let engine = MergeEngine::new(&store, &taxonomy, config.merge_settings(MergeStage::Digest));

    let (outcome, report_path) = if options.dry_run {
        (RunOutcome::Planned(plan_topics(&engine, &kb_topics, date, None).await?), None)
    } else {
        let mut report = merge_topics(&engine, &kb_topics, date, None, progress).await?;
        report.summary = Some(summary.clone());
        let report_path = match &config.pipeline.reports_dir {
            Some(dir) => Some(
                write_daily_report(dir, date, &options.group, &summary, &filtered.topics, &taxonomy)
                    .await?,
            ),
            None => None,
        };
        (RunOutcome::Applied(report), report_path)
    };

    Ok(DigestRun {
        date,
        messages: message_count,
        survivors: filtered.survivors.len(),
        heuristic: filtered.heuristic,
        kb_topics: kb_topics.len(),
        topics: filtered.topics,
        summary,
        report_path,
        outcome,
    })
}

/// Markdown upload without printing.
pub async fn upload(
    config: &Config,
    options: &UploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<UploadRun> {
    let document = read_input(&options.path).await?;
    progress.report(ProgressEvent::Parsing {
        source: options.path.display().to_string(),
    });

    let taxonomy = config.load_taxonomy()?;
    let segmenter = Segmenter::new(Classifier::new(&taxonomy), config.merge.title_max_chars);
    let (format, _) = segmenter.split(&document);
    let topics = segmenter.segment(&document);
    tracing::info!(format = ?format, topics = topics.len(), "segmented document");

    let date = options.date.unwrap_or_else(|| Local::now().date_naive());
    let target = options.target.as_deref();

    let store = FsDocumentStore::new(&config.knowledge)?;
    let engine = MergeEngine::new(&store, &taxonomy, config.merge_settings(MergeStage::Upload));

    let outcome = if options.dry_run {
        RunOutcome::Planned(plan_topics(&engine, &topics, date, target).await?)
    } else {
        RunOutcome::Applied(merge_topics(&engine, &topics, date, target, progress).await?)
    };

    Ok(UploadRun {
        date,
        topics,
        outcome,
    })
}

async fn merge_topics(
    engine: &MergeEngine<'_>,
    topics: &[ParsedTopic],
    date: NaiveDate,
    target: Option<&str>,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let report = engine
        .process_topics(topics, date, target, |n, total| {
            progress.report(ProgressEvent::Merging {
                n: n as u64,
                total: total as u64,
            })
        })
        .await?;
    Ok(report)
}

/// Decide merge-or-create for every topic without writing. Mirrors
/// [`MergeEngine::process_topic`]: existing markers plan a skip, a missing
/// target falls back to create, and a create onto an existing document
/// plans a merge. Topics planned for creation become candidates for later
/// topics, as in a real run.
pub async fn plan_topics(
    engine: &MergeEngine<'_>,
    topics: &[ParsedTopic],
    date: NaiveDate,
    target: Option<&str>,
) -> Result<Vec<PlannedTopic>> {
    let mut index = engine.build_index().await?;
    let mut plan = Vec::with_capacity(topics.len());

    for topic in topics {
        let action = plan_topic(engine, topic, date, target, &mut index).await;
        plan.push(PlannedTopic {
            title: topic.title.clone(),
            category: topic.suggested_category_slug.clone(),
            action,
        });
    }
    Ok(plan)
}

async fn plan_topic(
    engine: &MergeEngine<'_>,
    topic: &ParsedTopic,
    date: NaiveDate,
    target: Option<&str>,
    index: &mut Vec<KnowledgeIndexEntry>,
) -> PlannedAction {
    if topic.content.trim().is_empty() {
        return PlannedAction::Skip {
            reason: "empty content".to_string(),
        };
    }

    let candidate = match target {
        Some(path) => Some((path.to_string(), 1.0)),
        None => engine
            .best_match(topic, index)
            .map(|c| (c.file_path, c.score)),
    };
    if let Some((path, score)) = candidate {
        if let Some(action) = planned_merge(engine, path, score, topic, date).await {
            return action;
        }
    }

    let path = engine.document_path(topic);
    if let Some(action) = planned_merge(engine, path.clone(), 1.0, topic, date).await {
        return action;
    }
    index.push(KnowledgeIndexEntry {
        title: topic.title.clone(),
        url: String::new(),
        file_path: path.clone(),
    });
    PlannedAction::Create { path }
}

/// `None` when there is no usable document at `path` to merge into.
async fn planned_merge(
    engine: &MergeEngine<'_>,
    path: String,
    score: f64,
    topic: &ParsedTopic,
    date: NaiveDate,
) -> Option<PlannedAction> {
    let preview = match engine.preview_merge(&path, topic, date).await {
        Ok(preview) => preview,
        Err(e) => {
            tracing::warn!(target = %path, error = %e, "merge target unusable, planning create");
            MergePreview::Missing
        }
    };
    match preview {
        MergePreview::Missing => None,
        MergePreview::AlreadyPresent => Some(PlannedAction::Skip {
            reason: format!("already merged into {path}"),
        }),
        MergePreview::Append => Some(PlannedAction::Merge { path, score }),
    }
}

/// Render the daily report Markdown.
pub fn render_daily_report(
    date: NaiveDate,
    group: &str,
    summary: &str,
    topics: &[ParsedTopic],
    taxonomy: &Taxonomy,
) -> String {
    let mut fm = Frontmatter::new();
    fm.set("title", format!("{} 日报", date));
    fm.set("date", date.to_string());
    if !group.is_empty() {
        fm.set("group", group);
    }

    let mut out = fm.render();
    out.push('\n');
    out.push_str(summary.trim());
    out.push('\n');

    for topic in topics {
        let category = taxonomy
            .find_by_slug(&topic.suggested_category_slug)
            .map(|c| c.name.as_str())
            .unwrap_or("未分类");
        out.push_str(&format!("\n## {}\n\n", topic.title));
        out.push_str(&format!("> {} · 重要度 {}", category, topic.importance));
        if !topic.tags.is_empty() {
            out.push_str(&format!(" · {}", topic.tags.join(" / ")));
        }
        out.push_str("\n\n");
        out.push_str(topic.content.trim());
        out.push('\n');
    }
    out
}

async fn write_daily_report(
    dir: &Path,
    date: NaiveDate,
    group: &str,
    summary: &str,
    topics: &[ParsedTopic],
    taxonomy: &Taxonomy,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create reports dir: {}", dir.display()))?;
    let path = dir.join(format!("{}.md", date));
    let content = render_daily_report(date, group, summary, topics, taxonomy);
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote daily report");
    Ok(path)
}

fn outcome_detail(outcome: &TopicOutcome) -> String {
    match outcome {
        TopicOutcome::Created { path, .. } => path.clone(),
        TopicOutcome::Merged { path, score, .. } => format!("{} ({:.2})", path, score),
        TopicOutcome::Skipped { reason } | TopicOutcome::Failed { reason } => reason.clone(),
    }
}

/// One line per topic, then the totals.
pub fn print_report(report: &RunReport) {
    for row in &report.results {
        println!(
            "  {:<8} {}  {}",
            row.outcome.label(),
            row.title,
            outcome_detail(&row.outcome)
        );
    }
    println!(
        "  created: {}, merged: {}, skipped: {}, failed: {}",
        report.created(),
        report.merged(),
        report.skipped(),
        report.failed()
    );
}

fn print_plan(plan: &[PlannedTopic]) {
    for row in plan {
        match &row.action {
            PlannedAction::Merge { path, score } => {
                println!("  {:<8} {}  {} ({:.2})", "merge", row.title, path, score)
            }
            PlannedAction::Create { path } => println!("  {:<8} {}  {}", "create", row.title, path),
            PlannedAction::Skip { reason } => println!("  {:<8} {}  {}", "skip", row.title, reason),
        }
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Applied(report) => print_report(report),
        RunOutcome::Planned(plan) => print_plan(plan),
    }
}

pub async fn run_digest(
    config: &Config,
    options: &DigestOptions,
    completer: &dyn TextCompleter,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let span = tracing::info_span!("digest", run_id = %Uuid::new_v4(), group = %options.group);
    let run = digest(config, options, completer, progress)
        .instrument(span)
        .await?;

    let suffix = if options.dry_run { " (dry-run)" } else { "" };
    println!("digest {}{}", options.path.display(), suffix);
    println!("  date: {}", run.date);
    println!("  messages: {}", run.messages);
    println!("  screened: {}", run.survivors);
    println!(
        "  topics: {}{}",
        run.topics.len(),
        if run.heuristic { " (heuristic)" } else { "" }
    );
    println!("  knowledge topics: {}", run.kb_topics);
    print_outcome(&run.outcome);
    if let Some(path) = &run.report_path {
        println!("  report: {}", path.display());
    }
    println!("  summary: {}", run.summary);
    println!("ok");

    Ok(())
}

pub async fn run_upload(
    config: &Config,
    options: &UploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let span = tracing::info_span!("upload", run_id = %Uuid::new_v4());
    let run = upload(config, options, progress).instrument(span).await?;

    let suffix = if options.dry_run { " (dry-run)" } else { "" };
    println!("upload {}{}", options.path.display(), suffix);
    println!("  date: {}", run.date);
    println!("  topics: {}", run.topics.len());
    print_outcome(&run.outcome);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(title: &str, slug: &str, importance: u8) -> ParsedTopic {
        ParsedTopic {
            id: ParsedTopic::make_id(title, "c"),
            title: title.to_string(),
            content: format!("{} 的讨论内容", title),
            raw_category_hint: String::new(),
            suggested_category_slug: slug.to_string(),
            suggested_category_name: String::new(),
            confidence: 0.5,
            importance,
            tags: vec!["cursor".to_string()],
            source_message_ids: Vec::new(),
        }
    }

    #[test]
    fn test_render_daily_report() {
        let taxonomy = Taxonomy::builtin();
        let date = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        let out = render_daily_report(
            date,
            "出海群",
            "今日共整理 2 个话题。",
            &[topic("Cursor 技巧", "dev-tools", 4), topic("闲聊", "", 1)],
            &taxonomy,
        );

        assert!(out.starts_with("---\n"));
        assert!(out.contains("title: 2024-11-01 日报"));
        assert!(out.contains("group: 出海群"));
        assert!(out.contains("\n今日共整理 2 个话题。\n"));
        assert!(out.contains("## Cursor 技巧\n\n> 开发工具 · 重要度 4 · cursor"));
        assert!(out.contains("## 闲聊\n\n> 未分类 · 重要度 1"));
    }

    #[test]
    fn test_outcome_detail() {
        let merged = TopicOutcome::Merged {
            path: "payment/stripe.md".to_string(),
            url: "/docs/payment/stripe".to_string(),
            score: 0.6667,
        };
        assert_eq!(outcome_detail(&merged), "payment/stripe.md (0.67)");
        let failed = TopicOutcome::Failed {
            reason: "disk full".to_string(),
        };
        assert_eq!(outcome_detail(&failed), "disk full");
    }
}
