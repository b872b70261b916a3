//! Staged AI filter for chat digests.
//!
//! | Stage | Model tier | Fallback |
//! |-------|------------|----------|
//! | screening: score each message 0/1/2 in batches | economy | whole batch scored 2 (kept) |
//! | clustering: group survivors into topics | standard | keyword grouping ([`AiFilter::cluster_heuristic`]) |
//! | summary: one paragraph over all topics | standard | templated sentence |
//!
//! No stage ever aborts the run: provider errors and unparseable output
//! degrade to the fallback and are logged at WARN.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use knowledge_digest_core::classify::Classifier;
use knowledge_digest_core::completer::{CompletionOptions, TextCompleter};
use knowledge_digest_core::error::DigestError;
use knowledge_digest_core::models::{ParsedTopic, RawMessage};
use knowledge_digest_core::title::{
    normalize_title_with, truncate_chars, SHORT_TITLE_MAX_CHARS, TAG_MAX_CHARS,
};

use crate::config::{AiConfig, MAX_SCREENING_BATCH};
use crate::progress::{ProgressEvent, ProgressReporter};

pub const SCORE_NOT_VALUABLE: u8 = 0;
pub const SCORE_VALUABLE: u8 = 1;
pub const SCORE_UNCERTAIN: u8 = 2;

/// Upper bound on topics taken from one clustering response.
pub const MAX_TOPICS: usize = 8;
const MAX_TAGS: usize = 5;
/// Unclassified messages only form a heuristic topic at this count.
const MIN_UNCLASSIFIED_GROUP: usize = 3;
const PROMPT_MESSAGE_CHARS: usize = 300;

// Informational cost model.
const TOKENS_PER_MESSAGE: u64 = 60;
const SCREENING_PROMPT_TOKENS: u64 = 300;
const SCREENING_OUTPUT_TOKENS: u64 = 60;
const CLUSTERING_PROMPT_TOKENS: u64 = 800;
const CLUSTERING_OUTPUT_TOKENS: u64 = 2000;
const SUMMARY_TOKENS: u64 = 1200;
const ECONOMY_USD_PER_1K_TOKENS: f64 = 0.00015;
const STANDARD_USD_PER_1K_TOKENS: f64 = 0.0006;

fn json_array_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("valid array regex"))
}

fn json_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub title_max_chars: usize,
}

impl FilterSettings {
    pub fn from_config(ai: &AiConfig, title_max_chars: usize) -> Self {
        Self {
            batch_size: ai.batch_size.clamp(1, MAX_SCREENING_BATCH),
            batch_delay: Duration::from_millis(ai.batch_delay_ms),
            title_max_chars,
        }
    }
}

/// What the filter produced for one chat export.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub survivors: Vec<RawMessage>,
    pub topics: Vec<ParsedTopic>,
    /// True when clustering fell back to keyword grouping.
    pub heuristic: bool,
}

/// Token and cost estimate for running the AI stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub messages: usize,
    pub screening_batches: usize,
    pub screening_tokens: u64,
    pub clustering_tokens: u64,
    pub summary_tokens: u64,
    pub total_tokens: u64,
    pub estimated_usd: f64,
}

/// Estimate tokens and cost for `message_count` messages. Informational only.
pub fn estimate_cost(message_count: usize, batch_size: usize) -> CostEstimate {
    let batch_size = batch_size.clamp(1, MAX_SCREENING_BATCH);
    let screening_batches = message_count.div_ceil(batch_size);
    let message_tokens = message_count as u64 * TOKENS_PER_MESSAGE;

    let screening_tokens = message_tokens
        + screening_batches as u64 * (SCREENING_PROMPT_TOKENS + SCREENING_OUTPUT_TOKENS);
    let clustering_tokens = if message_count == 0 {
        0
    } else {
        message_tokens + CLUSTERING_PROMPT_TOKENS + CLUSTERING_OUTPUT_TOKENS
    };
    let summary_tokens = if message_count == 0 { 0 } else { SUMMARY_TOKENS };
    let total_tokens = screening_tokens + clustering_tokens + summary_tokens;

    let estimated_usd = screening_tokens as f64 / 1000.0 * ECONOMY_USD_PER_1K_TOKENS
        + (clustering_tokens + summary_tokens) as f64 / 1000.0 * STANDARD_USD_PER_1K_TOKENS;

    CostEstimate {
        messages: message_count,
        screening_batches,
        screening_tokens,
        clustering_tokens,
        summary_tokens,
        total_tokens,
        estimated_usd,
    }
}

fn prompt_line(index: usize, message: &RawMessage) -> String {
    let content = truncate_chars(&message.content.replace('\n', " "), PROMPT_MESSAGE_CHARS);
    format!("[{}] {}: {}", index, message.sender_name, content)
}

fn screening_prompt(batch: &[RawMessage]) -> String {
    let lines: Vec<String> = batch
        .iter()
        .enumerate()
        .map(|(i, m)| prompt_line(i, m))
        .collect();
    format!(
        "你是社群内容筛选助手。请判断下面每条群聊消息是否有沉淀价值。\n\
         0 = 没有价值（闲聊、寒暄、表情），1 = 有价值（经验、工具、资源、观点），2 = 不确定。\n\
         只输出一个 JSON 数组，按顺序给出每条消息的分数，例如 [1,0,2]。\n\n{}",
        lines.join("\n")
    )
}

/// Parse a screening response: the first JSON array of integers with
/// exactly `expected` entries. Out-of-range scores count as uncertain.
pub fn parse_scores(text: &str, expected: usize) -> Option<Vec<u8>> {
    let raw = json_array_regex().find(text)?.as_str();
    let values: Vec<i64> = serde_json::from_str(raw).ok()?;
    if values.len() != expected {
        return None;
    }
    Some(
        values
            .into_iter()
            .map(|v| match v {
                0 => SCORE_NOT_VALUABLE,
                1 => SCORE_VALUABLE,
                _ => SCORE_UNCERTAIN,
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    #[serde(default)]
    topics: Vec<RawCluster>,
}

#[derive(Debug, Deserialize)]
struct RawCluster {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    importance: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, alias = "messageIndices", alias = "message_ids")]
    message_indices: Vec<i64>,
}

/// A validated topic from the clustering stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTopic {
    pub title: String,
    pub summary: String,
    pub category: String,
    pub importance: u8,
    pub tags: Vec<String>,
    pub message_indices: Vec<usize>,
}

/// Parse a clustering response defensively. Any failure yields no topics.
pub fn parse_clusters(text: &str, message_count: usize) -> Vec<ClusterTopic> {
    let Some(raw) = json_object_regex().find(text) else {
        return Vec::new();
    };
    let response: ClusterResponse = match serde_json::from_str(raw.as_str()) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "clustering response is not valid JSON");
            return Vec::new();
        }
    };

    response
        .topics
        .into_iter()
        .filter(|t| !t.title.trim().is_empty())
        .take(MAX_TOPICS)
        .map(|t| {
            let indices: BTreeSet<usize> = t
                .message_indices
                .into_iter()
                .filter_map(|i| usize::try_from(i).ok())
                .filter(|i| *i < message_count)
                .collect();
            ClusterTopic {
                title: t.title.trim().to_string(),
                summary: t.summary.trim().to_string(),
                category: t.category.trim().to_string(),
                importance: t.importance.unwrap_or(3).clamp(1, 5) as u8,
                tags: t
                    .tags
                    .iter()
                    .map(|tag| normalize_title_with(tag, TAG_MAX_CHARS))
                    .filter(|tag| !tag.is_empty())
                    .take(MAX_TAGS)
                    .collect(),
                message_indices: indices.into_iter().collect(),
            }
        })
        .collect()
}

fn clustering_prompt(messages: &[RawMessage], category_names: &[&str]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| prompt_line(i, m))
        .collect();
    format!(
        "你是社群知识整理助手。请把下面的群聊消息归纳为 3 到 {max} 个话题。\n\
         可选分类：{cats}\n\
         只输出 JSON，格式为：\n\
         {{\"topics\": [{{\"title\": \"简短标题\", \"summary\": \"要点总结\", \"category\": \"分类名\", \
         \"importance\": 1-5, \"tags\": [\"标签\"], \"message_indices\": [0, 1]}}]}}\n\n{msgs}",
        max = MAX_TOPICS,
        cats = category_names.join("、"),
        msgs = lines.join("\n")
    )
}

fn summary_prompt(topics: &[ParsedTopic]) -> String {
    let lines: Vec<String> = topics
        .iter()
        .map(|t| format!("- {}：{}", t.title, truncate_chars(&t.content, 200)))
        .collect();
    format!(
        "请用两三句话为今天的社群讨论写一段日报摘要，不要使用列表。\n\n{}",
        lines.join("\n")
    )
}

/// Templated summary used when the model is unavailable.
pub fn fallback_summary(topics: &[ParsedTopic]) -> String {
    let mut categories: Vec<&str> = Vec::new();
    for topic in topics {
        let name = topic.suggested_category_name.as_str();
        if !name.is_empty() && !categories.contains(&name) {
            categories.push(name);
        }
    }
    if categories.is_empty() {
        format!("今日共整理 {} 个话题。", topics.len())
    } else {
        format!(
            "今日共整理 {} 个话题，涵盖 {}。",
            topics.len(),
            categories.join("、")
        )
    }
}

pub struct AiFilter<'a> {
    completer: &'a dyn TextCompleter,
    classifier: Classifier<'a>,
    settings: FilterSettings,
}

impl<'a> AiFilter<'a> {
    pub fn new(
        completer: &'a dyn TextCompleter,
        classifier: Classifier<'a>,
        settings: FilterSettings,
    ) -> Self {
        Self {
            completer,
            classifier,
            settings,
        }
    }

    /// Stage 2. Keeps every message scored ≥ 1; failed batches are kept whole.
    pub async fn screen(
        &self,
        messages: Vec<RawMessage>,
        progress: &dyn ProgressReporter,
    ) -> Vec<RawMessage> {
        if !self.completer.is_enabled() || messages.is_empty() {
            return messages;
        }

        let total = messages.len().div_ceil(self.settings.batch_size);
        let mut survivors = Vec::with_capacity(messages.len());
        for (i, batch) in messages.chunks(self.settings.batch_size).enumerate() {
            if i > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            progress.report(ProgressEvent::Screening {
                n: i as u64 + 1,
                total: total as u64,
            });

            let scores = match self.screen_batch(batch).await {
                Ok(scores) => scores,
                Err(e) => {
                    tracing::warn!(batch = i + 1, error = %e, "screening failed, keeping batch");
                    vec![SCORE_UNCERTAIN; batch.len()]
                }
            };
            for (message, score) in batch.iter().zip(scores) {
                tracing::trace!(id = %message.id, score, "screened message");
                if score >= SCORE_VALUABLE {
                    survivors.push(message.clone());
                }
            }
        }

        tracing::info!(
            input = messages.len(),
            kept = survivors.len(),
            batches = total,
            "screening complete"
        );
        survivors
    }

    async fn screen_batch(&self, batch: &[RawMessage]) -> Result<Vec<u8>, DigestError> {
        let response = self
            .completer
            .complete(
                &screening_prompt(batch),
                &CompletionOptions::economy(batch.len() as u32 * 4 + 20),
            )
            .await
            .map_err(|e| DigestError::AiUnavailable(e.to_string()))?;
        parse_scores(&response, batch.len()).ok_or_else(|| {
            DigestError::AiUnavailable("screening response could not be parsed".to_string())
        })
    }

    /// Stage 3. Returns an empty list on any failure.
    pub async fn cluster(&self, messages: &[RawMessage]) -> Vec<ParsedTopic> {
        if !self.completer.is_enabled() || messages.is_empty() {
            return Vec::new();
        }
        let names: Vec<&str> = self
            .classifier
            .taxonomy()
            .categories()
            .iter()
            .map(|c| c.name.as_str())
            .collect();

        let response = match self
            .completer
            .complete(
                &clustering_prompt(messages, &names),
                &CompletionOptions::default(),
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "clustering call failed");
                return Vec::new();
            }
        };

        let clusters = parse_clusters(&response, messages.len());
        if clusters.is_empty() {
            tracing::warn!("clustering response yielded no topics");
        }
        clusters
            .into_iter()
            .filter_map(|c| self.cluster_to_topic(c, messages))
            .collect()
    }

    fn cluster_to_topic(&self, cluster: ClusterTopic, messages: &[RawMessage]) -> Option<ParsedTopic> {
        let members: Vec<&RawMessage> = cluster
            .message_indices
            .iter()
            .map(|&i| &messages[i])
            .collect();
        let content = if cluster.summary.is_empty() {
            members
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            cluster.summary
        };
        if content.trim().is_empty() {
            return None;
        }
        let title = normalize_title_with(&cluster.title, self.settings.title_max_chars);

        let mut topic = ParsedTopic {
            id: ParsedTopic::make_id(&title, &content),
            title,
            content,
            raw_category_hint: cluster.category,
            suggested_category_slug: String::new(),
            suggested_category_name: String::new(),
            confidence: 0.0,
            importance: cluster.importance,
            tags: cluster.tags,
            source_message_ids: members.iter().map(|m| m.id.clone()).collect(),
        };
        self.classifier
            .classify_topic(&topic.raw_category_hint, &topic.title, &topic.content)
            .apply_to(&mut topic);
        Some(topic)
    }

    /// Keyword grouping: one topic per category that any message hits, in
    /// taxonomy order, then one for unclassified messages if there are
    /// enough of them.
    pub fn cluster_heuristic(&self, messages: &[RawMessage]) -> Vec<ParsedTopic> {
        let categories = self.classifier.taxonomy().categories();
        let mut groups: Vec<(Vec<&RawMessage>, f64)> = vec![(Vec::new(), 0.0); categories.len()];
        let mut unclassified: Vec<&RawMessage> = Vec::new();

        for message in messages {
            let result = self.classifier.classify(&message.content);
            let slot = result
                .category
                .and_then(|cat| categories.iter().position(|c| c.slug == cat.slug));
            match slot {
                Some(i) => {
                    groups[i].0.push(message);
                    groups[i].1 = groups[i].1.max(result.confidence);
                }
                None => unclassified.push(message),
            }
        }

        let mut topics = Vec::new();
        for (i, (members, confidence)) in groups.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let mut topic = self.heuristic_topic(&members);
            topic.suggested_category_slug = categories[i].slug.clone();
            topic.suggested_category_name = categories[i].name.clone();
            topic.confidence = confidence;
            topics.push(topic);
        }
        if unclassified.len() >= MIN_UNCLASSIFIED_GROUP {
            topics.push(self.heuristic_topic(&unclassified));
        }

        tracing::debug!(topics = topics.len(), "heuristic clustering");
        topics
    }

    fn heuristic_topic(&self, members: &[&RawMessage]) -> ParsedTopic {
        let longest = members
            .iter()
            .max_by_key(|m| m.content.chars().count())
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let first_line = longest.lines().next().unwrap_or_default();
        let title = normalize_title_with(first_line, SHORT_TITLE_MAX_CHARS);
        let content = members
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        ParsedTopic {
            id: ParsedTopic::make_id(&title, &content),
            title,
            content,
            raw_category_hint: String::new(),
            suggested_category_slug: String::new(),
            suggested_category_name: String::new(),
            confidence: 0.0,
            importance: (1 + members.len() / 2).min(5) as u8,
            tags: Vec::new(),
            source_message_ids: members.iter().map(|m| m.id.clone()).collect(),
        }
    }

    /// Daily summary over the final topics.
    pub async fn summarize(&self, topics: &[ParsedTopic]) -> String {
        if topics.is_empty() || !self.completer.is_enabled() {
            return fallback_summary(topics);
        }
        match self
            .completer
            .complete(&summary_prompt(topics), &CompletionOptions::default())
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("summary response was empty, using template");
                fallback_summary(topics)
            }
            Err(e) => {
                tracing::warn!(error = %e, "summary call failed, using template");
                fallback_summary(topics)
            }
        }
    }

    /// Screening then clustering, with the heuristic as the clustering
    /// fallback.
    pub async fn run(
        &self,
        messages: Vec<RawMessage>,
        progress: &dyn ProgressReporter,
    ) -> FilterOutput {
        if !self.completer.is_enabled() {
            tracing::info!("AI provider disabled, using heuristic clustering");
        }
        let survivors = self.screen(messages, progress).await;
        progress.report(ProgressEvent::Clustering {
            messages: survivors.len() as u64,
        });

        let mut topics = self.cluster(&survivors).await;
        let heuristic = topics.is_empty();
        if heuristic {
            topics = self.cluster_heuristic(&survivors);
        }
        tracing::info!(topics = topics.len(), heuristic, "clustering complete");

        FilterOutput {
            survivors,
            topics,
            heuristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use knowledge_digest_core::completer::{DisabledCompleter, FixedCompleter, ModelTier};
    use knowledge_digest_core::models::MessageType;
    use knowledge_digest_core::taxonomy::Taxonomy;

    use crate::progress::NoProgress;

    fn msg(i: u32, sender: &str, content: &str) -> RawMessage {
        RawMessage {
            id: format!("msg-{i}"),
            group_name: "测试群".to_string(),
            sender_name: sender.to_string(),
            sender_id: None,
            content: content.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 11, 1)
                .unwrap()
                .and_hms_opt(9, i % 60, 0)
                .unwrap(),
            message_type: MessageType::Text,
        }
    }

    fn settings() -> FilterSettings {
        FilterSettings {
            batch_size: 20,
            batch_delay: Duration::ZERO,
            title_max_chars: 40,
        }
    }

    #[test]
    fn test_parse_scores() {
        assert_eq!(parse_scores("[1,0,2]", 3), Some(vec![1, 0, 2]));
        assert_eq!(
            parse_scores("结果如下：\n```json\n[1, 1, 7]\n```", 3),
            Some(vec![1, 1, 2])
        );
        assert_eq!(parse_scores("[1,0]", 3), None);
        assert_eq!(parse_scores("no array", 1), None);
    }

    #[test]
    fn test_parse_clusters_defensive() {
        let text = r#"好的，以下是结果：
```json
{"topics": [
  {"title": "Cursor 技巧", "summary": "多光标", "category": "开发工具", "importance": 9, "tags": ["cursor"], "message_indices": [0, 1, 1, 99, -1]},
  {"title": "", "summary": "no title"}
]}
```"#;
        let clusters = parse_clusters(text, 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].importance, 5);
        assert_eq!(clusters[0].message_indices, vec![0, 1]);
        assert_eq!(clusters[0].tags, vec!["cursor"]);

        assert!(parse_clusters("not json at all", 3).is_empty());
        assert!(parse_clusters("{broken", 3).is_empty());
        assert!(parse_clusters("{\"topics\": 5}", 3).is_empty());
    }

    #[test]
    fn test_parse_clusters_caps_topic_count() {
        let topics: Vec<String> = (0..12)
            .map(|i| format!("{{\"title\": \"话题{i}\", \"summary\": \"s\"}}"))
            .collect();
        let text = format!("{{\"topics\": [{}]}}", topics.join(","));
        assert_eq!(parse_clusters(&text, 0).len(), MAX_TOPICS);
    }

    #[test]
    fn test_estimate_cost() {
        let est = estimate_cost(45, 20);
        assert_eq!(est.screening_batches, 3);
        assert_eq!(est.total_tokens, est.screening_tokens + est.clustering_tokens + est.summary_tokens);
        assert!(est.estimated_usd > 0.0);

        let empty = estimate_cost(0, 20);
        assert_eq!(empty.total_tokens, 0);
        assert_eq!(estimate_cost(45, 100).screening_batches, 3);
    }

    #[test]
    fn test_fallback_summary() {
        let taxonomy = Taxonomy::builtin();
        let filter_completer = DisabledCompleter;
        let filter = AiFilter::new(&filter_completer, Classifier::new(&taxonomy), settings());
        let topics = filter.cluster_heuristic(&[
            msg(1, "a", "cursor 的多光标编辑很好用"),
            msg(2, "b", "stripe 支付 接入很简单"),
        ]);
        assert_eq!(fallback_summary(&topics), "今日共整理 2 个话题，涵盖 开发工具、出海支付。");
        assert_eq!(fallback_summary(&[]), "今日共整理 0 个话题。");
    }

    #[tokio::test]
    async fn test_screening_keeps_scored_messages() {
        let taxonomy = Taxonomy::builtin();
        let completer = FixedCompleter::scripted(["[1,0,2]"]);
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![msg(1, "a", "有用的经验"), msg(2, "b", "哈哈哈"), msg(3, "c", "也许有用")];

        let kept = filter.screen(messages, &NoProgress).await;
        let ids: Vec<&str> = kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg-1", "msg-3"]);
        assert_eq!(completer.prompts()[0].1, ModelTier::Economy);
    }

    #[tokio::test]
    async fn test_screening_fails_open() {
        let taxonomy = Taxonomy::builtin();
        let completer = FixedCompleter::failing("rate limited");
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![msg(1, "a", "一"), msg(2, "b", "二")];
        assert_eq!(filter.screen(messages, &NoProgress).await.len(), 2);

        let completer = FixedCompleter::always("I think they are all fine");
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![msg(1, "a", "一"), msg(2, "b", "二")];
        assert_eq!(filter.screen(messages, &NoProgress).await.len(), 2);
    }

    #[tokio::test]
    async fn test_screening_batches() {
        let taxonomy = Taxonomy::builtin();
        let ones = format!("[{}]", vec!["1"; 20].join(","));
        let completer = FixedCompleter::scripted([ones.as_str(), "[0,0,0,0,0]"]);
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages: Vec<RawMessage> = (0..25).map(|i| msg(i, "a", "内容")).collect();

        let kept = filter.screen(messages, &NoProgress).await;
        assert_eq!(kept.len(), 20);
        assert_eq!(completer.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_cluster_builds_classified_topics() {
        let taxonomy = Taxonomy::builtin();
        let completer = FixedCompleter::always(
            r#"{"topics": [{"title": "一、Cursor 技巧", "summary": "多光标与规则文件", "category": "开发工具", "importance": 4, "tags": ["cursor"], "message_indices": [0, 2]}]}"#,
        );
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![msg(1, "a", "cursor 多光标"), msg(2, "b", "无关"), msg(3, "c", "规则文件")];

        let topics = filter.cluster(&messages).await;
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Cursor 技巧");
        assert_eq!(topics[0].suggested_category_slug, "dev-tools");
        assert_eq!(topics[0].importance, 4);
        assert_eq!(topics[0].source_message_ids, vec!["msg-1", "msg-3"]);
    }

    #[test]
    fn test_heuristic_groups_by_category() {
        let taxonomy = Taxonomy::builtin();
        let completer = DisabledCompleter;
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![
            msg(1, "a", "stripe 支付怎么接入"),
            msg(2, "b", "cursor 很好用"),
            msg(3, "c", "stripe 订阅模式的退款流程比较复杂\n第二行"),
            msg(4, "d", "今天吃什么"),
            msg(5, "e", "周末去哪玩"),
        ];

        let topics = filter.cluster_heuristic(&messages);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].suggested_category_slug, "dev-tools");
        assert_eq!(topics[1].suggested_category_slug, "payment");
        assert_eq!(topics[1].title, "stripe 订阅模式的退款流程比较复杂");
        assert_eq!(topics[1].content, "stripe 支付怎么接入\nstripe 订阅模式的退款流程比较复杂\n第二行");
        assert_eq!(topics[1].importance, 2);
        assert_eq!(topics[0].importance, 1);

        let mut more = messages.clone();
        more.push(msg(6, "f", "明天下雨吗"));
        let topics = filter.cluster_heuristic(&more);
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[2].suggested_category_slug, "");
        assert_eq!(topics[2].confidence, 0.0);
    }

    #[tokio::test]
    async fn test_run_falls_back_when_clustering_unparseable() {
        let taxonomy = Taxonomy::builtin();
        let completer = FixedCompleter::scripted(["[1,1]", "sorry, I cannot help"]);
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let messages = vec![msg(1, "a", "cursor 技巧"), msg(2, "b", "vscode 插件推荐")];

        let output = filter.run(messages, &NoProgress).await;
        assert!(output.heuristic);
        assert_eq!(output.survivors.len(), 2);
        assert_eq!(output.topics.len(), 1);
        assert_eq!(output.topics[0].suggested_category_slug, "dev-tools");
    }

    #[tokio::test]
    async fn test_summary_uses_model_then_falls_back() {
        let taxonomy = Taxonomy::builtin();
        let completer = FixedCompleter::scripted(["  今天大家聊了 Cursor。 "]);
        let filter = AiFilter::new(&completer, Classifier::new(&taxonomy), settings());
        let topics = filter.cluster_heuristic(&[msg(1, "a", "cursor 技巧")]);

        assert_eq!(filter.summarize(&topics).await, "今天大家聊了 Cursor。");
        assert_eq!(filter.summarize(&topics).await, "今日共整理 1 个话题，涵盖 开发工具。");
    }
}
