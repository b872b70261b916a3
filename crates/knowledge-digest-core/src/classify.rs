//! Category classification.
//!
//! # Scoring
//!
//! For every category, each keyword contributes:
//!
//! | Match | Points |
//! |-------|--------|
//! | whole token (whitespace or string boundary on both sides) | +2 |
//! | substring only | +1 |
//! | absent | 0 |
//!
//! Hint rules from the taxonomy are applied afterwards as an independent
//! layer: if any hint word appears, the rule's category gets a flat bonus
//! regardless of its keyword score. The highest positive score wins; ties
//! go to the category defined first. `confidence = min(score / 5, 1)`.
//!
//! A resolvable manual hint (e.g. the `开发工具` in `## 开发工具 | 标题`)
//! bypasses scoring entirely and yields confidence 0.95.

use crate::models::{Category, ParsedTopic};
use crate::taxonomy::Taxonomy;

/// Confidence assigned to a category chosen by an explicit hint.
pub const MANUAL_CONFIDENCE: f64 = 0.95;

/// Score at which keyword confidence saturates at 1.0.
const FULL_CONFIDENCE_SCORE: f64 = 5.0;

const MIDDLE_DOTS: &[char] = &['·', '・', '•', '‧', '∙', '･'];

/// Result of classifying a piece of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification<'a> {
    pub category: Option<&'a Category>,
    pub confidence: f64,
    pub score: u32,
    pub manual: bool,
}

impl<'a> Classification<'a> {
    fn miss() -> Self {
        Self {
            category: None,
            confidence: 0.0,
            score: 0,
            manual: false,
        }
    }

    /// Copy the outcome onto a topic. A miss clears the suggestion.
    pub fn apply_to(&self, topic: &mut ParsedTopic) {
        match self.category {
            Some(cat) => {
                topic.suggested_category_slug = cat.slug.clone();
                topic.suggested_category_name = cat.name.clone();
                topic.confidence = self.confidence;
            }
            None => {
                topic.suggested_category_slug.clear();
                topic.suggested_category_name.clear();
                topic.confidence = 0.0;
            }
        }
    }
}

/// Keyword classifier over an injected [`Taxonomy`].
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    taxonomy: &'a Taxonomy,
}

impl<'a> Classifier<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &'a Taxonomy {
        self.taxonomy
    }

    /// Keyword + hint-rule scoring. No match yields `(None, 0)`.
    pub fn classify(&self, text: &str) -> Classification<'a> {
        let scores = self.score_all(text);

        let mut best: Option<(&'a Category, u32)> = None;
        for (cat, score) in scores {
            if score == 0 {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((cat, score)),
            }
        }

        match best {
            Some((cat, score)) => Classification {
                category: Some(cat),
                confidence: (score as f64 / FULL_CONFIDENCE_SCORE).min(1.0),
                score,
                manual: false,
            },
            None => Classification::miss(),
        }
    }

    /// Per-category score in enumeration order.
    pub fn score_all(&self, text: &str) -> Vec<(&'a Category, u32)> {
        let lowered = text.to_lowercase();
        let mut scores: Vec<(&'a Category, u32)> = self
            .taxonomy
            .categories()
            .iter()
            .map(|cat| {
                let score = cat
                    .keywords
                    .iter()
                    .map(|kw| keyword_points(&lowered, &kw.to_lowercase()))
                    .sum::<u32>();
                (cat, score)
            })
            .collect();

        for rule in self.taxonomy.hint_rules() {
            let fired = rule
                .words
                .iter()
                .any(|w| !w.is_empty() && lowered.contains(&w.to_lowercase()));
            if !fired {
                continue;
            }
            if let Some(entry) = scores
                .iter_mut()
                .find(|(cat, _)| cat.slug.eq_ignore_ascii_case(&rule.category_slug))
            {
                entry.1 += rule.bonus;
            }
        }

        scores
    }

    /// Resolve an explicit category hint: exact name, then name with
    /// whitespace and middle dots removed, then slug (case-insensitive).
    pub fn resolve_manual(&self, hint: &str) -> Option<&'a Category> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        let categories = self.taxonomy.categories();

        if let Some(cat) = categories.iter().find(|c| c.name == hint) {
            return Some(cat);
        }

        let compact_hint = compact_name(hint);
        if !compact_hint.is_empty() {
            if let Some(cat) = categories
                .iter()
                .find(|c| compact_name(&c.name) == compact_hint)
            {
                return Some(cat);
            }
        }

        self.taxonomy.find_by_slug(hint)
    }

    /// Classify a topic: a resolvable hint wins, otherwise keyword scoring
    /// over `hint + title + content`.
    pub fn classify_topic(&self, hint: &str, title: &str, content: &str) -> Classification<'a> {
        if let Some(cat) = self.resolve_manual(hint) {
            return Classification {
                category: Some(cat),
                confidence: MANUAL_CONFIDENCE,
                score: 0,
                manual: true,
            };
        }
        let text = format!("{} {} {}", hint.trim(), title.trim(), content.trim());
        self.classify(&text)
    }
}

fn compact_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !MIDDLE_DOTS.contains(c))
        .collect()
}

fn keyword_points(text: &str, keyword: &str) -> u32 {
    if keyword.is_empty() {
        return 0;
    }
    let mut found = false;
    for (start, matched) in text.match_indices(keyword) {
        found = true;
        let end = start + matched.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after_ok = text[end..].chars().next().map_or(true, char::is_whitespace);
        if before_ok && after_ok {
            return 2;
        }
    }
    if found {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::HintRule;

    fn fixture() -> Taxonomy {
        let cat = |order, name: &str, slug: &str, kws: &[&str]| Category {
            name: name.to_string(),
            slug: slug.to_string(),
            icon: String::new(),
            description: String::new(),
            order,
            keywords: kws.iter().map(|k| k.to_string()).collect(),
        };
        Taxonomy::new(
            "test",
            vec![
                cat(1, "开发 工具", "tools", &["cursor", "ide"]),
                cat(2, "AI·模型", "models", &["claude", "gpt"]),
                cat(3, "支付", "pay", &["stripe", "支付"]),
            ],
            vec![HintRule {
                category_slug: "pay".to_string(),
                words: vec!["订阅".to_string(), "退款".to_string()],
                bonus: 3,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_keyword_points() {
        assert_eq!(keyword_points("use cursor daily", "cursor"), 2);
        assert_eq!(keyword_points("cursor", "cursor"), 2);
        assert_eq!(keyword_points("cursorai rocks", "cursor"), 1);
        assert_eq!(keyword_points("nothing here", "cursor"), 0);
        assert_eq!(keyword_points("cursorx and cursor", "cursor"), 2);
    }

    #[test]
    fn test_classify_picks_highest() {
        let t = fixture();
        let c = Classifier::new(&t).classify("Claude vs GPT for coding in cursor");
        assert_eq!(c.category.unwrap().slug, "models");
        assert_eq!(c.score, 4);
        assert!((c.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_tie_goes_to_first_defined() {
        let t = fixture();
        let c = Classifier::new(&t).classify("cursor claude");
        assert_eq!(c.category.unwrap().slug, "tools");
    }

    #[test]
    fn test_no_match_is_miss() {
        let t = fixture();
        let c = Classifier::new(&t).classify("今天天气不错");
        assert!(c.category.is_none());
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_confidence_caps_at_one() {
        let t = fixture();
        let c = Classifier::new(&t).classify("stripe 支付 stripe 支付 订阅");
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_hint_rule_applies_without_keywords() {
        let t = fixture();
        let c = Classifier::new(&t).classify("怎么处理退款");
        assert_eq!(c.category.unwrap().slug, "pay");
        assert_eq!(c.score, 3);
    }

    #[test]
    fn test_hint_words_raise_confidence() {
        let t = Taxonomy::builtin();
        let classifier = Classifier::new(&t);
        let without = classifier.classify("Stripe 支付集成 接入流程");
        let with = classifier.classify("Stripe 支付集成 订阅 接入流程");
        assert_eq!(without.category.unwrap().slug, "payment");
        assert_eq!(with.category.unwrap().slug, "payment");
        assert!(with.confidence > without.confidence);
        assert!(with.score >= without.score + 3);
    }

    #[test]
    fn test_deterministic() {
        let t = Taxonomy::builtin();
        let classifier = Classifier::new(&t);
        let text = "用 Vercel 部署 Next.js，再接 Stripe";
        assert_eq!(classifier.classify(text), classifier.classify(text));
    }

    #[test]
    fn test_resolve_manual_exact_compact_and_slug() {
        let t = fixture();
        let c = Classifier::new(&t);
        assert_eq!(c.resolve_manual("开发 工具").unwrap().slug, "tools");
        assert_eq!(c.resolve_manual("开发工具").unwrap().slug, "tools");
        assert_eq!(c.resolve_manual("AI模型").unwrap().slug, "models");
        assert_eq!(c.resolve_manual(" AI · 模型 ").unwrap().slug, "models");
        assert_eq!(c.resolve_manual("PAY").unwrap().slug, "pay");
        assert!(c.resolve_manual("未知").is_none());
        assert!(c.resolve_manual("").is_none());
    }

    #[test]
    fn test_manual_override_bypasses_scoring() {
        let t = fixture();
        let c = Classifier::new(&t).classify_topic("pay", "Claude tips", "claude gpt claude");
        assert_eq!(c.category.unwrap().slug, "pay");
        assert_eq!(c.confidence, MANUAL_CONFIDENCE);
        assert!(c.manual);
    }

    #[test]
    fn test_unresolved_hint_falls_back_to_keywords() {
        let t = fixture();
        let c = Classifier::new(&t).classify_topic("杂谈", "Cursor 快捷键", "ide 设置");
        assert_eq!(c.category.unwrap().slug, "tools");
        assert!(!c.manual);
    }

    #[test]
    fn test_apply_miss_clears_slug() {
        let t = fixture();
        let mut topic = ParsedTopic {
            id: "t".to_string(),
            title: "x".to_string(),
            content: "y".to_string(),
            raw_category_hint: String::new(),
            suggested_category_slug: "old".to_string(),
            suggested_category_name: "Old".to_string(),
            confidence: 0.5,
            importance: 3,
            tags: Vec::new(),
            source_message_ids: Vec::new(),
        };
        Classifier::new(&t).classify("zzz").apply_to(&mut topic);
        assert_eq!(topic.suggested_category_slug, "");
        assert_eq!(topic.confidence, 0.0);
    }
}
