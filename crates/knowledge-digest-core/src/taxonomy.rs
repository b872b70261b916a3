//! The static category taxonomy.
//!
//! A [`Taxonomy`] is loaded once per process (built-in or from a versioned
//! TOML file) and passed explicitly to the classifier, segmenter, and merge
//! engine. Categories are only ever selected, never created at runtime.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

use crate::models::Category;

/// "If these exact signals appear, strongly prefer this category."
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HintRule {
    pub category_slug: String,
    pub words: Vec<String>,
    #[serde(default = "default_hint_bonus")]
    pub bonus: u32,
}

fn default_hint_bonus() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq)]
pub struct Taxonomy {
    version: String,
    categories: Vec<Category>,
    hint_rules: Vec<HintRule>,
}

#[derive(Deserialize)]
struct TaxonomyFile {
    #[serde(default = "default_version")]
    version: String,
    categories: Vec<Category>,
    #[serde(default)]
    hint_rules: Vec<HintRule>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Taxonomy {
    /// Build a taxonomy, sorting categories by `order` and validating slugs.
    pub fn new(
        version: impl Into<String>,
        mut categories: Vec<Category>,
        hint_rules: Vec<HintRule>,
    ) -> Result<Self> {
        if categories.is_empty() {
            bail!("taxonomy must define at least one category");
        }

        let mut seen = HashSet::new();
        for cat in &categories {
            if cat.slug.trim().is_empty() {
                bail!("category '{}' has an empty slug", cat.name);
            }
            if !seen.insert(cat.slug.to_lowercase()) {
                bail!("duplicate category slug: '{}'", cat.slug);
            }
        }
        for rule in &hint_rules {
            if !seen.contains(&rule.category_slug.to_lowercase()) {
                bail!(
                    "hint rule references unknown category slug: '{}'",
                    rule.category_slug
                );
            }
        }

        // Stable: equal `order` keeps definition order.
        categories.sort_by_key(|c| c.order);

        Ok(Self {
            version: version.into(),
            categories,
            hint_rules,
        })
    }

    /// Parse a taxonomy file:
    ///
    /// ```toml
    /// version = "2024-11"
    ///
    /// [[categories]]
    /// name = "开发工具"
    /// slug = "dev-tools"
    /// icon = "🛠️"
    /// order = 1
    /// keywords = ["cursor", "vscode"]
    ///
    /// [[hint_rules]]
    /// category_slug = "dev-tools"
    /// words = ["插件"]
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TaxonomyFile =
            toml::from_str(content).with_context(|| "Failed to parse taxonomy file")?;
        Self::new(file.version, file.categories, file.hint_rules)
    }

    /// The default taxonomy shipped with the binary.
    pub fn builtin() -> Self {
        let cat = |order: u32, name: &str, slug: &str, icon: &str, desc: &str, kws: &[&str]| {
            Category {
                name: name.to_string(),
                slug: slug.to_string(),
                icon: icon.to_string(),
                description: desc.to_string(),
                order,
                keywords: kws.iter().map(|k| k.to_string()).collect(),
            }
        };

        let categories = vec![
            cat(
                1,
                "开发工具",
                "dev-tools",
                "🛠️",
                "编辑器、IDE 与效率工具",
                &[
                    "cursor", "vscode", "ide", "插件", "编辑器", "copilot", "windsurf", "git", "工具",
                ],
            ),
            cat(
                2,
                "AI 模型",
                "ai-models",
                "🤖",
                "大模型能力、对比与提示词",
                &[
                    "gpt", "claude", "gemini", "deepseek", "llm", "模型", "大模型", "prompt", "提示词",
                    "token",
                ],
            ),
            cat(
                3,
                "出海支付",
                "payment",
                "💳",
                "收款、订阅与支付渠道",
                &[
                    "stripe", "paypal", "lemonsqueezy", "支付", "收款", "信用卡", "payment", "订阅",
                ],
            ),
            cat(
                4,
                "产品运营",
                "growth",
                "📈",
                "获客、SEO 与增长",
                &[
                    "seo", "流量", "推广", "运营", "增长", "获客", "变现", "producthunt", "用户",
                ],
            ),
            cat(
                5,
                "部署运维",
                "deployment",
                "🚀",
                "服务器、域名与部署",
                &[
                    "vercel", "cloudflare", "docker", "服务器", "部署", "域名", "nginx", "cdn", "vps",
                ],
            ),
            cat(
                6,
                "编程技术",
                "programming",
                "💻",
                "前后端开发与框架",
                &[
                    "react", "nextjs", "python", "rust", "前端", "后端", "api", "数据库", "代码", "框架",
                ],
            ),
            cat(
                7,
                "行业资讯",
                "industry-news",
                "📰",
                "融资、发布与行业动态",
                &[
                    "融资", "发布", "新闻", "开源", "资讯", "收购", "财报",
                ],
            ),
            cat(
                8,
                "其他",
                "misc",
                "📦",
                "暂未归类的讨论",
                &[],
            ),
        ];

        let hint_rules = vec![HintRule {
            category_slug: "payment".to_string(),
            words: ["订阅", "付费", "subscription", "checkout", "退款"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            bonus: 3,
        }];

        Self {
            version: "builtin-1".to_string(),
            categories,
            hint_rules,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Categories in enumeration (tie-break) order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn hint_rules(&self) -> &[HintRule] {
        &self.hint_rules
    }

    /// Case-insensitive slug lookup.
    pub fn find_by_slug(&self, slug: &str) -> Option<&Category> {
        let wanted = slug.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.slug.to_lowercase() == wanted)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let t = Taxonomy::builtin();
        let rebuilt = Taxonomy::new(
            t.version().to_string(),
            t.categories().to_vec(),
            t.hint_rules().to_vec(),
        )
        .unwrap();
        assert_eq!(rebuilt.len(), 8);
        assert_eq!(rebuilt.categories()[0].slug, "dev-tools");
    }

    #[test]
    fn test_from_toml_sorts_by_order() {
        let toml = r#"
version = "2024-11"

[[categories]]
name = "B"
slug = "b"
order = 2
keywords = ["beta"]

[[categories]]
name = "A"
slug = "a"
order = 1

[[hint_rules]]
category_slug = "b"
words = ["bb"]
"#;
        let t = Taxonomy::from_toml_str(toml).unwrap();
        assert_eq!(t.version(), "2024-11");
        let slugs: Vec<&str> = t.categories().iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);
        assert_eq!(t.hint_rules()[0].bonus, 3);
    }

    #[test]
    fn test_rejects_duplicate_slugs() {
        let toml = r#"
[[categories]]
name = "A"
slug = "a"

[[categories]]
name = "A2"
slug = "A"
"#;
        let err = Taxonomy::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_unknown_hint_slug() {
        let toml = r#"
[[categories]]
name = "A"
slug = "a"

[[hint_rules]]
category_slug = "zzz"
words = ["x"]
"#;
        assert!(Taxonomy::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_find_by_slug_case_insensitive() {
        let t = Taxonomy::builtin();
        assert_eq!(t.find_by_slug("PAYMENT").unwrap().name, "出海支付");
        assert!(t.find_by_slug("nope").is_none());
    }
}
