//! Title normalization.
//!
//! Every title the pipeline produces goes through [`normalize_title_with`]:
//! leading enumerations (`一、`, `3.`, `(2)`, `第三章`, Markdown heading
//! marks) and generic boilerplate prefixes (`今日精华：`, `Related
//! resources -`) are stripped until none remain, whitespace is collapsed,
//! and the result is capped at a character bound.
//!
//! Normalization never produces an empty title: if stripping consumes the
//! whole string, the trimmed input is used instead. The function is
//! idempotent.

use regex::Regex;
use std::sync::OnceLock;

/// Default bound for document and topic titles.
pub const DEFAULT_TITLE_MAX_CHARS: usize = 40;
/// Bound for titles derived from message text.
pub const SHORT_TITLE_MAX_CHARS: usize = 24;
/// Bound for tags and category labels.
pub const TAG_MAX_CHARS: usize = 10;

fn enumeration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:",
            r"第[一二三四五六七八九十百零〇0-9]+[章节部分条点期][、.．:：]?\s*",
            r"|[一二三四五六七八九十百零〇]+[、.．:：)）]\s*",
            r"|[(（]\s*[0-9一二三四五六七八九十]{1,3}\s*[)）]\s*",
            r"|[0-9]{1,3}[.．)）、]\s*",
            r"|(?:#{1,6}|[-*•>])\s+",
            r")"
        ))
        .expect("valid enumeration regex")
    })
}

fn boilerplate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^(?:",
            r"今日(?:精华|要点|亮点|热点|话题|分享)",
            r"|本期(?:精华|要点|亮点)",
            r"|相关(?:资源|链接|讨论|阅读)",
            r"|精华(?:摘要|内容|总结)",
            r"|话题(?:总结|摘要)",
            r"|today'?s\s+highlights",
            r"|related\s+(?:resources|links)",
            r"|key\s+takeaways",
            r")\s*[:：\-—|｜]?\s*"
        ))
        .expect("valid boilerplate regex")
    })
}

fn emoji_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{Extended_Pictographic}\x{FE0F}\x{200D}\x{20E3}]")
            .expect("valid emoji regex")
    })
}

/// Normalize a title with the default 40-character bound.
pub fn normalize_title(raw: &str) -> String {
    normalize_title_with(raw, DEFAULT_TITLE_MAX_CHARS)
}

/// Normalize a title, capping it at `max_chars` characters.
pub fn normalize_title_with(raw: &str, max_chars: usize) -> String {
    let trimmed = collapse_whitespace(raw);
    let stripped = truncate_chars(&strip_prefixes(&trimmed), max_chars);
    if stripped.is_empty() {
        truncate_chars(&trimmed, max_chars)
    } else {
        stripped
    }
}

/// Remove emoji and pictographs, then collapse whitespace.
pub fn strip_emoji(text: &str) -> String {
    collapse_whitespace(&emoji_regex().replace_all(text, " "))
}

/// Truncate to at most `max_chars` characters, trimming trailing whitespace.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_prefixes(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    if let Some(m) = enumeration_regex().find(text) {
        // "3.5 版本" is a version number, not an enumeration.
        let rest = &text[m.end()..];
        let is_decimal = m.as_str().ends_with(['.', '．'])
            && rest.chars().next().is_some_and(|c| c.is_ascii_digit());
        if !is_decimal {
            return rest.trim_start().to_string();
        }
    }
    if let Some(m) = boilerplate_regex().find(text) {
        return text[m.end()..].trim_start().to_string();
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_cjk_enumeration() {
        assert_eq!(normalize_title("一、Cursor 使用技巧"), "Cursor 使用技巧");
        assert_eq!(normalize_title("三）部署经验"), "部署经验");
        assert_eq!(normalize_title("第二章 支付接入"), "支付接入");
    }

    #[test]
    fn test_ordinal_phrase_is_not_enumeration() {
        assert_eq!(normalize_title("第一个 Agent 上线"), "第一个 Agent 上线");
        assert_eq!(normalize_title("第3期 出海周报"), "出海周报");
    }

    #[test]
    fn test_strips_arabic_enumeration() {
        assert_eq!(normalize_title("1. Stripe 支付"), "Stripe 支付");
        assert_eq!(normalize_title("2) 域名选择"), "域名选择");
        assert_eq!(normalize_title("3、模型对比"), "模型对比");
        assert_eq!(normalize_title("(4) 小结一下"), "小结一下");
    }

    #[test]
    fn test_keeps_version_numbers() {
        assert_eq!(normalize_title("3.5 Sonnet 发布"), "3.5 Sonnet 发布");
    }

    #[test]
    fn test_strips_markdown_heading_marks() {
        assert_eq!(normalize_title("## 开发工具推荐"), "开发工具推荐");
    }

    #[test]
    fn test_strips_boilerplate() {
        assert_eq!(normalize_title("今日精华：Claude 新功能"), "Claude 新功能");
        assert_eq!(
            normalize_title("Today's Highlights - New models"),
            "New models"
        );
        assert_eq!(normalize_title("相关资源 | 开源项目"), "开源项目");
    }

    #[test]
    fn test_strips_repeatedly() {
        assert_eq!(normalize_title("1. 今日精华：一、出海支付"), "出海支付");
    }

    #[test]
    fn test_never_empty_when_input_not_blank() {
        assert_eq!(normalize_title("今日精华"), "今日精华");
        assert_eq!(normalize_title("1."), "1.");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn test_caps_length() {
        let long = "很".repeat(60);
        assert_eq!(normalize_title(&long).chars().count(), 40);
        assert_eq!(normalize_title_with(&long, 10).chars().count(), 10);
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize_title("  Cursor   使用\t技巧 "), "Cursor 使用 技巧");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "一、Cursor 使用技巧",
            "1. 今日精华：一、出海支付",
            "今日精华",
            "1. 2.",
            "3.5 Sonnet 发布",
            "## Related resources: docs",
            "",
            "  a  ",
            "(1) 第三章 一、 相关资源：部署",
        ];
        for s in samples {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once, "not idempotent for {s:?}");
            let short = normalize_title_with(s, 5);
            assert_eq!(normalize_title_with(&short, 5), short, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_strip_emoji() {
        assert_eq!(strip_emoji("🚀 Cursor 技巧 ✨"), "Cursor 技巧");
        assert_eq!(strip_emoji("plain"), "plain");
    }
}
