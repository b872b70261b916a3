//! Category listing.
//!
//! `kd categories` prints the active taxonomy: every category in
//! enumeration order (which is also the classifier's tie-break order),
//! followed by the hint rules layered on top of keyword scoring.

use anyhow::Result;
use std::fmt::Write;

use knowledge_digest_core::taxonomy::Taxonomy;

use crate::config::Config;

/// Render the taxonomy table.
pub fn render_categories(taxonomy: &Taxonomy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "taxonomy {}", taxonomy.version());
    let _ = writeln!(
        out,
        "{:<6} {:<16} {:<14} {:>8}  DESCRIPTION",
        "ORDER", "SLUG", "NAME", "KEYWORDS"
    );
    for cat in taxonomy.categories() {
        let _ = writeln!(
            out,
            "{:<6} {:<16} {:<14} {:>8}  {} {}",
            cat.order,
            cat.slug,
            cat.name,
            cat.keywords.len(),
            cat.icon,
            cat.description
        );
    }

    for rule in taxonomy.hint_rules() {
        let _ = writeln!(
            out,
            "hint +{} → {}: {}",
            rule.bonus,
            rule.category_slug,
            rule.words.join(", ")
        );
    }
    out
}

pub fn list_categories(config: &Config) -> Result<()> {
    let taxonomy = config.load_taxonomy()?;
    print!("{}", render_categories(&taxonomy));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_builtin_taxonomy() {
        let out = render_categories(&Taxonomy::builtin());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "taxonomy builtin-1");
        assert!(lines[1].starts_with("ORDER"));
        assert!(lines[2].contains("dev-tools"));
        assert!(lines.iter().any(|l| l.contains("misc") && l.contains("0  📦")));
        assert!(out.contains("hint +3 → payment: 订阅, 付费"));
    }
}
