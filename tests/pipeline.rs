use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use knowledge_digest::config::{parse_config, Config};
use knowledge_digest::pipeline::{
    digest, upload, DigestOptions, PlannedAction, RunOutcome, UploadOptions,
};
use knowledge_digest::progress::NoProgress;
use knowledge_digest_core::completer::FixedCompleter;
use knowledge_digest_core::models::TopicOutcome;

const CHAT: &str = "2024-11-01 09:00 张三：cursor 的规则文件怎么写\n\
2024-11-01 09:20 李四：我一般放在项目根目录\n\
2024-11-01 09:30 王五：哈哈哈 今天好热\n";

const CLUSTERS: &str = r#"好的：
{"topics": [{"title": "1. Cursor 规则文件", "summary": "规则文件放在项目根目录，团队共享同一份配置。",
  "category": "开发工具", "importance": 4, "tags": ["cursor"], "message_indices": [0, 1]}]}"#;

fn config(root: &Path) -> Config {
    parse_config(&format!(
        r#"[knowledge]
root = "{root}/kb"

[pipeline]
reports_dir = "{root}/reports"

[ai]
provider = "openai"
model = "gpt-4o-mini"
batch_delay_ms = 0
"#,
        root = root.display()
    ))
    .unwrap()
}

fn chat_options(tmp: &TempDir) -> DigestOptions {
    let path = tmp.path().join("chat.txt");
    fs::write(&path, CHAT).unwrap();
    DigestOptions {
        path,
        group: "出海群".to_string(),
        date: None,
        dry_run: false,
        no_ai: false,
    }
}

#[tokio::test]
async fn test_digest_with_model_responses() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let completer = FixedCompleter::scripted(["[1,1,0]", CLUSTERS, "今天主要讨论了 Cursor 规则文件。"]);

    let run = digest(&cfg, &chat_options(&tmp), &completer, &NoProgress)
        .await
        .unwrap();

    assert_eq!(run.date.to_string(), "2024-11-01");
    assert_eq!(run.messages, 3);
    assert_eq!(run.survivors, 2);
    assert!(!run.heuristic);
    assert_eq!(run.topics.len(), 1);
    assert_eq!(run.topics[0].title, "Cursor 规则文件");
    assert_eq!(run.topics[0].suggested_category_slug, "dev-tools");
    assert_eq!(run.topics[0].source_message_ids.len(), 2);
    assert_eq!(run.summary, "今天主要讨论了 Cursor 规则文件。");

    let report = run.outcome.report().unwrap();
    assert_eq!(report.created(), 1);
    assert!(matches!(
        &report.results[0].outcome,
        TopicOutcome::Created { path, .. } if path == "dev-tools/cursor-规则文件.md"
    ));

    let doc = fs::read_to_string(tmp.path().join("kb/dev-tools/cursor-规则文件.md")).unwrap();
    assert!(doc.contains("tags: cursor"));
    assert!(doc.contains("规则文件放在项目根目录"));

    let daily = fs::read_to_string(run.report_path.unwrap()).unwrap();
    assert!(daily.contains("今天主要讨论了 Cursor 规则文件。"));
    assert!(daily.contains("## Cursor 规则文件"));
}

#[tokio::test]
async fn test_digest_survives_provider_failure() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let completer = FixedCompleter::failing("503 Service Unavailable");

    let run = digest(&cfg, &chat_options(&tmp), &completer, &NoProgress)
        .await
        .unwrap();

    // Screening failed open, clustering fell back to keyword grouping
    assert_eq!(run.survivors, 3);
    assert!(run.heuristic);
    assert_eq!(run.topics.len(), 1);
    assert_eq!(run.topics[0].suggested_category_slug, "dev-tools");
    assert_eq!(run.summary, "今日共整理 1 个话题，涵盖 开发工具。");
    // Heuristic importance is below the default gate
    assert_eq!(run.kb_topics, 0);
}

#[tokio::test]
async fn test_digest_no_ai_never_calls_provider() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let completer = FixedCompleter::always("[1,1,1]");
    let mut options = chat_options(&tmp);
    options.no_ai = true;

    let run = digest(&cfg, &options, &completer, &NoProgress).await.unwrap();
    assert!(run.heuristic);
    assert!(completer.prompts().is_empty());
}

#[tokio::test]
async fn test_upload_dry_run_plans_merge() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let kb = tmp.path().join("kb/payment");
    fs::create_dir_all(&kb).unwrap();
    fs::write(kb.join("stripe.md"), "---\ntitle: Stripe 订阅 退款\n---\n\nbody\n").unwrap();

    let doc = tmp.path().join("notes.md");
    fs::write(
        &doc,
        "## Stripe 订阅 退款\n\nstripe 订阅 退款\n\n## 开发工具 | Cursor 快捷键\n\n常用快捷键整理，多光标与命令面板。\n",
    )
    .unwrap();

    let run = upload(
        &cfg,
        &UploadOptions {
            path: doc,
            date: None,
            target: None,
            dry_run: true,
        },
        &NoProgress,
    )
    .await
    .unwrap();

    let RunOutcome::Planned(plan) = run.outcome else {
        panic!("expected a plan");
    };
    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan[0].action,
        PlannedAction::Merge {
            path: "payment/stripe.md".to_string(),
            score: 1.0
        }
    );
    assert!(matches!(&plan[1].action, PlannedAction::Create { path } if path.starts_with("dev-tools/")));
    assert_eq!(
        fs::read_to_string(kb.join("stripe.md")).unwrap(),
        "---\ntitle: Stripe 订阅 退款\n---\n\nbody\n"
    );
}

#[tokio::test]
async fn test_dry_run_after_upload_plans_skips() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let doc = tmp.path().join("notes.md");
    fs::write(
        &doc,
        "## 出海支付 | PayPal 收款\n\nPayPal 收款手续费和提现周期对比。\n\n## 开发工具 | Cursor 快捷键\n\n常用快捷键整理，多光标与命令面板。\n",
    )
    .unwrap();
    let options = |dry_run| UploadOptions {
        path: doc.clone(),
        date: NaiveDate::from_ymd_opt(2024, 11, 1),
        target: None,
        dry_run,
    };

    let applied = upload(&cfg, &options(false), &NoProgress).await.unwrap();
    assert_eq!(applied.outcome.report().unwrap().created(), 2);

    let planned = upload(&cfg, &options(true), &NoProgress).await.unwrap();
    let RunOutcome::Planned(plan) = planned.outcome else {
        panic!("expected a plan");
    };
    assert_eq!(plan.len(), 2);
    for item in &plan {
        assert!(
            matches!(&item.action, PlannedAction::Skip { reason } if reason.starts_with("already merged into")),
            "{:?}",
            item.action
        );
    }
}

#[tokio::test]
async fn test_upload_missing_target_creates() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let doc = tmp.path().join("notes.md");
    fs::write(&doc, "## 出海支付 | PayPal 收款\n\nPayPal 收款手续费和提现周期对比。\n").unwrap();

    let run = upload(
        &cfg,
        &UploadOptions {
            path: doc,
            date: None,
            target: Some("payment/missing.md".to_string()),
            dry_run: false,
        },
        &NoProgress,
    )
    .await
    .unwrap();

    let report = run.outcome.report().unwrap();
    assert_eq!(report.created(), 1);
    assert!(tmp.path().join("kb/payment/paypal-收款.md").exists());
    assert!(!tmp.path().join("kb/payment/missing.md").exists());
}

#[tokio::test]
async fn test_missing_input_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let err = upload(
        &cfg,
        &UploadOptions {
            path: tmp.path().join("nope.md"),
            date: None,
            target: None,
            dry_run: false,
        },
        &NoProgress,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Failed to read input file"));
}
