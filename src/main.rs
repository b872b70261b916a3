//! # Knowledge Digest CLI (`kd`)
//!
//! The `kd` binary runs the chat digest and Markdown upload pipelines
//! against a knowledge tree, and offers preview commands for each stage.
//!
//! ## Usage
//!
//! ```bash
//! kd --config ./config/kd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kd digest <chat.txt> --group <g>` | Full chat pipeline, prints the run report |
//! | `kd upload <doc.md>` | Segment a Markdown document and merge its topics |
//! | `kd parse <chat.txt>` | Preview parsed, filtered, merged messages as JSON |
//! | `kd segment <doc.md>` | Preview segmented and classified topics as JSON |
//! | `kd classify "<text>"` | Print category and confidence |
//! | `kd estimate <chat.txt>` | Print the AI token and cost estimate |
//! | `kd index` | List the knowledge index |
//! | `kd stats` | Per-category document counts and manifest drift |
//! | `kd categories` | List the taxonomy |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what an upload would do
//! kd upload notes.md --dry-run
//!
//! # Merge everything from a document into one page
//! kd upload notes.md --target payment/stripe.md
//!
//! # Digest a chat export without calling the AI provider
//! kd digest chat.txt --group 出海群 --no-ai
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use knowledge_digest::ai_filter::estimate_cost;
use knowledge_digest::categories;
use knowledge_digest::completer::create_completer;
use knowledge_digest::config::{self, Config};
use knowledge_digest::index_cmd;
use knowledge_digest::logging;
use knowledge_digest::pipeline::{self, DigestOptions, UploadOptions};
use knowledge_digest::progress::{format_number, ProgressMode};
use knowledge_digest::stats;
use knowledge_digest_core::classify::Classifier;
use knowledge_digest_core::completer::{DisabledCompleter, TextCompleter};
use knowledge_digest_core::message::{filter_noise, merge_consecutive, MessageParser};
use knowledge_digest_core::models::RawMessage;
use knowledge_digest_core::segment::Segmenter;

/// Knowledge Digest CLI: turn chat exports and Markdown into a categorized
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kd",
    about = "Knowledge Digest: turn chat exports and Markdown into a categorized knowledge base",
    version,
    long_about = "Knowledge Digest parses community chat exports and Markdown submissions into \
    topics, classifies each topic against a fixed category taxonomy, and creates or merges \
    knowledge documents idempotently."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kd.toml`. Preview commands (`parse`,
    /// `segment`, `classify`, `estimate`) fall back to built-in defaults
    /// when the file is missing.
    #[arg(long, global = true, default_value = "./config/kd.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the chat digest pipeline.
    ///
    /// Parses the export, drops noise, merges consecutive messages,
    /// screens and clusters them into topics, and merges topics at or
    /// above `pipeline.kb_min_importance` into the knowledge base.
    Digest {
        /// Chat export text file.
        path: PathBuf,

        /// Group name recorded on every message.
        #[arg(long, default_value = "")]
        group: String,

        /// Report date (YYYY-MM-DD). Defaults to the first message's date.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Plan merges without writing.
        #[arg(long)]
        dry_run: bool,

        /// Skip the AI provider and use heuristic clustering.
        #[arg(long)]
        no_ai: bool,
    },

    /// Segment a Markdown document and merge its topics.
    Upload {
        /// Markdown file.
        path: PathBuf,

        /// Merge marker date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Merge every topic into this document (path under the knowledge root).
        #[arg(long)]
        target: Option<String>,

        /// Plan merges without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print parsed, filtered, and merged messages as JSON.
    Parse {
        path: PathBuf,

        #[arg(long, default_value = "")]
        group: String,
    },

    /// Print segmented and classified topics as JSON.
    Segment { path: PathBuf },

    /// Classify a piece of text.
    Classify {
        text: String,

        /// Explicit category hint (name or slug).
        #[arg(long, default_value = "")]
        hint: String,
    },

    /// Estimate AI tokens and cost for a chat export.
    Estimate { path: PathBuf },

    /// List the knowledge index.
    Index {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Write JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show per-category document counts and manifest drift.
    Stats,

    /// List the category taxonomy.
    Categories,
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))
}

fn parse_messages(cfg: &Config, path: &Path, group: &str) -> Result<Vec<RawMessage>> {
    let export = read_input(path)?;
    let parsed = MessageParser::new(group).parse(&export);
    Ok(merge_consecutive(
        filter_noise(parsed),
        chrono::Duration::seconds(cfg.pipeline.merge_window_secs),
    ))
}

/// Config for preview commands: the file when it loads, else defaults.
fn preview_config(path: &Path) -> Config {
    match config::load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::debug!(error = %e, "using default config");
            Config::minimal()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Digest {
            path,
            group,
            date,
            dry_run,
            no_ai,
        } => {
            let cfg = config::load_config(&cli.config)?;
            let completer: Box<dyn TextCompleter> = if no_ai {
                Box::new(DisabledCompleter)
            } else {
                create_completer(&cfg.ai)?
            };
            let options = DigestOptions {
                path,
                group,
                date,
                dry_run,
                no_ai,
            };
            pipeline::run_digest(&cfg, &options, completer.as_ref(), progress.as_ref()).await?;
        }
        Commands::Upload {
            path,
            date,
            target,
            dry_run,
        } => {
            let cfg = config::load_config(&cli.config)?;
            let options = UploadOptions {
                path,
                date,
                target,
                dry_run,
            };
            pipeline::run_upload(&cfg, &options, progress.as_ref()).await?;
        }
        Commands::Parse { path, group } => {
            let cfg = preview_config(&cli.config);
            let messages = parse_messages(&cfg, &path, &group)?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Commands::Segment { path } => {
            let cfg = preview_config(&cli.config);
            let taxonomy = cfg.load_taxonomy()?;
            let segmenter = Segmenter::new(Classifier::new(&taxonomy), cfg.merge.title_max_chars);
            let document = read_input(&path)?;
            let (format, _) = segmenter.split(&document);
            eprintln!("format: {:?}", format);
            println!(
                "{}",
                serde_json::to_string_pretty(&segmenter.segment(&document))?
            );
        }
        Commands::Classify { text, hint } => {
            let cfg = preview_config(&cli.config);
            let taxonomy = cfg.load_taxonomy()?;
            let result = Classifier::new(&taxonomy).classify_topic(&hint, "", &text);
            match result.category {
                Some(cat) => println!("category: {} ({})", cat.name, cat.slug),
                None => println!("category: none"),
            }
            println!("confidence: {:.2}", result.confidence);
            println!("score: {}", result.score);
            println!("manual: {}", result.manual);
        }
        Commands::Estimate { path } => {
            let cfg = preview_config(&cli.config);
            let messages = parse_messages(&cfg, &path, "")?;
            let est = estimate_cost(messages.len(), cfg.ai.batch_size);
            println!("estimate {}", path.display());
            println!("  messages: {}", format_number(est.messages as u64));
            println!("  screening batches: {}", est.screening_batches);
            println!("  screening tokens: {}", format_number(est.screening_tokens));
            println!("  clustering tokens: {}", format_number(est.clustering_tokens));
            println!("  summary tokens: {}", format_number(est.summary_tokens));
            println!("  total tokens: {}", format_number(est.total_tokens));
            println!("  estimated cost: ${:.4}", est.estimated_usd);
            println!("ok");
        }
        Commands::Index { json, output } => {
            let cfg = config::load_config(&cli.config)?;
            index_cmd::run_index(&cfg, json, output.as_deref()).await?;
        }
        Commands::Stats => {
            let cfg = config::load_config(&cli.config)?;
            stats::run_stats(&cfg).await?;
        }
        Commands::Categories => {
            let cfg = preview_config(&cli.config);
            categories::list_categories(&cfg)?;
        }
    }

    Ok(())
}
