//! # Knowledge Digest
//!
//! Turns community chat exports and free-form Markdown submissions into a
//! categorized, deduplicated Markdown knowledge base.
//!
//! The pure pipeline (parsing, segmentation, classification, merge) lives
//! in [`knowledge_digest_core`]; this crate adds configuration, HTTP AI
//! providers, the filesystem document store, orchestration, and the `kd`
//! CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ chat export │──▶│ parse/filter │──▶│  AI filter   │──▶│            │
//! └─────────────┘   └──────────────┘   │ screen+group │   │   merge    │
//!                                      └──────────────┘   │   engine   │──▶ <root>/<category>/*.md
//! ┌─────────────┐   ┌──────────────┐                      │            │    <root>/<category>/meta.json
//! │  Markdown   │──▶│  segmenter   │─────────────────────▶│            │
//! └─────────────┘   └──────────────┘                      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kd categories                         # show the taxonomy
//! kd segment notes.md                   # preview topics
//! kd upload notes.md --dry-run          # plan merges
//! kd digest chat.txt --group 出海群     # full chat pipeline
//! kd stats                              # manifest health
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`completer`] | OpenAI-compatible and Ollama providers |
//! | [`fs_store`] | Filesystem document store |
//! | [`ai_filter`] | Screening, clustering, and summary stages |
//! | [`pipeline`] | Digest and upload orchestration |
//! | [`progress`] | Progress events on stderr |
//! | [`index_cmd`] | Knowledge index listing |
//! | [`stats`] | Per-category counts and manifest drift |
//! | [`categories`] | Taxonomy listing |

pub mod ai_filter;
pub mod categories;
pub mod completer;
pub mod config;
pub mod fs_store;
pub mod index_cmd;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod stats;
