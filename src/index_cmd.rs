//! List the knowledge index.
//!
//! Prints the same title/url/path entries the merge engine matches topics
//! against, either as a table or as JSON. With `--output` the JSON is
//! written to a file for static-site consumers.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use knowledge_digest_core::merge::MergeEngine;
use knowledge_digest_core::models::KnowledgeIndexEntry;

use crate::config::{Config, MergeStage};
use crate::fs_store::FsDocumentStore;

#[derive(Serialize)]
struct IndexExport<'a> {
    root: String,
    documents: &'a [KnowledgeIndexEntry],
}

/// Build the knowledge index from `[knowledge].root`.
pub async fn load_index(config: &Config) -> Result<Vec<KnowledgeIndexEntry>> {
    let store = FsDocumentStore::new(&config.knowledge)?;
    let taxonomy = config.load_taxonomy()?;
    let engine = MergeEngine::new(&store, &taxonomy, config.merge_settings(MergeStage::Upload));
    Ok(engine.build_index().await?)
}

pub async fn run_index(config: &Config, json: bool, output: Option<&Path>) -> Result<()> {
    let entries = load_index(config).await?;

    if json || output.is_some() {
        let data = IndexExport {
            root: config.knowledge.root.display().to_string(),
            documents: &entries,
        };
        let rendered = serde_json::to_string_pretty(&data)?;
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &rendered)?;
                eprintln!("Exported {} documents to {}", entries.len(), path.display());
            }
            None => println!("{}", rendered),
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No documents under {}.", config.knowledge.root.display());
        return Ok(());
    }

    println!("{:<40} {:<40} URL", "TITLE", "PATH");
    for entry in &entries {
        println!("{:<40} {:<40} {}", entry.title, entry.file_path, entry.url);
    }
    println!();
    println!("{} documents", entries.len());

    Ok(())
}
