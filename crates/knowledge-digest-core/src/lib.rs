//! # Knowledge Digest Core
//!
//! Shared, I/O-free logic for Knowledge Digest: data models, tokenizer and
//! similarity, title normalization, chat message parsing, topic
//! segmentation, category classification, and the idempotent knowledge
//! merge engine.
//!
//! This crate contains no tokio, filesystem I/O, or HTTP dependencies.
//! Everything that touches the outside world goes through the
//! [`completer::TextCompleter`] and [`store::DocumentStore`] traits, so
//! the whole pipeline can be exercised against in-memory fixtures.

pub mod classify;
pub mod completer;
pub mod error;
pub mod markdown;
pub mod merge;
pub mod message;
pub mod models;
pub mod segment;
pub mod store;
pub mod taxonomy;
pub mod title;
pub mod tokenize;
