//! # Docs Copilot Core
//!
//! Runtime-free logic for Docs Copilot: data models, the error type,
//! markdown cleaning, heading-aware chunking, capability traits, the
//! vector store abstraction, ranking, and prompt construction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Those
//! live in the `docs-copilot` crate.

pub mod chunk;
pub mod clean;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod markdown;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;

pub use error::{Error, Result};
