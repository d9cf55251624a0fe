//! # Docs Copilot
//!
//! A local-first documentation copilot for markdown knowledge bases.
//!
//! Docs Copilot discovers markdown files, cleans them, splits them into
//! heading-aware chunks, embeds the chunks into a SQLite-backed vector
//! store, and answers questions by retrieving the closest chunks and
//! generating a cited answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌──────────┐
//! │ Discovery │──▶│ Clean + Chunk │──▶│  Embed   │──┐
//! │  + Parse  │   │               │   │          │  │
//! └───────────┘   └───────────────┘   └──────────┘  ▼
//!                                              ┌──────────┐
//!                                              │  SQLite  │
//!                                              │  store   │
//!                                              └────┬─────┘
//!                 ┌──────────┐   ┌───────────┐      │
//!     question ──▶│ Retrieve │◀──┤   Rank    │◀─────┘
//!                 └────┬─────┘   └───────────┘
//!                      ▼
//!                 ┌──────────┐
//!                 │ Generate │──▶ answer + citations
//!                 └──────────┘
//! ```
//!
//! Runtime-free logic (models, cleaning rules, chunking, ranking, prompt
//! construction, the store contract) lives in the `docs-copilot-core`
//! crate and is re-exported here.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`discovery`] | Markdown discovery and front-matter parsing |
//! | [`clean`] | Rule-based cleaning with optional delegation |
//! | [`ingest`] | Concurrent ingestion pipeline |
//! | [`retrieve`] | Query embedding and vector search |
//! | [`generate`] | Grounded answer generation |
//! | [`providers`] | Ollama / OpenAI HTTP backends |
//! | [`sqlite_store`] | SQLite [`VectorStore`](docs_copilot_core::store::VectorStore) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`copilot`] | The [`Copilot`] facade |

pub mod clean;
pub mod config;
pub mod copilot;
pub mod db;
pub mod discovery;
pub mod generate;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod providers;
pub mod retrieve;
pub mod sqlite_store;

pub use docs_copilot_core;
pub use docs_copilot_core::{Error, Result};

pub use copilot::{Copilot, Status};
pub use ingest::{IngestMode, IngestReport};
