//! litrev — a literature-review research assistant.
//!
//! Turn-based research sessions over an LLM: the model plans searches, hits
//! the web and academic indexes, ingests what it finds into a local paper
//! store, and works toward an answer under a turn cap and a cost budget.

pub mod config;
pub mod console;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logger;
pub mod memory;
pub mod researcher;
pub mod search;
