//! Casefile - Evidence Retrieval for Cold Case Investigation
//!
//! Splits case evidence files into overlapping chunks, embeds them into a
//! persistent vector store, and retrieves the nearest chunks for a question
//! so that answers can cite the files they came from.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod retrieval;
pub mod retry;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::{CasefileError, Result};
