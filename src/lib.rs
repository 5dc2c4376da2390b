//! Collect repositories from a code search API into a local corpus.
//!
//! Candidates are enumerated page by page, checked against cheap metadata
//! first, then cloned into a scratch directory, measured with a line counter
//! and either renamed into the corpus or deleted.

pub mod config;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod logging;
pub mod runner;

pub use error::{Error, Result};
