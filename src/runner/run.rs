use crate::config::Config;
use crate::corpus::{Corpus, Scratch};
use crate::error::Result;
use crate::filter::{Prefilter, Reason, Verdict};
use super::count::LineCounter;
use super::git::Fetcher;
use super::search::{Backend, RepoRef};

use std::path::PathBuf;

use log::{debug, info, warn};

/// Terminal state of one candidate.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Committed to the corpus at the given path.
    Accepted(PathBuf),
    Rejected(Reason),
    /// Already in the corpus, nothing was done.
    Skipped,
    /// A remote call or the clone failed; the candidate was dropped.
    Failed(String),
}

// =============================================================================
// Single Runner
// =============================================================================

/// Drives one candidate through dedup, prefilter, fetch, measure and commit.
pub struct Runner<'a> {
    config: &'a Config,
    backend: &'a dyn Backend,
    fetcher: &'a dyn Fetcher,
    counter: &'a dyn LineCounter,
    corpus: &'a Corpus,
}

impl<'a> Runner<'a> {
    /// Create a new runner
    pub fn new(
        config: &'a Config,
        backend: &'a dyn Backend,
        fetcher: &'a dyn Fetcher,
        counter: &'a dyn LineCounter,
        corpus: &'a Corpus,
    ) -> Self {
        return Self { config, backend, fetcher, counter, corpus };
    }

    /// Decide on REPO. Only errors that threaten the corpus are returned,
    /// everything else ends up in the outcome.
    pub fn run(&self, repo: &RepoRef) -> Result<Outcome> {
        let name = repo.full_name();

        // Never redo an accepted repository
        if self.corpus.contains(repo) {
            debug!("Skipping '{}', already in corpus", name);
            return Ok(Outcome::Skipped);
        }

        // Cheap checks before anything is downloaded
        let language = self.config.search.language.as_str();
        let prefilter = Prefilter::new(&self.config.filter, language);
        match prefilter.check(self.backend, repo) {
            Ok(Verdict::Pass) => {},
            Ok(Verdict::Reject(reason)) => {
                info!("Rejected '{}': {}", name, reason);
                return Ok(Outcome::Rejected(reason));
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Dropping '{}': {}", name, e);
                return Ok(Outcome::Failed(e.to_string()));
            },
        }

        // Clone into scratch
        let scratch = Scratch::new(&self.config.runner.tmp_dir, repo)?;
        if let Err(e) = self.fetcher.shallow_fetch(&repo.url, scratch.path()) {
            warn!("Dropping '{}': {}", name, e);
            scratch.discard()?;
            return Ok(Outcome::Failed(e.to_string()));
        }

        // The measured size is the only one we trust
        let lines = self.counter.measure(scratch.path(), language);
        info!("Measured {} {} lines in '{}'", lines, language, name);

        match prefilter.check_size(lines) {
            Verdict::Pass => {
                let entry = self.corpus.commit(scratch, repo)?;
                info!("Accepted '{}'", name);
                return Ok(Outcome::Accepted(entry));
            },
            Verdict::Reject(reason) => {
                info!("Rejected '{}': {}", name, reason);
                scratch.discard()?;
                return Ok(Outcome::Rejected(reason));
            },
        }
    }
}
