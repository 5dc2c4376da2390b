pub mod count;
pub mod git;
pub mod run;
pub mod search;

use crate::config::Config;
use crate::corpus::{clear_scratch, Corpus};
use crate::error::{Error, Result};
use count::{Cloc, LineCounter};
use git::{Fetcher, Git};
use run::{Outcome, Runner};
use search::{Backend, GitHub, RepoRef};

use std::collections::HashSet;
use std::fmt;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};

const POLL: Duration = Duration::from_millis(250);

/// Wait used when a rate limit gives no reset time.
const DEFAULT_RATE_WAIT: u64 = 60;

// =============================================================================
// Totals
// =============================================================================

/// Counters for one pass, or summed over many.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Totals {
    pub seen: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl Totals {
    pub fn record(&mut self, outcome: &Outcome) {
        self.seen += 1;
        match outcome {
            Outcome::Accepted(_) => self.accepted += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, other: Self) {
        self.seen += other.seen;
        self.accepted += other.accepted;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} found of {} seen ({} skipped, {} rejected, {} failed)",
               self.accepted, self.seen, self.skipped, self.rejected, self.failed)
    }
}

// =============================================================================
// Top-Level Crawler
// =============================================================================

/// Install SIGINT/SIGTERM handlers that raise the returned flag. A second
/// signal while the flag is raised exits immediately.
pub fn register_interrupt() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(sig, 1, Arc::clone(&flag))
            .map_err(Error::Signal)?;
        signal_hook::flag::register(sig, Arc::clone(&flag))
            .map_err(Error::Signal)?;
    }
    return Ok(flag);
}

/// Search, filter and collect repositories until interrupted.
pub fn crawl(config: &Config, interrupt: Arc<AtomicBool>) -> Result<Totals> {
    let backend = GitHub::new(&config.search)?;
    let git = Git::new(&config.runner.git);
    let cloc = Cloc::new(&config.runner.cloc);
    let corpus = Corpus::open(&config.runner.corpus_dir)?;
    info!("Corpus at {:?} holds {} entries", corpus.root(), corpus.count()?);

    let crawler = Crawler::new(config, &backend, &git, &cloc, &corpus, interrupt);
    return crawler.run();
}

/// Run a single pass of the search only, printing each candidate.
pub fn search(config: &Config, interrupt: Arc<AtomicBool>) -> Result<Totals> {
    let backend = GitHub::new(&config.search)?;
    let git = Git::new(&config.runner.git);
    let cloc = Cloc::new(&config.runner.cloc);
    let corpus = Corpus::open(&config.runner.corpus_dir)?;

    let crawler = Crawler::new(config, &backend, &git, &cloc, &corpus, interrupt);
    let totals = crawler.list(|repo, present| {
        let mark = if present { " (in corpus)" } else { "" };
        println!("{}{}", repo.full_name(), mark);
    });
    return Ok(totals);
}

/// The resumable enumerator: runs passes over the search results and feeds
/// every candidate to a `Runner`.
pub struct Crawler<'a> {
    config: &'a Config,
    backend: &'a dyn Backend,
    corpus: &'a Corpus,
    runner: Runner<'a>,
    interrupt: Arc<AtomicBool>,
}

impl<'a> Crawler<'a> {
    pub fn new(
        config: &'a Config,
        backend: &'a dyn Backend,
        fetcher: &'a dyn Fetcher,
        counter: &'a dyn LineCounter,
        corpus: &'a Corpus,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        let runner = Runner::new(config, backend, fetcher, counter, corpus);
        return Self { config, backend, corpus, runner, interrupt };
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Run passes until interrupted or `max_passes` is reached, returning
    /// the totals summed over all passes.
    pub fn run(&self) -> Result<Totals> {
        let max_passes = self.config.runner.max_passes;
        let mut cumulative = Totals::default();
        let mut passes = 0;

        // A forced exit of an earlier run can leave scratch behind
        let cleared = clear_scratch(&self.config.runner.tmp_dir)?;
        if cleared > 0 {
            warn!("Removed {} leftover scratch directories", cleared);
        }

        while !self.interrupted() {
            if max_passes.map_or(false, |m| passes >= m) {
                break;
            }
            passes += 1;

            info!("Starting pass {}", passes);
            let totals = match self.pass() {
                Ok(t) => t,
                Err(e) => {
                    error!("Stopping after {} passes: {}", passes, cumulative);
                    return Err(e);
                },
            };
            cumulative += totals;
            info!("Pass {}: {}", passes, totals);

            // Nothing came back, don't hammer the API
            let last = max_passes.map_or(false, |m| passes >= m);
            if totals.seen == 0 && !last {
                self.wait(self.config.runner.idle_secs);
            }
        }

        info!("Finished after {} passes: {}", passes, cumulative);
        return Ok(cumulative);
    }

    /// One traversal of the search results. The interrupt is honored between
    /// candidates, so the candidate in flight always reaches a decision.
    pub fn pass(&self) -> Result<Totals> {
        let search = &self.config.search;
        let mut totals = Totals::default();
        let mut seen = HashSet::new();

        for item in self.backend.search(&search.query, search.sort) {
            if self.interrupted() {
                info!("Interrupted, ending pass");
                break;
            }

            let repo = match item {
                Ok(repo) => repo,
                Err(Error::RateLimited { reset }) => {
                    self.wait_for_reset(reset);
                    continue;
                },
                Err(e @ Error::Locator(_)) => {
                    warn!("Skipping search result: {}", e);
                    totals.record(&Outcome::Failed(e.to_string()));
                    continue;
                },
                Err(e) => {
                    warn!("Search failed, ending pass: {}", e);
                    break;
                },
            };

            // Recently updated repos move up and reappear on later pages
            if !seen.insert(repo.key()) {
                debug!("'{}' already handled in this pass", repo.full_name());
                continue;
            }

            let outcome = self.runner.run(&repo)?;
            totals.record(&outcome);
        }

        return Ok(totals);
    }

    /// One pass without fetching anything. F receives each candidate and
    /// whether it is already in the corpus.
    pub fn list<F: FnMut(&RepoRef, bool)>(&self, mut f: F) -> Totals {
        let search = &self.config.search;
        let mut totals = Totals::default();
        let mut seen = HashSet::new();

        for item in self.backend.search(&search.query, search.sort) {
            if self.interrupted() {
                break;
            }
            match item {
                Ok(repo) if !seen.insert(repo.key()) => {},
                Ok(repo) => {
                    let present = self.corpus.contains(&repo);
                    totals.seen += 1;
                    if present {
                        totals.skipped += 1;
                    }
                    f(&repo, present);
                },
                Err(Error::RateLimited { reset }) => self.wait_for_reset(reset),
                Err(e) => warn!("Search error: {}", e),
            }
        }

        return totals;
    }

    /// Sleep until RESET (unix seconds), bounded by the configured maximum.
    fn wait_for_reset(&self, reset: Option<i64>) {
        let max = self.config.search.max_rate_wait_secs;
        let secs = reset_delay(reset, Utc::now().timestamp(), max);
        warn!("Rate limited, waiting {}s", secs);
        self.wait(secs);
    }

    /// Sleep for SECS, waking early if interrupted.
    fn wait(&self, secs: u64) {
        let end = Instant::now() + Duration::from_secs(secs);
        while !self.interrupted() {
            let now = Instant::now();
            if now >= end {
                break;
            }
            thread::sleep(POLL.min(end - now));
        }
    }
}

/// Seconds to wait for a rate limit resetting at RESET, seen at NOW.
fn reset_delay(reset: Option<i64>, now: i64, max: u64) -> u64 {
    let secs = match reset {
        Some(r) => (r - now).max(1) as u64,
        None => DEFAULT_RATE_WAIT,
    };
    return secs.min(max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Reason;
    use std::path::PathBuf;

    #[test]
    fn record_counts_every_outcome_as_seen() {
        let mut t = Totals::default();
        t.record(&Outcome::Accepted(PathBuf::from("x")));
        t.record(&Outcome::Skipped);
        t.record(&Outcome::Failed("boom".to_string()));
        t.record(&Outcome::Rejected(Reason::NoLanguage));
        assert_eq!(t, Totals { seen: 4, accepted: 1, skipped: 1, rejected: 1, failed: 1 });
    }

    #[test]
    fn totals_add_up() {
        let mut a = Totals { seen: 3, accepted: 1, skipped: 1, rejected: 1, failed: 0 };
        let b = Totals { seen: 2, accepted: 1, skipped: 0, rejected: 0, failed: 1 };
        a += b;
        assert_eq!(a, Totals { seen: 5, accepted: 2, skipped: 1, rejected: 1, failed: 1 });
        assert_eq!(a.to_string(), "2 found of 5 seen (1 skipped, 1 rejected, 1 failed)");
    }

    #[test]
    fn reset_delay_is_bounded() {
        assert_eq!(reset_delay(Some(1_000), 900, 900), 100);
        assert_eq!(reset_delay(Some(5_000), 0, 900), 900);
        assert_eq!(reset_delay(Some(10), 20, 900), 1);
        assert_eq!(reset_delay(None, 0, 900), DEFAULT_RATE_WAIT);
        assert_eq!(reset_delay(None, 0, 5), 5);
    }
}
