#![allow(dead_code)]

use harvester::config::{Config, Filter, Runner, Search, Sort};
use harvester::error::{Error, Result};
use harvester::runner::count::{LineCount, LineCounter};
use harvester::runner::git::Fetcher;
use harvester::runner::search::{Backend, Candidates, RepoRef};

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn repo(owner: &str, name: &str) -> RepoRef {
    RepoRef::from_url(&format!("https://github.com/{}/{}.git", owner, name)).unwrap()
}

/// Config rooted in ROOT with the thresholds 200000 lines, 3 contributors,
/// 20 commits and a single pass.
pub fn config(root: &Path) -> Config {
    Config {
        search: Search {
            query: "language:java".to_string(),
            language: "Java".to_string(),
            sort: Sort::Updated,
            per_page: 100,
            api_url: "http://localhost".to_string(),
            github_api_key: None,
            max_rate_wait_secs: 0,
        },
        filter: Filter {
            min_lines: 200_000,
            min_contributors: 3,
            min_commits: 20,
            min_declared_bytes: None,
        },
        runner: Runner {
            corpus_dir: root.join("corpus"),
            tmp_dir: root.join("tmp"),
            log_dir: root.join("logs"),
            log_level: "debug".to_string(),
            max_passes: Some(1),
            idle_secs: 0,
            git: "git".to_string(),
            cloc: "cloc".to_string(),
        },
    }
}

/// Number of entries in DIR, zero if it does not exist.
pub fn entries(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(d) => d.count(),
        Err(_) => 0,
    }
}

// =============================================================================
// Backend
// =============================================================================

pub enum Item {
    Repo(RepoRef),
    ApiError,
    RateLimited,
    BadLocator,
}

pub struct Meta {
    pub langs: BTreeMap<String, u64>,
    pub contributors: u64,
    pub commits: u64,
    pub broken: bool,
}

impl Meta {
    pub fn new(langs: &[(&str, u64)], contributors: u64, commits: u64) -> Self {
        Self {
            langs: langs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            contributors,
            commits,
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self { langs: BTreeMap::new(), contributors: 0, commits: 0, broken: true }
    }
}

/// Search backend serving the same stream on every search.
#[derive(Default)]
pub struct FakeBackend {
    pub stream: Vec<Item>,
    pub meta: HashMap<String, Meta>,
    pub searches: Cell<usize>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeBackend {
    pub fn add(&mut self, repo: &RepoRef, meta: Meta) {
        self.stream.push(Item::Repo(repo.clone()));
        self.meta.insert(repo.key(), meta);
    }

    /// Accessor calls made for REPO.
    pub fn calls_for(&self, repo: &RepoRef) -> Vec<String> {
        let suffix = format!(":{}", repo.key());
        self.calls.borrow().iter()
            .filter(|c| c.ends_with(&suffix))
            .cloned()
            .collect()
    }

    fn meta(&self, what: &str, repo: &RepoRef) -> Result<&Meta> {
        self.calls.borrow_mut().push(format!("{}:{}", what, repo.key()));
        match self.meta.get(&repo.key()) {
            Some(m) if !m.broken => Ok(m),
            _ => Err(Error::Api(format!("500 for {}", repo.full_name()))),
        }
    }
}

impl Backend for FakeBackend {
    fn search<'a>(&'a self, _query: &str, _sort: Sort) -> Candidates<'a> {
        self.searches.set(self.searches.get() + 1);
        Box::new(self.stream.iter().map(|item| match item {
            Item::Repo(r) => Ok(r.clone()),
            Item::ApiError => Err(Error::Api("422 Unprocessable Entity".to_string())),
            Item::RateLimited => Err(Error::RateLimited { reset: None }),
            Item::BadLocator => Err(Error::Locator("nowhere".to_string())),
        }))
    }

    fn languages(&self, repo: &RepoRef) -> Result<BTreeMap<String, u64>> {
        Ok(self.meta("languages", repo)?.langs.clone())
    }

    fn contributors(&self, repo: &RepoRef) -> Result<u64> {
        Ok(self.meta("contributors", repo)?.contributors)
    }

    fn commits(&self, repo: &RepoRef) -> Result<u64> {
        Ok(self.meta("commits", repo)?.commits)
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Writes a small Java tree instead of cloning.
#[derive(Default)]
pub struct FakeFetcher {
    pub fail: HashSet<String>,
    pub calls: RefCell<Vec<String>>,
    /// Raised after every fetch.
    pub interrupt: Option<Arc<AtomicBool>>,
    /// Created during the fetch, as if someone else wrote it.
    pub intrude: Option<PathBuf>,
}

impl FakeFetcher {
    pub fn fetched(&self, repo: &RepoRef) -> usize {
        self.calls.borrow().iter().filter(|u| **u == repo.url).count()
    }
}

impl Fetcher for FakeFetcher {
    fn shallow_fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.borrow_mut().push(url.to_string());
        if let Some(flag) = &self.interrupt {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(dir) = &self.intrude {
            fs::create_dir_all(dir).unwrap();
        }

        // Failed transfers still leave something behind
        fs::create_dir_all(dest).unwrap();
        fs::write(dest.join("partial"), "x").unwrap();
        if self.fail.contains(url) {
            return Err(Error::Fetch { url: url.to_string(), reason: "gone".to_string() });
        }

        fs::remove_file(dest.join("partial")).unwrap();
        fs::create_dir_all(dest.join("src")).unwrap();
        fs::write(dest.join("src/Main.java"), "class Main {}\n").unwrap();
        Ok(())
    }
}

// =============================================================================
// Line counter
// =============================================================================

/// Reports a fixed line count per scratch directory name (the repo key).
#[derive(Default)]
pub struct FakeCounter {
    pub lines: HashMap<String, u64>,
    pub calls: RefCell<Vec<PathBuf>>,
}

impl FakeCounter {
    pub fn set(&mut self, repo: &RepoRef, lines: u64) {
        self.lines.insert(repo.key(), lines);
    }
}

impl LineCounter for FakeCounter {
    fn count(&self, dir: &Path, _language: &str) -> Option<LineCount> {
        self.calls.borrow_mut().push(dir.to_path_buf());
        assert!(dir.join("src/Main.java").is_file(), "measured before fetch");

        let key = dir.file_name()?.to_str()?;
        let code = *self.lines.get(key)?;
        Some(LineCount { blank: 0, comment: 0, code })
    }
}
