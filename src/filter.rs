use crate::config::Filter;
use crate::error::Result;
use crate::runner::search::{Backend, RepoRef};

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

/// Why a candidate was turned down.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reason {
    NoLanguage,
    MixedLanguages(Vec<String>),
    WrongLanguage(String),
    DeclaredTooSmall { declared: u64, min: u64 },
    FewContributors { found: u64, min: u64 },
    FewCommits { found: u64, min: u64 },
    TooSmall { lines: u64, min: u64 },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NoLanguage => write!(f, "no language reported"),
            Reason::MixedLanguages(l) => write!(f, "mixed languages: {}", l.join(", ")),
            Reason::WrongLanguage(l) => write!(f, "only language is {}", l),
            Reason::DeclaredTooSmall { declared, min } => {
                write!(f, "declared {} bytes < {}", declared, min)
            },
            Reason::FewContributors { found, min } => {
                write!(f, "{} contributors < {}", found, min)
            },
            Reason::FewCommits { found, min } => write!(f, "{} commits < {}", found, min),
            Reason::TooSmall { lines, min } => write!(f, "{} lines < {}", lines, min),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Pass,
    Reject(Reason),
}

/// Cheap checks on API metadata, and the final size gate.
pub struct Prefilter<'a> {
    filter: &'a Filter,
    language: &'a str,
}

impl<'a> Prefilter<'a> {
    pub fn new(filter: &'a Filter, language: &'a str) -> Self {
        return Self { filter, language };
    }

    /// Run the metadata checks against BACKEND, stopping at the first one
    /// that fails so that no further remote calls are made.
    pub fn check(&self, backend: &dyn Backend, repo: &RepoRef) -> Result<Verdict> {
        let langs = backend.languages(repo)?;
        debug!("Languages of '{}': {:?}", repo.full_name(), langs);
        if let Some(reason) = self.check_languages(&langs) {
            return Ok(Verdict::Reject(reason));
        }

        let contributors = backend.contributors(repo)?;
        if contributors < self.filter.min_contributors {
            return Ok(Verdict::Reject(Reason::FewContributors {
                found: contributors,
                min: self.filter.min_contributors,
            }));
        }

        let commits = backend.commits(repo)?;
        if commits < self.filter.min_commits {
            return Ok(Verdict::Reject(Reason::FewCommits {
                found: commits,
                min: self.filter.min_commits,
            }));
        }

        return Ok(Verdict::Pass);
    }

    /// The map must hold exactly the target language, and optionally enough
    /// declared bytes of it.
    pub fn check_languages(&self, langs: &BTreeMap<String, u64>) -> Option<Reason> {
        if langs.len() > 1 {
            return Some(Reason::MixedLanguages(langs.keys().cloned().collect()));
        }

        let Some((name, bytes)) = langs.iter().next() else {
            return Some(Reason::NoLanguage);
        };
        if !name.eq_ignore_ascii_case(self.language) {
            return Some(Reason::WrongLanguage(name.clone()));
        }

        // Byte counts are only a rough proxy for size
        if let Some(min) = self.filter.min_declared_bytes {
            if *bytes < min {
                return Some(Reason::DeclaredTooSmall { declared: *bytes, min });
            }
        }

        return None;
    }

    /// Authoritative size check on the measured line count, inclusive.
    pub fn check_size(&self, lines: u64) -> Verdict {
        if lines >= self.filter.min_lines {
            return Verdict::Pass;
        }
        return Verdict::Reject(Reason::TooSmall { lines, min: self.filter.min_lines });
    }
}
