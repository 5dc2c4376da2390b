use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::error::{Error, Result};

lazy_static! {
    // Languages that both the search API and cloc name the same way
    static ref LANGS: HashSet<&'static str> = {
        let mut l = HashSet::new();
        l.insert("C");
        l.insert("C++");
        l.insert("C#");
        l.insert("Go");
        l.insert("Java");
        l.insert("JavaScript");
        l.insert("Kotlin");
        l.insert("PHP");
        l.insert("Python");
        l.insert("Ruby");
        l.insert("Rust");
        l.insert("Scala");
        l.insert("Swift");
        l.insert("TypeScript");
        l
    };
}

/// Environment variable holding the API token when the config has none.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Top level configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub search: Search,
    pub filter: Filter,
    pub runner: Runner,
}

/// Order in which the search backend returns candidates.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Relevance,
    #[default]
    Updated,
}

/// Configuration for the candidate search.
#[derive(Clone, Debug, Deserialize)]
pub struct Search {
    pub query: String,
    pub language: String,
    #[serde(default)]
    pub sort: Sort,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub github_api_key: Option<String>,
    #[serde(default = "default_rate_wait")]
    pub max_rate_wait_secs: u64,
}

/// Thresholds every accepted repository must meet.
#[derive(Clone, Debug, Deserialize)]
pub struct Filter {
    pub min_lines: u64,
    pub min_contributors: u64,
    pub min_commits: u64,
    pub min_declared_bytes: Option<u64>,
}

/// Configuration for the runner.
#[derive(Clone, Debug, Deserialize)]
pub struct Runner {
    pub corpus_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub max_passes: Option<usize>,
    #[serde(default = "default_idle")]
    pub idle_secs: u64,
    #[serde(default = "default_git")]
    pub git: String,
    #[serde(default = "default_cloc")]
    pub cloc: String,
}

fn default_per_page() -> u32 { 100 }
fn default_api_url() -> String { "https://api.github.com".to_string() }
fn default_rate_wait() -> u64 { 900 }
fn default_log_level() -> String { "info".to_string() }
fn default_idle() -> u64 { 60 }
fn default_git() -> String { "git".to_string() }
fn default_cloc() -> String { "cloc".to_string() }

pub fn read_config(path: &Path) -> Result<Config> {
    let str = fs::read_to_string(path)
        .map_err(|source| Error::ConfigRead { path: path.to_path_buf(), source })?;

    let mut config = parse_config(&str)?;

    // Fall back to the environment for the token
    if config.search.github_api_key.is_none() {
        config.search.github_api_key = env::var(TOKEN_VAR).ok();
    }

    // Set the log directory based on the time
    let now = Local::now();
    let sub_dir = now.format("%Y-%m-%dT%H-%M-%S").to_string();
    config.runner.log_dir = config.runner.log_dir.join(sub_dir);

    return Ok(config);
}

/// Parse and validate configuration text.
pub fn parse_config(str: &str) -> Result<Config> {
    let config: Config = toml::from_str(str)
        .map_err(|e| Error::Config(e.to_string()))?;

    // Ensure that the language is one cloc can count
    if !LANGS.contains(config.search.language.as_str()) {
        return Err(Error::Config(
            format!("Invalid language: {:?}", config.search.language)
        ));
    }

    if config.search.query.trim().is_empty() {
        return Err(Error::Config("search.query is empty".to_string()));
    }

    // The search API rejects page sizes above 100
    if config.search.per_page == 0 || config.search.per_page > 100 {
        return Err(Error::Config(
            format!("search.per_page must be in 1..=100, got {}", config.search.per_page)
        ));
    }

    if config.runner.corpus_dir == config.runner.tmp_dir {
        return Err(Error::Config(
            "runner.corpus_dir and runner.tmp_dir must differ".to_string()
        ));
    }

    return Ok(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [search]
        query = "language:java"
        language = "Java"

        [filter]
        min_lines = 200000
        min_contributors = 3
        min_commits = 20

        [runner]
        corpus_dir = "corpus"
        tmp_dir = "tmp"
        log_dir = "logs"
    "#;

    #[test]
    fn defaults_are_filled_in() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.search.sort, Sort::Updated);
        assert_eq!(config.search.per_page, 100);
        assert_eq!(config.search.api_url, "https://api.github.com");
        assert_eq!(config.filter.min_declared_bytes, None);
        assert_eq!(config.runner.max_passes, None);
        assert_eq!(config.runner.git, "git");
        assert_eq!(config.runner.cloc, "cloc");
    }

    #[test]
    fn relevance_sort_parses() {
        let text = MINIMAL.replace(
            "language = \"Java\"",
            "language = \"Java\"\nsort = \"relevance\"",
        );
        let config = parse_config(&text).unwrap();
        assert_eq!(config.search.sort, Sort::Relevance);
    }

    #[test]
    fn unknown_language_is_rejected() {
        let text = MINIMAL.replace("\"Java\"", "\"Brainfuck\"");
        assert!(matches!(parse_config(&text), Err(Error::Config(_))));
    }

    #[test]
    fn same_corpus_and_tmp_is_rejected() {
        let text = MINIMAL.replace("tmp_dir = \"tmp\"", "tmp_dir = \"corpus\"");
        assert!(matches!(parse_config(&text), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_page_is_rejected() {
        let text = MINIMAL.replace(
            "language = \"Java\"",
            "language = \"Java\"\nper_page = 500",
        );
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn read_config_suffixes_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = read_config(&path).unwrap();
        assert!(config.runner.log_dir.starts_with("logs"));
        assert_ne!(config.runner.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = read_config(Path::new("/nonexistent/harvester.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
        assert!(err.is_fatal());
    }
}
