use crate::config::{Search as SearchConfig, Sort};
use crate::error::{Error, Result};

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::value::Value;

/// The search API never returns more than this many results for one query.
const SEARCH_CAP: u64 = 1000;

lazy_static! {
    // https://github.com/owner/name.git, git@github.com:owner/name.git, ...
    static ref LOCATOR: Regex =
        Regex::new(r"^(?:[a-z+]+://)?(?:[^@/]+@)?[^/:]+[/:]([^/]+)/([^/]+?)(?:\.git)?/?$")
            .unwrap();

    // Page number of the rel="last" entry in a Link header
    static ref LAST_PAGE: Regex =
        Regex::new(r#"[?&]page=(\d+)[^>]*>;\s*rel="last""#).unwrap();
}

// =============================================================================
// Candidate identity
// =============================================================================

/// A candidate repository, identified by the locator it is cloned from.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub url: String,
}

impl RepoRef {
    /// Derive the owner and name from a clone URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let caps = LOCATOR.captures(url)
            .ok_or_else(|| Error::Locator(url.to_string()))?;

        return Ok(Self {
            owner: caps[1].to_string(),
            name: caps[2].to_string(),
            url: url.to_string(),
        });
    }

    /// Create a repo from a search result item.
    pub fn from_json(data: &Value) -> Result<Self> {
        let url = data["clone_url"].as_str()
            .ok_or_else(|| Error::Locator(data["full_name"].to_string()))?;
        return Self::from_url(url);
    }

    /// Canonical key used for dedup and corpus naming.
    pub fn key(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Lazy stream of candidates for one pass.
pub type Candidates<'a> = Box<dyn Iterator<Item = Result<RepoRef>> + 'a>;

/// A code host that can be searched and asked about single repositories.
///
/// Every accessor is a remote call and may fail independently.
pub trait Backend {
    /// Start a new paginated search. Errors are yielded in-stream; a
    /// `RateLimited` item may be followed by a retry of the same page.
    fn search<'a>(&'a self, query: &str, sort: Sort) -> Candidates<'a>;

    /// Declared language breakdown, language name to bytes.
    fn languages(&self, repo: &RepoRef) -> Result<BTreeMap<String, u64>>;

    fn contributors(&self, repo: &RepoRef) -> Result<u64>;

    fn commits(&self, repo: &RepoRef) -> Result<u64>;
}

// =============================================================================
// GitHub
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    items: Vec<Value>,
}

/// Blocking client for the GitHub REST API.
pub struct GitHub {
    client: Client,
    api_url: String,
    per_page: u32,
}

impl GitHub {
    /// Create a new client using CONFIG.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("harvester"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        if let Some(token) = &config.github_api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::Config("github_api_key is not a valid header".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            warn!("No API token configured, search will be heavily rate limited");
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()?;

        return Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        });
    }

    /// Issue a GET and map rate limiting and bad statuses to errors.
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        debug!("GET {} {:?}", url, query);
        let resp = self.client.get(url).query(query).send()?;
        let status = resp.status();

        if is_rate_limited(status, resp.headers()) {
            let reset = resp.headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            return Err(Error::RateLimited { reset });
        }

        // Empty repositories answer these with 204 / 409
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(resp);
        }

        return Err(Error::Api(format!("{} for {}", status, url)));
    }

    /// Fetch one page of search results.
    fn search_page(&self, query: &str, sort: Sort, page: u32) -> Result<SearchPage> {
        let url = format!("{}/search/repositories", self.api_url);
        let params = search_params(query, sort, self.per_page, page);
        let page = self.get(&url, &params)?.json::<SearchPage>()?;
        return Ok(page);
    }

    /// Count the items behind a list endpoint by asking for one per page.
    fn count(&self, repo: &RepoRef, what: &str, extra: &[(&str, String)]) -> Result<u64> {
        let url = format!("{}/repos/{}/{}/{}", self.api_url, repo.owner, repo.name, what);
        let mut params = vec![("per_page", "1".to_string())];
        params.extend_from_slice(extra);

        let resp = self.get(&url, &params)?;
        let status = resp.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::CONFLICT {
            return Ok(0);
        }

        if let Some(last) = resp.headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page)
        {
            return Ok(last);
        }

        // Everything fit on the single page
        let items = resp.json::<Vec<Value>>()?;
        return Ok(items.len() as u64);
    }
}

impl Backend for GitHub {
    fn search<'a>(&'a self, query: &str, sort: Sort) -> Candidates<'a> {
        Box::new(Pages::new(self, query, sort))
    }

    fn languages(&self, repo: &RepoRef) -> Result<BTreeMap<String, u64>> {
        let url = format!("{}/repos/{}/{}/languages", self.api_url, repo.owner, repo.name);
        let langs = self.get(&url, &[])?.json::<BTreeMap<String, u64>>()?;
        return Ok(langs);
    }

    fn contributors(&self, repo: &RepoRef) -> Result<u64> {
        self.count(repo, "contributors", &[("anon", "true".to_string())])
    }

    fn commits(&self, repo: &RepoRef) -> Result<u64> {
        self.count(repo, "commits", &[])
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let exhausted = headers.get("x-ratelimit-remaining")
        .map(|v| v == "0")
        .unwrap_or(false);
    return status == StatusCode::FORBIDDEN && exhausted;
}

/// Query parameters for a search page.
fn search_params(query: &str, sort: Sort, per_page: u32, page: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.to_string()),
        ("per_page", per_page.to_string()),
        ("page", page.to_string()),
    ];

    // Relevance ("best match") is what the API does without a sort
    if sort == Sort::Updated {
        params.push(("sort", "updated".to_string()));
        params.push(("order", "desc".to_string()));
    }

    return params;
}

/// Extract the last page number from a Link header.
fn last_page(link: &str) -> Option<u64> {
    LAST_PAGE.captures(link)
        .and_then(|c| c[1].parse::<u64>().ok())
}

// =============================================================================
// Pagination
// =============================================================================

/// Iterator over the pages of one search.
struct Pages<'a> {
    client: &'a GitHub,
    query: String,
    sort: Sort,

    page: u32,
    buffer: VecDeque<Result<RepoRef>>,
    fetched: u64,           // Items received so far
    total: u64,             // Reachable items, known after the first page
    retried: bool,          // True if the current page was already retried
    done: bool,
}

impl<'a> Pages<'a> {
    fn new(client: &'a GitHub, query: &str, sort: Sort) -> Self {
        return Self {
            client,
            query: query.to_string(),
            sort,
            page: 1,
            buffer: VecDeque::new(),
            fetched: 0,
            total: SEARCH_CAP,
            retried: false,
            done: false,
        };
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<RepoRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.done || self.fetched >= self.total {
                return None;
            }

            match self.client.search_page(&self.query, self.sort, self.page) {
                Ok(page) => {
                    debug!("Search page {}: {} items of {}",
                           self.page, page.items.len(), page.total_count);
                    self.retried = false;
                    self.page += 1;
                    self.total = page.total_count.min(SEARCH_CAP);
                    self.fetched += page.items.len() as u64;
                    if page.items.is_empty() {
                        self.done = true;
                    }
                    self.buffer.extend(page.items.iter().map(RepoRef::from_json));
                },
                Err(e @ Error::RateLimited { .. }) => {
                    // The caller waits, then we try this page one more time
                    if self.retried {
                        self.done = true;
                    }
                    self.retried = true;
                    return Some(Err(e));
                },
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            }
        }
    }
}
