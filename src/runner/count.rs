use std::path::Path;
use std::process::Command;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::value::Value;

/// Lines attributed to one language.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct LineCount {
    pub blank: u64,
    pub comment: u64,
    pub code: u64,
}

impl LineCount {
    pub fn total(&self) -> u64 {
        self.blank + self.comment + self.code
    }
}

/// Counts lines of code of a given language in a directory.
pub trait LineCounter {
    /// None when there is no data for LANGUAGE, including tool failures.
    fn count(&self, dir: &Path, language: &str) -> Option<LineCount>;

    /// Measured size of LANGUAGE in DIR, zero when nothing was counted.
    fn measure(&self, dir: &Path, language: &str) -> u64 {
        match self.count(dir, language) {
            Some(c) => c.total(),
            None => {
                warn!("No {} lines counted in {:?}, using 0", language, dir);
                0
            },
        }
    }
}

/// Line counter backed by the `cloc` binary.
pub struct Cloc {
    bin: String,
}

impl Cloc {
    pub fn new(bin: &str) -> Self {
        return Self { bin: bin.to_string() };
    }
}

impl LineCounter for Cloc {
    fn count(&self, dir: &Path, language: &str) -> Option<LineCount> {
        let out = Command::new(&self.bin)
            .arg("--json")
            .arg("--quiet")
            .arg(format!("--include-lang={}", language))
            .arg(dir)
            .output();

        let out = match out {
            Ok(o) => o,
            Err(e) => {
                warn!("Failed to execute {}: {}", self.bin, e);
                return None;
            },
        };

        if !out.status.success() {
            warn!("{} failed on {:?}: {}",
                  self.bin, dir, String::from_utf8_lossy(&out.stderr).trim());
            return None;
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        return parse_report(&stdout, language);
    }
}

/// Pull the row for LANGUAGE out of a cloc JSON report.
///
/// cloc prints nothing at all when no file matched.
pub fn parse_report(report: &str, language: &str) -> Option<LineCount> {
    if report.trim().is_empty() {
        return None;
    }

    let json: Value = match serde_json::from_str(report) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unreadable cloc report: {}", e);
            return None;
        },
    };

    let obj = json.as_object()?;
    let row = obj.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(language))
        .map(|(_, row)| row)?;

    let count = serde_json::from_value::<LineCount>(row.clone()).ok()?;
    debug!("Counted {:?} for {}", count, language);
    return Some(count);
}
