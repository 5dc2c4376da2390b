use crate::error::{Error, Result};

use std::fs;
use std::path::Path;
use std::process::Command;

use log::{error, info};

/// Transfers the latest state of a repository into a directory.
pub trait Fetcher {
    /// Fetch URL into DEST without history. DEST must not exist yet. On
    /// success DEST holds plain content with no version control metadata.
    fn shallow_fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetcher backed by the `git` binary.
pub struct Git {
    bin: String,
}

impl Git {
    pub fn new(bin: &str) -> Self {
        return Self { bin: bin.to_string() };
    }
}

impl Fetcher for Git {
    fn shallow_fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Starting clone of '{}'", url);

        // Clone the repo
        let out = Command::new(&self.bin)
            .env("GIT_TERMINAL_PROMPT", "0")
            .arg("clone")
            .args(["--depth", "1", "--single-branch", "--quiet"])
            .arg(url)
            .arg(dest)
            .output()
            .map_err(|e| Error::Fetch {
                url: url.to_string(),
                reason: format!("failed to execute {}: {}", self.bin, e),
            })?;

        // Error if there is a non-zero exit code
        if !out.status.success() {
            let err = String::from_utf8_lossy(&out.stderr).trim().to_string();
            error!("Failed to clone '{}': {}", url, err);
            return Err(Error::Fetch { url: url.to_string(), reason: err });
        }

        strip_metadata(dest)?;
        info!("Finished cloning '{}' to {:?}", url, dest);
        return Ok(());
    }
}

/// Remove the `.git` directory from a checkout.
pub fn strip_metadata(dir: &Path) -> Result<()> {
    let meta = dir.join(".git");
    if meta.is_dir() {
        fs::remove_dir_all(&meta).map_err(|e| Error::io(&meta, e))?;
    } else if meta.exists() {
        // Worktrees and submodules use a `.git` file
        fs::remove_file(&meta).map_err(|e| Error::io(&meta, e))?;
    }
    return Ok(());
}
