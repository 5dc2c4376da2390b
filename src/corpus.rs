use crate::error::{Error, Result};
use crate::runner::search::RepoRef;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

// =============================================================================
// Corpus
// =============================================================================

/// The destination store of accepted repositories.
///
/// An entry is a directory named by the candidate's canonical key. Entries
/// only ever appear through `commit`, as a single rename.
#[derive(Debug)]
pub struct Corpus {
    root: PathBuf,
}

impl Corpus {
    /// Open the corpus at ROOT, creating it if needed.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;
        return Ok(Self { root: root.to_path_buf() });
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of REPO in the corpus.
    pub fn entry(&self, repo: &RepoRef) -> PathBuf {
        self.root.join(repo.key())
    }

    /// True if REPO was already accepted.
    pub fn contains(&self, repo: &RepoRef) -> bool {
        self.entry(repo).exists()
    }

    /// Number of entries currently in the corpus.
    pub fn count(&self) -> Result<usize> {
        let dir = fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let mut n = 0;
        for entry in dir {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            if entry.path().is_dir() {
                n += 1;
            }
        }
        return Ok(n);
    }

    /// Move SCRATCH into the corpus as the entry for REPO.
    ///
    /// This is one rename, so the entry is either absent or complete. A
    /// rename across filesystems fails rather than falling back to a copy.
    pub fn commit(&self, mut scratch: Scratch, repo: &RepoRef) -> Result<PathBuf> {
        let target = self.entry(repo);
        if target.exists() {
            let e = io::Error::new(io::ErrorKind::AlreadyExists, "corpus entry exists");
            return Err(Error::io(target, e));
        }

        fs::rename(&scratch.dir, &target).map_err(|e| Error::io(&target, e))?;
        scratch.armed = false;

        info!("Committed '{}' to {:?}", repo.full_name(), target);
        return Ok(target);
    }
}

// =============================================================================
// Scratch
// =============================================================================

/// Temporary home of a fetched candidate before the decision.
///
/// The directory is deleted when the guard goes out of scope, unless it was
/// committed to the corpus.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
    armed: bool,
}

impl Scratch {
    /// Reserve the scratch location for REPO under TMP_DIR.
    ///
    /// The directory itself is not created; the fetcher does that. Leftovers
    /// of an earlier run at the same location are removed.
    pub fn new(tmp_dir: &Path, repo: &RepoRef) -> Result<Self> {
        fs::create_dir_all(tmp_dir).map_err(|e| Error::io(tmp_dir, e))?;

        let dir = tmp_dir.join(repo.key());
        if dir.exists() {
            warn!("Removing pre-existing files at: {:?}", dir);
            fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }

        return Ok(Self { dir, armed: true });
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Delete the scratch directory now, reporting failure.
    pub fn discard(mut self) -> Result<()> {
        self.armed = false;
        return remove(&self.dir);
    }
}

/// Delete the scratch files when the guard goes out of scope.
impl Drop for Scratch {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = remove(&self.dir) {
                error!("Failed to clean up scratch: {}", e);
            }
        }
    }
}

/// Empty TMP_DIR of anything a killed run left behind, returning how many
/// entries were removed.
pub fn clear_scratch(tmp_dir: &Path) -> Result<usize> {
    if !tmp_dir.exists() {
        return Ok(0);
    }

    let dir = fs::read_dir(tmp_dir).map_err(|e| Error::io(tmp_dir, e))?;
    let mut n = 0;
    for entry in dir {
        let path = entry.map_err(|e| Error::io(tmp_dir, e))?.path();
        if path.is_dir() {
            remove(&path)?;
        } else {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        }
        n += 1;
    }
    return Ok(n);
}

fn remove(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    debug!("Deleting scratch at {:?}", dir);
    fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))
}
