use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Explicit target directory for solver serialization. Files are written by
/// absolute path; the process working directory is never changed.
///
/// Files written through the context are removed again when it is dropped
/// without [`commit`](Self::commit), so an aborted serialization never leaves
/// a partial input set behind.
#[derive(Debug)]
pub struct WorkingContext {
    dir: PathBuf,
    written: Vec<PathBuf>,
    committed: bool,
}

impl WorkingContext {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::fs(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "working directory missing"),
            ));
        }
        Ok(WorkingContext {
            dir: dir.to_path_buf(),
            written: Vec::new(),
            committed: false,
        })
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write_file(&mut self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.resolve(name);
        fs::write(&path, contents).map_err(|e| Error::fs(&path, e))?;
        self.written.push(path.clone());
        Ok(path)
    }

    pub fn commit(mut self) -> Vec<PathBuf> {
        self.committed = true;
        std::mem::take(&mut self.written)
    }
}

impl Drop for WorkingContext {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.written {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to roll back partial write");
            }
        }
    }
}

/// Run `f` against a fresh context for `dir`; keep its files only on success.
pub fn scoped<T>(
    dir: &Path,
    f: impl FnOnce(&mut WorkingContext) -> Result<T>,
) -> Result<(T, Vec<PathBuf>)> {
    let mut ctx = WorkingContext::open(dir)?;
    let value = f(&mut ctx)?;
    Ok((value, ctx.commit()))
}
