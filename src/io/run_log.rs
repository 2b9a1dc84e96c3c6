use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Append-only record of which track each ensemble index ran with. One file
/// per chunk, one `"<index> <storm_name>"` line per member.
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }
        let file = File::create(path).map_err(|e| Error::fs(path, e))?;
        Ok(RunLog {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, run_index: usize, storm_name: &str) -> Result<()> {
        writeln!(self.writer, "{} {}", run_index, storm_name)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::fs(&self.path, e))
    }
}

pub fn read_entries(path: &Path) -> Result<Vec<(usize, String)>> {
    let content = fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let (index, name) = line
                .split_once(' ')
                .ok_or_else(|| Error::track(path, i + 1, "run log line lacks a storm name"))?;
            let index = index
                .parse::<usize>()
                .map_err(|e| Error::track(path, i + 1, format!("bad run index: {e}")))?;
            Ok((index, name.to_string()))
        })
        .collect()
}
