use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required job or batch parameter is missing or invalid. Raised before
    /// any filesystem mutation for the affected job.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("file system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("submission of {} failed: {status}", script.display())]
    Submission { script: PathBuf, status: String },

    #[error("malformed track {}:{line}: {message}", path.display())]
    TrackFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("job registry error: {0}")]
    Registry(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::FileSystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn track(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        Error::TrackFormat {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}
