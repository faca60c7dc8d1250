use std::path::PathBuf;

/// Errors that can occur in rustar.
///
/// Only process-level failures live here. A read that cannot be aligned is
/// not an error; it is reported through [`crate::align::ReadClass`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("FASTA parsing error: {0}")]
    Fasta(String),

    #[error("FASTQ parsing error: {0}")]
    Fastq(String),

    #[error("genome index error: {0}")]
    Index(String),

    #[error("incompatible genome index version '{found}' (this build reads: {expected})")]
    IndexVersion { found: String, expected: String },
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}
