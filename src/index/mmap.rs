//! Read-only byte views over index files.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Error;
use crate::params::GenomeLoad;

/// Bytes of one index file, either mapped or owned.
///
/// Both variants dereference to `[u8]`, so the arrays built on top never
/// know how the bytes got there. A mapping is released when the value drops.
pub enum ByteSource {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ByteSource {
    /// Open `path` according to `mode`. Empty files are rejected: every
    /// index file carries at least one record.
    pub fn open(path: &Path, mode: GenomeLoad) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let len = file.metadata().map_err(|e| Error::io(e, path))?.len();
        if len == 0 {
            return Err(Error::Index(format!(
                "index file {} is empty",
                path.display()
            )));
        }

        match mode {
            GenomeLoad::Mmap => {
                // SAFETY: index files are written once by genomeGenerate and
                // only read afterwards.
                let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(e, path))?;
                Ok(Self::Mapped(mmap))
            }
            GenomeLoad::NoSharedMemory => {
                let data = std::fs::read(path).map_err(|e| Error::io(e, path))?;
                Ok(Self::Owned(data))
            }
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl Deref for ByteSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m,
            Self::Owned(v) => v,
        }
    }
}

impl AsRef<[u8]> for ByteSource {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(v: Vec<u8>) -> Self {
        Self::Owned(v)
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_mapped() { "Mapped" } else { "Owned" };
        write!(f, "ByteSource::{}({} bytes)", kind, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn mapped_and_owned_read_the_same_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0, 1, 2, 3, 5, 5, 4]).unwrap();
        file.flush().unwrap();

        let mapped = ByteSource::open(file.path(), GenomeLoad::Mmap).unwrap();
        let owned = ByteSource::open(file.path(), GenomeLoad::NoSharedMemory).unwrap();

        assert!(mapped.is_mapped());
        assert!(!owned.is_mapped());
        assert_eq!(&mapped[..], &owned[..]);
        assert_eq!(mapped.len(), 7);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = ByteSource::open(file.path(), GenomeLoad::Mmap).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ByteSource::open(Path::new("/nonexistent/SA"), GenomeLoad::NoSharedMemory)
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
