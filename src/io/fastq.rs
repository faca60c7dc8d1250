/// FASTQ input: plain, gzip or piped through a decompression command
use crate::error::Error;
use flate2::read::GzDecoder;
use noodles::fastq;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One input read: its name and one or two mates as ASCII bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Read identifier up to the first space, without mate suffix for pairs
    pub name: String,
    pub mates: Vec<Vec<u8>>,
}

impl ReadRecord {
    /// Mate slices in the form the aligner takes them.
    pub fn mate_slices(&self) -> Vec<&[u8]> {
        self.mates.iter().map(|m| m.as_slice()).collect()
    }
}

/// Reader over a single FASTQ file
pub struct FastqReader {
    inner: fastq::Reader<Box<dyn BufRead + Send>>,
    record: fastq::Record,
    path: PathBuf,
}

impl FastqReader {
    /// Open a FASTQ file (plain or gzip compressed)
    ///
    /// # Arguments
    /// * `path` - Path to FASTQ file
    /// * `decompress_cmd` - Optional decompression command (e.g., "zcat"); takes precedence
    ///   over extension-based gzip detection
    pub fn open(path: &Path, decompress_cmd: Option<&str>) -> Result<Self, Error> {
        let reader: Box<dyn BufRead + Send> = if let Some(cmd) = decompress_cmd {
            Self::open_with_command(path, cmd)?
        } else {
            let path_str = path.to_string_lossy();
            let is_gzipped = path_str.ends_with(".gz") || path_str.ends_with(".gzip");

            let file = File::open(path).map_err(|e| Error::io(e, path))?;

            if is_gzipped {
                Box::new(BufReader::new(GzDecoder::new(file)))
            } else {
                Box::new(BufReader::new(file))
            }
        };

        Ok(Self {
            inner: fastq::Reader::new(reader),
            record: fastq::Record::default(),
            path: path.to_path_buf(),
        })
    }

    /// Open FASTQ file using external decompression command
    fn open_with_command(path: &Path, cmd: &str) -> Result<Box<dyn BufRead + Send>, Error> {
        let mut parts = cmd.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Parameter("empty readFilesCommand".to_string()))?;
        let mut child = Command::new(program)
            .args(parts)
            .arg(path)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::io(e, path))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::io(
                std::io::Error::other("failed to capture stdout from decompression command"),
                path,
            )
        })?;

        Ok(Box::new(BufReader::new(stdout)))
    }

    /// Next record as `(name, sequence)`, or None at end of file.
    pub fn next_record(&mut self) -> Result<Option<(String, Vec<u8>)>, Error> {
        let n = self
            .inner
            .read_record(&mut self.record)
            .map_err(|e| Error::Fastq(format!("{}: {e}", self.path.display())))?;
        if n == 0 {
            return Ok(None);
        }
        let name = std::str::from_utf8(self.record.name())
            .map_err(|e| {
                Error::Fastq(format!(
                    "{}: invalid UTF-8 in read name: {e}",
                    self.path.display()
                ))
            })?;
        let name = name.split_whitespace().next().unwrap_or_default().to_string();
        Ok(Some((name, self.record.sequence().to_vec())))
    }
}

/// Single-end or paired-end read input
pub enum ReadSource {
    Single(FastqReader),
    Paired(FastqReader, FastqReader),
}

impl ReadSource {
    /// Open one file, or two files read in lockstep as mates.
    pub fn open(files: &[PathBuf], decompress_cmd: Option<&str>) -> Result<Self, Error> {
        match files {
            [single] => Ok(Self::Single(FastqReader::open(single, decompress_cmd)?)),
            [mate1, mate2] => Ok(Self::Paired(
                FastqReader::open(mate1, decompress_cmd)?,
                FastqReader::open(mate2, decompress_cmd)?,
            )),
            _ => Err(Error::Parameter(format!(
                "readFilesIn takes one or two files, got {}",
                files.len()
            ))),
        }
    }

    /// Get the next read
    ///
    /// # Returns
    /// - Ok(None) once all input is consumed
    /// - Err if paired files differ in length or mate names do not match
    pub fn next_read(&mut self) -> Result<Option<ReadRecord>, Error> {
        match self {
            Self::Single(reader) => Ok(reader
                .next_record()?
                .map(|(name, seq)| ReadRecord { name, mates: vec![seq] })),
            Self::Paired(r1, r2) => match (r1.next_record()?, r2.next_record()?) {
                (Some((n1, s1)), Some((n2, s2))) => {
                    let name1 = strip_mate_suffix(&n1);
                    if name1 != strip_mate_suffix(&n2) {
                        return Err(Error::Fastq(format!(
                            "paired read names do not match: '{n1}' vs '{n2}'"
                        )));
                    }
                    Ok(Some(ReadRecord {
                        name: name1.to_string(),
                        mates: vec![s1, s2],
                    }))
                }
                (None, None) => Ok(None),
                (Some(_), None) => Err(Error::Fastq(
                    "paired FASTQ files have different lengths: mate1 file has more reads"
                        .to_string(),
                )),
                (None, Some(_)) => Err(Error::Fastq(
                    "paired FASTQ files have different lengths: mate2 file has more reads"
                        .to_string(),
                )),
            },
        }
    }

    /// Read up to `batch_size` reads; shorter only at end of input
    pub fn read_batch(&mut self, batch_size: usize) -> Result<Vec<ReadRecord>, Error> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.next_read()? {
                Some(read) => batch.push(read),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Strip a `/1` or `/2` mate suffix from a read name
pub fn strip_mate_suffix(name: &str) -> &str {
    name.strip_suffix("/1")
        .or_else(|| name.strip_suffix("/2"))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fastq_file(records: &[(&str, &str)]) -> NamedTempFile {
        let mut tmpfile = NamedTempFile::new().unwrap();
        for (name, seq) in records {
            writeln!(tmpfile, "@{name}").unwrap();
            writeln!(tmpfile, "{seq}").unwrap();
            writeln!(tmpfile, "+").unwrap();
            writeln!(tmpfile, "{}", "I".repeat(seq.len())).unwrap();
        }
        tmpfile.flush().unwrap();
        tmpfile
    }

    #[test]
    fn test_strip_mate_suffix() {
        assert_eq!(strip_mate_suffix("read1/1"), "read1");
        assert_eq!(strip_mate_suffix("read1/2"), "read1");
        assert_eq!(strip_mate_suffix("read1"), "read1");
        assert_eq!(strip_mate_suffix("read_1"), "read_1");
    }

    #[test]
    fn test_single_end_reader() {
        let file = fastq_file(&[("read1 1:N:0:0", "ACGTN"), ("read2", "TGCA")]);
        let mut source = ReadSource::open(&[file.path().to_path_buf()], None).unwrap();

        let r1 = source.next_read().unwrap().unwrap();
        assert_eq!(r1.name, "read1");
        assert_eq!(r1.mates, vec![b"ACGTN".to_vec()]);
        let r2 = source.next_read().unwrap().unwrap();
        assert_eq!(r2.name, "read2");
        assert!(source.next_read().unwrap().is_none());
    }

    #[test]
    fn test_gzip_reader() {
        let tmpfile = tempfile::Builder::new().suffix(".fq.gz").tempfile().unwrap();
        let mut enc = GzEncoder::new(File::create(tmpfile.path()).unwrap(), Compression::default());
        enc.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        enc.finish().unwrap();

        let mut reader = FastqReader::open(tmpfile.path(), None).unwrap();
        let (name, seq) = reader.next_record().unwrap().unwrap();
        assert_eq!(name, "r1");
        assert_eq!(seq, b"ACGT");
    }

    #[test]
    fn test_paired_reader_and_batches() {
        let m1 = fastq_file(&[("p1/1", "AAAA"), ("p2/1", "CCCC"), ("p3/1", "GGGG")]);
        let m2 = fastq_file(&[("p1/2", "TTTT"), ("p2/2", "GGGG"), ("p3/2", "CCCC")]);
        let files = [m1.path().to_path_buf(), m2.path().to_path_buf()];
        let mut source = ReadSource::open(&files, None).unwrap();

        let batch = source.read_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].name, "p1");
        assert_eq!(batch[0].mate_slices(), vec![&b"AAAA"[..], &b"TTTT"[..]]);
        assert_eq!(source.read_batch(2).unwrap().len(), 1);
        assert!(source.read_batch(2).unwrap().is_empty());
    }

    #[test]
    fn test_paired_name_mismatch() {
        let m1 = fastq_file(&[("a/1", "AAAA")]);
        let m2 = fastq_file(&[("b/2", "TTTT")]);
        let files = [m1.path().to_path_buf(), m2.path().to_path_buf()];
        let mut source = ReadSource::open(&files, None).unwrap();
        assert!(matches!(source.next_read(), Err(Error::Fastq(_))));
    }

    #[test]
    fn test_paired_length_mismatch() {
        let m1 = fastq_file(&[("a/1", "AAAA"), ("b/1", "CCCC")]);
        let m2 = fastq_file(&[("a/2", "TTTT")]);
        let files = [m1.path().to_path_buf(), m2.path().to_path_buf()];
        let mut source = ReadSource::open(&files, None).unwrap();
        assert!(source.next_read().unwrap().is_some());
        assert!(source.next_read().is_err());
    }

    #[test]
    fn test_missing_file() {
        let missing = PathBuf::from("/nonexistent/reads.fq");
        assert!(matches!(
            ReadSource::open(&[missing], None),
            Err(Error::Io { .. })
        ));
    }
}
