use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Error;
use crate::genome::encode_base;

/// One reference sequence, bases already encoded (A=0 C=1 G=2 T=3 N=4).
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub name: String,
    pub sequence: Vec<u8>,
}

/// Parse reference FASTA files in order.
///
/// The name is the header text up to the first whitespace. Letters other
/// than ACGT (any case) become N; bytes below ASCII 32 are dropped.
/// Duplicate names across files are an error.
pub fn parse_fasta_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Chromosome>, Error> {
    let mut chromosomes: Vec<Chromosome> = Vec::new();
    let mut seen = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path).map_err(|e| Error::io(e, path))?);
        let mut line = Vec::new();
        let mut line_num = 0usize;
        let mut in_record = false;

        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| Error::io(e, path))?;
            if n == 0 {
                break;
            }
            line_num += 1;

            if let Some(header) = line.strip_prefix(b">") {
                let header = String::from_utf8_lossy(header);
                let name = header.split_whitespace().next().ok_or_else(|| {
                    Error::Fasta(format!(
                        "empty chromosome name at {}:{}",
                        path.display(),
                        line_num
                    ))
                })?;
                if !seen.insert(name.to_string()) {
                    return Err(Error::Fasta(format!(
                        "duplicate chromosome name '{}' at {}:{}",
                        name,
                        path.display(),
                        line_num
                    )));
                }
                chromosomes.push(Chromosome {
                    name: name.to_string(),
                    sequence: Vec::new(),
                });
                in_record = true;
                continue;
            }

            let bases = line.iter().filter(|&&b| b >= 32);
            if !in_record {
                if bases.clone().next().is_some() {
                    return Err(Error::Fasta(format!(
                        "sequence data before first header at {}:{}",
                        path.display(),
                        line_num
                    )));
                }
                continue;
            }
            if let Some(current) = chromosomes.last_mut() {
                current.sequence.extend(bases.map(|&b| encode_base(b)));
            }
        }
    }

    if chromosomes.is_empty() {
        return Err(Error::Fasta("no chromosomes found in FASTA files".into()));
    }
    if let Some(empty) = chromosomes.iter().find(|c| c.sequence.is_empty()) {
        return Err(Error::Fasta(format!(
            "chromosome '{}' has zero length",
            empty.name
        )));
    }

    Ok(chromosomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_single_chromosome() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1 assembled").unwrap();
        writeln!(file, "ACgt").unwrap();
        writeln!(file, "NNRY").unwrap();

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms.len(), 1);
        assert_eq!(chroms[0].name, "chr1");
        assert_eq!(chroms[0].sequence, vec![0, 1, 2, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, ">a\r\nAC\r\n\r\nGT\r\n>b\r\nT\r\n").unwrap();

        let chroms = parse_fasta_files(&[file.path()]).unwrap();
        assert_eq!(chroms[0].sequence, vec![0, 1, 2, 3]);
        assert_eq!(chroms[1].name, "b");
        assert_eq!(chroms[1].sequence, vec![3]);
    }

    #[test]
    fn multiple_files_keep_order() {
        let mut file1 = NamedTempFile::new().unwrap();
        writeln!(file1, ">chr1\nAC").unwrap();
        let mut file2 = NamedTempFile::new().unwrap();
        writeln!(file2, ">chr2\nGT").unwrap();

        let chroms = parse_fasta_files(&[file1.path(), file2.path()]).unwrap();
        let names: Vec<_> = chroms.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["chr1", "chr2"]);
    }

    #[test]
    fn duplicate_name_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">x\nA\n>x\nC").unwrap();
        let err = parse_fasta_files(&[file.path()]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn empty_and_headerless_errors() {
        let file = NamedTempFile::new().unwrap();
        let err = parse_fasta_files(&[file.path()]).unwrap_err();
        assert!(err.to_string().contains("no chromosomes"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ACGT").unwrap();
        let err = parse_fasta_files(&[file.path()]).unwrap_err();
        assert!(err.to_string().contains("before first header"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">empty\n>full\nA").unwrap();
        let err = parse_fasta_files(&[file.path()]).unwrap_err();
        assert!(err.to_string().contains("zero length"));
    }
}
