/// Tab-separated result files
///
/// - `Aligned.out.tab`: one line per accepted alignment (read name, number of
///   loci, hit index, chromosome, 1-based start, strand, block string, score,
///   mismatches, junctions)
/// - `Unmapped.out.tab`: read name, reason, capacity marker or `-`
/// - `Chimeric.out.junction`: one line per chimeric alignment, only written
///   when chimeric detection is on
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::align::{ReadClass, ReadResult};
use crate::chimeric::{ChimericAlignment, ChimericSegment};
use crate::error::Error;
use crate::genome::Genome;
use crate::params::Parameters;

/// `prefix` followed directly by `name`, the way output prefixes compose.
pub fn output_path(prefix: &Path, name: &str) -> PathBuf {
    PathBuf::from(format!("{}{name}", prefix.display()))
}

struct OutFile {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl OutFile {
    fn create(path: PathBuf) -> Result<Self, Error> {
        let file = File::create(&path).map_err(|e| Error::io(e, &path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    fn line(&mut self, line: std::fmt::Arguments<'_>) -> Result<(), Error> {
        self.writer
            .write_fmt(line)
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| Error::io(e, &self.path))
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(|e| Error::io(e, &self.path))
    }
}

/// Writer for all per-read result files
pub struct ResultWriter {
    aligned: OutFile,
    unmapped: OutFile,
    chimeric: Option<OutFile>,
}

impl ResultWriter {
    /// Create the output files under `outFileNamePrefix`
    pub fn create(params: &Parameters) -> Result<Self, Error> {
        let prefix = &params.out_file_name_prefix;
        let chimeric = if params.chimeric_enabled() {
            Some(OutFile::create(output_path(prefix, "Chimeric.out.junction"))?)
        } else {
            None
        };
        Ok(Self {
            aligned: OutFile::create(output_path(prefix, "Aligned.out.tab"))?,
            unmapped: OutFile::create(output_path(prefix, "Unmapped.out.tab"))?,
            chimeric,
        })
    }

    /// Write every line produced by one read
    pub fn write(&mut self, result: &ReadResult, genome: &Genome) -> Result<(), Error> {
        match result.class {
            ReadClass::Unmapped(reason) => {
                let marker = result
                    .marker
                    .map_or_else(|| "-".to_string(), |m| m.to_string());
                self.unmapped
                    .line(format_args!("{}\t{reason}\t{marker}", result.name))?;
            }
            _ => {
                let n_loci = result.transcripts.len();
                for (i, (t, cigar)) in result.transcripts.iter().zip(&result.cigars).enumerate() {
                    let start = t.g_start - genome.chr_start[t.chr] + 1;
                    self.aligned.line(format_args!(
                        "{}\t{n_loci}\t{}\t{}\t{start}\t{}\t{cigar}\t{}\t{}\t{}",
                        result.name,
                        i + 1,
                        genome.chr_name[t.chr],
                        strand_char(t.str),
                        t.score,
                        t.n_mm,
                        t.n_junctions(),
                    ))?;
                }
            }
        }

        if let Some(out) = self.chimeric.as_mut() {
            for (c, (cigar1, cigar2)) in result.chimeric.iter().zip(&result.chimeric_cigars) {
                write_chimeric(out, genome, &result.name, c, cigar1, cigar2)?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), Error> {
        self.aligned.flush()?;
        self.unmapped.flush()?;
        if let Some(out) = self.chimeric.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

fn strand_char(str: u8) -> char {
    if str == 0 {
        '+'
    } else {
        '-'
    }
}

/// 1-based chromosome coordinate of a forward-genome position on `seg`'s
/// chromosome.
fn chr_pos(genome: &Genome, seg: &ChimericSegment, pos: u64) -> i64 {
    pos as i64 - genome.chr_start[seg.align.chr] as i64 + 1
}

/// Donor and acceptor breakpoints, junction type and repeats, then the read
/// name and the first base and blocks of each segment.
fn write_chimeric(
    out: &mut OutFile,
    genome: &Genome,
    name: &str,
    c: &ChimericAlignment,
    cigar1: &str,
    cigar2: &str,
) -> Result<(), Error> {
    let (s1, s2) = (&c.seg1, &c.seg2);
    out.line(format_args!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{name}\t{}\t{cigar1}\t{}\t{cigar2}",
        genome.chr_name[s1.align.chr],
        chr_pos(genome, s1, c.donor_breakpoint()),
        strand_char(s1.align.str),
        genome.chr_name[s2.align.chr],
        chr_pos(genome, s2, c.acceptor_breakpoint()),
        strand_char(s2.align.str),
        c.junction_type,
        c.repeat_left,
        c.repeat_right,
        chr_pos(genome, s1, s1.align.exons[0].g),
        chr_pos(genome, s2, s2.align.exons[0].g),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{ReadAligner, ReadMarker, UnmappedReason};
    use crate::index::test_support::{index_from_str, random_seq};
    use clap::Parser;
    use tempfile::TempDir;

    fn params(dir: &TempDir, extra: &[&str]) -> Parameters {
        let prefix = format!("{}/", dir.path().display());
        let mut args = vec!["rustar", "--readFilesIn", "r.fq", "--outFileNamePrefix", &prefix];
        args.extend_from_slice(extra);
        Parameters::parse_from(args)
    }

    #[test]
    fn test_output_path_appends_to_prefix() {
        assert_eq!(
            output_path(Path::new("out/sample_"), "Aligned.out.tab"),
            PathBuf::from("out/sample_Aligned.out.tab")
        );
    }

    #[test]
    fn test_write_mapped_and_unmapped() {
        let dir = TempDir::new().unwrap();
        let chr = random_seq(2000, 51);
        let index = index_from_str(&[&chr]);
        let p = params(&dir, &[]).resolved_for(&index.header);

        let mut aligner = ReadAligner::new(&index, &p);
        let mapped = aligner.align("m1", &[chr[500..600].as_bytes()]);
        let mut unmapped = aligner.align("u1", &[random_seq(100, 52).as_bytes()]);
        unmapped.class = ReadClass::Unmapped(UnmappedReason::TooShort);
        unmapped.marker = Some(ReadMarker::TooManySeeds);

        let mut writer = ResultWriter::create(&p).unwrap();
        writer.write(&mapped, &index.genome).unwrap();
        writer.write(&unmapped, &index.genome).unwrap();
        writer.finish().unwrap();

        let aligned = std::fs::read_to_string(dir.path().join("Aligned.out.tab")).unwrap();
        let fields: Vec<&str> = aligned.trim_end().split('\t').collect();
        assert_eq!(fields[..7], ["m1", "1", "1", "chr1", "501", "+", "100M"]);
        assert_eq!(fields[8], "0");

        let unmapped = std::fs::read_to_string(dir.path().join("Unmapped.out.tab")).unwrap();
        assert_eq!(unmapped, "u1\ttoo short\ttoo many seeds\n");
        assert!(!dir.path().join("Chimeric.out.junction").exists());
    }

    #[test]
    fn test_write_chimeric_junction() {
        let dir = TempDir::new().unwrap();
        let chr1 = random_seq(2000, 53);
        let chr2 = random_seq(2000, 54);
        let index = index_from_str(&[&chr1, &chr2]);
        let p = params(&dir, &["--chimSegmentMin", "20"]).resolved_for(&index.header);

        let read = format!("{}{}", &chr1[300..350], &chr2[900..950]);
        let result = ReadAligner::new(&index, &p).align("f1", &[read.as_bytes()]);
        let mut writer = ResultWriter::create(&p).unwrap();
        writer.write(&result, &index.genome).unwrap();
        writer.finish().unwrap();

        let junction = std::fs::read_to_string(dir.path().join("Chimeric.out.junction")).unwrap();
        let fields: Vec<&str> = junction.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 14);
        assert_eq!((fields[0], fields[2]), ("chr1", "+"));
        assert_eq!((fields[3], fields[5]), ("chr2", "+"));
        assert_eq!(fields[9], "f1");
        assert_eq!(fields[10], "301");
    }
}
