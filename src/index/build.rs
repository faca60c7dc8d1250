//! `--runMode genomeGenerate`: FASTA (+ optional junction list) to index files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::Error;
use crate::genome::fasta::{parse_fasta_files, Chromosome};
use crate::genome::{next_chr_start, Genome, GENOME_SPACING_CHAR};
use crate::index::io::{GenomeHeader, GENOME_VERSION};
use crate::index::mmap::ByteSource;
use crate::index::sa_index::SaIndex;
use crate::index::sjdb::{motif_code, motif_strand, SjdbRecord, SjdbTable};
use crate::index::suffix_array::SuffixArray;
use crate::index::GenomeIndex;
use crate::params::Parameters;

/// Structural knobs for an index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub chr_bin_nbits: u32,
    pub sa_index_nbases: u32,
    pub sa_sparse_d: u32,
    pub sjdb_overhang: u32,
}

impl BuildOptions {
    pub fn from_params(params: &Parameters) -> Self {
        Self {
            chr_bin_nbits: params.genome_chr_bin_nbits,
            sa_index_nbases: params.genome_sa_index_nbases,
            sa_sparse_d: params.genome_sa_sparse_d,
            sjdb_overhang: params.sjdb_overhang,
        }
    }
}

/// One annotated intron in chromosome coordinates (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionSpec {
    pub chr: String,
    pub start: u64,
    pub end: u64,
    /// 0 undefined, 1 plus, 2 minus.
    pub strand: u8,
}

/// Parse a `chr start end strand` table. Lines starting with `#` are skipped;
/// the strand column is optional (`+`, `-`, `.`, or 1/2/0).
pub fn parse_junction_file(path: &Path) -> Result<Vec<JunctionSpec>, Error> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let f: Vec<&str> = line.split_whitespace().collect();
        let bad = || Error::Parameter(format!("{}:{}: bad junction line '{}'", path.display(), i + 1, line));
        if f.len() < 3 {
            return Err(bad());
        }
        let start: u64 = f[1].parse().map_err(|_| bad())?;
        let end: u64 = f[2].parse().map_err(|_| bad())?;
        if start == 0 || end < start {
            return Err(bad());
        }
        let strand = match f.get(3).copied() {
            Some("+") | Some("1") => 1,
            Some("-") | Some("2") => 2,
            Some(".") | Some("0") | None => 0,
            Some(_) => return Err(bad()),
        };
        out.push(JunctionSpec {
            chr: f[0].to_string(),
            start,
            end,
            strand,
        });
    }
    Ok(out)
}

/// Run genome generation end to end and write the files into `genomeDir`.
pub fn genome_generate(params: &Parameters) -> Result<GenomeIndex, Error> {
    info!("Loading FASTA files...");
    let chromosomes = parse_fasta_files(&params.genome_fasta_files)?;
    let junctions = match &params.sjdb_file_chr_start_end {
        Some(path) => parse_junction_file(path)?,
        None => Vec::new(),
    };
    let index = build_index(&chromosomes, &junctions, &BuildOptions::from_params(params))?;
    index.write(&params.genome_dir)?;
    Ok(index)
}

/// Lay out chromosomes on bin boundaries and fill the gaps with padding.
fn layout(chromosomes: &[Chromosome], chr_bin_nbits: u32) -> (Vec<u8>, Vec<u64>) {
    let mut chr_start = Vec::with_capacity(chromosomes.len() + 1);
    let mut seq = Vec::new();
    chr_start.push(0u64);
    for chr in chromosomes {
        seq.extend_from_slice(&chr.sequence);
        let next = next_chr_start(seq.len() as u64, chr_bin_nbits);
        seq.resize(next as usize, GENOME_SPACING_CHAR);
        chr_start.push(next);
    }
    (seq, chr_start)
}

/// Repeat length around a junction: how far it can slide left or right
/// without changing the spliced sequence.
fn junction_shifts(seq: &[u8], start: u64, end: u64) -> (u8, u8) {
    let (s, e) = (start as usize, end as usize);
    let mut left = 0usize;
    while left < 255 && s > left && seq[s - 1 - left] < 4 && seq[s - 1 - left] == seq[e - left] {
        left += 1;
    }
    let mut right = 0usize;
    while right < 255
        && e + 1 + right < seq.len()
        && seq[s + right] < 4
        && seq[s + right] == seq[e + 1 + right]
    {
        right += 1;
    }
    (left as u8, right as u8)
}

/// Place annotated junctions into the genome coordinate space. Junctions on
/// unknown chromosomes or whose flanks cross a chromosome edge are dropped.
fn prepare_junctions(
    seq: &[u8],
    chromosomes: &[Chromosome],
    chr_start: &[u64],
    junctions: &[JunctionSpec],
    overhang: u64,
) -> Vec<SjdbRecord> {
    let by_name: HashMap<&str, usize> = chromosomes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let mut records = Vec::with_capacity(junctions.len());
    for j in junctions {
        let Some(&ichr) = by_name.get(j.chr.as_str()) else {
            warn!("junction {}:{}-{}: unknown chromosome, skipped", j.chr, j.start, j.end);
            continue;
        };
        let chr_len = chromosomes[ichr].sequence.len() as u64;
        if j.end > chr_len || j.start <= overhang || j.end + overhang > chr_len {
            warn!(
                "junction {}:{}-{}: flanks cross the chromosome edge, skipped",
                j.chr, j.start, j.end
            );
            continue;
        }
        let start = chr_start[ichr] + j.start - 1;
        let end = chr_start[ichr] + j.end - 1;
        if end < start + 1 {
            warn!("junction {}:{}-{}: intron too short, skipped", j.chr, j.start, j.end);
            continue;
        }

        let s = start as usize;
        let e = end as usize;
        let motif = motif_code(seq[s], seq[s + 1], seq[e - 1], seq[e]);
        let (shift_left, shift_right) = junction_shifts(seq, start, end);
        let strand = if motif > 0 { motif_strand(motif) } else { j.strand };

        let mut rec = SjdbRecord {
            start,
            end,
            motif,
            shift_left,
            shift_right,
            strand,
        };
        if motif == 0 {
            // non-canonical junctions are stored flush left
            rec.start -= shift_left as u64;
            rec.end -= shift_left as u64;
            if rec.start < chr_start[ichr] + overhang {
                warn!(
                    "junction {}:{}-{}: repeat shift crosses the chromosome edge, skipped",
                    j.chr, j.start, j.end
                );
                continue;
            }
        }
        records.push(rec);
    }
    records
}

/// Build an index in memory from already-parsed chromosomes.
pub fn build_index(
    chromosomes: &[Chromosome],
    junctions: &[JunctionSpec],
    opts: &BuildOptions,
) -> Result<GenomeIndex, Error> {
    if opts.sa_index_nbases == 0 || opts.sa_index_nbases > 20 {
        return Err(Error::Parameter(format!(
            "--genomeSAindexNbases {} out of range 1..=20",
            opts.sa_index_nbases
        )));
    }
    if opts.sa_sparse_d == 0 {
        return Err(Error::Parameter("--genomeSAsparseD must be >= 1".into()));
    }

    let (mut seq, chr_start) = layout(chromosomes, opts.chr_bin_nbits);
    let n_chr = chromosomes.len();
    let sj_g_start = chr_start[n_chr];

    let overhang = if junctions.is_empty() { 0 } else { opts.sjdb_overhang as u64 };
    if !junctions.is_empty() && overhang == 0 {
        return Err(Error::Parameter(
            "--sjdbOverhang must be > 0 when junctions are supplied".into(),
        ));
    }
    let records = prepare_junctions(&seq, chromosomes, &chr_start, junctions, overhang);
    let sjdb = SjdbTable::new(records, overhang, sj_g_start);

    for isj in 0..sjdb.len() {
        let d = sjdb.donor_start(isj) as usize;
        let a = sjdb.acceptor_start(isj) as usize;
        let oh = overhang as usize;
        let mut insert = Vec::with_capacity(2 * oh + 1);
        insert.extend_from_slice(&seq[d..d + oh]);
        insert.extend_from_slice(&seq[a..a + oh]);
        insert.push(GENOME_SPACING_CHAR);
        seq.extend_from_slice(&insert);
    }
    if !sjdb.is_empty() {
        info!(
            "Inserted {} annotated junctions ({} bases each)",
            sjdb.len(),
            sjdb.sjdb_length()
        );
    }

    let n_genome = seq.len() as u64;
    let genome = Genome::from_parts(
        ByteSource::Owned(seq),
        n_genome,
        chromosomes.iter().map(|c| c.name.clone()).collect(),
        chromosomes.iter().map(|c| c.sequence.len() as u64).collect(),
        chr_start,
        opts.chr_bin_nbits,
    )?;
    info!(
        "Loaded {} chromosomes, total padded genome size: {} bytes",
        genome.n_chr(),
        n_genome
    );

    info!("Building suffix array...");
    let suffix_array = SuffixArray::build(&genome, opts.sa_sparse_d as u64)?;
    info!("Building SA index with {}-base prefixes...", opts.sa_index_nbases);
    let sa_index = SaIndex::build(&genome, &suffix_array, opts.sa_index_nbases)?;

    let header = GenomeHeader {
        version: GENOME_VERSION.to_string(),
        chr_bin_nbits: opts.chr_bin_nbits,
        sa_index_nbases: opts.sa_index_nbases,
        sa_sparse_d: opts.sa_sparse_d,
        sjdb_overhang: overhang as u32,
        n_genome,
        n_sa: suffix_array.len() as u64,
    };

    Ok(GenomeIndex {
        genome,
        suffix_array,
        sa_index,
        sjdb,
        header,
    })
}
