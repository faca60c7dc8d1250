use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::Error;
use crate::genome::Genome;
use crate::index::mmap::ByteSource;
use crate::index::packed_array::packed_byte_len;
use crate::index::sa_index::SaIndex;
use crate::index::sjdb::SjdbTable;
use crate::index::suffix_array::SuffixArray;
use crate::index::GenomeIndex;
use crate::params::GenomeLoad;

/// Format version written into `genomeParameters.txt`.
pub const GENOME_VERSION: &str = "2.7.4a";

/// Index format versions this build can read.
pub const COMPATIBLE_GENOME_VERSIONS: &[&str] = &["2.7.4a"];

/// Contents of `genomeParameters.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeHeader {
    pub version: String,
    pub chr_bin_nbits: u32,
    pub sa_index_nbases: u32,
    pub sa_sparse_d: u32,
    pub sjdb_overhang: u32,
    pub n_genome: u64,
    pub n_sa: u64,
}

impl GenomeHeader {
    /// Parse `key<TAB>value...` lines. `#` comments and unknown keys are skipped.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut version = None;
        let mut chr_bin_nbits = None;
        let mut sa_index_nbases = None;
        let mut sa_sparse_d = None;
        let mut sjdb_overhang = 0u32;
        let mut n_genome = None;
        let mut n_sa = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(key) = fields.next() else { continue };
            let value = fields.next();
            match key {
                "versionGenome" => version = value.map(str::to_string),
                "genomeChrBinNbits" => chr_bin_nbits = Some(parse_value(key, value)?),
                "genomeSAindexNbases" => sa_index_nbases = Some(parse_value(key, value)?),
                "genomeSAsparseD" => sa_sparse_d = Some(parse_value(key, value)?),
                "sjdbOverhang" => sjdb_overhang = parse_value(key, value)?,
                "genomeFileSizes" => n_genome = Some(parse_value(key, value)?),
                "genomeSAlength" => n_sa = Some(parse_value(key, value)?),
                _ => debug!("genomeParameters.txt: ignoring key {key}"),
            }
        }

        let version =
            version.ok_or_else(|| Error::Index("genomeParameters.txt: no versionGenome".into()))?;
        if !COMPATIBLE_GENOME_VERSIONS.contains(&version.as_str()) {
            return Err(Error::IndexVersion {
                found: version,
                expected: COMPATIBLE_GENOME_VERSIONS.join(", "),
            });
        }

        let missing = |k: &str| Error::Index(format!("genomeParameters.txt: missing {k}"));
        let header = Self {
            version,
            chr_bin_nbits: chr_bin_nbits.ok_or_else(|| missing("genomeChrBinNbits"))?,
            sa_index_nbases: sa_index_nbases.ok_or_else(|| missing("genomeSAindexNbases"))?,
            sa_sparse_d: sa_sparse_d.ok_or_else(|| missing("genomeSAsparseD"))?,
            sjdb_overhang,
            n_genome: n_genome.ok_or_else(|| missing("genomeFileSizes"))?,
            n_sa: n_sa.ok_or_else(|| missing("genomeSAlength"))?,
        };
        if header.sa_sparse_d == 0 || header.chr_bin_nbits > 32 || header.sa_index_nbases == 0 {
            return Err(Error::Index(format!(
                "genomeParameters.txt: values out of range {header:?}"
            )));
        }
        Ok(header)
    }

    pub fn to_text(&self, sa_bytes: u64) -> String {
        format!(
            "### rustar genomeGenerate\n\
             versionGenome\t{}\n\
             genomeChrBinNbits\t{}\n\
             genomeSAindexNbases\t{}\n\
             genomeSAsparseD\t{}\n\
             sjdbOverhang\t{}\n\
             genomeFileSizes\t{}\t{}\n\
             genomeSAlength\t{}\n",
            self.version,
            self.chr_bin_nbits,
            self.sa_index_nbases,
            self.sa_sparse_d,
            self.sjdb_overhang,
            self.n_genome,
            sa_bytes,
            self.n_sa
        )
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: Option<&str>) -> Result<T, Error> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::Index(format!("genomeParameters.txt: bad value for {key}")))
}

fn read_text(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::io(e, path))
}

fn read_column<T: std::str::FromStr>(path: &Path) -> Result<Vec<T>, Error> {
    read_text(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, l)| {
            l.parse().map_err(|_| {
                Error::Index(format!("{}:{}: cannot parse '{}'", path.display(), i + 1, l))
            })
        })
        .collect()
}

/// Load a complete index from `dir`.
pub fn load_index(dir: &Path, mode: GenomeLoad) -> Result<GenomeIndex, Error> {
    if !dir.is_dir() {
        return Err(Error::Index(format!(
            "genome directory {} does not exist",
            dir.display()
        )));
    }
    let header = GenomeHeader::parse(&read_text(&dir.join("genomeParameters.txt"))?)?;
    info!(
        "Loading genome index from {} (version {}, {} mode)",
        dir.display(),
        header.version,
        mode
    );

    let chr_name: Vec<String> = read_column(&dir.join("chrName.txt"))?;
    let chr_length: Vec<u64> = read_column(&dir.join("chrLength.txt"))?;
    let chr_start: Vec<u64> = read_column(&dir.join("chrStart.txt"))?;

    let sequence = ByteSource::open(&dir.join("Genome"), mode)?;
    if sequence.len() as u64 != header.n_genome {
        return Err(Error::Index(format!(
            "Genome file has {} bytes, genomeParameters.txt says {}",
            sequence.len(),
            header.n_genome
        )));
    }
    let genome = Genome::from_parts(
        sequence,
        header.n_genome,
        chr_name,
        chr_length,
        chr_start,
        header.chr_bin_nbits,
    )?;

    let gstrand_bit = SuffixArray::gstrand_bit_for(header.n_genome);
    let sa_bytes = ByteSource::open(&dir.join("SA"), mode)?;
    let expected = packed_byte_len(gstrand_bit + 1, header.n_sa as usize);
    if sa_bytes.len() != expected {
        return Err(Error::Index(format!(
            "SA file has {} bytes, expected {} for {} entries",
            sa_bytes.len(),
            expected,
            header.n_sa
        )));
    }
    let suffix_array = SuffixArray::from_source(sa_bytes, header.n_sa as usize, header.n_genome)?;

    let sa_index = SaIndex::from_source(ByteSource::open(&dir.join("SAindex"), mode)?, gstrand_bit)?;
    if sa_index.nbases != header.sa_index_nbases {
        return Err(Error::Index(format!(
            "SAindex prefix length {} differs from genomeSAindexNbases {}",
            sa_index.nbases, header.sa_index_nbases
        )));
    }

    let sjdb = SjdbTable::parse(
        &read_text(&dir.join("sjdbInfo.txt"))?,
        genome.chr_start[genome.n_chr()],
    )?;
    if sjdb.g_start + sjdb.insert_length() > header.n_genome {
        return Err(Error::Index(
            "junction inserts run past the end of the genome".into(),
        ));
    }

    info!(
        "Genome index loaded: {} chromosomes, {} bases, {} SA entries, {} annotated junctions",
        genome.n_chr(),
        header.n_genome,
        suffix_array.len(),
        sjdb.len()
    );

    Ok(GenomeIndex {
        genome,
        suffix_array,
        sa_index,
        sjdb,
        header,
    })
}

/// Write every index file into `dir`.
pub fn write_index(index: &GenomeIndex, dir: &Path) -> Result<(), Error> {
    index.genome.write_files(dir)?;

    let sa_path = dir.join("SA");
    fs::write(&sa_path, index.suffix_array.as_bytes()).map_err(|e| Error::io(e, &sa_path))?;

    let sai_path = dir.join("SAindex");
    fs::write(&sai_path, index.sa_index.to_bytes()).map_err(|e| Error::io(e, &sai_path))?;

    let sjdb_path = dir.join("sjdbInfo.txt");
    fs::write(&sjdb_path, index.sjdb.to_text()).map_err(|e| Error::io(e, &sjdb_path))?;

    let params_path = dir.join("genomeParameters.txt");
    let text = index
        .header
        .to_text(index.suffix_array.as_bytes().len() as u64);
    fs::write(&params_path, text).map_err(|e| Error::io(e, &params_path))?;

    info!("Genome index written to {}", dir.display());
    Ok(())
}
