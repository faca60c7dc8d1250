use std::path::PathBuf;

use clap::Parser;
use log::info;

use crate::error::Error;
use crate::index::io::GenomeHeader;

// ---------------------------------------------------------------------------
// Run mode enum
// ---------------------------------------------------------------------------

/// STAR's `--runMode` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    AlignReads,
    GenomeGenerate,
}

impl std::str::FromStr for RunMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alignReads" => Ok(Self::AlignReads),
            "genomeGenerate" => Ok(Self::GenomeGenerate),
            _ => Err(format!(
                "unknown runMode '{s}'; expected 'alignReads' or 'genomeGenerate'"
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlignReads => write!(f, "alignReads"),
            Self::GenomeGenerate => write!(f, "genomeGenerate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Genome loading
// ---------------------------------------------------------------------------

/// How the large index arrays are brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomeLoad {
    /// Read every file into a private heap buffer.
    NoSharedMemory,
    /// Map files read-only; pages are shared with other processes.
    Mmap,
}

impl Default for GenomeLoad {
    fn default() -> Self {
        Self::NoSharedMemory
    }
}

impl std::str::FromStr for GenomeLoad {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NoSharedMemory" => Ok(Self::NoSharedMemory),
            "Mmap" => Ok(Self::Mmap),
            _ => Err(format!(
                "unknown genomeLoad value: '{s}'; expected 'NoSharedMemory' or 'Mmap'"
            )),
        }
    }
}

impl std::fmt::Display for GenomeLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSharedMemory => write!(f, "NoSharedMemory"),
            Self::Mmap => write!(f, "Mmap"),
        }
    }
}

// ---------------------------------------------------------------------------
// Output filter type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutFilterType {
    Normal,
    /// Hold reads with novel junctions until the junction set is filtered.
    BySJout,
}

impl Default for OutFilterType {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::str::FromStr for OutFilterType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(Self::Normal),
            "BySJout" => Ok(Self::BySJout),
            _ => Err(format!("unknown outFilterType value: '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Junction filters
// ---------------------------------------------------------------------------

/// `--outFilterIntronMotifs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntronMotifFilter {
    None,
    RemoveNoncanonical,
    RemoveNoncanonicalUnannotated,
}

impl Default for IntronMotifFilter {
    fn default() -> Self {
        Self::None
    }
}

impl std::str::FromStr for IntronMotifFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "RemoveNoncanonical" => Ok(Self::RemoveNoncanonical),
            "RemoveNoncanonicalUnannotated" => Ok(Self::RemoveNoncanonicalUnannotated),
            _ => Err(format!("unknown outFilterIntronMotifs value: '{s}'")),
        }
    }
}

/// `--outFilterIntronStrands`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntronStrandFilter {
    None,
    RemoveInconsistentStrands,
}

impl Default for IntronStrandFilter {
    fn default() -> Self {
        Self::RemoveInconsistentStrands
    }
}

impl std::str::FromStr for IntronStrandFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "RemoveInconsistentStrands" => Ok(Self::RemoveInconsistentStrands),
            _ => Err(format!("unknown outFilterIntronStrands value: '{s}'")),
        }
    }
}

/// `--outSAMstrandField`. With `IntronMotif`, spliced alignments whose strand
/// cannot be derived from their junction motifs are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandField {
    None,
    IntronMotif,
}

impl Default for StrandField {
    fn default() -> Self {
        Self::None
    }
}

impl std::str::FromStr for StrandField {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "intronMotif" => Ok(Self::IntronMotif),
            _ => Err(format!("unknown outSAMstrandField value: '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters struct
// ---------------------------------------------------------------------------

/// rustar command-line parameters, matching STAR's `--camelCase` argument names.
///
/// Built once at startup and never mutated afterwards; components that need
/// genome-dependent values receive the copy returned by [`Parameters::resolved_for`].
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rustar",
    about = "Spliced read aligner over a suffix-array genome index",
    version
)]
pub struct Parameters {
    // ── Run ─────────────────────────────────────────────────────────────
    /// Run mode: alignReads or genomeGenerate
    #[arg(long = "runMode", default_value = "alignReads")]
    pub run_mode: RunMode,

    /// Number of threads
    #[arg(long = "runThreadN", default_value_t = 1)]
    pub run_thread_n: usize,

    /// How to load the index: NoSharedMemory or Mmap
    #[arg(long = "genomeLoad", default_value = "NoSharedMemory")]
    pub genome_load: GenomeLoad,

    // ── Genome ──────────────────────────────────────────────────────────
    /// Path to genome index directory
    #[arg(long = "genomeDir", default_value = "./GenomeDir")]
    pub genome_dir: PathBuf,

    /// FASTA file(s) with genome reference sequences (for genomeGenerate)
    #[arg(long = "genomeFastaFiles", num_args = 1..)]
    pub genome_fasta_files: Vec<PathBuf>,

    /// Length of SA pre-indexing string
    #[arg(long = "genomeSAindexNbases", default_value_t = 14)]
    pub genome_sa_index_nbases: u32,

    /// Log2(chromosome bin size) for genome storage
    #[arg(long = "genomeChrBinNbits", default_value_t = 18)]
    pub genome_chr_bin_nbits: u32,

    /// Suffix array sparsity (larger = less RAM, slower mapping)
    #[arg(long = "genomeSAsparseD", default_value_t = 1)]
    pub genome_sa_sparse_d: u32,

    // ── Splice junction database ────────────────────────────────────────
    /// Junction table: chr, 1-based intron start, intron end, strand (+/-/.)
    #[arg(long = "sjdbFileChrStartEnd")]
    pub sjdb_file_chr_start_end: Option<PathBuf>,

    /// Exon flank length stored on each side of an annotated junction
    #[arg(long = "sjdbOverhang", default_value_t = 100)]
    pub sjdb_overhang: u32,

    /// Extra score for alignments crossing annotated junctions
    #[arg(long = "sjdbScore", default_value_t = 2, allow_hyphen_values = true)]
    pub sjdb_score: i32,

    // ── Read files ──────────────────────────────────────────────────────
    /// Input read file(s); second file is mate 2 for paired-end
    #[arg(long = "readFilesIn", num_args = 1..=2)]
    pub read_files_in: Vec<PathBuf>,

    /// Command to decompress input files (e.g. "zcat" for .gz)
    #[arg(long = "readFilesCommand")]
    pub read_files_command: Option<String>,

    /// Number of reads to map; -1 = all
    #[arg(long = "readMapNumber", default_value_t = -1, allow_hyphen_values = true)]
    pub read_map_number: i64,

    // ── Output ──────────────────────────────────────────────────────────
    /// Output file name prefix (including path)
    #[arg(long = "outFileNamePrefix", default_value = "./")]
    pub out_file_name_prefix: PathBuf,

    /// Output filter type: Normal or BySJout
    #[arg(long = "outFilterType", default_value = "Normal")]
    pub out_filter_type: OutFilterType,

    /// Max multimap loci (reads mapping to more loci are unmapped)
    #[arg(long = "outFilterMultimapNmax", default_value_t = 10)]
    pub out_filter_multimap_nmax: usize,

    /// Score range for multi-mapping (keep alignments within this range of best score)
    #[arg(long = "outFilterMultimapScoreRange", default_value_t = 1)]
    pub out_filter_multimap_score_range: i32,

    /// Min alignment score (absolute)
    #[arg(long = "outFilterScoreMin", default_value_t = 0)]
    pub out_filter_score_min: i32,

    /// Min alignment score normalized to read length
    #[arg(long = "outFilterScoreMinOverLread", default_value_t = 0.66)]
    pub out_filter_score_min_over_lread: f64,

    /// Min matched bases (absolute)
    #[arg(long = "outFilterMatchNmin", default_value_t = 0)]
    pub out_filter_match_nmin: u32,

    /// Min matched bases normalized to read length
    #[arg(long = "outFilterMatchNminOverLread", default_value_t = 0.66)]
    pub out_filter_match_nmin_over_lread: f64,

    /// Max mismatches per pair
    #[arg(long = "outFilterMismatchNmax", default_value_t = 10)]
    pub out_filter_mismatch_nmax: u32,

    /// Max ratio of mismatches to mapped length
    #[arg(long = "outFilterMismatchNoverLmax", default_value_t = 0.3)]
    pub out_filter_mismatch_nover_lmax: f64,

    /// Max ratio of mismatches to read length
    #[arg(long = "outFilterMismatchNoverReadLmax", default_value_t = 1.0)]
    pub out_filter_mismatch_nover_read_lmax: f64,

    /// Junction motif filter: None, RemoveNoncanonical, RemoveNoncanonicalUnannotated
    #[arg(long = "outFilterIntronMotifs", default_value = "None")]
    pub out_filter_intron_motifs: IntronMotifFilter,

    /// Junction strand filter: None or RemoveInconsistentStrands
    #[arg(long = "outFilterIntronStrands", default_value = "RemoveInconsistentStrands")]
    pub out_filter_intron_strands: IntronStrandFilter,

    /// Strand field: None or intronMotif
    #[arg(long = "outSAMstrandField", default_value = "None")]
    pub out_sam_strand_field: StrandField,

    /// Min unique reads supporting a novel junction (BySJout), per motif class:
    /// noncanonical, GT/AG, GC/AG, AT/AC
    #[arg(long = "outSJfilterCountUniqueMin", num_args = 4,
          default_values_t = vec![3, 1, 1, 1])]
    pub out_sj_filter_count_unique_min: Vec<u32>,

    /// Min total (unique + multimapping) reads supporting a novel junction,
    /// per motif class. Either count threshold is enough.
    #[arg(long = "outSJfilterCountTotalMin", num_args = 4,
          default_values_t = vec![3, 1, 1, 1])]
    pub out_sj_filter_count_total_min: Vec<u32>,

    /// Min overhang of a novel junction over its supporting reads, per motif
    /// class
    #[arg(long = "outSJfilterOverhangMin", num_args = 4,
          default_values_t = vec![30, 12, 12, 12])]
    pub out_sj_filter_overhang_min: Vec<u32>,

    // ── Alignment ───────────────────────────────────────────────────────
    /// Min intron size (smaller gaps are deletions)
    #[arg(long = "alignIntronMin", default_value_t = 21)]
    pub align_intron_min: u64,

    /// Max intron size; 0 = bounded by windows only
    #[arg(long = "alignIntronMax", default_value_t = 0)]
    pub align_intron_max: u64,

    /// Max genomic distance between mates; 0 = bounded by windows only
    #[arg(long = "alignMatesGapMax", default_value_t = 0)]
    pub align_mates_gap_max: u64,

    /// Min overhang for novel spliced alignments
    #[arg(long = "alignSJoverhangMin", default_value_t = 5)]
    pub align_sj_overhang_min: u32,

    /// Min overhang for annotated splice junctions
    #[arg(long = "alignSJDBoverhangMin", default_value_t = 3)]
    pub align_sjdb_overhang_min: u32,

    /// Min mapped length of a spliced mate
    #[arg(long = "alignSplicedMateMapLmin", default_value_t = 0)]
    pub align_spliced_mate_map_lmin: u32,

    /// Min mapped length of a spliced mate, relative to mate length
    #[arg(long = "alignSplicedMateMapLminOverLmate", default_value_t = 0.66)]
    pub align_spliced_mate_map_lmin_over_lmate: f64,

    /// Max mismatches for stitching SJs (4 ints: noncanonical, GT/AG, GC/AG, AT/AC); -1 = no limit
    #[arg(long = "alignSJstitchMismatchNmax", num_args = 4,
          default_values_t = vec![0, -1, 0, 0], allow_hyphen_values = true)]
    pub align_sj_stitch_mismatch_nmax: Vec<i32>,

    /// Max bases one mate may protrude past the start of the other
    #[arg(long = "alignEndsProtrude", default_value_t = 0)]
    pub align_ends_protrude: u64,

    /// Allow soft-clipping past chromosome ends: Yes or No
    #[arg(long = "alignSoftClipAtReferenceEnds", default_value = "Yes")]
    pub align_soft_clip_at_reference_ends: String,

    /// Max transcripts recorded per window
    #[arg(long = "alignTranscriptsPerWindowNmax", default_value_t = 100)]
    pub align_transcripts_per_window_nmax: usize,

    /// Max transcripts recorded per read
    #[arg(long = "alignTranscriptsPerReadNmax", default_value_t = 10000)]
    pub align_transcripts_per_read_nmax: usize,

    /// Max windows per read
    #[arg(long = "alignWindowsPerReadNmax", default_value_t = 10000)]
    pub align_windows_per_read_nmax: usize,

    // ── Alignment scoring ───────────────────────────────────────────────
    /// Splice junction penalty (canonical)
    #[arg(long = "scoreGap", default_value_t = 0, allow_hyphen_values = true)]
    pub score_gap: i32,

    /// Non-canonical junction penalty
    #[arg(long = "scoreGapNoncan", default_value_t = -8, allow_hyphen_values = true)]
    pub score_gap_noncan: i32,

    /// GC/AG junction penalty
    #[arg(long = "scoreGapGCAG", default_value_t = -4, allow_hyphen_values = true)]
    pub score_gap_gcag: i32,

    /// AT/AC junction penalty
    #[arg(long = "scoreGapATAC", default_value_t = -8, allow_hyphen_values = true)]
    pub score_gap_atac: i32,

    /// Deletion open penalty
    #[arg(long = "scoreDelOpen", default_value_t = -2, allow_hyphen_values = true)]
    pub score_del_open: i32,

    /// Deletion extension penalty per base
    #[arg(long = "scoreDelBase", default_value_t = -2, allow_hyphen_values = true)]
    pub score_del_base: i32,

    /// Insertion open penalty
    #[arg(long = "scoreInsOpen", default_value_t = -2, allow_hyphen_values = true)]
    pub score_ins_open: i32,

    /// Insertion extension penalty per base
    #[arg(long = "scoreInsBase", default_value_t = -2, allow_hyphen_values = true)]
    pub score_ins_base: i32,

    /// Max score reduction while searching for the best junction position
    #[arg(long = "scoreStitchSJshift", default_value_t = 1)]
    pub score_stitch_sj_shift: i32,

    /// Score adjustment log2-scaled with genomic span; 0 disables it
    #[arg(long = "scoreGenomicLengthLog2scale", default_value_t = -0.25,
          allow_hyphen_values = true)]
    pub score_genomic_length_log2_scale: f64,

    // ── Seed search ─────────────────────────────────────────────────────
    /// Search start points are spaced by at most this many bases
    #[arg(long = "seedSearchStartLmax", default_value_t = 50)]
    pub seed_search_start_lmax: usize,

    /// Max seed length; 0 = unlimited
    #[arg(long = "seedSearchLmax", default_value_t = 0)]
    pub seed_search_lmax: usize,

    /// Max number of loci a seed can map to (seeds with more loci are discarded)
    #[arg(long = "seedMultimapNmax", default_value_t = 10000)]
    pub seed_multimap_nmax: u64,

    /// Max number of seeds per read
    #[arg(long = "seedPerReadNmax", default_value_t = 1000)]
    pub seed_per_read_nmax: usize,

    /// Max number of seeds per window
    #[arg(long = "seedPerWindowNmax", default_value_t = 50)]
    pub seed_per_window_nmax: usize,

    /// Min length of a read piece between Ns to be searched
    #[arg(long = "seedSplitMin", default_value_t = 12)]
    pub seed_split_min: usize,

    /// Min seed length
    #[arg(long = "seedMapMin", default_value_t = 5)]
    pub seed_map_min: usize,

    // ── Windows ─────────────────────────────────────────────────────────
    /// Max number of loci anchors are allowed to map to
    #[arg(long = "winAnchorMultimapNmax", default_value_t = 50)]
    pub win_anchor_multimap_nmax: u64,

    /// Log2(window bin size)
    #[arg(long = "winBinNbits", default_value_t = 16)]
    pub win_bin_nbits: u32,

    /// Max distance (bins) between an anchor and a window to join it
    #[arg(long = "winAnchorDistNbins", default_value_t = 9)]
    pub win_anchor_dist_nbins: u64,

    /// Bins added on each side of a window
    #[arg(long = "winFlankNbins", default_value_t = 4)]
    pub win_flank_nbins: u64,

    // ── Chimeric ────────────────────────────────────────────────────────
    /// Min chimeric segment length; 0 = disable chimeric detection
    #[arg(long = "chimSegmentMin", default_value_t = 0)]
    pub chim_segment_min: u32,

    /// Min overhang for a chimeric junction inside one mate
    #[arg(long = "chimJunctionOverhangMin", default_value_t = 20)]
    pub chim_junction_overhang_min: u32,

    /// Min total chimeric score
    #[arg(long = "chimScoreMin", default_value_t = 0)]
    pub chim_score_min: i32,

    /// Max drop of the chimeric score below read length
    #[arg(long = "chimScoreDropMax", default_value_t = 20)]
    pub chim_score_drop_max: i32,

    /// Penalty for a non-GT/AG chimeric junction
    #[arg(long = "chimScoreJunctionNonGTAG", default_value_t = -1, allow_hyphen_values = true)]
    pub chim_score_junction_non_gtag: i32,

    /// Max read gap between chimeric segments of one mate
    #[arg(long = "chimSegmentReadGapMax", default_value_t = 0)]
    pub chim_segment_read_gap_max: u64,

    /// Min drop of the best linear score below read length to try chimeric detection
    #[arg(long = "chimNonchimScoreDropMin", default_value_t = 20)]
    pub chim_nonchim_score_drop_min: i32,

    /// Score range for multimapping chimeras
    #[arg(long = "chimMultimapScoreRange", default_value_t = 1)]
    pub chim_multimap_score_range: i32,

    /// Max number of chimeric alignments reported for a read
    #[arg(long = "chimMultimapNmax", default_value_t = 1)]
    pub chim_multimap_nmax: usize,
}

impl Parameters {
    /// Validate parameter combinations that clap alone cannot enforce.
    pub fn validate(&self) -> Result<(), Error> {
        // genomeGenerate requires FASTA files
        if self.run_mode == RunMode::GenomeGenerate && self.genome_fasta_files.is_empty() {
            return Err(Error::Parameter(
                "--genomeFastaFiles is required when --runMode genomeGenerate".into(),
            ));
        }

        // alignReads requires read files
        if self.run_mode == RunMode::AlignReads && self.read_files_in.is_empty() {
            return Err(Error::Parameter(
                "--readFilesIn is required when --runMode alignReads".into(),
            ));
        }

        if self.run_thread_n == 0 {
            return Err(Error::Parameter("--runThreadN must be >= 1".into()));
        }

        if self.genome_sa_sparse_d == 0 {
            return Err(Error::Parameter("--genomeSAsparseD must be >= 1".into()));
        }

        if self.seed_search_start_lmax == 0 {
            return Err(Error::Parameter(
                "--seedSearchStartLmax must be >= 1".into(),
            ));
        }

        if self.seed_per_window_nmax == 0 || self.align_transcripts_per_window_nmax == 0 {
            return Err(Error::Parameter(
                "--seedPerWindowNmax and --alignTranscriptsPerWindowNmax must be >= 1".into(),
            ));
        }

        match self.align_soft_clip_at_reference_ends.as_str() {
            "Yes" | "No" => {}
            other => {
                return Err(Error::Parameter(format!(
                    "--alignSoftClipAtReferenceEnds must be Yes or No, got '{other}'"
                )))
            }
        }

        if self.chim_segment_min > 0 && self.chim_multimap_nmax == 0 {
            return Err(Error::Parameter(
                "--chimMultimapNmax must be >= 1 when --chimSegmentMin > 0".into(),
            ));
        }

        Ok(())
    }

    /// Whether soft-clipping may run past a chromosome end.
    pub fn soft_clip_at_reference_ends(&self) -> bool {
        self.align_soft_clip_at_reference_ends == "Yes"
    }

    /// Whether chimeric detection is switched on.
    pub fn chimeric_enabled(&self) -> bool {
        self.chim_segment_min > 0
    }

    /// Return a copy adjusted to a loaded index.
    ///
    /// Structural values are taken from the index header (the index wins over
    /// the command line), and the window bin width is derived from the intron
    /// and mate-gap limits and clamped to the chromosome bin width.
    pub fn resolved_for(&self, header: &GenomeHeader) -> Parameters {
        let mut p = self.clone();

        if p.genome_chr_bin_nbits != header.chr_bin_nbits {
            info!(
                "genomeChrBinNbits taken from index: {} (command line: {})",
                header.chr_bin_nbits, p.genome_chr_bin_nbits
            );
        }
        p.genome_chr_bin_nbits = header.chr_bin_nbits;
        p.genome_sa_index_nbases = header.sa_index_nbases;
        p.genome_sa_sparse_d = header.sa_sparse_d;
        p.sjdb_overhang = header.sjdb_overhang;

        if p.align_intron_max > 0 || p.align_mates_gap_max > 0 {
            let gap_mates = if p.align_mates_gap_max == 0 {
                1000
            } else {
                p.align_mates_gap_max
            };
            let span = p.align_intron_max.max(4).max(gap_mates) as f64;
            let by_span = ((span / 4.0).log2() + 0.5).floor().max(0.0) as u32;
            let by_genome = ((header.n_genome as f64 / 40000.0 + 1.0).log2() + 0.5).floor() as u32;
            p.win_bin_nbits = by_span.max(by_genome);
        }
        p.win_bin_nbits = p.win_bin_nbits.min(p.genome_chr_bin_nbits);

        if p.align_intron_max > 0 || p.align_mates_gap_max > 0 {
            let max_gap = p.align_intron_max.max(p.align_mates_gap_max);
            p.win_flank_nbins = max_gap / (1u64 << p.win_bin_nbits) + 1;
            p.win_anchor_dist_nbins = 2 * p.win_flank_nbins;
        }

        info!(
            "winBinNbits={} winAnchorDistNbins={} winFlankNbins={}",
            p.win_bin_nbits, p.win_anchor_dist_nbins, p.win_flank_nbins
        );
        p
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse a STAR-style command line (without program name).
    fn parse(args: &[&str]) -> Parameters {
        let mut full = vec!["rustar"];
        full.extend_from_slice(args);
        Parameters::parse_from(full)
    }

    fn header(chr_bin_nbits: u32, n_genome: u64) -> GenomeHeader {
        GenomeHeader {
            version: crate::index::io::GENOME_VERSION.to_string(),
            chr_bin_nbits,
            sa_index_nbases: 4,
            sa_sparse_d: 1,
            sjdb_overhang: 10,
            n_genome,
            n_sa: 0,
        }
    }

    #[test]
    fn defaults() {
        let p = parse(&["--readFilesIn", "reads.fq"]);
        assert_eq!(p.run_mode, RunMode::AlignReads);
        assert_eq!(p.run_thread_n, 1);
        assert_eq!(p.genome_load, GenomeLoad::NoSharedMemory);
        assert_eq!(p.genome_dir, PathBuf::from("./GenomeDir"));
        assert_eq!(p.genome_sa_index_nbases, 14);
        assert_eq!(p.genome_chr_bin_nbits, 18);
        assert_eq!(p.genome_sa_sparse_d, 1);
        assert_eq!(p.read_map_number, -1);
        assert_eq!(p.out_filter_type, OutFilterType::Normal);
        assert_eq!(p.out_filter_multimap_nmax, 10);
        assert_eq!(p.out_filter_multimap_score_range, 1);
        assert_eq!(p.out_filter_mismatch_nmax, 10);
        assert!((p.out_filter_mismatch_nover_lmax - 0.3).abs() < f64::EPSILON);
        assert!((p.out_filter_score_min_over_lread - 0.66).abs() < f64::EPSILON);
        assert!((p.out_filter_match_nmin_over_lread - 0.66).abs() < f64::EPSILON);
        assert_eq!(p.out_filter_intron_motifs, IntronMotifFilter::None);
        assert_eq!(
            p.out_filter_intron_strands,
            IntronStrandFilter::RemoveInconsistentStrands
        );
        assert_eq!(p.out_sam_strand_field, StrandField::None);
        assert_eq!(p.out_sj_filter_count_unique_min, vec![3, 1, 1, 1]);
        assert_eq!(p.out_sj_filter_count_total_min, vec![3, 1, 1, 1]);
        assert_eq!(p.out_sj_filter_overhang_min, vec![30, 12, 12, 12]);
        assert_eq!(p.align_intron_min, 21);
        assert_eq!(p.align_intron_max, 0);
        assert_eq!(p.align_sj_overhang_min, 5);
        assert_eq!(p.align_sjdb_overhang_min, 3);
        assert_eq!(p.align_sj_stitch_mismatch_nmax, vec![0, -1, 0, 0]);
        assert!(p.soft_clip_at_reference_ends());
        assert_eq!(p.align_transcripts_per_window_nmax, 100);
        assert_eq!(p.score_gap_noncan, -8);
        assert!((p.score_genomic_length_log2_scale + 0.25).abs() < f64::EPSILON);
        assert_eq!(p.seed_search_start_lmax, 50);
        assert_eq!(p.seed_multimap_nmax, 10000);
        assert_eq!(p.seed_per_window_nmax, 50);
        assert_eq!(p.win_anchor_multimap_nmax, 50);
        assert_eq!(p.win_bin_nbits, 16);
        assert_eq!(p.win_anchor_dist_nbins, 9);
        assert_eq!(p.win_flank_nbins, 4);
        assert_eq!(p.chim_segment_min, 0);
        assert!(!p.chimeric_enabled());
        assert_eq!(p.chim_junction_overhang_min, 20);
        assert_eq!(p.chim_nonchim_score_drop_min, 20);
        assert_eq!(p.sjdb_score, 2);
    }

    #[test]
    fn genome_generate_mode() {
        let p = parse(&[
            "--runMode",
            "genomeGenerate",
            "--genomeDir",
            "/data/genome",
            "--genomeFastaFiles",
            "chr1.fa",
            "chr2.fa",
            "--genomeSAindexNbases",
            "11",
            "--sjdbFileChrStartEnd",
            "sj.tab",
            "--sjdbOverhang",
            "49",
        ]);
        assert_eq!(p.run_mode, RunMode::GenomeGenerate);
        assert_eq!(p.genome_dir, PathBuf::from("/data/genome"));
        assert_eq!(
            p.genome_fasta_files,
            vec![PathBuf::from("chr1.fa"), PathBuf::from("chr2.fa")]
        );
        assert_eq!(p.genome_sa_index_nbases, 11);
        assert_eq!(p.sjdb_file_chr_start_end, Some(PathBuf::from("sj.tab")));
        assert_eq!(p.sjdb_overhang, 49);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn typical_align_command() {
        let p = parse(&[
            "--genomeDir",
            "/idx/hg38",
            "--readFilesIn",
            "R1.fq.gz",
            "R2.fq.gz",
            "--readFilesCommand",
            "zcat",
            "--runThreadN",
            "16",
            "--genomeLoad",
            "Mmap",
            "--outFilterType",
            "BySJout",
            "--outFilterIntronMotifs",
            "RemoveNoncanonicalUnannotated",
            "--outSAMstrandField",
            "intronMotif",
            "--chimSegmentMin",
            "12",
        ]);
        assert_eq!(p.read_files_in.len(), 2);
        assert_eq!(p.read_files_command, Some("zcat".to_string()));
        assert_eq!(p.run_thread_n, 16);
        assert_eq!(p.genome_load, GenomeLoad::Mmap);
        assert_eq!(p.out_filter_type, OutFilterType::BySJout);
        assert_eq!(
            p.out_filter_intron_motifs,
            IntronMotifFilter::RemoveNoncanonicalUnannotated
        );
        assert_eq!(p.out_sam_strand_field, StrandField::IntronMotif);
        assert!(p.chimeric_enabled());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn scoring_overrides() {
        let p = parse(&[
            "--readFilesIn",
            "reads.fq",
            "--scoreGapNoncan",
            "-12",
            "--scoreDelOpen",
            "-3",
            "--scoreGenomicLengthLog2scale",
            "0",
            "--sjdbScore",
            "-1",
        ]);
        assert_eq!(p.score_gap_noncan, -12);
        assert_eq!(p.score_del_open, -3);
        assert_eq!(p.score_genomic_length_log2_scale, 0.0);
        assert_eq!(p.sjdb_score, -1);
    }

    #[test]
    fn validate_genome_generate_needs_fasta() {
        let p = parse(&["--runMode", "genomeGenerate"]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("genomeFastaFiles"));
    }

    #[test]
    fn validate_align_needs_reads() {
        let p = parse(&["--runMode", "alignReads"]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("readFilesIn"));
    }

    #[test]
    fn validate_soft_clip_value() {
        let p = parse(&["--readFilesIn", "r.fq", "--alignSoftClipAtReferenceEnds", "Maybe"]);
        assert!(p.validate().is_err());
        let p = parse(&["--readFilesIn", "r.fq", "--alignSoftClipAtReferenceEnds", "No"]);
        assert!(p.validate().is_ok());
        assert!(!p.soft_clip_at_reference_ends());
    }

    #[test]
    fn bad_enum_values_rejected_by_clap() {
        let r = Parameters::try_parse_from(["rustar", "--outFilterIntronMotifs", "Bogus"]);
        assert!(r.is_err());
        let r = Parameters::try_parse_from(["rustar", "--genomeLoad", "Shared"]);
        assert!(r.is_err());
    }

    #[test]
    fn resolved_takes_structure_from_index() {
        let p = parse(&["--readFilesIn", "r.fq", "--genomeChrBinNbits", "18"]);
        let r = p.resolved_for(&header(4, 1000));
        assert_eq!(r.genome_chr_bin_nbits, 4);
        assert_eq!(r.genome_sa_index_nbases, 4);
        assert_eq!(r.sjdb_overhang, 10);
        // default winBinNbits=16 clamped to the chromosome bin width
        assert_eq!(r.win_bin_nbits, 4);
        assert_eq!(r.win_anchor_dist_nbins, 9);
    }

    #[test]
    fn resolved_window_bins_follow_intron_max() {
        let p = parse(&["--readFilesIn", "r.fq", "--alignIntronMax", "4000"]);
        let r = p.resolved_for(&header(18, 1000));
        // log2(4000/4)=9.97 -> floor(10.47)=10
        assert_eq!(r.win_bin_nbits, 10);
        assert_eq!(r.win_flank_nbins, 4000 / 1024 + 1);
        assert_eq!(r.win_anchor_dist_nbins, 2 * r.win_flank_nbins);
    }

    #[test]
    fn sj_stitch_mismatch() {
        let p = parse(&[
            "--readFilesIn",
            "r.fq",
            "--alignSJstitchMismatchNmax",
            "1",
            "-1",
            "2",
            "3",
        ]);
        assert_eq!(p.align_sj_stitch_mismatch_nmax, vec![1, -1, 2, 3]);
    }
}
