/// Scoring of matches, gaps and splice junctions
use crate::params::Parameters;

/// Splice junction motif, read from the forward genome.
///
/// The numeric code (1..=6) is the one stored in `sjdbInfo.txt`: odd codes
/// are plus-strand motifs, even codes their reverse complements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpliceMotif {
    NonCanonical,
    /// GT-AG (+)
    GtAg,
    /// CT-AC (-)
    CtAc,
    /// GC-AG (+)
    GcAg,
    /// CT-GC (-)
    CtGc,
    /// AT-AC (+)
    AtAc,
    /// GT-AT (-)
    GtAt,
}

impl SpliceMotif {
    /// Motif from the first two and last two intron bases (encoded).
    pub fn from_bases(d1: u8, d2: u8, a1: u8, a2: u8) -> Self {
        Self::from_code(crate::index::sjdb::motif_code(d1, d2, a1, a2))
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::GtAg,
            2 => Self::CtAc,
            3 => Self::GcAg,
            4 => Self::CtGc,
            5 => Self::AtAc,
            6 => Self::GtAt,
            _ => Self::NonCanonical,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NonCanonical => 0,
            Self::GtAg => 1,
            Self::CtAc => 2,
            Self::GcAg => 3,
            Self::CtGc => 4,
            Self::AtAc => 5,
            Self::GtAt => 6,
        }
    }

    /// 0 undefined, 1 plus, 2 minus.
    pub fn strand(self) -> u8 {
        crate::index::sjdb::motif_strand(self.code())
    }

    /// Motif class used by per-class limits:
    /// 0 non-canonical, 1 GT/AG, 2 GC/AG, 3 AT/AC (either strand).
    pub fn filter_category(self) -> usize {
        (self.code() as usize + 1) / 2
    }
}

/// Scores used while stitching seeds into alignments.
///
/// Implementations must keep the threshold semantics the stitcher relies
/// on: a match never scores below a mismatch, and penalties are zero or
/// negative.
pub trait ScoringPolicy: Send + Sync {
    /// Score of one read base against one genome base (both encoded).
    /// Ns on either side score zero.
    #[inline]
    fn base(&self, read: u8, genome: u8) -> i32 {
        if read > 3 || genome > 3 {
            0
        } else if read == genome {
            1
        } else {
            -1
        }
    }

    /// Penalty for an unannotated junction with this motif.
    fn junction(&self, motif: SpliceMotif) -> i32;

    /// Bonus for a junction present in the annotation table.
    fn annotated_junction(&self) -> i32;

    fn deletion(&self, len: u64) -> i32;

    fn insertion(&self, len: u64) -> i32;

    /// How far the junction scan may move left into the upstream exon,
    /// expressed as the score it may lose doing so.
    fn junction_shift_allowance(&self) -> i32;

    /// Adjustment applied once per finished alignment from its genomic span.
    fn genomic_length(&self, span: u64) -> i32;
}

/// Default policy driven by the `score*` parameters.
#[derive(Debug, Clone)]
pub struct AlignmentScorer {
    /// Applied to every junction
    pub score_gap: i32,
    pub score_gap_noncan: i32,
    pub score_gap_gcag: i32,
    pub score_gap_atac: i32,
    pub score_del_open: i32,
    pub score_del_base: i32,
    pub score_ins_open: i32,
    pub score_ins_base: i32,
    pub sjdb_score: i32,
    pub score_stitch_sj_shift: i32,
    pub score_genomic_length_log2_scale: f64,
}

impl AlignmentScorer {
    pub fn from_params(params: &Parameters) -> Self {
        Self {
            score_gap: params.score_gap,
            score_gap_noncan: params.score_gap_noncan,
            score_gap_gcag: params.score_gap_gcag,
            score_gap_atac: params.score_gap_atac,
            score_del_open: params.score_del_open,
            score_del_base: params.score_del_base,
            score_ins_open: params.score_ins_open,
            score_ins_base: params.score_ins_base,
            sjdb_score: params.sjdb_score,
            score_stitch_sj_shift: params.score_stitch_sj_shift,
            score_genomic_length_log2_scale: params.score_genomic_length_log2_scale,
        }
    }
}

impl ScoringPolicy for AlignmentScorer {
    fn junction(&self, motif: SpliceMotif) -> i32 {
        self.score_gap
            + match motif.filter_category() {
                0 => self.score_gap_noncan,
                1 => 0,
                2 => self.score_gap_gcag,
                _ => self.score_gap_atac,
            }
    }

    fn annotated_junction(&self) -> i32 {
        self.sjdb_score
    }

    fn deletion(&self, len: u64) -> i32 {
        self.score_del_open + self.score_del_base * len as i32
    }

    fn insertion(&self, len: u64) -> i32 {
        self.score_ins_open + self.score_ins_base * len as i32
    }

    fn junction_shift_allowance(&self) -> i32 {
        self.score_stitch_sj_shift
    }

    /// `ceil(log2(span) * scale - 0.5)`; zero when the scale is zero.
    fn genomic_length(&self, span: u64) -> i32 {
        if self.score_genomic_length_log2_scale == 0.0 || span == 0 {
            return 0;
        }
        ((span as f64).log2() * self.score_genomic_length_log2_scale - 0.5).ceil() as i32
    }
}
