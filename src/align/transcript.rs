/// Transcript data structures for storing alignment results
use std::fmt;

use crate::align::read::ReadSeqs;
use crate::align::score::SpliceMotif;

/// An aligned block: read bases `r..r+len` match genome `g..g+len`.
///
/// Read coordinates are in the read oriented for the transcript's strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exon {
    pub r: usize,
    pub g: u64,
    pub len: usize,
    pub frag: usize,
    /// Annotated junction of the seed this block came from.
    pub sj: Option<usize>,
}

impl Exon {
    /// Last read position, inclusive.
    pub fn r_end(&self) -> usize {
        self.r + self.len - 1
    }

    /// Last genome position, inclusive.
    pub fn g_end(&self) -> u64 {
        self.g + self.len as u64 - 1
    }
}

/// What separates two consecutive exons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Splice(SpliceMotif),
    Deletion,
    Insertion,
    /// Boundary between the two mates of a pair.
    MateGap,
}

impl GapKind {
    /// Numeric class: motif code (0..=6) for junctions, -1 deletion,
    /// -2 insertion, -3 mate gap.
    pub fn canon(self) -> i8 {
        match self {
            GapKind::Splice(m) => m.code() as i8,
            GapKind::Deletion => -1,
            GapKind::Insertion => -2,
            GapKind::MateGap => -3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub kind: GapKind,
    pub annotated: bool,
    /// Bases the junction could slide left / right without changing the
    /// aligned sequence.
    pub shift: [usize; 2],
    /// Strand implied by the junction: 0 undefined, 1 plus, 2 minus.
    pub sj_str: u8,
}

impl Gap {
    pub fn new(kind: GapKind) -> Self {
        Self {
            kind,
            annotated: false,
            shift: [0, 0],
            sj_str: 0,
        }
    }

    pub fn is_junction(&self) -> bool {
        matches!(self.kind, GapKind::Splice(_))
    }

    pub fn is_novel_junction(&self) -> bool {
        self.is_junction() && !self.annotated
    }
}

/// A complete alignment of a read to the genome.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub exons: Vec<Exon>,
    /// `gaps[i]` lies between `exons[i]` and `exons[i + 1]`.
    pub gaps: Vec<Gap>,
    pub chr: usize,
    /// 0 forward, 1 reverse.
    pub str: u8,
    /// Window this alignment was stitched in.
    pub window: usize,
    pub r_start: usize,
    pub r_length: usize,
    pub g_start: u64,
    pub g_length: u64,
    /// Start in the original read orientation.
    pub ro_start: usize,
    pub score: i32,
    pub n_mm: u32,
    pub n_match: u32,
    /// Seeds with a single locus used.
    pub n_unique: u32,
    pub n_anchor: u32,
    /// Junction counts by strand: undefined, plus, minus.
    pub intron_motifs: [u32; 3],
    pub sj_motif_strand: u8,
    /// Mate covered by the alignment, None when it spans both.
    pub frag: Option<usize>,
}

impl Transcript {
    pub fn last_exon(&self) -> &Exon {
        &self.exons[self.exons.len() - 1]
    }

    /// Exclusive genomic end.
    pub fn g_end(&self) -> u64 {
        self.g_start + self.g_length
    }

    pub fn n_junctions(&self) -> usize {
        self.gaps.iter().filter(|g| g.is_junction()).count()
    }

    /// Novel junctions as (first intron base, last intron base, motif code).
    pub fn novel_junctions(&self) -> impl Iterator<Item = (u64, u64, u8)> + '_ {
        self.gaps.iter().enumerate().filter_map(|(i, gap)| match gap.kind {
            GapKind::Splice(m) if !gap.annotated => {
                let a = &self.exons[i];
                Some((a.g + a.len as u64, self.exons[i + 1].g - 1, m.code()))
            }
            _ => None,
        })
    }

    /// (count, total length) of deletions and insertions.
    pub fn indels(&self) -> ((u32, u64), (u32, u64)) {
        let mut del = (0, 0);
        let mut ins = (0, 0);
        for (i, gap) in self.gaps.iter().enumerate() {
            let (a, b) = (&self.exons[i], &self.exons[i + 1]);
            match gap.kind {
                GapKind::Deletion => {
                    del.0 += 1;
                    del.1 += b.g - (a.g + a.len as u64);
                }
                GapKind::Insertion => {
                    ins.0 += 1;
                    ins.1 += (b.r - (a.r + a.len)) as u64;
                }
                _ => {}
            }
        }
        (del, ins)
    }

    /// CIGAR-like description along the forward genome. Mate gaps are
    /// written as `<n>p` (negative when the mates overlap).
    pub fn cigar(&self, read: &ReadSeqs) -> Vec<CigarOp> {
        let mut ops = Vec::with_capacity(2 * self.exons.len() + 2);
        let first = &self.exons[0];
        let lead = first.r - read.mate_range(self.str, first.frag).start;
        if lead > 0 {
            ops.push(CigarOp::SoftClip(lead as u32));
        }
        for (i, ex) in self.exons.iter().enumerate() {
            if i > 0 {
                let prev = &self.exons[i - 1];
                let prev_end = prev.g + prev.len as u64;
                let gap = &self.gaps[i - 1];
                if gap.kind == GapKind::MateGap {
                    let s1 = read.mate_range(self.str, prev.frag).end - (prev.r + prev.len);
                    let s2 = ex.r - read.mate_range(self.str, ex.frag).start;
                    if s1 > 0 {
                        ops.push(CigarOp::SoftClip(s1 as u32));
                    }
                    ops.push(CigarOp::MateGap(ex.g as i64 - prev_end as i64));
                    if s2 > 0 {
                        ops.push(CigarOp::SoftClip(s2 as u32));
                    }
                } else {
                    let gap_r = ex.r - (prev.r + prev.len);
                    let gap_g = ex.g - prev_end;
                    if gap_r > 0 {
                        ops.push(CigarOp::Ins(gap_r as u32));
                    }
                    if gap.is_junction() {
                        ops.push(CigarOp::RefSkip(gap_g as u32));
                    } else if gap_g > 0 {
                        ops.push(CigarOp::Del(gap_g as u32));
                    }
                }
            }
            ops.push(CigarOp::Match(ex.len as u32));
        }
        let last = self.last_exon();
        let trail = read.mate_range(self.str, last.frag).end - (last.r + last.len);
        if trail > 0 {
            ops.push(CigarOp::SoftClip(trail as u32));
        }
        ops
    }

    pub fn cigar_string(&self, read: &ReadSeqs) -> String {
        self.cigar(read).iter().map(|op| op.to_string()).collect()
    }
}

/// Genomic bases shared by blocks of `a` and `b` lying on the same diagonal.
pub fn blocks_overlap(a: &Transcript, b: &Transcript) -> u64 {
    if a.str != b.str {
        return 0;
    }
    let (mut i, mut j) = (0, 0);
    let mut overlap = 0;
    while i < a.exons.len() && j < b.exons.len() {
        let (x, y) = (&a.exons[i], &b.exons[j]);
        let (x_end, y_end) = (x.g + x.len as u64, y.g + y.len as u64);
        if x.g >= y_end {
            j += 1;
        } else if y.g >= x_end {
            i += 1;
        } else {
            if x.g as i64 - x.r as i64 == y.g as i64 - y.r as i64 {
                overlap += x_end.min(y_end) - x.g.max(y.g);
            }
            if x_end < y_end {
                i += 1;
            } else {
                j += 1;
            }
        }
    }
    overlap
}

/// CIGAR operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// M: match/mismatch
    Match(u32),
    /// I: insertion to reference
    Ins(u32),
    /// D: deletion from reference
    Del(u32),
    /// N: splice junction (skipped reference region)
    RefSkip(u32),
    /// S: soft clip (clipped sequence present in read)
    SoftClip(u32),
    /// p: genomic distance between mates
    MateGap(i64),
}

impl CigarOp {
    /// Get the operation character
    pub fn op_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Ins(_) => 'I',
            CigarOp::Del(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::MateGap(_) => 'p',
        }
    }

    /// Check if operation consumes reference bases
    pub fn consumes_reference(&self) -> bool {
        matches!(self, CigarOp::Match(_) | CigarOp::Del(_) | CigarOp::RefSkip(_))
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CigarOp::Match(n)
            | CigarOp::Ins(n)
            | CigarOp::Del(n)
            | CigarOp::RefSkip(n)
            | CigarOp::SoftClip(n) => write!(f, "{}{}", n, self.op_char()),
            CigarOp::MateGap(n) => write!(f, "{}{}", n, self.op_char()),
        }
    }
}
