// Chimeric segments and the alignments built from two of them

use crate::align::read::ReadSeqs;
use crate::align::transcript::{Exon, Transcript};
use crate::genome::{complement, Genome, GENOME_SPACING_CHAR};
use crate::params::Parameters;

/// One side of a chimeric alignment: a window transcript plus its extent
/// in original read coordinates.
#[derive(Debug, Clone)]
pub struct ChimericSegment {
    pub align: Transcript,
    /// Transcription strand implied by junction motifs: 0 unknown, 1 same
    /// as the read, 2 opposite.
    pub str: u8,
    pub ro_start: usize,
    pub ro_end: usize,
}

impl ChimericSegment {
    /// Wrap `align` if it can serve as a chimeric segment: long enough and
    /// free of non-canonical unannotated junctions.
    pub fn new(align: &Transcript, read: &ReadSeqs, params: &Parameters) -> Option<Self> {
        if align.r_length < params.chim_segment_min as usize || align.intron_motifs[0] > 0 {
            return None;
        }
        let str = if align.intron_motifs[1] == 0 && align.intron_motifs[2] == 0 {
            0
        } else if (align.str == 0) == (align.intron_motifs[1] > 0) {
            1
        } else {
            2
        };
        let l = read.len();
        let (first, last) = (align.exons[0], *align.last_exon());
        let (ro_start, ro_end) = if align.str == 0 {
            (first.r, last.r_end())
        } else {
            (l - 1 - last.r_end(), l - 1 - first.r)
        };
        Some(Self {
            align: align.clone(),
            str,
            ro_start,
            ro_end,
        })
    }

    /// Index of the exon at the read-start side.
    pub fn first_exon(&self) -> usize {
        if self.align.str == 0 {
            0
        } else {
            self.align.exons.len() - 1
        }
    }

    /// Index of the exon at the read-end side.
    pub fn last_exon(&self) -> usize {
        if self.align.str == 0 {
            self.align.exons.len() - 1
        } else {
            0
        }
    }

    /// Read-coordinate span `[start, end]` of exon `iex`.
    pub fn exon_span(&self, iex: usize, l_read: usize) -> (usize, usize) {
        let e = &self.align.exons[iex];
        if self.align.str == 0 {
            (e.r, e.r_end())
        } else {
            (l_read - 1 - e.r_end(), l_read - 1 - e.r)
        }
    }

    /// Genome base facing read position `x` on the diagonal of `exon`, in
    /// read direction.
    pub fn genome_base(&self, genome: &Genome, exon: &Exon, x: usize, l_read: usize) -> u8 {
        let r = if self.align.str == 0 {
            x as i64
        } else {
            l_read as i64 - 1 - x as i64
        };
        let g = exon.g as i64 + r - exon.r as i64;
        if g < 0 || g as u64 >= genome.n_genome {
            return GENOME_SPACING_CHAR;
        }
        let b = genome.base(g as u64);
        if self.align.str == 0 {
            b
        } else {
            complement(b)
        }
    }
}

/// Two segments joined at a chimeric breakpoint. `seg1` starts earlier in
/// the read.
#[derive(Debug, Clone)]
pub struct ChimericAlignment {
    pub seg1: ChimericSegment,
    pub seg2: ChimericSegment,
    pub score: i32,
    /// -1 breakpoint between mates, 0 other, 1 GT/AG, 2 CT/AC.
    pub junction_type: i8,
    pub repeat_left: u32,
    pub repeat_right: u32,
}

impl ChimericAlignment {
    pub fn new(a: ChimericSegment, b: ChimericSegment, score: i32) -> Self {
        let (seg1, seg2) = if a.ro_start > b.ro_start { (b, a) } else { (a, b) };
        Self {
            seg1,
            seg2,
            score,
            junction_type: 0,
            repeat_left: 0,
            repeat_right: 0,
        }
    }

    /// Exons on either side of the breakpoint.
    pub fn breakpoint_exons(&self) -> (&Exon, &Exon) {
        (
            &self.seg1.align.exons[self.seg1.last_exon()],
            &self.seg2.align.exons[self.seg2.first_exon()],
        )
    }

    /// Fragment order must not invert, and a breakpoint inside one mate
    /// needs enough overhang on both sides.
    pub fn is_valid(&self, params: &Parameters) -> bool {
        let (e1, e2) = self.breakpoint_exons();
        let overhang = params.chim_junction_overhang_min as usize;
        e1.frag <= e2.frag && (e1.frag < e2.frag || (e1.len >= overhang && e2.len >= overhang))
    }

    /// First intron base after the donor segment, 0-based forward genome.
    pub fn donor_breakpoint(&self) -> u64 {
        let (e1, _) = self.breakpoint_exons();
        if self.seg1.align.str == 0 {
            e1.g_end() + 1
        } else {
            e1.g - 1
        }
    }

    /// Last intron base before the acceptor segment, 0-based forward genome.
    pub fn acceptor_breakpoint(&self) -> u64 {
        let (_, e2) = self.breakpoint_exons();
        if self.seg2.align.str == 0 {
            e2.g - 1
        } else {
            e2.g_end() + 1
        }
    }
}
