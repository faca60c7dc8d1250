// Chimeric alignment detection from window transcripts

use log::debug;

use crate::align::read::ReadSeqs;
use crate::align::transcript::{Exon, Transcript};
use crate::chimeric::segment::{ChimericAlignment, ChimericSegment};
use crate::genome::Genome;
use crate::index::GenomeIndex;
use crate::params::Parameters;

/// Longest repeat reported around a chimeric breakpoint.
const MAX_CHIM_REPEAT: u32 = 255;

/// Chimeric alignment detector
pub struct ChimericDetector<'a> {
    index: &'a GenomeIndex,
    params: &'a Parameters,
}

impl<'a> ChimericDetector<'a> {
    pub fn new(index: &'a GenomeIndex, params: &'a Parameters) -> Self {
        Self { index, params }
    }

    /// Whether a read whose best linear score is `best_score` is a
    /// candidate for chimeric detection at all.
    pub fn triggered(&self, read: &ReadSeqs, best_score: i32) -> bool {
        self.params.chimeric_enabled()
            && best_score <= read.bases() as i32 - self.params.chim_nonchim_score_drop_min
    }

    /// Pair window transcripts into chimeric alignments.
    ///
    /// Returns the best-scoring alignments within `chimMultimapScoreRange`
    /// of the best, or nothing if there are more than `chimMultimapNmax`.
    pub fn detect(
        &self,
        read: &ReadSeqs,
        windows: &[Vec<Transcript>],
        best_score: i32,
    ) -> Vec<ChimericAlignment> {
        if !self.triggered(read, best_score) {
            return Vec::new();
        }
        let p = self.params;
        let segments: Vec<ChimericSegment> = windows
            .iter()
            .flatten()
            .filter_map(|t| ChimericSegment::new(t, read, p))
            .collect();

        let range = p.chim_multimap_score_range;
        let mut best = 0;
        let mut found = Vec::new();
        for (i, s1) in segments.iter().enumerate() {
            for s2 in &segments[i + 1..] {
                if s1.str != 0 && s2.str != 0 && s1.str != s2.str {
                    continue;
                }
                let score = s1.align.score + s2.align.score + p.chim_score_junction_non_gtag;
                if score <= best - range {
                    continue;
                }
                let chim = ChimericAlignment::new(s1.clone(), s2.clone(), score);
                if !chim.is_valid(p) || !self.read_layout_ok(&chim, read) {
                    continue;
                }
                best = best.max(score);
                found.push(chim);
            }
        }

        found.retain(|c| c.score + range >= best);
        for chim in &mut found {
            self.refine_breakpoint(chim, read);
        }
        found.retain(|c| c.is_valid(p));
        let best = found.iter().map(|c| c.score).max().unwrap_or(0);
        let min_score = p
            .chim_score_min
            .max(read.bases() as i32 - p.chim_score_drop_max);
        found.retain(|c| c.score + range >= best && c.score >= min_score);
        if found.len() > p.chim_multimap_nmax.max(1) {
            debug!("{}: {} chimeric alignments, none reported", read.name, found.len());
            return Vec::new();
        }
        found.sort_by(|a, b| b.score.cmp(&a.score));
        found
    }

    /// The second segment must start after the first and end past it, with
    /// at most `chimSegmentReadGapMax` unaligned bases between them inside
    /// one mate.
    fn read_layout_ok(&self, chim: &ChimericAlignment, read: &ReadSeqs) -> bool {
        let (s1, s2) = (&chim.seg1, &chim.seg2);
        if s2.ro_start <= s1.ro_start || s2.ro_end <= s1.ro_end {
            return false;
        }
        let (e1, e2) = chim.breakpoint_exons();
        if e1.frag != e2.frag {
            return true;
        }
        let gap_max = self.params.chim_segment_read_gap_max as usize;
        s2.ro_start <= s1.ro_end + 1 + gap_max
            && read.frag_at(0, s1.ro_end) == read.frag_at(0, s2.ro_start)
    }

    /// Move the breakpoint of segments that overlap or abut in the read to
    /// the best position, preferring GT/AG motifs on either strand, then
    /// record the junction type and flanking repeats.
    fn refine_breakpoint(&self, chim: &mut ChimericAlignment, read: &ReadSeqs) {
        let genome = &self.index.genome;
        let l = read.len();
        let fwd = read.forward();
        let (i1, i2) = (chim.seg1.last_exon(), chim.seg2.first_exon());
        let (e1, e2) = (chim.seg1.align.exons[i1], chim.seg2.align.exons[i2]);
        if e1.frag != e2.frag {
            chim.junction_type = -1;
            return;
        }
        let (start1, end1) = chim.seg1.exon_span(i1, l);
        let (start2, end2) = chim.seg2.exon_span(i2, l);
        if start2 <= start1 || start2 > end1 + 1 || end2 <= end1 {
            return;
        }

        let base_score = |seg: &ChimericSegment, e: &Exon, x: usize| -> i32 {
            let (r, g) = (fwd[x], seg.genome_base(genome, e, x, l));
            if r > 3 || g > 3 {
                0
            } else if r == g {
                1
            } else {
                -1
            }
        };
        // breakpoint after read base x: seg1 keeps ..=x, seg2 keeps x+1..
        let (x_lo, x_hi) = (start2 - 1, end1);
        let overlap_1: i32 = (start2..=end1).map(|x| base_score(&chim.seg1, &e1, x)).sum();
        let overlap_2: i32 = (start2..=end1).map(|x| base_score(&chim.seg2, &e2, x)).sum();

        let non_gtag = self.params.chim_score_junction_non_gtag;
        let mut best: Option<(usize, i32, i8)> = None;
        // x_lo leaves the whole overlap to seg2
        let mut s = overlap_2;
        for x in x_lo..=x_hi {
            if x > x_lo {
                s += base_score(&chim.seg1, &e1, x) - base_score(&chim.seg2, &e2, x);
            }
            let motif = self.motif(genome, chim, &e1, &e2, x, l);
            let value = s + if motif > 0 { 0 } else { non_gtag };
            if best.map_or(true, |(_, v, _)| value > v) {
                best = Some((x, value, motif));
            }
        }
        let Some((x, value, motif)) = best else {
            return;
        };

        chim.score = chim.seg1.align.score + chim.seg2.align.score - overlap_1 - overlap_2 + value;
        chim.junction_type = motif;
        trim_end(&mut chim.seg1, i1, x, l);
        trim_start(&mut chim.seg2, i2, x + 1, l);

        let (e1, e2) = (chim.seg1.align.exons[i1], chim.seg2.align.exons[i2]);
        let mut left = 0;
        while left < MAX_CHIM_REPEAT && (left as usize) < x {
            let y = x - left as usize;
            let b = chim.seg1.genome_base(genome, &e1, y, l);
            if b > 3 || b != chim.seg2.genome_base(genome, &e2, y, l) {
                break;
            }
            left += 1;
        }
        let mut right = 0;
        while right < MAX_CHIM_REPEAT && x + 1 + (right as usize) < l {
            let y = x + 1 + right as usize;
            let b = chim.seg2.genome_base(genome, &e2, y, l);
            if b > 3 || b != chim.seg1.genome_base(genome, &e1, y, l) {
                break;
            }
            right += 1;
        }
        chim.repeat_left = left;
        chim.repeat_right = right;
    }

    /// 1 for GT/AG, 2 for CT/AC read across the breakpoint after `x`.
    fn motif(
        &self,
        genome: &Genome,
        chim: &ChimericAlignment,
        e1: &Exon,
        e2: &Exon,
        x: usize,
        l: usize,
    ) -> i8 {
        if x == 0 {
            return 0;
        }
        let d1 = chim.seg1.genome_base(genome, e1, x + 1, l);
        let d2 = chim.seg1.genome_base(genome, e1, x + 2, l);
        let a1 = chim.seg2.genome_base(genome, e2, x - 1, l);
        let a2 = chim.seg2.genome_base(genome, e2, x, l);
        match (d1, d2, a1, a2) {
            (2, 3, 0, 2) => 1,
            (1, 3, 0, 1) => 2,
            _ => 0,
        }
    }
}

/// Shorten segment exon `iex` so it ends at read position `x`.
fn trim_end(seg: &mut ChimericSegment, iex: usize, x: usize, l: usize) {
    let (_, end) = seg.exon_span(iex, l);
    if x >= end {
        return;
    }
    let cut = end - x;
    seg.align.r_length -= cut;
    let e = &mut seg.align.exons[iex];
    if seg.align.str == 0 {
        e.len -= cut;
    } else {
        e.r += cut;
        e.g += cut as u64;
        e.len -= cut;
    }
    seg.ro_end = x;
}

/// Shorten segment exon `iex` so it starts at read position `x`.
fn trim_start(seg: &mut ChimericSegment, iex: usize, x: usize, l: usize) {
    let (start, _) = seg.exon_span(iex, l);
    if x <= start {
        return;
    }
    let cut = x - start;
    seg.align.r_length -= cut;
    let e = &mut seg.align.exons[iex];
    if seg.align.str == 0 {
        e.r += cut;
        e.g += cut as u64;
        e.len -= cut;
    } else {
        e.len -= cut;
    }
    seg.ro_start = x;
}
