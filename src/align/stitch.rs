//! Pairwise stitching: joining one more seed onto a partial alignment, and
//! extending alignment ends base by base.
//!
//! All read coordinates are in the read oriented for the window strand and
//! all genome coordinates are forward-strand.

use crate::align::read::MATE_SPACER;
use crate::align::score::{ScoringPolicy, SpliceMotif};
use crate::align::transcript::{Exon, Gap, GapKind, Transcript};
use crate::align::window::WindowSeed;
use crate::genome::GENOME_SPACING_CHAR;
use crate::index::GenomeIndex;
use crate::params::Parameters;

/// Longest repeat searched on either side of a junction.
const MAX_SJ_REPEAT: usize = 255;

/// Result of extending an alignment end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extension {
    pub len: usize,
    pub score: i32,
    pub n_mm: u32,
    pub n_match: u32,
}

/// Score, mismatches and matches of a run of read bases on one diagonal.
#[derive(Debug, Clone, Copy, Default)]
struct RunScore {
    score: i32,
    n_mm: u32,
    n_match: u32,
}

/// Everything stitching needs for one read on one strand.
pub struct StitchEnv<'a, S: ScoringPolicy> {
    /// Read oriented for the strand being stitched.
    pub read: &'a [u8],
    pub index: &'a GenomeIndex,
    pub params: &'a Parameters,
    pub scorer: &'a S,
    /// Mismatch cap for the whole read.
    pub mm_max_total: u32,
}

/// Chosen junction position in the deletion/splice scan.
#[derive(Debug, Clone, Copy)]
enum GapChoice {
    Annotated(usize),
    Novel(SpliceMotif),
    Deletion,
}

impl<'a, S: ScoringPolicy> StitchEnv<'a, S> {
    /// Forward-genome base; anything past the forward genome is padding.
    #[inline]
    fn g(&self, pos: u64) -> u8 {
        if pos < self.index.n_genome() {
            self.index.base(pos)
        } else {
            GENOME_SPACING_CHAR
        }
    }

    #[inline]
    fn g_at(&self, r: usize, diag: i64) -> u8 {
        let pos = r as i64 + diag;
        if pos < 0 {
            GENOME_SPACING_CHAR
        } else {
            self.g(pos as u64)
        }
    }

    /// Score of read bases `from..to` placed on diagonal `diag` (g = r + diag).
    fn run_score(&self, from: usize, to: usize, diag: i64) -> RunScore {
        let mut rs = RunScore::default();
        for r in from..to {
            let (rb, gb) = (self.read[r], self.g_at(r, diag));
            rs.score += self.scorer.base(rb, gb);
            if rb < 4 && gb < 4 {
                if rb == gb {
                    rs.n_match += 1;
                } else {
                    rs.n_mm += 1;
                }
            }
        }
        rs
    }

    /// Extend from read `r` / genome `g` (the first base to try when going
    /// forward, one past the first base to try when going backward).
    ///
    /// The best-scoring extension is kept as long as its mismatches, added
    /// to `n_mm_prev`, stay within both `mm_max_total` and
    /// `outFilterMismatchNoverLmax` of the aligned length.
    pub fn extend(
        &self,
        r: usize,
        g: u64,
        forward: bool,
        max_len: usize,
        l_prev: usize,
        n_mm_prev: u32,
    ) -> Option<Extension> {
        let p_mm_max = self.params.out_filter_mismatch_nover_lmax;
        let n_mm_max = self.mm_max_total as f64;
        let mut best = Extension::default();
        let (mut score, mut n_mm, mut n_match) = (0i32, 0u32, 0u32);

        for i in 0..max_len {
            let (rp, gp) = if forward {
                (r + i, g + i as u64)
            } else {
                if i >= r || i as u64 >= g {
                    break;
                }
                (r - 1 - i, g - 1 - i as u64)
            };
            if rp >= self.read.len() {
                break;
            }
            let (rb, gb) = (self.read[rp], self.g(gp));
            if gb == GENOME_SPACING_CHAR || rb == MATE_SPACER {
                break;
            }
            if rb > 3 || gb > 3 {
                continue;
            }
            if rb == gb {
                n_match += 1;
                score += self.scorer.base(rb, gb);
                if score > best.score {
                    let limit = (p_mm_max * (l_prev + i + 1) as f64).min(n_mm_max);
                    if ((n_mm + n_mm_prev) as f64) <= limit {
                        best = Extension {
                            len: i + 1,
                            score,
                            n_mm,
                            n_match,
                        };
                    }
                }
            } else {
                let limit = (p_mm_max * (l_prev + max_len) as f64).min(n_mm_max);
                if ((n_mm + n_mm_prev) as f64) >= limit {
                    break;
                }
                n_mm += 1;
                score += self.scorer.base(rb, gb);
            }
        }
        (best.len > 0).then_some(best)
    }

    /// Stitch seed `b` onto `tr`, whose last aligned base is read `r_a_end`
    /// at genome `g_a_end`. Returns the score change, or None if the seed
    /// cannot follow this alignment.
    pub fn stitch(
        &self,
        tr: &mut Transcript,
        r_a_end: usize,
        g_a_end: u64,
        b: &WindowSeed,
    ) -> Option<i32> {
        let last = *tr.last_exon();

        if b.sj.is_some()
            && last.sj == b.sj
            && last.frag == b.frag
            && b.r_start == r_a_end + 1
            && g_a_end + 1 < b.g_start
        {
            return self.stitch_annotated(tr, b);
        }

        if last.frag == b.frag {
            self.stitch_same_mate(tr, r_a_end, g_a_end, b)
        } else {
            self.stitch_mates(tr, r_a_end, g_a_end, b)
        }
    }

    /// Both pieces of a seed split at an annotated junction.
    fn stitch_annotated(&self, tr: &mut Transcript, b: &WindowSeed) -> Option<i32> {
        let isj = b.sj?;
        let rec = *self.index.sjdb.get(isj);
        let a_len = tr.last_exon().len;
        if rec.motif == 0
            && (b.length <= rec.shift_right as usize || a_len <= rec.shift_left as usize)
        {
            return None;
        }
        tr.exons.push(Exon {
            r: b.r_start,
            g: b.g_start,
            len: b.length,
            frag: b.frag,
            sj: b.sj,
        });
        tr.gaps.push(Gap {
            kind: GapKind::Splice(SpliceMotif::from_code(rec.motif)),
            annotated: true,
            shift: [rec.shift_left as usize, rec.shift_right as usize],
            sj_str: rec.strand,
        });
        tr.n_match += b.length as u32;
        Some(b.length as i32 + self.scorer.annotated_junction())
    }

    fn stitch_same_mate(
        &self,
        tr: &mut Transcript,
        r_a_end: usize,
        g_a_end: u64,
        b: &WindowSeed,
    ) -> Option<i32> {
        let (mut r_b, mut g_b, mut len) = (b.r_start, b.g_start, b.length);
        let r_b_end = r_b + len - 1;
        let g_b_end = g_b + len as u64 - 1;
        if r_b_end <= r_a_end || g_b_end <= g_a_end {
            return None;
        }
        if r_b <= r_a_end {
            let sh = r_a_end + 1 - r_b;
            r_b += sh;
            g_b += sh as u64;
            len -= sh;
        }
        if g_b <= g_a_end {
            let sh = (g_a_end + 1 - g_b) as usize;
            if sh >= len {
                return None;
            }
            r_b += sh;
            g_b += sh as u64;
        }

        let r_gap = (r_b - r_a_end - 1) as u64;
        let g_gap = g_b - g_a_end - 1;
        let d_a = g_a_end as i64 - r_a_end as i64;
        let d_b = g_b as i64 - r_b as i64;

        if g_gap == r_gap {
            let rs = self.run_score(r_a_end + 1, r_b_end + 1, d_a);
            if tr.n_mm + rs.n_mm > self.mm_max_total {
                return None;
            }
            tr.n_mm += rs.n_mm;
            tr.n_match += rs.n_match;
            let last = tr.exons.last_mut()?;
            last.len = r_b_end + 1 - last.r;
            Some(rs.score)
        } else if g_gap > r_gap {
            self.stitch_deletion(tr, r_a_end, g_a_end, r_b_end, d_a, d_b, b)
        } else {
            self.stitch_insertion(tr, r_a_end, g_a_end, r_b, r_b_end, d_a, d_b, b)
        }
    }

    /// Genome gap longer than the read gap: a junction or a deletion.
    #[allow(clippy::too_many_arguments)]
    fn stitch_deletion(
        &self,
        tr: &mut Transcript,
        r_a_end: usize,
        g_a_end: u64,
        r_b_end: usize,
        d_a: i64,
        d_b: i64,
        b: &WindowSeed,
    ) -> Option<i32> {
        let del = (d_b - d_a) as u64;
        let intron_max = self.params.align_intron_max;
        if intron_max > 0 && del > intron_max {
            return None;
        }
        let sjdb = &self.index.sjdb;
        let a_len = tr.last_exon().len as i64;
        let base_a = |r: usize| self.scorer.base(self.read[r], self.g_at(r, d_a));
        let base_b = |r: usize| self.scorer.base(self.read[r], self.g_at(r, d_b));

        // how far left the junction may start
        let mut j_left: i64 = 1;
        let mut loss = 0;
        loop {
            j_left -= 1;
            let r = (r_a_end as i64 + j_left) as usize;
            let (rb, ga, gb) = (self.read[r], self.g_at(r, d_a), self.g_at(r, d_b));
            if rb != gb && gb < 4 && rb == ga {
                loss -= 1;
            }
            if !(loss + self.scorer.junction_shift_allowance() >= 0 && a_len + j_left > 1) {
                break;
            }
        }

        let j_right = (r_b_end - r_a_end - 1) as i64;
        let mut best: Option<(i64, i32, GapChoice)> = None;
        let mut s = 0i32;
        for j in j_left..=j_right {
            let i_start = (g_a_end as i64 + j + 1) as u64;
            let i_end = i_start + del - 1;
            let (pen, choice) = if let Some(isj) = sjdb.find(i_start, i_end) {
                (self.scorer.annotated_junction(), GapChoice::Annotated(isj))
            } else if del >= self.params.align_intron_min {
                let motif = SpliceMotif::from_bases(
                    self.g(i_start),
                    self.g(i_start + 1),
                    self.g(i_end - 1),
                    self.g(i_end),
                );
                (self.scorer.junction(motif), GapChoice::Novel(motif))
            } else {
                (self.scorer.deletion(del), GapChoice::Deletion)
            };
            if best.map_or(true, |(_, total, _)| s + pen > total) {
                best = Some((j, s + pen, choice));
            }
            if j < j_right {
                let r = (r_a_end as i64 + j + 1) as usize;
                s += base_a(r) - base_b(r);
            }
        }
        let (mut j, _, choice) = best?;

        // repeat lengths around the chosen position
        let i_start = (g_a_end as i64 + j + 1) as u64;
        let i_end = i_start + del - 1;
        let mut jj_l = 0usize;
        while jj_l < MAX_SJ_REPEAT && i_start > jj_l as u64 {
            let x = self.g(i_start - 1 - jj_l as u64);
            if x > 3 || x != self.g(i_end - jj_l as u64) {
                break;
            }
            jj_l += 1;
        }
        let mut jj_r = 0usize;
        while jj_r < MAX_SJ_REPEAT {
            let x = self.g(i_start + jj_r as u64);
            if x > 3 || x != self.g(i_end + 1 + jj_r as u64) {
                break;
            }
            jj_r += 1;
        }

        let (kind, annotated, sj_str, motif_limit) = match choice {
            GapChoice::Annotated(isj) => {
                let rec = *sjdb.get(isj);
                if rec.motif == 0 {
                    let shift = rec.shift_left as i64;
                    if (r_b_end as i64 - (r_a_end as i64 + j)) <= shift || a_len <= shift {
                        return None;
                    }
                    j += shift;
                    jj_l += shift as usize;
                    jj_r = jj_r.saturating_sub(shift as usize);
                }
                let motif = SpliceMotif::from_code(rec.motif);
                (GapKind::Splice(motif), true, rec.strand, None)
            }
            GapChoice::Novel(motif) => {
                if motif == SpliceMotif::NonCanonical {
                    j -= jj_l as i64;
                    if a_len + j < 1 {
                        return None;
                    }
                    jj_r += jj_l;
                    jj_l = 0;
                }
                let limit = self
                    .params
                    .align_sj_stitch_mismatch_nmax
                    .get(motif.filter_category())
                    .copied()
                    .unwrap_or(-1);
                (GapKind::Splice(motif), false, motif.strand(), Some(limit))
            }
            GapChoice::Deletion => {
                j -= jj_l as i64;
                if a_len + j < 1 {
                    return None;
                }
                jj_r += jj_l;
                jj_l = 0;
                (GapKind::Deletion, false, 0, None)
            }
        };

        // exact accounting of the bases that moved
        let a_end_new = r_a_end as i64 + j;
        let (a_add, a_del) = if j >= 0 {
            (self.run_score(r_a_end + 1, a_end_new as usize + 1, d_a), RunScore::default())
        } else {
            (RunScore::default(), self.run_score(a_end_new as usize + 1, r_a_end + 1, d_a))
        };
        let b_run = self.run_score(a_end_new as usize + 1, r_b_end + 1, d_b);
        let gap_mm = a_add.n_mm + b_run.n_mm;
        if let Some(limit) = motif_limit {
            if limit >= 0 && gap_mm > limit as u32 {
                return None;
            }
        }
        let n_mm = (tr.n_mm + gap_mm).checked_sub(a_del.n_mm)?;
        if n_mm > self.mm_max_total {
            return None;
        }
        let pen = match kind {
            GapKind::Splice(_) if annotated => self.scorer.annotated_junction(),
            GapKind::Splice(m) => self.scorer.junction(m),
            _ => self.scorer.deletion(del),
        };

        tr.n_mm = n_mm;
        tr.n_match = tr.n_match + a_add.n_match + b_run.n_match - a_del.n_match;
        let last = tr.exons.last_mut()?;
        last.len = (a_len + j) as usize;
        let r_new = (a_end_new + 1) as usize;
        tr.exons.push(Exon {
            r: r_new,
            g: (r_new as i64 + d_b) as u64,
            len: r_b_end + 1 - r_new,
            frag: b.frag,
            sj: b.sj,
        });
        tr.gaps.push(Gap {
            kind,
            annotated,
            shift: [jj_l, jj_r],
            sj_str,
        });
        Some(a_add.score - a_del.score + b_run.score + pen)
    }

    /// Read gap longer than the genome gap: an insertion, placed at the
    /// leftmost best-scoring position.
    #[allow(clippy::too_many_arguments)]
    fn stitch_insertion(
        &self,
        tr: &mut Transcript,
        r_a_end: usize,
        g_a_end: u64,
        r_b: usize,
        r_b_end: usize,
        d_a: i64,
        d_b: i64,
        b: &WindowSeed,
    ) -> Option<i32> {
        let ins = (d_a - d_b) as usize;
        let g_gap = r_b - r_a_end - 1 - ins;
        let base_a = |r: usize| self.scorer.base(self.read[r], self.g_at(r, d_a));
        let base_b = |r: usize| self.scorer.base(self.read[r], self.g_at(r, d_b));

        let mut s: i32 = (r_a_end + 1 + ins..r_b).map(base_b).sum();
        let (mut best_j, mut best_s) = (0usize, s);
        for j in 0..g_gap {
            s += base_a(r_a_end + 1 + j) - base_b(r_a_end + 1 + j + ins);
            if s > best_s {
                best_s = s;
                best_j = j + 1;
            }
        }

        let a_add = self.run_score(r_a_end + 1, r_a_end + 1 + best_j, d_a);
        let r_new = r_a_end + 1 + best_j + ins;
        let b_run = self.run_score(r_new, r_b_end + 1, d_b);
        let n_mm = tr.n_mm + a_add.n_mm + b_run.n_mm;
        if n_mm > self.mm_max_total {
            return None;
        }
        tr.n_mm = n_mm;
        tr.n_match += a_add.n_match + b_run.n_match;
        tr.exons.last_mut()?.len += best_j;
        tr.exons.push(Exon {
            r: r_new,
            g: g_a_end + 1 + best_j as u64,
            len: r_b_end + 1 - r_new,
            frag: b.frag,
            sj: b.sj,
        });
        tr.gaps.push(Gap::new(GapKind::Insertion));
        Some(a_add.score + b_run.score + self.scorer.insertion(ins as u64))
    }

    /// Seed `b` starts the second mate: extend the first mate to its end,
    /// add `b`, and extend it back towards its mate start.
    fn stitch_mates(
        &self,
        tr: &mut Transcript,
        r_a_end: usize,
        g_a_end: u64,
        b: &WindowSeed,
    ) -> Option<i32> {
        let first = tr.exons[0];
        let protrude = self.params.align_ends_protrude;
        if !(b.g_start + first.r as u64 + protrude >= first.g || first.g < first.r as u64) {
            return None;
        }
        let mates_gap_max = self.params.align_mates_gap_max;
        if mates_gap_max > 0 && b.g_start > g_a_end + 1 + mates_gap_max {
            return None;
        }

        let mut score = 0;
        if let Some(ext) = self.extend(
            r_a_end + 1,
            g_a_end + 1,
            true,
            self.read.len() - r_a_end - 1,
            tr.n_match as usize,
            tr.n_mm,
        ) {
            score += ext.score;
            tr.n_mm += ext.n_mm;
            tr.n_match += ext.n_match;
            tr.exons.last_mut()?.len += ext.len;
        }

        let b_run = self.run_score(b.r_start, b.r_start + b.length, b.g_start as i64 - b.r_start as i64);
        score += b_run.score;
        tr.n_mm += b_run.n_mm;
        tr.n_match += b_run.n_match;
        let mut exon = Exon {
            r: b.r_start,
            g: b.g_start,
            len: b.length,
            frag: b.frag,
            sj: b.sj,
        };

        let back_max = (b.g_start + first.r as u64).saturating_sub(first.g) as usize;
        if let Some(ext) = self.extend(b.r_start, b.g_start, false, back_max, b.length, tr.n_mm) {
            score += ext.score;
            tr.n_mm += ext.n_mm;
            tr.n_match += ext.n_match;
            exon.r -= ext.len;
            exon.g -= ext.len as u64;
            exon.len += ext.len;
        }

        tr.exons.push(exon);
        tr.gaps.push(Gap::new(GapKind::MateGap));
        Some(score)
    }
}
