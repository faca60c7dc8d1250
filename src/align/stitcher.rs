//! Recursive include/exclude search over the seeds of one window.
use std::collections::HashSet;

use log::debug;

use crate::align::read::ReadSeqs;
use crate::align::score::{AlignmentScorer, ScoringPolicy};
use crate::align::stitch::StitchEnv;
use crate::align::transcript::{blocks_overlap, Exon, GapKind, Transcript};
use crate::align::window::{Window, WindowSeed};
use crate::index::GenomeIndex;
use crate::params::{IntronMotifFilter, IntronStrandFilter, Parameters, StrandField};

/// Novel junctions `(intron start, intron end)` allowed in the second pass
/// of the junction-filtered mode.
pub type JunctionSet = HashSet<(u64, u64)>;

/// Default cap on the include/exclude search of one window; each call is
/// one decision.
pub const MAX_STITCH_CALLS: u32 = 1 << 20;

/// Builds scored transcripts from window seeds.
pub struct Stitcher<'a, S: ScoringPolicy = AlignmentScorer> {
    index: &'a GenomeIndex,
    params: &'a Parameters,
    scorer: &'a S,
    approved: Option<&'a JunctionSet>,
    call_limit: u32,
}

/// Transcripts of one window, best first.
#[derive(Debug, Default)]
pub struct StitchedWindow {
    pub transcripts: Vec<Transcript>,
    /// The search hit the call limit; other combinations were not tried.
    pub truncated: bool,
}

/// Per-window search state.
struct WindowSearch<'w> {
    seeds: &'w [WindowSeed],
    last_anchor: Option<usize>,
    chr: usize,
    str: u8,
    window: usize,
    found: Vec<Transcript>,
    calls: u32,
    truncated: bool,
}

impl<'a, S: ScoringPolicy> Stitcher<'a, S> {
    pub fn new(index: &'a GenomeIndex, params: &'a Parameters, scorer: &'a S) -> Self {
        Self {
            index,
            params,
            scorer,
            approved: None,
            call_limit: MAX_STITCH_CALLS,
        }
    }

    /// Cap the include/exclude decisions made per window.
    pub fn with_call_limit(mut self, limit: u32) -> Self {
        self.call_limit = limit;
        self
    }

    /// Only accept novel junctions present in `set`.
    pub fn with_approved_junctions(mut self, set: &'a JunctionSet) -> Self {
        self.approved = Some(set);
        self
    }

    /// All transcripts of window `iw`.
    ///
    /// `mate_best` carries the best single-mate score seen so far for the
    /// read across windows.
    pub fn stitch_window(
        &self,
        read: &ReadSeqs,
        iw: usize,
        window: &Window,
        mate_best: &mut [i32; 2],
    ) -> StitchedWindow {
        let env = StitchEnv {
            read: read.oriented(window.str),
            index: self.index,
            params: self.params,
            scorer: self.scorer,
            mm_max_total: mismatch_max_total(self.params, read),
        };
        let mut ws = WindowSearch {
            seeds: &window.seeds,
            last_anchor: window.last_anchor,
            chr: window.chr,
            str: window.str,
            window: iw,
            found: Vec::new(),
            calls: 0,
            truncated: false,
        };
        self.search(&env, read, &mut ws, 0, Transcript::default(), 0, 0, 0, mate_best);
        if ws.truncated {
            debug!(
                "{}: stitching window {} stopped after {} steps",
                read.name, iw, ws.calls
            );
        }
        StitchedWindow {
            transcripts: ws.found,
            truncated: ws.truncated,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        env: &StitchEnv<S>,
        read: &ReadSeqs,
        ws: &mut WindowSearch,
        i_a: usize,
        tr: Transcript,
        score: i32,
        r_end: usize,
        g_end: u64,
        mate_best: &mut [i32; 2],
    ) {
        if ws.calls >= self.call_limit {
            ws.truncated = true;
            return;
        }
        ws.calls += 1;

        if i_a >= ws.seeds.len() {
            if !tr.exons.is_empty() {
                self.finalize(env, read, ws, tr, score, r_end, g_end, mate_best);
            }
            return;
        }

        let a = ws.seeds[i_a];
        let mut with = tr.clone();
        let d_score = if with.exons.is_empty() {
            with.exons.push(Exon {
                r: a.r_start,
                g: a.g_start,
                len: a.length,
                frag: a.frag,
                sj: a.sj,
            });
            with.r_start = a.r_start;
            with.g_start = a.g_start;
            with.n_match = a.length as u32;
            Some(a.length as i32)
        } else {
            env.stitch(&mut with, r_end, g_end, &a)
        };
        if let Some(ds) = d_score {
            if a.n_rep == 1 {
                with.n_unique += 1;
            }
            if a.anchor {
                with.n_anchor += 1;
            }
            let r2 = a.r_start + a.length - 1;
            let g2 = a.g_start + a.length as u64 - 1;
            self.search(env, read, ws, i_a + 1, with, score + ds, r2, g2, mate_best);
        }

        if ws.last_anchor != Some(i_a) || tr.n_anchor > 0 {
            self.search(env, read, ws, i_a + 1, tr, score, r_end, g_end, mate_best);
        }
    }

    /// Extend, check and record a complete candidate.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        env: &StitchEnv<S>,
        read: &ReadSeqs,
        ws: &mut WindowSearch,
        mut tr: Transcript,
        mut score: i32,
        mut r_end: usize,
        mut g_end: u64,
        mate_best: &mut [i32; 2],
    ) {
        let p = self.params;
        let l_read = read.len();
        tr.chr = ws.chr;
        tr.str = ws.str;
        tr.window = ws.window;
        tr.r_start = tr.exons[0].r;
        tr.g_start = tr.exons[0].g;

        let order = if tr.str == 0 { [true, false] } else { [false, true] };
        for at_start in order {
            if at_start {
                if tr.r_start == 0 {
                    continue;
                }
                if let Some(ext) = env.extend(
                    tr.r_start,
                    tr.g_start,
                    false,
                    tr.r_start,
                    r_end + 1 - tr.r_start,
                    tr.n_mm,
                ) {
                    score += ext.score;
                    tr.n_mm += ext.n_mm;
                    tr.n_match += ext.n_match;
                    tr.r_start -= ext.len;
                    tr.g_start -= ext.len as u64;
                    let first = &mut tr.exons[0];
                    first.r = tr.r_start;
                    first.g = tr.g_start;
                    first.len += ext.len;
                }
            } else if r_end + 1 < l_read {
                if let Some(ext) = env.extend(
                    r_end + 1,
                    g_end + 1,
                    true,
                    l_read - r_end - 1,
                    r_end + 1 - tr.r_start,
                    tr.n_mm,
                ) {
                    score += ext.score;
                    tr.n_mm += ext.n_mm;
                    tr.n_match += ext.n_match;
                    r_end += ext.len;
                    g_end += ext.len as u64;
                    if let Some(last) = tr.exons.last_mut() {
                        last.len += ext.len;
                    }
                }
            }
        }

        let first = tr.exons[0];
        let last = *tr.last_exon();
        if !self.within_reference(&tr, l_read) {
            return;
        }

        tr.r_length = tr.exons.iter().map(|e| e.len).sum();
        tr.g_length = g_end + 1 - tr.g_start;

        if !self.overhangs_ok(&tr)
            || !self.junction_strands_ok(&mut tr)
            || !self.intron_motifs_ok(&tr)
            || !self.spliced_mates_long_enough(&tr, read)
        {
            return;
        }

        if let Some(approved) = self.approved {
            if tr.novel_junctions().any(|(s, e, _)| !approved.contains(&(s, e))) {
                return;
            }
        }

        if first.frag != last.frag && !self.mates_consistent(&tr, l_read) {
            return;
        }

        score += self.scorer.genomic_length(last.g + last.len as u64 - first.g);
        score = score.max(0);

        tr.ro_start = if tr.str == 0 {
            tr.r_start
        } else {
            l_read - tr.r_start - tr.r_length
        };
        tr.score = score;
        tr.frag = (first.frag == last.frag).then_some(first.frag);
        if let Some(f) = tr.frag {
            mate_best[f] = mate_best[f].max(score);
        }

        if worth_recording(p, &tr, &ws.found, mate_best) {
            record(&mut ws.found, tr, p.align_transcripts_per_window_nmax);
        }
    }

    /// With `alignSoftClipAtReferenceEnds No`, the unaligned read ends must
    /// still fall inside the chromosome.
    fn within_reference(&self, tr: &Transcript, l_read: usize) -> bool {
        if self.params.soft_clip_at_reference_ends() {
            return true;
        }
        let genome = &self.index.genome;
        let (first, last) = (tr.exons[0], *tr.last_exon());
        let chr_start = genome.chr_start[tr.chr];
        let chr_end = chr_start + genome.chr_length[tr.chr];
        last.g + (l_read - last.r) as u64 <= chr_end && first.g >= chr_start + first.r as u64
    }

    /// Set the junction strand counts of `tr`; false if its junctions
    /// disagree on strand, or (with `outSAMstrandField intronMotif`) give it
    /// no strand at all.
    fn junction_strands_ok(&self, tr: &mut Transcript) -> bool {
        let p = self.params;
        let mut n_sj = 0;
        tr.intron_motifs = [0; 3];
        for gap in tr.gaps.iter().filter(|g| g.is_junction()) {
            n_sj += 1;
            tr.intron_motifs[gap.sj_str as usize] += 1;
        }
        tr.sj_motif_strand = match (tr.intron_motifs[1] > 0, tr.intron_motifs[2] > 0) {
            (true, false) => 1,
            (false, true) => 2,
            _ => 0,
        };
        if tr.intron_motifs[1] > 0
            && tr.intron_motifs[2] > 0
            && p.out_filter_intron_strands == IntronStrandFilter::RemoveInconsistentStrands
        {
            return false;
        }
        !(n_sj > 0 && tr.sj_motif_strand == 0 && p.out_sam_strand_field == StrandField::IntronMotif)
    }

    /// `outFilterIntronMotifs`
    fn intron_motifs_ok(&self, tr: &Transcript) -> bool {
        let non_canonical = |annotated_ok: bool| {
            tr.gaps.iter().any(|g| {
                matches!(g.kind, GapKind::Splice(m) if m.code() == 0) && !(annotated_ok && g.annotated)
            })
        };
        match self.params.out_filter_intron_motifs {
            IntronMotifFilter::None => true,
            IntronMotifFilter::RemoveNoncanonical => !non_canonical(false),
            IntronMotifFilter::RemoveNoncanonicalUnannotated => !non_canonical(true),
        }
    }

    /// Minimum exon lengths next to junctions.
    fn overhangs_ok(&self, tr: &Transcript) -> bool {
        let p = self.params;
        let sjdb_min = p.align_sjdb_overhang_min as usize;
        let sj_min = p.align_sj_overhang_min as usize;
        let n = tr.exons.len();
        // an annotated junction only needs the longer overhang at the alignment
        // ends, at mate ends, or next to a novel junction
        let needs_check = |ig: Option<usize>| match ig.and_then(|i| tr.gaps.get(i)) {
            None => true,
            Some(g) => g.kind == GapKind::MateGap || g.is_novel_junction(),
        };
        for (isj, gap) in tr.gaps.iter().enumerate() {
            if !gap.is_junction() {
                continue;
            }
            let (left, right) = (tr.exons[isj].len, tr.exons[isj + 1].len);
            if gap.annotated {
                let prev = isj.checked_sub(1);
                let next = (isj + 1 < n - 1).then_some(isj + 1);
                if (left < sjdb_min && needs_check(prev)) || (right < sjdb_min && needs_check(next)) {
                    return false;
                }
            } else if left < sj_min + gap.shift[0] || right < sj_min + gap.shift[1] {
                return false;
            }
        }
        if n > 1 && tr.gaps[n - 2].annotated && tr.exons[n - 1].len < sjdb_min {
            return false;
        }
        true
    }

    /// Each spliced mate must map at least the configured length.
    fn spliced_mates_long_enough(&self, tr: &Transcript, read: &ReadSeqs) -> bool {
        let p = self.params;
        let (mut n_sj, mut mapped) = (0, 0usize);
        for (iex, exon) in tr.exons.iter().enumerate() {
            mapped += exon.len;
            let gap = tr.gaps.get(iex);
            if gap.map_or(true, |g| g.kind == GapKind::MateGap) {
                let mate_min =
                    (p.align_spliced_mate_map_lmin_over_lmate * read.mate_len(exon.frag) as f64) as usize;
                if n_sj > 0 && (mapped < p.align_spliced_mate_map_lmin as usize || mapped < mate_min) {
                    return false;
                }
                mapped = 0;
                n_sj = 0;
            } else if gap.is_some_and(|g| g.is_junction()) {
                n_sj += 1;
            }
        }
        true
    }

    /// Mate order and junction agreement where mates overlap.
    fn mates_consistent(&self, tr: &Transcript, l_read: usize) -> bool {
        let ex = &tr.exons;
        let n = ex.len();
        let (first, last) = (ex[0], ex[n - 1]);
        if last.g + last.len as u64 <= first.g {
            return false;
        }
        let Some(m2) = tr.gaps.iter().position(|g| g.kind == GapKind::MateGap).map(|i| i + 1) else {
            return true;
        };
        if ex[m2 - 1].g_end() < ex[m2].g {
            return true;
        }
        let protrude = self.params.align_ends_protrude;
        if first.g > ex[m2].g + first.r as u64 + protrude {
            return false;
        }
        if ex[m2 - 1].g + ex[m2 - 1].len as u64 > last.g + (l_read - last.r) as u64 + protrude {
            return false;
        }

        let junction = |i: usize| tr.gaps[i - 1].is_junction();
        let mut i1 = 1;
        let mut i2 = m2 + 1;
        while i1 < m2 {
            if ex[i1].g >= ex[i2 - 1].g + ex[i2 - 1].len as u64 {
                break;
            }
            i1 += 1;
        }
        while i1 < m2 && i2 < n {
            if !junction(i1) {
                i1 += 1;
                continue;
            }
            if !junction(i2) {
                i2 += 1;
                continue;
            }
            if ex[i1].g != ex[i2].g || ex[i1 - 1].g_end() != ex[i2 - 1].g_end() {
                return false;
            }
            i1 += 1;
            i2 += 1;
        }
        true
    }
}

/// Mismatch cap for the whole read.
pub fn mismatch_max_total(params: &Parameters, read: &ReadSeqs) -> u32 {
    let by_len = (params.out_filter_mismatch_nover_read_lmax * read.bases() as f64) as u32;
    params.out_filter_mismatch_nmax.min(by_len)
}

/// A candidate is kept if it is within `outFilterMultimapScoreRange` of the
/// window's best or of its mate's best, or if chimeric detection may still
/// pair it.
fn worth_recording(p: &Parameters, tr: &Transcript, found: &[Transcript], mate_best: &[i32; 2]) -> bool {
    let range = p.out_filter_multimap_score_range;
    let window_best = found.first().map_or(0, |t| t.score);
    tr.score + range >= window_best
        || tr.frag.is_some_and(|f| tr.score + range >= mate_best[f])
        || p.chimeric_enabled()
}

/// Insert `tr` into the window's list unless an existing transcript covers
/// it; drop existing transcripts it covers. The list stays ordered by score
/// (ties: shorter genomic span first) and holds at most `cap` entries.
fn record(found: &mut Vec<Transcript>, tr: Transcript, cap: usize) {
    let mut i = 0;
    while i < found.len() {
        let overlap = blocks_overlap(&tr, &found[i]) as usize;
        let u_new = tr.r_length.saturating_sub(overlap);
        let u_old = found[i].r_length.saturating_sub(overlap);
        if u_new == 0 && tr.score < found[i].score {
            return;
        } else if u_old == 0 {
            found.remove(i);
        } else {
            i += 1;
        }
    }
    let at = found
        .iter()
        .position(|t| tr.score > t.score || (tr.score == t.score && tr.g_length < t.g_length))
        .unwrap_or(found.len());
    found.insert(at, tr);
    found.truncate(cap.max(1));
}

/// Best transcript over all windows: highest score, then shorter span.
pub fn best_transcript<'t>(windows: &'t [Vec<Transcript>]) -> Option<&'t Transcript> {
    let mut best: Option<&Transcript> = None;
    for t in windows.iter().filter_map(|w| w.first()) {
        match best {
            Some(b) if !(t.score > b.score || (t.score == b.score && t.g_length < b.g_length)) => {}
            _ => best = Some(t),
        }
    }
    best
}
