/// Read alignment driver: seeds, windows, stitching, selection and chimeric
/// detection for one read at a time.
use log::debug;

use crate::align::read::ReadSeqs;
use crate::align::score::{AlignmentScorer, ScoringPolicy};
use crate::align::seed::{Seed, SeedSearcher, SeedSet};
use crate::align::select::{ReadClass, ReadMarker, Selector, UnmappedReason};
use crate::align::stitcher::{JunctionSet, Stitcher, MAX_STITCH_CALLS};
use crate::align::transcript::Transcript;
use crate::align::window::{WindowBuilder, WindowOverflow};
use crate::chimeric::{ChimericAlignment, ChimericDetector};
use crate::index::GenomeIndex;
use crate::params::Parameters;

/// Everything reported for one read.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub name: String,
    pub class: ReadClass,
    /// Accepted alignments, primary first.
    pub transcripts: Vec<Transcript>,
    /// CIGAR-like block string for each entry of `transcripts`.
    pub cigars: Vec<String>,
    /// Mate left unaligned by the primary alignment of a pair.
    pub mate_unmapped: Option<usize>,
    /// First capacity limit hit while aligning, if any.
    pub marker: Option<ReadMarker>,
    pub chimeric: Vec<ChimericAlignment>,
    /// Block strings of the two segments of each chimeric alignment.
    pub chimeric_cigars: Vec<(String, String)>,
}

impl ReadResult {
    fn new(name: &str, class: ReadClass) -> Self {
        Self {
            name: name.to_string(),
            class,
            transcripts: Vec::new(),
            cigars: Vec::new(),
            mate_unmapped: None,
            marker: None,
            chimeric: Vec::new(),
            chimeric_cigars: Vec::new(),
        }
    }

    /// Whether any alignment contains an unannotated junction.
    pub fn has_novel_junctions(&self) -> bool {
        self.transcripts
            .iter()
            .any(|t| t.novel_junctions().next().is_some())
    }
}

/// Per-worker aligner. Owns all scratch space so that buffers are reused
/// from one read to the next; the index and parameters are shared.
pub struct ReadAligner<'a, S: ScoringPolicy = AlignmentScorer> {
    index: &'a GenomeIndex,
    params: &'a Parameters,
    scorer: S,
    approved: Option<&'a JunctionSet>,
    seeds: SeedSet,
    loci: Vec<Seed>,
    windows: WindowBuilder,
    read: ReadSeqs,
    stitch_call_limit: u32,
}

impl<'a> ReadAligner<'a> {
    pub fn new(index: &'a GenomeIndex, params: &'a Parameters) -> Self {
        Self::with_scorer(index, params, AlignmentScorer::from_params(params))
    }
}

impl<'a, S: ScoringPolicy> ReadAligner<'a, S> {
    /// Aligner using a custom scoring policy.
    pub fn with_scorer(index: &'a GenomeIndex, params: &'a Parameters, scorer: S) -> Self {
        Self {
            index,
            params,
            scorer,
            approved: None,
            seeds: SeedSet::default(),
            loci: Vec::new(),
            windows: WindowBuilder::new(&index.genome, params),
            read: ReadSeqs::default(),
            stitch_call_limit: MAX_STITCH_CALLS,
        }
    }

    /// Re-mapping mode of the two-stage junction filter: novel junctions
    /// outside `set` are rejected and chimeric detection is off.
    pub fn with_approved_junctions(mut self, set: &'a JunctionSet) -> Self {
        self.approved = Some(set);
        self
    }

    #[cfg(test)]
    fn with_stitch_call_limit(mut self, limit: u32) -> Self {
        self.stitch_call_limit = limit;
        self
    }

    /// Align one read given as one or two mates of ASCII bases.
    pub fn align(&mut self, name: &str, mates: &[&[u8]]) -> ReadResult {
        let p = self.params;
        self.read.fill(name, mates);
        let mut marker = None;

        let searcher = SeedSearcher::new(self.index, p);
        searcher.find_seeds(&self.read, &mut self.seeds);
        if self.seeds.too_many {
            marker = Some(ReadMarker::TooManySeeds);
        }
        if self.seeds.matches.is_empty() {
            let mut result = ReadResult::new(name, ReadClass::Unmapped(UnmappedReason::NoWindow));
            if self.seeds.repeat_min.is_some() {
                result.marker = Some(ReadMarker::Repeat);
            }
            return result;
        }

        self.loci.clear();
        let l_read = self.read.len();
        for m in &self.seeds.matches {
            searcher.for_each_locus(m, l_read, |s| self.loci.push(s));
        }

        if let Err(overflow) = self.windows.build(&self.index.genome, &self.loci) {
            let m = match overflow {
                WindowOverflow::TooManyWindows => ReadMarker::TooManyWindows,
                WindowOverflow::TooManyAnchors => ReadMarker::TooManyAnchorsPerWindow,
            };
            debug!("{name}: {m}");
            let mut result = ReadResult::new(name, ReadClass::Unmapped(UnmappedReason::NoWindow));
            result.marker = Some(m);
            return result;
        }

        let mut stitcher =
            Stitcher::new(self.index, p, &self.scorer).with_call_limit(self.stitch_call_limit);
        if let Some(set) = self.approved {
            stitcher = stitcher.with_approved_junctions(set);
        }
        let mut mate_best = [0; 2];
        let mut per_window: Vec<Vec<Transcript>> = Vec::new();
        let mut n_total = 0;
        for (iw, window) in self.windows.live() {
            if n_total + p.align_transcripts_per_window_nmax >= p.align_transcripts_per_read_nmax {
                debug!("{name}: {}", ReadMarker::TooManyTranscripts);
                marker.get_or_insert(ReadMarker::TooManyTranscripts);
                break;
            }
            let stitched = stitcher.stitch_window(&self.read, iw, window, &mut mate_best);
            if stitched.truncated {
                marker.get_or_insert(ReadMarker::TooManyStitchCalls);
            }
            n_total += stitched.transcripts.len();
            per_window.push(stitched.transcripts);
        }

        let selection = Selector::new(p).select(&self.read, &per_window);
        let chimeric = if self.approved.is_none() {
            ChimericDetector::new(self.index, p).detect(
                &self.read,
                &per_window,
                selection.best_score,
            )
        } else {
            Vec::new()
        };

        let cigars = selection
            .transcripts
            .iter()
            .map(|t| t.cigar_string(&self.read))
            .collect();
        let chimeric_cigars = chimeric
            .iter()
            .map(|c| {
                (
                    c.seg1.align.cigar_string(&self.read),
                    c.seg2.align.cigar_string(&self.read),
                )
            })
            .collect();
        ReadResult {
            name: name.to_string(),
            class: selection.class,
            transcripts: selection.transcripts,
            cigars,
            mate_unmapped: selection.mate_unmapped,
            marker,
            chimeric,
            chimeric_cigars,
        }
    }
}
