//! Read classification and multimapper selection.
use std::fmt;

use crate::align::read::ReadSeqs;
use crate::align::stitcher::{best_transcript, mismatch_max_total};
use crate::align::transcript::Transcript;
use crate::params::Parameters;

/// Why a read was left unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmappedReason {
    NoWindow,
    TooShort,
    TooManyMismatches,
    TooManyLoci,
}

impl UnmappedReason {
    pub const ALL: [UnmappedReason; 4] = [
        Self::NoWindow,
        Self::TooShort,
        Self::TooManyMismatches,
        Self::TooManyLoci,
    ];
}

impl fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoWindow => "other",
            Self::TooShort => "too short",
            Self::TooManyMismatches => "too many mismatches",
            Self::TooManyLoci => "too many loci",
        };
        f.write_str(s)
    }
}

/// Final classification of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadClass {
    Unique,
    /// Mapped to this many loci.
    Multi(usize),
    Unmapped(UnmappedReason),
}

impl ReadClass {
    pub fn is_mapped(&self) -> bool {
        !matches!(self, Self::Unmapped(_))
    }
}

/// Capacity limit hit while aligning a read. The read is still classified;
/// its result may be incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMarker {
    TooManyWindows,
    TooManyAnchorsPerWindow,
    TooManySeeds,
    /// Every seed mapped to more loci than `seedMultimapNmax`.
    Repeat,
    TooManyTranscripts,
    /// Stitching of a window stopped at the call limit.
    TooManyStitchCalls,
}

impl fmt::Display for ReadMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TooManyWindows => "too many windows",
            Self::TooManyAnchorsPerWindow => "too many anchors per window",
            Self::TooManySeeds => "too many seeds",
            Self::Repeat => "repeat",
            Self::TooManyTranscripts => "too many transcripts",
            Self::TooManyStitchCalls => "too many stitch calls",
        };
        f.write_str(s)
    }
}

/// Outcome of selection for one read.
#[derive(Debug, Clone)]
pub struct Selection {
    pub class: ReadClass,
    /// Accepted alignments, primary first. Empty when unmapped.
    pub transcripts: Vec<Transcript>,
    /// Mate left unaligned by the primary alignment of a paired read.
    pub mate_unmapped: Option<usize>,
    /// Score of the best transcript before filtering (0 without windows).
    pub best_score: i32,
}

pub struct Selector<'a> {
    params: &'a Parameters,
}

impl<'a> Selector<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        Self { params }
    }

    /// Classify a read from its per-window transcripts.
    pub fn select(&self, read: &ReadSeqs, windows: &[Vec<Transcript>]) -> Selection {
        let p = self.params;
        let unmapped = |reason, best_score| Selection {
            class: ReadClass::Unmapped(reason),
            transcripts: Vec::new(),
            mate_unmapped: None,
            best_score,
        };

        let best = match best_transcript(windows) {
            Some(b) if b.score > 0 => b,
            _ => return unmapped(UnmappedReason::NoWindow, 0),
        };

        let mut multi: Vec<&Transcript> = windows
            .iter()
            .flatten()
            .filter(|t| t.score + p.out_filter_multimap_score_range >= best.score)
            .collect();
        multi.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.g_length.cmp(&b.g_length))
                .then(a.window.cmp(&b.window))
        });

        // read length as used by the relative thresholds
        let l_read = read.len().saturating_sub(1) as f64;
        let class = if best.score < p.out_filter_score_min
            || best.score < (p.out_filter_score_min_over_lread * l_read) as i32
            || best.n_match < p.out_filter_match_nmin
            || best.n_match < (p.out_filter_match_nmin_over_lread * l_read) as u32
        {
            ReadClass::Unmapped(UnmappedReason::TooShort)
        } else if best.n_mm > mismatch_max_total(p, read)
            || best.n_mm as f64 / best.r_length as f64 > p.out_filter_mismatch_nover_lmax
        {
            ReadClass::Unmapped(UnmappedReason::TooManyMismatches)
        } else if multi.len() > p.out_filter_multimap_nmax {
            ReadClass::Unmapped(UnmappedReason::TooManyLoci)
        } else if multi.len() == 1 {
            ReadClass::Unique
        } else {
            ReadClass::Multi(multi.len())
        };

        if let ReadClass::Unmapped(reason) = class {
            return unmapped(reason, best.score);
        }

        // the best transcript leads even when another ties with it
        if let Some(pos) = multi.iter().position(|t| std::ptr::eq(*t, best)) {
            multi[..=pos].rotate_right(1);
        }
        let mate_unmapped = match (read.n_mates(), best.frag) {
            (2, Some(f)) => Some(1 - f),
            _ => None,
        };
        Selection {
            class,
            transcripts: multi.into_iter().cloned().collect(),
            mate_unmapped,
            best_score: best.score,
        }
    }
}
