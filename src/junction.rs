/// Novel splice junction counting for the two-stage `BySJout` filter
use std::collections::HashMap;

use crate::align::score::SpliceMotif;
use crate::align::select::ReadClass;
use crate::align::stitcher::JunctionSet;
use crate::align::transcript::{GapKind, Transcript};
use crate::params::Parameters;

/// Support for one novel junction
#[derive(Debug, Clone, Copy, Default)]
struct SjCounts {
    unique: u32,
    multi: u32,
    /// Largest shorter-flank length over supporting reads.
    overhang: usize,
    motif: u8,
}

/// Novel junctions seen in stage 1, keyed by forward-genome intron bounds.
#[derive(Debug, Default)]
pub struct NovelJunctionCounter {
    junctions: HashMap<(u64, u64), SjCounts>,
}

impl NovelJunctionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the novel junctions of every accepted alignment of a read.
    ///
    /// A junction repeated across the alignments of one read counts once.
    pub fn record(&mut self, class: ReadClass, transcripts: &[Transcript]) {
        let unique = class == ReadClass::Unique;
        let mut seen: Vec<(u64, u64)> = Vec::new();
        for t in transcripts {
            for (i, gap) in t.gaps.iter().enumerate() {
                let GapKind::Splice(motif) = gap.kind else {
                    continue;
                };
                if gap.annotated {
                    continue;
                }
                let (a, b) = (&t.exons[i], &t.exons[i + 1]);
                let key = (a.g + a.len as u64, b.g - 1);
                let c = self.junctions.entry(key).or_default();
                c.motif = motif.code();
                c.overhang = c.overhang.max(a.len.min(b.len));
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                if unique {
                    c.unique += 1;
                } else {
                    c.multi += 1;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.junctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.junctions.is_empty()
    }

    /// Junctions passing the per-motif-class read count and overhang limits.
    pub fn approved(&self, params: &Parameters) -> JunctionSet {
        let limit = |v: &[u32], class: usize| v.get(class).copied().unwrap_or(u32::MAX);
        self.junctions
            .iter()
            .filter(|(_, c)| {
                let class = SpliceMotif::from_code(c.motif).filter_category();
                let enough_reads = c.unique >= limit(&params.out_sj_filter_count_unique_min, class)
                    || c.unique + c.multi >= limit(&params.out_sj_filter_count_total_min, class);
                enough_reads
                    && c.overhang as u64 >= limit(&params.out_sj_filter_overhang_min, class) as u64
            })
            .map(|(&key, _)| key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::transcript::{Exon, Gap};
    use clap::Parser;

    fn spliced(start: u64, motif: SpliceMotif) -> Transcript {
        spliced_with_flanks(start, motif, 50, 50)
    }

    fn spliced_with_flanks(start: u64, motif: SpliceMotif, left: usize, right: usize) -> Transcript {
        let exons = vec![
            Exon { r: 0, g: start - left as u64, len: left, frag: 0, sj: None },
            Exon { r: left, g: start + 500, len: right, frag: 0, sj: None },
        ];
        Transcript {
            exons,
            gaps: vec![Gap::new(GapKind::Splice(motif))],
            ..Default::default()
        }
    }

    fn params(extra: &[&str]) -> Parameters {
        let mut args = vec!["rustar", "--readFilesIn", "r.fq"];
        args.extend_from_slice(extra);
        Parameters::parse_from(args)
    }

    #[test]
    fn unique_support_per_motif_class() {
        let p = params(&[]);
        let mut counter = NovelJunctionCounter::new();
        let gtag = spliced(1000, SpliceMotif::GtAg);
        let noncanon = spliced(5000, SpliceMotif::NonCanonical);
        counter.record(ReadClass::Unique, &[gtag.clone()]);
        counter.record(ReadClass::Unique, &[noncanon.clone()]);
        counter.record(ReadClass::Unique, &[noncanon.clone()]);
        assert_eq!(counter.len(), 2);

        // defaults: 3 reads for non-canonical, 1 for GT/AG
        let approved = counter.approved(&p);
        assert!(approved.contains(&(1000, 1499)));
        assert!(!approved.contains(&(5000, 5499)));

        counter.record(ReadClass::Unique, &[noncanon]);
        assert!(counter.approved(&p).contains(&(5000, 5499)));
    }

    #[test]
    fn multimappers_count_toward_total() {
        let p = params(&[
            "--outSJfilterCountUniqueMin", "3", "2", "2", "2",
            "--outSJfilterCountTotalMin", "3", "2", "2", "2",
        ]);
        let mut counter = NovelJunctionCounter::new();
        let t = spliced(1000, SpliceMotif::GtAg);
        counter.record(ReadClass::Multi(2), &[t.clone(), t.clone()]);
        assert_eq!(counter.len(), 1);
        assert!(counter.approved(&p).is_empty());

        counter.record(ReadClass::Multi(2), &[t.clone(), t]);
        assert!(counter.approved(&p).contains(&(1000, 1499)));
    }

    #[test]
    fn short_overhang_is_not_approved() {
        let p = params(&[]);
        let mut counter = NovelJunctionCounter::new();
        // GT/AG needs an overhang of 12 by default
        counter.record(ReadClass::Unique, &[spliced_with_flanks(1000, SpliceMotif::GtAg, 90, 10)]);
        counter.record(ReadClass::Unique, &[spliced_with_flanks(1000, SpliceMotif::GtAg, 89, 11)]);
        assert!(counter.approved(&p).is_empty());

        counter.record(ReadClass::Unique, &[spliced_with_flanks(1000, SpliceMotif::GtAg, 88, 12)]);
        assert!(counter.approved(&p).contains(&(1000, 1499)));
    }
}
