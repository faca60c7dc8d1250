//! Maximal mappable prefix search.
//!
//! Every N-free piece of the read is searched from several start points in
//! both directions. Each search walks the suffix array for the longest
//! exact match, records the whole SA range of suffixes sharing it, and
//! continues from the first unmatched base.

use crate::align::read::ReadSeqs;
use crate::index::sa_index::prefix_code;
use crate::index::GenomeIndex;
use crate::params::Parameters;

/// One exact match of a read segment: `n_rep` suffixes in SA ranks
/// `sa_lo..=sa_hi` share `length` bases with the read at `r_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaMatch {
    /// Start in the forward read.
    pub r_start: usize,
    pub length: usize,
    /// Found while searching the reverse complement of the read.
    pub reverse_search: bool,
    pub sa_lo: usize,
    pub sa_hi: usize,
    pub n_rep: u64,
    pub frag: usize,
}

/// One genomic placement of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    /// Start in the read oriented for `str`.
    pub r_start: usize,
    /// Forward-genome start.
    pub g_start: u64,
    pub length: usize,
    /// 0 when the read aligns to the forward strand, 1 for reverse.
    pub str: u8,
    pub n_rep: u64,
    /// Allowed to create windows.
    pub anchor: bool,
    pub frag: usize,
    /// Annotated junction this piece was split at.
    pub sj: Option<usize>,
}

/// Matches found for one read.
#[derive(Debug, Default)]
pub struct SeedSet {
    /// Sorted by (read start, length), no duplicates.
    pub matches: Vec<SaMatch>,
    /// `seedPerReadNmax` was reached and later matches were dropped.
    pub too_many: bool,
    /// Smallest multiplicity among matches discarded as repeats.
    pub repeat_min: Option<u64>,
}

impl SeedSet {
    pub fn clear(&mut self) {
        self.matches.clear();
        self.too_many = false;
        self.repeat_min = None;
    }
}

/// Seed searcher bound to an index and a parameter set.
pub struct SeedSearcher<'a> {
    index: &'a GenomeIndex,
    params: &'a Parameters,
}

/// Result of one maximal-mappable-length query.
#[derive(Debug, Clone, Copy)]
struct Mmp {
    length: usize,
    lo: usize,
    hi: usize,
}

impl<'a> SeedSearcher<'a> {
    pub fn new(index: &'a GenomeIndex, params: &'a Parameters) -> Self {
        Self { index, params }
    }

    /// Search all pieces of `read` and store the matches in `out`.
    pub fn find_seeds(&self, read: &ReadSeqs, out: &mut SeedSet) {
        out.clear();
        let fwd = read.forward();
        let mut start = 0;
        while start < fwd.len() {
            if fwd[start] > 3 {
                start += 1;
                continue;
            }
            let mut end = start;
            while end < fwd.len() && fwd[end] < 4 {
                end += 1;
            }
            if end - start >= self.params.seed_split_min {
                let frag = read.frag_at(0, start);
                self.search_piece(read, start, end - start, frag, out);
            }
            start = end;
        }
    }

    fn search_piece(
        &self,
        read: &ReadSeqs,
        p_start: usize,
        p_len: usize,
        frag: usize,
        out: &mut SeedSet,
    ) {
        let start_lmax = self.params.seed_search_start_lmax;
        let n_start = if p_len > start_lmax {
            p_len / start_lmax + 1
        } else {
            1
        };
        let l_start = p_len / n_start;
        let mut full_forward = false;

        for reverse_search in [false, true] {
            for istart in 0..n_start {
                if reverse_search && istart == 0 && full_forward {
                    continue;
                }
                let mut l_mapped = 0;
                while istart * l_start + l_mapped + self.params.seed_map_min < p_len {
                    let shift = istart * l_start + l_mapped;
                    let (seq, pos) = if reverse_search {
                        (read.reverse(), read.len() - (p_start + p_len) + shift)
                    } else {
                        (read.forward(), p_start + shift)
                    };
                    let remaining = p_len - shift;
                    let seed_len = match self.params.seed_search_lmax {
                        0 => remaining,
                        lmax => remaining.min(lmax),
                    };
                    let l = self.search_from(seq, pos, seed_len, reverse_search, read.len(), frag, out);
                    if !reverse_search && istart == 0 && l_mapped == 0 && l == p_len {
                        full_forward = true;
                    }
                    l_mapped += l.max(1);
                }
            }
        }
    }

    /// Best match over the sparse-SA offsets starting at `seq[pos]`; every
    /// offset reaching the best end is stored. Returns the matched span.
    #[allow(clippy::too_many_arguments)]
    fn search_from(
        &self,
        seq: &[u8],
        pos: usize,
        len: usize,
        reverse_search: bool,
        l_read: usize,
        frag: usize,
        out: &mut SeedSet,
    ) -> usize {
        let n_dist = len.min(self.index.header.sa_sparse_d as usize);
        let found: Vec<Option<Mmp>> = (0..n_dist)
            .map(|i_dist| self.max_mappable(&seq[pos + i_dist..pos + len]))
            .collect();
        let best = found
            .iter()
            .enumerate()
            .filter_map(|(i_dist, m)| m.map(|m| m.length + i_dist))
            .max()
            .unwrap_or(0);

        for (i_dist, m) in found.iter().enumerate() {
            let Some(m) = m else { continue };
            if m.length == 0 || m.length + i_dist != best {
                continue;
            }
            let start = pos + i_dist;
            let r_start = if reverse_search {
                l_read - (start + m.length)
            } else {
                start
            };
            self.store(
                SaMatch {
                    r_start,
                    length: m.length,
                    reverse_search,
                    sa_lo: m.lo,
                    sa_hi: m.hi,
                    n_rep: (m.hi - m.lo + 1) as u64,
                    frag,
                },
                out,
            );
        }
        best
    }

    fn store(&self, m: SaMatch, out: &mut SeedSet) {
        if m.n_rep > self.params.seed_multimap_nmax {
            out.repeat_min = Some(out.repeat_min.map_or(m.n_rep, |r| r.min(m.n_rep)));
            return;
        }
        let key = (m.r_start, m.length);
        let at = out.matches.partition_point(|p| (p.r_start, p.length) < key);
        if out
            .matches
            .get(at)
            .is_some_and(|p| (p.r_start, p.length) == key)
        {
            return;
        }
        if out.matches.len() >= self.params.seed_per_read_nmax {
            out.too_many = true;
            return;
        }
        out.matches.insert(at, m);
    }

    /// Longest prefix of `query` present in the genome, with the SA range of
    /// all suffixes sharing it.
    fn max_mappable(&self, query: &[u8]) -> Option<Mmp> {
        let sai = &self.index.sa_index;
        let l_max = (sai.nbases as usize).min(query.len());
        if l_max == 0 {
            return None;
        }
        let mut prefix = query[..l_max]
            .iter()
            .fold(0u64, |acc, &b| (acc << 2) | b as u64);

        let mut l_ind = l_max;
        let entry = loop {
            let e = sai.lookup(l_ind as u32, prefix);
            if !e.absent {
                break e;
            }
            l_ind -= 1;
            prefix >>= 2;
            if l_ind == 0 {
                return None;
            }
        };

        let lo = entry.rank as usize;
        let hi = self.block_end(l_ind, prefix, lo);

        if l_ind < l_max || l_ind == query.len() {
            // the next longer prefix is absent, or the query is exhausted
            return Some(Mmp { length: l_ind, lo, hi });
        }
        if lo == hi {
            let (length, _) = self.compare_seq_to_genome(query, lo, l_ind);
            return Some(Mmp { length, lo, hi });
        }
        Some(self.max_mappable_length(query, lo, hi, l_ind))
    }

    /// Last SA rank of the block of `len`-mer `prefix` starting at `lo`.
    fn block_end(&self, len: usize, prefix: u64, lo: usize) -> usize {
        let sai = &self.index.sa_index;
        let n_sa = self.index.suffix_array.len();
        let last_code = (1u64 << (2 * len)) - 1;
        let (next, gap) = if prefix < last_code {
            let e = sai.lookup(len as u32, prefix + 1);
            (e.rank as usize, e.gap)
        } else {
            (n_sa, true)
        };
        if !gap {
            return next - 1;
        }
        // suffixes interrupted by N or padding sort after the block
        let genome = &self.index.genome;
        let sa = &self.index.suffix_array;
        let (mut a, mut b) = (lo + 1, next);
        while a < b {
            let mid = a + (b - a) / 2;
            if prefix_code(genome, sa.doubled_pos(mid), len as u32) == Some(prefix) {
                a = mid + 1;
            } else {
                b = mid;
            }
        }
        a - 1
    }

    /// Compare `query` to the suffix at `rank` from offset `l_start`.
    /// Returns (match length, query sorts after the suffix).
    fn compare_seq_to_genome(&self, query: &[u8], rank: usize, l_start: usize) -> (usize, bool) {
        let g = self.index.suffix_array.doubled_pos(rank);
        for i in l_start..query.len() {
            let gb = self.index.genome.base(g + i as u64);
            let rb = query[i];
            if rb != gb {
                return (i, rb > gb);
            }
        }
        (query.len(), false)
    }

    /// Binary search inside `lo..=hi` (all sharing `l_init` bases) for the
    /// longest match, then narrow to the ranks that reach it.
    fn max_mappable_length(&self, query: &[u8], lo: usize, hi: usize, l_init: usize) -> Mmp {
        let remaining = query.len();
        let mut i1 = lo;
        let mut i2 = hi;
        let (mut l1, _) = self.compare_seq_to_genome(query, i1, l_init);
        let (mut l2, _) = self.compare_seq_to_genome(query, i2, l_init);

        let mut l = l1.min(l2);
        let mut l3 = l;
        let mut i3 = i1;

        let (mut i1a, mut l1a) = (i1, l1);
        let (mut i1b, mut l1b) = (i1, l1);
        let (mut i2a, mut l2a) = (i2, l2);
        let (mut i2b, mut l2b) = (i2, l2);

        while i1 + 1 < i2 {
            i3 = median_uint2(i1, i2);
            let after;
            (l3, after) = self.compare_seq_to_genome(query, i3, l);
            if l3 == remaining {
                break;
            }
            if after {
                (i1a, l1a) = (i1b, l1b);
                (i1b, l1b) = (i1, l1);
                (i1, l1) = (i3, l3);
            } else {
                (i2a, l2a) = (i2b, l2b);
                (i2b, l2b) = (i2, l2);
                (i2, l2) = (i3, l3);
            }
            l = l1.min(l2);
        }

        if l3 < remaining {
            if l1 > l2 {
                (l3, i3) = (l1, i1);
            } else {
                (l3, i3) = (l2, i2);
            }
        }

        let lo = self.find_mult_range(query, i3, l3, i1, l1, (i1a, l1a), (i1b, l1b));
        let hi = self.find_mult_range(query, i3, l3, i2, l2, (i2a, l2a), (i2b, l2b));
        Mmp { length: l3, lo, hi }
    }

    /// Boundary between ranks matching at least `l3` bases (around `i3`)
    /// and the shorter match at `i1`.
    #[allow(clippy::too_many_arguments)]
    fn find_mult_range(
        &self,
        query: &[u8],
        mut i3: usize,
        l3: usize,
        mut i1: usize,
        l1: usize,
        (i1a, l1a): (usize, usize),
        (i1b, l1b): (usize, usize),
    ) -> usize {
        if l1 >= l3 {
            return i1;
        }
        if l1b >= l3 {
            i3 = i1b;
        } else if l1a >= l3 {
            i3 = i1a;
        }
        let mut l_start = l1;
        while i3 + 1 < i1 || i1 + 1 < i3 {
            let i4 = median_uint2(i3, i1);
            let (l4, _) = self.compare_seq_to_genome(query, i4, l_start);
            if l4 >= l3 {
                i3 = i4;
            } else {
                i1 = i4;
                l_start = l4.min(l_start);
            }
        }
        i3
    }

    /// Expand a match into its genomic placements. Placements inside the
    /// junction insert are split into donor and acceptor pieces.
    pub fn for_each_locus(&self, m: &SaMatch, l_read: usize, mut f: impl FnMut(Seed)) {
        let n = self.index.n_genome();
        let sjdb = &self.index.sjdb;
        let anchor = m.n_rep <= self.params.win_anchor_multimap_nmax;
        let len = m.length as u64;

        for rank in m.sa_lo..=m.sa_hi {
            let (a1, reverse) = self.index.suffix_array.strand_pos(rank);
            let (str, r_start, g_start) = match (m.reverse_search, reverse) {
                (false, false) => (0, m.r_start, a1),
                (false, true) => (1, l_read - (m.length + m.r_start), n - (len + a1)),
                (true, false) => (1, l_read - (m.length + m.r_start), a1),
                (true, true) => (0, m.r_start, n - (len + a1)),
            };
            let seed = Seed {
                r_start,
                g_start,
                length: m.length,
                str,
                n_rep: m.n_rep,
                anchor,
                frag: m.frag,
                sj: None,
            };
            if g_start >= sjdb.g_start && !sjdb.is_empty() {
                if let Some(split) = sjdb.split_align(g_start, len) {
                    f(Seed {
                        g_start: split.donor_g,
                        length: split.donor_len as usize,
                        sj: Some(split.isj),
                        ..seed
                    });
                    f(Seed {
                        r_start: r_start + split.donor_len as usize,
                        g_start: split.acceptor_g,
                        length: split.acceptor_len as usize,
                        sj: Some(split.isj),
                        ..seed
                    });
                }
                continue;
            }
            f(seed);
        }
    }
}

/// Overflow-safe midpoint.
fn median_uint2(a: usize, b: usize) -> usize {
    a / 2 + b / 2 + (a % 2 + b % 2) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::{index_from_str, random_seq};
    use clap::Parser;

    fn params() -> Parameters {
        Parameters::parse_from(["rustar", "--readFilesIn", "r.fq"])
    }

    fn revcomp(s: &str) -> String {
        s.bytes()
            .rev()
            .map(|b| match b {
                b'A' => 'T',
                b'C' => 'G',
                b'G' => 'C',
                b'T' => 'A',
                _ => 'N',
            })
            .collect()
    }

    fn loci(searcher: &SeedSearcher, set: &SeedSet, l_read: usize) -> Vec<Seed> {
        let mut v = Vec::new();
        for m in &set.matches {
            searcher.for_each_locus(m, l_read, |s| v.push(s));
        }
        v
    }

    #[test]
    fn exact_match_is_one_full_length_seed() {
        let chr = random_seq(2000, 7);
        let index = index_from_str(&[&chr]);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let read = ReadSeqs::new("r", &[chr[300..340].as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);

        assert_eq!(set.matches.len(), 1);
        let m = set.matches[0];
        assert_eq!((m.r_start, m.length, m.n_rep), (0, 40, 1));

        let seeds = loci(&searcher, &set, read.len());
        assert_eq!(seeds.len(), 1);
        assert_eq!((seeds[0].str, seeds[0].g_start, seeds[0].r_start), (0, 300, 0));
        assert!(seeds[0].anchor);
    }

    #[test]
    fn reverse_complement_read_maps_to_minus_strand() {
        let chr = random_seq(2000, 11);
        let index = index_from_str(&[&chr]);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let rc = revcomp(&chr[1000..1050]);
        let read = ReadSeqs::new("r", &[rc.as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);

        let seeds = loci(&searcher, &set, read.len());
        let full: Vec<_> = seeds.iter().filter(|s| s.length == 50).collect();
        assert_eq!(full.len(), 1);
        assert_eq!((full[0].str, full[0].g_start, full[0].r_start), (1, 1000, 0));
    }

    #[test]
    fn mismatch_splits_search() {
        let chr = random_seq(3000, 3);
        let index = index_from_str(&[&chr]);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let mut read: Vec<u8> = chr[500..560].bytes().collect();
        read[30] = if read[30] == b'A' { b'C' } else { b'A' };
        let read = ReadSeqs::new("r", &[&read]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);

        let seeds = loci(&searcher, &set, read.len());
        // forward search stops at the mismatch, reverse search covers the tail
        assert!(seeds
            .iter()
            .any(|s| s.str == 0 && s.r_start == 0 && s.g_start == 500 && s.length >= 30));
        assert!(seeds
            .iter()
            .any(|s| s.str == 0 && s.r_start + s.length == 60 && s.g_start == 500 + s.r_start as u64));
    }

    #[test]
    fn short_pieces_between_ns_are_skipped() {
        let chr = random_seq(2000, 5);
        let index = index_from_str(&[&chr]);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let seq = format!("{}N{}", &chr[100..108], &chr[109..149]);
        let read = ReadSeqs::new("r", &[seq.as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);
        assert!(set.matches.iter().all(|m| m.r_start >= 9));
        assert!(set.matches.iter().any(|m| m.r_start == 9 && m.length == 40));
    }

    #[test]
    fn repeats_above_limit_not_stored() {
        let unit = random_seq(30, 9);
        let chr = unit.repeat(8);
        let index = index_from_str(&[&chr]);
        let mut p = params().resolved_for(&index.header);
        p.seed_multimap_nmax = 3;
        let searcher = SeedSearcher::new(&index, &p);

        let read = ReadSeqs::new("r", &[unit[..25].as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);
        assert!(set.matches.is_empty());
        assert!(set.repeat_min.unwrap() >= 8);
    }

    #[test]
    fn multimapper_reports_every_locus() {
        let unit = random_seq(40, 21);
        let chr = format!("{}{}{}{}", random_seq(300, 1), unit, random_seq(300, 2), unit);
        let index = index_from_str(&[&chr]);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let read = ReadSeqs::new("r", &[unit.as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);
        let full = set.matches.iter().find(|m| m.length == 40).unwrap();
        assert_eq!(full.n_rep, 2);

        let mut starts: Vec<u64> = loci(&searcher, &set, read.len())
            .into_iter()
            .filter(|s| s.length == 40)
            .map(|s| s.g_start)
            .collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![300, 640]);
    }

    #[test]
    fn seeds_in_junction_insert_are_split() {
        use crate::index::test_support::index_with_junctions;
        let chr = random_seq(1000, 13);
        // intron 201..=400 (1-based)
        let index = index_with_junctions(&[&chr], &[(0, 201, 400)], 20);
        let p = params().resolved_for(&index.header);
        let searcher = SeedSearcher::new(&index, &p);

        let seq = format!("{}{}", &chr[185..200], &chr[400..415]);
        let read = ReadSeqs::new("r", &[seq.as_bytes()]);
        let mut set = SeedSet::default();
        searcher.find_seeds(&read, &mut set);
        let seeds = loci(&searcher, &set, read.len());
        let split: Vec<_> = seeds.iter().filter(|s| s.sj == Some(0)).collect();
        assert_eq!(split.len(), 2);
        assert_eq!((split[0].r_start, split[0].g_start, split[0].length), (0, 185, 15));
        assert_eq!((split[1].r_start, split[1].g_start, split[1].length), (15, 400, 15));
    }

    #[test]
    fn median_is_overflow_safe() {
        assert_eq!(median_uint2(usize::MAX, usize::MAX), usize::MAX);
        assert_eq!(median_uint2(3, 6), 4);
    }
}
