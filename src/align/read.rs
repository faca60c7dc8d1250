//! Encoded read sequences in both orientations.
//!
//! A paired read is stored as one combined sequence: mate 1, a spacer base,
//! then the reverse complement of mate 2. Its reverse complement is kept
//! alongside so that alignments on either genomic strand are stitched
//! against the forward genome.

use std::ops::Range;

use crate::genome::{complement, encode_base, GENOME_SPACING_CHAR};

/// Spacer placed between the two mates. It never matches the genome.
pub const MATE_SPACER: u8 = GENOME_SPACING_CHAR;

/// Reusable read buffers.
#[derive(Debug, Clone, Default)]
pub struct ReadSeqs {
    pub name: String,
    forward: Vec<u8>,
    reverse: Vec<u8>,
    mate_len: [usize; 2],
    n_mates: usize,
}

impl ReadSeqs {
    /// Read built from one or two mates given as ASCII letters.
    pub fn new(name: &str, mates: &[&[u8]]) -> Self {
        let mut read = Self::default();
        read.fill(name, mates);
        read
    }

    /// Refill in place from ASCII mates, keeping the allocations.
    pub fn fill(&mut self, name: &str, mates: &[&[u8]]) {
        debug_assert!(mates.len() == 1 || mates.len() == 2);
        self.name.clear();
        self.name.push_str(name);
        self.forward.clear();
        self.n_mates = mates.len().min(2);
        self.mate_len = [0, 0];

        self.forward.extend(mates[0].iter().map(|&b| encode_base(b)));
        self.mate_len[0] = mates[0].len();
        if let Some(mate2) = mates.get(1) {
            self.forward.push(MATE_SPACER);
            self.forward
                .extend(mate2.iter().rev().map(|&b| complement(encode_base(b))));
            self.mate_len[1] = mate2.len();
        }

        self.reverse.clear();
        self.reverse
            .extend(self.forward.iter().rev().map(|&b| complement(b)));
    }

    /// Combined length, including the spacer for pairs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn n_mates(&self) -> usize {
        self.n_mates
    }

    pub fn mate_len(&self, frag: usize) -> usize {
        self.mate_len[frag]
    }

    /// Sum of mate lengths (spacer excluded).
    pub fn bases(&self) -> usize {
        self.mate_len[0] + self.mate_len[1]
    }

    pub fn forward(&self) -> &[u8] {
        &self.forward
    }

    pub fn reverse(&self) -> &[u8] {
        &self.reverse
    }

    /// The read as aligned to the forward genome for strand `str` (0 or 1).
    #[inline]
    pub fn oriented(&self, str: u8) -> &[u8] {
        if str == 0 {
            &self.forward
        } else {
            &self.reverse
        }
    }

    /// Positions of mate `frag` in the read oriented for strand `str`.
    pub fn mate_range(&self, str: u8, frag: usize) -> Range<usize> {
        let l0 = self.mate_len[0];
        if self.n_mates == 1 {
            return 0..l0;
        }
        let l1 = self.mate_len[1];
        let first = if str == 0 { 0 } else { 1 };
        let first_len = if str == 0 { l0 } else { l1 };
        if frag == first {
            0..first_len
        } else {
            first_len + 1..self.len()
        }
    }

    /// Mate owning an oriented read position.
    pub fn frag_at(&self, str: u8, pos: usize) -> usize {
        if self.n_mates == 1 {
            return 0;
        }
        let first_len = if str == 0 { self.mate_len[0] } else { self.mate_len[1] };
        let first = if str == 0 { 0 } else { 1 };
        if pos < first_len {
            first
        } else {
            1 - first
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_end_layout() {
        let r = ReadSeqs::new("r1", &[b"ACGTN"]);
        assert_eq!(r.len(), 5);
        assert_eq!(r.forward(), &[0, 1, 2, 3, 4]);
        // reverse complement of ACGTN is NACGT
        assert_eq!(r.reverse(), &[4, 0, 1, 2, 3]);
        assert_eq!(r.mate_range(0, 0), 0..5);
        assert_eq!(r.mate_range(1, 0), 0..5);
        assert_eq!(r.bases(), 5);
    }

    #[test]
    fn paired_layout() {
        let r = ReadSeqs::new("p", &[b"AAC", b"GT"]);
        // AAC + spacer + revcomp(GT)=AC
        assert_eq!(r.forward(), &[0, 0, 1, MATE_SPACER, 0, 1]);
        // reverse: revcomp(forward) = GT + spacer + GTT
        assert_eq!(r.reverse(), &[2, 3, MATE_SPACER, 2, 3, 3]);
        assert_eq!(r.len(), 6);
        assert_eq!(r.bases(), 5);
        assert_eq!(r.mate_range(0, 0), 0..3);
        assert_eq!(r.mate_range(0, 1), 4..6);
        assert_eq!(r.mate_range(1, 1), 0..2);
        assert_eq!(r.mate_range(1, 0), 3..6);
        assert_eq!(r.frag_at(0, 4), 1);
        assert_eq!(r.frag_at(1, 0), 1);
        assert_eq!(r.frag_at(1, 5), 0);
    }

    #[test]
    fn refill_reuses_buffers() {
        let mut r = ReadSeqs::new("a", &[b"ACGTACGT", b"AAAA"]);
        r.fill("b", &[b"TT"]);
        assert_eq!(r.name, "b");
        assert_eq!(r.n_mates(), 1);
        assert_eq!(r.forward(), &[3, 3]);
        assert_eq!(r.mate_len(1), 0);
    }
}
