use std::cmp::Ordering;

use crate::error::Error;
use crate::genome::{Genome, GENOME_SPACING_CHAR};
use crate::index::mmap::ByteSource;
use crate::index::packed_array::PackedArray;

/// Suffix array over the doubled (forward + reverse complement) genome.
///
/// Each entry is a strand-relative position with the strand in bit
/// `gstrand_bit`: a set bit means the position counts from the start of the
/// reverse-complement strand, i.e. doubled coordinate `pos + n_genome`.
pub struct SuffixArray {
    data: PackedArray<ByteSource>,

    pub gstrand_bit: u32,

    gstrand_mask: u64,

    n_genome: u64,
}

impl SuffixArray {
    /// Strand bit position: max(32, floor(log2(n_genome)) + 1).
    pub fn gstrand_bit_for(n_genome: u64) -> u32 {
        let log2_bits = 64 - n_genome.leading_zeros();
        u32::max(32, log2_bits)
    }

    /// Wrap the raw bytes of an SA file holding `n_sa` entries.
    pub fn from_source(bytes: ByteSource, n_sa: usize, n_genome: u64) -> Result<Self, Error> {
        let gstrand_bit = Self::gstrand_bit_for(n_genome);
        let data = PackedArray::from_bytes(gstrand_bit + 1, n_sa, bytes)?;
        Ok(Self {
            data,
            gstrand_bit,
            gstrand_mask: (1u64 << gstrand_bit) - 1,
            n_genome,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decoded entry: (strand-relative position, reverse strand).
    #[inline]
    pub fn strand_pos(&self, rank: usize) -> (u64, bool) {
        let v = self.data.read(rank);
        (v & self.gstrand_mask, (v >> self.gstrand_bit) != 0)
    }

    /// Doubled-genome coordinate of the suffix at `rank`.
    #[inline]
    pub fn doubled_pos(&self, rank: usize) -> u64 {
        let (pos, reverse) = self.strand_pos(rank);
        if reverse {
            pos + self.n_genome
        } else {
            pos
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Sort all suffixes of the doubled genome that start with A/C/G/T and
    /// whose doubled coordinate is a multiple of `sparse_d`.
    ///
    /// Plain comparison sort; used for fixtures and small references.
    pub fn build(genome: &Genome, sparse_d: u64) -> Result<Self, Error> {
        let n = genome.n_genome;
        let gstrand_bit = Self::gstrand_bit_for(n);

        let mut suffixes: Vec<u64> = (0..2 * n)
            .filter(|&p| p % sparse_d == 0 && genome.base(p) < 4)
            .collect();
        suffixes.sort_unstable_by(|&a, &b| compare_suffixes(genome, a, b));

        log::info!(
            "Suffix array: {} entries, word length {}",
            suffixes.len(),
            gstrand_bit + 1
        );

        let mut packed = PackedArray::new(gstrand_bit + 1, suffixes.len());
        for (rank, &p) in suffixes.iter().enumerate() {
            let v = if p < n { p } else { (p - n) | (1u64 << gstrand_bit) };
            packed.write(rank, v);
        }

        Ok(Self {
            data: packed.into_storage(),
            gstrand_bit,
            gstrand_mask: (1u64 << gstrand_bit) - 1,
            n_genome: n,
        })
    }
}

/// Lexicographic order on base codes, stopping at the first padding byte.
/// Suffixes that reach padding together are ordered by descending
/// coordinate, which keeps the sort total.
fn compare_suffixes(genome: &Genome, a: u64, b: u64) -> Ordering {
    let mut i = 0u64;
    loop {
        let ca = genome.base(a + i);
        let cb = genome.base(b + i);
        match ca.cmp(&cb) {
            Ordering::Equal if ca == GENOME_SPACING_CHAR => return b.cmp(&a),
            Ordering::Equal => i += 1,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::genome_from_str;

    #[test]
    fn gstrand_bit_floor_is_32() {
        assert_eq!(SuffixArray::gstrand_bit_for(1), 32);
        assert_eq!(SuffixArray::gstrand_bit_for(1 << 20), 32);
        assert_eq!(SuffixArray::gstrand_bit_for(1 << 32), 33);
        assert_eq!(SuffixArray::gstrand_bit_for((1 << 33) + 5), 34);
    }

    #[test]
    fn sorted_over_both_strands() {
        let genome = genome_from_str(&["ACGTTGCA"], 4);
        let sa = SuffixArray::build(&genome, 1).unwrap();

        // 8 bases per strand, none padding
        assert_eq!(sa.len(), 16);

        for r in 1..sa.len() {
            let a = sa.doubled_pos(r - 1);
            let b = sa.doubled_pos(r);
            assert_ne!(compare_suffixes(&genome, a, b), Ordering::Greater);
        }

        let reverse = (0..sa.len()).filter(|&r| sa.strand_pos(r).1).count();
        assert_eq!(reverse, 8);
    }

    #[test]
    fn sparse_sampling_and_n_skipped() {
        let genome = genome_from_str(&["ACGNACGT"], 4);
        let dense = SuffixArray::build(&genome, 1).unwrap();
        // 7 valid bases per strand
        assert_eq!(dense.len(), 14);

        let sparse = SuffixArray::build(&genome, 2).unwrap();
        for r in 0..sparse.len() {
            assert_eq!(sparse.doubled_pos(r) % 2, 0);
        }
        assert!(sparse.len() < dense.len());
    }

    #[test]
    fn reload_from_bytes() {
        let genome = genome_from_str(&["GATTACA", "TTAGG"], 3);
        let sa = SuffixArray::build(&genome, 1).unwrap();
        let bytes = sa.as_bytes().to_vec();
        let reloaded =
            SuffixArray::from_source(ByteSource::Owned(bytes), sa.len(), genome.n_genome).unwrap();
        for r in 0..sa.len() {
            assert_eq!(reloaded.doubled_pos(r), sa.doubled_pos(r));
        }
    }
}
