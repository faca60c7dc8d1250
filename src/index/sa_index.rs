use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::Error;
use crate::genome::Genome;
use crate::index::mmap::ByteSource;
use crate::index::packed_array::PackedArray;
use crate::index::suffix_array::SuffixArray;

/// Prefix index over the suffix array.
///
/// For every prefix length `L` in `1..=nbases` and every `L`-mer `k`
/// (first base most significant, 2 bits per base) one packed entry holds
/// the first SA rank whose suffix starts with `k`. Two flag bits sit above
/// the rank:
/// - *absent*: no suffix starts with `k`; the rank is that of the next
///   present prefix (or the SA length).
/// - *gap*: the rank just before this block does not start with a valid
///   `L`-mer (an N or padding interrupts it), so the previous block cannot
///   be closed at `rank - 1`.
///
/// File layout: `u64 nbases`, `nbases + 1` u64 level offsets, packed entries.
pub struct SaIndex {
    pub nbases: u32,
    level_start: Vec<u64>,
    data: PackedArray<SaiBytes>,
    gap_bit: u32,
    absent_bit: u32,
    rank_mask: u64,
}

/// A resolved SA-index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaiEntry {
    pub rank: u64,
    pub absent: bool,
    pub gap: bool,
}

/// Packed entries following the file header, without copying.
pub struct SaiBytes {
    src: ByteSource,
    offset: usize,
}

impl AsRef<[u8]> for SaiBytes {
    fn as_ref(&self) -> &[u8] {
        &self.src[self.offset..]
    }
}

impl From<Vec<u8>> for SaiBytes {
    fn from(v: Vec<u8>) -> Self {
        Self {
            src: ByteSource::Owned(v),
            offset: 0,
        }
    }
}

/// Number of entries across levels `1..=nbases`.
fn level_offsets(nbases: u32) -> Vec<u64> {
    let mut starts = Vec::with_capacity(nbases as usize + 1);
    let mut acc = 0u64;
    starts.push(0);
    for l in 1..=nbases {
        acc += 1u64 << (2 * l);
        starts.push(acc);
    }
    starts
}

impl SaIndex {
    fn with_data(nbases: u32, level_start: Vec<u64>, data: PackedArray<SaiBytes>, gstrand_bit: u32) -> Self {
        Self {
            nbases,
            level_start,
            data,
            gap_bit: gstrand_bit + 1,
            absent_bit: gstrand_bit + 2,
            rank_mask: (1u64 << (gstrand_bit + 1)) - 1,
        }
    }

    /// Parse an SAindex file image.
    pub fn from_source(src: ByteSource, gstrand_bit: u32) -> Result<Self, Error> {
        if src.len() < 8 {
            return Err(Error::Index("SAindex header truncated".into()));
        }
        let nbases = LittleEndian::read_u64(&src[0..8]) as u32;
        if nbases == 0 || nbases > 20 {
            return Err(Error::Index(format!(
                "SAindex prefix length {nbases} out of range"
            )));
        }
        let header_len = 8 * (nbases as usize + 2);
        if src.len() < header_len {
            return Err(Error::Index("SAindex level table truncated".into()));
        }
        let level_start: Vec<u64> = (0..=nbases as usize)
            .map(|i| LittleEndian::read_u64(&src[8 + 8 * i..16 + 8 * i]))
            .collect();
        if level_start != level_offsets(nbases) {
            return Err(Error::Index("SAindex level table is corrupt".into()));
        }

        let n_entries = level_start[nbases as usize] as usize;
        let data = PackedArray::from_bytes(
            gstrand_bit + 3,
            n_entries,
            SaiBytes {
                src,
                offset: header_len,
            },
        )?;
        Ok(Self::with_data(nbases, level_start, data, gstrand_bit))
    }

    /// Serialized file image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * (self.level_start.len() + 1) + self.data.as_bytes().len());
        // writes into a Vec cannot fail
        let _ = out.write_u64::<LittleEndian>(self.nbases as u64);
        for &s in &self.level_start {
            let _ = out.write_u64::<LittleEndian>(s);
        }
        out.extend_from_slice(self.data.as_bytes());
        out
    }

    /// Entry for the `len`-mer `prefix`. `len` must be in `1..=nbases`.
    #[inline]
    pub fn lookup(&self, len: u32, prefix: u64) -> SaiEntry {
        debug_assert!(len >= 1 && len <= self.nbases);
        let v = self
            .data
            .read((self.level_start[len as usize - 1] + prefix) as usize);
        SaiEntry {
            rank: v & self.rank_mask,
            absent: (v >> self.absent_bit) & 1 == 1,
            gap: (v >> self.gap_bit) & 1 == 1,
        }
    }

    /// Build the prefix index for `sa` over `genome`.
    pub fn build(genome: &Genome, sa: &SuffixArray, nbases: u32) -> Result<Self, Error> {
        let level_start = level_offsets(nbases);
        let gstrand_bit = sa.gstrand_bit;
        let mut packed = PackedArray::new(gstrand_bit + 3, level_start[nbases as usize] as usize);
        let n_sa = sa.len() as u64;

        for l in 1..=nbases {
            let n_prefix = 1usize << (2 * l);
            let mut first = vec![u64::MAX; n_prefix];
            let mut gap = vec![false; n_prefix];
            let mut prev_valid = false;

            for rank in 0..sa.len() {
                let code = prefix_code(genome, sa.doubled_pos(rank), l);
                if let Some(k) = code {
                    let k = k as usize;
                    if first[k] == u64::MAX {
                        first[k] = rank as u64;
                        gap[k] = rank > 0 && !prev_valid;
                    }
                }
                prev_valid = code.is_some();
            }

            // absent entries point at the next present block
            let mut next_rank = n_sa;
            let mut next_gap = !prev_valid;
            let absent_flag = 1u64 << (gstrand_bit + 2);
            let gap_flag = 1u64 << (gstrand_bit + 1);
            for k in (0..n_prefix).rev() {
                let idx = (level_start[l as usize - 1] + k as u64) as usize;
                if first[k] != u64::MAX {
                    next_rank = first[k];
                    next_gap = gap[k];
                    packed.write(idx, next_rank | if next_gap { gap_flag } else { 0 });
                } else {
                    packed.write(
                        idx,
                        next_rank | absent_flag | if next_gap { gap_flag } else { 0 },
                    );
                }
            }
        }

        Ok(Self::with_data(nbases, level_start, packed.into_storage(), gstrand_bit))
    }
}

/// Code of the first `len` bases at doubled coordinate `pos`, or None if any
/// of them is N or padding.
pub fn prefix_code(genome: &Genome, pos: u64, len: u32) -> Option<u64> {
    let mut code = 0u64;
    for i in 0..len as u64 {
        let b = genome.base(pos + i);
        if b > 3 {
            return None;
        }
        code = (code << 2) | b as u64;
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::genome_from_str;

    fn build(seqs: &[&str], nbases: u32) -> (Genome, SuffixArray, SaIndex) {
        let genome = genome_from_str(seqs, 4);
        let sa = SuffixArray::build(&genome, 1).unwrap();
        let sai = SaIndex::build(&genome, &sa, nbases).unwrap();
        (genome, sa, sai)
    }

    #[test]
    fn level_offsets_sum_powers_of_four() {
        assert_eq!(level_offsets(3), vec![0, 4, 20, 84]);
    }

    #[test]
    fn present_entries_start_their_block() {
        let (genome, sa, sai) = build(&["ACGTACGGTCA"], 3);
        for l in 1..=3u32 {
            for k in 0..(1u64 << (2 * l)) {
                let e = sai.lookup(l, k);
                if e.absent {
                    continue;
                }
                let r = e.rank as usize;
                assert_eq!(prefix_code(&genome, sa.doubled_pos(r), l), Some(k));
                if r > 0 {
                    assert_ne!(prefix_code(&genome, sa.doubled_pos(r - 1), l), Some(k));
                }
            }
        }
    }

    #[test]
    fn absent_prefix_is_flagged() {
        // no "AA" anywhere on either strand (reverse complement of AA is TT)
        let (_, _, sai) = build(&["ACGCGTACG"], 2);
        let aa = sai.lookup(2, 0);
        assert!(aa.absent);
        let ac = sai.lookup(2, 1);
        assert!(!ac.absent);
        assert_eq!(aa.rank, ac.rank);
    }

    #[test]
    fn gap_flag_after_n_suffix() {
        // "AN" sorts after "AT", between the A-blocks and the C-blocks
        let (genome, sa, sai) = build(&["ATCANCA"], 2);
        for k in 0..16u64 {
            let e = sai.lookup(2, k);
            if e.absent || e.rank == 0 {
                continue;
            }
            let prev_valid = prefix_code(&genome, sa.doubled_pos(e.rank as usize - 1), 2).is_some();
            assert_eq!(e.gap, !prev_valid, "prefix {k}");
        }
    }

    #[test]
    fn file_image_round_trip() {
        let (_, sa, sai) = build(&["GATTACAGATTACA"], 3);
        let bytes = sai.to_bytes();
        let reloaded = SaIndex::from_source(ByteSource::Owned(bytes), sa.gstrand_bit).unwrap();
        assert_eq!(reloaded.nbases, 3);
        for k in 0..64 {
            assert_eq!(reloaded.lookup(3, k), sai.lookup(3, k));
        }
    }

    #[test]
    fn corrupt_header_rejected() {
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_u64(&mut bytes, 40);
        assert!(SaIndex::from_source(ByteSource::Owned(bytes), 32).is_err());
    }
}
