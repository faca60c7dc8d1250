pub mod fasta;

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Error;
use crate::index::mmap::ByteSource;

/// Inter-chromosome padding and mate spacer in the genome sequence.
pub const GENOME_SPACING_CHAR: u8 = 5;

/// Base code used for N in both reads and genome.
pub const BASE_N: u8 = 4;

/// Complement of an encoded base; N and padding map to themselves.
#[inline]
pub fn complement(base: u8) -> u8 {
    if base < 4 {
        3 - base
    } else {
        base
    }
}

/// Encode one nucleotide letter: A=0, C=1, G=2, T=3, anything else N=4.
#[inline]
pub fn encode_base(letter: u8) -> u8 {
    match letter {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => BASE_N,
    }
}

/// Decode a base code back to its letter.
#[inline]
pub fn decode_base(code: u8) -> u8 {
    match code {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'N',
    }
}

/// Packed genome with chromosome metadata.
///
/// Only the forward strand is stored. Coordinates `n_genome..2*n_genome`
/// address the reverse complement: position `2n-1-i` is the complement of
/// forward position `i`. Chromosome starts are aligned to `2^chr_bin_nbits`.
pub struct Genome {
    sequence: ByteSource,

    /// Length of the forward genome including padding and any junction inserts.
    pub n_genome: u64,

    pub chr_name: Vec<String>,

    /// True (unpadded) chromosome lengths.
    pub chr_length: Vec<u64>,

    /// Padded chromosome starts; one extra trailing entry marks the end of
    /// the last chromosome's padding.
    pub chr_start: Vec<u64>,

    pub chr_bin_nbits: u32,

    /// Chromosome index for every `2^chr_bin_nbits` bin of the forward genome.
    chr_bin: Vec<u32>,
}

impl Genome {
    /// Assemble a genome view from its parts, checking the chromosome table.
    pub fn from_parts(
        sequence: ByteSource,
        n_genome: u64,
        chr_name: Vec<String>,
        chr_length: Vec<u64>,
        chr_start: Vec<u64>,
        chr_bin_nbits: u32,
    ) -> Result<Self, Error> {
        let n_chr = chr_name.len();
        if n_chr == 0 || chr_length.len() != n_chr || chr_start.len() != n_chr + 1 {
            return Err(Error::Index(format!(
                "inconsistent chromosome tables: {} names, {} lengths, {} starts",
                n_chr,
                chr_length.len(),
                chr_start.len()
            )));
        }
        if chr_start.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Index(
                "chromosome starts are not strictly increasing".into(),
            ));
        }
        if (sequence.len() as u64) < n_genome || chr_start[n_chr] > n_genome {
            return Err(Error::Index(format!(
                "genome sequence has {} bytes, expected {}",
                sequence.len(),
                n_genome
            )));
        }

        let n_bins = (n_genome >> chr_bin_nbits) as usize + 1;
        let mut chr_bin = vec![n_chr as u32; n_bins];
        for ichr in 0..n_chr {
            let first = (chr_start[ichr] >> chr_bin_nbits) as usize;
            let last = ((chr_start[ichr + 1] - 1) >> chr_bin_nbits) as usize;
            for b in chr_bin.iter_mut().take(last + 1).skip(first) {
                *b = ichr as u32;
            }
        }

        Ok(Self {
            sequence,
            n_genome,
            chr_name,
            chr_length,
            chr_start,
            chr_bin_nbits,
            chr_bin,
        })
    }

    pub fn n_chr(&self) -> usize {
        self.chr_name.len()
    }

    /// Base at a position of the doubled (forward + reverse complement)
    /// genome. Out-of-range positions read as padding.
    #[inline]
    pub fn base(&self, pos: u64) -> u8 {
        let n = self.n_genome;
        if pos < n {
            self.sequence[pos as usize]
        } else if pos < 2 * n {
            complement(self.sequence[(2 * n - 1 - pos) as usize])
        } else {
            GENOME_SPACING_CHAR
        }
    }

    /// Forward-strand bases.
    pub fn forward(&self) -> &[u8] {
        &self.sequence[..self.n_genome as usize]
    }

    /// Chromosome owning a forward-genome bin of `2^chr_bin_nbits` bases.
    /// Bins past the last chromosome (junction inserts) return `n_chr()`.
    #[inline]
    pub fn chr_of_bin(&self, chr_bin: u64) -> usize {
        self.chr_bin
            .get(chr_bin as usize)
            .map_or(self.n_chr(), |&c| c as usize)
    }

    /// Chromosome containing a forward-genome coordinate (padding included).
    #[inline]
    pub fn chr_of(&self, pos: u64) -> usize {
        self.chr_of_bin(pos >> self.chr_bin_nbits)
    }

    /// `(chr_index, offset_within_chr)`, or None if `pos` is padding.
    pub fn position_to_chr(&self, pos: u64) -> Option<(usize, u64)> {
        let ichr = self.chr_of(pos);
        if ichr >= self.n_chr() {
            return None;
        }
        let offset = pos - self.chr_start[ichr];
        (offset < self.chr_length[ichr]).then_some((ichr, offset))
    }

    pub fn is_mapped(&self) -> bool {
        self.sequence.is_mapped()
    }

    /// Write the genome and chromosome tables into `dir`.
    pub fn write_files(&self, dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))?;

        let genome_path = dir.join("Genome");
        fs::write(&genome_path, self.forward()).map_err(|e| Error::io(e, &genome_path))?;

        write_lines(&dir.join("chrName.txt"), self.chr_name.iter())?;
        write_lines(&dir.join("chrLength.txt"), self.chr_length.iter())?;
        write_lines(&dir.join("chrStart.txt"), self.chr_start.iter())?;
        write_lines(
            &dir.join("chrNameLength.txt"),
            self.chr_name
                .iter()
                .zip(&self.chr_length)
                .map(|(n, l)| format!("{n}\t{l}")),
        )?;
        Ok(())
    }
}

fn write_lines<T: std::fmt::Display>(
    path: &Path,
    items: impl Iterator<Item = T>,
) -> Result<(), Error> {
    let mut f = std::io::BufWriter::new(fs::File::create(path).map_err(|e| Error::io(e, path))?);
    for item in items {
        writeln!(f, "{item}").map_err(|e| Error::io(e, path))?;
    }
    f.flush().map_err(|e| Error::io(e, path))
}

/// Padded start of the next chromosome after position `n`.
pub fn next_chr_start(n: u64, chr_bin_nbits: u32) -> u64 {
    let bin = 1u64 << chr_bin_nbits;
    ((n + 1) / bin + 1) * bin
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two chromosomes in 4-base bins: "AA" at 0, "TT" at 4.
    fn two_chr_genome() -> Genome {
        let mut seq = vec![GENOME_SPACING_CHAR; 8];
        seq[0..2].copy_from_slice(&[0, 0]);
        seq[4..6].copy_from_slice(&[3, 3]);
        Genome::from_parts(
            ByteSource::Owned(seq),
            8,
            vec!["chr1".into(), "chr2".into()],
            vec![2, 2],
            vec![0, 4, 8],
            2,
        )
        .unwrap()
    }

    #[test]
    fn padding_formula() {
        // n=4, bin 8: ((4+1)/8+1)*8 = 8
        assert_eq!(next_chr_start(4, 3), 8);
        // n=2, bin 4 -> 4; n=6 -> 8
        assert_eq!(next_chr_start(2, 2), 4);
        assert_eq!(next_chr_start(6, 2), 8);
        // an exact multiple still gets a padding bin
        assert_eq!(next_chr_start(7, 2), 12);
    }

    #[test]
    fn reverse_complement_is_virtual() {
        let g = two_chr_genome();
        assert_eq!(g.base(0), 0);
        assert_eq!(g.base(2), GENOME_SPACING_CHAR);
        // 2n-1-i mirrors i with complement
        assert_eq!(g.base(15), 3);
        assert_eq!(g.base(14), 3);
        assert_eq!(g.base(11), 0);
        assert_eq!(g.base(10), 0);
        assert_eq!(g.base(13), GENOME_SPACING_CHAR);
        assert_eq!(g.base(16), GENOME_SPACING_CHAR);
    }

    #[test]
    fn chromosome_lookup() {
        let g = two_chr_genome();
        assert_eq!(g.chr_of(0), 0);
        assert_eq!(g.chr_of(3), 0);
        assert_eq!(g.chr_of(5), 1);
        assert_eq!(g.position_to_chr(1), Some((0, 1)));
        assert_eq!(g.position_to_chr(2), None);
        assert_eq!(g.position_to_chr(5), Some((1, 1)));
        assert_eq!(g.position_to_chr(6), None);
        // past the last chromosome
        assert_eq!(g.chr_of_bin(100), 2);
    }

    #[test]
    fn rejects_unsorted_starts() {
        let r = Genome::from_parts(
            ByteSource::Owned(vec![0; 8]),
            8,
            vec!["a".into(), "b".into()],
            vec![1, 1],
            vec![4, 4, 8],
            2,
        );
        assert!(r.is_err());
    }

    #[test]
    fn base_codes() {
        assert_eq!(encode_base(b'a'), 0);
        assert_eq!(encode_base(b'T'), 3);
        assert_eq!(encode_base(b'R'), BASE_N);
        assert_eq!(decode_base(2), b'G');
        assert_eq!(decode_base(5), b'N');
        assert_eq!(complement(1), 2);
        assert_eq!(complement(BASE_N), BASE_N);
    }
}
