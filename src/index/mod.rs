pub mod build;
pub mod io;
pub mod mmap;
pub mod packed_array;
pub mod sa_index;
pub mod sjdb;
pub mod suffix_array;

use std::path::Path;

use crate::error::Error;
use crate::genome::Genome;
use crate::params::GenomeLoad;
use io::GenomeHeader;
use sa_index::SaIndex;
use sjdb::SjdbTable;
use suffix_array::SuffixArray;

/// Complete read-only genome index: sequence, suffix array, prefix index and
/// annotated junctions.
///
/// Shared by reference between all alignment workers; nothing in it changes
/// after load.
pub struct GenomeIndex {
    pub genome: Genome,
    pub suffix_array: SuffixArray,
    pub sa_index: SaIndex,
    pub sjdb: SjdbTable,
    pub header: GenomeHeader,
}

impl GenomeIndex {
    /// Load an index directory written by `genomeGenerate`.
    pub fn load(dir: &Path, mode: GenomeLoad) -> Result<Self, Error> {
        io::load_index(dir, mode)
    }

    /// Write all index files to `dir`.
    pub fn write(&self, dir: &Path) -> Result<(), Error> {
        io::write_index(self, dir)
    }

    pub fn n_genome(&self) -> u64 {
        self.genome.n_genome
    }

    /// Doubled-genome base at `pos`.
    #[inline]
    pub fn base(&self, pos: u64) -> u8 {
        self.genome.base(pos)
    }
}

impl std::fmt::Debug for GenomeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenomeIndex")
            .field("header", &self.header)
            .field("n_chr", &self.genome.n_chr())
            .field("n_genome", &self.genome.n_genome)
            .field("n_suffixes", &self.suffix_array.len())
            .field("n_sjdb", &self.sjdb.len())
            .finish()
    }
}
