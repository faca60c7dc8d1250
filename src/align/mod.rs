//! Per-read alignment: seed search, windowing, stitching and selection.

pub mod read;
pub mod read_align;
pub mod score;
pub mod seed;
pub mod select;
pub mod stitch;
pub mod stitcher;
pub mod transcript;
pub mod window;

// Re-export commonly used types
pub use read::ReadSeqs;
pub use read_align::{ReadAligner, ReadResult};
pub use score::{AlignmentScorer, ScoringPolicy, SpliceMotif};
pub use seed::{Seed, SeedSearcher};
pub use select::{ReadClass, ReadMarker, Selector, UnmappedReason};
pub use stitcher::{JunctionSet, StitchedWindow, Stitcher};
pub use transcript::{CigarOp, Exon, Transcript};
pub use window::WindowBuilder;
