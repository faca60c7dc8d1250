//! Chimeric alignments: reads split between two distant loci.
//!
//! Segments are taken from the window transcripts of a read whose best
//! linear alignment leaves enough of it unexplained; two compatible segments
//! form a chimeric alignment with a refined breakpoint.

mod detect;
mod segment;

pub use detect::ChimericDetector;
pub use segment::{ChimericAlignment, ChimericSegment};
