//! Read input and result output.

pub mod fastq;
pub mod output;

pub use fastq::{ReadRecord, ReadSource};
pub use output::{output_path, ResultWriter};
