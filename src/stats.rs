/// Alignment statistics tracking and reporting
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::align::{ReadClass, ReadResult, UnmappedReason};
use crate::error::Error;

/// Tracks alignment statistics for a read mapping run
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct AlignmentStats {
    /// Total number of reads processed
    pub total_reads: u64,
    /// Reads that mapped uniquely (exactly 1 locus)
    pub uniquely_mapped: u64,
    /// Reads that mapped to 2..=outFilterMultimapNmax loci
    pub multi_mapped: u64,
    /// Unmapped reads by reason, in `UnmappedReason::ALL` order
    pub unmapped: [u64; 4],
    /// Reads with at least one chimeric alignment
    pub chimeric: u64,
    /// Reads that hit a capacity limit
    pub marked: u64,
    /// Totals over the primary alignments of unique reads
    pub unique_bases: u64,
    pub unique_mismatches: u64,
    pub unique_deletions: u64,
    pub unique_insertions: u64,
    pub unique_splices: u64,
}

impl AlignmentStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one read
    pub fn record(&mut self, result: &ReadResult) {
        self.total_reads += 1;
        match result.class {
            ReadClass::Unique => {
                self.uniquely_mapped += 1;
                if let Some(t) = result.transcripts.first() {
                    let ((n_del, _), (n_ins, _)) = t.indels();
                    self.unique_bases += t.r_length as u64;
                    self.unique_mismatches += t.n_mm as u64;
                    self.unique_deletions += n_del as u64;
                    self.unique_insertions += n_ins as u64;
                    self.unique_splices += t.n_junctions() as u64;
                }
            }
            ReadClass::Multi(_) => self.multi_mapped += 1,
            ReadClass::Unmapped(reason) => self.unmapped[reason_slot(reason)] += 1,
        }
        if !result.chimeric.is_empty() {
            self.chimeric += 1;
        }
        if result.marker.is_some() {
            self.marked += 1;
        }
    }

    /// Fold in counts gathered elsewhere
    pub fn merge(&mut self, other: &AlignmentStats) {
        self.total_reads += other.total_reads;
        self.uniquely_mapped += other.uniquely_mapped;
        self.multi_mapped += other.multi_mapped;
        for (a, b) in self.unmapped.iter_mut().zip(other.unmapped) {
            *a += b;
        }
        self.chimeric += other.chimeric;
        self.marked += other.marked;
        self.unique_bases += other.unique_bases;
        self.unique_mismatches += other.unique_mismatches;
        self.unique_deletions += other.unique_deletions;
        self.unique_insertions += other.unique_insertions;
        self.unique_splices += other.unique_splices;
    }

    pub fn unmapped_for(&self, reason: UnmappedReason) -> u64 {
        self.unmapped[reason_slot(reason)]
    }

    /// Get total mapped reads (unique + multi)
    pub fn total_mapped(&self) -> u64 {
        self.uniquely_mapped + self.multi_mapped
    }

    fn percent(&self, n: u64) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            100.0 * n as f64 / self.total_reads as f64
        }
    }

    pub fn unique_percent(&self) -> f64 {
        self.percent(self.uniquely_mapped)
    }

    pub fn mapped_percent(&self) -> f64 {
        self.percent(self.total_mapped())
    }

    /// Events per mapped base of unique reads, in percent
    fn per_base(&self, n: u64) -> f64 {
        if self.unique_bases == 0 {
            0.0
        } else {
            100.0 * n as f64 / self.unique_bases as f64
        }
    }

    /// Summary lines shared by the log and `Log.final.out`
    fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Number of input reads | {}", self.total_reads),
            format!("Uniquely mapped reads number | {}", self.uniquely_mapped),
            format!("Uniquely mapped reads % | {:.2}%", self.unique_percent()),
            format!("Number of splices: Total | {}", self.unique_splices),
            format!(
                "Mismatch rate per base, % | {:.2}%",
                self.per_base(self.unique_mismatches)
            ),
            format!(
                "Deletion rate per base | {:.2}%",
                self.per_base(self.unique_deletions)
            ),
            format!(
                "Insertion rate per base | {:.2}%",
                self.per_base(self.unique_insertions)
            ),
            format!("Number of reads mapped to multiple loci | {}", self.multi_mapped),
            format!(
                "% of reads mapped to multiple loci | {:.2}%",
                self.percent(self.multi_mapped)
            ),
        ];
        for reason in UnmappedReason::ALL {
            let n = self.unmapped_for(reason);
            lines.push(format!("Number of reads unmapped: {reason} | {n}"));
            lines.push(format!(
                "% of reads unmapped: {reason} | {:.2}%",
                self.percent(n)
            ));
        }
        lines.push(format!("Number of chimeric reads | {}", self.chimeric));
        lines.push(format!("% of chimeric reads | {:.2}%", self.percent(self.chimeric)));
        lines
    }

    /// Print summary statistics to log
    pub fn print_summary(&self) {
        if self.total_reads == 0 {
            info!("No reads processed");
            return;
        }
        info!("=== Alignment Summary ===");
        for line in self.summary_lines() {
            info!("{line}");
        }
        if self.marked > 0 {
            info!("Reads hitting a capacity limit: {}", self.marked);
        }
    }

    /// Write `Log.final.out`
    pub fn write_final_log(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path).map_err(|e| Error::io(e, path))?;
        let mut w = BufWriter::new(file);
        for line in self.summary_lines() {
            let (label, value) = line.split_once(" | ").unwrap_or((line.as_str(), ""));
            writeln!(w, "{label:>50} |\t{value}").map_err(|e| Error::io(e, path))?;
        }
        w.flush().map_err(|e| Error::io(e, path))
    }
}

fn reason_slot(reason: UnmappedReason) -> usize {
    UnmappedReason::ALL
        .iter()
        .position(|&r| r == reason)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::ReadMarker;

    fn result(class: ReadClass) -> ReadResult {
        ReadResult {
            name: "r".to_string(),
            class,
            transcripts: Vec::new(),
            cigars: Vec::new(),
            mate_unmapped: None,
            marker: None,
            chimeric: Vec::new(),
            chimeric_cigars: Vec::new(),
        }
    }

    #[test]
    fn test_stats_default() {
        let stats = AlignmentStats::default();
        assert_eq!(stats.total_reads, 0);
        assert_eq!(stats.total_mapped(), 0);
        assert_eq!(stats.unique_percent(), 0.0);
        assert_eq!(stats.mapped_percent(), 0.0);
    }

    #[test]
    fn test_record_classes() {
        let mut stats = AlignmentStats::new();
        stats.record(&result(ReadClass::Unique));
        stats.record(&result(ReadClass::Multi(3)));
        stats.record(&result(ReadClass::Unique));
        stats.record(&result(ReadClass::Unmapped(UnmappedReason::TooShort)));
        let mut marked = result(ReadClass::Unmapped(UnmappedReason::NoWindow));
        marked.marker = Some(ReadMarker::TooManyWindows);
        stats.record(&marked);

        assert_eq!(stats.total_reads, 5);
        assert_eq!(stats.uniquely_mapped, 2);
        assert_eq!(stats.multi_mapped, 1);
        assert_eq!(stats.unmapped_for(UnmappedReason::TooShort), 1);
        assert_eq!(stats.unmapped_for(UnmappedReason::NoWindow), 1);
        assert_eq!(stats.unmapped_for(UnmappedReason::TooManyLoci), 0);
        assert_eq!(stats.marked, 1);
        assert!((stats.unique_percent() - 40.0).abs() < 0.01);
        assert!((stats.mapped_percent() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_unique_alignment_rates() {
        use crate::align::transcript::{Exon, Gap, GapKind, Transcript};

        let exon = |r, g, len| Exon { r, g, len, frag: 0, sj: None };
        let mut unique = result(ReadClass::Unique);
        unique.transcripts.push(Transcript {
            exons: vec![exon(0, 100, 50), exon(50, 103 + 50, 50)],
            gaps: vec![Gap::new(GapKind::Deletion)],
            r_length: 100,
            n_mm: 2,
            ..Default::default()
        });
        let mut stats = AlignmentStats::new();
        stats.record(&unique);
        assert_eq!(stats.unique_bases, 100);
        assert_eq!(stats.unique_deletions, 1);
        assert_eq!(stats.unique_insertions, 0);
        assert_eq!(stats.unique_splices, 0);
        assert!((stats.per_base(stats.unique_mismatches) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge() {
        let mut a = AlignmentStats::new();
        a.record(&result(ReadClass::Unique));
        let mut b = AlignmentStats::new();
        b.record(&result(ReadClass::Unmapped(UnmappedReason::TooManyMismatches)));
        a.merge(&b);
        assert_eq!(a.total_reads, 2);
        assert_eq!(a.unmapped_for(UnmappedReason::TooManyMismatches), 1);
    }

    #[test]
    fn test_final_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Log.final.out");
        let mut stats = AlignmentStats::new();
        stats.record(&result(ReadClass::Unique));
        stats.write_final_log(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Uniquely mapped reads number |\t1"));
        assert!(text.contains("Number of reads unmapped: too many loci |\t0"));
    }
}
