//! Annotated splice junctions and the collapsed-intron insert space.
//!
//! Each junction `i` contributes `2*overhang + 1` bases after the last
//! chromosome: `overhang` donor-exon bases, `overhang` acceptor-exon bases
//! and one spacer. A seed landing in this insert is translated back into a
//! donor piece and an acceptor piece with [`SjdbTable::split_align`].

use std::fmt::Write as _;

use crate::error::Error;

/// One junction row as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SjdbRecord {
    /// First intron base (forward genome coordinate).
    pub start: u64,
    /// Last intron base.
    pub end: u64,
    /// 0 non-canonical, 1 GT/AG, 2 CT/AC, 3 GC/AG, 4 CT/GC, 5 AT/AC, 6 GT/AT.
    pub motif: u8,
    pub shift_left: u8,
    pub shift_right: u8,
    /// 0 undefined, 1 plus, 2 minus.
    pub strand: u8,
}

/// A seed split across an annotated junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SjdbSplit {
    pub donor_g: u64,
    pub donor_len: u64,
    pub acceptor_g: u64,
    pub acceptor_len: u64,
    pub isj: usize,
}

/// Junction table sorted by (start, end).
#[derive(Debug, Clone, Default)]
pub struct SjdbTable {
    pub overhang: u64,
    records: Vec<SjdbRecord>,
    /// Donor flank start for each junction.
    d_start: Vec<u64>,
    /// Acceptor flank start for each junction.
    a_start: Vec<u64>,
    /// First coordinate of the junction insert (end of chromosomes).
    pub g_start: u64,
}

impl SjdbTable {
    /// Table over `records` (re-sorted) with inserts beginning at `g_start`.
    pub fn new(mut records: Vec<SjdbRecord>, overhang: u64, g_start: u64) -> Self {
        records.sort_by_key(|r| (r.start, r.end));
        records.dedup_by_key(|r| (r.start, r.end));
        let (d_start, a_start) = records
            .iter()
            .map(|r| {
                let shift = if r.motif == 0 { r.shift_left as u64 } else { 0 };
                (r.start + shift - overhang, r.end + 1 + shift)
            })
            .unzip();
        Self {
            overhang,
            records,
            d_start,
            a_start,
            g_start,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, isj: usize) -> &SjdbRecord {
        &self.records[isj]
    }

    pub fn records(&self) -> &[SjdbRecord] {
        &self.records
    }

    /// Bases each junction occupies in the insert.
    pub fn sjdb_length(&self) -> u64 {
        2 * self.overhang + 1
    }

    /// Total insert length.
    pub fn insert_length(&self) -> u64 {
        self.records.len() as u64 * self.sjdb_length()
    }

    pub fn donor_start(&self, isj: usize) -> u64 {
        self.d_start[isj]
    }

    pub fn acceptor_start(&self, isj: usize) -> u64 {
        self.a_start[isj]
    }

    /// Index of the junction with exactly this intron, if annotated.
    pub fn find(&self, start: u64, end: u64) -> Option<usize> {
        let i = self.records.partition_point(|r| (r.start, r.end) < (start, end));
        (i < self.records.len() && self.records[i].start == start && self.records[i].end == end)
            .then_some(i)
    }

    /// Whether a forward coordinate falls inside the junction insert.
    pub fn in_insert(&self, pos: u64) -> bool {
        !self.records.is_empty() && pos >= self.g_start && pos < self.g_start + self.insert_length()
    }

    /// Split a match at insert coordinate `a1` of length `len` into genomic
    /// donor and acceptor pieces. Returns None if the match does not cross
    /// the junction point (it then duplicates a purely genomic match).
    pub fn split_align(&self, a1: u64, len: u64) -> Option<SjdbSplit> {
        if !self.in_insert(a1) {
            return None;
        }
        let rel = a1 - self.g_start;
        let sj1 = rel % self.sjdb_length();
        if sj1 < self.overhang && sj1 + len > self.overhang {
            let isj = (rel / self.sjdb_length()) as usize;
            let donor_len = self.overhang - sj1;
            Some(SjdbSplit {
                donor_g: self.d_start[isj] + sj1,
                donor_len,
                acceptor_g: self.a_start[isj],
                acceptor_len: len - donor_len,
                isj,
            })
        } else {
            None
        }
    }

    /// Parse `sjdbInfo.txt`.
    pub fn parse(text: &str, g_start: u64) -> Result<Self, Error> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::Index("sjdbInfo.txt is empty".into()))?;
        let mut head = header.split_whitespace();
        let n: usize = parse_field(head.next(), "junction count")?;
        let overhang: u64 = parse_field(head.next(), "overhang")?;

        let mut records = Vec::with_capacity(n);
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let mut f = line.split_whitespace();
            let rec = SjdbRecord {
                start: parse_field(f.next(), "start")?,
                end: parse_field(f.next(), "end")?,
                motif: parse_field(f.next(), "motif")?,
                shift_left: parse_field(f.next(), "shiftL")?,
                shift_right: parse_field(f.next(), "shiftR")?,
                strand: parse_field(f.next(), "strand")?,
            };
            if rec.end < rec.start || rec.motif > 6 || rec.strand > 2 {
                return Err(Error::Index(format!("bad sjdbInfo.txt row: '{line}'")));
            }
            if rec.start < overhang {
                return Err(Error::Index(format!(
                    "junction at {} lies within the first {} bases",
                    rec.start, overhang
                )));
            }
            records.push(rec);
        }
        if records.len() != n {
            return Err(Error::Index(format!(
                "sjdbInfo.txt declares {} junctions but lists {}",
                n,
                records.len()
            )));
        }
        if records.windows(2).any(|w| (w[0].start, w[0].end) >= (w[1].start, w[1].end)) {
            return Err(Error::Index("sjdbInfo.txt rows are not sorted".into()));
        }
        Ok(Self::new(records, overhang, g_start))
    }

    /// Render `sjdbInfo.txt`.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\t{}\n", self.records.len(), self.overhang);
        for r in &self.records {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                r.start, r.end, r.motif, r.shift_left, r.shift_right, r.strand
            );
        }
        out
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> Result<T, Error> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Index(format!("sjdbInfo.txt: missing or bad {what}")))
}

/// Junction motif code from the two first and two last intron bases.
pub fn motif_code(d1: u8, d2: u8, a1: u8, a2: u8) -> u8 {
    match (d1, d2, a1, a2) {
        (2, 3, 0, 2) => 1, // GT/AG
        (1, 3, 0, 1) => 2, // CT/AC
        (2, 1, 0, 2) => 3, // GC/AG
        (1, 3, 2, 1) => 4, // CT/GC
        (0, 3, 0, 1) => 5, // AT/AC
        (2, 3, 0, 3) => 6, // GT/AT
        _ => 0,
    }
}

/// Transcription strand implied by a motif code: 0 undefined, 1 plus, 2 minus.
pub fn motif_strand(motif: u8) -> u8 {
    if motif == 0 {
        0
    } else {
        (motif + 1) % 2 + 1
    }
}
