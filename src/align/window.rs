//! Alignment windows: genomic regions, one strand each, collecting the seeds
//! that may be stitched together.
//!
//! Windows are created around anchor seeds on a coarse bin grid
//! (`2^winBinNbits` bases) and merged when anchors fall within
//! `winAnchorDistNbins` bins of each other on the same chromosome. After
//! flanks are added every seed locus is assigned to the window covering it.

use crate::align::seed::Seed;
use crate::genome::Genome;
use crate::params::Parameters;

const NO_WINDOW: u32 = u32::MAX;

/// A seed placed in a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSeed {
    /// Start in the read oriented for the window strand.
    pub r_start: usize,
    pub length: usize,
    pub g_start: u64,
    pub n_rep: u64,
    pub anchor: bool,
    pub frag: usize,
    pub sj: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Window {
    pub chr: usize,
    pub str: u8,
    pub bin_start: u64,
    pub bin_end: u64,
    /// Killed by a merge.
    pub alive: bool,
    /// Sorted by read start.
    pub seeds: Vec<WindowSeed>,
    /// Index in `seeds` of the last anchor.
    pub last_anchor: Option<usize>,
    /// Seeds no longer than this are not accepted once the window is full.
    min_length: usize,
}

/// Reasons the builder gave up on a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOverflow {
    TooManyWindows,
    TooManyAnchors,
}

/// Per-worker window scratch space, reused across reads.
pub struct WindowBuilder {
    win_bin: [Vec<u32>; 2],
    touched: Vec<(usize, usize)>,
    pub windows: Vec<Window>,
    bin_nbits: u32,
    anchor_dist: u64,
    flank: u64,
    max_windows: usize,
    max_seeds: usize,
}

impl WindowBuilder {
    pub fn new(genome: &Genome, params: &Parameters) -> Self {
        let n_bins = (genome.n_genome >> params.win_bin_nbits) as usize + 1;
        Self {
            win_bin: [vec![NO_WINDOW; n_bins], vec![NO_WINDOW; n_bins]],
            touched: Vec::new(),
            windows: Vec::new(),
            bin_nbits: params.win_bin_nbits,
            anchor_dist: params.win_anchor_dist_nbins,
            flank: params.win_flank_nbins,
            max_windows: params.align_windows_per_read_nmax,
            max_seeds: params.seed_per_window_nmax,
        }
    }

    /// Forget the previous read.
    pub fn reset(&mut self) {
        for &(s, b) in &self.touched {
            self.win_bin[s][b] = NO_WINDOW;
        }
        self.touched.clear();
        self.windows.clear();
    }

    fn mark(&mut self, str: usize, bin: u64, iw: u32) {
        let b = bin as usize;
        if self.win_bin[str][b] == NO_WINDOW {
            self.touched.push((str, b));
        }
        self.win_bin[str][b] = iw;
    }

    fn chr_of_bin(&self, genome: &Genome, bin: u64) -> usize {
        genome.chr_of(bin << self.bin_nbits)
    }

    /// Build windows from `seeds`: anchors create them, then every seed is
    /// assigned. Windows end sorted by creation order; dead ones stay in
    /// place with no seeds.
    pub fn build(&mut self, genome: &Genome, seeds: &[Seed]) -> Result<(), WindowOverflow> {
        self.reset();
        for s in seeds.iter().filter(|s| s.anchor) {
            self.create_extend(genome, s.g_start, s.str)?;
        }
        self.extend_flanks(genome);
        for s in seeds {
            if let Err(e) = self.assign(s) {
                for w in &mut self.windows {
                    w.seeds.clear();
                }
                return Err(e);
            }
        }
        for w in &mut self.windows {
            w.last_anchor = w.seeds.iter().rposition(|s| s.anchor);
        }
        Ok(())
    }

    /// Create a window around `g`, or extend / merge nearby windows.
    fn create_extend(&mut self, genome: &Genome, g: u64, str: u8) -> Result<(), WindowOverflow> {
        let s = str as usize;
        let a_bin = g >> self.bin_nbits;
        let a_chr = self.chr_of_bin(genome, a_bin);
        if self.win_bin[s][a_bin as usize] != NO_WINDOW {
            return Ok(());
        }

        let mut merged: Option<u32> = None;

        // nearest window to the left
        let lo = a_bin.saturating_sub(self.anchor_dist);
        for i_bin in (lo..a_bin).rev() {
            if self.chr_of_bin(genome, i_bin) != a_chr {
                break;
            }
            let iw = self.win_bin[s][i_bin as usize];
            if iw != NO_WINDOW {
                for b in i_bin + 1..=a_bin {
                    self.mark(s, b, iw);
                }
                self.windows[iw as usize].bin_end = a_bin;
                merged = Some(iw);
                break;
            }
        }

        // nearest window to the right
        let hi = (a_bin + self.anchor_dist).min(self.win_bin[s].len() as u64 - 1);
        for i_bin in a_bin + 1..=hi {
            if self.chr_of_bin(genome, i_bin) != a_chr {
                break;
            }
            let iw_right = self.win_bin[s][i_bin as usize];
            if iw_right != NO_WINDOW {
                let iw = merged.unwrap_or(iw_right);
                let right_end = self.windows[iw_right as usize].bin_end;
                for b in a_bin..=right_end {
                    self.mark(s, b, iw);
                }
                if iw != iw_right {
                    let right = &mut self.windows[iw_right as usize];
                    right.alive = false;
                    right.bin_start = 1;
                    right.bin_end = 0;
                } else {
                    self.windows[iw as usize].bin_start = a_bin;
                }
                self.windows[iw as usize].bin_end = right_end;
                merged = Some(iw);
                break;
            }
        }

        if merged.is_none() {
            if self.windows.len() >= self.max_windows {
                return Err(WindowOverflow::TooManyWindows);
            }
            let iw = self.windows.len() as u32;
            self.mark(s, a_bin, iw);
            self.windows.push(Window {
                chr: a_chr,
                str,
                bin_start: a_bin,
                bin_end: a_bin,
                alive: true,
                seeds: Vec::new(),
                last_anchor: None,
                min_length: 0,
            });
        }
        Ok(())
    }

    fn extend_flanks(&mut self, genome: &Genome) {
        let last_bin = self.win_bin[0].len() as u64 - 1;
        for iw in 0..self.windows.len() {
            let w = &self.windows[iw];
            if !w.alive {
                continue;
            }
            let (s, chr, start, end) = (w.str as usize, w.chr, w.bin_start, w.bin_end);

            let mut new_start = start;
            for b in (start.saturating_sub(self.flank)..start).rev() {
                if self.chr_of_bin(genome, b) != chr || self.win_bin[s][b as usize] != NO_WINDOW {
                    break;
                }
                new_start = b;
            }
            let mut new_end = end;
            for b in end + 1..=(end + self.flank).min(last_bin) {
                if self.chr_of_bin(genome, b) != chr || self.win_bin[s][b as usize] != NO_WINDOW {
                    break;
                }
                new_end = b;
            }
            for b in (new_start..start).chain(end + 1..=new_end) {
                self.mark(s, b, iw as u32);
            }
            let w = &mut self.windows[iw];
            w.bin_start = new_start;
            w.bin_end = new_end;
        }
    }

    /// Place one seed into the window covering it, if any.
    fn assign(&mut self, seed: &Seed) -> Result<(), WindowOverflow> {
        let bin = (seed.g_start >> self.bin_nbits) as usize;
        let Some(&iw) = self.win_bin[seed.str as usize].get(bin) else {
            return Ok(());
        };
        if iw == NO_WINDOW {
            return Ok(());
        }
        let max_seeds = self.max_seeds;
        let w = &mut self.windows[iw as usize];
        if !seed.anchor && seed.length < w.min_length {
            return Ok(());
        }

        let new = WindowSeed {
            r_start: seed.r_start,
            length: seed.length,
            g_start: seed.g_start,
            n_rep: seed.n_rep,
            anchor: seed.anchor,
            frag: seed.frag,
            sj: seed.sj,
        };

        // same diagonal and overlapping: keep the longer one
        let diag = new.g_start as i64 - new.r_start as i64;
        for i in 0..w.seeds.len() {
            let old = w.seeds[i];
            if old.frag != new.frag
                || old.sj != new.sj
                || old.g_start as i64 - old.r_start as i64 != diag
            {
                continue;
            }
            let overlaps = (new.r_start >= old.r_start && new.r_start < old.r_start + old.length)
                || (old.r_start >= new.r_start && old.r_start < new.r_start + new.length);
            if !overlaps {
                continue;
            }
            if new.length > old.length {
                w.seeds.remove(i);
                let at = w.seeds.partition_point(|s| s.r_start <= new.r_start);
                w.seeds.insert(at, WindowSeed { anchor: new.anchor || old.anchor, ..new });
            } else if new.anchor && !old.anchor {
                w.seeds[i].anchor = true;
            }
            return Ok(());
        }

        if w.seeds.len() >= max_seeds {
            let Some(shortest) = w
                .seeds
                .iter()
                .filter(|s| !s.anchor)
                .map(|s| s.length)
                .min()
            else {
                return Err(WindowOverflow::TooManyAnchors);
            };
            w.min_length = shortest;
            if !new.anchor && new.length < shortest {
                return Ok(());
            }
            w.seeds.retain(|s| s.anchor || s.length > shortest);
        }

        if new.anchor || new.length > w.min_length {
            let at = w.seeds.partition_point(|s| s.r_start <= new.r_start);
            w.seeds.insert(at, new);
        }
        Ok(())
    }

    /// Windows holding at least one seed.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Window)> {
        self.windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.alive && !w.seeds.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::genome_from_str;
    use clap::Parser;

    fn params() -> Parameters {
        let mut p = Parameters::parse_from(["rustar", "--readFilesIn", "r.fq"]);
        p.win_bin_nbits = 4;
        p.win_anchor_dist_nbins = 3;
        p.win_flank_nbins = 1;
        p
    }

    fn seed(r: usize, g: u64, len: usize, anchor: bool) -> Seed {
        Seed {
            r_start: r,
            g_start: g,
            length: len,
            str: 0,
            n_rep: if anchor { 1 } else { 100 },
            anchor,
            frag: 0,
            sj: None,
        }
    }

    fn genome() -> Genome {
        genome_from_str(&[&"ACGT".repeat(100), &"ACGT".repeat(100)], 6)
    }

    #[test]
    fn nearby_anchors_share_a_window() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        // bins 2 and 4 (16-base bins) are within 3 bins
        wb.build(&g, &[seed(0, 40, 20, true), seed(30, 70, 20, true)])
            .unwrap();
        let live: Vec<_> = wb.live().collect();
        assert_eq!(live.len(), 1);
        let w = live[0].1;
        assert_eq!((w.bin_start, w.bin_end), (1, 5));
        assert_eq!(w.seeds.len(), 2);
        assert_eq!(w.last_anchor, Some(1));
    }

    #[test]
    fn distant_anchors_and_other_strand_get_own_windows() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        let mut minus = seed(0, 40, 20, true);
        minus.str = 1;
        wb.build(&g, &[seed(0, 40, 20, true), seed(30, 300, 20, true), minus])
            .unwrap();
        assert_eq!(wb.live().count(), 3);
    }

    #[test]
    fn windows_do_not_cross_chromosomes() {
        let g = genome();
        // chr2 starts at 448 (bin 28); anchors in bins 27 and 28
        assert_eq!(g.chr_start[1], 448);
        let mut wb = WindowBuilder::new(&g, &params());
        wb.build(&g, &[seed(0, 440, 20, true), seed(30, 450, 20, true)])
            .unwrap();
        let chrs: Vec<_> = wb.live().map(|(_, w)| w.chr).collect();
        assert_eq!(chrs, vec![0, 1]);
    }

    #[test]
    fn bridging_anchor_merges_two_windows() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        wb.build(
            &g,
            &[
                seed(0, 32, 10, true),
                seed(60, 128, 10, true),
                seed(30, 80, 10, true),
            ],
        )
        .unwrap();
        let live: Vec<_> = wb.live().collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, 0);
        let rs: Vec<_> = live[0].1.seeds.iter().map(|s| s.r_start).collect();
        assert_eq!(rs, vec![0, 30, 60]);
        assert!(!wb.windows[1].alive);
    }

    #[test]
    fn flanks_stop_at_bins_of_earlier_windows() {
        let g = genome();
        let mut p = params();
        p.win_flank_nbins = 3;
        let mut wb = WindowBuilder::new(&g, &p);
        // anchors in bins 2 and 7, too far apart to merge
        wb.build(
            &g,
            &[seed(0, 40, 20, true), seed(40, 115, 20, true), seed(25, 85, 8, false)],
        )
        .unwrap();
        let live: Vec<_> = wb.live().map(|(_, w)| w).collect();
        assert_eq!(live.len(), 2);
        assert_eq!((live[0].bin_start, live[0].bin_end), (0, 5));
        // bin 5 stays with the first window instead of being taken over
        assert_eq!((live[1].bin_start, live[1].bin_end), (6, 10));
        assert_eq!(wb.win_bin[0][5], 0);
        let rs: Vec<_> = live[0].seeds.iter().map(|s| s.r_start).collect();
        assert_eq!(rs, vec![0, 25]);
        assert_eq!(live[1].seeds.len(), 1);
    }

    #[test]
    fn non_anchors_never_create_windows() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        wb.build(&g, &[seed(0, 40, 20, false)]).unwrap();
        assert_eq!(wb.live().count(), 0);
    }

    #[test]
    fn overlapping_seed_on_same_diagonal_keeps_longer() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        wb.build(&g, &[seed(0, 40, 20, true), seed(5, 45, 30, false)])
            .unwrap();
        let w = wb.live().next().unwrap().1;
        assert_eq!(w.seeds.len(), 1);
        assert_eq!((w.seeds[0].r_start, w.seeds[0].length), (5, 30));
        assert!(w.seeds[0].anchor);
    }

    #[test]
    fn full_window_evicts_shortest_non_anchors() {
        let g = genome();
        let mut p = params();
        p.seed_per_window_nmax = 3;
        p.win_flank_nbins = 4;
        let mut wb = WindowBuilder::new(&g, &p);
        wb.build(
            &g,
            &[
                seed(0, 40, 20, true),
                seed(20, 70, 8, false),
                seed(30, 90, 6, false),
                seed(40, 110, 12, false),
            ],
        )
        .unwrap();
        let w = wb.live().next().unwrap().1;
        let lens: Vec<_> = w.seeds.iter().map(|s| s.length).collect();
        assert_eq!(lens, vec![20, 8, 12]);

        // a seed shorter than the evicted one is rejected outright
        wb.build(
            &g,
            &[
                seed(0, 40, 20, true),
                seed(20, 70, 8, false),
                seed(30, 90, 6, false),
                seed(40, 110, 12, false),
                seed(50, 100, 5, false),
            ],
        )
        .unwrap();
        let w = wb.live().next().unwrap().1;
        assert!(w.seeds.iter().all(|s| s.length != 5));
    }

    #[test]
    fn window_full_of_anchors_fails_read() {
        let g = genome();
        let mut p = params();
        p.seed_per_window_nmax = 2;
        let mut wb = WindowBuilder::new(&g, &p);
        let r = wb.build(
            &g,
            &[seed(0, 40, 10, true), seed(20, 62, 10, true), seed(40, 84, 10, true)],
        );
        assert_eq!(r, Err(WindowOverflow::TooManyAnchors));
        assert_eq!(wb.live().count(), 0);
    }

    #[test]
    fn window_cap_reported() {
        let g = genome();
        let mut p = params();
        p.align_windows_per_read_nmax = 1;
        let mut wb = WindowBuilder::new(&g, &p);
        let r = wb.build(&g, &[seed(0, 40, 20, true), seed(30, 300, 20, true)]);
        assert_eq!(r, Err(WindowOverflow::TooManyWindows));
    }

    #[test]
    fn reset_clears_only_touched_bins() {
        let g = genome();
        let mut wb = WindowBuilder::new(&g, &params());
        wb.build(&g, &[seed(0, 40, 20, true)]).unwrap();
        wb.reset();
        assert!(wb.win_bin[0].iter().all(|&b| b == NO_WINDOW));
        assert!(wb.touched.is_empty());
    }
}
