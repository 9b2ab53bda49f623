//! Variant density filter.
//!
//! Removes VCF records lying in areas with too many variants. Every data
//! line counts as one variant, so filtering by quality or genotype should
//! happen before this step.
//!
//! # Algorithm
//!
//! Two passes over the VCF:
//! 1. Slide a window `[p, p + size)` from every variant position `p`. A
//!    window holding more than `max_variants` variants is dense and all of
//!    its positions are excluded. Excluded runs are closed by an
//!    [`IntervalAccumulator`], then widened and merged.
//! 2. Copy the VCF, dropping records inside the removed areas. Header lines
//!    are always kept.
//!
//! # Memory Complexity
//!
//! The first pass keeps only the variants of one window; the removed areas
//! are kept for the second pass.

use crate::accumulator::{AccumulatorError, IntervalAccumulator};
use crate::bed::{BedMask, BedWriter};
use crate::error::{Error, Result};
use crate::genome::Genome;
use crate::interval::Interval;
use crate::merge::{merge_intervals, SpanPolicy};
use crate::vcf::{VcfLine, VcfReader};
use log::{debug, info};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Variant density command configuration.
#[derive(Debug, Clone)]
pub struct VariantDensityCommand {
    /// Sliding window size in bases
    pub window_size: u64,
    /// Highest tolerated number of variants in one window
    pub max_variants: usize,
    /// Bases removed on both sides of a dense area (default: 0)
    pub remove_range: u64,
}

impl VariantDensityCommand {
    pub fn new(window_size: u64, max_variants: usize) -> Self {
        Self {
            window_size,
            max_variants,
            remove_range: 0,
        }
    }

    pub fn with_remove_range(mut self, r: u64) -> Self {
        self.remove_range = r;
        self
    }

    /// Execute both passes on a VCF file.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        input: P,
        genome: Option<&Genome>,
        output: &mut W,
    ) -> Result<DensityReport> {
        let input = input.as_ref();
        debug!(
            "Window size {}, max variants {}, remove range {}",
            self.window_size, self.max_variants, self.remove_range
        );
        let (regions, variants_read) = self.find_dense_regions(VcfReader::from_path(input)?)?;
        let regions = merge_intervals(
            regions,
            SpanPolicy::widen_and_merge(self.remove_range),
            genome,
        )?;
        let removed_area: u64 = regions.iter().map(Interval::len).sum();
        info!(
            "{} dense areas found, {} bp to remove",
            regions.len(),
            removed_area
        );

        let mask = BedMask::from_intervals(regions.iter().cloned());
        let (variants_kept, _) = filter_records(VcfReader::from_path(input)?, &mask, output)?;

        let report = DensityReport {
            variants_read,
            variants_removed: variants_read.saturating_sub(variants_kept),
            removed_area,
            regions,
        };
        info!(
            "{} of {} variants removed",
            report.variants_removed, report.variants_read
        );
        Ok(report)
    }

    /// First pass: find dense windows. Returns the excluded runs in input
    /// order and the number of records read.
    pub fn find_dense_regions<R: Read>(
        &self,
        mut reader: VcfReader<R>,
    ) -> Result<(Vec<Interval>, usize)> {
        if self.window_size == 0 {
            return Err(Error::InvalidFormat(
                "Window size must be greater than 0".to_string(),
            ));
        }

        let mut scanner = DensityScanner::new(self.window_size, self.max_variants);
        let mut regions = Vec::new();
        let mut variants = 0;
        while let Some(line) = reader.read_line()? {
            if let VcfLine::Record(rec) = line {
                variants += 1;
                scanner.push(rec.chrom, rec.position(), &mut regions)?;
            }
        }
        scanner.finish(&mut regions)?;
        debug!(
            "{} positions in dense windows",
            scanner.acc.excluded_sites()
        );
        Ok((regions, variants))
    }
}

/// Second pass: copy `reader` to `output` without the records inside
/// `mask`. Returns the number of records kept and read.
pub fn filter_records<R: Read, W: Write>(
    mut reader: VcfReader<R>,
    mask: &BedMask,
    output: &mut W,
) -> Result<(usize, usize)> {
    let mut writer = BufWriter::with_capacity(64 * 1024, output);
    let mut kept = 0;
    let mut read = 0;
    while let Some(line) = reader.read_line()? {
        if let VcfLine::Record(rec) = line {
            read += 1;
            if mask.contains(rec.chrom, rec.position()) {
                continue;
            }
            kept += 1;
        }
        writer.write_all(line.raw().as_bytes())?;
    }
    writer.flush()?;
    Ok((kept, read))
}

/// Outcome of a density filter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityReport {
    pub variants_read: usize,
    pub variants_removed: usize,
    /// Total length of the removed areas
    pub removed_area: u64,
    /// Removed areas after widening and merging
    pub regions: Vec<Interval>,
}

impl DensityReport {
    /// Write the run summary next to the filtered VCF.
    pub fn write_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut log = BufWriter::new(File::create(path)?);
        writeln!(log, "popmask variant-density {}", crate::VERSION)?;
        writeln!(log)?;
        writeln!(log, "Size of the removed area: {}", self.removed_area)?;
        writeln!(log)?;
        writeln!(log, "Original number of variants\tVariants removed")?;
        writeln!(log, "{}\t{}", self.variants_read, self.variants_removed)?;
        log.flush()?;
        Ok(())
    }

    /// Write the removed areas as BED3.
    pub fn write_bed<W: Write>(&self, output: W) -> Result<()> {
        let mut writer = BedWriter::new(output);
        for region in &self.regions {
            writer.write_interval(region)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Sliding window state for one pass over sorted variant positions.
///
/// A window starting at variant `p` can only be judged once a variant at
/// `p + size` or later (or the end of the contig) has been seen, so
/// positions wait in `pending` until then. Positions before the oldest
/// pending variant are final and are handed to the accumulator.
#[derive(Debug)]
struct DensityScanner {
    window: u64,
    max_variants: usize,
    contig: Option<String>,
    last_position: Option<u64>,
    /// Last variant position of every contig left behind
    finished: FxHashMap<String, u64>,
    pending: VecDeque<u64>,
    /// First position not yet given to the accumulator
    fed_until: u64,
    acc: IntervalAccumulator,
}

impl DensityScanner {
    fn new(window: u64, max_variants: usize) -> Self {
        Self {
            window,
            max_variants,
            contig: None,
            last_position: None,
            finished: FxHashMap::default(),
            pending: VecDeque::new(),
            fed_until: 0,
            acc: IntervalAccumulator::new(),
        }
    }

    fn push(&mut self, contig: &str, position: u64, out: &mut Vec<Interval>) -> Result<()> {
        if self.contig.as_deref() != Some(contig) {
            if let Some(&previous) = self.finished.get(contig) {
                return Err(AccumulatorError::Order {
                    contig: contig.to_string(),
                    previous,
                    position,
                }
                .into());
            }
            let last = self.last_position;
            self.drain(out)?;
            if let (Some(done), Some(last)) = (self.contig.take(), last) {
                self.finished.insert(done, last);
            }
            self.contig = Some(contig.to_string());
            self.fed_until = 0;
        } else if let Some(previous) = self.last_position {
            // Repeated positions are separate variants.
            if position < previous {
                return Err(AccumulatorError::Order {
                    contig: contig.to_string(),
                    previous,
                    position,
                }
                .into());
            }
        }
        self.last_position = Some(position);

        while let Some(&front) = self.pending.front() {
            if position < front.saturating_add(self.window) {
                break;
            }
            self.evaluate_front(out)?;
        }
        self.pending.push_back(position);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<Interval>) -> Result<()> {
        self.drain(out)?;
        out.extend(self.acc.flush()?);
        Ok(())
    }

    /// Judge every pending window of the current contig.
    fn drain(&mut self, out: &mut Vec<Interval>) -> Result<()> {
        while !self.pending.is_empty() {
            self.evaluate_front(out)?;
        }
        self.last_position = None;
        Ok(())
    }

    fn evaluate_front(&mut self, out: &mut Vec<Interval>) -> Result<()> {
        let Some(start) = self.pending.pop_front() else {
            return Ok(());
        };
        let end = start.saturating_add(self.window);
        let count = 1 + self.pending.partition_point(|&p| p < end);
        let contig = self.contig.as_deref().unwrap_or_default();

        if self.fed_until < start {
            out.extend(self.acc.observe_span(contig, self.fed_until, start, false)?);
            self.fed_until = start;
        }
        if count > self.max_variants && self.fed_until < end {
            out.extend(self.acc.observe_span(contig, self.fed_until, end, true)?);
            self.fed_until = end;
        }
        Ok(())
    }
}
