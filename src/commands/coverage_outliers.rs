//! Coverage outlier command.
//!
//! Marks areas whose per-base depth differs from the median depth by more
//! than a chosen number of median absolute deviations.
//!
//! # Algorithm
//!
//! Two passes over a `bedtools genomecov -d` table:
//! 1. Collect the depth of every counted site and derive
//!    `median ± k·MAD` bounds
//! 2. Feed every site to an [`IntervalAccumulator`], flagging depths outside
//!    the bounds, and write the closed intervals as BED3
//!
//! Sites covered by the omit mask (and zero-depth sites when zeros are not
//! counted) take no part in the statistics and are never flagged.

use crate::accumulator::IntervalAccumulator;
use crate::bed::{BedMask, BedWriter};
use crate::coverage::{DepthReader, DepthRecord};
use crate::error::{Error, Result};
use crate::stats::DepthBounds;
use log::{debug, info};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// Coverage outlier command configuration.
#[derive(Debug, Clone)]
pub struct CoverageOutlierCommand {
    /// Allowed distance from the median, in MADs (default: 3.0)
    pub mad_multiplier: f64,
    /// Count zero-depth sites in the statistics (default: true)
    pub include_zeros: bool,
    /// Sites to leave out of the analysis
    pub omit: Option<BedMask>,
}

impl Default for CoverageOutlierCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageOutlierCommand {
    pub fn new() -> Self {
        Self {
            mad_multiplier: 3.0,
            include_zeros: true,
            omit: None,
        }
    }

    /// Set the MAD multiplier.
    pub fn with_mad_multiplier(mut self, k: f64) -> Self {
        self.mad_multiplier = k;
        self
    }

    /// Set whether zero-depth sites are counted.
    pub fn with_include_zeros(mut self, include: bool) -> Self {
        self.include_zeros = include;
        self
    }

    /// Set the omit mask.
    pub fn with_omit(mut self, mask: BedMask) -> Self {
        self.omit = Some(mask);
        self
    }

    /// Run both passes over a depth table file.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        input: P,
        output: &mut W,
    ) -> Result<CoverageOutlierStats> {
        let input = input.as_ref();
        debug!("Reading depth information from {}", input.display());
        let bounds = self.compute_bounds(DepthReader::from_path(input)?)?;
        info!(
            "Median coverage {}, MAD {}, allowed depth {}..{}",
            bounds.median, bounds.mad, bounds.min, bounds.max
        );
        self.write_outliers(DepthReader::from_path(input)?, bounds, output)
    }

    /// First pass: derive depth bounds.
    pub fn compute_bounds<R: Read>(&self, mut reader: DepthReader<R>) -> Result<DepthBounds> {
        let mut depths = Vec::new();
        while let Some(rec) = reader.read_record()? {
            if !self.is_counted(&rec) {
                continue;
            }
            depths.push(rec.depth);
        }
        info!("{} depth values found", depths.len());

        DepthBounds::from_depths(&mut depths, self.mad_multiplier).ok_or(Error::NoDepthValues)
    }

    /// Second pass: write BED3 intervals of consecutive outlier sites.
    pub fn write_outliers<R: Read, W: Write>(
        &self,
        mut reader: DepthReader<R>,
        bounds: DepthBounds,
        output: &mut W,
    ) -> Result<CoverageOutlierStats> {
        let mut writer = BedWriter::new(output);
        let mut acc = IntervalAccumulator::new();
        let mut sites_read = 0u64;

        while let Some(rec) = reader.read_record()? {
            sites_read += 1;
            let excluded = self.is_counted(&rec) && bounds.is_outlier(rec.depth);
            if let Some(interval) = acc.observe(rec.chrom, rec.position, excluded)? {
                writer.write_interval(&interval)?;
            }
        }
        if let Some(interval) = acc.flush()? {
            writer.write_interval(&interval)?;
        }
        writer.flush()?;

        Ok(CoverageOutlierStats {
            bounds,
            sites_read,
            excluded_sites: acc.excluded_sites(),
            excluded_areas: acc.emitted(),
        })
    }

    #[inline]
    fn is_counted(&self, rec: &DepthRecord<'_>) -> bool {
        if rec.depth == 0 && !self.include_zeros {
            return false;
        }
        !self
            .omit
            .as_ref()
            .is_some_and(|mask| mask.contains(rec.chrom, rec.position))
    }
}

/// Summary of a coverage outlier run.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageOutlierStats {
    pub bounds: DepthBounds,
    pub sites_read: u64,
    pub excluded_sites: u64,
    pub excluded_areas: usize,
}

impl fmt::Display for CoverageOutlierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Median coverage\t{}", self.bounds.median)?;
        writeln!(f, "MAD\t{}", self.bounds.mad)?;
        writeln!(f, "Min coverage\t{}", self.bounds.min)?;
        writeln!(f, "Max coverage\t{}", self.bounds.max)?;
        writeln!(f, "Sites marked to be excluded\t{}", self.excluded_sites)?;
        write!(f, "Areas marked to be excluded\t{}", self.excluded_areas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::AccumulatorError;
    use crate::bed::parse_intervals;

    fn depth_table(rows: &[(&str, u64, u64)]) -> String {
        rows.iter()
            .map(|(c, p, d)| format!("{}\t{}\t{}\n", c, p, d))
            .collect()
    }

    fn run_on(cmd: &CoverageOutlierCommand, content: &str) -> Result<(String, CoverageOutlierStats)> {
        let bounds = cmd.compute_bounds(DepthReader::new(content.as_bytes()))?;
        let mut output = Vec::new();
        let stats = cmd.write_outliers(DepthReader::new(content.as_bytes()), bounds, &mut output)?;
        Ok((String::from_utf8(output).unwrap(), stats))
    }

    #[test]
    fn test_flags_high_and_low_runs() {
        let content = depth_table(&[
            ("chr1", 1, 10),
            ("chr1", 2, 10),
            ("chr1", 3, 40),
            ("chr1", 4, 41),
            ("chr1", 5, 10),
            ("chr1", 6, 10),
            ("chr1", 7, 10),
            ("chr1", 8, 11),
            ("chr1", 9, 9),
            ("chr2", 1, 0),
            ("chr2", 2, 10),
        ]);
        let cmd = CoverageOutlierCommand::new();
        let (bed, stats) = run_on(&cmd, &content).unwrap();

        assert_eq!(stats.bounds.median, 10);
        assert_eq!(stats.bounds.mad, 0);
        // MAD 0: anything but the median is flagged
        assert_eq!(
            parse_intervals(&bed).unwrap(),
            parse_intervals("chr1\t2\t4\nchr1\t7\t9\nchr2\t0\t1\n").unwrap()
        );
        assert_eq!(stats.sites_read, 11);
        assert_eq!(stats.excluded_sites, 5);
        assert_eq!(stats.excluded_areas, 3);
    }

    #[test]
    fn test_zero_depth_not_counted() {
        let content = depth_table(&[
            ("chr1", 1, 0),
            ("chr1", 2, 0),
            ("chr1", 3, 0),
            ("chr1", 4, 20),
            ("chr1", 5, 21),
            ("chr1", 6, 19),
        ]);
        let with_zeros = CoverageOutlierCommand::new().with_mad_multiplier(1.0);
        let (_, stats) = run_on(&with_zeros, &content).unwrap();
        assert_eq!(stats.bounds.median, 10);

        let without_zeros = with_zeros.clone().with_include_zeros(false);
        let (bed, stats) = run_on(&without_zeros, &content).unwrap();
        assert_eq!(stats.bounds.median, 20);
        assert_eq!(stats.bounds.mad, 1);
        assert_eq!(bed, "");
        assert_eq!(stats.excluded_sites, 0);
    }

    #[test]
    fn test_omit_mask_is_never_flagged() {
        let content = depth_table(&[
            ("chr1", 1, 10),
            ("chr1", 2, 10),
            ("chr1", 3, 500),
            ("chr1", 4, 500),
            ("chr1", 5, 10),
        ]);
        let mask = BedMask::from_intervals(parse_intervals("chr1\t3\t4\n").unwrap());
        let cmd = CoverageOutlierCommand::new().with_omit(mask);
        let (bed, _) = run_on(&cmd, &content).unwrap();

        // 0-based site 2 flagged, site 3 omitted
        assert_eq!(bed, "chr1\t2\t3\n");
    }

    #[test]
    fn test_gap_aborts_run() {
        let content = depth_table(&[("chr1", 1, 10), ("chr1", 2, 10), ("chr1", 4, 10)]);
        let err = run_on(&CoverageOutlierCommand::new(), &content).unwrap_err();
        assert!(matches!(
            err,
            Error::Accumulator(AccumulatorError::Gap {
                previous: 1,
                position: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_no_depth_values() {
        let content = depth_table(&[("chr1", 1, 0)]);
        let cmd = CoverageOutlierCommand::new().with_include_zeros(false);
        assert!(matches!(run_on(&cmd, &content), Err(Error::NoDepthValues)));
    }
}
