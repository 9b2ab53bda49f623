//! Paralog area command.
//!
//! Flags VCF sites where more samples are heterozygous than a diploid,
//! single-copy locus would plausibly allow. Runs of flagged sites are widened
//! by a radius, clamped to the contig length and merged.
//!
//! # Algorithm
//!
//! 1. Read VCF records one at a time through htslib
//! 2. Count heterozygous genotypes; a record is paralogous above the
//!    threshold
//! 3. Join consecutive records at the same position into one site, which is
//!    excluded when any of its records is paralogous
//! 4. Feed every site to an [`IntervalAccumulator`] in sparse mode, so
//!    positions with no record count as kept
//! 5. Pass every closed interval through a [`SpanMerger`]
//!
//! # Requirements
//!
//! Records MUST be sorted by position within each contig, and the records of
//! a contig must not be interleaved with other contigs.

use crate::accumulator::IntervalAccumulator;
use crate::bed::BedWriter;
use crate::error::Result;
use crate::genome::Genome;
use crate::interval::Interval;
use crate::merge::{SpanMerger, SpanPolicy};
use crate::vcf::{contig_name, for_each_genotype, is_heterozygous, open_reader, position};
use log::{debug, info};
use rust_htslib::bcf::{self, Read as _, Record};
use std::io::Write;
use std::path::Path;

/// Header line of the paralog area BED output.
pub const PARALOG_HEADER: &str = "#CHR\tSTART\tEND";

/// Paralog area command configuration.
#[derive(Debug, Clone)]
pub struct ParalogAreaCommand {
    /// Highest tolerated number of heterozygous samples (default: 0)
    pub max_heterozygotes: usize,
    /// Bases added on both sides of every flagged area (default: 0)
    pub remove_range: u64,
    /// Write the `#CHR START END` header line (default: true)
    pub header: bool,
}

impl Default for ParalogAreaCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ParalogAreaCommand {
    pub fn new() -> Self {
        Self {
            max_heterozygotes: 0,
            remove_range: 0,
            header: true,
        }
    }

    pub fn with_max_heterozygotes(mut self, n: usize) -> Self {
        self.max_heterozygotes = n;
        self
    }

    pub fn with_remove_range(mut self, r: u64) -> Self {
        self.remove_range = r;
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Execute on a VCF or BCF file.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        input: P,
        genome: &Genome,
        output: &mut W,
    ) -> Result<ParalogAreaStats> {
        debug!(
            "Max heterozygotes {}, remove range {}",
            self.max_heterozygotes, self.remove_range
        );
        let stats = self.run_reader(open_reader(Some(input.as_ref()))?, genome, output)?;
        info!(
            "{} of {} sites paralogous, {} areas ({} bp) written",
            stats.paralogous_sites, stats.sites_read, stats.areas_written, stats.masked_bases
        );
        Ok(stats)
    }

    /// Core streaming pass.
    pub fn run_reader<W: Write>(
        &self,
        mut reader: bcf::Reader,
        genome: &Genome,
        output: &mut W,
    ) -> Result<ParalogAreaStats> {
        let mut stats = ParalogAreaStats::default();
        let mut writer = BedWriter::new(output);
        if self.header {
            writer.write_header(PARALOG_HEADER)?;
        }

        let mut acc = IntervalAccumulator::new();
        let policy = SpanPolicy::widen_and_merge(self.remove_range);
        let mut merger = SpanMerger::new(policy, Some(genome));
        // (contig, position, excluded) of the site being collected
        let mut pending: Option<(String, u64, bool)> = None;

        for record in reader.records() {
            let record = record?;
            stats.records_read += 1;
            let contig = contig_name(&record)?;
            let pos = position(&record)?;
            let paralogous = self.is_paralogous(&record)?;

            if let Some((c, p, excluded)) = pending.as_mut() {
                if c.as_str() == contig && *p == pos {
                    *excluded |= paralogous;
                    continue;
                }
            }
            if let Some(site) = pending.replace((contig.to_string(), pos, paralogous)) {
                let closed = Self::observe_site(&mut acc, &mut stats, site)?;
                Self::emit(&mut merger, &mut writer, &mut stats, closed)?;
            }
        }
        if let Some(site) = pending.take() {
            let closed = Self::observe_site(&mut acc, &mut stats, site)?;
            Self::emit(&mut merger, &mut writer, &mut stats, closed)?;
        }
        let last = acc.flush()?;
        Self::emit(&mut merger, &mut writer, &mut stats, last)?;
        if let Some(span) = merger.finish() {
            stats.record(&span);
            writer.write_interval(&span)?;
        }
        writer.flush()?;

        Ok(stats)
    }

    /// Check whether a record has more heterozygous samples than allowed.
    pub fn is_paralogous(&self, record: &Record) -> Result<bool> {
        let mut heterozygotes = 0;
        for_each_genotype(record, |_, alleles| {
            if is_heterozygous(alleles) {
                heterozygotes += 1;
            }
        })?;
        Ok(heterozygotes > self.max_heterozygotes)
    }

    fn observe_site(
        acc: &mut IntervalAccumulator,
        stats: &mut ParalogAreaStats,
        (contig, pos, excluded): (String, u64, bool),
    ) -> Result<Option<Interval>> {
        stats.sites_read += 1;
        if excluded {
            stats.paralogous_sites += 1;
        }
        Ok(acc.observe_sparse(&contig, pos, excluded)?)
    }

    fn emit<W: Write>(
        merger: &mut SpanMerger<'_>,
        writer: &mut BedWriter<W>,
        stats: &mut ParalogAreaStats,
        interval: Option<Interval>,
    ) -> Result<()> {
        let Some(interval) = interval else {
            return Ok(());
        };
        if let Some(span) = merger.push(interval)? {
            stats.record(&span);
            writer.write_interval(&span)?;
        }
        Ok(())
    }
}

/// Statistics from a paralog area run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParalogAreaStats {
    pub records_read: usize,
    /// Distinct positions; records sharing a position form one site
    pub sites_read: usize,
    pub paralogous_sites: usize,
    pub areas_written: usize,
    /// Total length of the written areas
    pub masked_bases: u64,
}

impl ParalogAreaStats {
    fn record(&mut self, span: &Interval) {
        self.areas_written += 1;
        self.masked_bases += span.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::vcf::tests::{test_header, vcf_file};

    fn genome() -> Genome {
        let mut g = Genome::new();
        g.insert("chr1".to_string(), 100);
        g.insert("chr2".to_string(), 50);
        g
    }

    fn record(chrom: &str, pos: u64, gts: [&str; 3]) -> String {
        format!(
            "{}\t{}\t.\tA\tG\t.\tPASS\t.\tGT:DP\t{}:5\t{}:5\t{}:5\n",
            chrom, pos, gts[0], gts[1], gts[2]
        )
    }

    fn run(cmd: &ParalogAreaCommand, body: &str) -> Result<(String, ParalogAreaStats)> {
        let file = vcf_file(&format!("{}{}", test_header(&["s1", "s2", "s3"]), body));
        let mut output = Vec::new();
        let stats = cmd.run(file.path(), &genome(), &mut output)?;
        Ok((String::from_utf8(output).unwrap(), stats))
    }

    #[test]
    fn test_heterozygous_runs() {
        let body = [
            record("chr1", 10, ["0/0", "0/1", "1/1"]),
            record("chr1", 11, ["0|1", "0/0", "0/0"]),
            record("chr1", 20, ["0/0", "0/0", "1/1"]),
            record("chr1", 30, ["1/2", "0/0", "./."]),
        ]
        .concat();
        let (bed, stats) = run(&ParalogAreaCommand::new(), &body).unwrap();

        assert_eq!(bed, "#CHR\tSTART\tEND\nchr1\t9\t11\nchr1\t29\t30\n");
        assert_eq!(stats.sites_read, 4);
        assert_eq!(stats.paralogous_sites, 3);
        assert_eq!(stats.areas_written, 2);
        assert_eq!(stats.masked_bases, 3);
    }

    #[test]
    fn test_threshold() {
        let body = [
            record("chr1", 5, ["0/1", "0/1", "0/0"]),
            record("chr1", 6, ["0/1", "0/1", "0/1"]),
        ]
        .concat();
        let cmd = ParalogAreaCommand::new().with_max_heterozygotes(2);
        let (bed, stats) = run(&cmd, &body).unwrap();
        assert_eq!(bed, "#CHR\tSTART\tEND\nchr1\t5\t6\n");
        assert_eq!(stats.paralogous_sites, 1);
    }

    #[test]
    fn test_missing_alleles_do_not_count() {
        let body = record("chr1", 5, ["./.", "0/.", ".|1"]);
        let (bed, _) = run(&ParalogAreaCommand::new(), &body).unwrap();
        assert_eq!(bed, "#CHR\tSTART\tEND\n");
    }

    #[test]
    fn test_remove_range_merges_and_clamps() {
        let body = [
            record("chr1", 1, ["0/1", "0/0", "0/0"]),
            record("chr1", 8, ["0/1", "0/0", "0/0"]),
            record("chr2", 49, ["0/1", "0/0", "0/0"]),
        ]
        .concat();
        let cmd = ParalogAreaCommand::new()
            .with_remove_range(3)
            .with_header(false);
        let (bed, stats) = run(&cmd, &body).unwrap();

        // [0,1) and [7,8) widen to [0,4) and [4,11), which touch
        assert_eq!(bed, "chr1\t0\t11\nchr2\t45\t50\n");
        assert_eq!(stats.areas_written, 2);
    }

    #[test]
    fn test_unknown_contig() {
        let mut g = Genome::new();
        g.insert("chr2".to_string(), 50);
        let file = vcf_file(&format!(
            "{}{}",
            test_header(&["s1", "s2", "s3"]),
            record("chr1", 3, ["0/1", "0/0", "0/0"])
        ));
        let err = ParalogAreaCommand::new()
            .run(file.path(), &g, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownContig(c) if c == "chr1"));
    }

    #[test]
    fn test_records_at_one_position_form_one_site() {
        let body = [
            record("chr1", 5, ["0/1", "0/0", "0/0"]),
            record("chr1", 5, ["0/0", "0/0", "0/0"]),
            record("chr1", 6, ["0/0", "0/0", "0/0"]),
            record("chr1", 6, ["0/0", "0/0", "0/0"]),
            record("chr1", 7, ["0/0", "0/0", "0/0"]),
            record("chr1", 7, ["0/0", "1/0", "0/0"]),
        ]
        .concat();
        let (bed, stats) = run(&ParalogAreaCommand::new(), &body).unwrap();

        assert_eq!(bed, "#CHR\tSTART\tEND\nchr1\t4\t5\nchr1\t6\t7\n");
        assert_eq!(stats.records_read, 6);
        assert_eq!(stats.sites_read, 3);
        assert_eq!(stats.paralogous_sites, 2);
    }

    #[test]
    fn test_decreasing_position_is_an_error() {
        let body = [
            record("chr1", 9, ["0/0", "0/0", "0/0"]),
            record("chr1", 5, ["0/0", "0/0", "0/0"]),
        ]
        .concat();
        assert!(matches!(
            run(&ParalogAreaCommand::new(), &body),
            Err(Error::Accumulator(_))
        ));
    }
}
