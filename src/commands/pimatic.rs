//! Pairwise nucleotide diversity (pi) per BED region.
//!
//! For every pair of samples and every region, pi is the share of compared
//! sites where the two samples carry different alleles. Samples are
//! haploid: only single-allele `0` and `1` calls are compared, anything else
//! counts as missing.
//!
//! Regions come from a BED file. With gene IDs enabled the fourth column
//! names the region, and regions sharing a name are pooled, so the exons of
//! one gene give one value. Otherwise every BED line is its own region,
//! named `contig_start_end`.
//!
//! # Output
//!
//! A tab-separated matrix: the header holds the region names (sorted), each
//! row holds one sample pair `a/b` (sorted) and its pi per region. A pair
//! with too few compared sites in a region gets `NA`.

use crate::bed::BedRegion;
use crate::error::{Error, Result};
use crate::vcf::{allele_index, contig_name, for_each_genotype, open_reader, position, sample_names};
use log::{debug, info, warn};
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{self, Read as _};
use rustc_hash::FxHashMap;
use std::io::{BufWriter, Write};
use std::path::Path;

const PROGRESS_INTERVAL: usize = 1_000_000;

/// Pi command configuration.
#[derive(Debug, Clone, Default)]
pub struct PimaticCommand {
    /// Fewest called samples a site needs to be used (default: 0)
    pub min_genotypes: usize,
    /// Fewest compared sites a pair needs for a value (default: 0)
    pub min_sites: u64,
    /// Name regions by the BED fourth column and pool equal names
    pub gene_ids: bool,
}

impl PimaticCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_genotypes(mut self, n: usize) -> Self {
        self.min_genotypes = n;
        self
    }

    pub fn with_min_sites(mut self, n: u64) -> Self {
        self.min_sites = n;
        self
    }

    pub fn with_gene_ids(mut self, gene_ids: bool) -> Self {
        self.gene_ids = gene_ids;
        self
    }

    /// Compute pi for the regions over a VCF or BCF file; `None` reads stdin.
    pub fn run<W: Write>(
        &self,
        input: Option<&Path>,
        regions: &[BedRegion],
        output: &mut W,
    ) -> Result<PimaticStats> {
        self.run_reader(open_reader(input)?, regions, output)
    }

    pub fn run_reader<W: Write>(
        &self,
        mut reader: bcf::Reader,
        regions: &[BedRegion],
        output: &mut W,
    ) -> Result<PimaticStats> {
        let index = RegionIndex::new(regions, self.gene_ids)?;
        debug!(
            "{} regions covering {} bases",
            index.names.len(),
            index.bases
        );

        let names = sample_names(&reader);
        let mut order: Vec<usize> = (0..names.len()).collect();
        order.sort_by(|&a, &b| names[a].cmp(&names[b]));
        let pairs: Vec<(usize, usize)> = order
            .iter()
            .enumerate()
            .flat_map(|(i, &a)| order[i + 1..].iter().map(move |&b| (a, b)))
            .collect();

        let mut stats = PimaticStats {
            regions: index.names.len(),
            pairs: pairs.len(),
            ..Default::default()
        };
        let mut tallies: Vec<Option<Vec<PairCount>>> = vec![None; index.names.len()];
        let mut matched = Vec::new();
        let mut calls: Vec<Option<bool>> = Vec::with_capacity(names.len());

        for record in reader.records() {
            let record = record?;
            stats.sites_read += 1;
            if stats.sites_read % PROGRESS_INTERVAL == 0 {
                debug!("{} M records read", stats.sites_read / PROGRESS_INTERVAL);
            }

            index.matches(contig_name(&record)?, position(&record)?, &mut matched);
            if matched.is_empty() {
                continue;
            }
            stats.sites_in_regions += 1;

            calls.clear();
            calls.resize(names.len(), None);
            for_each_genotype(&record, |sample, genotype| {
                calls[sample] = haploid_call(genotype);
            })?;
            if calls.iter().flatten().count() < self.min_genotypes {
                stats.sites_skipped += 1;
                continue;
            }

            for &region in &matched {
                let tally =
                    tallies[region].get_or_insert_with(|| vec![PairCount::default(); pairs.len()]);
                for (count, &(a, b)) in tally.iter_mut().zip(&pairs) {
                    if let (Some(x), Some(y)) = (calls[a], calls[b]) {
                        count.comparisons += 1;
                        count.differences += u64::from(x != y);
                    }
                }
            }
        }

        if stats.sites_in_regions == 0 {
            return Err(Error::InvalidFormat(
                "No sites covered by the BED file were found in the VCF file".to_string(),
            ));
        }
        let empty = tallies.iter().filter(|t| t.is_none()).count();
        if empty > 0 {
            warn!("{} of {} regions have no usable sites", empty, index.names.len());
        }

        let mut columns: Vec<(&str, &[PairCount])> = index
            .names
            .iter()
            .zip(&tallies)
            .filter_map(|(name, tally)| Some((name.as_str(), tally.as_deref()?)))
            .filter(|(_, tally)| !tally.is_empty())
            .collect();
        columns.sort_by(|a, b| a.0.cmp(b.0));

        let pair_names: Vec<String> = pairs
            .iter()
            .map(|&(a, b)| format!("{}/{}", names[a], names[b]))
            .collect();
        let mut rows: Vec<usize> = (0..pairs.len()).collect();
        rows.sort_by(|&a, &b| pair_names[a].cmp(&pair_names[b]));

        let mut writer = BufWriter::new(output);
        writer.write_all(b"\t")?;
        let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        writer.write_all(header.join("\t").as_bytes())?;
        writer.write_all(b"\n")?;
        if !columns.is_empty() {
            for row in rows {
                writer.write_all(pair_names[row].as_bytes())?;
                for (_, tally) in &columns {
                    writer.write_all(b"\t")?;
                    writer.write_all(tally[row].pi(self.min_sites).as_bytes())?;
                }
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;

        stats.regions_with_sites = columns.len();
        info!(
            "{} of {} sites fell in {} regions, {} had too few genotypes",
            stats.sites_in_regions, stats.sites_read, stats.regions_with_sites, stats.sites_skipped
        );
        Ok(stats)
    }
}

/// Haploid call of one sample: `Some(false)` for `0`, `Some(true)` for `1`.
fn haploid_call(genotype: &[GenotypeAllele]) -> Option<bool> {
    match genotype {
        [allele] => match allele_index(allele)? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Compared and differing sites of one sample pair in one region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PairCount {
    pub comparisons: u64,
    pub differences: u64,
}

impl PairCount {
    /// `differences / comparisons`, or `NA` below `min_sites` comparisons.
    pub fn pi(&self, min_sites: u64) -> String {
        if self.comparisons == 0 || self.comparisons < min_sites {
            return "NA".to_string();
        }
        let pi = self.differences as f64 / self.comparisons as f64;
        if pi.fract() == 0.0 {
            format!("{:.1}", pi)
        } else {
            pi.to_string()
        }
    }
}

/// Region lookup by position.
///
/// Spans are sorted by start with a running maximum of their ends, so a
/// lookup scans back from the last span starting at or before the position
/// until no earlier span can reach it.
struct RegionIndex {
    names: Vec<String>,
    contigs: FxHashMap<String, ContigRegions>,
    bases: u64,
}

#[derive(Default)]
struct ContigRegions {
    /// (start, end, region)
    spans: Vec<(u64, u64, usize)>,
    max_end: Vec<u64>,
}

impl RegionIndex {
    fn new(regions: &[BedRegion], gene_ids: bool) -> Result<Self> {
        let mut names = Vec::new();
        let mut ids: FxHashMap<String, usize> = FxHashMap::default();
        let mut contigs: FxHashMap<String, ContigRegions> = FxHashMap::default();
        let mut bases = 0;

        for region in regions {
            let iv = &region.interval;
            let name = match (&region.name, gene_ids) {
                (Some(name), true) => name.clone(),
                (None, true) => {
                    return Err(Error::InvalidFormat(format!(
                        "BED line {}:{}-{} has no gene ID column",
                        iv.chrom, iv.start, iv.end
                    )))
                }
                (Some(name), false) => format!("{}_{}_{}_{}", iv.chrom, iv.start, iv.end, name),
                (None, false) => format!("{}_{}_{}", iv.chrom, iv.start, iv.end),
            };
            let id = *ids.entry(name).or_insert_with_key(|name| {
                names.push(name.clone());
                names.len() - 1
            });
            if iv.is_empty() {
                continue;
            }
            bases += iv.len();
            contigs
                .entry(iv.chrom.clone())
                .or_default()
                .spans
                .push((iv.start, iv.end, id));
        }

        for contig in contigs.values_mut() {
            contig.spans.sort_unstable();
            let mut max_end = 0;
            contig.max_end = contig
                .spans
                .iter()
                .map(|&(_, end, _)| {
                    max_end = max_end.max(end);
                    max_end
                })
                .collect();
        }

        Ok(Self {
            names,
            contigs,
            bases,
        })
    }

    /// Collect the distinct regions covering `pos` into `out`.
    fn matches(&self, contig: &str, pos: u64, out: &mut Vec<usize>) {
        out.clear();
        let Some(regions) = self.contigs.get(contig) else {
            return;
        };
        let mut idx = regions.spans.partition_point(|&(start, _, _)| start <= pos);
        while idx > 0 && regions.max_end[idx - 1] > pos {
            idx -= 1;
            let (_, end, region) = regions.spans[idx];
            if end > pos && !out.contains(&region) {
                out.push(region);
            }
        }
    }
}

/// Statistics from a pi run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PimaticStats {
    pub regions: usize,
    pub regions_with_sites: usize,
    pub pairs: usize,
    pub sites_read: usize,
    pub sites_in_regions: usize,
    /// Sites in regions with fewer called samples than required
    pub sites_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::parse_regions;
    use crate::vcf::tests::{test_header, vcf_file};

    // Sample columns are s2, s1, s3; output pairs are sorted by name.
    const BODY: &str = "chr1\t1\t.\tA\tG\t.\t.\t.\tGT\t0\t1\t0\n\
                        chr1\t3\t.\tA\tG\t.\t.\t.\tGT\t1\t1\t.\n\
                        chr1\t11\t.\tA\tG\t.\t.\t.\tGT\t0\t0\t1\n\
                        chr1\t21\t.\tA\tG\t.\t.\t.\tGT\t0/1\t0\t0\n\
                        chr1\t30\t.\tA\tG\t.\t.\t.\tGT\t0\t1\t0\n";

    const GENES: &str = "chr1\t0\t5\tgA\nchr1\t10\t12\tgB\nchr1\t20\t22\tgA\n";

    fn pimatic(cmd: &PimaticCommand, bed: &str) -> Result<(String, PimaticStats)> {
        let input = vcf_file(&format!("{}{}", test_header(&["s2", "s1", "s3"]), BODY));
        let regions = parse_regions(bed).unwrap();
        let mut out = Vec::new();
        let stats = cmd.run(Some(input.path()), &regions, &mut out)?;
        Ok((String::from_utf8(out).unwrap(), stats))
    }

    #[test]
    fn test_genes_pool_their_regions() {
        let cmd = PimaticCommand::new().with_gene_ids(true);
        let (matrix, stats) = pimatic(&cmd, GENES).unwrap();

        assert_eq!(
            matrix,
            "\tgA\tgB\ns1/s2\t0.5\t0.0\ns1/s3\t0.5\t1.0\ns2/s3\t0.0\t1.0\n"
        );
        assert_eq!(stats.regions, 2);
        assert_eq!(stats.pairs, 3);
        assert_eq!(stats.sites_read, 5);
        assert_eq!(stats.sites_in_regions, 4);
    }

    #[test]
    fn test_min_sites_gives_na() {
        let cmd = PimaticCommand::new().with_gene_ids(true).with_min_sites(2);
        let (matrix, _) = pimatic(&cmd, GENES).unwrap();

        assert_eq!(
            matrix,
            "\tgA\tgB\ns1/s2\t0.5\tNA\ns1/s3\t0.5\tNA\ns2/s3\tNA\tNA\n"
        );
    }

    #[test]
    fn test_min_genotypes_skips_sites() {
        let cmd = PimaticCommand::new()
            .with_gene_ids(true)
            .with_min_genotypes(3);
        let (matrix, stats) = pimatic(&cmd, GENES).unwrap();

        assert_eq!(
            matrix,
            "\tgA\tgB\ns1/s2\t1.0\t0.0\ns1/s3\t1.0\t1.0\ns2/s3\t0.0\t1.0\n"
        );
        assert_eq!(stats.sites_skipped, 2);
    }

    #[test]
    fn test_regions_named_by_position() {
        let (matrix, stats) = pimatic(&PimaticCommand::new(), "chr1\t0\t2\nchr1\t10\t12\nchr2\t0\t9\n").unwrap();

        assert_eq!(
            matrix,
            "\tchr1_0_2\tchr1_10_12\ns1/s2\t1.0\t0.0\ns1/s3\t1.0\t1.0\ns2/s3\t0.0\t1.0\n"
        );
        assert_eq!(stats.regions, 3);
        assert_eq!(stats.regions_with_sites, 2);
    }

    #[test]
    fn test_gene_ids_need_name_column() {
        let cmd = PimaticCommand::new().with_gene_ids(true);
        let err = pimatic(&cmd, "chr1\t0\t5\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_no_sites_in_regions() {
        let err = pimatic(&PimaticCommand::new(), "chr2\t0\t100\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(msg) if msg.contains("No sites")));
    }

    #[test]
    fn test_overlapping_regions() {
        let regions = parse_regions("chr1\t0\t100\tbig\nchr1\t5\t10\tsmall\nchr1\t50\t60\tbig\n").unwrap();
        let index = RegionIndex::new(&regions, true).unwrap();
        let mut out = Vec::new();

        index.matches("chr1", 7, &mut out);
        out.sort_unstable();
        assert_eq!(out, [0, 1]);
        index.matches("chr1", 55, &mut out);
        assert_eq!(out, [0]);
        index.matches("chr1", 100, &mut out);
        assert!(out.is_empty());
        index.matches("chrX", 1, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_pi_formatting() {
        let count = PairCount {
            comparisons: 3,
            differences: 1,
        };
        assert_eq!(count.pi(0), (1.0f64 / 3.0).to_string());
        assert_eq!(count.pi(4), "NA");
        assert_eq!(PairCount::default().pi(0), "NA");
    }
}
