//! Allele count filter.
//!
//! Keeps VCF sites by the number of distinct alleles actually observed in
//! the sample genotypes, rather than the alleles listed in REF/ALT. Works
//! with any ploidy.
//!
//! Records are read and written through htslib: the output carries the
//! input header and the kept records, in VCF, BCF or bgzipped VCF.

use crate::error::Result;
use crate::vcf::{allele_index, for_each_genotype, open_reader};
use log::{debug, info};
use rust_htslib::bcf::{self, Read as _, Record};
use rustc_hash::FxHashSet;
use std::path::Path;

const PROGRESS_INTERVAL: usize = 1_000_000;

/// Output encoding of the filtered records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text VCF
    #[default]
    Vcf,
    /// bgzipped VCF
    VcfGz,
    Bcf,
}

impl OutputFormat {
    /// Guess the format from an output file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy();
        if name.ends_with(".bcf") {
            OutputFormat::Bcf
        } else if name.ends_with(".gz") || name.ends_with(".bgz") {
            OutputFormat::VcfGz
        } else {
            OutputFormat::Vcf
        }
    }

    fn htslib(self) -> (bool, bcf::Format) {
        match self {
            OutputFormat::Vcf => (true, bcf::Format::Vcf),
            OutputFormat::VcfGz => (false, bcf::Format::Vcf),
            OutputFormat::Bcf => (false, bcf::Format::Bcf),
        }
    }
}

/// Allele count filter configuration.
#[derive(Debug, Clone, Default)]
pub struct AlleleCountCommand {
    /// Fewest distinct alleles a kept site may have
    pub min_alleles: Option<usize>,
    /// Most distinct alleles a kept site may have
    pub max_alleles: Option<usize>,
}

impl AlleleCountCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_alleles(mut self, n: usize) -> Self {
        self.min_alleles = Some(n);
        self
    }

    pub fn with_max_alleles(mut self, n: usize) -> Self {
        self.max_alleles = Some(n);
        self
    }

    /// Filter a VCF or BCF file. `None` (or `-`) reads stdin and writes
    /// plain VCF to stdout.
    pub fn run(&self, input: Option<&Path>, output: Option<&Path>) -> Result<AlleleCountStats> {
        let reader = open_reader(input)?;
        let header = bcf::Header::from_template(reader.header());
        let writer = match output {
            Some(path) if path.as_os_str() != "-" => {
                let (uncompressed, format) = OutputFormat::from_path(path).htslib();
                bcf::Writer::from_path(path, &header, uncompressed, format)?
            }
            _ => bcf::Writer::from_stdout(&header, true, bcf::Format::Vcf)?,
        };
        self.run_streaming(reader, writer)
    }

    /// Core filter loop.
    pub fn run_streaming(
        &self,
        mut reader: bcf::Reader,
        mut writer: bcf::Writer,
    ) -> Result<AlleleCountStats> {
        let mut stats = AlleleCountStats::default();
        let mut alleles = FxHashSet::default();

        for record in reader.records() {
            let mut record = record?;
            stats.sites_read += 1;
            if stats.sites_read % PROGRESS_INTERVAL == 0 {
                debug!("{} M records read", stats.sites_read / PROGRESS_INTERVAL);
            }

            if !self.keep(&record, &mut alleles)? {
                continue;
            }
            writer.translate(&mut record);
            writer.write(&record)?;
            stats.sites_kept += 1;
        }

        info!("{} of {} sites kept", stats.sites_kept, stats.sites_read);
        Ok(stats)
    }

    fn keep(&self, record: &Record, alleles: &mut FxHashSet<u32>) -> Result<bool> {
        let min = self.min_alleles.unwrap_or(0);
        if min > 1 && record.allele_count() < 2 {
            return Ok(false);
        }
        let count = observed_alleles(record, alleles)?;
        Ok(count >= min && self.max_alleles.is_none_or(|max| count <= max))
    }
}

/// Number of distinct alleles called in the GT field of any sample.
///
/// Missing alleles do not count. `alleles` is scratch space reused between
/// records.
pub fn observed_alleles(record: &Record, alleles: &mut FxHashSet<u32>) -> Result<usize> {
    alleles.clear();
    for_each_genotype(record, |_, genotype| {
        alleles.extend(genotype.iter().filter_map(allele_index));
    })?;
    Ok(alleles.len())
}

/// Statistics from an allele count filter run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlleleCountStats {
    pub sites_read: usize,
    pub sites_kept: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::vcf::tests::{test_header, vcf_file};

    const MONO: &str = "chr1\t1\t.\tA\tG\t.\t.\t.\tGT\t0/0\t0|0\n";
    const BI: &str = "chr1\t2\t.\tA\tG\t.\t.\t.\tGT:DP\t0/1:4\t1/1:2\n";
    const TRI: &str = "chr1\t3\t.\tA\tG,T\t.\t.\t.\tDP:GT\t3:0/2\t5:1\n";
    const NO_ALT: &str = "chr1\t4\t.\tA\t.\t.\t.\t.\tGT\t0/0\t./.\n";

    /// Filter `body` and return the kept data lines.
    fn filter(cmd: &AlleleCountCommand, body: &str) -> Result<(Vec<String>, AlleleCountStats)> {
        let input = vcf_file(&format!("{}{}", test_header(&["a", "b"]), body));
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("kept.vcf");
        let stats = cmd.run(Some(input.path()), Some(&output))?;

        let kept = std::fs::read_to_string(&output)
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(|line| line.split('\t').take(2).collect::<Vec<_>>().join(":"))
            .collect();
        Ok((kept, stats))
    }

    #[test]
    fn test_min_alleles() {
        let body = [MONO, BI, TRI, NO_ALT].concat();
        let cmd = AlleleCountCommand::new().with_min_alleles(2);
        let (kept, stats) = filter(&cmd, &body).unwrap();

        assert_eq!(kept, ["chr1:2", "chr1:3"]);
        assert_eq!(stats.sites_read, 4);
        assert_eq!(stats.sites_kept, 2);
    }

    #[test]
    fn test_max_alleles() {
        let body = [MONO, BI, TRI, NO_ALT].concat();
        let cmd = AlleleCountCommand::new().with_max_alleles(2);
        let (kept, stats) = filter(&cmd, &body).unwrap();

        // min unset: the '.' ALT record is judged on its genotypes
        assert_eq!(kept, ["chr1:1", "chr1:2", "chr1:4"]);
        assert_eq!(stats.sites_kept, 3);
    }

    #[test]
    fn test_exact_range() {
        let body = [MONO, BI, TRI].concat();
        let cmd = AlleleCountCommand::new()
            .with_min_alleles(3)
            .with_max_alleles(3);
        let (kept, _) = filter(&cmd, &body).unwrap();
        assert_eq!(kept, ["chr1:3"]);
    }

    #[test]
    fn test_missing_sample_values_are_missing_data() {
        let body = "chr1\t5\t.\tA\tG\t.\t.\t.\tGT:DP\t0/1:3\t.\n";
        let cmd = AlleleCountCommand::new().with_min_alleles(2).with_max_alleles(2);
        let (kept, _) = filter(&cmd, body).unwrap();
        assert_eq!(kept, ["chr1:5"]);
    }

    #[test]
    fn test_format_without_gt() {
        let body = "chr1\t5\t.\tA\tG\t.\t.\t.\tDP\t3\t4\n";
        let err = filter(&AlleleCountCommand::new(), body).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_output_format_from_name() {
        assert_eq!(OutputFormat::from_path(Path::new("a.vcf")), OutputFormat::Vcf);
        assert_eq!(OutputFormat::from_path(Path::new("a.vcf.gz")), OutputFormat::VcfGz);
        assert_eq!(OutputFormat::from_path(Path::new("a.bcf")), OutputFormat::Bcf);
    }
}
