//! Single-sample VCF to FASTQ conversion.
//!
//! Writes one FASTQ entry per contig, suitable for `fq2psmcfa`. Each record
//! contributes one base: the sample's genotype as an IUPAC code, with the
//! genotype quality (GQ) as the FASTQ quality. Positions without a record
//! become `n` with the lowest quality `!`. A contig's sequence starts at its
//! first record.
//!
//! Records must be sorted, with one record per position and every contig in
//! one block.

use crate::accumulator::AccumulatorError;
use crate::error::{Error, Result};
use crate::vcf::{allele_index, contig_name, for_each_genotype, genotype_quality, open_reader, position};
use log::{debug, info};
use rust_htslib::bcf::{self, Read as _, Record};
use rustc_hash::FxHashMap;
use std::io::{BufWriter, Write};
use std::path::Path;

const PROGRESS_INTERVAL: usize = 1_000_000;

/// Base for a position without a usable call.
const UNKNOWN_BASE: u8 = b'n';
/// Lowest FASTQ quality (Phred 0).
const LOWEST_QUALITY: u8 = b'!';
/// Highest Phred value representable in Phred+33 printable ASCII.
const MAX_PHRED: f64 = 93.0;

/// IUPAC codes indexed by a bit set of A=1, C=2, G=4, T=8.
const IUPAC: [u8; 16] = *b"nACMGRSVTWYHKDBN";

/// VCF to FASTQ command configuration.
#[derive(Debug, Clone, Default)]
pub struct VcfToFastqCommand;

impl VcfToFastqCommand {
    pub fn new() -> Self {
        Self
    }

    /// Convert a VCF or BCF file; `None` reads stdin.
    pub fn run<W: Write>(&self, input: Option<&Path>, output: &mut W) -> Result<FastqStats> {
        self.run_reader(open_reader(input)?, output)
    }

    pub fn run_reader<W: Write>(&self, mut reader: bcf::Reader, output: &mut W) -> Result<FastqStats> {
        let samples = reader.header().sample_count();
        if samples != 1 {
            return Err(Error::InvalidFormat(format!(
                "A single sample VCF is expected, found {} samples",
                samples
            )));
        }

        let mut writer = BufWriter::new(output);
        let mut stats = FastqStats::default();
        let mut current: Option<ContigSequence> = None;
        let mut finished: FxHashMap<String, u64> = FxHashMap::default();

        for record in reader.records() {
            let record = record?;
            stats.records_read += 1;
            if stats.records_read % PROGRESS_INTERVAL == 0 {
                debug!("{} M records read", stats.records_read / PROGRESS_INTERVAL);
            }

            let contig = contig_name(&record)?;
            let pos = position(&record)?;

            let same_contig = current.as_ref().is_some_and(|seq| seq.name == contig);
            if !same_contig {
                if let Some(&previous) = finished.get(contig) {
                    return Err(AccumulatorError::Order {
                        contig: contig.to_string(),
                        previous,
                        position: pos,
                    }
                    .into());
                }
                if let Some(done) = current.take() {
                    done.write(&mut writer, &mut stats)?;
                    finished.insert(done.name, done.next_position - 1);
                }
                current = Some(ContigSequence::new(contig, pos));
            }

            if let Some(seq) = current.as_mut() {
                seq.push(&record, pos)?;
            }
        }

        if let Some(done) = current.take() {
            done.write(&mut writer, &mut stats)?;
        }
        writer.flush()?;

        info!(
            "{} records written as {} bases in {} contigs ({} gap bases)",
            stats.records_read, stats.bases_written, stats.contigs_written, stats.gap_bases
        );
        Ok(stats)
    }
}

/// Sequence and quality string of the contig being converted.
struct ContigSequence {
    name: String,
    next_position: u64,
    bases: Vec<u8>,
    qualities: Vec<u8>,
    gap_bases: u64,
}

impl ContigSequence {
    fn new(name: &str, start: u64) -> Self {
        Self {
            name: name.to_string(),
            next_position: start,
            bases: Vec::new(),
            qualities: Vec::new(),
            gap_bases: 0,
        }
    }

    fn push(&mut self, record: &Record, pos: u64) -> Result<()> {
        if pos < self.next_position {
            return Err(AccumulatorError::Order {
                contig: self.name.clone(),
                previous: self.next_position - 1,
                position: pos,
            }
            .into());
        }

        let gap = (pos - self.next_position) as usize;
        self.bases.resize(self.bases.len() + gap, UNKNOWN_BASE);
        self.qualities.resize(self.qualities.len() + gap, LOWEST_QUALITY);
        self.gap_bases += gap as u64;

        match called_base(record)? {
            Some(base) => {
                self.bases.push(base);
                self.qualities.push(quality_char(genotype_quality(record, 0)?));
            }
            None => {
                self.bases.push(UNKNOWN_BASE);
                self.qualities.push(LOWEST_QUALITY);
            }
        }
        self.next_position = pos + 1;
        Ok(())
    }

    fn write<W: Write>(&self, writer: &mut W, stats: &mut FastqStats) -> Result<()> {
        writer.write_all(b"@")?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.write_all(&self.bases)?;
        writer.write_all(b"\n+\n")?;
        writer.write_all(&self.qualities)?;
        writer.write_all(b"\n")?;

        stats.contigs_written += 1;
        stats.bases_written += self.bases.len() as u64;
        stats.gap_bases += self.gap_bases;
        Ok(())
    }
}

/// IUPAC code of the sample's genotype.
///
/// `None` when any allele is missing or is not a single A, C, G or T.
pub fn called_base(record: &Record) -> Result<Option<u8>> {
    let alleles = record.alleles();
    let mut mask = 0usize;
    let mut complete = true;
    for_each_genotype(record, |_, genotype| {
        for allele in genotype {
            let bit = allele_index(allele)
                .and_then(|idx| alleles.get(idx as usize))
                .and_then(|seq| base_bit(seq));
            match bit {
                Some(bit) => mask |= bit,
                None => complete = false,
            }
        }
    })?;
    Ok((complete && mask != 0).then_some(IUPAC[mask]))
}

fn base_bit(seq: &[u8]) -> Option<usize> {
    match seq {
        [b'A' | b'a'] => Some(1),
        [b'C' | b'c'] => Some(2),
        [b'G' | b'g'] => Some(4),
        [b'T' | b't'] => Some(8),
        _ => None,
    }
}

/// Phred+33 character of a genotype quality, rounded down and capped at `~`.
/// A missing GQ value gets the lowest quality.
pub fn quality_char(gq: Option<f64>) -> u8 {
    match gq {
        Some(q) => LOWEST_QUALITY + q.floor().clamp(0.0, MAX_PHRED) as u8,
        None => LOWEST_QUALITY,
    }
}

/// Statistics from a VCF to FASTQ run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FastqStats {
    pub records_read: usize,
    pub contigs_written: usize,
    pub bases_written: u64,
    /// Positions filled in between records
    pub gap_bases: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcf::tests::{test_header, vcf_file};

    fn convert(body: &str) -> Result<(String, FastqStats)> {
        let input = vcf_file(&format!("{}{}", test_header(&["s1"]), body));
        let mut out = Vec::new();
        let stats = VcfToFastqCommand::new().run(Some(input.path()), &mut out)?;
        Ok((String::from_utf8(out).unwrap(), stats))
    }

    #[test]
    fn test_contigs_gaps_and_qualities() {
        let body = "chr1\t1\t.\tA\tG\t.\t.\t.\tGT:GQ\t0/1:30\n\
                    chr1\t2\t.\tC\tT\t.\t.\t.\tGT:GQ\t1/1:99\n\
                    chr1\t5\t.\tG\t.\t.\t.\t.\tGT:GQ\t0/0:.\n\
                    chr1\t6\t.\tA\tC\t.\t.\t.\tGT:GQ\t./.:20\n\
                    chr2\t3\t.\tA\tAT\t.\t.\t.\tGT:GQ\t0/1:40\n\
                    chr2\t4\t.\tA\tG,T\t.\t.\t.\tGT:GQ\t1/2:0\n";
        let (fastq, stats) = convert(body).unwrap();

        assert_eq!(fastq, "@chr1\nRTnnGn\n+\n?~!!!!\n@chr2\nnK\n+\n!!\n");
        assert_eq!(stats.records_read, 6);
        assert_eq!(stats.contigs_written, 2);
        assert_eq!(stats.bases_written, 8);
        assert_eq!(stats.gap_bases, 2);
    }

    #[test]
    fn test_haploid_call() {
        let (fastq, _) = convert("chr1\t10\t.\tA\tT\t.\t.\t.\tGT:GQ\t1:12\n").unwrap();
        assert_eq!(fastq, "@chr1\nT\n+\n-\n");
    }

    #[test]
    fn test_several_samples_rejected() {
        let input = vcf_file(&format!(
            "{}chr1\t1\t.\tA\tG\t.\t.\t.\tGT\t0/1\t0/0\n",
            test_header(&["s1", "s2"])
        ));
        let err = VcfToFastqCommand::new()
            .run(Some(input.path()), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_repeated_position_is_order_error() {
        let body = "chr1\t4\t.\tA\tG\t.\t.\t.\tGT:GQ\t0/1:30\n\
                    chr1\t4\t.\tA\tC\t.\t.\t.\tGT:GQ\t0/1:30\n";
        let err = convert(body).unwrap_err();
        assert!(matches!(
            err,
            Error::Accumulator(AccumulatorError::Order { previous: 3, position: 3, .. })
        ));
    }

    #[test]
    fn test_returning_contig_is_order_error() {
        let body = "chr1\t4\t.\tA\tG\t.\t.\t.\tGT:GQ\t0/1:30\n\
                    chr2\t1\t.\tA\tG\t.\t.\t.\tGT:GQ\t0/1:30\n\
                    chr1\t9\t.\tA\tG\t.\t.\t.\tGT:GQ\t0/1:30\n";
        let err = convert(body).unwrap_err();
        assert!(matches!(
            err,
            Error::Accumulator(AccumulatorError::Order { previous: 3, position: 8, .. })
        ));
    }

    #[test]
    fn test_quality_char() {
        assert_eq!(quality_char(Some(0.0)), b'!');
        assert_eq!(quality_char(Some(40.9)), b'I');
        assert_eq!(quality_char(Some(250.0)), b'~');
        assert_eq!(quality_char(None), b'!');
    }
}
