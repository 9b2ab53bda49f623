//! VCF input.
//!
//! Genotypes are decoded with htslib ([`open_reader`], [`for_each_genotype`]),
//! which reads plain, bgzipped and BCF input alike. Tools that copy records
//! through unchanged use the line-oriented [`VcfReader`] instead, which only
//! parses CHROM and POS and hands every line back verbatim.

use crate::error::{Error, Result};
use crate::parsing::{parse_u64_fast, trim_newline};
use rust_htslib::bcf::record::{GenotypeAllele, Numeric};
use rust_htslib::bcf::{self, Read as _, Record};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Open a VCF or BCF file with htslib. `None` or `-` reads stdin.
pub fn open_reader(path: Option<&Path>) -> Result<bcf::Reader> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(bcf::Reader::from_path(path)?),
        _ => Ok(bcf::Reader::from_stdin()?),
    }
}

/// Contig name of a record.
pub fn contig_name(record: &Record) -> Result<&str> {
    let rid = record
        .rid()
        .ok_or_else(|| Error::InvalidFormat("VCF record without a contig".to_string()))?;
    let name = record.header().rid2name(rid)?;
    std::str::from_utf8(name)
        .map_err(|_| Error::InvalidFormat("Contig name is not valid UTF-8".to_string()))
}

/// 0-based position of a record.
pub fn position(record: &Record) -> Result<u64> {
    u64::try_from(record.pos())
        .map_err(|_| Error::InvalidFormat(format!("Invalid record position {}", record.pos())))
}

/// Call `f` with the GT alleles of every sample, in header order.
///
/// Sites-only records have no samples and never call `f`. A record with
/// samples but no GT value is an error.
pub fn for_each_genotype<F>(record: &Record, mut f: F) -> Result<()>
where
    F: FnMut(usize, &[GenotypeAllele]),
{
    let samples = record.sample_count() as usize;
    if samples == 0 {
        return Ok(());
    }
    let genotypes = record.genotypes().map_err(|e| {
        Error::InvalidFormat(format!(
            "No GT field for the record at {}:{} ({})",
            contig_name(record).unwrap_or("?"),
            record.pos() + 1,
            e
        ))
    })?;
    for sample in 0..samples {
        let genotype = genotypes.get(sample);
        f(sample, genotype.as_slice());
    }
    Ok(())
}

/// Allele index of one GT allele; `None` for a missing call.
pub fn allele_index(allele: &GenotypeAllele) -> Option<u32> {
    match allele {
        GenotypeAllele::Unphased(v) | GenotypeAllele::Phased(v) => u32::try_from(*v).ok(),
        GenotypeAllele::UnphasedMissing | GenotypeAllele::PhasedMissing => None,
    }
}

/// True when the called alleles of a genotype are not all the same.
///
/// Phased and unphased genotypes are treated alike; missing alleles never
/// count, so `0/.` is not heterozygous.
pub fn is_heterozygous(alleles: &[GenotypeAllele]) -> bool {
    let mut called = alleles.iter().filter_map(allele_index);
    match called.next() {
        Some(first) => called.any(|allele| allele != first),
        None => false,
    }
}

/// GQ value of one sample. `Ok(None)` when the sample's value is missing.
///
/// Integer and Float GQ declarations are both accepted.
pub fn genotype_quality(record: &Record, sample: usize) -> Result<Option<f64>> {
    if let Ok(values) = record.format(b"GQ").integer() {
        return Ok(values
            .get(sample)
            .and_then(|v| v.first())
            .filter(|v| !v.is_missing())
            .map(|&v| f64::from(v)));
    }
    let values = record.format(b"GQ").float().map_err(|e| {
        Error::InvalidFormat(format!(
            "No GQ field for the record at {}:{} ({})",
            contig_name(record).unwrap_or("?"),
            record.pos() + 1,
            e
        ))
    })?;
    Ok(values
        .get(sample)
        .and_then(|v| v.first())
        .filter(|v| !v.is_missing())
        .map(|&v| f64::from(v)))
}

/// Sample names from the header, in column order.
pub fn sample_names(reader: &bcf::Reader) -> Vec<String> {
    reader
        .header()
        .samples()
        .into_iter()
        .map(|name| String::from_utf8_lossy(name).to_string())
        .collect()
}

/// One line of a VCF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcfLine<'a> {
    /// Meta-information or column header line (`#`-prefixed)
    Header(&'a str),
    /// Whitespace-only line
    Blank(&'a str),
    Record(VcfRecord<'a>),
}

impl<'a> VcfLine<'a> {
    /// The line exactly as read, including its line terminator.
    pub fn raw(&self) -> &'a str {
        match *self {
            VcfLine::Header(raw) | VcfLine::Blank(raw) => raw,
            VcfLine::Record(rec) => rec.raw,
        }
    }
}

/// Location of a VCF data line, with the line kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcfRecord<'a> {
    pub chrom: &'a str,
    /// 1-based position as written in the file
    pub pos: u64,
    /// 1-based line number in the source file
    pub line_number: usize,
    raw: &'a str,
}

impl<'a> VcfRecord<'a> {
    /// Parse CHROM and POS of a data line. `line_number` is used in error
    /// messages.
    pub fn parse(raw: &'a str, line_number: usize) -> Result<Self> {
        let line = trim_newline(raw);
        let mut fields = line.splitn(3, '\t');
        let chrom = fields.next().unwrap_or_default();
        let pos = fields
            .next()
            .ok_or_else(|| Error::parse(line_number, "Missing POS column"))?;
        let pos = parse_u64_fast(pos.as_bytes())
            .filter(|&p| p > 0)
            .ok_or_else(|| Error::parse(line_number, format!("Invalid POS: '{}'", pos)))?;

        Ok(Self {
            chrom,
            pos,
            line_number,
            raw,
        })
    }

    /// 0-based position.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos - 1
    }

    /// The line exactly as read.
    pub fn raw(&self) -> &'a str {
        self.raw
    }
}

/// Streaming line reader. Lines are lent from an internal buffer.
pub struct VcfReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: String,
}

impl VcfReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> VcfReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
            line_number: 0,
            buffer: String::with_capacity(4096),
        }
    }

    /// Line number of the last line returned.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Read the next line.
    pub fn read_line(&mut self) -> Result<Option<VcfLine<'_>>> {
        self.buffer.clear();
        if self.reader.read_line(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let raw = self.buffer.as_str();
        if raw.starts_with('#') {
            return Ok(Some(VcfLine::Header(raw)));
        }
        if raw.trim().is_empty() {
            return Ok(Some(VcfLine::Blank(raw)));
        }
        VcfRecord::parse(raw, self.line_number).map(|rec| Some(VcfLine::Record(rec)))
    }
}
