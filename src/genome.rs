//! Genome size file parser.
//!
//! Parses genome size tables (tab-delimited: contig\tsize). Columns after
//! the size are ignored and a leading `>` on either column is stripped, so
//! `.fai` indexes and tables cut from FASTA headers can be used as-is.

use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Contig sizes keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    sizes: FxHashMap<String, u64>,
}

impl Genome {
    /// Create an empty genome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load genome sizes from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load genome sizes from any readable source.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let reader = BufReader::new(reader);
        let mut genome = Genome::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(Error::parse(
                    line_num + 1,
                    "Genome file requires at least two columns: contig and size",
                ));
            }

            let chrom = fields[0].trim_start_matches('>').to_string();
            let size_field = fields[1].trim_start_matches('>');
            let size: u64 = size_field.parse().map_err(|_| {
                Error::parse(line_num + 1, format!("Invalid contig size: {}", fields[1]))
            })?;

            genome.insert(chrom, size);
        }

        Ok(genome)
    }

    /// Get the size of a contig.
    #[inline]
    pub fn chrom_size(&self, chrom: &str) -> Option<u64> {
        self.sizes.get(chrom).copied()
    }

    /// Get the size of a contig, failing for contigs missing from the table.
    #[inline]
    pub fn require(&self, chrom: &str) -> Result<u64> {
        self.chrom_size(chrom)
            .ok_or_else(|| Error::UnknownContig(chrom.to_string()))
    }

    /// Get number of contigs.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Insert a contig size, replacing an earlier entry.
    pub fn insert(&mut self, chrom: String, size: u64) {
        self.sizes.insert(chrom, size);
    }
}
